// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Configuration module.
//!
//! Handles loading and saving bridge settings.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::BridgeError;

/// Lowest valid RFCOMM channel.
pub const MIN_RFCOMM_CHANNEL: u8 = 1;

/// Highest valid RFCOMM channel.
pub const MAX_RFCOMM_CHANNEL: u8 = 30;

/// Directory name under the user's config dir.
const APP_DIR: &str = "classic-bridge";

/// Bridge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Channel probing settings.
    pub rfcomm: RfcommConfig,

    /// Receive loop settings.
    pub stream: StreamConfig,

    /// Device discovery settings.
    pub discovery: DiscoveryConfig,

    /// Log output settings.
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RfcommConfig {
    /// First channel tried on connect.
    pub first_channel: u8,

    /// Last channel tried on connect.
    pub last_channel: u8,

    /// Per-channel connect timeout. Unset leaves it to the kernel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout_ms: Option<u64>,
}

impl Default for RfcommConfig {
    fn default() -> Self {
        Self {
            first_channel: MIN_RFCOMM_CHANNEL,
            last_channel: MAX_RFCOMM_CHANNEL,
            connect_timeout_ms: None,
        }
    }
}

impl RfcommConfig {
    pub fn channels(&self) -> RangeInclusive<u8> {
        self.first_channel..=self.last_channel
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Sleep between receive attempts while no data is queued.
    pub poll_interval_ms: u64,

    /// Bytes requested per receive call.
    pub read_chunk_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10,
            read_chunk_size: 1024,
        }
    }
}

impl StreamConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// How long `startDiscovery` scans before answering.
    pub scan_duration_ms: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            scan_duration_ms: 2560,
        }
    }
}

impl DiscoveryConfig {
    pub fn scan_duration(&self) -> Duration {
        Duration::from_millis(self.scan_duration_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Default config file location.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }

    /// Load configuration from the default location or create it.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load configuration from `path`, writing defaults there if it is missing.
    pub fn load_from(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            let config = Self::default();
            config.save_to(path)?;
            config
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings the bridge cannot run with.
    pub fn validate(&self) -> crate::error::Result<()> {
        let rfcomm = &self.rfcomm;
        if rfcomm.first_channel < MIN_RFCOMM_CHANNEL || rfcomm.last_channel > MAX_RFCOMM_CHANNEL {
            return Err(BridgeError::InvalidConfig(format!(
                "RFCOMM channels must lie in {}..={}",
                MIN_RFCOMM_CHANNEL, MAX_RFCOMM_CHANNEL
            )));
        }
        if rfcomm.first_channel > rfcomm.last_channel {
            return Err(BridgeError::InvalidConfig(format!(
                "first_channel {} is after last_channel {}",
                rfcomm.first_channel, rfcomm.last_channel
            )));
        }
        if self.stream.poll_interval_ms == 0 {
            return Err(BridgeError::InvalidConfig(
                "poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.stream.read_chunk_size == 0 {
            return Err(BridgeError::InvalidConfig(
                "read_chunk_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
