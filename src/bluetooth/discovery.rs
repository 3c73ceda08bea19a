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

//! Adapter state and device listing.

use async_trait::async_trait;
use bluer::{Adapter, AdapterEvent, DiscoveryFilter, DiscoveryTransport, Session};
use futures::{pin_mut, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info};

use super::address::DeviceAddress;
use crate::error::Result;

/// Device type reported for every listed device.
pub const CLASSIC_DEVICE_TYPE: &str = "classic";

/// A device as reported to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub name: String,
    pub address: DeviceAddress,
    #[serde(rename = "type")]
    pub device_type: String,
    pub is_connected: bool,
}

impl DeviceInfo {
    /// Describe a Bluetooth Classic device.
    pub fn classic(name: impl Into<String>, address: DeviceAddress, is_connected: bool) -> Self {
        Self {
            name: name.into(),
            address,
            device_type: CLASSIC_DEVICE_TYPE.to_string(),
            is_connected,
        }
    }
}

/// Source of adapter state and device lists.
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    /// Whether a Bluetooth adapter is present.
    async fn is_available(&self) -> bool;

    /// Whether the adapter is powered.
    async fn is_enabled(&self) -> bool;

    /// Power the adapter on. Returns whether it is powered afterwards.
    async fn request_enable(&self) -> Result<bool>;

    /// Devices the adapter already knows as paired.
    async fn paired_devices(&self) -> Result<Vec<DeviceInfo>>;

    /// Run an inquiry scan for `duration` and list what was seen.
    async fn discover(&self, duration: Duration) -> Result<Vec<DeviceInfo>>;
}

/// BlueZ-backed directory using the default adapter.
pub struct BluezDirectory {
    session: Session,
}

impl BluezDirectory {
    /// Open a BlueZ session.
    pub async fn new() -> Result<Self> {
        let session = Session::new().await?;
        info!("BlueZ session created");
        Ok(Self { session })
    }

    async fn adapter(&self) -> Result<Adapter> {
        Ok(self.session.default_adapter().await?)
    }

    async fn describe(adapter: &Adapter, address: bluer::Address) -> Result<DeviceInfo> {
        let device = adapter.device(address)?;
        let name = device
            .alias()
            .await
            .unwrap_or_else(|_| address.to_string());
        let is_connected = device.is_connected().await.unwrap_or(false);
        Ok(DeviceInfo::classic(name, address.into(), is_connected))
    }
}

#[async_trait]
impl DeviceDirectory for BluezDirectory {
    async fn is_available(&self) -> bool {
        self.adapter().await.is_ok()
    }

    async fn is_enabled(&self) -> bool {
        match self.adapter().await {
            Ok(adapter) => adapter.is_powered().await.unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn request_enable(&self) -> Result<bool> {
        let adapter = self.adapter().await?;
        if !adapter.is_powered().await? {
            info!("Powering on Bluetooth adapter {}", adapter.name());
            adapter.set_powered(true).await?;
        }
        Ok(adapter.is_powered().await?)
    }

    async fn paired_devices(&self) -> Result<Vec<DeviceInfo>> {
        let adapter = self.adapter().await?;
        let mut devices = Vec::new();

        for address in adapter.device_addresses().await? {
            let device = adapter.device(address)?;
            if device.is_paired().await? {
                devices.push(Self::describe(&adapter, address).await?);
            }
        }

        Ok(devices)
    }

    async fn discover(&self, duration: Duration) -> Result<Vec<DeviceInfo>> {
        let adapter = self.adapter().await?;
        adapter
            .set_discovery_filter(DiscoveryFilter {
                transport: DiscoveryTransport::BrEdr,
                ..Default::default()
            })
            .await?;

        info!("Scanning for devices for {:?}", duration);
        let events = adapter.discover_devices().await?;
        pin_mut!(events);

        let deadline = tokio::time::sleep(duration);
        tokio::pin!(deadline);

        let mut seen = BTreeSet::new();
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                event = events.next() => match event {
                    Some(AdapterEvent::DeviceAdded(address)) => {
                        debug!("Discovered {}", address);
                        seen.insert(DeviceAddress::from(address));
                    }
                    Some(_) => {}
                    None => break,
                },
            }
        }

        let mut devices = Vec::with_capacity(seen.len());
        for address in seen {
            devices.push(Self::describe(&adapter, address.into()).await?);
        }
        info!("Discovery finished, {} devices", devices.len());
        Ok(devices)
    }
}
