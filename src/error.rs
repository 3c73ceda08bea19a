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

//! Error types for bridge operations.
//!
//! Every failure is terminal to the operation that raised it only. The
//! method-call layer collapses these into `false`/`0`/empty replies, so the
//! variants exist mainly to keep log output precise.

use thiserror::Error;

use crate::bluetooth::DeviceAddress;

/// Main error type for bridge operations.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Address text was not one of the accepted encodings.
    #[error("Invalid device address: {0:?}")]
    InvalidAddress(String),

    /// Operation needs a connection that does not exist.
    #[error("Device not connected: {0}")]
    NotConnected(DeviceAddress),

    /// Write called with nothing to send.
    #[error("Refusing to send an empty payload")]
    EmptyPayload,

    /// Transport accepted none of the bytes.
    #[error("Transport accepted 0 of {len} bytes")]
    NothingSent {
        /// Payload length
        len: usize,
    },

    /// Every candidate channel refused or timed out.
    #[error("No RFCOMM channel in {first}..={last} accepted the connection")]
    ChannelsExhausted {
        /// First channel tried
        first: u8,
        /// Last channel tried
        last: u8,
    },

    /// A non-retryable socket error stopped channel probing.
    #[error("RFCOMM connect aborted on channel {channel}: {source}")]
    ConnectAborted {
        /// Channel being tried when the error occurred
        channel: u8,
        /// Underlying socket error
        #[source]
        source: std::io::Error,
    },

    /// Required key absent from the call arguments.
    #[error("Missing argument: {0}")]
    MissingArgument(&'static str),

    /// Call argument present but of the wrong shape.
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// BlueZ adapter or D-Bus failure.
    #[error("Bluetooth adapter error: {0}")]
    Adapter(#[from] bluer::Error),

    /// Socket I/O failure.
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),
}

impl BridgeError {
    /// Get an error code for logging.
    pub fn error_code(&self) -> &'static str {
        match self {
            BridgeError::InvalidAddress(_) => "INVALID_ADDRESS",
            BridgeError::NotConnected(_) => "NOT_CONNECTED",
            BridgeError::EmptyPayload => "EMPTY_PAYLOAD",
            BridgeError::NothingSent { .. } => "NOTHING_SENT",
            BridgeError::ChannelsExhausted { .. } => "CHANNELS_EXHAUSTED",
            BridgeError::ConnectAborted { .. } => "CONNECT_ABORTED",
            BridgeError::MissingArgument(_) => "MISSING_ARGUMENT",
            BridgeError::InvalidArgument(_) => "INVALID_ARGUMENT",
            BridgeError::InvalidConfig(_) => "INVALID_CONFIG",
            BridgeError::Adapter(_) => "ADAPTER_ERROR",
            BridgeError::Transport(_) => "TRANSPORT_ERROR",
        }
    }

    /// Whether the caller supplied bad input, as opposed to a transport fault.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            BridgeError::InvalidAddress(_)
                | BridgeError::EmptyPayload
                | BridgeError::MissingArgument(_)
                | BridgeError::InvalidArgument(_)
        )
    }
}

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_codes() {
        let err = BridgeError::InvalidAddress("zz".to_string());
        assert_eq!(err.error_code(), "INVALID_ADDRESS");

        let err = BridgeError::ChannelsExhausted { first: 1, last: 30 };
        assert_eq!(err.error_code(), "CHANNELS_EXHAUSTED");
        assert!(err.to_string().contains("1..=30"));
    }

    #[test]
    fn test_input_errors() {
        assert!(BridgeError::EmptyPayload.is_input_error());
        assert!(BridgeError::MissingArgument("address").is_input_error());
        assert!(BridgeError::InvalidArgument("args").is_input_error());
        assert!(!BridgeError::Transport(io::Error::from(io::ErrorKind::BrokenPipe)).is_input_error());
    }

    #[test]
    fn test_connect_aborted_keeps_source() {
        use std::error::Error as _;

        let err = BridgeError::ConnectAborted {
            channel: 4,
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert!(err.to_string().contains("channel 4"));
        assert!(err.source().is_some());
    }
}
