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

//! Active RFCOMM connections.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::address::DeviceAddress;
use super::transport::{is_retryable_probe_error, RfcommConnector, RfcommLink};
use crate::error::{BridgeError, Result};

/// Result of a successful connect call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// The device was already connected; nothing was attempted.
    AlreadyConnected,
    /// A new connection was opened on this channel.
    Connected { channel: u8 },
}

/// Owns every open connection, keyed by device.
pub struct ConnectionManager {
    connector: Arc<dyn RfcommConnector>,
    channels: RangeInclusive<u8>,
    connections: RwLock<HashMap<DeviceAddress, Arc<dyn RfcommLink>>>,
    /// Held across the whole check-probe-insert sequence of a connect.
    connect_gate: Mutex<()>,
}

impl ConnectionManager {
    /// Create a manager that probes `channels` in ascending order.
    pub fn new(connector: Arc<dyn RfcommConnector>, channels: RangeInclusive<u8>) -> Self {
        Self {
            connector,
            channels,
            connections: RwLock::new(HashMap::new()),
            connect_gate: Mutex::new(()),
        }
    }

    /// Connect to `address`, probing channels until one accepts.
    ///
    /// Refused and timed-out channels are skipped. Any other socket error
    /// stops probing at once. Nothing is stored unless a channel accepts.
    pub async fn connect(&self, address: DeviceAddress) -> Result<ConnectOutcome> {
        let _gate = self.connect_gate.lock().await;

        if self.is_connected(&address) {
            info!("Device {} already connected", address);
            return Ok(ConnectOutcome::AlreadyConnected);
        }

        info!("Connecting to {}", address);
        let (channel, link) = self.probe(address).await?;
        self.connections.write().insert(address, Arc::from(link));
        info!("Connected to {} on RFCOMM channel {}", address, channel);

        Ok(ConnectOutcome::Connected { channel })
    }

    async fn probe(&self, address: DeviceAddress) -> Result<(u8, Box<dyn RfcommLink>)> {
        for channel in self.channels.clone() {
            debug!("Trying RFCOMM channel {} on {}", channel, address);

            match self.connector.connect(address, channel).await {
                Ok(link) => return Ok((channel, link)),
                Err(e) if is_retryable_probe_error(&e) => {
                    debug!("Channel {} on {} unavailable: {}", channel, address, e);
                }
                Err(e) => {
                    warn!(
                        "Unexpected socket error on channel {} for {}: {}",
                        channel, address, e
                    );
                    return Err(BridgeError::ConnectAborted { channel, source: e });
                }
            }
        }

        warn!("No RFCOMM channel accepted a connection from {}", address);
        Err(BridgeError::ChannelsExhausted {
            first: *self.channels.start(),
            last: *self.channels.end(),
        })
    }

    /// Close one connection, or every connection when `address` is `None`.
    ///
    /// Returns the addresses that were actually removed. An unknown address
    /// is not an error.
    pub async fn disconnect(&self, address: Option<DeviceAddress>) -> Vec<DeviceAddress> {
        let removed: Vec<(DeviceAddress, Arc<dyn RfcommLink>)> = {
            let mut table = self.connections.write();
            match address {
                Some(address) => table
                    .remove(&address)
                    .map(|link| (address, link))
                    .into_iter()
                    .collect(),
                None => table.drain().collect(),
            }
        };

        for (address, link) in &removed {
            if let Err(e) = link.close().await {
                debug!("Shutdown of {} reported: {}", address, e);
            }
            info!("Disconnected {}", address);
        }

        removed.into_iter().map(|(address, _)| address).collect()
    }

    pub fn is_connected(&self, address: &DeviceAddress) -> bool {
        self.connections.read().contains_key(address)
    }

    /// The open link for `address`, if connected.
    pub fn link(&self, address: &DeviceAddress) -> Option<Arc<dyn RfcommLink>> {
        self.connections.read().get(address).cloned()
    }

    pub fn connected_addresses(&self) -> Vec<DeviceAddress> {
        let mut addresses: Vec<_> = self.connections.read().keys().copied().collect();
        addresses.sort();
        addresses
    }

    /// Send `data` with a single best-effort write.
    ///
    /// Succeeds if the transport took at least one byte; the unsent
    /// remainder of a partial write is not retried.
    pub async fn write(&self, address: &DeviceAddress, data: &[u8]) -> Result<usize> {
        let link = self
            .link(address)
            .ok_or(BridgeError::NotConnected(*address))?;
        if data.is_empty() {
            return Err(BridgeError::EmptyPayload);
        }

        let sent = link.send(data).await?;
        if sent == 0 {
            return Err(BridgeError::NothingSent { len: data.len() });
        }

        debug!("Sent {} of {} bytes to {}", sent, data.len(), address);
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockConnector, ProbeOutcome};
    use std::io;

    const ADDR: DeviceAddress = DeviceAddress::new([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

    fn manager(connector: &Arc<MockConnector>) -> ConnectionManager {
        ConnectionManager::new(connector.clone(), 1..=30)
    }

    #[tokio::test]
    async fn test_probes_until_a_channel_accepts() {
        let connector = Arc::new(MockConnector::accepting_on(2));
        let manager = manager(&connector);

        let outcome = manager.connect(ADDR).await.unwrap();
        assert_eq!(outcome, ConnectOutcome::Connected { channel: 2 });
        assert!(manager.is_connected(&ADDR));
        assert_eq!(connector.attempted_channels(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let connector = Arc::new(MockConnector::accepting_on(1));
        let manager = manager(&connector);

        manager.connect(ADDR).await.unwrap();
        let second = manager.connect(ADDR).await.unwrap();

        assert_eq!(second, ConnectOutcome::AlreadyConnected);
        assert_eq!(connector.attempt_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_connects_attempt_once() {
        let connector = Arc::new(MockConnector::accepting_on(3));
        let manager = Arc::new(manager(&connector));

        let a = tokio::spawn({
            let manager = manager.clone();
            async move { manager.connect(ADDR).await.is_ok() }
        });
        let b = tokio::spawn({
            let manager = manager.clone();
            async move { manager.connect(ADDR).await.is_ok() }
        });

        assert!(a.await.unwrap());
        assert!(b.await.unwrap());
        assert_eq!(connector.attempted_channels(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_exhaustion_leaves_nothing_behind() {
        let connector = Arc::new(MockConnector::refusing_all());
        let manager = manager(&connector);

        let err = manager.connect(ADDR).await.unwrap_err();
        assert!(matches!(err, BridgeError::ChannelsExhausted { first: 1, last: 30 }));
        assert!(!manager.is_connected(&ADDR));
        assert_eq!(connector.attempt_count(), 30);
    }

    #[tokio::test]
    async fn test_timeouts_are_skipped() {
        let connector = Arc::new(MockConnector::accepting_on(5));
        connector.set_outcome(1, ProbeOutcome::TimeOut);
        connector.set_outcome(2, ProbeOutcome::TimeOut);
        let manager = manager(&connector);

        let outcome = manager.connect(ADDR).await.unwrap();
        assert_eq!(outcome, ConnectOutcome::Connected { channel: 5 });
    }

    #[tokio::test]
    async fn test_unexpected_error_aborts_probing() {
        let connector = Arc::new(MockConnector::accepting_on(10));
        connector.set_outcome(3, ProbeOutcome::Fail(io::ErrorKind::PermissionDenied));
        let manager = manager(&connector);

        let err = manager.connect(ADDR).await.unwrap_err();
        assert!(matches!(err, BridgeError::ConnectAborted { channel: 3, .. }));
        assert_eq!(connector.attempted_channels(), vec![1, 2, 3]);
        assert!(!manager.is_connected(&ADDR));
    }

    #[tokio::test]
    async fn test_disconnect_one_and_all() {
        let connector = Arc::new(MockConnector::accepting_on(1));
        let manager = manager(&connector);
        let other = DeviceAddress::new([1, 2, 3, 4, 5, 6]);

        manager.connect(ADDR).await.unwrap();
        manager.connect(other).await.unwrap();
        assert_eq!(manager.connected_addresses(), vec![other, ADDR]);

        assert_eq!(manager.disconnect(Some(ADDR)).await, vec![ADDR]);
        assert!(connector.link(&ADDR).unwrap().is_closed());
        assert!(manager.disconnect(Some(ADDR)).await.is_empty());
        assert!(manager.is_connected(&other));

        assert_eq!(manager.disconnect(None).await, vec![other]);
        assert!(manager.connected_addresses().is_empty());
    }

    #[tokio::test]
    async fn test_write_paths() {
        let connector = Arc::new(MockConnector::accepting_on(1));
        let manager = manager(&connector);

        let err = manager.write(&ADDR, b"Hi").await.unwrap_err();
        assert!(matches!(err, BridgeError::NotConnected(_)));

        manager.connect(ADDR).await.unwrap();
        let err = manager.write(&ADDR, b"").await.unwrap_err();
        assert!(matches!(err, BridgeError::EmptyPayload));

        assert_eq!(manager.write(&ADDR, &[72, 105]).await.unwrap(), 2);
        assert_eq!(connector.link(&ADDR).unwrap().sent(), b"Hi");
    }

    #[tokio::test]
    async fn test_partial_write_counts_as_success() {
        let connector = Arc::new(MockConnector::accepting_on(1));
        let manager = manager(&connector);
        manager.connect(ADDR).await.unwrap();

        let link = connector.link(&ADDR).unwrap();
        link.limit_send(3);
        assert_eq!(manager.write(&ADDR, b"abcdef").await.unwrap(), 3);
        assert_eq!(link.sent(), b"abc");

        link.limit_send(0);
        let err = manager.write(&ADDR, b"xyz").await.unwrap_err();
        assert!(matches!(err, BridgeError::NothingSent { len: 3 }));
    }
}
