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

//! Host-facing facade.
//!
//! Every operation takes the address as text, as the host sends it, and
//! collapses failures to `false`, `0` or an empty payload after logging
//! them. [`Bridge::handle`] maps method names onto these operations.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::bluetooth::{
    BluerConnector, BluezDirectory, ConnectOutcome, ConnectionManager, DeviceAddress,
    DeviceDirectory, DeviceInfo, RfcommConnector, StreamController,
};
use crate::config::Config;
use crate::error::{BridgeError, Result};
use crate::events::{BridgeEvent, EventBus};
use crate::protocol::{MethodCall, MethodResponse, Reply};

/// Platform string reported by `getPlatformVersion`.
pub const PLATFORM_VERSION: &str = "Linux";

/// Owns connections, receive loops and the adapter directory.
pub struct Bridge {
    connections: Arc<ConnectionManager>,
    streams: StreamController,
    directory: Arc<dyn DeviceDirectory>,
    events: EventBus,
    scan_duration: Duration,
}

impl Bridge {
    pub fn new(
        config: &Config,
        connector: Arc<dyn RfcommConnector>,
        directory: Arc<dyn DeviceDirectory>,
    ) -> Self {
        let events = EventBus::new();
        let connections = Arc::new(ConnectionManager::new(connector, config.rfcomm.channels()));
        let streams = StreamController::new(connections.clone(), events.clone(), &config.stream);

        Self {
            connections,
            streams,
            directory,
            events,
            scan_duration: config.discovery.scan_duration(),
        }
    }

    /// Bridge backed by BlueZ and real RFCOMM sockets.
    pub async fn with_bluez(config: &Config) -> Result<Self> {
        let connector = Arc::new(BluerConnector::new(config.rfcomm.connect_timeout()));
        let directory = Arc::new(BluezDirectory::new().await?);
        Ok(Self::new(config, connector, directory))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events.subscribe()
    }

    pub fn streams(&self) -> &StreamController {
        &self.streams
    }

    fn parse_address(address: &str) -> Result<DeviceAddress> {
        address
            .parse()
            .map_err(|_| BridgeError::InvalidAddress(address.to_string()))
    }

    fn log_failure(operation: &str, address: &str, e: &BridgeError) {
        if e.is_input_error() {
            debug!("{} {} rejected [{}]: {}", operation, address, e.error_code(), e);
        } else {
            warn!("{} {} failed [{}]: {}", operation, address, e.error_code(), e);
        }
    }

    /// Open an RFCOMM connection. True if connected afterwards.
    pub async fn connect(&self, address: &str) -> bool {
        let result = match Self::parse_address(address) {
            Ok(device) => self.connections.connect(device).await.map(|o| (device, o)),
            Err(e) => Err(e),
        };

        match result {
            Ok((device, ConnectOutcome::Connected { .. })) => {
                self.events.emit(BridgeEvent::ConnectionChanged {
                    address: device,
                    connected: true,
                });
                true
            }
            Ok((_, ConnectOutcome::AlreadyConnected)) => true,
            Err(e) => {
                Self::log_failure("Connect", address, &e);
                false
            }
        }
    }

    /// Close one connection, or all of them when `address` is `None`.
    ///
    /// Listening and buffered data for the affected devices go with it.
    /// Unknown addresses still count as success; unparsable ones do not.
    pub async fn disconnect(&self, address: Option<&str>) -> bool {
        let target = match address.map(Self::parse_address).transpose() {
            Ok(target) => target,
            Err(e) => {
                Self::log_failure("Disconnect", address.unwrap_or_default(), &e);
                return false;
            }
        };

        let removed = self.connections.disconnect(target).await;
        self.streams.teardown(target.as_ref());
        for device in removed {
            self.events.emit(BridgeEvent::ConnectionChanged {
                address: device,
                connected: false,
            });
        }
        true
    }

    pub fn is_connected(&self, address: &str) -> bool {
        Self::parse_address(address)
            .map(|device| self.connections.is_connected(&device))
            .unwrap_or(false)
    }

    /// Send bytes with one best-effort write.
    pub async fn write(&self, address: &str, data: &[u8]) -> bool {
        let result = match Self::parse_address(address) {
            Ok(device) => self.connections.write(&device, data).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(_) => true,
            Err(e) => {
                Self::log_failure("Write to", address, &e);
                false
            }
        }
    }

    /// Take everything buffered for the device.
    pub fn read(&self, address: &str) -> Vec<u8> {
        Self::parse_address(address)
            .map(|device| self.streams.read(&device))
            .unwrap_or_default()
    }

    pub fn available(&self, address: &str) -> usize {
        Self::parse_address(address)
            .map(|device| self.streams.available(&device))
            .unwrap_or(0)
    }

    pub fn flush(&self, address: &str) -> bool {
        match Self::parse_address(address) {
            Ok(device) => {
                self.streams.flush(&device);
                true
            }
            Err(e) => {
                Self::log_failure("Flush", address, &e);
                false
            }
        }
    }

    /// Start the receive loop. Must be called within a tokio runtime.
    pub fn listen(&self, address: &str) -> bool {
        match Self::parse_address(address) {
            Ok(device) => self.streams.start_listening(device),
            Err(e) => {
                Self::log_failure("Listen on", address, &e);
                false
            }
        }
    }

    pub fn cancel(&self, address: &str) -> bool {
        if let Ok(device) = Self::parse_address(address) {
            self.streams.cancel_listening(&device);
        }
        true
    }

    /// Stop listening and drop buffered bytes. The connection stays open.
    pub fn close(&self, address: &str) -> bool {
        if let Ok(device) = Self::parse_address(address) {
            self.streams.close_channel(&device);
        }
        true
    }

    /// Devices this bridge currently holds a connection to.
    pub fn connected_devices(&self) -> Vec<DeviceInfo> {
        self.connections
            .connected_addresses()
            .into_iter()
            .map(|address| DeviceInfo::classic(address.to_string(), address, true))
            .collect()
    }

    /// Log a call rejected before reaching any device and report `false`.
    fn reject(call: &MethodCall, e: BridgeError) -> bool {
        Self::log_failure(&call.method, "call", &e);
        false
    }

    /// Run one method call.
    ///
    /// Returns `None` for method names the bridge does not know.
    pub async fn handle(&self, call: &MethodCall) -> Option<Reply> {
        // A malformed address argument never widens to "every device".
        let (address, malformed) = match call.address() {
            Ok(address) => (address, None),
            Err(e) => (None, Some(e)),
        };

        let reply = match call.method.as_str() {
            "connect" => Reply::Bool(match (address, malformed) {
                (_, Some(e)) => Self::reject(call, e),
                (Some(address), None) => self.connect(address).await,
                (None, None) => Self::reject(call, BridgeError::MissingArgument("address")),
            }),
            "disconnect" => Reply::Bool(match malformed {
                Some(e) => Self::reject(call, e),
                None => self.disconnect(address).await,
            }),
            "isConnected" => Reply::Bool(address.is_some_and(|a| self.is_connected(a))),
            "writeData" => Reply::Bool(match (address, malformed, call.data()) {
                (_, Some(e), _) => Self::reject(call, e),
                (None, None, _) => Self::reject(call, BridgeError::MissingArgument("address")),
                (Some(_), None, None) if call.arg("data").is_some() => {
                    Self::reject(call, BridgeError::InvalidArgument("data"))
                }
                (Some(_), None, None) => Self::reject(call, BridgeError::MissingArgument("data")),
                (Some(address), None, Some(data)) => self.write(address, &data).await,
            }),
            "readData" => Reply::Bytes(address.map(|a| self.read(a)).unwrap_or_default()),
            "available" => Reply::Count(address.map_or(0, |a| self.available(a))),
            "flush" => Reply::Bool(address.is_some_and(|a| self.flush(a))),
            "listen" | "cancel" | "close" if malformed.is_some() => Reply::Bool(false),
            // Without an address there is no data channel to start.
            "listen" => Reply::Bool(address.map_or(true, |a| self.listen(a))),
            "cancel" => Reply::Bool(address.map_or(true, |a| self.cancel(a))),
            "close" => Reply::Bool(address.map_or(true, |a| self.close(a))),
            "isAvailable" | "isBluetoothSupported" => {
                Reply::Bool(self.directory.is_available().await)
            }
            "isEnabled" | "isBluetoothEnabled" => Reply::Bool(self.directory.is_enabled().await),
            "requestEnable" => Reply::Bool(match self.directory.request_enable().await {
                Ok(enabled) => enabled,
                Err(e) => {
                    warn!("Failed to enable adapter: {}", e);
                    false
                }
            }),
            "getPairedDevices" => Reply::Devices(match self.directory.paired_devices().await {
                Ok(devices) => devices,
                Err(e) => {
                    warn!("Failed to list paired devices: {}", e);
                    Vec::new()
                }
            }),
            "startDiscovery" => {
                Reply::Devices(match self.directory.discover(self.scan_duration).await {
                    Ok(devices) => devices,
                    Err(e) => {
                        warn!("Discovery failed: {}", e);
                        Vec::new()
                    }
                })
            }
            "stopDiscovery" | "destroy" | "finish" => Reply::Bool(true),
            "isDiscovering" => Reply::Bool(false),
            "getConnectedDevices" => Reply::Devices(self.connected_devices()),
            "getPlatformVersion" => Reply::Text(PLATFORM_VERSION.to_string()),
            other => {
                debug!("Unknown method: {}", other);
                return None;
            }
        };
        Some(reply)
    }

    /// Parse one protocol line, run it and build the response.
    pub async fn handle_line(&self, line: &str) -> MethodResponse {
        let call = match MethodCall::from_json(line) {
            Ok(call) => call,
            Err(e) => {
                warn!("Malformed request: {}", e);
                return MethodResponse::bad_request();
            }
        };

        match self.handle(&call).await {
            Some(reply) => MethodResponse::success(call.id, reply),
            None => MethodResponse::not_implemented(call.id),
        }
    }

    /// Stop every receive loop and close every connection.
    pub async fn shutdown(&self) {
        info!("Shutting down bridge");
        self.streams.shutdown().await;
        self.disconnect(None).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::StopReason;
    use crate::test_utils::{MockConnector, StaticDirectory};
    use serde_json::json;

    const ADDR: &str = "AA:BB:CC:DD:EE:FF";

    fn bridge_with(connector: Arc<MockConnector>) -> Bridge {
        let mut config = Config::default();
        config.stream.poll_interval_ms = 1;
        let devices = vec![DeviceInfo::classic(
            "HC-05",
            "98:D3:31:FB:12:34".parse().unwrap(),
            false,
        )];
        Bridge::new(&config, connector, Arc::new(StaticDirectory::new(devices)))
    }

    fn device() -> DeviceAddress {
        ADDR.parse().unwrap()
    }

    #[tokio::test]
    async fn test_connect_probes_past_refused_channel() {
        let connector = Arc::new(MockConnector::accepting_on(2));
        let bridge = bridge_with(connector.clone());

        assert!(bridge.connect(ADDR).await);
        assert!(bridge.is_connected(ADDR));
        assert!(bridge.is_connected("aa-bb-cc-dd-ee-ff"));
        assert_eq!(connector.attempted_channels(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_address() {
        let connector = Arc::new(MockConnector::accepting_on(1));
        let bridge = bridge_with(connector.clone());

        assert!(!bridge.connect("not-an-address").await);
        assert_eq!(connector.attempt_count(), 0);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_false() {
        let bridge = bridge_with(Arc::new(MockConnector::refusing_all()));
        assert!(!bridge.connect(ADDR).await);
        assert!(!bridge.is_connected(ADDR));
    }

    #[tokio::test]
    async fn test_disconnect_then_write_fails() {
        let bridge = bridge_with(Arc::new(MockConnector::accepting_on(1)));
        assert!(bridge.connect(ADDR).await);

        assert!(bridge.disconnect(Some(ADDR)).await);
        assert!(!bridge.is_connected(ADDR));
        assert!(!bridge.write(ADDR, b"Hi").await);

        // Unknown device is still a success.
        assert!(bridge.disconnect(Some(ADDR)).await);
        assert!(!bridge.disconnect(Some("zz")).await);
    }

    #[tokio::test]
    async fn test_write_then_read_echo() {
        let connector = Arc::new(MockConnector::accepting_on(1));
        let bridge = bridge_with(connector.clone());
        assert!(bridge.connect(ADDR).await);
        assert!(bridge.listen(ADDR));

        let link = connector.link(&device()).unwrap();
        assert!(bridge.write(ADDR, &[72, 105]).await);
        link.push_data(&link.sent());
        link.push_eof();

        assert_eq!(
            bridge.streams().wait_stopped(&device()).await,
            Some(StopReason::RemoteClosed)
        );
        assert_eq!(bridge.available(ADDR), 2);
        assert_eq!(bridge.read(ADDR), b"Hi");
        assert!(bridge.read(ADDR).is_empty());
        assert_eq!(bridge.available(ADDR), 0);
    }

    #[tokio::test]
    async fn test_remote_close_keeps_connection() {
        let connector = Arc::new(MockConnector::accepting_on(1));
        let bridge = bridge_with(connector.clone());
        assert!(bridge.connect(ADDR).await);
        assert!(bridge.listen(ADDR));

        let link = connector.link(&device()).unwrap();
        link.push_data(b"tail");
        link.push_eof();
        bridge.streams().wait_stopped(&device()).await;

        assert!(!bridge.streams().is_listening(&device()));
        assert!(bridge.is_connected(ADDR));
        assert_eq!(bridge.read(ADDR), b"tail");
    }

    #[tokio::test]
    async fn test_events_on_connect_and_disconnect() {
        let bridge = bridge_with(Arc::new(MockConnector::accepting_on(1)));
        let mut events = bridge.subscribe();

        assert!(bridge.connect(ADDR).await);
        assert!(bridge.connect(ADDR).await);
        assert!(bridge.disconnect(None).await);

        assert_eq!(
            events.recv().await.unwrap(),
            BridgeEvent::ConnectionChanged {
                address: device(),
                connected: true
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            BridgeEvent::ConnectionChanged {
                address: device(),
                connected: false
            }
        );
    }

    #[tokio::test]
    async fn test_dispatch_table() {
        let bridge = bridge_with(Arc::new(MockConnector::accepting_on(1)));
        let call = |method: &str| MethodCall::new(method).with_args(json!({ "address": ADDR }));

        assert_eq!(bridge.handle(&call("connect")).await, Some(Reply::Bool(true)));
        assert_eq!(bridge.handle(&call("isConnected")).await, Some(Reply::Bool(true)));
        assert_eq!(bridge.handle(&call("available")).await, Some(Reply::Count(0)));
        assert_eq!(bridge.handle(&call("readData")).await, Some(Reply::Bytes(vec![])));
        assert_eq!(bridge.handle(&call("flush")).await, Some(Reply::Bool(true)));

        let write = MethodCall::new("writeData").with_args(json!({ "address": ADDR, "data": [72, 105] }));
        assert_eq!(bridge.handle(&write).await, Some(Reply::Bool(true)));

        let listen = MethodCall::new("listen").with_args(json!({ "device": ADDR }));
        assert_eq!(bridge.handle(&listen).await, Some(Reply::Bool(true)));
        assert_eq!(bridge.handle(&MethodCall::new("listen")).await, Some(Reply::Bool(true)));
        assert_eq!(bridge.handle(&call("cancel")).await, Some(Reply::Bool(true)));
        assert_eq!(bridge.handle(&call("close")).await, Some(Reply::Bool(true)));

        assert_eq!(
            bridge.handle(&MethodCall::new("getPlatformVersion")).await,
            Some(Reply::Text("Linux".to_string()))
        );
        assert_eq!(bridge.handle(&MethodCall::new("isDiscovering")).await, Some(Reply::Bool(false)));
        assert_eq!(bridge.handle(&MethodCall::new("isEnabled")).await, Some(Reply::Bool(true)));
        assert_eq!(bridge.handle(&MethodCall::new("nope")).await, None);

        match bridge.handle(&MethodCall::new("getConnectedDevices")).await {
            Some(Reply::Devices(devices)) => {
                assert_eq!(devices.len(), 1);
                assert_eq!(devices[0].address, device());
                assert!(devices[0].is_connected);
            }
            other => panic!("unexpected reply: {:?}", other),
        }

        match bridge.handle(&MethodCall::new("getPairedDevices")).await {
            Some(Reply::Devices(devices)) => assert_eq!(devices[0].name, "HC-05"),
            other => panic!("unexpected reply: {:?}", other),
        }

        assert_eq!(bridge.handle(&MethodCall::new("disconnect")).await, Some(Reply::Bool(true)));
        assert_eq!(bridge.handle(&call("isConnected")).await, Some(Reply::Bool(false)));
    }

    #[tokio::test]
    async fn test_malformed_address_disconnects_nothing() {
        let bridge = bridge_with(Arc::new(MockConnector::accepting_on(1)));
        let other = "01:02:03:04:05:06";
        assert!(bridge.connect(ADDR).await);
        assert!(bridge.connect(other).await);

        let numeric = MethodCall::new("disconnect").with_args(json!({ "address": 42 }));
        assert_eq!(bridge.handle(&numeric).await, Some(Reply::Bool(false)));

        let response = bridge
            .handle_line(r#"{"id":5,"method":"disconnect","args":"oops"}"#)
            .await;
        assert_eq!(response, MethodResponse::success(Some(5), Reply::Bool(false)));

        assert!(bridge.is_connected(ADDR));
        assert!(bridge.is_connected(other));

        let listen = MethodCall::new("listen").with_args(json!({ "device": [1, 2] }));
        assert_eq!(bridge.handle(&listen).await, Some(Reply::Bool(false)));
        assert!(!bridge.streams().is_listening(&device()));
    }

    #[tokio::test]
    async fn test_missing_arguments_report_false() {
        let connector = Arc::new(MockConnector::accepting_on(1));
        let bridge = bridge_with(connector.clone());

        assert_eq!(bridge.handle(&MethodCall::new("connect")).await, Some(Reply::Bool(false)));
        assert_eq!(connector.attempt_count(), 0);

        assert!(bridge.connect(ADDR).await);
        let no_data = MethodCall::new("writeData").with_args(json!({ "address": ADDR }));
        assert_eq!(bridge.handle(&no_data).await, Some(Reply::Bool(false)));

        let bad_data =
            MethodCall::new("writeData").with_args(json!({ "address": ADDR, "data": true }));
        assert_eq!(bridge.handle(&bad_data).await, Some(Reply::Bool(false)));
        assert!(connector.link(&device()).unwrap().sent().is_empty());
    }

    #[tokio::test]
    async fn test_handle_line() {
        let bridge = bridge_with(Arc::new(MockConnector::accepting_on(1)));

        let response = bridge
            .handle_line(r#"{"id":3,"method":"getPlatformVersion"}"#)
            .await;
        assert_eq!(response.to_json().unwrap(), "{\"id\":3,\"result\":\"Linux\"}\n");

        let response = bridge.handle_line(r#"{"id":4,"method":"warp"}"#).await;
        assert_eq!(response, MethodResponse::not_implemented(Some(4)));

        let response = bridge.handle_line("{{{").await;
        assert_eq!(response, MethodResponse::bad_request());
    }
}
