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

//! Per-connection background receive loop.

use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::address::DeviceAddress;
use super::buffer::DataBuffer;
use super::connection::ConnectionManager;
use super::transport::RfcommLink;
use crate::events::{BridgeEvent, EventBus, StopReason};
use crate::state::{ListeningSet, SessionId};

/// Received bytes shown in debug logs before truncating.
const PREVIEW_LEN: usize = 50;

/// Drains one connection into the shared buffer.
///
/// Stops when the connection is removed, its listening session ends, the
/// remote closes the stream, or a receive fails. Stopping unregisters the
/// session; the connection itself is left open.
pub struct ReceiveLoop {
    pub(crate) address: DeviceAddress,
    pub(crate) session: SessionId,
    pub(crate) link: Arc<dyn RfcommLink>,
    pub(crate) connections: Arc<ConnectionManager>,
    pub(crate) listening: Arc<ListeningSet>,
    pub(crate) buffer: Arc<DataBuffer>,
    pub(crate) events: EventBus,
    pub(crate) poll_interval: Duration,
    pub(crate) chunk_size: usize,
}

impl ReceiveLoop {
    /// Run until stopped, returning why.
    pub async fn run(self) -> StopReason {
        info!("Receive loop started for {}", self.address);

        let mut chunk = vec![0u8; self.chunk_size];
        let reason = loop {
            if !self.connections.is_connected(&self.address) {
                break StopReason::Disconnected;
            }
            if !self.listening.is_current(&self.address, self.session) {
                break StopReason::Cancelled;
            }

            match self.link.recv(&mut chunk).await {
                Ok(0) => {
                    info!("Connection closed by remote device {}", self.address);
                    break StopReason::RemoteClosed;
                }
                Ok(n) => {
                    self.buffer.append(self.address, &chunk[..n]);
                    debug!(
                        "Received {} bytes from {}: {}",
                        n,
                        self.address,
                        preview(&chunk[..n])
                    );
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    tokio::time::sleep(self.poll_interval).await;
                }
                Err(e) => {
                    warn!("Receive error on {}: {}", self.address, e);
                    break StopReason::ReceiveError;
                }
            }
        };

        self.listening.end(&self.address, self.session);
        info!("Receive loop for {} ended: {:?}", self.address, reason);
        self.events.emit(BridgeEvent::ListeningStopped {
            address: self.address,
            reason,
        });

        reason
    }
}

/// Printable ASCII as-is, other bytes as `[n]`.
fn preview(data: &[u8]) -> String {
    let mut out = String::new();
    for byte in data.iter().take(PREVIEW_LEN) {
        if (0x20..=0x7E).contains(byte) {
            out.push(*byte as char);
        } else {
            out.push_str(&format!("[{}]", byte));
        }
    }
    if data.len() > PREVIEW_LEN {
        out.push_str("...");
    }
    out
}
