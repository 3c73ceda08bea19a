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

//! Connection and listening state notifications.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::bluetooth::DeviceAddress;

/// Capacity of the event channel before slow subscribers start lagging.
const EVENT_CAPACITY: usize = 64;

/// Why a receive loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    /// Listening was cancelled or the channel closed.
    Cancelled,
    /// The connection was removed.
    Disconnected,
    /// The remote side closed the stream.
    RemoteClosed,
    /// A socket error other than would-block.
    ReceiveError,
}

/// Events emitted by the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum BridgeEvent {
    /// A device was connected or disconnected.
    ConnectionChanged {
        address: DeviceAddress,
        connected: bool,
    },
    /// A receive loop ended.
    ListeningStopped {
        address: DeviceAddress,
        reason: StopReason,
    },
}

/// Fan-out of [`BridgeEvent`]s. Sending with no subscribers is not an error.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BridgeEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a new event bus.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    /// Emit an event.
    pub fn emit(&self, event: BridgeEvent) {
        debug!("Event: {:?}", event);
        let _ = self.tx.send(event);
    }

    /// Subscribe to future events.
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.tx.subscribe()
    }
}
