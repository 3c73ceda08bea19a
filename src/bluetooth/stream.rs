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

//! Listening lifecycle and buffered reads.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::address::DeviceAddress;
use super::buffer::DataBuffer;
use super::connection::ConnectionManager;
use super::receiver::ReceiveLoop;
use crate::config::StreamConfig;
use crate::events::{EventBus, StopReason};
use crate::state::ListeningSet;

/// Starts and stops receive loops and serves the buffered data.
pub struct StreamController {
    connections: Arc<ConnectionManager>,
    listening: Arc<ListeningSet>,
    buffer: Arc<DataBuffer>,
    events: EventBus,
    poll_interval: Duration,
    chunk_size: usize,
    tasks: Mutex<HashMap<DeviceAddress, JoinHandle<StopReason>>>,
}

impl StreamController {
    pub fn new(connections: Arc<ConnectionManager>, events: EventBus, config: &StreamConfig) -> Self {
        Self {
            connections,
            listening: Arc::new(ListeningSet::new()),
            buffer: Arc::new(DataBuffer::new()),
            events,
            poll_interval: config.poll_interval(),
            chunk_size: config.read_chunk_size,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Start a receive loop for `address`.
    ///
    /// Returns `true` if a loop is running afterwards (including one that
    /// was already running) and `false` if the device is not connected.
    /// Must be called from within a tokio runtime.
    pub fn start_listening(&self, address: DeviceAddress) -> bool {
        if self.listening.is_listening(&address) {
            debug!("Already listening on {}", address);
            return true;
        }

        let Some(link) = self.connections.link(&address) else {
            warn!("Cannot start listening - {} not connected", address);
            return false;
        };

        self.buffer.clear(&address);

        let Some(session) = self.listening.begin(address) else {
            return true;
        };

        link.set_nonblocking(true);

        let receive_loop = ReceiveLoop {
            address,
            session,
            link,
            connections: self.connections.clone(),
            listening: self.listening.clone(),
            buffer: self.buffer.clone(),
            events: self.events.clone(),
            poll_interval: self.poll_interval,
            chunk_size: self.chunk_size,
        };
        let handle = tokio::spawn(receive_loop.run());
        self.tasks.lock().insert(address, handle);

        info!("Listening for data from {}", address);
        true
    }

    /// Stop listening. Buffered data and the connection are untouched.
    pub fn cancel_listening(&self, address: &DeviceAddress) {
        if self.listening.remove(address) {
            info!("Cancelled listening on {}", address);
        }
    }

    /// Stop listening and drop the buffer. The connection stays open.
    pub fn close_channel(&self, address: &DeviceAddress) {
        self.listening.remove(address);
        self.buffer.remove(address);
        info!("Closed data channel for {}", address);
    }

    /// Remove listening and buffer state for one device, or for all.
    pub fn teardown(&self, address: Option<&DeviceAddress>) {
        match address {
            Some(address) => self.close_channel(address),
            None => {
                self.listening.clear();
                self.buffer.remove_all();
                info!("Closed all data channels");
            }
        }
    }

    pub fn is_listening(&self, address: &DeviceAddress) -> bool {
        self.listening.is_listening(address)
    }

    /// Wait for the most recently started loop of `address` to finish.
    ///
    /// Returns `None` if no loop was started since the last wait.
    pub async fn wait_stopped(&self, address: &DeviceAddress) -> Option<StopReason> {
        let handle = self.tasks.lock().remove(address)?;
        handle.await.ok()
    }

    /// Tear everything down and wait for every loop to finish.
    pub async fn shutdown(&self) {
        self.teardown(None);
        let handles: Vec<_> = self.tasks.lock().drain().map(|(_, h)| h).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Take everything buffered for `address`.
    pub fn read(&self, address: &DeviceAddress) -> Vec<u8> {
        self.buffer.take(address)
    }

    /// Buffered byte count for `address`.
    pub fn available(&self, address: &DeviceAddress) -> usize {
        self.buffer.len(address)
    }

    /// Discard buffered bytes for `address`.
    pub fn flush(&self, address: &DeviceAddress) {
        self.buffer.clear(address);
    }
}
