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

//! Per-device receive buffers.
//!
//! One lock guards the whole table, so operations on unrelated devices
//! serialize against each other.

use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::debug;

use super::address::DeviceAddress;

/// Accumulating byte store keyed by device.
#[derive(Debug, Default)]
pub struct DataBuffer {
    inner: Mutex<HashMap<DeviceAddress, Vec<u8>>>,
}

impl DataBuffer {
    /// Create an empty buffer table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes for `address`.
    pub fn append(&self, address: DeviceAddress, data: &[u8]) {
        let mut table = self.inner.lock();
        table.entry(address).or_default().extend_from_slice(data);
    }

    /// Take everything buffered for `address`, leaving it empty.
    pub fn take(&self, address: &DeviceAddress) -> Vec<u8> {
        let mut table = self.inner.lock();
        let data = table.get_mut(address).map(std::mem::take).unwrap_or_default();
        if !data.is_empty() {
            debug!("Drained {} bytes for {}", data.len(), address);
        }
        data
    }

    /// Number of buffered bytes for `address`.
    pub fn len(&self, address: &DeviceAddress) -> usize {
        self.inner.lock().get(address).map_or(0, Vec::len)
    }

    /// Whether nothing is buffered for `address`.
    pub fn is_empty(&self, address: &DeviceAddress) -> bool {
        self.len(address) == 0
    }

    /// Drop buffered bytes for `address`. Unknown addresses are ignored.
    pub fn clear(&self, address: &DeviceAddress) {
        if let Some(data) = self.inner.lock().get_mut(address) {
            data.clear();
        }
    }

    /// Remove the entry for `address`.
    pub fn remove(&self, address: &DeviceAddress) {
        self.inner.lock().remove(address);
    }

    /// Remove every entry.
    pub fn remove_all(&self) {
        self.inner.lock().clear();
    }

    /// Whether an entry exists for `address`, empty or not.
    pub fn contains(&self, address: &DeviceAddress) -> bool {
        self.inner.lock().contains_key(address)
    }
}
