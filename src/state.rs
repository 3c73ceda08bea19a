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

//! Shared listening state.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::bluetooth::DeviceAddress;

/// Identifies one start-to-stop lifetime of a receive loop.
pub type SessionId = u64;

/// Devices that currently have a live receive loop.
///
/// Each registration gets a fresh [`SessionId`]. A loop keeps running only
/// while its own session is the registered one, so a loop left over from a
/// cancel followed by a quick re-listen stops instead of running twice.
#[derive(Debug, Default)]
pub struct ListeningSet {
    sessions: Mutex<HashMap<DeviceAddress, SessionId>>,
    next_session: AtomicU64,
}

impl ListeningSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `address`. Returns `None` if it is already listening.
    pub fn begin(&self, address: DeviceAddress) -> Option<SessionId> {
        let mut sessions = self.sessions.lock();
        if sessions.contains_key(&address) {
            return None;
        }
        let session = self.next_session.fetch_add(1, Ordering::Relaxed);
        sessions.insert(address, session);
        Some(session)
    }

    pub fn is_listening(&self, address: &DeviceAddress) -> bool {
        self.sessions.lock().contains_key(address)
    }

    /// Whether `session` is still the registered one for `address`.
    pub fn is_current(&self, address: &DeviceAddress, session: SessionId) -> bool {
        self.sessions.lock().get(address) == Some(&session)
    }

    /// Unregister `address` whatever its session. Returns whether it was present.
    pub fn remove(&self, address: &DeviceAddress) -> bool {
        self.sessions.lock().remove(address).is_some()
    }

    /// Unregister `address` only if `session` is still current.
    pub fn end(&self, address: &DeviceAddress, session: SessionId) -> bool {
        let mut sessions = self.sessions.lock();
        if sessions.get(address) == Some(&session) {
            sessions.remove(address);
            true
        } else {
            false
        }
    }

    pub fn clear(&self) {
        self.sessions.lock().clear();
    }
}
