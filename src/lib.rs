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

//! Bluetooth Classic serial bridge.
//!
//! Connects to remote devices over RFCOMM, buffers what they send in a
//! background receive loop per device, and exposes the whole thing to a
//! host application through named method calls.

pub mod bluetooth;
pub mod bridge;
pub mod config;
pub mod error;
pub mod events;
pub mod protocol;
pub mod state;
pub mod test_utils;

pub use bluetooth::DeviceAddress;
pub use bridge::Bridge;
pub use config::Config;
pub use error::{BridgeError, Result};
pub use events::{BridgeEvent, EventBus, StopReason};
