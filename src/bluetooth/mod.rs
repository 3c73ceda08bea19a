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

//! Bluetooth Classic communication module.
//!
//! Handles RFCOMM client connections, per-device receive loops and the
//! buffers they fill.

mod address;
mod buffer;
mod connection;
mod discovery;
mod receiver;
mod stream;
mod transport;

pub use address::DeviceAddress;
pub use buffer::DataBuffer;
pub use connection::{ConnectOutcome, ConnectionManager};
pub use discovery::{BluezDirectory, DeviceDirectory, DeviceInfo, CLASSIC_DEVICE_TYPE};
pub use receiver::ReceiveLoop;
pub use stream::StreamController;
pub use transport::{
    is_retryable_probe_error, BluerConnector, BluerLink, RfcommConnector, RfcommLink,
};
