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

//! RFCOMM socket transport.
//!
//! [`RfcommConnector`] opens one stream to a device channel and
//! [`RfcommLink`] is the open stream. The BlueZ implementations are
//! [`BluerConnector`] and [`BluerLink`].

use async_trait::async_trait;
use bluer::rfcomm::stream::{OwnedReadHalf, OwnedWriteHalf};
use bluer::rfcomm::{Socket, SocketAddr, Stream};
use futures::FutureExt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::debug;

use super::address::DeviceAddress;

/// An open bidirectional RFCOMM byte stream.
#[async_trait]
pub trait RfcommLink: Send + Sync {
    /// Receive up to `buf.len()` bytes.
    ///
    /// `Ok(0)` means the remote closed the stream. In non-blocking mode an
    /// error of kind [`io::ErrorKind::WouldBlock`] means nothing is queued.
    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Single best-effort send. Returns how many bytes the transport took.
    async fn send(&self, data: &[u8]) -> io::Result<usize>;

    /// Switch receive between blocking and non-blocking mode.
    fn set_nonblocking(&self, nonblocking: bool);

    /// Shut the stream down.
    async fn close(&self) -> io::Result<()>;
}

/// Opens RFCOMM streams.
#[async_trait]
pub trait RfcommConnector: Send + Sync {
    /// Connect to `address` on a single RFCOMM `channel`.
    async fn connect(&self, address: DeviceAddress, channel: u8)
        -> io::Result<Box<dyn RfcommLink>>;
}

/// Whether a per-channel connect failure should move probing to the next channel.
pub fn is_retryable_probe_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionRefused | io::ErrorKind::TimedOut
    )
}

/// RFCOMM stream backed by a BlueZ socket.
pub struct BluerLink {
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
    nonblocking: AtomicBool,
}

impl BluerLink {
    /// Wrap a connected stream. Receives block until switched.
    pub fn new(stream: Stream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            nonblocking: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl RfcommLink for BluerLink {
    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut reader = self.reader.lock().await;

        if self.nonblocking.load(Ordering::Acquire) {
            // Poll the read exactly once; pending means no data queued.
            match reader.read(buf).now_or_never() {
                Some(result) => result,
                None => Err(io::ErrorKind::WouldBlock.into()),
            }
        } else {
            reader.read(buf).await
        }
    }

    async fn send(&self, data: &[u8]) -> io::Result<usize> {
        let mut writer = self.writer.lock().await;
        writer.write(data).await
    }

    fn set_nonblocking(&self, nonblocking: bool) {
        self.nonblocking.store(nonblocking, Ordering::Release);
    }

    async fn close(&self) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.shutdown().await
    }
}

/// Connector that opens BlueZ RFCOMM sockets.
#[derive(Debug, Clone, Default)]
pub struct BluerConnector {
    connect_timeout: Option<Duration>,
}

impl BluerConnector {
    /// Create a connector.
    ///
    /// With `connect_timeout` set, an attempt that takes longer fails with
    /// [`io::ErrorKind::TimedOut`].
    pub fn new(connect_timeout: Option<Duration>) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl RfcommConnector for BluerConnector {
    async fn connect(
        &self,
        address: DeviceAddress,
        channel: u8,
    ) -> io::Result<Box<dyn RfcommLink>> {
        let socket = Socket::new()?;
        let target = SocketAddr::new(address.into(), channel);
        debug!("Opening RFCOMM socket to {} channel {}", address, channel);

        let attempt = socket.connect(target);
        let stream = match self.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, attempt).await.map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect timed out after {:?}", limit),
                )
            })??,
            None => attempt.await?,
        };

        Ok(Box::new(BluerLink::new(stream)))
    }
}
