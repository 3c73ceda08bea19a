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

//! In-memory transports for exercising the bridge without a radio.
//!
//! [`MockConnector`] answers each channel with a scripted [`ProbeOutcome`]
//! and records every attempt. Accepted connections are [`MockLink`]s whose
//! inbound side is fed by the test and whose outbound bytes are captured.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::bluetooth::{DeviceAddress, DeviceDirectory, DeviceInfo, RfcommConnector, RfcommLink};
use crate::error::Result;

/// How a mock channel answers a connect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Accept,
    Refuse,
    TimeOut,
    Fail(io::ErrorKind),
}

/// Scripted RFCOMM connector.
#[derive(Debug)]
pub struct MockConnector {
    outcomes: Mutex<HashMap<u8, ProbeOutcome>>,
    fallback: ProbeOutcome,
    attempts: Mutex<Vec<(DeviceAddress, u8)>>,
    links: Mutex<HashMap<DeviceAddress, MockLink>>,
}

impl MockConnector {
    /// Every channel answers with `fallback` unless overridden.
    pub fn new(fallback: ProbeOutcome) -> Self {
        Self {
            outcomes: Mutex::new(HashMap::new()),
            fallback,
            attempts: Mutex::new(Vec::new()),
            links: Mutex::new(HashMap::new()),
        }
    }

    /// Only `channel` accepts; every other channel refuses.
    pub fn accepting_on(channel: u8) -> Self {
        let connector = Self::new(ProbeOutcome::Refuse);
        connector.set_outcome(channel, ProbeOutcome::Accept);
        connector
    }

    pub fn refusing_all() -> Self {
        Self::new(ProbeOutcome::Refuse)
    }

    pub fn set_outcome(&self, channel: u8, outcome: ProbeOutcome) {
        self.outcomes.lock().insert(channel, outcome);
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().len()
    }

    /// Channels tried, in order, across all devices.
    pub fn attempted_channels(&self) -> Vec<u8> {
        self.attempts.lock().iter().map(|(_, channel)| *channel).collect()
    }

    /// The most recent link handed out for `address`.
    pub fn link(&self, address: &DeviceAddress) -> Option<MockLink> {
        self.links.lock().get(address).cloned()
    }
}

#[async_trait]
impl RfcommConnector for MockConnector {
    async fn connect(
        &self,
        address: DeviceAddress,
        channel: u8,
    ) -> io::Result<Box<dyn RfcommLink>> {
        self.attempts.lock().push((address, channel));

        let outcome = self
            .outcomes
            .lock()
            .get(&channel)
            .copied()
            .unwrap_or(self.fallback);

        match outcome {
            ProbeOutcome::Accept => {
                let link = MockLink::new();
                self.links.lock().insert(address, link.clone());
                Ok(Box::new(link))
            }
            ProbeOutcome::Refuse => Err(io::ErrorKind::ConnectionRefused.into()),
            ProbeOutcome::TimeOut => Err(io::ErrorKind::TimedOut.into()),
            ProbeOutcome::Fail(kind) => Err(kind.into()),
        }
    }
}

#[derive(Debug)]
enum Inbound {
    Data(Vec<u8>),
    Eof,
    Error(io::ErrorKind),
}

#[derive(Debug, Default)]
struct LinkState {
    inbound: Mutex<VecDeque<Inbound>>,
    sent: Mutex<Vec<u8>>,
    send_limit: Mutex<Option<usize>>,
    nonblocking: AtomicBool,
    closed: AtomicBool,
}

/// In-memory RFCOMM stream. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct MockLink {
    state: Arc<LinkState>,
}

impl MockLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes for the next receive.
    pub fn push_data(&self, data: &[u8]) {
        self.state
            .inbound
            .lock()
            .push_back(Inbound::Data(data.to_vec()));
    }

    /// Queue an orderly remote close.
    pub fn push_eof(&self) {
        self.state.inbound.lock().push_back(Inbound::Eof);
    }

    /// Queue a receive error.
    pub fn push_error(&self, kind: io::ErrorKind) {
        self.state.inbound.lock().push_back(Inbound::Error(kind));
    }

    /// Make every later send accept at most `limit` bytes.
    pub fn limit_send(&self, limit: usize) {
        *self.state.send_limit.lock() = Some(limit);
    }

    /// Everything the bridge has sent so far.
    pub fn sent(&self) -> Vec<u8> {
        self.state.sent.lock().clone()
    }

    pub fn is_nonblocking(&self) -> bool {
        self.state.nonblocking.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::Acquire)
    }

    fn next_inbound(&self, buf: &mut [u8]) -> Option<io::Result<usize>> {
        let mut inbound = self.state.inbound.lock();
        let result = match inbound.pop_front()? {
            Inbound::Data(mut data) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    inbound.push_front(Inbound::Data(data.split_off(n)));
                }
                Ok(n)
            }
            Inbound::Eof => {
                inbound.push_front(Inbound::Eof);
                Ok(0)
            }
            Inbound::Error(kind) => Err(kind.into()),
        };
        Some(result)
    }
}

#[async_trait]
impl RfcommLink for MockLink {
    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.is_closed() {
                return Err(io::ErrorKind::NotConnected.into());
            }
            if let Some(result) = self.next_inbound(buf) {
                return result;
            }
            if self.is_nonblocking() {
                return Err(io::ErrorKind::WouldBlock.into());
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    async fn send(&self, data: &[u8]) -> io::Result<usize> {
        if self.is_closed() {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        let limit = self.state.send_limit.lock().unwrap_or(usize::MAX);
        let n = data.len().min(limit);
        self.state.sent.lock().extend_from_slice(&data[..n]);
        Ok(n)
    }

    fn set_nonblocking(&self, nonblocking: bool) {
        self.state.nonblocking.store(nonblocking, Ordering::Release);
    }

    async fn close(&self) -> io::Result<()> {
        self.state.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Device directory with a fixed device list.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    pub powered: bool,
    pub devices: Vec<DeviceInfo>,
}

impl StaticDirectory {
    pub fn new(devices: Vec<DeviceInfo>) -> Self {
        Self {
            powered: true,
            devices,
        }
    }
}

#[async_trait]
impl DeviceDirectory for StaticDirectory {
    async fn is_available(&self) -> bool {
        true
    }

    async fn is_enabled(&self) -> bool {
        self.powered
    }

    async fn request_enable(&self) -> Result<bool> {
        Ok(self.powered)
    }

    async fn paired_devices(&self) -> Result<Vec<DeviceInfo>> {
        Ok(self.devices.clone())
    }

    async fn discover(&self, _duration: Duration) -> Result<Vec<DeviceInfo>> {
        Ok(self.devices.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_link_splits_large_chunks() {
        let link = MockLink::new();
        link.set_nonblocking(true);
        link.push_data(b"abcdef");

        let mut buf = [0u8; 4];
        assert_eq!(link.recv(&mut buf).await.unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(link.recv(&mut buf).await.unwrap(), 2);
        assert_eq!(&buf[..2], b"ef");

        let err = link.recv(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[tokio::test]
    async fn test_mock_link_eof_is_sticky() {
        let link = MockLink::new();
        link.push_eof();

        let mut buf = [0u8; 8];
        assert_eq!(link.recv(&mut buf).await.unwrap(), 0);
        assert_eq!(link.recv(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mock_connector_records_attempts() {
        let connector = MockConnector::accepting_on(2);
        let addr = DeviceAddress::new([1; 6]);

        assert!(connector.connect(addr, 1).await.is_err());
        assert!(connector.connect(addr, 2).await.is_ok());
        assert_eq!(connector.attempted_channels(), vec![1, 2]);
        assert!(connector.link(&addr).is_some());
    }
}
