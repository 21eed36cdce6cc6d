// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! An in-memory `Connector` test double.
//!
//! Stands in for a real STOMP/MQTT client so `ConnectionManager` lifecycle
//! logic can be exercised without a live broker: no network I/O,
//! deterministic buffering, and call counters so tests can assert on what
//! was invoked and how often (in particular, that `reconnect` is *not*
//! called during a healthy lifecycle).

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::connector::{Connector, ConnectorFactory, Message};
use crate::error::{Error, Result};
use crate::messenger_id::MessengerId;
use crate::parameters::ConnectionParameters;

#[derive(Default)]
struct Counters {
    setup_connection: AtomicUsize,
    connect: AtomicUsize,
    subscribe: AtomicUsize,
    unsubscribe: AtomicUsize,
    put: AtomicUsize,
    get: AtomicUsize,
    disconnect: AtomicUsize,
    reconnect: AtomicUsize,
}

/// Per-`(destination, messenger_id)` key used for the fake's buffers.
type BufferKey = (String, String);

/// A `Connector` that keeps everything in memory and never touches the
/// network. Useful both for this crate's own tests and as a building block
/// for downstream integration tests that want to drive a `ConnectionManager`
/// deterministically.
pub struct FakeConnector {
    counters: Counters,
    fail_connect: AtomicU32,
    fail_reconnect: AtomicU32,
    buffers: Mutex<HashMap<BufferKey, VecDeque<Message>>>,
}

impl Default for FakeConnector {
    fn default() -> Self {
        Self {
            counters: Counters::default(),
            fail_connect: AtomicU32::new(0),
            fail_reconnect: AtomicU32::new(0),
            buffers: Mutex::new(HashMap::new()),
        }
    }
}

impl FakeConnector {
    /// A fresh connector with all counters at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` calls to `connect` fail with `Error::ConnectFailed`,
    /// for exercising `ConnectionManager`'s rollback path.
    pub fn fail_next_connects(&self, n: u32) {
        self.fail_connect.store(n, Ordering::SeqCst);
    }

    /// Makes the next `n` calls to `reconnect` fail with
    /// `Error::ReconnectFailed`, for exercising callers that force
    /// re-negotiation explicitly.
    pub fn fail_next_reconnects(&self, n: u32) {
        self.fail_reconnect.store(n, Ordering::SeqCst);
    }

    /// Pushes a message directly into a destination's buffer, simulating an
    /// inbound delivery from the broker, without going through `put`.
    pub fn deliver(&self, destination: &str, messenger_id: &MessengerId, message: Message) {
        let key = (destination.to_string(), messenger_id.to_string());
        self.buffers
            .lock()
            .entry(key)
            .or_default()
            .push_back(message);
    }

    /// Number of times `connect` has been called.
    #[must_use]
    pub fn connect_calls(&self) -> usize {
        self.counters.connect.load(Ordering::SeqCst)
    }

    /// Number of times `subscribe` has been called.
    #[must_use]
    pub fn subscribe_calls(&self) -> usize {
        self.counters.subscribe.load(Ordering::SeqCst)
    }

    /// Number of times `unsubscribe` has been called.
    #[must_use]
    pub fn unsubscribe_calls(&self) -> usize {
        self.counters.unsubscribe.load(Ordering::SeqCst)
    }

    /// Number of times `put` has been called.
    #[must_use]
    pub fn put_calls(&self) -> usize {
        self.counters.put.load(Ordering::SeqCst)
    }

    /// Number of times `disconnect` has been called.
    #[must_use]
    pub fn disconnect_calls(&self) -> usize {
        self.counters.disconnect.load(Ordering::SeqCst)
    }

    /// Number of times `reconnect` has been called. Tests assert this stays
    /// at zero across a normal lifecycle.
    #[must_use]
    pub fn reconnect_calls(&self) -> usize {
        self.counters.reconnect.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn setup_connection(&self, _params: &ConnectionParameters) -> Result<()> {
        self.counters
            .setup_connection
            .fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn connect(&self) -> Result<()> {
        self.counters.connect.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fail_connect.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_connect.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::ConnectFailed(
                "fake connector: forced failure".to_string(),
            ));
        }
        Ok(())
    }

    async fn subscribe(&self, destination: &str, messenger_id: &MessengerId) -> Result<()> {
        self.counters.subscribe.fetch_add(1, Ordering::SeqCst);
        let key = (destination.to_string(), messenger_id.to_string());
        self.buffers.lock().entry(key).or_default();
        Ok(())
    }

    async fn unsubscribe(&self, destination: &str, messenger_id: &MessengerId) -> Result<()> {
        self.counters.unsubscribe.fetch_add(1, Ordering::SeqCst);
        let key = (destination.to_string(), messenger_id.to_string());
        self.buffers.lock().remove(&key);
        Ok(())
    }

    async fn put(&self, message: Message) -> Result<()> {
        self.counters.put.fetch_add(1, Ordering::SeqCst);
        let mut buffers = self.buffers.lock();
        for (key, queue) in buffers.iter_mut() {
            if key.0 == message.destination {
                queue.push_back(message.clone());
            }
        }
        Ok(())
    }

    async fn get(&self, destination: &str, messenger_id: &MessengerId) -> Option<Message> {
        self.counters.get.fetch_add(1, Ordering::SeqCst);
        let key = (destination.to_string(), messenger_id.to_string());
        self.buffers
            .lock()
            .get_mut(&key)
            .and_then(VecDeque::pop_front)
    }

    async fn disconnect(&self) -> Result<()> {
        self.counters.disconnect.fetch_add(1, Ordering::SeqCst);
        self.buffers.lock().clear();
        Ok(())
    }

    async fn reconnect(&self) -> Result<()> {
        self.counters.reconnect.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fail_reconnect.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_reconnect.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::ReconnectFailed(
                "fake connector: forced failure".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builds a fresh `FakeConnector` per `brokerId`, for driving a
/// `ConnectionManager` in tests without any real transport.
#[derive(Default)]
pub struct FakeConnectorFactory;

impl FakeConnectorFactory {
    /// A new factory.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ConnectorFactory for FakeConnectorFactory {
    fn create(&self) -> Arc<dyn Connector> {
        Arc::new(FakeConnector::new())
    }
}
