// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `Connector` capability contract: one physical wire-protocol
//! connection, shared by every messenger addressing the same broker.

#[cfg(feature = "mqtt")]
pub mod mqtt;

pub mod fake;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::messenger_id::MessengerId;
use crate::parameters::ConnectionParameters;

/// A message delivered to a consumer, or handed to a producer for sending.
#[derive(Debug, Clone)]
pub struct Message {
    /// The destination address (`/queue/<name>` or `/topic/<name>`) the
    /// message was received on or is being sent to.
    pub destination: String,
    /// The raw message body.
    pub body: Vec<u8>,
    /// When this message was received by the connector. Unused for
    /// outbound `put` calls.
    pub received_at: DateTime<Utc>,
}

impl Message {
    /// Builds an outbound message with no timestamp semantics attached;
    /// `received_at` is populated by the connector that accepts delivery.
    #[must_use]
    pub fn new(destination: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            destination: destination.into(),
            body: body.into(),
            received_at: Utc::now(),
        }
    }
}

/// A callback invoked by a `Connector` for every message delivered to a
/// subscribed destination, in addition to (or instead of) buffered pull via
/// `Connector::get`.
pub type DeliveryCallback = Arc<dyn Fn(Message) + Send + Sync>;

/// One physical wire-protocol connection to a logical broker.
///
/// A `Connector` is created once per `brokerId` and shared by every
/// messenger subscribed or publishing to that broker; `ConnectionManager`
/// is the only caller that invokes `setup_connection`/`connect`/
/// `subscribe`/`unsubscribe`/`disconnect` — those all happen under its
/// single process-wide lock. `put`/`get` are called directly by messenger
/// facades, bypassing the lock entirely, since they do not mutate shared
/// registry state.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Validates and stores `params` without opening a transport connection.
    ///
    /// # Errors
    ///
    /// Returns `Error::BadParameters` if `params` are not usable by this
    /// connector implementation.
    async fn setup_connection(&self, params: &ConnectionParameters) -> Result<()>;

    /// Opens the transport connection established by `setup_connection`.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConnectFailed` on transport or handshake failure.
    async fn connect(&self) -> Result<()>;

    /// Subscribes `messenger_id` to `destination`, so that messages arriving
    /// there become visible to `get(destination, messenger_id)`.
    ///
    /// # Errors
    ///
    /// Returns `Error::SubscribeFailed` if the broker rejects the
    /// subscription.
    async fn subscribe(&self, destination: &str, messenger_id: &MessengerId) -> Result<()>;

    /// Reverses a prior `subscribe`.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsubscribeFailed` if the broker rejects the
    /// unsubscription. Per the data model, this failure does not prevent
    /// the caller from still removing `messenger_id` from the registry.
    async fn unsubscribe(&self, destination: &str, messenger_id: &MessengerId) -> Result<()>;

    /// Sends `message` to its destination. Does not require the registry
    /// lock.
    ///
    /// # Errors
    ///
    /// Returns `Error::PublishFailed` if delivery could not be completed.
    async fn put(&self, message: Message) -> Result<()>;

    /// Returns the next buffered message for `(destination, messenger_id)`,
    /// or `None` if none is currently available. Does not require the
    /// registry lock.
    async fn get(&self, destination: &str, messenger_id: &MessengerId) -> Option<Message>;

    /// Closes the physical connection. Called once, when the last messenger
    /// on this broker is removed.
    ///
    /// # Errors
    ///
    /// Returns `Error::DisconnectFailed` on transport failure.
    async fn disconnect(&self) -> Result<()>;

    /// Forces re-negotiation of the transport connection. Not called by
    /// `ConnectionManager` during normal operation; available for callers
    /// (and test doubles) that need to observe or force reconnection
    /// explicitly, kept distinct from `connect`.
    ///
    /// # Errors
    ///
    /// Returns `Error::ReconnectFailed` on transport failure.
    async fn reconnect(&self) -> Result<()>;
}

impl fmt::Debug for dyn Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn Connector")
    }
}

/// Constructs fresh `Connector` instances for `ConnectionManager`.
///
/// Injected so the manager is not hard-wired to a single wire protocol;
/// `ConnectionManager::global()` is wired to an `MqttConnectorFactory`, but
/// any factory (including one producing `FakeConnector`s) can drive the
/// same manager in tests.
pub trait ConnectorFactory: Send + Sync {
    /// Builds a new, not-yet-connected `Connector`.
    fn create(&self) -> Arc<dyn Connector>;
}
