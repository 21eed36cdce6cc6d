// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the connection manager.
//!
//! A single flat hierarchy covers parsing, configuration lookup, connector
//! I/O, and registry-level lifecycle failures. No exception-based control
//! flow crosses the `ConnectionManager` boundary: every public operation
//! returns a `Result`.

use thiserror::Error;

/// The error type for this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// A URI or parameter was malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The `ParameterResolver` failed to resolve a `brokerId`.
    #[error("configuration lookup failed: {0}")]
    ConfigLookupFailed(String),

    /// `Connector::setup_connection` rejected its parameters.
    #[error("bad connector parameters: {0}")]
    BadParameters(String),

    /// `Connector::connect` failed.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// `Connector::subscribe` failed.
    #[error("subscribe failed: {0}")]
    SubscribeFailed(String),

    /// `Connector::unsubscribe` failed.
    #[error("unsubscribe failed: {0}")]
    UnsubscribeFailed(String),

    /// `Connector::put` failed (after exhausting reconnect/backoff retries).
    #[error("publish failed: {0}")]
    PublishFailed(String),

    /// `Connector::disconnect` failed.
    #[error("disconnect failed: {0}")]
    DisconnectFailed(String),

    /// `Connector::reconnect` failed.
    #[error("reconnect failed: {0}")]
    ReconnectFailed(String),

    /// `getConnector` was called for a `brokerId` with no live connection.
    #[error("no such connection")]
    NoSuchConnection,

    /// `stopConnection` (or a facade `close`) referenced an unknown messenger.
    #[error("unknown messenger: {0}")]
    UnknownMessenger(String),

    /// Defensive invariant guard: a Connector was installed by another
    /// writer between `createConnectorAndConnect` completing and the
    /// installing thread re-checking the registry. The process-wide lock
    /// makes this unreachable in practice; see `ConnectionManager::start_connection`.
    #[error("concurrent connect race detected")]
    ConcurrentConnectRace,

    /// The underlying MQTT client reported an error.
    #[cfg(feature = "mqtt")]
    #[error("mqtt error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// An internal delivery channel was closed unexpectedly.
    #[error("channel closed: {0}")]
    ChannelClosed(String),
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
