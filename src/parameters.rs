// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Broker configuration lookup.
//!
//! `ConnectionManager` never reads configuration itself; it asks a
//! [`ParameterResolver`] to turn a `brokerId` into [`ConnectionParameters`]
//! at `startConnection` time.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Whether the destination requires application-level acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Acknowledgement {
    /// The broker or transport handles delivery acknowledgement.
    Auto,
    /// The application must explicitly acknowledge each message.
    Client,
}

/// Everything a [`crate::connector::Connector`] needs to open a physical
/// connection to one logical broker.
///
/// `(De)serializable` via `serde` so a [`StaticParameterResolver`] can be
/// built from a JSON or TOML document, not only constructed programmatically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionParameters {
    /// Broker hostname or address.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// Optional virtual host / namespace.
    #[serde(default)]
    pub vhost: Option<String>,
    /// Authenticating username.
    #[serde(default)]
    pub user: Option<String>,
    /// Authenticating password.
    #[serde(default)]
    pub password: Option<String>,
    /// Destination acknowledgement mode.
    #[serde(default = "default_acknowledgement")]
    pub acknowledgement: Acknowledgement,
    /// Destinations this broker is expected to expose, informational only;
    /// `Connector` implementations may ignore it.
    #[serde(default)]
    pub queues: Vec<String>,
    /// See `queues`.
    #[serde(default)]
    pub topics: Vec<String>,
}

fn default_acknowledgement() -> Acknowledgement {
    Acknowledgement::Auto
}

/// Resolves a `brokerId` to the parameters needed to connect to it.
///
/// Implementations may read from a configuration service, a file, the
/// environment, or (as with [`StaticParameterResolver`]) an in-memory map.
/// Reaching an external configuration store is explicitly out of scope for
/// this crate; only the trait boundary is provided.
pub trait ParameterResolver: Send + Sync {
    /// Resolves `broker_id` to its connection parameters.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigLookupFailed` if `broker_id` is unknown.
    fn resolve(&self, broker_id: &str) -> Result<ConnectionParameters>;
}

/// An in-memory [`ParameterResolver`] backed by a `HashMap`.
///
/// This is the ambient, always-available resolver implementation: a real
/// deployment typically wraps a configuration service instead, but a crate
/// that only ships a trait is not independently testable or usable without
/// one, so a static map-backed resolver ships alongside the trait.
#[derive(Debug, Clone, Default)]
pub struct StaticParameterResolver {
    entries: HashMap<String, ConnectionParameters>,
}

impl StaticParameterResolver {
    /// An empty resolver; every `resolve` call fails until entries are added.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a resolver from a JSON document mapping `brokerId` to
    /// [`ConnectionParameters`].
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigLookupFailed` if `json` does not parse as
    /// `HashMap<String, ConnectionParameters>`.
    pub fn from_json(json: &str) -> Result<Self> {
        let entries: HashMap<String, ConnectionParameters> = serde_json::from_str(json)
            .map_err(|e| Error::ConfigLookupFailed(format!("invalid parameters document: {e}")))?;
        Ok(Self { entries })
    }

    /// Adds or replaces the parameters for `broker_id`, returning `self` for
    /// chaining.
    #[must_use]
    pub fn with_broker(
        mut self,
        broker_id: impl Into<String>,
        params: ConnectionParameters,
    ) -> Self {
        self.entries.insert(broker_id.into(), params);
        self
    }
}

impl ParameterResolver for StaticParameterResolver {
    fn resolve(&self, broker_id: &str) -> Result<ConnectionParameters> {
        self.entries.get(broker_id).cloned().ok_or_else(|| {
            Error::ConfigLookupFailed(format!("no parameters registered for broker: {broker_id}"))
        })
    }
}
