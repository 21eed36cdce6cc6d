// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The producer facade: `put` and `close` over a shared `Connector`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::connector::Message;
use crate::error::{Error, Result};
use crate::manager::ConnectionManager;
use crate::messenger_id::{MessengerId, Role};
use crate::parameters::ConnectionParameters;
use crate::uri::EndpointUri;

/// A handle bound to one `(brokerId, destination)` that publishes
/// messages through whichever `Connector` the `ConnectionManager` has
/// live for that broker.
///
/// `Producer` holds no `Connector` reference of its own; every `put` asks
/// the manager for the current one, so a reconnect installing a fresh
/// `Connector` under the same `brokerId` is transparent to already-open
/// facades.
pub struct Producer {
    manager: Arc<ConnectionManager>,
    uri: EndpointUri,
    id: MessengerId,
    closed: AtomicBool,
}

impl Producer {
    /// Opens a producer at `uri`, allocating a new `MessengerId` and, if
    /// necessary, creating the underlying `Connector`.
    ///
    /// # Errors
    ///
    /// Propagates `ConnectionManager::start_connection`'s errors
    /// (`ConnectFailed`, `BadParameters`, `ConcurrentConnectRace`, …).
    pub async fn open(
        manager: Arc<ConnectionManager>,
        uri: EndpointUri,
        params: &ConnectionParameters,
    ) -> Result<Self> {
        let id = manager
            .start_connection(&uri, params, Role::Producer)
            .await?;
        Ok(Self {
            manager,
            uri,
            id,
            closed: AtomicBool::new(false),
        })
    }

    /// This producer's messenger identity.
    #[must_use]
    pub fn id(&self) -> &MessengerId {
        &self.id
    }

    /// Sends `body` to this producer's destination.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoSuchConnection` if `close` has already been
    /// called, otherwise propagates the `Connector`'s `PublishFailed`.
    pub async fn put(&self, body: impl Into<Vec<u8>>) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::NoSuchConnection);
        }
        let connector = self.manager.get_connector(self.uri.broker_id()).await?;
        connector
            .put(Message::new(self.uri.destination_address(), body.into()))
            .await
    }

    /// Closes this producer, releasing its `MessengerId` and, if it was
    /// the broker's last messenger, disconnecting the `Connector`.
    ///
    /// # Errors
    ///
    /// A second `close()` call returns `Error::UnknownMessenger` rather
    /// than succeeding idempotently; see `DESIGN.md`.
    pub async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        self.manager.stop_connection(&self.uri, &self.id).await
    }
}
