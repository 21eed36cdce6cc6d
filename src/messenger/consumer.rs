// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The consumer facade: `get`, optional callback delivery, and `close`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::connector::{DeliveryCallback, Message};
use crate::error::{Error, Result};
use crate::manager::ConnectionManager;
use crate::messenger_id::{MessengerId, Role};
use crate::parameters::ConnectionParameters;
use crate::uri::EndpointUri;

/// How often the callback-delivery task polls `Connector::get` when no
/// message is immediately available.
const CALLBACK_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A handle bound to one `(brokerId, destination)` that receives messages
/// through whichever `Connector` the `ConnectionManager` has live for that
/// broker.
///
/// `Consumer::open` performs the `subscribe` call immediately after
/// `start_connection` returns; `close` performs the matching `unsubscribe`
/// via `ConnectionManager::stop_connection`.
pub struct Consumer {
    manager: Arc<ConnectionManager>,
    uri: EndpointUri,
    id: MessengerId,
    closed: AtomicBool,
    callback_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Consumer {
    /// Opens a consumer at `uri`: allocates a `MessengerId` (creating the
    /// `Connector` if necessary), then subscribes it to the destination.
    ///
    /// # Errors
    ///
    /// Propagates `start_connection`'s errors, or `Error::SubscribeFailed`
    /// if the post-allocation `subscribe` call fails. A `subscribe`
    /// failure does *not* roll back the messenger allocation — only
    /// connect-time failures trigger registry rollback; callers that want
    /// the slot released on a failed subscribe should call `close()`
    /// themselves.
    pub async fn open(
        manager: Arc<ConnectionManager>,
        uri: EndpointUri,
        params: &ConnectionParameters,
    ) -> Result<Self> {
        let id = manager
            .start_connection(&uri, params, Role::Consumer)
            .await?;
        let connector = manager.get_connector(uri.broker_id()).await?;
        connector.subscribe(&uri.destination_address(), &id).await?;
        Ok(Self {
            manager,
            uri,
            id,
            closed: AtomicBool::new(false),
            callback_task: std::sync::Mutex::new(None),
        })
    }

    /// This consumer's messenger identity.
    #[must_use]
    pub fn id(&self) -> &MessengerId {
        &self.id
    }

    /// Pulls the next buffered message for this subscription, or `None`
    /// if none is currently available.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoSuchConnection` if `close` has already been
    /// called or the broker connection no longer exists.
    pub async fn get(&self) -> Result<Option<Message>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::NoSuchConnection);
        }
        let connector = self.manager.get_connector(self.uri.broker_id()).await?;
        Ok(connector
            .get(&self.uri.destination_address(), &self.id)
            .await)
    }

    /// Alternative to polling `get()`: spawns a background task that
    /// drains this subscription's buffer and invokes `callback` for every
    /// delivered message, until `close()` is called.
    ///
    /// The callback path does not hold a reference back into this
    /// `Consumer` or its `Connector` beyond the `Arc` it was given here,
    /// breaking the facade/manager/connector reference cycle the callback
    /// would otherwise create.
    pub fn on_message(&self, callback: DeliveryCallback) {
        let manager = Arc::clone(&self.manager);
        let broker_id = self.uri.broker_id().to_string();
        let destination = self.uri.destination_address();
        let id = self.id.clone();

        let handle = tokio::spawn(async move {
            loop {
                let Ok(connector) = manager.get_connector(&broker_id).await else {
                    return;
                };
                match connector.get(&destination, &id).await {
                    Some(message) => callback(message),
                    None => tokio::time::sleep(CALLBACK_POLL_INTERVAL).await,
                }
            }
        });

        if let Some(previous) = self.callback_task.lock().unwrap().replace(handle) {
            previous.abort();
        }
    }

    /// Closes this consumer: stops any running callback-delivery task,
    /// then unsubscribes and releases its `MessengerId` (and disconnects
    /// the `Connector` if this was the broker's last messenger).
    ///
    /// # Errors
    ///
    /// A second `close()` call returns `Error::UnknownMessenger`.
    pub async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        if let Some(handle) = self.callback_task.lock().unwrap().take() {
            handle.abort();
        }
        self.manager.stop_connection(&self.uri, &self.id).await
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        if let Some(handle) = self.callback_task.lock().unwrap().take() {
            handle.abort();
        }
    }
}
