// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `ConnectionManager`: the orchestrator that allocates `MessengerId`s,
//! creates and tears down `Connector`s, and serializes every lifecycle
//! operation under a single lock.
//!
//! The source's process-wide recursive `LockRing` is reproduced with a
//! single `tokio::sync::Mutex<Registry>` held across the `await` points of
//! `connect`/`disconnect`/`subscribe`/`unsubscribe` (the async mutex's
//! `MutexGuard` is `Send` and may cross `.await`, unlike
//! `std::sync::Mutex`'s). Every public method takes the lock exactly once
//! and passes the guard to private helpers instead of re-entering it, which
//! achieves the same non-reentrant-deadlock property a recursive lock gives
//! the source without needing a reentrant primitive (`tokio` and the
//! standard library do not provide one, and hand-rolling one would not be
//! idiomatic here). See `DESIGN.md` for this resolution.

use std::sync::{Arc, OnceLock};

use tokio::sync::Mutex;

use crate::connector::{Connector, ConnectorFactory};
use crate::error::{Error, Result};
use crate::messenger_id::{MessengerId, Role};
use crate::parameters::ConnectionParameters;
use crate::registry::Registry;
use crate::uri::EndpointUri;

/// The connection-sharing orchestrator. See module docs.
pub struct ConnectionManager {
    registry: Mutex<Registry>,
    factory: Arc<dyn ConnectorFactory>,
}

impl ConnectionManager {
    /// Builds a manager that creates new `Connector`s via `factory`.
    #[must_use]
    pub fn new(factory: Arc<dyn ConnectorFactory>) -> Self {
        Self {
            registry: Mutex::new(Registry::new()),
            factory,
        }
    }

    /// The process-wide singleton, backed by the reference MQTT connector.
    ///
    /// Provided for callers that want a single ambient manager; prefer
    /// [`ConnectionManager::new`] with an injected factory for testing.
    #[cfg(feature = "mqtt")]
    pub fn global() -> &'static ConnectionManager {
        static INSTANCE: OnceLock<ConnectionManager> = OnceLock::new();
        INSTANCE.get_or_init(|| {
            ConnectionManager::new(Arc::new(crate::connector::mqtt::MqttConnectorFactory::new()))
        })
    }

    /// Allocates a `MessengerId` at `uri` for `role`, reusing the broker's
    /// existing `Connector` if one is live, or creating and connecting a
    /// new one otherwise.
    ///
    /// # Errors
    ///
    /// Returns the `Connector`'s `ConnectFailed`/`BadParameters` error if a
    /// new connection could not be established; the registry is rolled
    /// back to its pre-call state on any such failure. Returns
    /// `Error::ConcurrentConnectRace` if another writer installed a
    /// `Connector` for this `brokerId` while this call's own install was
    /// pending — unreachable under the single-lock discipline, kept as a
    /// defensive invariant check.
    pub async fn start_connection(
        &self,
        uri: &EndpointUri,
        params: &ConnectionParameters,
        role: Role,
    ) -> Result<MessengerId> {
        let broker_id = uri.broker_id();
        let destination = uri.destination_address();
        let mut registry = self.registry.lock().await;

        if registry.connection_exists(broker_id) {
            let id = registry.next_messenger_id(broker_id, &destination, role);
            registry.add_messenger(broker_id, &destination, id.clone());
            tracing::debug!(broker_id, %destination, %id, "joined existing connection");
            return Ok(id);
        }

        let id = registry.next_messenger_id(broker_id, &destination, role);
        registry.add_messenger(broker_id, &destination, id.clone());

        let connector = self.factory.create();
        if let Err(err) = connector.setup_connection(params).await {
            tracing::error!(broker_id, error = %err, "setup_connection failed, rolling back");
            if let Err(disconnect_err) = connector.disconnect().await {
                tracing::warn!(broker_id, error = %disconnect_err, "disconnect failed while rolling back a failed setup_connection");
            }
            registry.remove_broker_entirely(broker_id);
            return Err(err);
        }
        if let Err(err) = connector.connect().await {
            tracing::error!(broker_id, error = %err, "connect failed, rolling back");
            if let Err(disconnect_err) = connector.disconnect().await {
                tracing::warn!(broker_id, error = %disconnect_err, "disconnect failed while rolling back a failed connect");
            }
            registry.remove_broker_entirely(broker_id);
            return Err(err);
        }

        if registry.get_connector(broker_id).is_some() {
            tracing::error!(broker_id, "connector already installed by another writer");
            registry.remove_broker_entirely(broker_id);
            return Err(Error::ConcurrentConnectRace);
        }

        registry.set_connector(broker_id, connector);
        tracing::debug!(broker_id, %destination, %id, "created new connection");
        Ok(id)
    }

    /// Removes `id` from `uri`'s destination, unsubscribing (for
    /// consumers) and, if this was the broker's last messenger,
    /// disconnecting its `Connector`.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownMessenger` if `id` is not present at `uri`.
    /// Returns the `Connector`'s `unsubscribe`/`disconnect` error if either
    /// fails; registry shrinkage is never undone by either failure.
    pub async fn stop_connection(&self, uri: &EndpointUri, id: &MessengerId) -> Result<()> {
        let broker_id = uri.broker_id();
        let destination = uri.destination_address();
        let mut registry = self.registry.lock().await;

        let connector = registry.get_connector(broker_id);

        if !registry.remove_messenger(broker_id, &destination, id) {
            return Err(Error::UnknownMessenger(id.to_string()));
        }

        let unsubscribe_result = if id.role() == Role::Consumer {
            match &connector {
                Some(connector) => connector.unsubscribe(&destination, id).await,
                None => Ok(()),
            }
        } else {
            Ok(())
        };
        if let Err(err) = &unsubscribe_result {
            tracing::warn!(broker_id, %destination, %id, error = %err, "unsubscribe failed during close");
        }

        let emptied = !registry.connection_exists(broker_id);
        let disconnect_result = if emptied {
            match connector {
                Some(connector) => {
                    let result = connector.disconnect().await;
                    if let Err(err) = &result {
                        tracing::warn!(broker_id, error = %err, "disconnect failed during close");
                    }
                    Some(result)
                }
                None => Some(Ok(())),
            }
        } else {
            None
        };

        if let Err(err) = unsubscribe_result {
            return Err(err);
        }
        disconnect_result.unwrap_or(Ok(()))
    }

    /// Looks up the live `Connector` for `broker_id`.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoSuchConnection` if there is no connection (or no
    /// installed `Connector`) for `broker_id`.
    pub async fn get_connector(&self, broker_id: &str) -> Result<Arc<dyn Connector>> {
        self.registry
            .lock()
            .await
            .get_connector(broker_id)
            .ok_or(Error::NoSuchConnection)
    }

    /// All live messengers as pseudo-paths (`brokerId/kind/name/roleN`).
    pub async fn get_all_messengers(&self) -> Vec<String> {
        self.registry.lock().await.list_messengers()
    }

    /// All brokerIds with at least one live connection.
    pub async fn connection_ids(&self) -> Vec<String> {
        self.registry.lock().await.list_connections()
    }

    /// Disconnects every live `Connector` (ignoring individual disconnect
    /// failures, which are logged) and clears the registry. Used for
    /// shutdown and test isolation.
    pub async fn remove_all_connections(&self) {
        let mut registry = self.registry.lock().await;
        for broker_id in registry.broker_ids() {
            if let Some(connector) = registry.take_connector(&broker_id) {
                if let Err(err) = connector.disconnect().await {
                    tracing::warn!(broker_id, error = %err, "disconnect failed during remove_all_connections");
                }
            }
        }
        registry.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::fake::{FakeConnector, FakeConnectorFactory};

    fn manager() -> ConnectionManager {
        ConnectionManager::new(Arc::new(FakeConnectorFactory::new()))
    }

    fn params() -> ConnectionParameters {
        ConnectionParameters {
            host: "mardirac3.in2p3.fr".to_string(),
            port: 61613,
            vhost: None,
            user: None,
            password: None,
            acknowledgement: crate::parameters::Acknowledgement::Auto,
            queues: vec!["test1".to_string()],
            topics: vec![],
        }
    }

    fn uri(s: &str) -> EndpointUri {
        EndpointUri::parse(s).unwrap()
    }

    #[tokio::test]
    async fn single_producer_lifecycle() {
        let manager = manager();
        let u = uri("mardirac3.in2p3.fr::Queue::test1");
        let id = manager
            .start_connection(&u, &params(), Role::Producer)
            .await
            .unwrap();
        assert_eq!(id.to_string(), "producer1");
        assert_eq!(
            manager.get_all_messengers().await,
            vec!["mardirac3.in2p3.fr/queue/test1/producer1".to_string()]
        );

        manager.stop_connection(&u, &id).await.unwrap();
        assert!(manager.get_all_messengers().await.is_empty());

        let err = manager.stop_connection(&u, &id).await.unwrap_err();
        assert!(matches!(err, Error::UnknownMessenger(_)));
    }

    #[tokio::test]
    async fn connection_sharing_across_destinations() {
        let manager = manager();
        let test1 = uri("mardirac3.in2p3.fr::Queue::test1");
        let test2 = uri("mardirac3.in2p3.fr::Queue::test2");
        let test4 = uri("testdir.blabla.ch::Queue::test4");

        manager
            .start_connection(&test1, &params(), Role::Producer)
            .await
            .unwrap();
        manager
            .start_connection(&test2, &params(), Role::Producer)
            .await
            .unwrap();
        manager
            .start_connection(&test4, &params(), Role::Producer)
            .await
            .unwrap();

        let mut connections = manager.connection_ids().await;
        connections.sort();
        assert_eq!(
            connections,
            vec![
                "mardirac3.in2p3.fr".to_string(),
                "testdir.blabla.ch".to_string()
            ]
        );

        let mut messengers = manager.get_all_messengers().await;
        messengers.sort();
        assert_eq!(
            messengers,
            vec![
                "mardirac3.in2p3.fr/queue/test1/producer1".to_string(),
                "mardirac3.in2p3.fr/queue/test2/producer1".to_string(),
                "testdir.blabla.ch/queue/test4/producer1".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn teardown_cascade_keeps_connector_alive_until_last_destination_closes() {
        let manager = manager();
        let test1 = uri("mardirac3.in2p3.fr::Queue::test1");
        let test2 = uri("mardirac3.in2p3.fr::Queue::test2");

        let test1_consumer_a = manager
            .start_connection(&test1, &params(), Role::Consumer)
            .await
            .unwrap();
        let test1_consumer_b = manager
            .start_connection(&test1, &params(), Role::Consumer)
            .await
            .unwrap();
        let test1_producer = manager
            .start_connection(&test1, &params(), Role::Producer)
            .await
            .unwrap();
        // A fresh destination on the same broker starts its own per-role
        // counter: this id is "consumer1", not "consumer3", even though
        // it's the third consumer opened overall.
        let test2_consumer = manager
            .start_connection(&test2, &params(), Role::Consumer)
            .await
            .unwrap();
        assert_eq!(test2_consumer.to_string(), "consumer1");

        manager
            .stop_connection(&test1, &test1_consumer_a)
            .await
            .unwrap();
        manager
            .stop_connection(&test1, &test1_consumer_b)
            .await
            .unwrap();
        manager
            .stop_connection(&test1, &test1_producer)
            .await
            .unwrap();

        assert_eq!(
            manager.get_all_messengers().await,
            vec!["mardirac3.in2p3.fr/queue/test2/consumer1".to_string()]
        );
        assert!(manager.get_connector("mardirac3.in2p3.fr").await.is_ok());

        manager
            .stop_connection(&test2, &test2_consumer)
            .await
            .unwrap();
        assert!(manager.get_all_messengers().await.is_empty());
        assert!(matches!(
            manager
                .get_connector("mardirac3.in2p3.fr")
                .await
                .unwrap_err(),
            Error::NoSuchConnection
        ));
    }

    #[tokio::test]
    async fn id_allocation_leaves_holes() {
        let manager = manager();
        let u = uri("mardirac3.in2p3.fr::Queue::test1");

        manager
            .start_connection(&u, &params(), Role::Producer)
            .await
            .unwrap();
        let p2 = manager
            .start_connection(&u, &params(), Role::Producer)
            .await
            .unwrap();
        manager
            .start_connection(&u, &params(), Role::Producer)
            .await
            .unwrap();
        manager.stop_connection(&u, &p2).await.unwrap();

        let p4 = manager
            .start_connection(&u, &params(), Role::Producer)
            .await
            .unwrap();
        assert_eq!(p4.to_string(), "producer4");
    }

    #[tokio::test]
    async fn connect_failure_rolls_back_registry() {
        struct AlwaysFailFactory;
        impl ConnectorFactory for AlwaysFailFactory {
            fn create(&self) -> Arc<dyn Connector> {
                let connector = FakeConnector::new();
                connector.fail_next_connects(1);
                Arc::new(connector)
            }
        }

        let manager = ConnectionManager::new(Arc::new(AlwaysFailFactory));
        let u = uri("mardirac3.in2p3.fr::Queue::test1");
        let err = manager
            .start_connection(&u, &params(), Role::Producer)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConnectFailed(_)));
        assert!(manager.get_all_messengers().await.is_empty());
        assert!(manager.connection_ids().await.is_empty());
    }

    #[tokio::test]
    async fn connect_failure_disconnects_the_orphaned_connector() {
        struct CapturingFailFactory {
            last: std::sync::Mutex<Option<Arc<FakeConnector>>>,
        }
        impl ConnectorFactory for CapturingFailFactory {
            fn create(&self) -> Arc<dyn Connector> {
                let connector = Arc::new(FakeConnector::new());
                connector.fail_next_connects(1);
                *self.last.lock().unwrap() = Some(Arc::clone(&connector));
                connector
            }
        }

        let factory = Arc::new(CapturingFailFactory {
            last: std::sync::Mutex::new(None),
        });
        let manager = ConnectionManager::new(Arc::clone(&factory));
        let u = uri("mardirac3.in2p3.fr::Queue::test1");
        let err = manager
            .start_connection(&u, &params(), Role::Producer)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConnectFailed(_)));

        let connector = factory.last.lock().unwrap().clone().unwrap();
        assert_eq!(
            connector.disconnect_calls(),
            1,
            "a connector that failed to connect must still be disconnected, not orphaned"
        );
    }

    #[tokio::test]
    async fn remove_all_connections_disconnects_every_broker() {
        let manager = manager();
        manager
            .start_connection(&uri("a::Queue::x"), &params(), Role::Producer)
            .await
            .unwrap();
        manager
            .start_connection(&uri("b::Queue::y"), &params(), Role::Producer)
            .await
            .unwrap();

        manager.remove_all_connections().await;
        assert!(manager.get_all_messengers().await.is_empty());
        assert!(manager.connection_ids().await.is_empty());
    }

    #[tokio::test]
    async fn unsubscribe_failure_does_not_undo_shrinkage_but_disconnect_still_runs() {
        struct FailUnsubscribeFactory;
        impl ConnectorFactory for FailUnsubscribeFactory {
            fn create(&self) -> Arc<dyn Connector> {
                Arc::new(FailingUnsubscribe(FakeConnector::new()))
            }
        }

        struct FailingUnsubscribe(FakeConnector);

        #[async_trait::async_trait]
        impl Connector for FailingUnsubscribe {
            async fn setup_connection(&self, p: &ConnectionParameters) -> Result<()> {
                self.0.setup_connection(p).await
            }
            async fn connect(&self) -> Result<()> {
                self.0.connect().await
            }
            async fn subscribe(&self, d: &str, id: &MessengerId) -> Result<()> {
                self.0.subscribe(d, id).await
            }
            async fn unsubscribe(&self, _d: &str, _id: &MessengerId) -> Result<()> {
                Err(Error::UnsubscribeFailed("broker refused".to_string()))
            }
            async fn put(&self, m: crate::connector::Message) -> Result<()> {
                self.0.put(m).await
            }
            async fn get(&self, d: &str, id: &MessengerId) -> Option<crate::connector::Message> {
                self.0.get(d, id).await
            }
            async fn disconnect(&self) -> Result<()> {
                self.0.disconnect().await
            }
            async fn reconnect(&self) -> Result<()> {
                self.0.reconnect().await
            }
        }

        let manager = ConnectionManager::new(Arc::new(FailUnsubscribeFactory));
        let u = uri("mardirac3.in2p3.fr::Queue::test1");
        let id = manager
            .start_connection(&u, &params(), Role::Consumer)
            .await
            .unwrap();

        let err = manager.stop_connection(&u, &id).await.unwrap_err();
        assert!(matches!(err, Error::UnsubscribeFailed(_)));
        assert!(manager.get_all_messengers().await.is_empty());
        assert!(manager.connection_ids().await.is_empty());
    }
}
