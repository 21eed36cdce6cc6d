// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `mq_connection_manager` - a thread-safe connection-sharing layer for
//! message-queue producers and consumers.
//!
//! Multiple independent producers and consumers in the same process,
//! addressing the same logical broker, transparently share a single
//! physical broker connection while retaining independent lifecycles,
//! independent subscriptions, and independent close semantics.
//!
//! # Overview
//!
//! An application addresses a destination by an [`EndpointUri`] of the form
//! `<brokerId>::<Queue|Topic>::<name>`. Opening a [`Producer`] or
//! [`Consumer`] at that URI asks the [`ConnectionManager`] for a
//! [`MessengerId`]; if another messenger is already live on the same
//! `brokerId`, the existing [`Connector`] is reused, otherwise a new one is
//! created via the manager's [`ConnectorFactory`]. `put`/`get` then talk
//! directly to the shared connector, bypassing the manager's lock
//! entirely; only lifecycle operations (`open`/`close`) serialize on it.
//!
//! # Feature Flags
//!
//! - `mqtt` (default): enables [`connector::mqtt::MqttConnector`], the
//!   reference `rumqttc`-backed [`Connector`] implementation, and
//!   [`ConnectionManager::global`].
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use mq_connection_manager::connector::fake::FakeConnectorFactory;
//! use mq_connection_manager::{ConnectionManager, ConnectionParameters, EndpointUri, Producer};
//!
//! # async fn example() -> mq_connection_manager::Result<()> {
//! let manager = Arc::new(ConnectionManager::new(Arc::new(FakeConnectorFactory::new())));
//! let uri = EndpointUri::parse("mardirac3.in2p3.fr::Queue::test1")?;
//! let params = ConnectionParameters {
//!     host: "mardirac3.in2p3.fr".to_string(),
//!     port: 61613,
//!     vhost: None,
//!     user: None,
//!     password: None,
//!     acknowledgement: mq_connection_manager::Acknowledgement::Auto,
//!     queues: vec!["test1".to_string()],
//!     topics: vec![],
//! };
//!
//! let producer = Producer::open(manager, uri, &params).await?;
//! producer.put(b"hello".to_vec()).await?;
//! producer.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Consumer with Callback Delivery
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use mq_connection_manager::connector::fake::FakeConnectorFactory;
//! use mq_connection_manager::{ConnectionManager, ConnectionParameters, Consumer, EndpointUri};
//!
//! # async fn example() -> mq_connection_manager::Result<()> {
//! # let params = ConnectionParameters {
//! #     host: "broker".to_string(), port: 1883, vhost: None, user: None, password: None,
//! #     acknowledgement: mq_connection_manager::Acknowledgement::Auto,
//! #     queues: vec![], topics: vec![],
//! # };
//! let manager = Arc::new(ConnectionManager::new(Arc::new(FakeConnectorFactory::new())));
//! let uri = EndpointUri::parse("broker::Topic::alerts")?;
//! let consumer = Consumer::open(manager, uri, &params).await?;
//!
//! consumer.on_message(Arc::new(|message| {
//!     println!("received {} bytes", message.body.len());
//! }));
//! # Ok(())
//! # }
//! ```

pub mod connector;
pub mod error;
mod manager;
pub mod messenger;
mod messenger_id;
pub mod parameters;
mod registry;
mod uri;

pub use connector::{Connector, ConnectorFactory, DeliveryCallback, Message};
pub use error::{Error, Result};
pub use manager::ConnectionManager;
pub use messenger::{Consumer, Producer};
pub use messenger_id::{MessengerId, Role};
pub use parameters::{
    Acknowledgement, ConnectionParameters, ParameterResolver, StaticParameterResolver,
};
pub use uri::{DestinationKind, EndpointUri};
