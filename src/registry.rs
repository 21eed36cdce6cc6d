// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The in-memory connection table: `brokerId -> (Connector, destinations -> messengers)`.
//!
//! `Registry` performs no I/O and takes no lock of its own; it is only ever
//! reached through `ConnectionManager`'s single `tokio::sync::Mutex`, which
//! is why every method here takes `&mut self` rather than synchronizing
//! internally. This mirrors the source `MQConnectionManager`'s connection
//! table, a plain dict guarded entirely by the manager's lock.

use std::collections::HashMap;
use std::sync::Arc;

use crate::connector::Connector;
use crate::messenger_id::{MessengerId, Role};

/// One logical broker's live state: its `Connector` (absent only during the
/// brief window between messenger allocation and connector installation in
/// `start_connection`) and the messengers subscribed/publishing per
/// destination.
#[derive(Default)]
pub(crate) struct BrokerEntry {
    pub(crate) connector: Option<Arc<dyn Connector>>,
    pub(crate) destinations: HashMap<String, Vec<MessengerId>>,
}

/// The connection registry. See module docs.
#[derive(Default)]
pub(crate) struct Registry {
    brokers: HashMap<String, BrokerEntry>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn connection_exists(&self, broker_id: &str) -> bool {
        self.brokers.contains_key(broker_id)
    }

    pub(crate) fn destination_exists(&self, broker_id: &str, destination: &str) -> bool {
        self.brokers
            .get(broker_id)
            .is_some_and(|entry| entry.destinations.contains_key(destination))
    }

    pub(crate) fn messenger_exists(
        &self,
        broker_id: &str,
        destination: &str,
        id: &MessengerId,
    ) -> bool {
        self.brokers
            .get(broker_id)
            .and_then(|entry| entry.destinations.get(destination))
            .is_some_and(|ids| ids.contains(id))
    }

    pub(crate) fn get_connector(&self, broker_id: &str) -> Option<Arc<dyn Connector>> {
        self.brokers
            .get(broker_id)
            .and_then(|e| e.connector.clone())
    }

    /// Installs `connector` for `broker_id`. Refuses (returns `false`) if
    /// `broker_id` is not present in the registry — a connector can only be
    /// attached to a brokerId that already has at least one messenger
    /// waiting for it, per the `start_connection` allocate-then-connect
    /// order.
    pub(crate) fn set_connector(&mut self, broker_id: &str, connector: Arc<dyn Connector>) -> bool {
        match self.brokers.get_mut(broker_id) {
            Some(entry) => {
                entry.connector = Some(connector);
                true
            }
            None => false,
        }
    }

    /// Computes the next `MessengerId` for `(broker_id, destination, role)`
    /// without mutating the registry: `1 + max(existing N for this role at
    /// this destination, or 0)`. Freed ids are never reused out of order.
    pub(crate) fn next_messenger_id(
        &self,
        broker_id: &str,
        destination: &str,
        role: Role,
    ) -> MessengerId {
        let max_n = self
            .brokers
            .get(broker_id)
            .and_then(|entry| entry.destinations.get(destination))
            .into_iter()
            .flatten()
            .filter(|id| id.role() == role)
            .map(MessengerId::n)
            .max()
            .unwrap_or(0);
        MessengerId::new(role, max_n + 1)
    }

    /// Inserts `id` under `(broker_id, destination)`, creating the
    /// brokerId/destination entries (with connector absent) if they don't
    /// already exist. Returns `false` without mutating anything if `id` is
    /// already present at that destination.
    pub(crate) fn add_messenger(
        &mut self,
        broker_id: &str,
        destination: &str,
        id: MessengerId,
    ) -> bool {
        let entry = self.brokers.entry(broker_id.to_string()).or_default();
        let ids = entry
            .destinations
            .entry(destination.to_string())
            .or_default();
        if ids.contains(&id) {
            return false;
        }
        ids.push(id);
        true
    }

    /// Removes `id` from `(broker_id, destination)`, shrinking the
    /// destination entry (and, transitively, the brokerId entry) once
    /// empty. Returns `false` without mutating anything if `id` was not
    /// present.
    pub(crate) fn remove_messenger(
        &mut self,
        broker_id: &str,
        destination: &str,
        id: &MessengerId,
    ) -> bool {
        let Some(entry) = self.brokers.get_mut(broker_id) else {
            return false;
        };
        let Some(ids) = entry.destinations.get_mut(destination) else {
            return false;
        };
        let Some(pos) = ids.iter().position(|existing| existing == id) else {
            return false;
        };
        ids.remove(pos);
        if ids.is_empty() {
            entry.destinations.remove(destination);
        }
        if entry.destinations.is_empty() {
            self.brokers.remove(broker_id);
        }
        true
    }

    /// Rolls back a partially-inserted brokerId/destination/messenger
    /// triple created by `start_connection` before a `Connector` was ever
    /// installed (connect/setup failure). Unconditional: the caller only
    /// invokes this on a path it knows just inserted exactly this triple.
    pub(crate) fn remove_broker_entirely(&mut self, broker_id: &str) {
        self.brokers.remove(broker_id);
    }

    /// All messengers as pseudo-paths: `brokerId/kind/name/role+N`. Order
    /// is unspecified per the data model; iteration order of the
    /// underlying maps is what callers observe.
    pub(crate) fn list_messengers(&self) -> Vec<String> {
        let mut out = Vec::new();
        for (broker_id, entry) in &self.brokers {
            for (destination, ids) in &entry.destinations {
                let path_segment = destination.trim_start_matches('/');
                for id in ids {
                    out.push(format!("{broker_id}/{path_segment}/{id}"));
                }
            }
        }
        out
    }

    pub(crate) fn list_connections(&self) -> Vec<String> {
        self.brokers.keys().cloned().collect()
    }

    pub(crate) fn broker_ids(&self) -> Vec<String> {
        self.list_connections()
    }

    pub(crate) fn take_connector(&mut self, broker_id: &str) -> Option<Arc<dyn Connector>> {
        self.brokers
            .get_mut(broker_id)
            .and_then(|entry| entry.connector.take())
    }

    pub(crate) fn clear(&mut self) {
        self.brokers.clear();
    }
}
