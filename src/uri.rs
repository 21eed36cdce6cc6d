// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Endpoint URI parsing and pseudo-path formatting.
//!
//! An endpoint URI has the stable form `<brokerId>::<Queue|Topic>::<name>`.
//! Two URIs share a physical connection iff their `brokerId` is identical.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// The kind of destination a URI addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DestinationKind {
    /// A point-to-point queue.
    Queue,
    /// A publish/subscribe topic.
    Topic,
}

impl DestinationKind {
    /// Returns the lower-cased form used in destination addresses and
    /// pseudo-paths (`queue` or `topic`).
    #[must_use]
    pub fn as_lower_str(self) -> &'static str {
        match self {
            Self::Queue => "queue",
            Self::Topic => "topic",
        }
    }
}

impl FromStr for DestinationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "queue" => Ok(Self::Queue),
            "topic" => Ok(Self::Topic),
            other => Err(Error::InvalidArgument(format!(
                "unknown destination kind: {other}"
            ))),
        }
    }
}

impl fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_lower_str())
    }
}

/// A parsed endpoint URI: `<brokerId>::<kind>::<name>`.
///
/// # Examples
///
/// ```
/// use mq_connection_manager::{DestinationKind, EndpointUri};
///
/// let uri = EndpointUri::parse("mardirac3.in2p3.fr::Queue::test1").unwrap();
/// assert_eq!(uri.broker_id(), "mardirac3.in2p3.fr");
/// assert_eq!(uri.kind(), DestinationKind::Queue);
/// assert_eq!(uri.name(), "test1");
/// assert_eq!(uri.destination_address(), "/queue/test1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointUri {
    broker_id: String,
    kind: DestinationKind,
    name: String,
}

impl EndpointUri {
    /// Parses `<brokerId>::<kind>::<name>`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` if the URI does not have exactly
    /// three `::`-separated, non-empty segments, or if `kind` is not
    /// `Queue`/`Topic` (case-insensitive).
    pub fn parse(uri: &str) -> Result<Self, Error> {
        let parts: Vec<&str> = uri.split("::").collect();
        let [broker_id, kind, name] = parts.as_slice() else {
            return Err(Error::InvalidArgument(format!(
                "expected '<brokerId>::<kind>::<name>', got: {uri}"
            )));
        };

        if broker_id.is_empty() || name.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "brokerId and name must be non-empty: {uri}"
            )));
        }

        Ok(Self {
            broker_id: (*broker_id).to_string(),
            kind: kind.parse()?,
            name: (*name).to_string(),
        })
    }

    /// The opaque logical broker identifier (e.g. a hostname).
    #[must_use]
    pub fn broker_id(&self) -> &str {
        &self.broker_id
    }

    /// The destination kind (`Queue` or `Topic`).
    #[must_use]
    pub fn kind(&self) -> DestinationKind {
        self.kind
    }

    /// The destination name, e.g. `test1`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The destination address: `/queue/<name>` or `/topic/<name>`.
    #[must_use]
    pub fn destination_address(&self) -> String {
        format!("/{}/{}", self.kind.as_lower_str(), self.name)
    }
}

impl fmt::Display for EndpointUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}::{}", self.broker_id, self.kind, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_queue_uri() {
        let uri = EndpointUri::parse("mardirac3.in2p3.fr::Queue::test1").unwrap();
        assert_eq!(uri.broker_id(), "mardirac3.in2p3.fr");
        assert_eq!(uri.kind(), DestinationKind::Queue);
        assert_eq!(uri.name(), "test1");
        assert_eq!(uri.destination_address(), "/queue/test1");
    }

    #[test]
    fn parses_topic_uri_case_insensitive_kind() {
        let uri = EndpointUri::parse("mardirac3.in2p3.fr::TOPIC::test1").unwrap();
        assert_eq!(uri.kind(), DestinationKind::Topic);
        assert_eq!(uri.destination_address(), "/topic/test1");
    }

    #[test]
    fn rejects_missing_segment() {
        let err = EndpointUri::parse("mardirac3.in2p3.fr::Queue").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn rejects_extra_segment() {
        let err = EndpointUri::parse("a::Queue::b::c").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn rejects_unknown_kind() {
        let err = EndpointUri::parse("broker::Exchange::name").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn rejects_empty_broker_id() {
        let err = EndpointUri::parse("::Queue::test1").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn rejects_empty_name() {
        let err = EndpointUri::parse("broker::Queue::").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn display_roundtrips_lowercase_kind() {
        let uri = EndpointUri::parse("broker::Queue::test1").unwrap();
        assert_eq!(uri.to_string(), "broker::queue::test1");
    }
}
