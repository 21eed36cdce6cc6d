// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Messenger roles and identifiers.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Whether a messenger puts messages onto a destination or receives them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Sends messages.
    Producer,
    /// Receives messages.
    Consumer,
}

impl Role {
    /// The role's lower-case name, used as the `MessengerId` prefix.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Producer => "producer",
            Self::Consumer => "consumer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A messenger identity: `<role><N>`, e.g. `producer1`, `consumer12`.
///
/// Uniqueness scope is `(brokerId, destination, role)`, enforced by the
/// registry, not by this type. `MessengerId`s are never recycled in
/// numeric order: closing `producer2` and creating a new producer at the
/// same destination yields `producer3` (or higher), not `producer2` again,
/// until the destination is emptied and its numbering resets implicitly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessengerId {
    role: Role,
    n: u64,
}

impl MessengerId {
    /// Constructs a messenger id directly. Prefer allocation through the
    /// registry in production code; this is mainly useful for tests and
    /// for parsing pseudo-paths.
    #[must_use]
    pub fn new(role: Role, n: u64) -> Self {
        Self { role, n }
    }

    /// The role this id denotes.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// The numeric suffix.
    #[must_use]
    pub fn n(&self) -> u64 {
        self.n
    }
}

impl fmt::Display for MessengerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.role, self.n)
    }
}

impl FromStr for MessengerId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (role, rest) = if let Some(rest) = s.strip_prefix("producer") {
            (Role::Producer, rest)
        } else if let Some(rest) = s.strip_prefix("consumer") {
            (Role::Consumer, rest)
        } else {
            return Err(Error::InvalidArgument(format!(
                "messenger id must start with 'producer' or 'consumer': {s}"
            )));
        };

        let n = rest
            .parse()
            .map_err(|_| Error::InvalidArgument(format!("invalid messenger id suffix: {s}")))?;

        Ok(Self { role, n })
    }
}
