// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Session and topic route identities.
//!
//! A [`Session`] is one logical routing unit, the pair (topic, partition).
//! A [`TopicRoute`] is one directional data path inside a session. Both are
//! plain values: equality and hashing are structural, so they can key the
//! observer's membership map and the commander's intent table.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Partition name used when an endpoint announces an empty partition list.
pub const DEFAULT_PARTITION: &str = "";

/// Direction of a topic route relative to the observed domain.
///
/// `In` is derived from subscriptions (data must flow into the domain),
/// `Out` from publications (data flows out of the domain).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteDirection {
    In,
    Out,
}

impl RouteDirection {
    /// Upper-case label used in entity names and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::In => "IN",
            Self::Out => "OUT",
        }
    }
}

impl fmt::Display for RouteDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical routing unit: one topic within one partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Session {
    /// Topic name.
    pub topic: String,
    /// Partition name (`""` is the default partition).
    pub partition: String,
}

impl Session {
    /// Create a session identity.
    pub fn new(topic: impl Into<String>, partition: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            partition: partition.into(),
        }
    }

    /// Check if this session lives in the default partition.
    pub fn is_default_partition(&self) -> bool {
        self.partition == DEFAULT_PARTITION
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.topic, self.partition)
    }
}

/// Directional data path within a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopicRoute {
    /// Route direction.
    pub direction: RouteDirection,
    /// Topic name.
    pub topic: String,
    /// Registered type name.
    pub type_name: String,
}

impl TopicRoute {
    /// Create a topic route identity.
    pub fn new(
        direction: RouteDirection,
        topic: impl Into<String>,
        type_name: impl Into<String>,
    ) -> Self {
        Self {
            direction,
            topic: topic.into(),
            type_name: type_name.into(),
        }
    }
}

impl fmt::Display for TopicRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({})", self.direction, self.topic, self.type_name)
    }
}
