// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovered endpoint description.

use crate::session::{RouteDirection, Session, TopicRoute, DEFAULT_PARTITION};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors parsing an instance handle.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandleParseError {
    #[error("expected {expected} bytes, found {found}")]
    Length { expected: usize, found: usize },

    #[error("invalid hex byte '{0}'")]
    InvalidByte(String),
}

/// Stable identity of a discovered publication or subscription.
///
/// Layout follows the RTPS GUID: 12-byte participant prefix followed by a
/// 4-byte entity ID.
///
/// # Display Format
/// Hex with dots: "01.0f.ac.10.00.00.00.00.00.00.00.01.00.00.01.03"
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct InstanceHandle {
    pub prefix: [u8; 12],
    pub entity_id: [u8; 4],
}

impl InstanceHandle {
    /// Create a handle from raw bytes (16 bytes total).
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        let mut prefix = [0u8; 12];
        let mut entity_id = [0u8; 4];
        prefix.copy_from_slice(&bytes[0..12]);
        entity_id.copy_from_slice(&bytes[12..16]);
        Self { prefix, entity_id }
    }

    /// Create a handle from separate prefix and entity ID.
    pub fn new(prefix: [u8; 12], entity_id: [u8; 4]) -> Self {
        Self { prefix, entity_id }
    }

    /// Convert to a 16-byte array.
    pub fn as_bytes(&self) -> [u8; 16] {
        let mut bytes = [0u8; 16];
        bytes[0..12].copy_from_slice(&self.prefix);
        bytes[12..16].copy_from_slice(&self.entity_id);
        bytes
    }
}

impl fmt::Display for InstanceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.as_bytes().iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for InstanceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstanceHandle({})", self)
    }
}

impl FromStr for InstanceHandle {
    type Err = HandleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = parse_dotted_hex::<16>(s)?;
        Ok(Self::from_bytes(bytes))
    }
}

/// Parse dotted hex ("01.0f.ac") into a fixed-size byte array.
pub(crate) fn parse_dotted_hex<const N: usize>(s: &str) -> Result<[u8; N], HandleParseError> {
    let parts: Vec<&str> = s.trim().split('.').collect();
    if parts.len() != N {
        return Err(HandleParseError::Length {
            expected: N,
            found: parts.len(),
        });
    }

    let mut out = [0u8; N];
    for (slot, part) in out.iter_mut().zip(parts) {
        *slot = u8::from_str_radix(part, 16)
            .map_err(|_| HandleParseError::InvalidByte(part.to_string()))?;
    }
    Ok(out)
}

/// A discovered publication or subscription as reported by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointInfo {
    /// Endpoint identity.
    pub handle: InstanceHandle,
    /// `Out` for publications, `In` for subscriptions.
    pub direction: RouteDirection,
    /// Topic name.
    pub topic: String,
    /// Registered type name.
    pub type_name: String,
    /// Announced partition names (empty = default partition).
    pub partitions: Vec<String>,
}

impl EndpointInfo {
    /// Describe a discovered publication.
    pub fn publication(
        handle: InstanceHandle,
        topic: impl Into<String>,
        type_name: impl Into<String>,
        partitions: Vec<String>,
    ) -> Self {
        Self {
            handle,
            direction: RouteDirection::Out,
            topic: topic.into(),
            type_name: type_name.into(),
            partitions,
        }
    }

    /// Describe a discovered subscription.
    pub fn subscription(
        handle: InstanceHandle,
        topic: impl Into<String>,
        type_name: impl Into<String>,
        partitions: Vec<String>,
    ) -> Self {
        Self {
            handle,
            direction: RouteDirection::In,
            topic: topic.into(),
            type_name: type_name.into(),
            partitions,
        }
    }

    /// Check if this endpoint is a publication.
    pub fn is_publication(&self) -> bool {
        self.direction == RouteDirection::Out
    }

    /// Partition list with the empty list replaced by the default partition.
    pub fn effective_partitions(&self) -> Vec<&str> {
        if self.partitions.is_empty() {
            vec![DEFAULT_PARTITION]
        } else {
            self.partitions.iter().map(String::as_str).collect()
        }
    }

    /// Topic route this endpoint contributes to.
    pub fn topic_route(&self) -> TopicRoute {
        TopicRoute::new(self.direction, self.topic.clone(), self.type_name.clone())
    }

    /// Session for one of this endpoint's partitions.
    pub fn session(&self, partition: &str) -> Session {
        Session::new(self.topic.clone(), partition)
    }
}
