// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HDDS Partition Router
//!
//! Keeps a routing engine's sessions and topic routes in step with the
//! partitions that are actually in use on the bus.
//!
//! # Architecture
//!
//! ```text
//! discovery ──► PartitionObserver ──► lifecycle events ──► Commander ──► CommandTransport
//!                 │ FilterChain                               │ CommandBuilder
//!                 │ Session -> TopicRoute -> {handle}          │ one retrying intent
//!                 │ handle  -> {Session}                       │ per (session, route)
//! ```
//!
//! - A **session** is a `(topic, partition)` pair. It exists while at least
//!   one admitted endpoint announces that partition on that topic.
//! - A **topic route** is a `(direction, topic, type)` within a session.
//!   Publications feed `OUT` routes, subscriptions feed `IN` routes.
//! - The **commander** sends create/delete commands and retries them at a
//!   fixed delay until acknowledged or superseded.
//!
//! # Quick Start
//!
//! ```bash
//! # Preview the commands a discovery trace produces
//! hdds-partition-router run --config prouter.toml --events trace.jsonl
//!
//! # Write an example configuration
//! hdds-partition-router gen-config --output prouter.toml
//! ```

pub mod command;
pub mod commander;
pub mod config;
pub mod endpoint;
pub mod filter;
pub mod listener;
pub mod naming;
pub mod observer;
pub mod replay;
pub mod session;

pub use command::{
    CommandKind, CommandRequest, CommandResponse, CommandTransport, DryRunTransport,
    MockTransport,
};
pub use commander::{
    Commander, CommanderConfig, CommanderError, CommanderStats, CommanderStatsSnapshot,
};
pub use config::{ConfigError, ServiceConfig};
pub use endpoint::{EndpointInfo, InstanceHandle};
pub use filter::{EndpointFilter, FilterChain, TopicSelection};
pub use listener::{LifecycleEvent, RecordingListener, RouteLifecycleListener};
pub use naming::{CommandBuilder, NamingError, TemplateCommandBuilder};
pub use observer::{ObserverError, PartitionObserver, SessionSnapshot};
pub use session::{RouteDirection, Session, TopicRoute};
