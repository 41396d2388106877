// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Service configuration.
//!
//! The observer and commander take plain parameters; this module is the
//! file-based layer used by the binary.

use crate::commander::CommanderConfig;
use crate::filter::{
    BuiltinTopicFilter, FilterChain, FilterError, ParticipantFilter, PartitionPatternFilter, TopicSelection,
    TopicSelectionFilter,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Partition router service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name (for identification).
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Command dispatch settings.
    #[serde(default)]
    pub commander: CommanderSettings,

    /// Entity naming and payload templates.
    #[serde(default)]
    pub naming: NamingConfig,

    /// Endpoint and partition filters.
    #[serde(default)]
    pub filters: FilterConfig,
}

fn default_service_name() -> String {
    "hdds-partition-router".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            commander: CommanderSettings::default(),
            naming: NamingConfig::default(),
            filters: FilterConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Example configuration written by `gen-config`.
    pub fn example() -> Self {
        Self {
            filters: FilterConfig {
                topics: TopicSelection::Exclude(vec!["Internal/*".into()]),
                ignore_partitions: vec!["debug*".into()],
                ignored_participants: vec!["01.0f.ac.10.00.00.00.00.00.00.00.01".into()],
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::Invalid("Service name is empty".into()));
        }

        let commander = &self.commander;
        if commander.target_router.is_empty() {
            return Err(ConfigError::Invalid("Target router is empty".into()));
        }
        if commander.retry_delay_ms == 0 {
            return Err(ConfigError::Invalid("Retry delay must be non-zero".into()));
        }
        if commander.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "Request timeout must be non-zero".into(),
            ));
        }

        let naming = &self.naming;
        for (field, value) in [
            ("domain_route", &naming.domain_route),
            ("session_name", &naming.session_name),
            ("route_name", &naming.route_name),
            ("session_config", &naming.session_config),
            ("route_config", &naming.route_config),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("naming.{} is empty", field)));
            }
        }

        self.build_filters().map(|_| ())
    }

    /// Build the filter chain described by `[filters]`.
    pub fn build_filters(&self) -> Result<FilterChain, ConfigError> {
        self.filters.build()
    }
}

/// `[commander]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommanderSettings {
    /// Routing engine instance commands are addressed to.
    #[serde(default = "default_target_router")]
    pub target_router: String,

    /// Delay between attempts (milliseconds).
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Per-request timeout (milliseconds).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_target_router() -> String {
    "hdds-router".to_string()
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_request_timeout_ms() -> u64 {
    2000
}

impl Default for CommanderSettings {
    fn default() -> Self {
        Self {
            target_router: default_target_router(),
            retry_delay_ms: default_retry_delay_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl CommanderSettings {
    /// Commander parameters for these settings.
    pub fn commander_config(&self) -> CommanderConfig {
        CommanderConfig {
            target_router: self.target_router.clone(),
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
        }
    }
}

/// `[naming]` section, consumed by
/// [`TemplateCommandBuilder`](crate::naming::TemplateCommandBuilder).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingConfig {
    /// Domain route that hosts the sessions.
    #[serde(default = "default_domain_route")]
    pub domain_route: String,

    /// Participant attached to the observed domain.
    #[serde(default = "default_observed_participant")]
    pub observed_participant: String,

    /// Participant attached to the remote domain.
    #[serde(default = "default_remote_participant")]
    pub remote_participant: String,

    /// Stands in for the default (empty) partition inside entity names.
    #[serde(default = "default_partition_label")]
    pub default_partition_label: String,

    /// Session name template.
    #[serde(default = "default_session_name")]
    pub session_name: String,

    /// Topic route name template.
    #[serde(default = "default_route_name")]
    pub route_name: String,

    /// Session configuration payload template.
    #[serde(default = "default_session_config")]
    pub session_config: String,

    /// Topic route configuration payload template.
    #[serde(default = "default_route_config")]
    pub route_config: String,
}

fn default_domain_route() -> String {
    "domain_route".to_string()
}

fn default_observed_participant() -> String {
    "1".to_string()
}

fn default_remote_participant() -> String {
    "2".to_string()
}

fn default_partition_label() -> String {
    "default".to_string()
}

fn default_session_name() -> String {
    "{topic}({partition})".to_string()
}

fn default_route_name() -> String {
    "{topic}.{direction}".to_string()
}

fn default_session_config() -> String {
    concat!(
        "<session name=\"{session}\">",
        "<publisher_qos><partition><name><element>{partition}</element></name></partition></publisher_qos>",
        "<subscriber_qos><partition><name><element>{partition}</element></name></partition></subscriber_qos>",
        "</session>"
    )
    .to_string()
}

fn default_route_config() -> String {
    concat!(
        "<topic_route name=\"{route}\">",
        "<input participant=\"{input_participant}\">",
        "<topic_name>{topic}</topic_name>",
        "<registered_type_name>{type}</registered_type_name>",
        "</input>",
        "<output participant=\"{output_participant}\">",
        "<topic_name>{topic}</topic_name>",
        "<registered_type_name>{type}</registered_type_name>",
        "</output>",
        "</topic_route>"
    )
    .to_string()
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            domain_route: default_domain_route(),
            observed_participant: default_observed_participant(),
            remote_participant: default_remote_participant(),
            default_partition_label: default_partition_label(),
            session_name: default_session_name(),
            route_name: default_route_name(),
            session_config: default_session_config(),
            route_config: default_route_config(),
        }
    }
}

/// `[filters]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Drop DDS builtin and infrastructure topics.
    #[serde(default = "default_true")]
    pub ignore_builtin_topics: bool,

    /// Drop partitions containing wildcard characters.
    #[serde(default = "default_true")]
    pub ignore_wildcard_partitions: bool,

    /// Topics to route.
    #[serde(default)]
    pub topics: TopicSelection,

    /// Partition globs to ignore.
    #[serde(default)]
    pub ignore_partitions: Vec<String>,

    /// GUID prefixes (12 dotted hex bytes) of participants to ignore,
    /// typically the routing engine's own.
    #[serde(default)]
    pub ignored_participants: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            ignore_builtin_topics: true,
            ignore_wildcard_partitions: true,
            topics: TopicSelection::All,
            ignore_partitions: Vec::new(),
            ignored_participants: Vec::new(),
        }
    }
}

impl FilterConfig {
    /// Build the filter chain, cheapest checks first.
    pub fn build(&self) -> Result<FilterChain, ConfigError> {
        let invalid = |e: FilterError| ConfigError::Invalid(e.to_string());
        let mut chain = FilterChain::new();

        if self.ignore_builtin_topics {
            chain = chain.with(BuiltinTopicFilter);
        }
        if !self.ignored_participants.is_empty() {
            chain = chain.with(
                ParticipantFilter::from_prefixes(&self.ignored_participants).map_err(invalid)?,
            );
        }
        if !matches!(self.topics, TopicSelection::All) {
            chain = chain.with(TopicSelectionFilter::new(&self.topics).map_err(invalid)?);
        }
        if self.ignore_wildcard_partitions || !self.ignore_partitions.is_empty() {
            chain = chain.with(
                PartitionPatternFilter::new(
                    &self.ignore_partitions,
                    self.ignore_wildcard_partitions,
                )
                .map_err(invalid)?,
            );
        }

        Ok(chain)
    }
}
