// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Endpoint and partition filters.
//!
//! Filters run before the observer touches its membership map. An endpoint
//! may be ignored outright, or individual partitions may be dropped from the
//! effective partition set. Filters are evaluated per call; a verdict is
//! never revisited for endpoints already admitted.

use crate::endpoint::{parse_dotted_hex, EndpointInfo, HandleParseError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Filter construction errors.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid participant prefix: {0}")]
    InvalidPrefix(#[from] HandleParseError),
}

/// Predicate deciding whether discovery input should be ignored.
///
/// Every method defaults to "do not ignore".
pub trait EndpointFilter: Send + Sync {
    /// Ignore a discovered publication.
    fn ignore_publication(&self, _endpoint: &EndpointInfo) -> bool {
        false
    }

    /// Ignore a discovered subscription.
    fn ignore_subscription(&self, _endpoint: &EndpointInfo) -> bool {
        false
    }

    /// Ignore one partition of an endpoint on `topic`.
    fn ignore_partition(&self, _topic: &str, _partition: &str) -> bool {
        false
    }
}

/// Ordered list of filters. The first filter answering `true` wins.
#[derive(Clone, Default)]
pub struct FilterChain {
    filters: Vec<Arc<dyn EndpointFilter>>,
}

impl FilterChain {
    /// Create an empty chain (ignores nothing).
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a shared filter. The caller keeps its handle, which is how a
    /// live [`ParticipantFilter`] is updated after the chain is built.
    pub fn push(&mut self, filter: Arc<dyn EndpointFilter>) {
        self.filters.push(filter);
    }

    /// Builder-style append.
    pub fn with(mut self, filter: impl EndpointFilter + 'static) -> Self {
        self.push(Arc::new(filter));
        self
    }

    /// Number of filters in the chain.
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Check if the chain has no filters.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Check the endpoint against the publication or subscription predicate.
    pub fn ignore_endpoint(&self, endpoint: &EndpointInfo) -> bool {
        if endpoint.is_publication() {
            self.ignore_publication(endpoint)
        } else {
            self.ignore_subscription(endpoint)
        }
    }
}

impl EndpointFilter for FilterChain {
    fn ignore_publication(&self, endpoint: &EndpointInfo) -> bool {
        self.filters.iter().any(|f| f.ignore_publication(endpoint))
    }

    fn ignore_subscription(&self, endpoint: &EndpointInfo) -> bool {
        self.filters.iter().any(|f| f.ignore_subscription(endpoint))
    }

    fn ignore_partition(&self, topic: &str, partition: &str) -> bool {
        self.filters
            .iter()
            .any(|f| f.ignore_partition(topic, partition))
    }
}

/// Compile a glob (`*` and `?`) into an anchored regex.
pub fn glob_to_regex(pattern: &str) -> Result<Regex, FilterError> {
    let escaped = regex::escape(pattern)
        .replace(r"\*", ".*")
        .replace(r"\?", ".");
    Regex::new(&format!("^{}$", escaped)).map_err(|source| FilterError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

fn compile_all(patterns: &[String]) -> Result<Vec<Regex>, FilterError> {
    patterns.iter().map(|p| glob_to_regex(p)).collect()
}

/// Topic selection for routing.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(tag = "type", content = "value")]
pub enum TopicSelection {
    /// Route all topics.
    #[default]
    All,

    /// Route only specified topics.
    Include(Vec<String>),

    /// Route all topics except specified.
    Exclude(Vec<String>),

    /// Route topics matching pattern (glob).
    Pattern(String),
}

impl TopicSelection {
    /// Check that every pattern in the selection compiles.
    pub fn validate(&self) -> Result<(), FilterError> {
        TopicSelectionFilter::new(self).map(|_| ())
    }
}

/// Ignores endpoints whose topic is outside a [`TopicSelection`].
#[derive(Debug, Clone)]
pub struct TopicSelectionFilter {
    mode: SelectionMode,
    patterns: Vec<Regex>,
}

#[derive(Debug, Clone, Copy)]
enum SelectionMode {
    All,
    Include,
    Exclude,
}

impl TopicSelectionFilter {
    /// Compile a topic selection.
    pub fn new(selection: &TopicSelection) -> Result<Self, FilterError> {
        let (mode, patterns) = match selection {
            TopicSelection::All => (SelectionMode::All, Vec::new()),
            TopicSelection::Include(topics) => (SelectionMode::Include, compile_all(topics)?),
            TopicSelection::Exclude(topics) => (SelectionMode::Exclude, compile_all(topics)?),
            TopicSelection::Pattern(pattern) => {
                (SelectionMode::Include, vec![glob_to_regex(pattern)?])
            }
        };
        Ok(Self { mode, patterns })
    }

    /// Check if a topic is selected for routing.
    pub fn matches(&self, topic: &str) -> bool {
        let hit = || self.patterns.iter().any(|re| re.is_match(topic));
        match self.mode {
            SelectionMode::All => true,
            SelectionMode::Include => hit(),
            SelectionMode::Exclude => !hit(),
        }
    }
}

impl EndpointFilter for TopicSelectionFilter {
    fn ignore_publication(&self, endpoint: &EndpointInfo) -> bool {
        !self.matches(&endpoint.topic)
    }

    fn ignore_subscription(&self, endpoint: &EndpointInfo) -> bool {
        !self.matches(&endpoint.topic)
    }
}

/// Ignores partitions by name pattern.
///
/// Partition expressions containing DDS wildcard characters cannot be mapped
/// onto a concrete session and can be dropped as a whole.
#[derive(Debug, Clone, Default)]
pub struct PartitionPatternFilter {
    patterns: Vec<Regex>,
    ignore_wildcards: bool,
}

impl PartitionPatternFilter {
    /// Compile partition patterns.
    pub fn new(patterns: &[String], ignore_wildcards: bool) -> Result<Self, FilterError> {
        Ok(Self {
            patterns: compile_all(patterns)?,
            ignore_wildcards,
        })
    }

    fn is_wildcard(partition: &str) -> bool {
        partition.contains(['*', '?', '['])
    }
}

impl EndpointFilter for PartitionPatternFilter {
    fn ignore_partition(&self, _topic: &str, partition: &str) -> bool {
        (self.ignore_wildcards && Self::is_wildcard(partition))
            || self.patterns.iter().any(|re| re.is_match(partition))
    }
}

/// Topic name prefixes reserved for DDS and vendor infrastructure.
pub const BUILTIN_TOPIC_PREFIXES: &[&str] = &["DCPS", "rti/", "ros_discovery_info"];

/// Ignores builtin and infrastructure topics.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinTopicFilter;

impl BuiltinTopicFilter {
    fn is_builtin(topic: &str) -> bool {
        BUILTIN_TOPIC_PREFIXES
            .iter()
            .any(|prefix| topic.starts_with(prefix))
    }
}

impl EndpointFilter for BuiltinTopicFilter {
    fn ignore_publication(&self, endpoint: &EndpointInfo) -> bool {
        Self::is_builtin(&endpoint.topic)
    }

    fn ignore_subscription(&self, endpoint: &EndpointInfo) -> bool {
        Self::is_builtin(&endpoint.topic)
    }
}

/// Ignores endpoints owned by the routing engine's own participants.
///
/// Matching uses the 12-byte GUID prefix of the endpoint handle. The set is
/// live: participants can be registered after the observer is running.
#[derive(Debug, Default)]
pub struct ParticipantFilter {
    prefixes: RwLock<HashSet<[u8; 12]>>,
}

impl ParticipantFilter {
    /// Create an empty participant filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a filter from dotted-hex prefixes ("01.0f.ac.10.00.00.00.00.00.00.00.01").
    pub fn from_prefixes(prefixes: &[String]) -> Result<Self, FilterError> {
        let filter = Self::new();
        for prefix in prefixes {
            filter.add_participant(parse_dotted_hex::<12>(prefix)?);
        }
        Ok(filter)
    }

    /// Start ignoring endpoints of a participant.
    pub fn add_participant(&self, prefix: [u8; 12]) {
        let mut prefixes = match self.prefixes.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        prefixes.insert(prefix);
    }

    /// Stop ignoring endpoints of a participant.
    pub fn remove_participant(&self, prefix: &[u8; 12]) -> bool {
        let mut prefixes = match self.prefixes.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        prefixes.remove(prefix)
    }

    fn owns(&self, endpoint: &EndpointInfo) -> bool {
        let prefixes = match self.prefixes.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        prefixes.contains(&endpoint.handle.prefix)
    }
}

impl EndpointFilter for ParticipantFilter {
    fn ignore_publication(&self, endpoint: &EndpointInfo) -> bool {
        self.owns(endpoint)
    }

    fn ignore_subscription(&self, endpoint: &EndpointInfo) -> bool {
        self.owns(endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::InstanceHandle;

    fn publication(topic: &str) -> EndpointInfo {
        EndpointInfo::publication(InstanceHandle::from_bytes([1; 16]), topic, "T", Vec::new())
    }

    #[test]
    fn test_glob_to_regex() {
        assert!(glob_to_regex("*").expect("glob").is_match("anything"));
        assert!(glob_to_regex("Sensor/*")
            .expect("glob")
            .is_match("Sensor/Temperature"));
        assert!(glob_to_regex("?est").expect("glob").is_match("Test"));
        assert!(!glob_to_regex("?est").expect("glob").is_match("Quest"));
        // Regex metacharacters are literal
        assert!(glob_to_regex("a.b").expect("glob").is_match("a.b"));
        assert!(!glob_to_regex("a.b").expect("glob").is_match("axb"));
    }

    #[test]
    fn test_topic_selection_include() {
        let filter = TopicSelectionFilter::new(&TopicSelection::Include(vec![
            "Temperature".into(),
            "Sensor/*".into(),
        ]))
        .expect("compile");

        assert!(filter.matches("Temperature"));
        assert!(filter.matches("Sensor/Pressure"));
        assert!(!filter.matches("Humidity"));
        assert!(filter.ignore_publication(&publication("Humidity")));
    }

    #[test]
    fn test_topic_selection_exclude() {
        let filter = TopicSelectionFilter::new(&TopicSelection::Exclude(vec!["Internal/*".into()]))
            .expect("compile");

        assert!(filter.matches("Temperature"));
        assert!(!filter.matches("Internal/Debug"));
    }

    #[test]
    fn test_topic_selection_pattern_and_all() {
        let pattern =
            TopicSelectionFilter::new(&TopicSelection::Pattern("Sensor/*".into())).expect("compile");
        assert!(pattern.matches("Sensor/Temperature"));
        assert!(!pattern.matches("Vehicle/Speed"));

        let all = TopicSelectionFilter::new(&TopicSelection::All).expect("compile");
        assert!(all.matches("anything"));
    }

    #[test]
    fn test_partition_filter() {
        let filter = PartitionPatternFilter::new(&["debug*".into()], true).expect("compile");

        assert!(filter.ignore_partition("Square", "debug_1"));
        assert!(filter.ignore_partition("Square", "A*"));
        assert!(!filter.ignore_partition("Square", "A"));
        assert!(!filter.ignore_partition("Square", ""));

        let permissive = PartitionPatternFilter::new(&[], false).expect("compile");
        assert!(!permissive.ignore_partition("Square", "A*"));
    }

    #[test]
    fn test_builtin_topic_filter() {
        let filter = BuiltinTopicFilter;
        assert!(filter.ignore_publication(&publication("DCPSPublication")));
        assert!(filter.ignore_publication(&publication("rti/distlog")));
        assert!(!filter.ignore_publication(&publication("Square")));
    }

    #[test]
    fn test_participant_filter() {
        let filter = ParticipantFilter::from_prefixes(&["01.01.01.01.01.01.01.01.01.01.01.01".into()])
            .expect("parse");
        assert!(filter.ignore_publication(&publication("Square")));

        assert!(filter.remove_participant(&[1; 12]));
        assert!(!filter.ignore_publication(&publication("Square")));

        assert!(ParticipantFilter::from_prefixes(&["01.02".into()]).is_err());
    }

    #[test]
    fn test_chain_first_match_wins() {
        let chain = FilterChain::new()
            .with(BuiltinTopicFilter)
            .with(PartitionPatternFilter::new(&["secret".into()], false).expect("compile"));

        assert_eq!(chain.len(), 2);
        assert!(chain.ignore_endpoint(&publication("DCPSTopic")));
        assert!(!chain.ignore_endpoint(&publication("Square")));
        assert!(chain.ignore_partition("Square", "secret"));
        assert!(!chain.ignore_partition("Square", "A"));
    }

    #[test]
    fn test_pushed_participant_filter_stays_live() {
        let participants = Arc::new(ParticipantFilter::new());
        let mut chain = FilterChain::new().with(BuiltinTopicFilter);
        chain.push(Arc::clone(&participants) as Arc<dyn EndpointFilter>);
        assert_eq!(chain.len(), 2);
        assert!(!chain.ignore_endpoint(&publication("Square")));

        participants.add_participant([1; 12]);
        assert!(chain.ignore_endpoint(&publication("Square")));

        assert!(participants.remove_participant(&[1; 12]));
        assert!(!chain.ignore_endpoint(&publication("Square")));
    }

    #[test]
    fn test_empty_chain_ignores_nothing() {
        let chain = FilterChain::new();
        assert!(chain.is_empty());
        assert!(!chain.ignore_endpoint(&publication("DCPSTopic")));
        assert!(!chain.ignore_partition("Square", "A*"));
    }

    #[test]
    fn test_brackets_are_literal_in_globs() {
        let selection = TopicSelection::Include(vec!["[unclosed".into()]);
        assert!(selection.validate().is_ok());

        let filter = TopicSelectionFilter::new(&selection).expect("compile");
        assert!(filter.matches("[unclosed"));
    }
}
