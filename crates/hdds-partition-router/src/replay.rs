// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery scripts.
//!
//! A script is a JSON-lines file, one discovery notification per line:
//!
//! ```text
//! {"event":"discovered","handle":"01.0f.00.00.00.00.00.00.00.00.00.01.00.00.01.03",
//!  "direction":"out","topic":"Square","type_name":"ShapeType","partitions":["A"]}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

use crate::endpoint::{EndpointInfo, HandleParseError, InstanceHandle};
use crate::observer::PartitionObserver;
use crate::session::RouteDirection;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

/// Script errors.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("line {line}: invalid handle: {source}")]
    InvalidHandle {
        line: usize,
        #[source]
        source: HandleParseError,
    },
}

/// Discovery notification kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryKind {
    Discovered,
    Modified,
    Lost,
}

#[derive(Debug, Deserialize)]
struct ScriptLine {
    event: DiscoveryKind,
    handle: String,
    direction: RouteDirection,
    topic: String,
    type_name: String,
    #[serde(default)]
    partitions: Vec<String>,
}

/// One scripted discovery notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayEvent {
    pub kind: DiscoveryKind,
    pub endpoint: EndpointInfo,
}

impl ReplayEvent {
    /// Feed the notification to an observer.
    pub fn apply(&self, observer: &PartitionObserver) {
        match self.kind {
            DiscoveryKind::Discovered => observer.on_discovered(&self.endpoint),
            DiscoveryKind::Modified => observer.on_modified(&self.endpoint),
            DiscoveryKind::Lost => observer.on_lost(&self.endpoint),
        }
    }
}

/// Parse one script line. `line` is 1-based and only used in errors.
pub fn parse_line(text: &str, line: usize) -> Result<Option<ReplayEvent>, ReplayError> {
    let text = text.trim();
    if text.is_empty() || text.starts_with('#') {
        return Ok(None);
    }

    let raw: ScriptLine =
        serde_json::from_str(text).map_err(|source| ReplayError::Json { line, source })?;
    let handle: InstanceHandle = raw
        .handle
        .parse()
        .map_err(|source| ReplayError::InvalidHandle { line, source })?;

    Ok(Some(ReplayEvent {
        kind: raw.event,
        endpoint: EndpointInfo {
            handle,
            direction: raw.direction,
            topic: raw.topic,
            type_name: raw.type_name,
            partitions: raw.partitions,
        },
    }))
}

/// Read a whole script.
pub fn read_script<R: BufRead>(reader: R) -> Result<Vec<ReplayEvent>, ReplayError> {
    let mut events = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        if let Some(event) = parse_line(&line?, index + 1)? {
            events.push(event);
        }
    }
    Ok(events)
}

/// Load a script from a file.
pub fn load_script<P: AsRef<Path>>(path: P) -> Result<Vec<ReplayEvent>, ReplayError> {
    let file = File::open(path)?;
    read_script(BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterChain;
    use crate::listener::{LifecycleEvent, RecordingListener};
    use crate::session::Session;
    use std::sync::Arc;

    const HANDLE: &str = "01.0f.00.00.00.00.00.00.00.00.00.01.00.00.01.03";

    fn line(event: &str, partition: &str) -> String {
        format!(
            r#"{{"event":"{event}","handle":"{HANDLE}","direction":"out","topic":"Square","type_name":"Shape","partitions":["{partition}"]}}"#
        )
    }

    fn script() -> String {
        [
            "# square publisher moves from A to B".to_string(),
            line("discovered", "A"),
            String::new(),
            line("modified", "B"),
            line("lost", "B"),
        ]
        .join("\n")
    }

    #[test]
    fn test_read_script() {
        let events = read_script(script().as_bytes()).expect("parse");
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].kind, DiscoveryKind::Discovered);
        assert_eq!(events[1].endpoint.partitions, vec!["B".to_string()]);
        assert_eq!(events[2].endpoint.handle.to_string(), HANDLE);
        assert!(events[2].endpoint.is_publication());
    }

    #[test]
    fn test_missing_partitions_means_default() {
        let line = format!(
            r#"{{"event":"discovered","handle":"{HANDLE}","direction":"in","topic":"Circle","type_name":"Shape"}}"#
        );
        let event = parse_line(&line, 1).expect("parse").expect("event");
        assert_eq!(event.endpoint.direction, RouteDirection::In);
        assert_eq!(event.endpoint.effective_partitions(), vec![""]);
    }

    #[test]
    fn test_errors_carry_line_numbers() {
        let bad_json = "{\"event\":\"discovered\"";
        assert!(matches!(
            parse_line(bad_json, 7),
            Err(ReplayError::Json { line: 7, .. })
        ));

        let bad_handle = r#"{"event":"lost","handle":"01.02","direction":"out","topic":"T","type_name":"X"}"#;
        assert!(matches!(
            parse_line(bad_handle, 3),
            Err(ReplayError::InvalidHandle { line: 3, .. })
        ));
    }

    #[test]
    fn test_apply_to_observer() {
        let observer = PartitionObserver::new(FilterChain::new()).expect("observer");
        let recorder = Arc::new(RecordingListener::new());
        observer.add_listener(recorder.clone());

        for event in read_script(script().as_bytes()).expect("parse") {
            event.apply(&observer);
        }
        observer.flush().expect("flush");

        let sessions: Vec<LifecycleEvent> = recorder
            .events()
            .into_iter()
            .filter(|e| {
                matches!(
                    e,
                    LifecycleEvent::CreateSession(_) | LifecycleEvent::DeleteSession(_)
                )
            })
            .collect();
        assert_eq!(
            sessions,
            vec![
                LifecycleEvent::CreateSession(Session::new("Square", "A")),
                LifecycleEvent::DeleteSession(Session::new("Square", "A")),
                LifecycleEvent::CreateSession(Session::new("Square", "B")),
                LifecycleEvent::DeleteSession(Session::new("Square", "B")),
            ]
        );
        assert_eq!(observer.session_count(), 0);
    }

    #[test]
    fn test_load_script_from_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("events.jsonl");
        std::fs::write(&path, script()).expect("write");
        assert_eq!(load_script(&path).expect("load").len(), 3);
    }
}
