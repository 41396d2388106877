// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Administrative command model and transport abstraction.
//!
//! The wire protocol used to reach the routing engine is not part of this
//! crate. Integrations implement [`CommandTransport`] on top of whatever
//! request/reply channel the routing engine exposes.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// Administrative action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Create,
    Delete,
}

impl CommandKind {
    /// Lower-case label for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Delete => "delete",
        }
    }
}

/// Request sent to the routing engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    /// Action to perform.
    pub kind: CommandKind,
    /// Routing engine instance the command targets.
    pub target_router: String,
    /// Entity the command applies to: the parent for `Create`, the fully
    /// qualified entity for `Delete`.
    pub resource: String,
    /// Name of the entity to create.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Configuration payload for `Create`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl CommandRequest {
    /// Build a create request.
    pub fn create(
        target_router: impl Into<String>,
        parent: impl Into<String>,
        name: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            kind: CommandKind::Create,
            target_router: target_router.into(),
            resource: parent.into(),
            name: Some(name.into()),
            body: Some(body.into()),
        }
    }

    /// Build a delete request.
    pub fn delete(target_router: impl Into<String>, entity: impl Into<String>) -> Self {
        Self {
            kind: CommandKind::Delete,
            target_router: target_router.into(),
            resource: entity.into(),
            name: None,
            body: None,
        }
    }

    /// Fully qualified entity affected by the request.
    pub fn entity(&self) -> String {
        match (&self.kind, &self.name) {
            (CommandKind::Create, Some(name)) => format!("{}::{}", self.resource, name),
            _ => self.resource.clone(),
        }
    }
}

/// Outcome reported by the routing engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    Ok,
    Error,
}

/// Response received from the routing engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub kind: ResponseKind,
    /// Diagnostic message.
    #[serde(default)]
    pub message: String,
}

impl CommandResponse {
    /// Successful response.
    pub fn ok() -> Self {
        Self {
            kind: ResponseKind::Ok,
            message: String::new(),
        }
    }

    /// Failed response with a diagnostic.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: ResponseKind::Error,
            message: message.into(),
        }
    }

    /// Check if the command was acknowledged.
    pub fn is_success(&self) -> bool {
        self.kind == ResponseKind::Ok
    }
}

/// Request/response channel to the routing engine.
///
/// `send` blocks for at most `timeout` and returns `None` when no response
/// arrived in time. The commander always calls it from a blocking worker.
pub trait CommandTransport: Send + Sync {
    fn send(&self, request: &CommandRequest, timeout: Duration) -> Option<CommandResponse>;
}

/// Transport that acknowledges every command without sending it.
///
/// Used by the CLI to preview the commands a discovery trace produces.
#[derive(Debug, Default)]
pub struct DryRunTransport {
    sent: Mutex<Vec<CommandRequest>>,
}

impl DryRunTransport {
    /// Create a dry-run transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests acknowledged so far.
    pub fn sent(&self) -> Vec<CommandRequest> {
        match self.sent.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl CommandTransport for DryRunTransport {
    fn send(&self, request: &CommandRequest, _timeout: Duration) -> Option<CommandResponse> {
        tracing::info!(
            kind = request.kind.as_str(),
            target = %request.target_router,
            entity = %request.entity(),
            "dry-run command"
        );
        let mut sent = match self.sent.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        sent.push(request.clone());
        Some(CommandResponse::ok())
    }
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================

/// Scripted transport for tests.
///
/// Responses are popped from a queue; once the queue is empty every request
/// succeeds. An optional latency simulates the round trip.
#[derive(Debug, Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<Option<CommandResponse>>>,
    calls: Mutex<Vec<CommandRequest>>,
    latency: Mutex<Duration>,
}

impl MockTransport {
    /// Create a mock that acknowledges everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next outcome (`None` simulates a timeout).
    pub fn push_outcome(&self, outcome: Option<CommandResponse>) {
        let mut script = match self.script.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        script.push_back(outcome);
    }

    /// Queue `count` timeouts.
    pub fn push_timeouts(&self, count: usize) {
        for _ in 0..count {
            self.push_outcome(None);
        }
    }

    /// Delay applied to every send.
    pub fn set_latency(&self, latency: Duration) {
        let mut current = match self.latency.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *current = latency;
    }

    /// Requests received so far, in order.
    pub fn calls(&self) -> Vec<CommandRequest> {
        match self.calls.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Number of requests of `kind` received so far.
    pub fn count(&self, kind: CommandKind) -> usize {
        self.calls().iter().filter(|r| r.kind == kind).count()
    }
}

impl CommandTransport for MockTransport {
    fn send(&self, request: &CommandRequest, _timeout: Duration) -> Option<CommandResponse> {
        {
            let mut calls = match self.calls.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            calls.push(request.clone());
        }

        let latency = match self.latency.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        };
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }

        let mut script = match self.script.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        script.pop_front().unwrap_or_else(|| Some(CommandResponse::ok()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_entity() {
        let create = CommandRequest::create("rs", "rs::domain_route", "Square(A)", "<session/>");
        assert_eq!(create.entity(), "rs::domain_route::Square(A)");

        let delete = CommandRequest::delete("rs", "rs::domain_route::Square(A)");
        assert_eq!(delete.entity(), "rs::domain_route::Square(A)");
        assert_eq!(delete.body, None);
    }

    #[test]
    fn test_request_json_skips_empty_fields() {
        let delete = CommandRequest::delete("rs", "rs::x");
        let json = serde_json::to_string(&delete).expect("serialize");
        assert_eq!(
            json,
            r#"{"kind":"delete","target_router":"rs","resource":"rs::x"}"#
        );
    }

    #[test]
    fn test_mock_transport_script() {
        let mock = MockTransport::new();
        mock.push_timeouts(1);
        mock.push_outcome(Some(CommandResponse::error("busy")));

        let request = CommandRequest::delete("rs", "rs::x");
        let timeout = Duration::from_millis(10);

        assert_eq!(mock.send(&request, timeout), None);
        assert_eq!(
            mock.send(&request, timeout),
            Some(CommandResponse::error("busy"))
        );
        assert!(mock
            .send(&request, timeout)
            .is_some_and(|r| r.is_success()));
        assert_eq!(mock.count(CommandKind::Delete), 3);
        assert_eq!(mock.count(CommandKind::Create), 0);
    }

    #[test]
    fn test_dry_run_records() {
        let transport = DryRunTransport::new();
        let request = CommandRequest::delete("rs", "rs::x");
        assert!(transport
            .send(&request, Duration::from_secs(1))
            .is_some_and(|r| r.is_success()));
        assert_eq!(transport.sent(), vec![request]);
    }
}
