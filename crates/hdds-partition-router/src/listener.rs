// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Session and topic route lifecycle notifications.

use crate::session::{Session, TopicRoute};

/// Receiver of lifecycle transitions produced by the partition observer.
///
/// Callbacks run on the observer's dispatch thread, one at a time and in the
/// order the transitions were produced. Implementations should return
/// quickly; long work belongs on the implementation's own executor.
pub trait RouteLifecycleListener: Send + Sync {
    /// First endpoint referencing the session appeared.
    fn create_session(&self, session: &Session);

    /// Last endpoint referencing the session disappeared.
    fn delete_session(&self, session: &Session);

    /// First endpoint of this direction appeared within the session.
    fn create_topic_route(&self, session: &Session, route: &TopicRoute);

    /// Last endpoint of this direction disappeared from the session.
    fn delete_topic_route(&self, session: &Session, route: &TopicRoute);
}

/// One lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    CreateSession(Session),
    DeleteSession(Session),
    CreateTopicRoute(Session, TopicRoute),
    DeleteTopicRoute(Session, TopicRoute),
}

impl LifecycleEvent {
    /// Session the event applies to.
    pub fn session(&self) -> &Session {
        match self {
            Self::CreateSession(s)
            | Self::DeleteSession(s)
            | Self::CreateTopicRoute(s, _)
            | Self::DeleteTopicRoute(s, _) => s,
        }
    }

    /// Deliver the event to a listener.
    pub fn dispatch(&self, listener: &dyn RouteLifecycleListener) {
        match self {
            Self::CreateSession(session) => listener.create_session(session),
            Self::DeleteSession(session) => listener.delete_session(session),
            Self::CreateTopicRoute(session, route) => listener.create_topic_route(session, route),
            Self::DeleteTopicRoute(session, route) => listener.delete_topic_route(session, route),
        }
    }
}

/// Listener that records every event, in order.
///
/// Used by the CLI to print the reconciled transitions and by tests.
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: std::sync::Mutex<Vec<LifecycleEvent>>,
}

impl RecordingListener {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the events recorded so far.
    pub fn events(&self) -> Vec<LifecycleEvent> {
        match self.events.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Remove and return the events recorded so far.
    pub fn take(&self) -> Vec<LifecycleEvent> {
        let mut events = match self.events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::take(&mut *events)
    }

    fn record(&self, event: LifecycleEvent) {
        let mut events = match self.events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        events.push(event);
    }
}

impl RouteLifecycleListener for RecordingListener {
    fn create_session(&self, session: &Session) {
        self.record(LifecycleEvent::CreateSession(session.clone()));
    }

    fn delete_session(&self, session: &Session) {
        self.record(LifecycleEvent::DeleteSession(session.clone()));
    }

    fn create_topic_route(&self, session: &Session, route: &TopicRoute) {
        self.record(LifecycleEvent::CreateTopicRoute(
            session.clone(),
            route.clone(),
        ));
    }

    fn delete_topic_route(&self, session: &Session, route: &TopicRoute) {
        self.record(LifecycleEvent::DeleteTopicRoute(
            session.clone(),
            route.clone(),
        ));
    }
}
