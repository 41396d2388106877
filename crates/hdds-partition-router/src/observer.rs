// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Partition reconciliation observer.
//!
//! Aggregates raw endpoint discovery events into session and topic route
//! lifecycle transitions.
//!
//! # Architecture
//!
//! ```text
//! on_discovered / on_modified / on_lost
//!   +-- FilterChain            (drop endpoint or individual partitions)
//!   +-- Membership (one lock)  Session -> TopicRoute -> {InstanceHandle}
//!   |                          InstanceHandle -> {Session}
//!   +-- dispatch queue         single thread, listeners in event order
//! ```
//!
//! A session key exists iff it holds at least one route, and a route key
//! exists iff its endpoint set is non-empty. Key insertions and removals are
//! the only source of lifecycle events.

use crate::endpoint::{EndpointInfo, InstanceHandle};
use crate::filter::{EndpointFilter, FilterChain};
use crate::listener::{LifecycleEvent, RouteLifecycleListener};
use crate::session::{Session, TopicRoute};
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::thread::{self, JoinHandle};
use thiserror::Error;

/// Observer errors.
#[derive(Debug, Error)]
pub enum ObserverError {
    #[error("failed to spawn dispatch thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("observer dispatcher is closed")]
    Closed,
}

/// Current membership of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub session: Session,
    /// Routes with the number of endpoints referencing each.
    pub routes: Vec<(TopicRoute, usize)>,
}

type RouteMembers = HashMap<TopicRoute, HashSet<InstanceHandle>>;

#[derive(Default)]
struct Membership {
    sessions: HashMap<Session, RouteMembers>,
    attribution: HashMap<InstanceHandle, HashSet<Session>>,
}

impl Membership {
    fn attach(
        &mut self,
        handle: InstanceHandle,
        session: Session,
        route: &TopicRoute,
        events: &mut Vec<LifecycleEvent>,
    ) {
        let routes = match self.sessions.entry(session.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                events.push(LifecycleEvent::CreateSession(session.clone()));
                entry.insert(HashMap::new())
            }
        };

        let members = match routes.entry(route.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                events.push(LifecycleEvent::CreateTopicRoute(
                    session.clone(),
                    route.clone(),
                ));
                entry.insert(HashSet::new())
            }
        };

        members.insert(handle);
        self.attribution.entry(handle).or_default().insert(session);
    }

    fn detach(
        &mut self,
        handle: InstanceHandle,
        session: &Session,
        route: &TopicRoute,
        events: &mut Vec<LifecycleEvent>,
    ) {
        if let Some(sessions) = self.attribution.get_mut(&handle) {
            sessions.remove(session);
            if sessions.is_empty() {
                self.attribution.remove(&handle);
            }
        }

        let Some(routes) = self.sessions.get_mut(session) else {
            return;
        };
        let Some(members) = routes.get_mut(route) else {
            return;
        };
        if !members.remove(&handle) {
            return;
        }

        if members.is_empty() {
            routes.remove(route);
            events.push(LifecycleEvent::DeleteTopicRoute(
                session.clone(),
                route.clone(),
            ));
        }

        if routes.is_empty() {
            self.sessions.remove(session);
            events.push(LifecycleEvent::DeleteSession(session.clone()));
        }
    }

    fn attributed(&self, handle: &InstanceHandle) -> BTreeSet<Session> {
        self.attribution
            .get(handle)
            .map(|sessions| sessions.iter().cloned().collect())
            .unwrap_or_default()
    }
}

enum DispatchMessage {
    Event(LifecycleEvent),
    Flush(mpsc::Sender<()>),
}

type ListenerList = Arc<RwLock<Vec<Arc<dyn RouteLifecycleListener>>>>;

/// Partition reconciliation observer.
///
/// Discovery callbacks are processed synchronously on the caller's thread;
/// lifecycle events are handed to a dedicated dispatch thread so listener
/// latency never stalls discovery.
pub struct PartitionObserver {
    filters: FilterChain,
    state: Mutex<Membership>,
    listeners: ListenerList,
    queue: Mutex<Option<mpsc::Sender<DispatchMessage>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl PartitionObserver {
    /// Create an observer and start its dispatch thread.
    pub fn new(filters: FilterChain) -> Result<Self, ObserverError> {
        let listeners: ListenerList = Arc::new(RwLock::new(Vec::new()));
        let (tx, rx) = mpsc::channel::<DispatchMessage>();

        let thread_listeners = Arc::clone(&listeners);
        let handle = thread::Builder::new()
            .name("hdds-prouter-dispatch".into())
            .spawn(move || dispatch_loop(rx, thread_listeners))?;

        Ok(Self {
            filters,
            state: Mutex::new(Membership::default()),
            listeners,
            queue: Mutex::new(Some(tx)),
            thread: Mutex::new(Some(handle)),
        })
    }

    /// Register a lifecycle listener.
    ///
    /// Listeners only see events produced after registration.
    pub fn add_listener(&self, listener: Arc<dyn RouteLifecycleListener>) {
        let mut listeners = match self.listeners.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        listeners.push(listener);
    }

    /// A publication or subscription appeared.
    pub fn on_discovered(&self, endpoint: &EndpointInfo) {
        let Some(partitions) = self.admit(endpoint) else {
            return;
        };
        let route = endpoint.topic_route();

        let mut state = self.lock_state();
        let mut events = Vec::new();
        for partition in partitions {
            state.attach(
                endpoint.handle,
                endpoint.session(&partition),
                &route,
                &mut events,
            );
        }
        self.enqueue(events);
    }

    /// An endpoint's partition list changed.
    ///
    /// Reconciles against the sessions currently attributed to the handle,
    /// not against a cached copy of the previous partition list.
    pub fn on_modified(&self, endpoint: &EndpointInfo) {
        let Some(partitions) = self.admit(endpoint) else {
            return;
        };
        let route = endpoint.topic_route();

        let mut state = self.lock_state();
        let current = state.attributed(&endpoint.handle);
        let wanted: Vec<Session> = partitions.iter().map(|p| endpoint.session(p)).collect();

        let mut events = Vec::new();
        for session in current.iter().filter(|s| !wanted.contains(s)) {
            state.detach(endpoint.handle, session, &route, &mut events);
        }
        for session in wanted {
            if !current.contains(&session) {
                state.attach(endpoint.handle, session, &route, &mut events);
            }
        }
        self.enqueue(events);
    }

    /// A publication or subscription disappeared.
    ///
    /// Unknown sessions or routes are ignored, so duplicate loss
    /// notifications are harmless.
    pub fn on_lost(&self, endpoint: &EndpointInfo) {
        let Some(partitions) = self.admit(endpoint) else {
            return;
        };
        let route = endpoint.topic_route();

        let mut state = self.lock_state();
        let mut events = Vec::new();
        for partition in partitions {
            state.detach(
                endpoint.handle,
                &endpoint.session(&partition),
                &route,
                &mut events,
            );
        }
        self.enqueue(events);
    }

    /// Current membership, sorted by session and route.
    pub fn snapshot(&self) -> Vec<SessionSnapshot> {
        let state = self.lock_state();
        let mut sessions: Vec<SessionSnapshot> = state
            .sessions
            .iter()
            .map(|(session, routes)| {
                let mut routes: Vec<(TopicRoute, usize)> = routes
                    .iter()
                    .map(|(route, members)| (route.clone(), members.len()))
                    .collect();
                routes.sort();
                SessionSnapshot {
                    session: session.clone(),
                    routes,
                }
            })
            .collect();
        sessions.sort_by(|a, b| a.session.cmp(&b.session));
        sessions
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.lock_state().sessions.len()
    }

    /// Sessions currently attributed to an endpoint.
    pub fn attributed_sessions(&self, handle: &InstanceHandle) -> Vec<Session> {
        self.lock_state().attributed(handle).into_iter().collect()
    }

    /// Block until every event queued so far has been delivered.
    ///
    /// Must not be called from a listener callback.
    pub fn flush(&self) -> Result<(), ObserverError> {
        let (ack_tx, ack_rx) = mpsc::channel();
        {
            let queue = self.lock_queue();
            let tx = queue.as_ref().ok_or(ObserverError::Closed)?;
            tx.send(DispatchMessage::Flush(ack_tx))
                .map_err(|_| ObserverError::Closed)?;
        }
        ack_rx.recv().map_err(|_| ObserverError::Closed)
    }

    /// Drain the dispatch queue and stop the dispatch thread.
    ///
    /// Safe to call multiple times.
    pub fn close(&self) {
        drop(self.lock_queue().take());

        let handle = match self.thread.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            // Joining from a listener callback would deadlock.
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                tracing::warn!("observer dispatch thread panicked");
            }
        }
    }

    /// Filter the endpoint and compute its admitted partitions (deduplicated,
    /// announcement order preserved). `None` means the endpoint is ignored.
    fn admit(&self, endpoint: &EndpointInfo) -> Option<Vec<String>> {
        if self.filters.ignore_endpoint(endpoint) {
            tracing::trace!(
                topic = %endpoint.topic,
                handle = %endpoint.handle,
                "endpoint ignored by filter"
            );
            return None;
        }

        let mut admitted: Vec<String> = Vec::new();
        for partition in endpoint.effective_partitions() {
            if self.filters.ignore_partition(&endpoint.topic, partition) {
                tracing::trace!(
                    topic = %endpoint.topic,
                    partition = partition,
                    "partition ignored by filter"
                );
                continue;
            }
            if !admitted.iter().any(|p| p == partition) {
                admitted.push(partition.to_string());
            }
        }
        Some(admitted)
    }

    fn enqueue(&self, events: Vec<LifecycleEvent>) {
        if events.is_empty() {
            return;
        }
        let queue = self.lock_queue();
        let Some(tx) = queue.as_ref() else {
            tracing::warn!(dropped = events.len(), "observer closed; dropping lifecycle events");
            return;
        };
        for event in events {
            tracing::debug!(event = ?event, "lifecycle event");
            if tx.send(DispatchMessage::Event(event)).is_err() {
                tracing::warn!("observer dispatch thread stopped; dropping lifecycle event");
                return;
            }
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, Membership> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_queue(&self) -> MutexGuard<'_, Option<mpsc::Sender<DispatchMessage>>> {
        match self.queue.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for PartitionObserver {
    fn drop(&mut self) {
        self.close();
    }
}

fn dispatch_loop(rx: mpsc::Receiver<DispatchMessage>, listeners: ListenerList) {
    for message in rx {
        match message {
            DispatchMessage::Event(event) => {
                let snapshot = match listeners.read() {
                    Ok(guard) => guard.clone(),
                    Err(poisoned) => poisoned.into_inner().clone(),
                };
                for listener in &snapshot {
                    event.dispatch(listener.as_ref());
                }
            }
            DispatchMessage::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
    tracing::debug!("observer dispatch thread exiting");
}
