// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Retrying command dispatcher.
//!
//! Turns lifecycle transitions into routing engine commands. Every
//! `(session, route)` key owns at most one intent; a newer intent for the
//! same key cancels the older one's future retries, then waits for its
//! in-flight attempt (if any) before sending, so a key never has two
//! attempts racing.
//!
//! ```text
//! create_session(S) ──► intent #1 ── send ─ timeout ─ sleep ─ send ─ ...
//! delete_session(S) ──► cancel #1 ─► intent #2 ── (await #1) ── send ─ ok ─► cleared
//! ```

use crate::command::{CommandKind, CommandRequest, CommandTransport};
use crate::listener::RouteLifecycleListener;
use crate::naming::{CommandBuilder, NamingError};
use crate::session::{Session, TopicRoute};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Default delay between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Default per-request transport timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(2000);

/// Commander errors.
#[derive(Debug, Error)]
pub enum CommanderError {
    #[error("naming error: {0}")]
    Naming(#[from] NamingError),

    #[error("no tokio runtime available")]
    NoRuntime,

    #[error("commander is shut down")]
    ShutDown,
}

/// Commander parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommanderConfig {
    /// Routing engine instance every command targets.
    pub target_router: String,
    /// Fixed delay between attempts of one intent.
    pub retry_delay: Duration,
    /// Timeout handed to the transport for each attempt.
    pub request_timeout: Duration,
}

impl CommanderConfig {
    /// Parameters with default timings.
    pub fn new(target_router: impl Into<String>) -> Self {
        Self {
            target_router: target_router.into(),
            retry_delay: DEFAULT_RETRY_DELAY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Commander counters.
#[derive(Debug, Default)]
pub struct CommanderStats {
    /// Requests handed to the transport.
    pub attempts: AtomicU64,
    /// Acknowledged requests.
    pub successes: AtomicU64,
    /// Explicit error responses.
    pub failures: AtomicU64,
    /// Attempts without a response.
    pub timeouts: AtomicU64,
    /// Intents canceled by a newer intent for the same key.
    pub superseded: AtomicU64,
    /// Lifecycle events that could not be turned into a request.
    pub naming_errors: AtomicU64,
}

impl CommanderStats {
    /// Get snapshot of current stats.
    pub fn snapshot(&self) -> CommanderStatsSnapshot {
        CommanderStatsSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            superseded: self.superseded.load(Ordering::Relaxed),
            naming_errors: self.naming_errors.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time copy of [`CommanderStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CommanderStatsSnapshot {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub superseded: u64,
    pub naming_errors: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct IntentKey {
    session: Session,
    route: Option<TopicRoute>,
}

impl fmt::Display for IntentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.route {
            Some(route) => write!(f, "{}/{}", self.session, route),
            None => write!(f, "{}", self.session),
        }
    }
}

struct PendingIntent {
    id: u64,
    kind: CommandKind,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct Shared {
    config: CommanderConfig,
    builder: Arc<dyn CommandBuilder>,
    transport: Arc<dyn CommandTransport>,
    intents: Mutex<HashMap<IntentKey, PendingIntent>>,
    pending: watch::Sender<usize>,
    next_id: AtomicU64,
    shutdown: CancellationToken,
    stats: CommanderStats,
}

impl Shared {
    fn lock_intents(&self) -> MutexGuard<'_, HashMap<IntentKey, PendingIntent>> {
        match self.intents.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Drop the intent for `key` if it is still intent `id`.
    fn clear(&self, key: &IntentKey, id: u64) {
        let mut intents = self.lock_intents();
        if intents.get(key).is_some_and(|intent| intent.id == id) {
            intents.remove(key);
            self.pending.send_replace(intents.len());
        }
    }
}

/// Retrying command dispatcher.
///
/// Public methods return as soon as the intent is scheduled; sending and
/// retrying happen on the tokio runtime the commander was built with. The
/// transport is called from blocking workers.
pub struct Commander {
    shared: Arc<Shared>,
    runtime: Handle,
    tracker: TaskTracker,
}

impl Commander {
    /// Create a commander on the current tokio runtime.
    pub fn new(
        config: CommanderConfig,
        builder: Arc<dyn CommandBuilder>,
        transport: Arc<dyn CommandTransport>,
    ) -> Result<Self, CommanderError> {
        let runtime = Handle::try_current().map_err(|_| CommanderError::NoRuntime)?;
        Ok(Self::with_runtime(runtime, config, builder, transport))
    }

    /// Create a commander whose tasks run on `runtime`.
    pub fn with_runtime(
        runtime: Handle,
        config: CommanderConfig,
        builder: Arc<dyn CommandBuilder>,
        transport: Arc<dyn CommandTransport>,
    ) -> Self {
        let (pending, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                config,
                builder,
                transport,
                intents: Mutex::new(HashMap::new()),
                pending,
                next_id: AtomicU64::new(1),
                shutdown: CancellationToken::new(),
                stats: CommanderStats::default(),
            }),
            runtime,
            tracker: TaskTracker::new(),
        }
    }

    /// Commander parameters.
    pub fn config(&self) -> &CommanderConfig {
        &self.shared.config
    }

    /// Schedule creation of a session.
    pub fn create_session(&self, session: &Session) -> Result<(), CommanderError> {
        let builder = &self.shared.builder;
        let request = self.naming(|| {
            Ok(CommandRequest::create(
                &self.shared.config.target_router,
                builder.session_parent(session)?,
                builder.session_name(session)?,
                builder.session_config(session)?,
            ))
        })?;
        self.submit(IntentKey::session(session), request)
    }

    /// Schedule deletion of a session.
    pub fn delete_session(&self, session: &Session) -> Result<(), CommanderError> {
        let builder = &self.shared.builder;
        let request = self.naming(|| {
            Ok(CommandRequest::delete(
                &self.shared.config.target_router,
                builder.session_entity_name(session)?,
            ))
        })?;
        self.submit(IntentKey::session(session), request)
    }

    /// Schedule creation of a topic route inside a session.
    pub fn create_topic_route(
        &self,
        session: &Session,
        route: &TopicRoute,
    ) -> Result<(), CommanderError> {
        let builder = &self.shared.builder;
        let request = self.naming(|| {
            Ok(CommandRequest::create(
                &self.shared.config.target_router,
                builder.route_parent(session, route)?,
                builder.route_name(session, route)?,
                builder.route_config(session, route)?,
            ))
        })?;
        self.submit(IntentKey::route(session, route), request)
    }

    /// Schedule deletion of a topic route.
    pub fn delete_topic_route(
        &self,
        session: &Session,
        route: &TopicRoute,
    ) -> Result<(), CommanderError> {
        let builder = &self.shared.builder;
        let request = self.naming(|| {
            Ok(CommandRequest::delete(
                &self.shared.config.target_router,
                builder.route_entity_name(session, route)?,
            ))
        })?;
        self.submit(IntentKey::route(session, route), request)
    }

    /// Number of intents not yet acknowledged.
    pub fn pending(&self) -> usize {
        self.shared.lock_intents().len()
    }

    /// Counters.
    pub fn stats(&self) -> CommanderStatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Wait until no intent is pending.
    ///
    /// Intents that keep failing never settle; wrap in a timeout where that
    /// matters.
    pub async fn settled(&self) {
        let mut rx = self.shared.pending.subscribe();
        // The sender lives in `shared`, so this only fails after drop.
        let _ = rx.wait_for(|pending| *pending == 0).await;
    }

    /// Cancel every pending intent and stop accepting new ones.
    ///
    /// In-flight transport calls are not interrupted; their results are
    /// discarded. Safe to call multiple times.
    pub fn shutdown(&self) {
        self.shared.shutdown.cancel();
        let canceled = {
            let mut intents = self.shared.lock_intents();
            let count = intents.len();
            intents.clear();
            self.shared.pending.send_replace(0);
            count
        };
        self.tracker.close();
        tracing::info!(canceled, "commander shut down");
    }

    /// Check if [`shutdown`](Self::shutdown) was called.
    pub fn is_shut_down(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }

    /// Wait for every retry task to exit. Only returns after `shutdown`.
    pub async fn closed(&self) {
        self.tracker.wait().await;
    }

    fn naming<F>(&self, build: F) -> Result<CommandRequest, CommanderError>
    where
        F: FnOnce() -> Result<CommandRequest, NamingError>,
    {
        build().map_err(|e| {
            CommanderStats::bump(&self.shared.stats.naming_errors);
            CommanderError::Naming(e)
        })
    }

    fn submit(&self, key: IntentKey, request: CommandRequest) -> Result<(), CommanderError> {
        if self.shared.shutdown.is_cancelled() {
            return Err(CommanderError::ShutDown);
        }

        let mut intents = self.shared.lock_intents();

        let previous = intents.remove(&key).map(|intent| {
            intent.cancel.cancel();
            CommanderStats::bump(&self.shared.stats.superseded);
            tracing::debug!(
                key = %key,
                superseded = intent.kind.as_str(),
                by = request.kind.as_str(),
                "intent superseded"
            );
            intent.task
        });

        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let kind = request.kind;
        let cancel = self.shared.shutdown.child_token();
        let task = self.tracker.spawn_on(
            run_intent(
                Arc::clone(&self.shared),
                key.clone(),
                id,
                request,
                cancel.clone(),
                previous,
            ),
            &self.runtime,
        );

        intents.insert(
            key,
            PendingIntent {
                id,
                kind,
                cancel,
                task,
            },
        );
        self.shared.pending.send_replace(intents.len());
        Ok(())
    }

    fn report(&self, result: Result<(), CommanderError>, session: &Session) {
        if let Err(e) = result {
            tracing::error!(
                topic = %session.topic,
                partition = %session.partition,
                "cannot schedule routing command: {}",
                e
            );
        }
    }
}

impl Drop for Commander {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}

impl RouteLifecycleListener for Commander {
    fn create_session(&self, session: &Session) {
        self.report(Commander::create_session(self, session), session);
    }

    fn delete_session(&self, session: &Session) {
        self.report(Commander::delete_session(self, session), session);
    }

    fn create_topic_route(&self, session: &Session, route: &TopicRoute) {
        self.report(Commander::create_topic_route(self, session, route), session);
    }

    fn delete_topic_route(&self, session: &Session, route: &TopicRoute) {
        self.report(Commander::delete_topic_route(self, session, route), session);
    }
}

impl IntentKey {
    fn session(session: &Session) -> Self {
        Self {
            session: session.clone(),
            route: None,
        }
    }

    fn route(session: &Session, route: &TopicRoute) -> Self {
        Self {
            session: session.clone(),
            route: Some(route.clone()),
        }
    }
}

/// Send `request` until it is acknowledged or `cancel` fires.
async fn run_intent(
    shared: Arc<Shared>,
    key: IntentKey,
    id: u64,
    request: CommandRequest,
    cancel: CancellationToken,
    previous: Option<JoinHandle<()>>,
) {
    // The superseded intent may still have an attempt in flight.
    if let Some(previous) = previous {
        let _ = previous.await;
    }

    let delay = shared.config.retry_delay;
    let retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    let timeout = shared.config.request_timeout;
    let request = Arc::new(request);
    let mut attempt: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            return;
        }
        attempt += 1;

        let transport = Arc::clone(&shared.transport);
        let outgoing = Arc::clone(&request);
        let gate = cancel.clone();
        // Blocking workers start late; re-check so a superseded intent
        // never reaches the transport.
        let outcome = tokio::task::spawn_blocking(move || {
            if gate.is_cancelled() {
                return None;
            }
            Some(transport.send(&outgoing, timeout))
        })
        .await;

        let reply = match outcome {
            Ok(Some(reply)) => Ok(reply),
            Ok(None) => {
                tracing::debug!(key = %key, attempt, "intent canceled before sending");
                return;
            }
            Err(e) => Err(e),
        };
        CommanderStats::bump(&shared.stats.attempts);

        if cancel.is_cancelled() {
            tracing::debug!(key = %key, attempt, "discarding result of canceled intent");
            return;
        }

        match reply {
            Ok(Some(response)) if response.is_success() => {
                CommanderStats::bump(&shared.stats.successes);
                tracing::info!(
                    key = %key,
                    entity = %request.entity(),
                    attempt,
                    "{} acknowledged",
                    request.kind.as_str()
                );
                shared.clear(&key, id);
                return;
            }
            Ok(Some(response)) => {
                CommanderStats::bump(&shared.stats.failures);
                tracing::error!(
                    key = %key,
                    entity = %request.entity(),
                    attempt,
                    retry_in_ms,
                    "{} rejected: {}",
                    request.kind.as_str(),
                    response.message
                );
            }
            Ok(None) => {
                CommanderStats::bump(&shared.stats.timeouts);
                tracing::error!(
                    key = %key,
                    entity = %request.entity(),
                    attempt,
                    retry_in_ms,
                    "{} timed out",
                    request.kind.as_str()
                );
            }
            Err(e) => {
                CommanderStats::bump(&shared.stats.failures);
                tracing::error!(
                    key = %key,
                    attempt,
                    retry_in_ms,
                    "transport task failed: {}",
                    e
                );
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
