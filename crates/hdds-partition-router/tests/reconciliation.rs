// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test/bench code readability over pedantic
#![allow(clippy::missing_panics_doc)] // Tests/examples panic on failure
#![allow(clippy::too_many_lines)] // Example/test code

//! Observer to commander integration tests
//!
//! Drives discovery notifications through the observer and checks the
//! lifecycle events and routing commands that come out the other side.

use hdds_partition_router::command::{CommandKind, CommandRequest, CommandResponse};
use hdds_partition_router::config::{FilterConfig, NamingConfig};
use hdds_partition_router::{
    CommandTransport, Commander, CommanderConfig, EndpointInfo, FilterChain, InstanceHandle,
    LifecycleEvent, MockTransport, PartitionObserver, RecordingListener, RouteDirection, Session,
    TemplateCommandBuilder, TopicRoute,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn handle(n: u8) -> InstanceHandle {
    InstanceHandle::new([1, 15, 0, 0, 0, 0, 0, 0, 0, 0, 0, n], [0, 0, 1, 3])
}

fn e1() -> EndpointInfo {
    EndpointInfo::publication(handle(1), "Square", "Shape", vec!["A".into()])
}

fn e2() -> EndpointInfo {
    EndpointInfo::subscription(handle(2), "Square", "Shape", vec!["A".into()])
}

fn square_a() -> Session {
    Session::new("Square", "A")
}

fn route(direction: RouteDirection) -> TopicRoute {
    TopicRoute::new(direction, "Square", "Shape")
}

fn recorded(filters: FilterChain) -> (PartitionObserver, Arc<RecordingListener>) {
    let observer = PartitionObserver::new(filters).expect("observer");
    let recorder = Arc::new(RecordingListener::new());
    observer.add_listener(recorder.clone());
    (observer, recorder)
}

fn commander(transport: Arc<dyn CommandTransport>, retry_ms: u64) -> Arc<Commander> {
    let config = CommanderConfig {
        target_router: "rs".into(),
        retry_delay: Duration::from_millis(retry_ms),
        request_timeout: Duration::from_millis(100),
    };
    let builder = Arc::new(TemplateCommandBuilder::new("rs", NamingConfig::default()));
    Arc::new(Commander::new(config, builder, transport).expect("runtime"))
}

async fn settle(commander: &Commander) {
    tokio::time::timeout(Duration::from_secs(20), commander.settled())
        .await
        .expect("commands settle");
}

#[test]
fn test_square_scenario_both_orders() {
    for discovery in [[e1(), e2()], [e2(), e1()]] {
        let (observer, recorder) = recorded(FilterChain::new());
        for endpoint in &discovery {
            observer.on_discovered(endpoint);
        }
        observer.flush().expect("flush");

        let created = recorder.take();
        assert_eq!(created.len(), 3);
        assert_eq!(created[0], LifecycleEvent::CreateSession(square_a()));
        assert!(created.contains(&LifecycleEvent::CreateTopicRoute(
            square_a(),
            route(RouteDirection::Out)
        )));
        assert!(created.contains(&LifecycleEvent::CreateTopicRoute(
            square_a(),
            route(RouteDirection::In)
        )));

        observer.on_lost(&e1());
        observer.on_lost(&e2());
        observer.flush().expect("flush");

        assert_eq!(
            recorder.take(),
            vec![
                LifecycleEvent::DeleteTopicRoute(square_a(), route(RouteDirection::Out)),
                LifecycleEvent::DeleteTopicRoute(square_a(), route(RouteDirection::In)),
                LifecycleEvent::DeleteSession(square_a()),
            ]
        );
    }
}

#[test]
fn test_partition_move_and_repeat() {
    let (observer, recorder) = recorded(FilterChain::new());
    let mut endpoint = e1();
    observer.on_discovered(&endpoint);

    endpoint.partitions = vec!["B".into()];
    observer.on_modified(&endpoint);
    observer.flush().expect("flush");
    let events = recorder.take();
    assert!(events.contains(&LifecycleEvent::DeleteSession(square_a())));
    assert!(events.contains(&LifecycleEvent::CreateSession(Session::new("Square", "B"))));

    observer.on_modified(&endpoint);
    observer.flush().expect("flush");
    assert!(recorder.take().is_empty());
    assert_eq!(
        observer.attributed_sessions(&endpoint.handle),
        vec![Session::new("Square", "B")]
    );
}

#[test]
fn test_configured_filters() {
    let filters = FilterConfig {
        ignore_partitions: vec!["debug*".into()],
        ..Default::default()
    }
    .build()
    .expect("filters");
    let (observer, recorder) = recorded(filters);

    observer.on_discovered(&EndpointInfo::publication(
        handle(3),
        "DCPSParticipant",
        "ParticipantBuiltinTopicData",
        vec![],
    ));
    observer.on_discovered(&EndpointInfo::publication(
        handle(4),
        "Square",
        "Shape",
        vec!["A".into(), "debug-7".into(), "B*".into()],
    ));
    observer.flush().expect("flush");

    let sessions: Vec<Session> = recorder
        .events()
        .into_iter()
        .filter_map(|e| match e {
            LifecycleEvent::CreateSession(s) => Some(s),
            _ => None,
        })
        .collect();
    assert_eq!(sessions, vec![square_a()]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_discovery_drives_commands() {
    let mock = Arc::new(MockTransport::new());
    mock.push_timeouts(1);
    let commander = commander(mock.clone(), 10);
    let (observer, _recorder) = recorded(FilterChain::new());
    observer.add_listener(commander.clone());

    observer.on_discovered(&e1());
    tokio::task::block_in_place(|| observer.flush()).expect("flush");
    settle(&commander).await;

    assert_eq!(mock.count(CommandKind::Create), 3);
    let entities: HashSet<String> = mock.calls().iter().map(CommandRequest::entity).collect();
    assert_eq!(
        entities,
        HashSet::from([
            "rs::domain_route::Square(A)".to_string(),
            "rs::domain_route::Square(A)::Square.OUT".to_string(),
        ])
    );

    observer.on_lost(&e1());
    tokio::task::block_in_place(|| observer.flush()).expect("flush");
    settle(&commander).await;

    assert_eq!(mock.count(CommandKind::Delete), 2);
    assert_eq!(commander.stats().successes, 4);

    observer.close();
    commander.shutdown();
}

/// Transport that flags overlapping attempts on the same entity.
struct OverlapDetector {
    in_flight: Mutex<HashSet<String>>,
    overlapped: AtomicBool,
    calls: Mutex<Vec<CommandRequest>>,
    latency: Duration,
}

impl OverlapDetector {
    fn new(latency: Duration) -> Self {
        Self {
            in_flight: Mutex::new(HashSet::new()),
            overlapped: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
            latency,
        }
    }
}

impl CommandTransport for OverlapDetector {
    fn send(&self, request: &CommandRequest, _timeout: Duration) -> Option<CommandResponse> {
        let entity = request.entity();
        if !self.in_flight.lock().unwrap().insert(entity.clone()) {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        self.calls.lock().unwrap().push(request.clone());
        std::thread::sleep(self.latency);
        self.in_flight.lock().unwrap().remove(&entity);
        Some(CommandResponse::ok())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_churn_converges_to_deletes() {
    let detector = Arc::new(OverlapDetector::new(Duration::from_millis(2)));
    let commander = commander(detector.clone(), 5);
    let observer = PartitionObserver::new(FilterChain::new()).expect("observer");
    observer.add_listener(commander.clone());

    let mut rng = fastrand::Rng::with_seed(7);
    let topics = ["Square", "Circle"];
    let pool = ["A", "B", ""];
    let mut alive: HashMap<u8, EndpointInfo> = HashMap::new();

    for _ in 0..400 {
        let n = rng.u8(1..=8);
        let mut partitions: Vec<String> = pool
            .iter()
            .filter(|_| rng.bool())
            .map(|p| p.to_string())
            .collect();
        partitions.dedup();

        match alive.remove(&n) {
            Some(endpoint) if rng.bool() => observer.on_lost(&endpoint),
            Some(mut endpoint) => {
                endpoint.partitions = partitions;
                observer.on_modified(&endpoint);
                alive.insert(n, endpoint);
            }
            None => {
                let topic = topics[usize::from(n) % topics.len()];
                let endpoint = if n % 2 == 0 {
                    EndpointInfo::publication(handle(n), topic, "Shape", partitions)
                } else {
                    EndpointInfo::subscription(handle(n), topic, "Shape", partitions)
                };
                observer.on_discovered(&endpoint);
                alive.insert(n, endpoint);
            }
        }
    }

    for endpoint in alive.values() {
        observer.on_lost(endpoint);
    }
    tokio::task::block_in_place(|| observer.flush()).expect("flush");
    assert_eq!(observer.session_count(), 0);

    settle(&commander).await;
    assert_eq!(commander.pending(), 0);
    assert!(!detector.overlapped.load(Ordering::SeqCst));

    let mut last: HashMap<String, CommandKind> = HashMap::new();
    for request in detector.calls.lock().unwrap().iter() {
        last.insert(request.entity(), request.kind);
    }
    assert!(!last.is_empty());
    for (entity, kind) in &last {
        assert_eq!(*kind, CommandKind::Delete, "{} left alive", entity);
    }

    observer.close();
    commander.shutdown();
    tokio::time::timeout(Duration::from_secs(5), commander.closed())
        .await
        .expect("retry tasks exit");
}
