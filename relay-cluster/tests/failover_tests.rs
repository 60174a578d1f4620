//! Session failover integration tests

mod common;

use common::{Harness, event_log, eventually, options, settle};
use relay_cluster::{
    FailoverReport, MemorySession, Node, NodeManager, NodeManagerBuilder, RegionAffinity,
    RegionSet, RelayError, Session, SessionCall, Track, migrate_sessions,
};
use std::sync::Arc;

const CHANNEL: u64 = 900;
const POSITION: u64 = 83_500;

fn track() -> Track {
    Track::new("QAAAnAIAMFN0cmFuZ2VyIFRoaW5ncw", "Strangers")
}

/// Two online nodes; A hosts g1 (playing) and g2 (idle)
struct Scenario {
    harness: Harness,
    a: Arc<Node>,
    b: Arc<Node>,
    g1: Arc<MemorySession>,
    g2: Arc<MemorySession>,
}

fn scenario(builder: NodeManagerBuilder) -> Scenario {
    let harness = Harness::with(builder);
    let manager = &harness.manager;
    let b = manager.add(RegionSet::us(), options(2));
    let a = manager.add(RegionSet::eu(), options(1));
    manager.promote(&b);
    manager.promote(&a);

    a.session(1).unwrap();
    a.session(2).unwrap();
    let g1 = harness.sessions.get(1).unwrap();
    let g2 = harness.sessions.get(2).unwrap();
    g1.start(CHANNEL, track(), POSITION);

    Scenario {
        harness,
        a,
        b,
        g1,
        g2,
    }
}

fn assert_resumed_on(s: &Scenario) {
    assert!(s.a.sessions().is_empty());
    assert_eq!(s.b.sessions().guild_ids(), vec![1, 2]);
    assert!(Arc::ptr_eq(&s.g1.node().unwrap(), &s.b));
    assert!(Arc::ptr_eq(&s.g2.node().unwrap(), &s.b));

    assert_eq!(
        s.g1.calls(),
        vec![
            SessionCall::Attach(s.b.id()),
            SessionCall::Connect(CHANNEL),
            SessionCall::QueueFront(track()),
            SessionCall::Play,
            SessionCall::Seek(POSITION),
        ]
    );
    assert!(s.g1.is_playing());
    assert_eq!(s.g1.current_track(), Some(track()));
    assert_eq!(s.g1.position(), POSITION);

    assert_eq!(s.g2.calls(), vec![SessionCall::Attach(s.b.id())]);
    assert!(!s.g2.is_playing());
}

#[tokio::test]
async fn test_migrate_sessions_resumes_playback() {
    let s = scenario(NodeManager::builder());

    let report = migrate_sessions(&s.a, &s.b, s.harness.voice.clone()).await;

    assert_eq!(
        report,
        FailoverReport {
            migrated: vec![1, 2],
            resumed: vec![1],
            failed: vec![],
        }
    );
    assert_resumed_on(&s);

    let mut disconnected = s.harness.voice.disconnected();
    disconnected.sort_unstable();
    assert_eq!(disconnected, vec![1, 2]);
}

#[tokio::test]
async fn test_demote_triggers_failover() {
    let s = scenario(NodeManager::builder());
    // Let the NodeReady dispatches from setup finish first
    settle().await;
    let (hook, log) = event_log();
    s.harness.manager.register_hook(hook);

    assert!(s.harness.manager.demote(&s.a));

    assert!(eventually(|| s.g1.calls().len() == 5).await);
    assert!(eventually(|| s.b.sessions().len() == 2).await);
    assert_resumed_on(&s);

    assert!(eventually(|| !log.lock().is_empty()).await);
    assert_eq!(*log.lock(), vec!["NodeDisabled@127.0.0.1:1"]);
}

#[tokio::test]
async fn test_manage_failover_picks_other_online_node() {
    let s = scenario(NodeManager::builder());

    let report = s.a.manage_failover().await;

    assert_eq!(report.migrated, vec![1, 2]);
    assert_eq!(report.resumed, vec![1]);
    assert_resumed_on(&s);
}

#[tokio::test]
async fn test_failover_without_target_keeps_sessions() {
    let harness = Harness::new();
    let manager = &harness.manager;
    let a = manager.add(RegionSet::eu(), options(1));
    manager.promote(&a);
    a.session(1).unwrap();

    let report = a.manage_failover().await;
    assert!(report.is_empty());
    assert_eq!(a.sessions().guild_ids(), vec![1]);

    // Sole node going offline: sessions stay where they are
    manager.demote(&a);
    settle().await;
    assert_eq!(a.sessions().guild_ids(), vec![1]);
}

#[tokio::test]
async fn test_failover_isolates_failing_sessions() {
    let s = scenario(NodeManager::builder());
    s.a.session(3).unwrap();
    let g3 = s.harness.sessions.get(3).unwrap();
    g3.start(CHANNEL + 1, track(), 1_000);

    s.g1.fail_connect(true);
    s.harness.voice.fail_for(3);

    let report = migrate_sessions(&s.a, &s.b, s.harness.voice.clone()).await;

    assert_eq!(report.migrated, vec![1, 2, 3]);
    assert_eq!(report.resumed, vec![3]);
    assert_eq!(report.failed, vec![1]);

    // Ownership moved even though resuming failed
    assert_eq!(s.b.sessions().guild_ids(), vec![1, 2, 3]);
    assert!(!s.g1.calls().contains(&SessionCall::Play));
    assert!(g3.is_playing());
    assert_eq!(g3.position(), 1_000);
}

#[tokio::test]
async fn test_migrate_to_self_is_refused() {
    let s = scenario(NodeManager::builder());

    let report = migrate_sessions(&s.a, &s.a, s.harness.voice.clone()).await;

    assert!(report.is_empty());
    assert_eq!(s.a.sessions().guild_ids(), vec![1, 2]);
    assert!(s.g1.calls().is_empty());
}

#[tokio::test]
async fn test_region_affinity_failover_target() {
    let harness = Harness::with(NodeManager::builder().fallback(Arc::new(RegionAffinity)));
    let manager = &harness.manager;
    let us = manager.add(RegionSet::us(), options(1));
    let eu_backup = manager.add(RegionSet::third_one(), options(2));
    let eu = manager.add(RegionSet::eu(), options(3));
    for node in [&us, &eu_backup, &eu] {
        manager.promote(node);
    }
    eu.session(10).unwrap();

    manager.demote(&eu);

    assert!(eventually(|| eu_backup.sessions().contains(10)).await);
    assert!(us.sessions().is_empty());
}

#[tokio::test]
async fn test_no_session_created_on_node_after_failover() {
    let s = scenario(NodeManager::builder().default_node(1));
    let manager = &s.harness.manager;

    // Picked before the demotion, used after the failover drained it
    let picked = manager.select_for_dispatch().unwrap();
    assert!(Arc::ptr_eq(&picked, &s.a));

    assert!(manager.demote(&s.a));
    assert!(eventually(|| s.b.sessions().len() == 2).await);

    assert!(matches!(picked.session(77), Err(RelayError::NodeOffline(_))));
    assert!(s.a.sessions().is_empty());
    assert!(!s.b.sessions().contains(77));
    assert!(s.harness.sessions.get(77).is_none());

    // Region selection lands on the node that is still online
    let session = manager.select_for_region("london", 77).unwrap();
    assert!(Arc::ptr_eq(&session.node().unwrap(), &s.b));
    assert_eq!(s.b.sessions().guild_ids(), vec![1, 2, 77]);
    assert!(s.a.sessions().is_empty());
}
