//! Event hook integration tests

mod common;

use common::{Harness, event_log, eventually, options, settle};
use parking_lot::Mutex;
use relay_cluster::{HookError, NodeEvent, NodeHook, RegionSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[tokio::test]
async fn test_failing_hook_does_not_block_others() {
    let harness = Harness::new();
    let manager = &harness.manager;

    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    manager.register_hook(NodeHook::sync("always-fails", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Err(HookError::new("refusing every event"))
    }));
    let (hook, log) = event_log();
    manager.register_hook(hook);

    let node = manager.add(RegionSet::eu(), options(1));
    let other = manager.add(RegionSet::us(), options(2));
    manager.promote(&node);
    manager.promote(&other);
    manager.demote(&node);

    assert!(eventually(|| log.lock().len() == 3).await);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(
        *log.lock(),
        vec![
            "NodeReady@127.0.0.1:1",
            "NodeReady@127.0.0.1:2",
            "NodeDisabled@127.0.0.1:1",
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_events_reach_hooks_in_transition_order() {
    let harness = Harness::new();
    let manager = &harness.manager;

    let other = manager.add(RegionSet::us(), options(2));
    manager.promote(&other);
    settle().await;

    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    manager.register_hook(NodeHook::sync("slow-on-ready", move |event: &NodeEvent| {
        if event.name() == "NodeReady" {
            std::thread::sleep(std::time::Duration::from_millis(50));
        }
        sink.lock().push(event.name());
        Ok(())
    }));

    for _ in 0..3 {
        let node = manager.add(RegionSet::eu(), options(1));
        log.lock().clear();
        manager.promote(&node);
        manager.demote(&node);

        assert!(eventually(|| log.lock().len() == 2).await);
        assert_eq!(*log.lock(), vec!["NodeReady", "NodeDisabled"]);
    }
}

#[tokio::test]
async fn test_panicking_async_hook_is_isolated() {
    let harness = Harness::new();
    let manager = &harness.manager;

    manager.register_hook(NodeHook::with_async("panics", |event: NodeEvent| async move {
        if event.node().is_ready() {
            panic!("hook crashed on {}", event.name());
        }
        Ok::<(), HookError>(())
    }));
    let (hook, log) = event_log();
    manager.register_hook(hook);

    let node = manager.add(RegionSet::asia(), options(1));
    manager.promote(&node);

    assert!(eventually(|| log.lock().len() == 1).await);
}

#[tokio::test]
async fn test_unregistered_hook_stops_receiving() {
    let harness = Harness::new();
    let manager = &harness.manager;
    let (hook, log) = event_log();

    assert!(manager.register_hook(hook.clone()));
    assert!(!manager.register_hook(hook.clone()));
    assert_eq!(manager.hooks().len(), 1);

    let first = manager.add(RegionSet::eu(), options(1));
    manager.promote(&first);
    assert!(eventually(|| log.lock().len() == 1).await);

    assert!(manager.unregister_hook(&hook));
    let second = manager.add(RegionSet::us(), options(2));
    manager.promote(&second);
    settle().await;

    assert_eq!(log.lock().len(), 1);
}

#[tokio::test]
async fn test_async_hook_observes_node_state() {
    let harness = Harness::new();
    let manager = &harness.manager;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    manager.register_hook(NodeHook::with_async("state", move |event: NodeEvent| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().push((event.name(), event.node().state()));
            Ok::<(), HookError>(())
        }
    }));

    let node = manager.add(RegionSet::oceania(), options(1));
    manager.promote(&node);
    assert!(eventually(|| seen.lock().len() == 1).await);

    assert_eq!(seen.lock()[0].0, "NodeReady");
    assert!(node.is_ready());
}
