//! Shared helpers for relay-cluster integration tests

#![allow(dead_code)]

use parking_lot::Mutex;
use relay_cluster::{
    MemorySessionFactory, NodeEvent, NodeHook, NodeManager, NodeManagerBuilder, NodeOptions,
    RecordingVoiceBridge,
};
use std::sync::Arc;
use std::time::Duration;

/// Manager wired to in-memory sessions and a recording voice bridge
pub struct Harness {
    pub manager: NodeManager,
    pub sessions: Arc<MemorySessionFactory>,
    pub voice: Arc<RecordingVoiceBridge>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(NodeManager::builder())
    }

    pub fn with(builder: NodeManagerBuilder) -> Self {
        let sessions = Arc::new(MemorySessionFactory::new());
        let voice = Arc::new(RecordingVoiceBridge::new());
        let manager = builder
            .session_factory(sessions.clone())
            .voice_bridge(voice.clone())
            .build();
        Self {
            manager,
            sessions,
            voice,
        }
    }
}

pub fn options(port: u16) -> NodeOptions {
    NodeOptions {
        host: "127.0.0.1".to_string(),
        ws_port: port,
        ..Default::default()
    }
}

/// Hook that records `"<event>@<address>"` for every event it sees
pub fn event_log() -> (NodeHook, Arc<Mutex<Vec<String>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    let hook = NodeHook::sync("event-log", move |event: &NodeEvent| {
        sink.lock()
            .push(format!("{}@{}", event.name(), event.node().ws_address()));
        Ok(())
    });
    (hook, log)
}

/// Poll `condition` until it holds or two seconds pass
pub async fn eventually<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Give spawned background tasks a chance to run
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
