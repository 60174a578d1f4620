//! In-process session implementation
//!
//! Keeps playback state in memory and records every call it receives. Used by
//! the monitor binary (which never plays audio) and by tests that need to
//! observe what failover did to a session.

use super::{ChannelId, GuildId, Session, SessionFactory, Track, VoiceBridge};
use crate::error::{RelayError, Result};
use crate::node::Node;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use uuid::Uuid;

/// Call received by a [`MemorySession`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCall {
    Attach(Uuid),
    Connect(ChannelId),
    QueueFront(Track),
    Play,
    Seek(u64),
}

#[derive(Default)]
struct SessionState {
    node: Weak<Node>,
    playing: bool,
    current: Option<Track>,
    position: u64,
    channel_id: Option<ChannelId>,
    queue: VecDeque<Track>,
}

/// Session whose playback state lives entirely in memory
pub struct MemorySession {
    guild_id: GuildId,
    state: Mutex<SessionState>,
    calls: Mutex<Vec<SessionCall>>,
    fail_connect: AtomicBool,
}

impl MemorySession {
    pub fn new(guild_id: GuildId) -> Self {
        Self {
            guild_id,
            state: Mutex::new(SessionState::default()),
            calls: Mutex::new(Vec::new()),
            fail_connect: AtomicBool::new(false),
        }
    }

    /// Create a session already hosted on `node`
    pub fn on_node(guild_id: GuildId, node: &Arc<Node>) -> Self {
        let session = Self::new(guild_id);
        session.state.lock().node = Arc::downgrade(node);
        session
    }

    /// Put the session into a playing state without going through the queue
    pub fn start(&self, channel_id: ChannelId, track: Track, position: u64) {
        let mut state = self.state.lock();
        state.channel_id = Some(channel_id);
        state.current = Some(track);
        state.position = position;
        state.playing = true;
    }

    /// Stop playback, keeping the last track and position
    pub fn stop(&self) {
        self.state.lock().playing = false;
    }

    pub fn set_position(&self, position: u64) {
        self.state.lock().position = position;
    }

    /// Make subsequent `connect` calls fail
    pub fn fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<SessionCall> {
        self.calls.lock().clone()
    }

    pub fn queue(&self) -> Vec<Track> {
        self.state.lock().queue.iter().cloned().collect()
    }

    fn record(&self, call: SessionCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl Session for MemorySession {
    fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    fn node(&self) -> Option<Arc<Node>> {
        self.state.lock().node.upgrade()
    }

    fn attach(&self, node: &Arc<Node>) {
        self.state.lock().node = Arc::downgrade(node);
        self.record(SessionCall::Attach(node.id()));
    }

    fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    fn current_track(&self) -> Option<Track> {
        self.state.lock().current.clone()
    }

    fn position(&self) -> u64 {
        self.state.lock().position
    }

    fn channel_id(&self) -> Option<ChannelId> {
        self.state.lock().channel_id
    }

    async fn connect(&self, channel_id: ChannelId) -> Result<()> {
        self.record(SessionCall::Connect(channel_id));
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(RelayError::Session(format!(
                "voice connect to channel {} failed",
                channel_id
            )));
        }
        self.state.lock().channel_id = Some(channel_id);
        Ok(())
    }

    fn queue_front(&self, track: Track) {
        self.record(SessionCall::QueueFront(track.clone()));
        self.state.lock().queue.push_front(track);
    }

    async fn play(&self) -> Result<()> {
        self.record(SessionCall::Play);
        let mut state = self.state.lock();
        let track = state
            .queue
            .pop_front()
            .ok_or_else(|| RelayError::Session("queue is empty".to_string()))?;
        state.current = Some(track);
        state.position = 0;
        state.playing = true;
        Ok(())
    }

    async fn seek(&self, position: u64) -> Result<()> {
        self.record(SessionCall::Seek(position));
        let mut state = self.state.lock();
        if state.current.is_none() {
            return Err(RelayError::Session("nothing is playing".to_string()));
        }
        state.position = position;
        Ok(())
    }
}

/// Factory producing [`MemorySession`]s and remembering them by guild
#[derive(Default)]
pub struct MemorySessionFactory {
    created: Mutex<HashMap<GuildId, Arc<MemorySession>>>,
}

impl MemorySessionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Concrete session most recently created for a guild
    pub fn get(&self, guild_id: GuildId) -> Option<Arc<MemorySession>> {
        self.created.lock().get(&guild_id).cloned()
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().len()
    }
}

impl SessionFactory for MemorySessionFactory {
    fn create(&self, node: &Arc<Node>, guild_id: GuildId) -> Arc<dyn Session> {
        let session = Arc::new(MemorySession::on_node(guild_id, node));
        self.created.lock().insert(guild_id, Arc::clone(&session));
        session
    }
}

/// Voice bridge that records which guilds were disconnected
#[derive(Default)]
pub struct RecordingVoiceBridge {
    disconnected: Mutex<Vec<GuildId>>,
    failing: Mutex<HashSet<GuildId>>,
}

impl RecordingVoiceBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make disconnects for `guild_id` fail
    pub fn fail_for(&self, guild_id: GuildId) {
        self.failing.lock().insert(guild_id);
    }

    pub fn disconnected(&self) -> Vec<GuildId> {
        self.disconnected.lock().clone()
    }
}

#[async_trait]
impl VoiceBridge for RecordingVoiceBridge {
    async fn disconnect(&self, guild_id: GuildId) -> Result<()> {
        self.disconnected.lock().push(guild_id);
        if self.failing.lock().contains(&guild_id) {
            return Err(RelayError::Voice(format!(
                "gateway refused voice update for guild {}",
                guild_id
            )));
        }
        Ok(())
    }
}
