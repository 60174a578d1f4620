//! Session (player) interfaces
//!
//! A session is the per-guild playback state hosted on exactly one relay
//! node. The cluster does not implement playback itself; it only needs the
//! small surface below to move sessions between nodes.

pub mod memory;

use crate::error::Result;
use crate::node::Node;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

pub use memory::{MemorySession, MemorySessionFactory, RecordingVoiceBridge, SessionCall};

/// Guild (tenant) identifier used as the session key
pub type GuildId = u64;

/// Voice channel identifier
pub type ChannelId = u64;

/// A playable track as understood by the relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// Opaque encoded track handle issued by the relay
    pub encoded: String,
    pub title: String,
    pub uri: Option<String>,
    /// Track length (milliseconds)
    pub length_ms: u64,
}

impl Track {
    pub fn new(encoded: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            encoded: encoded.into(),
            title: title.into(),
            uri: None,
            length_ms: 0,
        }
    }
}

/// Per-guild playback session owned by one node
#[async_trait]
pub trait Session: Send + Sync {
    fn guild_id(&self) -> GuildId;

    /// Node currently hosting this session, if it is still alive
    fn node(&self) -> Option<Arc<Node>>;

    /// Point the session at a new hosting node
    fn attach(&self, node: &Arc<Node>);

    fn is_playing(&self) -> bool;

    /// Track that is (or was last) playing
    fn current_track(&self) -> Option<Track>;

    /// Last known playback position (milliseconds)
    fn position(&self) -> u64;

    /// Voice channel the session is connected to
    fn channel_id(&self) -> Option<ChannelId>;

    async fn connect(&self, channel_id: ChannelId) -> Result<()>;

    /// Insert a track at the front of the play queue
    fn queue_front(&self, track: Track);

    async fn play(&self) -> Result<()>;

    async fn seek(&self, position: u64) -> Result<()>;
}

/// Creates sessions for guilds on a given node
pub trait SessionFactory: Send + Sync {
    fn create(&self, node: &Arc<Node>, guild_id: GuildId) -> Arc<dyn Session>;
}

/// Host-side voice connection control
#[async_trait]
pub trait VoiceBridge: Send + Sync {
    /// Tear down the voice connection for a guild.
    ///
    /// Must succeed when the guild is already disconnected.
    async fn disconnect(&self, guild_id: GuildId) -> Result<()>;
}

/// Voice bridge that does nothing, for hosts without voice state
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopVoiceBridge;

#[async_trait]
impl VoiceBridge for NoopVoiceBridge {
    async fn disconnect(&self, _guild_id: GuildId) -> Result<()> {
        Ok(())
    }
}

/// Guild → session map owned by a node
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<GuildId, Arc<dyn Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<dyn Session>> {
        self.sessions.lock().get(&guild_id).cloned()
    }

    /// Fetch the session for a guild, creating it with `create` if absent.
    ///
    /// `admit` is checked under the registry lock before anything is
    /// returned; when it fails the registry is left untouched and `None` is
    /// returned. Creation cannot interleave with [`drain`](Self::drain).
    pub fn get_or_create<A, F>(
        &self,
        guild_id: GuildId,
        admit: A,
        create: F,
    ) -> Option<Arc<dyn Session>>
    where
        A: FnOnce() -> bool,
        F: FnOnce() -> Arc<dyn Session>,
    {
        let mut sessions = self.sessions.lock();
        if !admit() {
            return None;
        }
        Some(Arc::clone(sessions.entry(guild_id).or_insert_with(create)))
    }

    pub fn insert(&self, session: Arc<dyn Session>) -> Option<Arc<dyn Session>> {
        self.sessions.lock().insert(session.guild_id(), session)
    }

    pub fn remove(&self, guild_id: GuildId) -> Option<Arc<dyn Session>> {
        self.sessions.lock().remove(&guild_id)
    }

    /// Take every session out of the registry in one step
    pub fn drain(&self) -> Vec<Arc<dyn Session>> {
        let mut sessions = self.sessions.lock();
        let mut drained: Vec<Arc<dyn Session>> = sessions.drain().map(|(_, s)| s).collect();
        drained.sort_by_key(|s| s.guild_id());
        drained
    }

    pub fn contains(&self, guild_id: GuildId) -> bool {
        self.sessions.lock().contains_key(&guild_id)
    }

    pub fn guild_ids(&self) -> Vec<GuildId> {
        let mut ids: Vec<GuildId> = self.sessions.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}
