//! Relay node
//!
//! A [`Node`] is one relay endpoint. It is created offline by
//! [`NodeManager::add`](crate::NodeManager::add) and only the manager moves it
//! between the online and offline sets; the node itself merely reports
//! connectivity changes through [`Node::set_online`] / [`Node::set_offline`].

use crate::error::{RelayError, Result};
use crate::failover::{self, FailoverReport};
use crate::manager::{ManagerInner, NodeManager};
use crate::region::RegionSet;
use crate::session::{
    GuildId, NoopVoiceBridge, Session, SessionFactory, SessionRegistry, VoiceBridge,
};
use crate::signal::ReadySignal;
use crate::stats::{NodeStats, StatsSnapshot};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::warn;
use uuid::Uuid;

/// Node lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    /// Not connected, or disabled
    Offline,
    /// Connected and accepting work
    Ready,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Offline => write!(f, "offline"),
            Self::Ready => write!(f, "ready"),
        }
    }
}

/// Connection settings for a relay node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeOptions {
    pub host: String,
    /// REST port used for track loading
    pub rest_port: u16,
    pub password: String,
    /// WebSocket port used for the event stream
    pub ws_port: u16,
    /// Connection attempts before the node is considered down
    pub ws_retry: u32,
    pub shard_count: u32,
}

impl Default for NodeOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            rest_port: 2333,
            password: String::new(),
            ws_port: 80,
            ws_retry: 10,
            shard_count: 1,
        }
    }
}

/// One relay server and the sessions it hosts
pub struct Node {
    id: Uuid,
    options: NodeOptions,
    regions: RegionSet,
    state: RwLock<NodeState>,
    ready: ReadySignal,
    sessions: SessionRegistry,
    session_factory: Arc<dyn SessionFactory>,
    stats: RwLock<Option<StatsSnapshot>>,
    manager: Weak<ManagerInner>,
}

impl Node {
    pub(crate) fn new(
        regions: RegionSet,
        options: NodeOptions,
        session_factory: Arc<dyn SessionFactory>,
        manager: Weak<ManagerInner>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            options,
            regions,
            state: RwLock::new(NodeState::Offline),
            ready: ReadySignal::new(),
            sessions: SessionRegistry::new(),
            session_factory,
            stats: RwLock::new(None),
            manager,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn host(&self) -> &str {
        &self.options.host
    }

    pub fn options(&self) -> &NodeOptions {
        &self.options
    }

    pub fn password(&self) -> &str {
        &self.options.password
    }

    pub fn regions(&self) -> &RegionSet {
        &self.regions
    }

    /// Track loading endpoint; append the identifier to query
    pub fn rest_uri(&self) -> String {
        format!(
            "http://{}:{}/loadtracks?identifier=",
            self.options.host, self.options.rest_port
        )
    }

    /// `host:port` of the event stream
    pub fn ws_address(&self) -> String {
        format!("{}:{}", self.options.host, self.options.ws_port)
    }

    pub fn state(&self) -> NodeState {
        *self.state.read()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == NodeState::Ready
    }

    /// Readiness signal, set while the node is online
    pub fn ready(&self) -> &ReadySignal {
        &self.ready
    }

    /// Transition bookkeeping; the manager calls this under its registry lock
    pub(crate) fn mark(&self, state: NodeState) {
        *self.state.write() = state;
        match state {
            NodeState::Ready => self.ready.set(),
            NodeState::Offline => self.ready.clear(),
        }
    }

    /// Sessions hosted on this node
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Session for a guild on this node, created if absent.
    ///
    /// Fails with [`RelayError::NodeOffline`] unless the node is ready. The
    /// state is read under the session registry lock, so once a failover
    /// has drained this node no session can be added back to it.
    pub fn session(self: &Arc<Self>, guild_id: GuildId) -> Result<Arc<dyn Session>> {
        self.sessions
            .get_or_create(
                guild_id,
                || self.is_ready(),
                || self.session_factory.create(self, guild_id),
            )
            .ok_or_else(|| RelayError::NodeOffline(self.ws_address()))
    }

    /// Record a stats frame received from the node
    pub fn update_stats(&self, stats: NodeStats) {
        *self.stats.write() = Some(StatsSnapshot::new(stats));
    }

    /// Latest stats frame, if any was received
    pub fn stats(&self) -> Option<StatsSnapshot> {
        self.stats.read().clone()
    }

    /// Load penalty from the latest stats (0.0 without stats)
    pub fn penalty(&self) -> f64 {
        self.stats
            .read()
            .as_ref()
            .map(|snapshot| snapshot.stats.penalty())
            .unwrap_or(0.0)
    }

    fn manager(&self) -> Option<NodeManager> {
        self.manager.upgrade().map(NodeManager::from_inner)
    }

    /// Report that the transport connected
    pub fn set_online(self: &Arc<Self>) {
        if let Some(manager) = self.manager() {
            manager.promote(self);
        }
    }

    /// Report that the transport disconnected
    pub fn set_offline(self: &Arc<Self>) {
        if let Some(manager) = self.manager() {
            manager.demote(self);
        }
    }

    /// Move every session on this node to `target`.
    ///
    /// Voice connections are released through the manager's voice bridge,
    /// or not at all once the manager is gone.
    pub async fn failover_to(self: &Arc<Self>, target: &Arc<Node>) -> FailoverReport {
        let voice: Arc<dyn VoiceBridge> = match self.manager() {
            Some(manager) => manager.voice_bridge(),
            None => Arc::new(NoopVoiceBridge),
        };
        failover::migrate_sessions(self, target, voice).await
    }

    /// Move every session on this node to another online node.
    ///
    /// The replacement is picked by the manager's fallback policy. With no
    /// other node online the sessions stay here and an empty report is
    /// returned.
    pub async fn manage_failover(self: &Arc<Self>) -> FailoverReport {
        let Some(manager) = self.manager() else {
            return FailoverReport::default();
        };
        match manager.failover_target(self) {
            Some(target) => self.failover_to(&target).await,
            None => {
                warn!(
                    "No node available to take over {} sessions from node {}",
                    self.sessions.len(),
                    self
                );
                FailoverReport::default()
            }
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("address", &self.ws_address())
            .field("regions", &self.regions)
            .field("state", &self.state())
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ws_address())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemorySessionFactory;

    fn detached_node(options: NodeOptions) -> Arc<Node> {
        Arc::new(Node::new(
            RegionSet::eu(),
            options,
            Arc::new(MemorySessionFactory::new()),
            Weak::new(),
        ))
    }

    #[test]
    fn test_default_options() {
        let options = NodeOptions::default();
        assert_eq!(options.host, "localhost");
        assert_eq!(options.rest_port, 2333);
        assert_eq!(options.ws_port, 80);
        assert_eq!(options.ws_retry, 10);
        assert_eq!(options.shard_count, 1);
    }

    #[test]
    fn test_node_addresses() {
        let node = detached_node(NodeOptions {
            host: "relay-1.internal".to_string(),
            rest_port: 8080,
            ws_port: 8081,
            ..Default::default()
        });
        assert_eq!(
            node.rest_uri(),
            "http://relay-1.internal:8080/loadtracks?identifier="
        );
        assert_eq!(node.ws_address(), "relay-1.internal:8081");
        assert_eq!(node.to_string(), "relay-1.internal:8081");
    }

    #[test]
    fn test_new_node_is_offline() {
        let node = detached_node(NodeOptions::default());
        assert_eq!(node.state(), NodeState::Offline);
        assert!(!node.ready().is_set());
    }

    #[test]
    fn test_mark_updates_ready_signal() {
        let node = detached_node(NodeOptions::default());
        node.mark(NodeState::Ready);
        assert!(node.is_ready());
        assert!(node.ready().is_set());

        node.mark(NodeState::Offline);
        assert!(!node.is_ready());
        assert!(!node.ready().is_set());
    }

    #[test]
    fn test_set_online_without_manager_is_noop() {
        let node = detached_node(NodeOptions::default());
        node.set_online();
        assert_eq!(node.state(), NodeState::Offline);
    }

    #[test]
    fn test_session_is_created_once() {
        let node = detached_node(NodeOptions::default());
        node.mark(NodeState::Ready);
        let first = node.session(10).unwrap();
        let second = node.session(10).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(node.sessions().len(), 1);
        assert_eq!(first.node().map(|n| n.id()), Some(node.id()));
    }

    #[test]
    fn test_offline_node_refuses_sessions() {
        let node = detached_node(NodeOptions::default());
        assert!(matches!(node.session(10), Err(RelayError::NodeOffline(_))));
        assert!(node.sessions().is_empty());

        node.mark(NodeState::Ready);
        node.session(10).unwrap();
        node.mark(NodeState::Offline);
        assert!(node.session(10).is_err());
        assert!(node.session(11).is_err());
        assert_eq!(node.sessions().guild_ids(), vec![10]);
    }

    #[test]
    fn test_stats_and_penalty() {
        let node = detached_node(NodeOptions::default());
        assert!(node.stats().is_none());
        assert_eq!(node.penalty(), 0.0);

        let mut stats = NodeStats::default();
        stats.playing_players = 3;
        node.update_stats(stats);
        assert_eq!(node.stats().unwrap().stats.playing_players, 3);
        assert!((node.penalty() - 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_failover_to_explicit_target() {
        let from = detached_node(NodeOptions::default());
        let to = detached_node(NodeOptions {
            ws_port: 81,
            ..Default::default()
        });
        from.mark(NodeState::Ready);
        from.session(1).unwrap();
        from.session(2).unwrap();
        from.mark(NodeState::Offline);

        let report = from.failover_to(&to).await;
        assert_eq!(report.migrated, vec![1, 2]);
        assert!(report.resumed.is_empty());
        assert!(from.sessions().is_empty());
        assert_eq!(to.sessions().guild_ids(), vec![1, 2]);
        assert_eq!(to.sessions().get(1).unwrap().node().map(|n| n.id()), Some(to.id()));
    }

    #[tokio::test]
    async fn test_manage_failover_without_manager() {
        let node = detached_node(NodeOptions::default());
        node.mark(NodeState::Ready);
        node.session(1).unwrap();
        let report = node.manage_failover().await;
        assert!(report.is_empty());
        assert_eq!(node.sessions().len(), 1);
    }
}
