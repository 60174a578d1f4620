//! Region-aware registry for pools of audio relay nodes.
//!
//! A [`NodeManager`] keeps every configured [`Node`] in either an online or an
//! offline set, routes voice regions to online nodes, picks nodes for REST
//! dispatch (fixed default or round-robin) and moves guild sessions off nodes
//! that go offline. Node transitions are announced to registered
//! [`NodeHook`]s.
//!
//! ```no_run
//! use relay_cluster::{NodeManager, NodeOptions, RegionSet};
//!
//! # async fn run() -> relay_cluster::Result<()> {
//! let manager = NodeManager::builder().round_robin(true).build();
//! let node = manager.add(RegionSet::eu(), NodeOptions::default());
//!
//! // A transport reports the node as connected
//! node.set_online();
//! manager.wait_ready().await;
//!
//! let session = manager.select_for_region("london", 1234)?;
//! assert_eq!(session.guild_id(), 1234);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod failover;
pub mod fallback;
pub mod hooks;
pub mod manager;
pub mod node;
pub mod region;
pub mod session;
pub mod signal;
pub mod stats;
pub mod transport;

// Re-export commonly used types
pub use config::{ClusterConfig, LoggingConfig, NodeConfig, ProbeSettings, RegionSpec};
pub use error::{HookError, RelayError, Result};
pub use failover::{FailoverReport, migrate_sessions};
pub use fallback::{FallbackKind, FallbackPolicy, FirstOnline, RegionAffinity};
pub use hooks::{HookRegistry, HookResult, NodeEvent, NodeHook};
pub use manager::{NodeManager, NodeManagerBuilder};
pub use node::{Node, NodeOptions, NodeState};
pub use region::{Region, RegionSet};
pub use session::{
    ChannelId, GuildId, MemorySession, MemorySessionFactory, NoopVoiceBridge,
    RecordingVoiceBridge, Session, SessionCall, SessionFactory, SessionRegistry, Track, VoiceBridge,
};
pub use signal::ReadySignal;
pub use stats::{NodeStats, StatsSnapshot};
pub use transport::{ProbeConfig, TcpProbe, Transport};
