//! Node statistics
//!
//! Relay nodes periodically push a stats frame describing their load. The
//! cluster only records the latest snapshot per node; selection does not
//! consult it.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Load statistics reported by a relay node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStats {
    /// Players connected to the node
    pub players: u32,
    /// Players currently playing audio
    pub playing_players: u32,
    /// Node uptime (milliseconds)
    pub uptime: u64,
    pub memory: MemoryStats,
    pub cpu: CpuStats,
    /// Audio frame statistics (absent until the node has played audio)
    #[serde(default)]
    pub frame_stats: Option<FrameStats>,
}

/// Memory usage in bytes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub free: u64,
    pub used: u64,
    pub allocated: u64,
    pub reservable: u64,
}

/// CPU load (0.0 - 1.0)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuStats {
    pub cores: u32,
    pub system_load: f64,
    /// Load of the relay process itself
    #[serde(rename = "lavalinkLoad", alias = "relayLoad")]
    pub relay_load: f64,
}

/// Frame statistics, averaged per minute
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameStats {
    pub sent: i64,
    pub nulled: i64,
    pub deficit: i64,
}

/// Stats frame together with the time it was received
#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    pub stats: NodeStats,
    pub received_at: DateTime<Utc>,
}

impl NodeStats {
    /// Parse a stats frame as sent by the node
    pub fn from_json(payload: &str) -> Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }

    /// Load penalty, lower is better.
    ///
    /// Combines playing players, system CPU load and dropped/nulled frames
    /// using the relay's usual exponential weighting.
    pub fn penalty(&self) -> f64 {
        let player_penalty = self.playing_players as f64;
        let cpu_penalty = 1.05f64.powf(100.0 * self.cpu.system_load) * 10.0 - 10.0;

        let (deficit_penalty, null_penalty) = match &self.frame_stats {
            Some(frames) => {
                let deficit = 1.03f64.powf(500.0 * (frames.deficit as f64 / 3000.0)) * 600.0 - 600.0;
                let nulled =
                    (1.03f64.powf(500.0 * (frames.nulled as f64 / 3000.0)) * 300.0 - 300.0) * 2.0;
                (deficit, nulled)
            }
            None => (0.0, 0.0),
        };

        player_penalty + cpu_penalty + deficit_penalty + null_penalty
    }
}

impl StatsSnapshot {
    pub fn new(stats: NodeStats) -> Self {
        Self {
            stats,
            received_at: Utc::now(),
        }
    }
}
