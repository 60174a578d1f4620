//! Fallback policies
//!
//! When a node is disabled its regions and sessions need a new home among the
//! remaining online nodes. The policy decides which node that is.

use crate::node::Node;
use crate::region::Region;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Chooses replacement nodes after a node goes offline.
///
/// `online` is the current online set in order and never contains the
/// disabled node.
pub trait FallbackPolicy: Send + Sync + fmt::Debug {
    /// Node that should serve `region` from now on
    fn reroute(&self, region: Region, online: &[Arc<Node>]) -> Option<Arc<Node>>;

    /// Node that should take over the sessions of `failed`
    fn failover_target(&self, failed: &Node, online: &[Arc<Node>]) -> Option<Arc<Node>>;
}

/// Send everything to the first online node
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstOnline;

impl FallbackPolicy for FirstOnline {
    fn reroute(&self, _region: Region, online: &[Arc<Node>]) -> Option<Arc<Node>> {
        online.first().cloned()
    }

    fn failover_target(&self, _failed: &Node, online: &[Arc<Node>]) -> Option<Arc<Node>> {
        online.first().cloned()
    }
}

/// Prefer online nodes that serve the same regions.
///
/// A region goes to the first online node that lists it. Sessions go to the
/// node sharing the most regions with the failed one. Both fall back to the
/// first online node.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegionAffinity;

impl FallbackPolicy for RegionAffinity {
    fn reroute(&self, region: Region, online: &[Arc<Node>]) -> Option<Arc<Node>> {
        online
            .iter()
            .find(|node| node.regions().contains(region))
            .or_else(|| online.first())
            .cloned()
    }

    fn failover_target(&self, failed: &Node, online: &[Arc<Node>]) -> Option<Arc<Node>> {
        let overlap = |node: &Node| {
            failed
                .regions()
                .iter()
                .filter(|region| node.regions().contains(*region))
                .count()
        };

        let mut best: Option<(&Arc<Node>, usize)> = None;
        for node in online {
            let score = overlap(node);
            if best.is_none_or(|(_, top)| score > top) {
                best = Some((node, score));
            }
        }
        best.map(|(node, _)| Arc::clone(node))
    }
}

/// Policy selector used in configuration files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackKind {
    #[default]
    FirstOnline,
    RegionAffinity,
}

impl FallbackKind {
    pub fn into_policy(self) -> Arc<dyn FallbackPolicy> {
        match self {
            Self::FirstOnline => Arc::new(FirstOnline),
            Self::RegionAffinity => Arc::new(RegionAffinity),
        }
    }
}
