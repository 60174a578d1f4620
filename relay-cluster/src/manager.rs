//! Node manager - online/offline registry, routing and selection
//!
//! The manager owns every [`Node`]. Nodes start in the offline set and move
//! between the two sets only through [`NodeManager::promote`] and
//! [`NodeManager::demote`]. The online/offline split, the region routing
//! table and the round-robin cursor share one lock, so a transition is never
//! observed half-done.

use crate::config::{ClusterConfig, NodeConfig};
use crate::error::{RelayError, Result};
use crate::failover;
use crate::fallback::{FallbackPolicy, FirstOnline};
use crate::hooks::{HookRegistry, NodeEvent, NodeHook};
use crate::node::{Node, NodeOptions, NodeState};
use crate::region::{Region, RegionSet};
use crate::session::{
    GuildId, MemorySessionFactory, NoopVoiceBridge, Session, SessionFactory, VoiceBridge,
};
use crate::signal::ReadySignal;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Picks made by `select_for_region` before giving up on a flapping cluster
const SELECT_ATTEMPTS: usize = 3;

/// Membership and routing state, guarded as one unit
#[derive(Default)]
struct Registry {
    online: Vec<Arc<Node>>,
    offline: Vec<Arc<Node>>,
    by_region: HashMap<Region, Arc<Node>>,
    rr_pos: usize,
}

fn position_of(nodes: &[Arc<Node>], node: &Arc<Node>) -> Option<usize> {
    nodes.iter().position(|n| Arc::ptr_eq(n, node))
}

pub(crate) struct ManagerInner {
    registry: Mutex<Registry>,
    hooks: Arc<HookRegistry>,
    events: mpsc::UnboundedSender<NodeEvent>,
    /// Receiving end of `events`, until the dispatcher task takes it
    dispatcher: Mutex<Option<mpsc::UnboundedReceiver<NodeEvent>>>,
    ready: ReadySignal,
    default_node: usize,
    round_robin: bool,
    fallback: Arc<dyn FallbackPolicy>,
    session_factory: Arc<dyn SessionFactory>,
    voice: Arc<dyn VoiceBridge>,
}

/// Builder for [`NodeManager`]
pub struct NodeManagerBuilder {
    default_node: usize,
    round_robin: bool,
    fallback: Arc<dyn FallbackPolicy>,
    session_factory: Arc<dyn SessionFactory>,
    voice: Arc<dyn VoiceBridge>,
}

impl Default for NodeManagerBuilder {
    fn default() -> Self {
        Self {
            default_node: 0,
            round_robin: false,
            fallback: Arc::new(FirstOnline),
            session_factory: Arc::new(MemorySessionFactory::new()),
            voice: Arc::new(NoopVoiceBridge),
        }
    }
}

impl NodeManagerBuilder {
    /// Start from the selection settings of a configuration file
    pub fn from_config(config: &ClusterConfig) -> Self {
        Self::default()
            .default_node(config.default_node)
            .round_robin(config.round_robin)
            .fallback(config.fallback.into_policy())
    }

    /// Index (in the online set) of the node used when round-robin is off
    pub fn default_node(mut self, index: usize) -> Self {
        self.default_node = index;
        self
    }

    pub fn round_robin(mut self, enabled: bool) -> Self {
        self.round_robin = enabled;
        self
    }

    pub fn fallback(mut self, policy: Arc<dyn FallbackPolicy>) -> Self {
        self.fallback = policy;
        self
    }

    /// Factory for sessions created on nodes of this manager
    pub fn session_factory(mut self, factory: Arc<dyn SessionFactory>) -> Self {
        self.session_factory = factory;
        self
    }

    pub fn voice_bridge(mut self, voice: Arc<dyn VoiceBridge>) -> Self {
        self.voice = voice;
        self
    }

    pub fn build(self) -> NodeManager {
        let (events, rx) = mpsc::unbounded_channel();
        NodeManager {
            inner: Arc::new(ManagerInner {
                registry: Mutex::new(Registry::default()),
                hooks: Arc::new(HookRegistry::new()),
                events,
                dispatcher: Mutex::new(Some(rx)),
                ready: ReadySignal::new(),
                default_node: self.default_node,
                round_robin: self.round_robin,
                fallback: self.fallback,
                session_factory: self.session_factory,
                voice: self.voice,
            }),
        }
    }
}

/// Registry of relay nodes.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct NodeManager {
    inner: Arc<ManagerInner>,
}

impl Default for NodeManager {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl NodeManager {
    pub fn builder() -> NodeManagerBuilder {
        NodeManagerBuilder::default()
    }

    /// Manager with every node of a configuration file registered (offline)
    pub fn from_config(config: &ClusterConfig) -> Result<Self> {
        let manager = NodeManagerBuilder::from_config(config).build();
        manager.add_from_config(&config.nodes)?;
        Ok(manager)
    }

    pub(crate) fn from_inner(inner: Arc<ManagerInner>) -> Self {
        Self { inner }
    }

    /// Register a node; it stays offline until its transport reports in
    pub fn add(&self, regions: RegionSet, options: NodeOptions) -> Arc<Node> {
        let node = Arc::new(Node::new(
            regions,
            options,
            Arc::clone(&self.inner.session_factory),
            Arc::downgrade(&self.inner),
        ));
        self.inner.registry.lock().offline.push(Arc::clone(&node));
        info!("Added node {} serving {}", node, node.regions());
        node
    }

    /// Register every node of a configuration file
    pub fn add_from_config(&self, nodes: &[NodeConfig]) -> Result<Vec<Arc<Node>>> {
        // Validate everything first so a bad entry adds nothing
        let resolved = nodes
            .iter()
            .map(|node| -> Result<(RegionSet, NodeOptions)> {
                Ok((node.regions.to_region_set()?, node.options()))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(resolved
            .into_iter()
            .map(|(regions, options)| self.add(regions, options))
            .collect())
    }

    /// Move a node from the offline set to the online set.
    ///
    /// Returns `false` (and does nothing) if the node is not offline.
    pub fn promote(&self, node: &Arc<Node>) -> bool {
        let index = {
            let mut registry = self.inner.registry.lock();
            let Some(pos) = position_of(&registry.offline, node) else {
                return false;
            };

            let node = registry.offline.remove(pos);
            node.mark(NodeState::Ready);
            for region in node.regions() {
                registry.by_region.insert(region, Arc::clone(&node));
            }
            self.queue_event(NodeEvent::NodeReady(Arc::clone(&node)));
            registry.online.push(node);
            self.inner.ready.set();
            registry.online.len() - 1
        };

        info!("Node {} ({}) is ready for use", index, node);
        self.start_dispatcher();
        true
    }

    /// Move a node from the online set to the offline set.
    ///
    /// Regions routed to the node are handed to the fallback policy and its
    /// sessions are failed over in the background. When it was the last
    /// online node nothing can take over: routing entries are left as they
    /// are and no event is dispatched. Returns `false` if the node was not
    /// online.
    pub fn demote(&self, node: &Arc<Node>) -> bool {
        let (index, target) = {
            let mut registry = self.inner.registry.lock();
            let Some(pos) = position_of(&registry.online, node) else {
                return false;
            };

            let node = registry.online.remove(pos);
            node.mark(NodeState::Offline);
            registry.offline.push(Arc::clone(&node));

            if registry.online.is_empty() {
                self.inner.ready.clear();
                drop(registry);
                info!("Node {} ({}) was removed from use", pos, node);
                warn!(
                    "Node {} ({}) is offline and it's the only node in the cluster",
                    pos, node
                );
                return true;
            }

            let Registry {
                online, by_region, ..
            } = &mut *registry;
            let online = online.as_slice();
            for (region, routed) in by_region.iter_mut() {
                if !Arc::ptr_eq(routed, &node) {
                    continue;
                }
                if let Some(replacement) = self.inner.fallback.reroute(*region, online) {
                    *routed = replacement;
                }
            }

            self.queue_event(NodeEvent::NodeDisabled(Arc::clone(&node)));
            (pos, self.inner.fallback.failover_target(&node, online))
        };

        info!("Node {} ({}) was removed from use", index, node);
        self.start_dispatcher();

        match target {
            Some(target) => {
                let from = Arc::clone(node);
                let voice = self.voice_bridge();
                spawn_detached(async move {
                    failover::migrate_sessions(&from, &target, voice).await;
                });
            }
            None => warn!("Fallback policy offered no failover target for node {}", node),
        }
        true
    }

    /// Node for a REST request (track loading and similar).
    ///
    /// With round-robin enabled consecutive calls cycle through the online
    /// set; otherwise the configured default node is returned, or the first
    /// online node if that index is out of range.
    pub fn select_for_dispatch(&self) -> Result<Arc<Node>> {
        let mut registry = self.inner.registry.lock();
        let len = registry.online.len();
        if len == 0 {
            return Err(RelayError::NoNodesAvailable);
        }

        if self.inner.round_robin {
            let index = registry.rr_pos.min(len - 1);
            registry.rr_pos += 1;
            if registry.rr_pos >= len {
                registry.rr_pos = 0;
            }
            return Ok(Arc::clone(&registry.online[index]));
        }

        let node = registry
            .online
            .get(self.inner.default_node)
            .unwrap_or(&registry.online[0]);
        Ok(Arc::clone(node))
    }

    /// Session for `guild_id` on the node serving `region`.
    ///
    /// Unknown regions, and regions whose node is no longer online, fall back
    /// to the first online node. A node that goes offline between being
    /// picked and creating the session is skipped and the pick is redone.
    pub fn select_for_region(&self, region: &str, guild_id: GuildId) -> Result<Arc<dyn Session>> {
        let parsed = region.parse::<Region>().ok();
        let mut last_err = RelayError::NoNodesAvailable;

        for _ in 0..SELECT_ATTEMPTS {
            let node = self.pick_for_region(region, parsed)?;
            match node.session(guild_id) {
                Ok(session) => return Ok(session),
                Err(err @ RelayError::NodeOffline(_)) => {
                    debug!("Node {} went offline while selected, retrying", node);
                    last_err = err;
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_err)
    }

    fn pick_for_region(&self, region: &str, parsed: Option<Region>) -> Result<Arc<Node>> {
        let registry = self.inner.registry.lock();
        let routed = parsed.and_then(|r| registry.by_region.get(&r));

        match routed {
            Some(node) if node.is_ready() => Ok(Arc::clone(node)),
            routed => {
                match routed {
                    Some(node) => info!("Region {} is routed to offline node {}", region, node),
                    None => info!("Unknown region: {}", region),
                }
                registry
                    .online
                    .first()
                    .cloned()
                    .ok_or(RelayError::NoNodesAvailable)
            }
        }
    }

    /// Node currently routed for a region, if any
    pub fn node_for_region(&self, region: Region) -> Option<Arc<Node>> {
        self.inner.registry.lock().by_region.get(&region).cloned()
    }

    /// Replacement node for a failing node, per the fallback policy
    pub fn failover_target(&self, failed: &Arc<Node>) -> Option<Arc<Node>> {
        let registry = self.inner.registry.lock();
        let candidates: Vec<Arc<Node>> = registry
            .online
            .iter()
            .filter(|n| !Arc::ptr_eq(n, failed))
            .cloned()
            .collect();
        self.inner.fallback.failover_target(failed, &candidates)
    }

    pub fn register_hook(&self, hook: NodeHook) -> bool {
        self.inner.hooks.register(hook)
    }

    pub fn unregister_hook(&self, hook: &NodeHook) -> bool {
        self.inner.hooks.unregister(hook)
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.inner.hooks
    }

    /// Online nodes, in promotion order
    pub fn nodes(&self) -> Vec<Arc<Node>> {
        self.inner.registry.lock().online.clone()
    }

    /// Offline nodes, including ones that never connected
    pub fn offline_nodes(&self) -> Vec<Arc<Node>> {
        self.inner.registry.lock().offline.clone()
    }

    /// Every node, online first
    pub fn all_nodes(&self) -> Vec<Arc<Node>> {
        let registry = self.inner.registry.lock();
        registry
            .online
            .iter()
            .chain(registry.offline.iter())
            .cloned()
            .collect()
    }

    pub fn online_count(&self) -> usize {
        self.inner.registry.lock().online.len()
    }

    /// Cluster readiness, set while at least one node is online
    pub fn ready(&self) -> &ReadySignal {
        &self.inner.ready
    }

    pub fn is_ready(&self) -> bool {
        self.inner.ready.is_set()
    }

    /// Wait until at least one node is online
    pub async fn wait_ready(&self) {
        self.inner.ready.wait().await
    }

    pub fn round_robin(&self) -> bool {
        self.inner.round_robin
    }

    pub fn default_node(&self) -> usize {
        self.inner.default_node
    }

    pub(crate) fn voice_bridge(&self) -> Arc<dyn VoiceBridge> {
        Arc::clone(&self.inner.voice)
    }

    /// Enqueue an event for the hooks; called under the registry lock so the
    /// queue order is the transition order
    fn queue_event(&self, event: NodeEvent) {
        if self.inner.events.send(event).is_err() {
            warn!("Node event dispatcher has stopped; dropping event");
        }
    }

    /// Start the task that feeds queued events to the hooks, one at a time.
    ///
    /// The task starts on the first runtime seen by a state transition.
    /// Events queued before that are delivered once it runs.
    fn start_dispatcher(&self) {
        let mut slot = self.inner.dispatcher.lock();
        if slot.is_none() {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("No async runtime available yet; node events stay queued");
            return;
        };
        let Some(mut rx) = slot.take() else {
            return;
        };

        // Holding only the hooks lets the channel close when the manager drops.
        let hooks = Arc::clone(&self.inner.hooks);
        handle.spawn(async move {
            while let Some(event) = rx.recv().await {
                hooks.dispatch(&event).await;
            }
        });
    }
}

impl<'a> IntoIterator for &'a NodeManager {
    type Item = Arc<Node>;
    type IntoIter = std::vec::IntoIter<Arc<Node>>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes().into_iter()
    }
}

/// Run a background task on the current runtime, if there is one
fn spawn_detached<F>(task: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(task);
        }
        Err(_) => warn!("No async runtime available; dropping background node task"),
    }
}
