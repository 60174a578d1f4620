//! Node event hooks
//!
//! Hooks are user callbacks notified when a node becomes ready or is
//! disabled. They are invoked one after another in registration order; a hook
//! that fails or panics is logged and skipped, never aborting the dispatch.

use crate::error::HookError;
use crate::node::Node;
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

/// Result returned by hooks
pub type HookResult = std::result::Result<(), HookError>;

/// Node state transition
#[derive(Debug, Clone)]
pub enum NodeEvent {
    /// Node was promoted to the online set
    NodeReady(Arc<Node>),
    /// Node was demoted to the offline set
    NodeDisabled(Arc<Node>),
}

impl NodeEvent {
    pub fn node(&self) -> &Arc<Node> {
        match self {
            Self::NodeReady(node) | Self::NodeDisabled(node) => node,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::NodeReady(_) => "NodeReady",
            Self::NodeDisabled(_) => "NodeDisabled",
        }
    }
}

type SyncHookFn = dyn Fn(&NodeEvent) -> HookResult + Send + Sync;
type AsyncHookFn = dyn Fn(NodeEvent) -> BoxFuture<'static, HookResult> + Send + Sync;

#[derive(Clone)]
enum HookKind {
    Sync(Arc<SyncHookFn>),
    Async(Arc<AsyncHookFn>),
}

/// Registered callback.
///
/// Clones share identity: a clone of a registered hook unregisters it, while
/// two hooks built from identical closures are distinct.
#[derive(Clone)]
pub struct NodeHook {
    name: Arc<str>,
    kind: HookKind,
}

impl NodeHook {
    /// Hook that runs inline
    pub fn sync<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&NodeEvent) -> HookResult + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name.into()),
            kind: HookKind::Sync(Arc::new(f)),
        }
    }

    /// Hook that returns a future, awaited before the next hook runs
    pub fn with_async<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(NodeEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        Self {
            name: Arc::from(name.into()),
            kind: HookKind::Async(Arc::new(move |event| f(event).boxed())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn identity(&self) -> *const () {
        match &self.kind {
            HookKind::Sync(f) => Arc::as_ptr(f) as *const (),
            HookKind::Async(f) => Arc::as_ptr(f) as *const (),
        }
    }

    /// Run the hook, turning panics into errors
    async fn invoke(&self, event: &NodeEvent) -> HookResult {
        match &self.kind {
            HookKind::Sync(f) => panic::catch_unwind(AssertUnwindSafe(|| f(event)))
                .unwrap_or_else(|payload| Err(panicked(payload.as_ref()))),
            HookKind::Async(f) => {
                let future = match panic::catch_unwind(AssertUnwindSafe(|| f(event.clone()))) {
                    Ok(future) => future,
                    Err(payload) => return Err(panicked(payload.as_ref())),
                };
                AssertUnwindSafe(future)
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|payload| Err(panicked(payload.as_ref())))
            }
        }
    }
}

impl PartialEq for NodeHook {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for NodeHook {}

impl fmt::Debug for NodeHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            HookKind::Sync(_) => "sync",
            HookKind::Async(_) => "async",
        };
        f.debug_struct("NodeHook")
            .field("name", &self.name)
            .field("kind", &kind)
            .finish()
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn panicked(payload: &(dyn Any + Send)) -> HookError {
    HookError::new(format!("hook panicked: {}", panic_message(payload)))
}

/// Ordered list of hooks
#[derive(Default)]
pub struct HookRegistry {
    hooks: RwLock<Vec<NodeHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a hook; registering the same hook twice has no effect
    pub fn register(&self, hook: NodeHook) -> bool {
        let mut hooks = self.hooks.write();
        if hooks.contains(&hook) {
            return false;
        }
        hooks.push(hook);
        true
    }

    /// Remove a hook; unknown hooks are ignored
    pub fn unregister(&self, hook: &NodeHook) -> bool {
        let mut hooks = self.hooks.write();
        let before = hooks.len();
        hooks.retain(|h| h != hook);
        hooks.len() != before
    }

    pub fn len(&self) -> usize {
        self.hooks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.read().is_empty()
    }

    /// Deliver an event to every hook, in registration order.
    ///
    /// Works on a snapshot of the list, so hooks may register or unregister
    /// hooks while running. Returns the number of hooks that failed.
    pub async fn dispatch(&self, event: &NodeEvent) -> usize {
        let hooks = self.hooks.read().clone();
        debug!(
            "Dispatching event of type {} to {} hooks",
            event.name(),
            hooks.len()
        );

        let mut failures = 0;
        for hook in &hooks {
            if let Err(e) = hook.invoke(event).await {
                failures += 1;
                warn!(
                    "Encountered exception while dispatching an event to hook `{}` ({})",
                    hook.name(),
                    e
                );
            }
        }
        failures
    }
}
