//! Node transports
//!
//! A transport owns the connection to one relay node and reports
//! connectivity through [`Node::set_online`] / [`Node::set_offline`].
//! [`TcpProbe`] is a minimal transport that only checks whether the node's
//! event port accepts TCP connections.

use crate::node::Node;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// Connection driver for a single node
#[async_trait]
pub trait Transport: Send + Sync {
    /// Drive the node until `shutdown` flips to `true`
    async fn run(&self, node: Arc<Node>, shutdown: watch::Receiver<bool>);
}

/// Probe timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Pause between two probe rounds
    pub interval: Duration,
    /// Pause between failed attempts within a round
    pub retry_delay: Duration,
    /// Timeout of a single connection attempt
    pub connect_timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(5000),
            retry_delay: Duration::from_millis(1000),
            connect_timeout: Duration::from_millis(2000),
        }
    }
}

/// TCP reachability probe
#[derive(Debug, Clone, Default)]
pub struct TcpProbe {
    config: ProbeConfig,
}

impl TcpProbe {
    pub fn new(config: ProbeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// One probe round: up to `ws_retry` connection attempts (at least one)
    pub async fn probe(&self, node: &Node) -> bool {
        let address = node.ws_address();
        let attempts = node.options().ws_retry.max(1);

        for attempt in 1..=attempts {
            match timeout(self.config.connect_timeout, TcpStream::connect(&address)).await {
                Ok(Ok(_)) => {
                    debug!("Probe of {} succeeded on attempt {}", address, attempt);
                    return true;
                }
                Ok(Err(e)) => debug!("Probe of {} failed (attempt {}): {}", address, attempt, e),
                Err(_) => debug!("Probe of {} timed out (attempt {})", address, attempt),
            }

            if attempt < attempts {
                sleep(self.config.retry_delay).await;
            }
        }

        warn!("Node {} unreachable after {} attempts", address, attempts);
        false
    }
}

#[async_trait]
impl Transport for TcpProbe {
    async fn run(&self, node: Arc<Node>, mut shutdown: watch::Receiver<bool>) {
        info!("Starting probe for node {}", node);

        loop {
            if *shutdown.borrow() {
                break;
            }

            let reachable = tokio::select! {
                reachable = self.probe(&node) => reachable,
                _ = shutdown.changed() => break,
            };

            if reachable != node.is_ready() {
                if reachable {
                    node.set_online();
                } else {
                    node.set_offline();
                }
            }

            tokio::select! {
                _ = sleep(self.config.interval) => {}
                _ = shutdown.changed() => break,
            }
        }

        info!("Probe for node {} stopped", node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeOptions, NodeState};
    use crate::region::RegionSet;
    use crate::NodeManager;
    use tokio::net::TcpListener;

    fn fast() -> ProbeConfig {
        ProbeConfig {
            interval: Duration::from_millis(20),
            retry_delay: Duration::from_millis(5),
            connect_timeout: Duration::from_millis(200),
        }
    }

    fn options(port: u16, ws_retry: u32) -> NodeOptions {
        NodeOptions {
            host: "127.0.0.1".to_string(),
            ws_port: port,
            ws_retry,
            ..Default::default()
        }
    }

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    }

    #[tokio::test]
    async fn test_probe_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let manager = NodeManager::default();
        let node = manager.add(RegionSet::eu(), options(port, 1));
        assert!(TcpProbe::new(fast()).probe(&node).await);
    }

    #[tokio::test]
    async fn test_probe_unreachable() {
        let port = closed_port().await;
        let manager = NodeManager::default();
        let node = manager.add(RegionSet::eu(), options(port, 2));
        assert!(!TcpProbe::new(fast()).probe(&node).await);
    }

    #[tokio::test]
    async fn test_run_promotes_and_stops() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let manager = NodeManager::default();
        let node = manager.add(RegionSet::eu(), options(port, 1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let probe = TcpProbe::new(fast());
        let handle = tokio::spawn({
            let node = Arc::clone(&node);
            async move { probe.run(node, shutdown_rx).await }
        });

        timeout(Duration::from_secs(5), manager.wait_ready())
            .await
            .unwrap();
        assert_eq!(node.state(), NodeState::Ready);

        shutdown_tx.send(true).unwrap();
        timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
