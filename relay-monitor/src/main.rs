use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use relay_cluster::{
    ClusterConfig, LoggingConfig, NodeEvent, NodeHook, NodeManager, NodeState, ProbeConfig,
    TcpProbe, Transport,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "relay-monitor")]
#[command(about = "Relay Monitor - health checks for a pool of audio relay nodes", long_about = None)]
struct Args {
    /// Cluster configuration file (YAML)
    #[arg(short, long, default_value = "relay-cluster.yml")]
    config: PathBuf,

    /// Log level (overrides the configuration file; RUST_LOG overrides both)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Probe every node once, print the status table and exit
    #[arg(long)]
    once: bool,
}

fn init_tracing(logging: &LoggingConfig, level_override: Option<&str>) {
    let level = level_override.unwrap_or(&logging.level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if logging.format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn logging_hooks() -> Vec<NodeHook> {
    vec![
        NodeHook::sync("log-ready", |event| {
            if let NodeEvent::NodeReady(node) = event {
                info!("{} {} ({})", "ONLINE".green().bold(), node, node.regions());
            }
            Ok(())
        }),
        NodeHook::sync("log-disabled", |event| {
            if let NodeEvent::NodeDisabled(node) = event {
                warn!("{} {} ({})", "OFFLINE".red().bold(), node, node.regions());
            }
            Ok(())
        }),
    ]
}

fn print_status(manager: &NodeManager) {
    let nodes = manager.all_nodes();
    let online = manager.online_count();

    let header = format!("{}/{} nodes online", online, nodes.len());
    if online == 0 {
        println!("{}", header.red().bold());
    } else {
        println!("{}", header.green().bold());
    }

    for node in nodes {
        let state = match node.state() {
            NodeState::Ready => "ready".green(),
            NodeState::Offline => "offline".red(),
        };
        println!(
            "  {:<28} {:<8} {:>3} sessions  {}",
            node.ws_address(),
            state,
            node.sessions().len(),
            node.regions().to_string().dimmed()
        );
    }
}

async fn probe_once(manager: &NodeManager, probe: &TcpProbe) {
    for node in manager.all_nodes() {
        if probe.probe(&node).await {
            node.set_online();
        } else {
            node.set_offline();
        }
    }
}

async fn monitor(manager: NodeManager, probe: TcpProbe) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let probe = Arc::new(probe);
    let interval = probe.config().interval;

    let mut probes = JoinSet::new();
    for node in manager.all_nodes() {
        let probe = Arc::clone(&probe);
        let shutdown = shutdown_rx.clone();
        probes.spawn(async move { probe.run(node, shutdown).await });
    }

    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => print_status(&manager),
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl-C")?;
                info!("Received Ctrl-C, shutting down");
                break;
            }
        }
    }

    shutdown_tx.send_replace(true);
    while let Some(joined) = probes.join_next().await {
        if let Err(e) = joined {
            warn!("Probe task ended abnormally: {}", e);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = ClusterConfig::from_file(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;

    init_tracing(&config.logging, args.log_level.as_deref());

    info!("Starting Relay Monitor v{}", env!("CARGO_PKG_VERSION"));

    let manager = NodeManager::from_config(&config).context("Invalid node configuration")?;
    for hook in logging_hooks() {
        manager.register_hook(hook);
    }
    info!(
        "Loaded {} nodes (round robin: {}, default node: {})",
        manager.all_nodes().len(),
        manager.round_robin(),
        manager.default_node()
    );

    let probe = TcpProbe::new(ProbeConfig::from(config.probe));

    if args.once {
        probe_once(&manager, &probe).await;
        print_status(&manager);
        return Ok(());
    }

    monitor(manager, probe).await
}
