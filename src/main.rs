use std::net::SocketAddr;
use std::time::Duration;
use swim_cluster::{NodeAddr, SwimConfig, SwimEvent, SwimNode};
use tokio::sync::broadcast::error::RecvError;

const STATS_INTERVAL: Duration = Duration::from_secs(5);

fn usage(program: &str) -> ! {
    eprintln!(
        "Usage: {} --bind <addr:port> [--seed <host:port>]... [--host <name>] [--config <file.json>] [--verbose]",
        program
    );
    eprintln!("Example: {} --bind 127.0.0.1:11000", program);
    eprintln!(
        "Example: {} --bind 127.0.0.1:11001 --seed 127.0.0.1:11000",
        program
    );

    std::process::exit(1);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    let mut bind_addr: Option<SocketAddr> = None;
    let mut seeds: Vec<NodeAddr> = vec![];
    let mut host: Option<String> = None;
    let mut config_path: Option<String> = None;
    let mut verbose = false;

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1);
        match (args[i].as_str(), value) {
            ("--bind", Some(v)) => {
                bind_addr = Some(v.parse()?);
                i += 2;
            }
            ("--seed", Some(v)) => {
                seeds.push(v.parse()?);
                i += 2;
            }
            ("--host", Some(v)) => {
                host = Some(v.clone());
                i += 2;
            }
            ("--config", Some(v)) => {
                config_path = Some(v.clone());
                i += 2;
            }
            ("--verbose", _) => {
                verbose = true;
                i += 1;
            }
            ("--help", _) | ("-h", _) => usage(&args[0]),
            (other, _) => {
                eprintln!("Unexpected argument: {}", other);
                usage(&args[0]);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_max_level(if verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    let mut config = match &config_path {
        Some(path) => SwimConfig::from_json_file(path)?,
        None => SwimConfig::default(),
    };
    if let Some(addr) = bind_addr {
        config = config.with_bind_ip(addr.ip()).with_port(addr.port());
    }
    if let Some(host) = host {
        config = config.with_host(host);
    }
    if !seeds.is_empty() {
        config = config.with_seeds(seeds);
    }

    if config.seeds.is_empty() {
        tracing::info!("Starting as seed node (founder)");
    } else {
        tracing::info!("Seed nodes: {:?}", config.seeds);
    }

    let mut node = SwimNode::new(config);
    let mut events = node.subscribe();
    let port = node.start().await?;

    tracing::info!("Node listening on port {}", port);
    tracing::info!("Press Ctrl+C to shutdown");

    let mut stats = tokio::time::interval(STATS_INTERVAL);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,

            event = events.recv() => match event {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event log lagging, skipped {} event(s)", skipped);
                }
                Err(RecvError::Closed) => break,
            },

            _ = stats.tick() => {
                let me = node.whoami().await;
                let members = node.member_records().await;
                tracing::info!(
                    "Cluster stats: {} member(s), status {:?}",
                    members.len(),
                    me.status
                );
                for member in members {
                    tracing::info!(
                        "  - {} {:?} (inc={}, set by {})",
                        member.node,
                        member.state,
                        member.incarnation,
                        member.set_by
                    );
                }
            }
        }
    }

    tracing::info!("Shutting down");
    node.stop().await;

    Ok(())
}

fn log_event(event: &SwimEvent) {
    match event {
        SwimEvent::Up(port) => tracing::info!("Up on port {}", port),
        SwimEvent::Joined => tracing::info!("Joined the cluster"),
        SwimEvent::JoinTimeout(e) => tracing::warn!("{}", e),
        SwimEvent::UpdatedMembers(members) => {
            tracing::info!("Membership replaced: {} member(s)", members.len())
        }
        SwimEvent::PeerUp(node) => tracing::info!("Peer up: {}", node),
        SwimEvent::PeerSuspected(node) => tracing::info!("Peer suspected: {}", node),
        SwimEvent::PeerDown(node) => tracing::info!("Peer down: {}", node),
        SwimEvent::NewMetadata(all) => {
            tracing::info!("Metadata updated: {} owner(s)", all.len())
        }
        SwimEvent::Error(e) => tracing::error!("{}", e),
    }
}
