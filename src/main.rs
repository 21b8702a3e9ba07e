// mesh - Run gossip dissemination over an in-process mesh and print the result

use clap::{Args, Parser, Subcommand};
use epimesh::network::{Cluster, ClusterStats, SettleReport, Topology};
use epimesh::replica::{ConcurrentPolicy, NodeId, Snapshot};
use epimesh::sync::GossipConfig;
use serde::Serialize;
use std::error::Error;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Updates injected by `mesh run`: (node, key, value), one per node
const REFERENCE_UPDATES: &[(usize, &str, i64)] = &[
    (0, "temperature", 27),
    (1, "humidity", 65),
    (2, "pressure", 1013),
];

#[derive(Parser, Debug)]
#[command(name = "mesh", version, about = "Epidemic key-value dissemination simulator")]
struct Cli {
    /// Raise log verbosity (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the reference scenario and print every node's replica
    Run(MeshArgs),
    /// Inject a single update and print every node's replica
    Update {
        #[command(flatten)]
        mesh: MeshArgs,
        /// Originating node
        #[arg(long, default_value_t = 0)]
        node: usize,
        #[arg(long)]
        key: String,
        #[arg(long)]
        value: i64,
    },
}

#[derive(Args, Debug)]
struct MeshArgs {
    /// Number of nodes
    #[arg(short, long, default_value_t = 5)]
    nodes: usize,
    /// Neighbors contacted per gossip step
    #[arg(short, long, default_value_t = 3)]
    fanout: usize,
    /// complete, ring, star or star:<hub>
    #[arg(short, long, default_value = "complete")]
    topology: Topology,
    /// accept-incoming or keep-local
    #[arg(short, long, default_value = "accept-incoming")]
    policy: ConcurrentPolicy,
    /// Give up on convergence after this many seconds
    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,
    /// Print the final state as JSON instead of text
    #[arg(long)]
    json: bool,
}

/// Final state of a run, as printed by `--json`
#[derive(Serialize)]
struct RunReport<'a> {
    topology: String,
    settle_rounds: usize,
    nodes: &'a [Snapshot<i64>],
    stats: &'a ClusterStats,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Run(mesh) => {
            let updates: Vec<(usize, String, i64)> = REFERENCE_UPDATES
                .iter()
                .map(|&(node, key, value)| (node, key.to_string(), value))
                .collect();
            simulate(&mesh, &updates).await
        }
        Command::Update {
            mesh,
            node,
            key,
            value,
        } => simulate(&mesh, &[(node, key, value)]).await,
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn simulate(mesh: &MeshArgs, updates: &[(usize, String, i64)]) -> Result<(), Box<dyn Error>> {
    let config = GossipConfig::new()
        .with_fanout(mesh.fanout)
        .with_concurrent_policy(mesh.policy);
    let cluster: Cluster<i64> = Cluster::start(mesh.nodes, mesh.topology.clone(), config)?;

    for (node, key, value) in updates {
        cluster.disseminate(NodeId::new(*node), key, *value)?;
    }

    let report = cluster
        .settle_timeout(Duration::from_secs(mesh.timeout_secs))
        .await?;
    let snapshots = cluster.snapshots()?;
    let stats = cluster.stats();

    if mesh.json {
        print_json(&cluster, &report, &snapshots, &stats)?;
    } else {
        print_text(&cluster, &report, &snapshots, &stats);
    }

    cluster.shutdown().await;
    Ok(())
}

fn print_json(
    cluster: &Cluster<i64>,
    report: &SettleReport,
    snapshots: &[Snapshot<i64>],
    stats: &ClusterStats,
) -> Result<(), serde_json::Error> {
    let run = RunReport {
        topology: cluster.topology().to_string(),
        settle_rounds: report.rounds,
        nodes: snapshots,
        stats,
    };
    println!("{}", serde_json::to_string_pretty(&run)?);
    Ok(())
}

fn print_text(
    cluster: &Cluster<i64>,
    report: &SettleReport,
    snapshots: &[Snapshot<i64>],
    stats: &ClusterStats,
) {
    println!(
        "Converged after {} settle round(s) on a {} mesh of {} nodes",
        report.rounds,
        cluster.topology(),
        cluster.size()
    );
    for (i, snapshot) in snapshots.iter().enumerate() {
        println!("{} data: {}", NodeId::new(i), render(snapshot));
    }
    println!(
        "Rumors: {} sent, {} received, {} applied, {} concurrent",
        stats.rumors_sent, stats.rumors_received, stats.rumors_applied, stats.concurrent_merges
    );
}

fn render(snapshot: &Snapshot<i64>) -> String {
    let fields: Vec<String> = snapshot
        .iter()
        .map(|(key, entry)| match entry.value() {
            Some(value) => format!("{}={} @ {}", key, value, entry.clock()),
            None => format!("{}=<none> @ {}", key, entry.clock()),
        })
        .collect();
    format!("{{{}}}", fields.join(", "))
}
