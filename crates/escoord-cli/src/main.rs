//! 🚀 escoord: the command-line window into the clusters in your config.
//!
//! One-shot commands (`info`, `health`, `state`, `nodes`, `license`, `exclude-voters`,
//! `clear-voters`) talk to a single cluster. `watch` starts an observer per configured cluster and reports every change of
//! health colour until Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::UTF8_FULL};
use escoord::app_config::{AppConfig, ClusterConfig, load_config};
use escoord::client::model::{ClusterState, HealthStatus, Nodes};
use escoord::client::{ClusterApi, new_elasticsearch_client};
use escoord::observer::{Manager, health_change_listener};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "escoord", version, about = "Elasticsearch coordination client and cluster observer")]
struct Cli {
    /// TOML config file. Without one, only ESCOORD_* environment variables are read.
    #[arg(short, long, env = "ESCOORD_CONFIG")]
    config: Option<PathBuf>,

    /// Cluster to talk to, as `namespace/name` or just `name`. Defaults to the first one.
    #[arg(long)]
    cluster: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Cluster name, uuid and version.
    Info,
    /// Cluster health.
    Health,
    /// Master node and the shard routing table.
    State,
    /// Nodes with their roles and heap.
    Nodes,
    /// The installed license.
    License,
    /// Keep nodes out of the voting configuration (7.x).
    ExcludeVoters {
        /// Node names, as Elasticsearch knows them.
        #[arg(required = true)]
        nodes: Vec<String>,
    },
    /// Clear the voting configuration exclusions (7.x).
    ClearVoters {
        /// Return right away instead of waiting for the excluded nodes to leave.
        #[arg(long)]
        no_wait: bool,
    },
    /// Observe every configured cluster and log health changes until Ctrl-C.
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let result = run(cli).await;

    if let Err(err) = result {
        error!("💀 error: {}", err);
        let mut looks_like_connectivity = false;
        for cause in err.chain().skip(1) {
            error!("⚠️  cause: {}", cause);
            let cause = cause.to_string();
            if cause.contains("error sending request")
                || cause.contains("Connection refused")
                || cause.contains("connection refused")
                || cause.contains("dns error")
                || cause.contains("certificate")
            {
                looks_like_connectivity = true;
            }
        }
        if looks_like_connectivity {
            error!(
                "🔧 hint: the cluster is not reachable or not trusted. Check the url, and that \
                 `ca_file` holds the CA that signed the cluster's HTTP certificate."
            );
        }
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())
        .context("💀 escoord could not load its configuration. Check the file and the ESCOORD_* variables.")?;

    match cli.command {
        Command::Watch => watch(&config).await,
        command => {
            let cluster = pick_cluster(&config, cli.cluster.as_deref())?;
            let client = connect(&config, cluster).await?;
            one_shot(client.as_ref(), &config, command).await
        }
    }
}

async fn one_shot(client: &dyn ClusterApi, config: &AppConfig, command: Command) -> Result<()> {
    match command {
        Command::Info => {
            let info = client.get_cluster_info().await.context("💀 GET / failed")?;
            println!("{} ({}) running {}", info.cluster_name, info.cluster_uuid, info.version.number);
        }
        Command::Health => {
            let health = client.get_cluster_health().await.context("💀 could not read cluster health")?;
            println!(
                "{} is {}: {} nodes, {} active shards, {} unassigned, {:.1}% active",
                health.cluster_name,
                health.status,
                health.number_of_nodes,
                health.active_shards,
                health.unassigned_shards,
                health.active_shards_percent_as_number
            );
        }
        Command::State => {
            let state = client.get_cluster_state().await.context("💀 could not read cluster state")?;
            println!("👑 master: {}", display_or_dash(state.master_node_name()));
            println!("{}", shard_table(&state));
        }
        Command::Nodes => {
            let nodes = client.get_nodes().await.context("💀 could not list nodes")?;
            println!("{}", node_table(&nodes));
        }
        Command::License => {
            let license = client.get_license().await.context("💀 could not read the license")?;
            println!(
                "{} license {} for '{}', status {}, expires {}",
                license.license_type,
                license.uid,
                license.issued_to,
                license.status,
                license.expiry_date.as_deref().unwrap_or("never")
            );
        }
        Command::ExcludeVoters { nodes } => {
            client
                .add_voting_config_exclusions(&nodes, &config.client.voting_config_exclusions_timeout)
                .await
                .context("💀 could not exclude voters")?;
            println!("🗳️ excluded from voting: {}", nodes.join(","));
        }
        Command::ClearVoters { no_wait } => {
            client
                .delete_voting_config_exclusions(!no_wait)
                .await
                .context("💀 could not clear voting exclusions")?;
            println!("🗳️ voting exclusions cleared");
        }
        Command::Watch => bail!("💀 `watch` observes every cluster, it is not a one-shot command"),
    }
    Ok(())
}

fn pick_cluster<'a>(config: &'a AppConfig, wanted: Option<&str>) -> Result<&'a ClusterConfig> {
    let Some(wanted) = wanted else {
        return config
            .clusters
            .first()
            .context("💀 No clusters configured. Add a [[clusters]] entry to the config file.");
    };
    let found = config
        .clusters
        .iter()
        .find(|cluster| cluster.id().to_string() == wanted || cluster.name == wanted);
    match found {
        Some(cluster) => Ok(cluster),
        None => bail!("💀 No cluster named '{wanted}' in the configuration"),
    }
}

async fn connect(config: &AppConfig, cluster: &ClusterConfig) -> Result<Arc<dyn ClusterApi>> {
    let settings = cluster.client_settings(&config.client).await?;
    new_elasticsearch_client(settings)
        .with_context(|| format!("💀 Could not build a client for cluster '{}'", cluster.id()))
}

async fn watch(config: &AppConfig) -> Result<()> {
    if config.clusters.is_empty() {
        bail!("💀 Nothing to watch: no clusters configured.");
    }
    if config.observer.settings().is_synchronous() {
        bail!("💀 `watch` needs a non-zero observer.observation_interval");
    }

    let manager = Manager::new(config.observer.settings());
    manager.add_observation_listener(health_change_listener(
        |cluster, before: HealthStatus, after: HealthStatus| async move {
            match after {
                HealthStatus::Green => info!("🟢 {cluster}: {before} → {after}"),
                HealthStatus::Yellow => warn!("🟡 {cluster}: {before} → {after}"),
                HealthStatus::Red | HealthStatus::Unknown => error!("🔴 {cluster}: {before} → {after}"),
            }
        },
    ));

    for cluster in &config.clusters {
        let client = connect(config, cluster).await?;
        manager.observe(cluster.id(), client);
    }
    info!("🔭 watching {} cluster(s), Ctrl-C to stop", config.clusters.len());

    tokio::signal::ctrl_c()
        .await
        .context("💀 Could not listen for Ctrl-C")?;
    for cluster in manager.list() {
        manager.stop_observing(&cluster);
    }
    info!("👋 done watching");
    Ok(())
}

fn display_or_dash(value: &str) -> &str {
    if value.is_empty() { "-" } else { value }
}

fn shard_table(state: &ClusterState) -> Table {
    let mut shards = state.shards();
    shards.sort_by(|a, b| (&a.index, a.shard, !a.primary).cmp(&(&b.index, b.shard, !b.primary)));

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["index", "shard", "prirep", "state", "node"]);
    for shard in shards {
        table.add_row(vec![
            Cell::new(&shard.index),
            Cell::new(shard.shard).set_alignment(CellAlignment::Right),
            Cell::new(if shard.primary { "p" } else { "r" }),
            Cell::new(shard.state),
            Cell::new(display_or_dash(&shard.node)),
        ]);
    }
    table
}

fn node_table(nodes: &Nodes) -> Table {
    let mut rows: Vec<_> = nodes.nodes.iter().collect();
    rows.sort_by(|(_, a), (_, b)| a.name.cmp(&b.name));

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["name", "id", "roles", "heap max"]);
    for (id, node) in rows {
        table.add_row(vec![
            Cell::new(&node.name),
            Cell::new(id),
            Cell::new(node.roles.join(",")),
            Cell::new(format!("{:.1} GiB", node.jvm.mem.heap_max_in_bytes as f64 / (1u64 << 30) as f64))
                .set_alignment(CellAlignment::Right),
        ]);
    }
    table
}
