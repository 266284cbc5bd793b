//! 📦 Wire shapes: the slice of Elasticsearch JSON this crate actually reads and writes.
//!
//! Everything here is a partial model. Elasticsearch returns a lot more than we care about,
//! serde ignores the rest. Request payloads are a different story: absent keys MUST stay
//! absent on the wire, otherwise a `PUT /_cluster/settings` quietly unsets things on the
//! server. Hence all the `Option` + `skip_serializing_if` below. 🔧

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// ℹ️ The response from `GET /`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Info {
    pub cluster_name: String,
    pub cluster_uuid: String,
    pub version: InfoVersion,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InfoVersion {
    pub number: String,
}

/// 🚦 Cluster health colour, as reported by `_cluster/health`.
///
/// `Unknown` is ours: it is what an observer reports when it could not reach the cluster,
/// and what anything unexpected on the wire decodes to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Green,
    Yellow,
    Red,
    #[default]
    #[serde(other)]
    Unknown,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthStatus::Green => "green",
            HealthStatus::Yellow => "yellow",
            HealthStatus::Red => "red",
            HealthStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// 🩺 The response from `GET /_cluster/health`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Health {
    pub cluster_name: String,
    pub status: HealthStatus,
    pub timed_out: bool,
    pub number_of_nodes: i64,
    pub number_of_data_nodes: i64,
    pub active_primary_shards: i64,
    pub active_shards: i64,
    pub relocating_shards: i64,
    pub initializing_shards: i64,
    pub unassigned_shards: i64,
    pub delayed_unassigned_shards: i64,
    pub number_of_pending_tasks: i64,
    pub number_of_in_flight_fetch: i64,
    pub task_max_waiting_in_queue_millis: i64,
    pub active_shards_percent_as_number: f64,
}

/// The four states a shard copy can be in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShardState {
    Started,
    Initializing,
    Relocating,
    #[default]
    Unassigned,
}

impl fmt::Display for ShardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ShardState::Started => "STARTED",
            ShardState::Initializing => "INITIALIZING",
            ShardState::Relocating => "RELOCATING",
            ShardState::Unassigned => "UNASSIGNED",
        };
        f.write_str(s)
    }
}

/// 🧩 One copy of one shard: a hybrid of a `_cat/shards` row and a routing table entry.
///
/// On the wire `node` is the node *id* (or `null` for unassigned copies). Once it went
/// through [`ClusterState::shards`] it holds the node *name*, or `""` when unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shard {
    pub index: String,
    pub shard: i32,
    pub primary: bool,
    pub state: ShardState,
    #[serde(default, deserialize_with = "null_as_default")]
    pub node: String,
}

impl Shard {
    pub fn is_relocating(&self) -> bool {
        self.state == ShardState::Relocating
    }

    pub fn is_started(&self) -> bool {
        self.state == ShardState::Started
    }

    pub fn is_initializing(&self) -> bool {
        self.state == ShardState::Initializing
    }

    /// 🔑 `index/shard`, which identifies all copies of a shard across nodes.
    pub fn key(&self) -> String {
        format!("{}/{}", self.index, self.shard)
    }
}

/// Shards of one index, keyed by shard number (a string on the wire, because JSON).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexRoutingTable {
    #[serde(default)]
    pub shards: HashMap<String, Vec<Shard>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingTable {
    #[serde(default)]
    pub indices: HashMap<String, IndexRoutingTable>,
}

/// 🖥️ An entry of the `nodes` table in cluster state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterStateNode {
    pub name: String,
    pub ephemeral_id: String,
    pub transport_address: String,
    pub attributes: HashMap<String, String>,
}

/// 🗺️ Partial model of `GET /_cluster/state/version,master_node,nodes,routing_table`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterState {
    pub cluster_name: String,
    pub cluster_uuid: String,
    pub version: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub master_node: String,
    pub nodes: HashMap<String, ClusterStateNode>,
    pub routing_table: RoutingTable,
}

impl ClusterState {
    /// True when nothing was decoded at all, the zero value.
    pub fn is_empty(&self) -> bool {
        self.cluster_name.is_empty()
            && self.cluster_uuid.is_empty()
            && self.version == 0
            && self.master_node.is_empty()
            && self.nodes.is_empty()
            && self.routing_table.indices.is_empty()
    }

    /// 🧩 Flatten the routing table into one [`Shard`] per shard copy, with the node id
    /// swapped for the node name.
    ///
    /// ⚠️ Neither index order nor shard order is guaranteed. Sort if you need determinism.
    pub fn shards(&self) -> Vec<Shard> {
        self.routing_table
            .indices
            .values()
            .flat_map(|index| index.shards.values())
            .flatten()
            .map(|shard| Shard {
                node: self
                    .nodes
                    .get(&shard.node)
                    .map(|n| n.name.clone())
                    .unwrap_or_default(),
                ..shard.clone()
            })
            .collect()
    }

    /// 👑 Name of the elected master, or `""` if we do not know it.
    pub fn master_node_name(&self) -> &str {
        self.nodes
            .get(&self.master_node)
            .map(|n| n.name.as_str())
            .unwrap_or_default()
    }

    /// The node table keyed by node name instead of node id.
    pub fn nodes_by_node_name(&self) -> HashMap<String, ClusterStateNode> {
        self.nodes
            .values()
            .map(|node| (node.name.clone(), node.clone()))
            .collect()
    }
}

/// Partial model of `GET /_nodes/_all/jvm,settings`, keyed by node id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Nodes {
    #[serde(default)]
    pub nodes: HashMap<String, Node>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Node {
    pub name: String,
    pub roles: Vec<String>,
    pub jvm: NodeJvm,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeJvm {
    pub start_time_in_millis: i64,
    pub mem: NodeJvmMem,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeJvmMem {
    pub heap_max_in_bytes: i64,
}

/// Partial model of `GET /_nodes/_all/stats/os`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodesStats {
    #[serde(default)]
    pub nodes: HashMap<String, NodeStats>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeStats {
    pub name: String,
    pub os: NodeStatsOs,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeStatsOs {
    pub cgroup: NodeStatsCgroup,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeStatsCgroup {
    pub memory: NodeStatsCgroupMemory,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeStatsCgroupMemory {
    /// A string on the wire, since cgroup v1 happily reports numbers bigger than i64.
    pub limit_in_bytes: String,
}

/// 🚧 Transient allocation settings. Absent fields are omitted when serialized.
///
/// Field names are the flat setting keys, which is what both `PUT /_cluster/settings`
/// and `GET /_cluster/settings?flat_settings=true` speak.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllocationSettings {
    #[serde(
        rename = "cluster.routing.allocation.exclude._name",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub exclude_name: Option<String>,
    #[serde(
        rename = "cluster.routing.allocation.enable",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub enable: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterRoutingAllocation {
    #[serde(default)]
    pub transient: AllocationSettings,
}

impl ClusterRoutingAllocation {
    /// Allocation is enabled unless someone set `enable` to anything but `all`.
    pub fn is_shard_allocation_enabled(&self) -> bool {
        matches!(self.transient.enable.as_deref(), None | Some("all"))
    }
}

/// Zen1 quorum size. 6.x only, 7.x computes this itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryZen {
    #[serde(rename = "discovery.zen.minimum_master_nodes")]
    pub minimum_master_nodes: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryZenSettings {
    pub transient: DiscoveryZen,
    pub persistent: DiscoveryZen,
}

/// 🌐 Cluster settings carrying remote cluster seeds. Empty groups are not serialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteClustersSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent: Option<SettingsGroup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transient: Option<SettingsGroup>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsGroup {
    #[serde(default)]
    pub cluster: RemoteClusterGroup,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteClusterGroup {
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub remote: HashMap<String, RemoteCluster>,
}

/// Seeds of one remote cluster. `None` serializes as `null`, which removes the remote.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteCluster {
    pub seeds: Option<Vec<String>>,
}

/// 💀 Elasticsearch's error envelope.
///
/// `error` is required: a body without it is not an error envelope, and the
/// [`ApiError`](super::ApiError) reason falls back to `"unknown"`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub status: i64,
    pub error: ErrorDetails,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetails {
    #[serde(default)]
    pub reason: String,
    #[serde(default, rename = "type")]
    pub error_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caused_by: Option<ErrorCause>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub root_cause: Vec<ErrorCause>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorCause {
    #[serde(default)]
    pub reason: String,
    #[serde(default, rename = "type")]
    pub error_type: String,
}

/// 📜 A license as applied to a cluster.
///
/// `signature` is empty on reads and mandatory on writes. `status`, `issue_date` and
/// `expiry_date` are only ever present on reads. Dates travel as RFC 3339 strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default, rename = "type")]
    pub license_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_date: Option<String>,
    #[serde(default)]
    pub issue_date_in_millis: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<String>,
    #[serde(default)]
    pub expiry_date_in_millis: i64,
    #[serde(default)]
    pub max_nodes: i64,
    #[serde(default)]
    pub issued_to: String,
    #[serde(default)]
    pub issuer: String,
    #[serde(default)]
    pub start_date_in_millis: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub signature: String,
}

/// The body of `GET /_license` (or `/_xpack/license`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LicenseResponse {
    #[serde(default)]
    pub license: License,
}

/// A license update. Every license must carry its signature.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LicenseUpdateRequest {
    pub licenses: Vec<License>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseStatus {
    Valid,
    Invalid,
    Expired,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LicenseUpdateResponse {
    #[serde(default)]
    pub acknowledged: bool,
    #[serde(default)]
    pub license_status: LicenseStatus,
}

impl LicenseUpdateResponse {
    pub fn is_success(&self) -> bool {
        self.license_status == LicenseStatus::Valid
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StartTrialResponse {
    #[serde(default)]
    pub acknowledged: bool,
    #[serde(default)]
    pub trial_was_started: bool,
    #[serde(default)]
    pub error_message: String,
}

impl StartTrialResponse {
    pub fn is_success(&self) -> bool {
        self.acknowledged && self.trial_was_started
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StartBasicResponse {
    #[serde(default)]
    pub acknowledged: bool,
    #[serde(default)]
    pub basic_was_started: bool,
    #[serde(default)]
    pub error_message: String,
}

/// 🗄️ A snapshot repository definition, passed through as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotRepository(pub Map<String, Value>);

impl SnapshotRepository {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The repository `type`, e.g. `fs` or `gcs`, if present.
    pub fn repository_type(&self) -> Option<&str> {
        self.0.get("type").and_then(Value::as_str)
    }
}

/// 📸 `GET /_snapshot/{repo}/_all`. Snapshots stay opaque JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotsList {
    #[serde(default)]
    pub snapshots: Vec<Value>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
