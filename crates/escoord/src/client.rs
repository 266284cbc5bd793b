//! 🛰️ The Elasticsearch cluster-management client, one flavour per major version.
//!
//! Callers hold an `Arc<dyn ClusterApi>` and never care which flavour they got.
//! Most endpoints are the same in 6.x and 7.x and live as default methods on the trait.
//! The handful that differ (license paths, Zen1 quorum vs voting exclusions) are
//! implemented per version in [`v6`] and [`v7`]. Asking a version for something it does not
//! have is an [`EsError::Unsupported`], and no request leaves the building.
//!
//! ```text
//!   new_elasticsearch_client(settings)
//!            │  major == 7 ?
//!      ┌─────┴─────┐
//!   ClientV7    ClientV6      ← version-specific bits
//!      └─────┬─────┘
//!        BaseClient           ← identity + codec
//!            │
//!       HttpTransport         ← pooled reqwest::Client, pinned CAs, optional dialer
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use semver::Version;
use tracing::debug;

pub mod error;
pub mod identity;
pub mod model;
pub mod transport;
pub mod v6;
pub mod v7;

#[cfg(test)]
pub(crate) mod fixtures;

pub use error::{ApiError, EsError, EsResult, is_not_found, is_not_found_anyhow};
pub use identity::{CaCertificate, ClientIdentity, Credentials, TrustSet};
pub use transport::{BaseClient, DEFAULT_REQUEST_TIMEOUT, Dialer, HttpTransport, StaticDialer};
pub use v6::ClientV6;
pub use v7::ClientV7;

use model::{
    AllocationSettings, ClusterRoutingAllocation, ClusterState, Health, Info, License,
    LicenseResponse, LicenseUpdateRequest, LicenseUpdateResponse, Nodes, NodesStats,
    RemoteClustersSettings, SnapshotRepository, SnapshotsList, StartBasicResponse,
    StartTrialResponse,
};

/// What the server waits for when excluding voting nodes and the caller did not say.
pub const DEFAULT_VOTING_CONFIG_EXCLUSIONS_TIMEOUT: &str = "30s";

/// Documented cluster-state metric filter: only what the observer and reconcilers read.
const CLUSTER_STATE_PATH: &str = "/_cluster/state/version,master_node,nodes,routing_table";

/// 🔧 Everything needed to build a client.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub endpoint: String,
    pub credentials: Credentials,
    pub trust_set: TrustSet,
    pub version: Version,
    pub dialer: Option<Arc<dyn Dialer>>,
    pub request_timeout: Duration,
}

impl ClientSettings {
    pub fn new(endpoint: impl Into<String>, version: Version) -> Self {
        Self {
            endpoint: endpoint.into(),
            credentials: Credentials::default(),
            trust_set: TrustSet::default(),
            version,
            dialer: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_trust_set(mut self, trust_set: TrustSet) -> Self {
        self.trust_set = trust_set;
        self
    }

    /// Route connections through `dialer`. The endpoint must then use a host name, see [`Dialer`].
    pub fn with_dialer(mut self, dialer: Arc<dyn Dialer>) -> Self {
        self.dialer = Some(dialer);
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }
}

/// 🏭 Build the client matching `settings.version`: 7.x for major 7, 6.x for everything else.
///
/// Fails with [`EsError::InvalidSettings`] when a dialer is paired with an IP-literal endpoint,
/// and with [`EsError::Transport`] when a CA is not a usable certificate.
pub fn new_elasticsearch_client(settings: ClientSettings) -> EsResult<Arc<dyn ClusterApi>> {
    if settings.dialer.is_some() {
        transport::ensure_dialable(&settings.endpoint)?;
    }
    let transport = HttpTransport::new(
        &settings.trust_set,
        settings.dialer.clone(),
        settings.request_timeout,
    )?;
    let identity = ClientIdentity {
        endpoint: settings.endpoint,
        credentials: settings.credentials,
        trust_set: settings.trust_set,
        version: settings.version,
    };
    debug!(
        "🏭 building Elasticsearch {} client for {}",
        identity.version_label(),
        identity.endpoint
    );
    let base = BaseClient::new(identity, transport);
    let client: Arc<dyn ClusterApi> = if base.identity().version.major == 7 {
        Arc::new(ClientV7::new(base))
    } else {
        Arc::new(ClientV6::new(base))
    };
    Ok(client)
}

fn allocation_enable(enable: &str) -> ClusterRoutingAllocation {
    ClusterRoutingAllocation {
        transient: AllocationSettings {
            exclude_name: None,
            enable: Some(enable.to_string()),
        },
    }
}

/// 🎛️ The cluster-management surface, uniform across Elasticsearch majors.
///
/// Every call is cancelled by dropping its future, so a deadline is a
/// `tokio::time::timeout` away.
#[async_trait]
pub trait ClusterApi: Send + Sync + fmt::Debug {
    fn base(&self) -> &BaseClient;

    /// Root of the license API for this version.
    fn license_api(&self) -> &'static str;

    fn identity(&self) -> &ClientIdentity {
        self.base().identity()
    }

    fn version(&self) -> &Version {
        &self.identity().version
    }

    /// Same endpoint, credentials, trust set and major version. The dialer is not compared.
    fn same_as(&self, other: &dyn ClusterApi) -> bool {
        self.identity() == other.identity()
    }

    /// 👋 `GET /`. Name, uuid, version. The handshake of Elasticsearch.
    async fn get_cluster_info(&self) -> EsResult<Info> {
        self.base().get("/").await
    }

    /// 🗺️ Only the metrics the observer reads. The full state of a big cluster is megabytes.
    async fn get_cluster_state(&self) -> EsResult<ClusterState> {
        self.base().get(CLUSTER_STATE_PATH).await
    }

    async fn get_cluster_health(&self) -> EsResult<Health> {
        self.base().get("/_cluster/health").await
    }

    // -- jvm for heap sizes, settings for node attributes
    async fn get_nodes(&self) -> EsResult<Nodes> {
        self.base().get("/_nodes/_all/jvm,settings").await
    }

    async fn get_nodes_stats(&self) -> EsResult<NodesStats> {
        self.base().get("/_nodes/_all/stats/os").await
    }

    /// The transient allocation settings, read in flat form.
    async fn get_cluster_routing_allocation(&self) -> EsResult<ClusterRoutingAllocation> {
        self.base().get("/_cluster/settings?flat_settings=true").await
    }

    /// 🚧 Move shards off the named nodes (comma-separated). Re-enables allocation while at it,
    /// otherwise the shards would have nowhere to go.
    async fn exclude_from_shard_allocation(&self, nodes: &str) -> EsResult<()> {
        let allocation = ClusterRoutingAllocation {
            transient: AllocationSettings {
                exclude_name: Some(nodes.to_string()),
                enable: Some("all".to_string()),
            },
        };
        self.base().put("/_cluster/settings", &allocation).await
    }

    async fn enable_shard_allocation(&self) -> EsResult<()> {
        self.base().put("/_cluster/settings", &allocation_enable("all")).await
    }

    /// Keep primaries allocatable and stop replicas from moving, e.g. around a node restart.
    async fn disable_replica_shards_allocation(&self) -> EsResult<()> {
        self.base().put("/_cluster/settings", &allocation_enable("primaries")).await
    }

    /// Zen1 quorum size. 6.x only.
    async fn set_minimum_master_nodes(&self, n: u32) -> EsResult<()>;

    /// 7.x only.
    async fn add_voting_config_exclusions(&self, node_names: &[String], timeout: &str) -> EsResult<()>;

    /// 7.x only.
    async fn delete_voting_config_exclusions(&self, wait_for_removal: bool) -> EsResult<()>;

    /// 🚽 Flush everything. Cheaper restarts, at the price of some I/O right now.
    async fn flush(&self) -> EsResult<()> {
        self.base().post_empty("/_flush").await
    }

    // -- 409 means some shards had ongoing ops; callers usually shrug and retry
    async fn synced_flush(&self) -> EsResult<()> {
        self.base().post_empty("/_flush/synced").await
    }

    async fn update_remote_cluster_settings(&self, settings: &RemoteClustersSettings) -> EsResult<()> {
        self.base().put("/_cluster/settings", settings).await
    }

    /// 📜 The installed license, unwrapped from its `{"license": ...}` envelope.
    async fn get_license(&self) -> EsResult<License> {
        let response: LicenseResponse = self.base().get(self.license_api()).await?;
        Ok(response.license)
    }

    async fn update_license(&self, licenses: &LicenseUpdateRequest) -> EsResult<LicenseUpdateResponse> {
        self.base().post(self.license_api(), licenses).await
    }

    async fn start_trial(&self) -> EsResult<StartTrialResponse> {
        let path = format!("{}/start_trial?acknowledge=true", self.license_api());
        self.base().post_for(&path).await
    }

    async fn start_basic(&self) -> EsResult<StartBasicResponse> {
        let path = format!("{}/start_basic?acknowledge=true", self.license_api());
        self.base().post_for(&path).await
    }

    /// 🗄️ The repository called `name`, or an empty repository if the answer does not mention it.
    async fn get_snapshot_repository(&self, name: &str) -> EsResult<SnapshotRepository> {
        let mut repositories: HashMap<String, SnapshotRepository> =
            self.base().get(&format!("/_snapshot/{name}")).await?;
        Ok(repositories.remove(name).unwrap_or_default())
    }

    async fn upsert_snapshot_repository(&self, name: &str, repository: &SnapshotRepository) -> EsResult<()> {
        self.base().put(&format!("/_snapshot/{name}"), repository).await
    }

    async fn delete_snapshot_repository(&self, name: &str) -> EsResult<()> {
        self.base().delete(&format!("/_snapshot/{name}")).await
    }

    /// 📸 Start a snapshot. Returns once the server accepted it, not once it finished.
    async fn take_snapshot(&self, repository: &str, snapshot: &str) -> EsResult<()> {
        self.base().put_empty(&format!("/_snapshot/{repository}/{snapshot}")).await
    }

    async fn delete_snapshot(&self, repository: &str, snapshot: &str) -> EsResult<()> {
        self.base().delete(&format!("/_snapshot/{repository}/{snapshot}")).await
    }

    async fn get_all_snapshots(&self, repository: &str) -> EsResult<SnapshotsList> {
        self.base().get(&format!("/_snapshot/{repository}/_all")).await
    }

    /// 🔑 Ask every node to re-read its keystore.
    async fn reload_secure_settings(&self) -> EsResult<()> {
        self.base().post_empty("/_nodes/reload_secure_settings").await
    }
}
