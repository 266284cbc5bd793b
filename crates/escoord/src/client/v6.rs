//! 6️⃣ Elasticsearch 6.x: Zen1 discovery, x-pack under `/_xpack`, no voting exclusions.

use async_trait::async_trait;

use super::error::EsResult;
use super::model::{DiscoveryZen, DiscoveryZenSettings};
use super::transport::BaseClient;
use super::ClusterApi;

#[derive(Debug, Clone)]
pub struct ClientV6 {
    base: BaseClient,
}

impl ClientV6 {
    pub fn new(base: BaseClient) -> Self {
        Self { base }
    }
}

#[async_trait]
impl ClusterApi for ClientV6 {
    fn base(&self) -> &BaseClient {
        &self.base
    }

    fn license_api(&self) -> &'static str {
        "/_xpack/license"
    }

    /// 🗳️ Set the Zen1 quorum, transient and persistent alike so a full restart keeps it.
    async fn set_minimum_master_nodes(&self, n: u32) -> EsResult<()> {
        let zen = DiscoveryZen { minimum_master_nodes: n };
        let settings = DiscoveryZenSettings {
            transient: zen,
            persistent: zen,
        };
        self.base.put("/_cluster/settings", &settings).await
    }

    async fn add_voting_config_exclusions(&self, _node_names: &[String], _timeout: &str) -> EsResult<()> {
        Err(self.base.unsupported("add_voting_config_exclusions"))
    }

    async fn delete_voting_config_exclusions(&self, _wait_for_removal: bool) -> EsResult<()> {
        Err(self.base.unsupported("delete_voting_config_exclusions"))
    }
}
