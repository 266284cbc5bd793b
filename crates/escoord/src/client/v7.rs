//! 7️⃣ Elasticsearch 7.x: Zen2 owns the quorum, master nodes leave via voting exclusions.

use async_trait::async_trait;

use super::error::EsResult;
use super::transport::BaseClient;
use super::{ClusterApi, DEFAULT_VOTING_CONFIG_EXCLUSIONS_TIMEOUT};

#[derive(Debug, Clone)]
pub struct ClientV7 {
    base: BaseClient,
}

impl ClientV7 {
    pub fn new(base: BaseClient) -> Self {
        Self { base }
    }
}

#[async_trait]
impl ClusterApi for ClientV7 {
    fn base(&self) -> &BaseClient {
        &self.base
    }

    fn license_api(&self) -> &'static str {
        "/_license"
    }

    async fn set_minimum_master_nodes(&self, _n: u32) -> EsResult<()> {
        Err(self.base.unsupported("set_minimum_master_nodes"))
    }

    /// 🗳️ Ask the cluster to drop `node_names` from the voting configuration. The server waits
    /// up to `timeout` for that to happen; an empty timeout means 30s.
    async fn add_voting_config_exclusions(&self, node_names: &[String], timeout: &str) -> EsResult<()> {
        let path = voting_config_exclusions_path(node_names, timeout);
        self.base
            .post_empty(&path)
            .await
            .map_err(|err| err.context("unable to add to voting_config_exclusions"))
    }

    async fn delete_voting_config_exclusions(&self, wait_for_removal: bool) -> EsResult<()> {
        let path = format!("/_cluster/voting_config_exclusions?wait_for_removal={wait_for_removal}");
        self.base
            .delete(&path)
            .await
            .map_err(|err| err.context("unable to delete /_cluster/voting_config_exclusions"))
    }
}

/// Node names are comma-joined in input order, nothing is escaped.
pub(crate) fn voting_config_exclusions_path(node_names: &[String], timeout: &str) -> String {
    let timeout = if timeout.is_empty() {
        DEFAULT_VOTING_CONFIG_EXCLUSIONS_TIMEOUT
    } else {
        timeout
    };
    format!(
        "/_cluster/voting_config_exclusions/{}?timeout={}",
        node_names.join(","),
        timeout
    )
}
