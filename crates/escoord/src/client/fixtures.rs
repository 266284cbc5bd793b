//! 🧪 Canned Elasticsearch responses, straight from clusters we once knew.

pub(crate) const CLUSTER_STATE_SAMPLE: &str = include_str!("../../fixtures/cluster_state.json");
pub(crate) const EMPTY_CLUSTER_STATE_SAMPLE: &str =
    include_str!("../../fixtures/cluster_state_empty.json");
pub(crate) const HEALTH_SAMPLE: &str = include_str!("../../fixtures/health.json");
pub(crate) const ERROR_SAMPLE: &str = include_str!("../../fixtures/error.json");
pub(crate) const INFO_SAMPLE: &str = include_str!("../../fixtures/info.json");
pub(crate) const LICENSE_SAMPLE: &str = include_str!("../../fixtures/license.json");
pub(crate) const NODES_SAMPLE: &str = include_str!("../../fixtures/nodes.json");

/// Two unrelated self-signed CAs, for trust set comparisons.
pub(crate) const CA_A_PEM: &str = include_str!("../../fixtures/ca_a.pem");
pub(crate) const CA_B_PEM: &str = include_str!("../../fixtures/ca_b.pem");
