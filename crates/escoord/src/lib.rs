//! 🛰️ escoord: talk to Elasticsearch clusters about coordination, and keep an eye on them.
//!
//! - [`client`]: the version-aware management client (6.x and 7.x).
//! - [`observer`]: per-cluster background observers and the manager that owns them.
//! - [`app_config`]: figment-backed configuration for the binary and embedders alike.

pub mod app_config;
pub mod client;
pub mod observer;

pub use client::{
    ApiError, ClientSettings, ClusterApi, EsError, EsResult, is_not_found, new_elasticsearch_client,
};
pub use observer::{ClusterId, Manager, Observer, ObserverSettings, State};
