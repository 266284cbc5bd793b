//! 🔧 App configuration: a TOML file, `ESCOORD_*` environment variables, and defaults for
//! whatever neither of them mentions.
//!
//! ```toml
//! [observer]
//! observation_interval = "10s"   # "0s" disables background observation
//! request_timeout = "1m"
//!
//! [client]
//! request_timeout = "3m"
//! voting_config_exclusions_timeout = "30s"
//!
//! [[clusters]]
//! namespace = "default"
//! name = "quickstart"
//! url = "https://quickstart-es-http.default.svc:9200"
//! username = "elastic"
//! password = "changeme"
//! version = "7.17.0"
//! ca_file = "/etc/escoord/quickstart-ca.pem"
//! ```
//!
//! Nested keys come from the environment with a double underscore:
//! `ESCOORD_OBSERVER__OBSERVATION_INTERVAL=30s`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use semver::Version;
use serde::{Deserialize, Deserializer};
use tracing::info;

use crate::client::{
    ClientSettings, Credentials, DEFAULT_REQUEST_TIMEOUT, DEFAULT_VOTING_CONFIG_EXCLUSIONS_TIMEOUT,
    TrustSet,
};
use crate::observer::{
    ClusterId, DEFAULT_OBSERVATION_INTERVAL, DEFAULT_OBSERVER_REQUEST_TIMEOUT, ObserverSettings,
};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub observer: ObserverConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub clusters: Vec<ClusterConfig>,
}

/// ⏱️ Observer cadence. Durations are humantime strings (`"10s"`, `"1m 30s"`) or plain seconds.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct ObserverConfig {
    #[serde(default = "default_observation_interval", deserialize_with = "duration")]
    pub observation_interval: Duration,
    #[serde(default = "default_observer_request_timeout", deserialize_with = "duration")]
    pub request_timeout: Duration,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            observation_interval: DEFAULT_OBSERVATION_INTERVAL,
            request_timeout: DEFAULT_OBSERVER_REQUEST_TIMEOUT,
        }
    }
}

impl ObserverConfig {
    pub fn settings(&self) -> ObserverSettings {
        ObserverSettings {
            observation_interval: self.observation_interval,
            request_timeout: self.request_timeout,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    #[serde(default = "default_client_request_timeout", deserialize_with = "duration")]
    pub request_timeout: Duration,
    /// Passed to Elasticsearch verbatim, so it stays a string.
    #[serde(default = "default_voting_config_exclusions_timeout")]
    pub voting_config_exclusions_timeout: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            voting_config_exclusions_timeout: DEFAULT_VOTING_CONFIG_EXCLUSIONS_TIMEOUT.to_string(),
        }
    }
}

/// 📡 One cluster to talk to.
#[derive(Debug, Deserialize, Clone)]
pub struct ClusterConfig {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Elasticsearch version, e.g. `"7.17.0"`. Only the major matters for routing.
    pub version: String,
    /// PEM bundle of the CAs to trust. Without one, no HTTPS endpoint will verify.
    #[serde(default)]
    pub ca_file: Option<PathBuf>,
}

impl ClusterConfig {
    pub fn id(&self) -> ClusterId {
        ClusterId::new(&self.namespace, &self.name)
    }

    /// 🔧 Turn this entry into client settings, reading the CA bundle from disk.
    pub async fn client_settings(&self, client: &ClientConfig) -> anyhow::Result<ClientSettings> {
        let version = Version::parse(&self.version).with_context(|| {
            format!(
                "💀 Cluster '{}' has version '{}', which is not a version. Try something like \"7.17.0\".",
                self.id(),
                self.version
            )
        })?;
        let trust_set = match &self.ca_file {
            Some(path) => TrustSet::from_pem_file(path)
                .await
                .with_context(|| format!("💀 Could not load the CAs for cluster '{}'", self.id()))?,
            None => TrustSet::default(),
        };
        let credentials = Credentials::new(
            self.username.clone().unwrap_or_default(),
            self.password.clone().unwrap_or_default(),
        );
        Ok(ClientSettings::new(self.url.trim_end_matches('/'), version)
            .with_credentials(credentials)
            .with_trust_set(trust_set)
            .with_request_timeout(client.request_timeout))
    }
}

/// 🚀 Load the config from `ESCOORD_*` env vars, plus a TOML file when one is given.
/// The file wins on conflicts.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("ESCOORD_").split("__"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (ESCOORD_*).",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (ESCOORD_*). \
                 No file was provided, so this one is all on the environment."
            .to_string(),
    };

    config.extract().context(context_msg)
}

fn default_observation_interval() -> Duration {
    DEFAULT_OBSERVATION_INTERVAL
}

fn default_observer_request_timeout() -> Duration {
    DEFAULT_OBSERVER_REQUEST_TIMEOUT
}

fn default_client_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

fn default_voting_config_exclusions_timeout() -> String {
    DEFAULT_VOTING_CONFIG_EXCLUSIONS_TIMEOUT.to_string()
}

fn default_namespace() -> String {
    "default".to_string()
}

// -- env vars like `=0` arrive as numbers, files usually as strings
fn duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum HumanOrSeconds {
        Human(String),
        Seconds(u64),
    }

    match HumanOrSeconds::deserialize(deserializer)? {
        HumanOrSeconds::Human(text) => {
            humantime::parse_duration(text.trim()).map_err(serde::de::Error::custom)
        }
        HumanOrSeconds::Seconds(seconds) => Ok(Duration::from_secs(seconds)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fixtures;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_test_config(contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("💀 Failed to create a temp config. The filesystem said 'new phone who dis'.");
        file.write_all(contents.as_bytes())
            .expect("💀 Failed to write test config.");
        file
    }

    #[test]
    fn the_one_where_everything_is_spelled_out() {
        let file = write_test_config(
            r#"
            [observer]
            observation_interval = "30s"
            request_timeout = "1m 30s"

            [client]
            request_timeout = "2m"
            voting_config_exclusions_timeout = "45s"

            [[clusters]]
            namespace = "prod"
            name = "logs"
            url = "https://logs-es-http.prod.svc:9200/"
            username = "elastic"
            password = "changeme"
            version = "7.17.0"

            [[clusters]]
            name = "metrics"
            url = "http://metrics:9200"
            version = "6.8.23"
            "#,
        );

        let config = load_config(Some(file.path())).expect("💀 a complete config should parse");

        assert_eq!(config.observer.observation_interval, Duration::from_secs(30));
        assert_eq!(config.observer.request_timeout, Duration::from_secs(90));
        assert_eq!(config.client.request_timeout, Duration::from_secs(120));
        assert_eq!(config.client.voting_config_exclusions_timeout, "45s");
        assert_eq!(config.clusters.len(), 2);
        assert_eq!(config.clusters[0].id(), ClusterId::new("prod", "logs"));
        assert_eq!(config.clusters[1].id().to_string(), "default/metrics");
        assert!(config.clusters[1].username.is_none());
    }

    #[test]
    fn the_one_where_an_empty_file_gets_all_the_defaults() {
        let file = write_test_config("");

        let config = load_config(Some(file.path())).expect("💀 defaults should fill an empty file");

        assert_eq!(config.observer, ObserverConfig::default());
        assert_eq!(config.observer.settings(), ObserverSettings::default());
        assert_eq!(config.client.request_timeout, Duration::from_secs(180));
        assert_eq!(config.client.voting_config_exclusions_timeout, "30s");
        assert!(config.clusters.is_empty());
    }

    #[test]
    fn the_one_where_zero_seconds_means_synchronous() {
        let file = write_test_config(
            r#"
            [observer]
            observation_interval = 0
            "#,
        );

        let config = load_config(Some(file.path())).unwrap();
        assert!(config.observer.settings().is_synchronous());
    }

    #[test]
    fn the_one_where_a_bad_duration_is_called_out() {
        let file = write_test_config(
            r#"
            [observer]
            observation_interval = "whenever you feel like it"
            "#,
        );

        let err = load_config(Some(file.path())).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse configuration from file"));
    }

    #[test]
    fn the_one_where_plain_toml_works_without_figment() {
        let config: AppConfig = toml::from_str(
            r#"
            [[clusters]]
            name = "quickstart"
            url = "http://localhost:9200"
            version = "7.0.0"
            "#,
        )
        .unwrap();
        assert_eq!(config.clusters[0].namespace, "default");
        assert_eq!(config.observer.observation_interval, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn the_one_where_a_cluster_entry_becomes_client_settings() {
        let ca_file = write_test_config(fixtures::CA_A_PEM);
        let cluster = ClusterConfig {
            namespace: "prod".into(),
            name: "logs".into(),
            url: "https://logs:9200/".into(),
            username: Some("elastic".into()),
            password: Some("changeme".into()),
            version: "7.17.0".into(),
            ca_file: Some(ca_file.path().to_path_buf()),
        };

        let settings = cluster.client_settings(&ClientConfig::default()).await.unwrap();

        assert_eq!(settings.endpoint, "https://logs:9200");
        assert_eq!(settings.version.major, 7);
        assert_eq!(settings.credentials, Credentials::new("elastic", "changeme"));
        assert_eq!(settings.trust_set.len(), 1);
        assert_eq!(settings.request_timeout, DEFAULT_REQUEST_TIMEOUT);
    }

    #[tokio::test]
    async fn the_one_where_the_version_is_not_a_version() {
        let cluster = ClusterConfig {
            namespace: "prod".into(),
            name: "logs".into(),
            url: "http://logs:9200".into(),
            username: None,
            password: None,
            version: "seven-ish".into(),
            ca_file: None,
        };

        let err = cluster.client_settings(&ClientConfig::default()).await.unwrap_err();
        assert!(err.to_string().contains("prod/logs"));
    }
}
