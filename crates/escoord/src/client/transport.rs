//! 📡 The HTTP plumbing under every client: one pooled `reqwest::Client` per cluster identity,
//! trust pinned to the supplied CAs, Basic auth when there is something to authenticate with.
//!
//! `BaseClient` is where the codec lives. Every endpoint, whatever its version, goes through
//! [`BaseClient::request`]: encode, send, classify the status, decode. Non-2xx answers never
//! reach the caller as a `Response`, they become [`ApiError`]s right here.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use super::error::{ApiError, EsError, EsResult};
use super::identity::{ClientIdentity, TrustSet};

/// Ad-hoc calls outside the observer give up after this long.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(3 * 60);

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// 🔌 Decides where TCP connections to a host actually go.
///
/// Plugged in as the DNS resolver of the underlying HTTP client: whatever addresses come back
/// are dialed instead of the ones the platform resolver would have picked. Two limits follow
/// from that:
///
/// - ⚠️ Only the address counts. The port in the endpoint URL always replaces the port of a
///   returned address, so a dialer can move a connection to another host but never to
///   another port.
/// - An endpoint whose host is an IP literal is never resolved, so a dialer would never be
///   asked. Building a client with both is refused with [`EsError::InvalidSettings`].
#[async_trait]
pub trait Dialer: Send + Sync + fmt::Debug {
    async fn resolve(&self, host: &str) -> std::io::Result<Vec<SocketAddr>>;
}

/// Sends every host to one fixed address (the port still comes from the URL). Handy behind a
/// tunnel, or in a test.
#[derive(Debug, Clone, Copy)]
pub struct StaticDialer(pub SocketAddr);

#[async_trait]
impl Dialer for StaticDialer {
    async fn resolve(&self, host: &str) -> std::io::Result<Vec<SocketAddr>> {
        trace!("🔌 dialing {} for host '{}'", self.0, host);
        Ok(vec![self.0])
    }
}

/// 🚫 A dialer only ever sees host names. Refuse endpoints it could never intercept.
pub(crate) fn ensure_dialable(endpoint: &str) -> EsResult<()> {
    let url = reqwest::Url::parse(endpoint).map_err(|err| {
        EsError::InvalidSettings(format!("endpoint '{endpoint}' is not a URL: {err}"))
    })?;
    let host = url.host_str().unwrap_or_default();
    if host.trim_start_matches('[').trim_end_matches(']').parse::<IpAddr>().is_ok() {
        return Err(EsError::InvalidSettings(format!(
            "endpoint '{endpoint}' is an IP address, so a dialer would never be consulted. \
             Use a host name, or drop the dialer."
        )));
    }
    Ok(())
}

struct DialerResolver(Arc<dyn Dialer>);

impl Resolve for DialerResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let dialer = Arc::clone(&self.0);
        Box::pin(async move {
            let addrs = dialer.resolve(name.as_str()).await?;
            Ok(Box::new(addrs.into_iter()) as Addrs)
        })
    }
}

/// The immutable, shareable HTTP side of a client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    /// 🔒 Build a transport that trusts exactly `trust_set`. Built-in and platform roots are
    /// both switched off, so an empty trust set means no HTTPS endpoint will ever verify.
    pub fn new(
        trust_set: &TrustSet,
        dialer: Option<Arc<dyn Dialer>>,
        request_timeout: Duration,
    ) -> EsResult<Self> {
        let roots = trust_set
            .certificates()
            .iter()
            .map(|ca| reqwest::Certificate::from_der(ca.der()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(EsError::Transport)?;
        let mut builder = reqwest::Client::builder()
            .timeout(request_timeout)
            .tls_certs_only(roots);
        if let Some(dialer) = dialer {
            builder = builder.dns_resolver(Arc::new(DialerResolver(dialer)));
        }
        let http = builder.build().map_err(EsError::Transport)?;
        Ok(Self { http })
    }
}

/// 🧱 Identity plus transport. The shared base every versioned client delegates to.
#[derive(Debug, Clone)]
pub struct BaseClient {
    identity: ClientIdentity,
    transport: HttpTransport,
}

impl BaseClient {
    pub fn new(identity: ClientIdentity, transport: HttpTransport) -> Self {
        Self { identity, transport }
    }

    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    pub fn endpoint(&self) -> &str {
        &self.identity.endpoint
    }

    /// The error for an operation this client's major version does not have.
    pub fn unsupported(&self, operation: &'static str) -> EsError {
        EsError::Unsupported {
            operation,
            version: self.identity.version_label(),
        }
    }

    /// Send one request. `path` carries its own query string and is appended to the endpoint
    /// as-is. Any status outside 2xx comes back as [`EsError::Api`] with the body consumed.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> EsResult<reqwest::Response> {
        let url = format!("{}{}", self.identity.endpoint, path);
        debug!("📡 {} {}", method, url);

        let mut request = self
            .transport
            .http
            .request(method, &url)
            .header(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
        let credentials = &self.identity.credentials;
        if !credentials.is_empty() {
            request = request.basic_auth(&credentials.username, Some(&credentials.password));
        }
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await.map_err(EsError::Transport)?;
        let status = response.status();
        trace!("📬 {} answered {}", url, status);
        if !status.is_success() {
            return Err(ApiError::from_response(response).await.into());
        }
        Ok(response)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> EsResult<T> {
        let response = self.request(Method::GET, path, None).await?;
        decode_json(response).await
    }

    pub async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> EsResult<()> {
        let response = self.request(Method::PUT, path, Some(encode_json(body)?)).await?;
        drain(response).await
    }

    pub async fn put_empty(&self, path: &str) -> EsResult<()> {
        let response = self.request(Method::PUT, path, None).await?;
        drain(response).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> EsResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.request(Method::POST, path, Some(encode_json(body)?)).await?;
        decode_json(response).await
    }

    /// POST without a body, decoding the answer.
    pub async fn post_for<T: DeserializeOwned>(&self, path: &str) -> EsResult<T> {
        let response = self.request(Method::POST, path, None).await?;
        decode_json(response).await
    }

    /// POST without a body, ignoring whatever comes back.
    pub async fn post_empty(&self, path: &str) -> EsResult<()> {
        let response = self.request(Method::POST, path, None).await?;
        drain(response).await
    }

    pub async fn delete(&self, path: &str) -> EsResult<()> {
        let response = self.request(Method::DELETE, path, None).await?;
        drain(response).await
    }
}

fn encode_json<B: Serialize + ?Sized>(body: &B) -> EsResult<Vec<u8>> {
    serde_json::to_vec(body).map_err(EsError::Encoding)
}

async fn decode_json<T: DeserializeOwned>(response: reqwest::Response) -> EsResult<T> {
    let status: StatusCode = response.status();
    let bytes = response.bytes().await.map_err(EsError::Transport)?;
    serde_json::from_slice(&bytes).map_err(|source| EsError::Decoding { status, source })
}

// -- read to the end so the connection goes back to the pool
async fn drain(response: reqwest::Response) -> EsResult<()> {
    response.bytes().await.map_err(EsError::Transport)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_only_host_names_are_dialable() {
        assert!(ensure_dialable("http://es-http.default.svc:9200").is_ok());
        assert!(ensure_dialable("https://localhost:9200").is_ok());

        for endpoint in ["http://192.168.1.20:9200", "https://[fe80::1]:9200", "not even a url"] {
            let err = ensure_dialable(endpoint).expect_err("💀 this endpoint should not be dialable");
            assert!(matches!(err, EsError::InvalidSettings(_)), "{endpoint}: {err:?}");
            assert!(err.to_string().contains(endpoint), "the message should name the endpoint");
        }
    }
}
