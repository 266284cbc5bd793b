//! 🪪 Who a client is: endpoint, credentials, trust set, major version.
//!
//! Two clients with the same identity are interchangeable, which is what lets the
//! observer manager keep an existing observer instead of tearing it down on every
//! reconcile. The dialer is plumbing, not identity, so it never shows up here.

use std::fmt;
use std::io::BufReader;

use anyhow::{Context, Result};
use semver::Version;

/// 🔒 HTTP Basic credentials. Both empty means anonymous.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.username.is_empty() && self.password.is_empty()
    }
}

// -- the password stays out of logs. it has been through enough.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &if self.password.is_empty() { "" } else { "<redacted>" })
            .finish()
    }
}

/// 📜 One trusted CA certificate, DER-encoded. Equality is byte equality of the DER.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CaCertificate {
    der: Vec<u8>,
}

impl CaCertificate {
    pub fn from_der(der: impl Into<Vec<u8>>) -> Self {
        Self { der: der.into() }
    }

    /// Every `CERTIFICATE` block in a PEM bundle, in file order. Other PEM items are skipped.
    pub fn from_pem(pem: &[u8]) -> Result<Vec<Self>> {
        let mut reader = BufReader::new(pem);
        let certs = rustls_pemfile::certs(&mut reader)
            .map(|cert| cert.map(|der| Self::from_der(der.as_ref())))
            .collect::<std::io::Result<Vec<_>>>()
            .context("💀 Failed to read the PEM bundle. Some block in there is not a certificate in good standing.")?;
        Ok(certs)
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }
}

impl fmt::Debug for CaCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CaCertificate({} bytes)", self.der.len())
    }
}

/// The ordered set of CAs a client trusts. Nothing else is trusted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustSet(pub Vec<CaCertificate>);

impl TrustSet {
    /// Load a PEM bundle from disk.
    pub async fn from_pem_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let pem = tokio::fs::read(path)
            .await
            .with_context(|| format!("💀 Could not read CA bundle at '{}'", path.display()))?;
        Ok(Self(CaCertificate::from_pem(&pem)?))
    }

    pub fn certificates(&self) -> &[CaCertificate] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<CaCertificate> for TrustSet {
    fn from_iter<I: IntoIterator<Item = CaCertificate>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// 🪪 The identity tuple. Versions compare by major only.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    pub endpoint: String,
    pub credentials: Credentials,
    pub trust_set: TrustSet,
    pub version: Version,
}

impl ClientIdentity {
    /// `"6.x"` or `"7.x"`, the label used in unsupported-operation errors.
    pub fn version_label(&self) -> &'static str {
        if self.version.major == 7 { "7.x" } else { "6.x" }
    }
}

impl PartialEq for ClientIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.endpoint == other.endpoint
            && self.credentials == other.credentials
            && self.trust_set == other.trust_set
            && self.version.major == other.version.major
    }
}

impl Eq for ClientIdentity {}
