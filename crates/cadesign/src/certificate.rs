//! # Certificates
//!
//! Enumeration of the signing certificates in a store, lookup of one
//! certificate by thumbprint or subject, and a readable name for display.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

use crate::config::SigningConfig;
use crate::constants::CAPICOM_CERTIFICATE_FIND_SHA1_HASH;
use crate::constants::CAPICOM_CERTIFICATE_FIND_SUBJECT_NAME;
use crate::constants::CAPICOM_STORE_OPEN_MAXIMUM_ALLOWED;
use crate::error::Error;
use crate::error::Result;
use crate::objects::CertificateHandle;
use crate::objects::Plugin;
use crate::objects::Store;

/// A certificate as listed from the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Certificate {
    pub thumbprint: String,
    pub subject_name: String,
}

impl Certificate {
    /// Person or organization name taken from the subject DN.
    pub fn display_name(&self) -> String {
        extract_name_from_dn(&self.subject_name)
    }

    pub fn selector(&self) -> CertificateSelector {
        CertificateSelector::Thumbprint(self.thumbprint.clone())
    }
}

/// How to find the signing certificate in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CertificateSelector {
    /// SHA-1 thumbprint, hex.
    Thumbprint(String),
    /// Substring of the subject name.
    SubjectName(String),
}

impl CertificateSelector {
    /// The `CAPICOM_CERTIFICATE_FIND_*` value for `Certificates.Find`.
    pub fn find_type(&self) -> i64 {
        match self {
            Self::Thumbprint(_) => CAPICOM_CERTIFICATE_FIND_SHA1_HASH,
            Self::SubjectName(_) => CAPICOM_CERTIFICATE_FIND_SUBJECT_NAME,
        }
    }

    pub fn criterion(&self) -> &str {
        match self {
            Self::Thumbprint(s) | Self::SubjectName(s) => s,
        }
    }
}

impl std::fmt::Display for CertificateSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Thumbprint(t) => write!(f, "thumbprint: {}", t),
            Self::SubjectName(s) => write!(f, "subject: {}", s),
        }
    }
}

/// Creates and opens the configured store.
pub async fn open_store(plugin: &Plugin, config: &SigningConfig) -> Result<Store> {
    let store = plugin.store().await?;
    store.open(config.store_location, &config.store_name, CAPICOM_STORE_OPEN_MAXIMUM_ALLOWED).await?;
    debug!(store = %config.store_name, "store opened");
    Ok(store)
}

/// Closes a store, logging instead of failing.
pub async fn close_store(store: &Store) {
    if let Err(e) = store.close().await {
        warn!(error = %e, "failed to close certificate store");
    }
}

/// Finds the first certificate matching `selector` in an open store.
pub async fn locate(store: &Store, selector: &CertificateSelector) -> Result<CertificateHandle> {
    let found = store.certificates().await?.find(selector.find_type(), selector.criterion()).await?;
    let count = found.count().await?;
    if count == 0 {
        return Err(Error::CertificateNotFound(selector.to_string()));
    }
    if count > 1 {
        debug!(count, %selector, "several certificates match, using the first");
    }
    found.item(1).await
}

/// Lists the certificates in the store that have a private key.
///
/// Certificates whose properties cannot be read are skipped. The store is
/// closed whether or not listing succeeds.
pub async fn list_certificates(plugin: &Plugin, config: &SigningConfig) -> Result<Vec<Certificate>> {
    let store = open_store(plugin, config).await?;
    let result = collect_signing_certificates(&store).await;
    close_store(&store).await;
    result
}

async fn collect_signing_certificates(store: &Store) -> Result<Vec<Certificate>> {
    let all = store.certificates().await?;
    let count = all.count().await?;
    let mut certificates = Vec::new();

    for i in 1..=count {
        match read_if_signing(&all.item(i).await?).await {
            Ok(Some(cert)) => certificates.push(cert),
            Ok(None) => {}
            Err(e) => debug!(index = i, error = %e, "skipping unreadable certificate"),
        }
    }

    debug!(total = count, usable = certificates.len(), "listed certificates");
    Ok(certificates)
}

async fn read_if_signing(handle: &CertificateHandle) -> Result<Option<Certificate>> {
    if !handle.has_private_key().await? {
        return Ok(None);
    }
    Ok(Some(Certificate {
        subject_name: handle.subject_name().await?,
        thumbprint: handle.thumbprint().await?,
    }))
}

// ============================================================================
//  SUBJECT NAMES
// ============================================================================

/// `KEY=value` pairs of a DN; quoted values may contain commas and `""`.
#[allow(clippy::unwrap_used)]
static DN_FIELD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"([A-Z]+)=("(?:[^"]|"")*"|[^,]+)"#).unwrap());

/// Extracts a readable name from a subject DN such as `SN=Ivanov, G=Ivan, CN=...`.
///
/// Preference: surname and given name, then CN, then surname alone, then
/// given name alone, then the DN unchanged.
pub fn extract_name_from_dn(dn: &str) -> String {
    let fields = parse_dn(dn);
    let field = |key: &str| fields.get(key).map(String::as_str);

    match (field("SN"), field("G"), field("CN")) {
        (Some(sn), Some(g), _) => format!("{} {}", sn, g).trim().to_string(),
        (_, _, Some(cn)) => cn.to_string(),
        (Some(sn), None, None) => sn.to_string(),
        (None, Some(g), None) => g.to_string(),
        (None, None, None) => dn.to_string(),
    }
}

/// Later fields override earlier ones; values empty after unquoting are dropped.
fn parse_dn(dn: &str) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    for captures in DN_FIELD.captures_iter(dn) {
        let value = unquote(&captures[2]);
        if !value.is_empty() {
            fields.insert(captures[1].to_string(), value);
        }
    }
    fields
}

fn unquote(raw: &str) -> String {
    let value = match raw.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
        Some(inner) => inner.replace("\"\"", "\""),
        // A lone `"` both starts and ends with a quote.
        None if raw == "\"" => String::new(),
        None => raw.to_string(),
    };
    value.trim().to_string()
}
