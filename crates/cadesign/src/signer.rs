//! # Signing Client
//!
//! Drives a file from certificate lookup to detached signature:
//!
//! 1. Preflight: open the store, locate the certificate, derive the digest
//!    algorithm from its key, close the store. A missing certificate fails
//!    here, before any data is read.
//! 2. Create a `HashedData` with that algorithm and stream the file through it.
//! 3. Open the store again, locate the certificate, build a `CPSigner` and a
//!    `CadesSignedData`, call `SignHash`, close the store.
//! 4. Optionally verify the signature against the same hash.
//!
//! Every step awaits the previous plugin call. The store is closed on every
//! path out of steps 1 and 3; a failure to close is logged.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::warn;

use nmrun::Bridge;
use nmrun::bridge;

use crate::algorithm::DigestAlgorithm;
use crate::algorithm::select_for_certificate;
use crate::certificate::Certificate;
use crate::certificate::CertificateSelector;
use crate::certificate::close_store;
use crate::certificate::list_certificates;
use crate::certificate::locate;
use crate::certificate::open_store;
use crate::config::SigningConfig;
use crate::constants::CADESCOM_BASE64_TO_BINARY;
use crate::constants::CADESCOM_CADES_BES;
use crate::error::Error;
use crate::error::Result;
use crate::hasher::ChunkedHasher;
use crate::objects::HashedData;
use crate::objects::Plugin;
use crate::objects::Store;
use crate::session::SessionObserver;
use crate::session::SessionState;
use crate::session::SigningSession;
use crate::source::ChunkSource;

/// MIME type of a detached CMS signature file.
pub const SIGNATURE_MIME_TYPE: &str = "application/pkcs7-signature";

/// Extension given to signature files.
pub const SIGNATURE_EXTENSION: &str = "sig";

/// A detached CAdES-BES signature, as base64 text from the plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedSignature(String);

impl DetachedSignature {
    pub fn new(base64: impl Into<String>) -> Self {
        Self(base64.into())
    }

    pub fn as_base64(&self) -> &str {
        &self.0
    }

    /// The DER-encoded PKCS#7 structure. Line breaks in the text are ignored.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let compact: String = self.0.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        Ok(STANDARD.decode(compact)?)
    }

    /// Name for the signature file of `file_name`: its last extension replaced by `.sig`.
    pub fn file_name_for(file_name: &str) -> String {
        format!("{}.{}", strip_extension(file_name), SIGNATURE_EXTENSION)
    }

    pub fn mime_type(&self) -> &'static str {
        SIGNATURE_MIME_TYPE
    }
}

impl std::fmt::Display for DetachedSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(dot) if dot > 0 && dot + 1 < name.len() && !name[dot + 1..].contains('/') => &name[..dot],
        _ => name,
    }
}

/// Result of the optional verification step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Skipped,
    Passed,
    /// Verification failed; the signature is still returned.
    Failed(String),
}

/// Everything a successful run produces.
#[derive(Debug, Clone)]
pub struct SignOutcome {
    pub signature: DetachedSignature,
    pub algorithm: DigestAlgorithm,
    pub verification: Verification,
}

/// Signs files through one plugin instance.
#[derive(Debug, Clone)]
pub struct SigningClient {
    plugin: Plugin,
    config: SigningConfig,
}

impl SigningClient {
    pub fn new(plugin: Plugin, config: SigningConfig) -> Self {
        Self { plugin, config }
    }

    /// Initializes the plugin over `bridge` and wraps it.
    pub async fn connect(bridge: &Bridge, config: SigningConfig) -> Result<Self> {
        Ok(Self::new(Plugin::connect(bridge).await?, config))
    }

    pub fn config(&self) -> &SigningConfig {
        &self.config
    }

    pub fn plugin(&self) -> &Plugin {
        &self.plugin
    }

    /// A client whose plugin calls all fail with `Cancelled` once `token` fires.
    pub fn scoped(&self, token: CancellationToken) -> Self {
        Self { plugin: self.plugin.scoped(token), config: self.config.clone() }
    }

    /// Certificates with a private key in the configured store.
    pub async fn list_certificates(&self) -> Result<Vec<Certificate>> {
        list_certificates(&self.plugin, &self.config).await
    }

    /// Starts a session for `len` bytes with the configured window size.
    pub fn session(&self, selector: CertificateSelector, len: u64) -> SigningSession {
        SigningSession::new(selector, self.config.window_size, len)
    }

    /// Signs `source` with the selected certificate.
    pub async fn sign<S>(&self, source: &mut S, selector: &CertificateSelector) -> Result<SignOutcome>
    where
        S: ChunkSource + ?Sized,
    {
        let mut session = self.session(selector.clone(), source.len());
        self.run(&mut session, source).await
    }

    /// Like `sign`, reporting every state change and progress event to `observer`.
    pub async fn sign_observed<S>(
        &self,
        source: &mut S,
        selector: &CertificateSelector,
        observer: Arc<dyn SessionObserver>,
    ) -> Result<SignOutcome>
    where
        S: ChunkSource + ?Sized,
    {
        let mut session = self.session(selector.clone(), source.len());
        session.observe(observer);
        self.run(&mut session, source).await
    }

    /// Runs a prepared session to a terminal state.
    ///
    /// The session must be `Idle`; a session that already ran is rejected
    /// before any plugin call.
    pub async fn run<S>(&self, session: &mut SigningSession, source: &mut S) -> Result<SignOutcome>
    where
        S: ChunkSource + ?Sized,
    {
        if !matches!(session.state(), SessionState::Idle) {
            let next = SessionState::first(session.total_windows());
            return Err(Error::InvalidState { from: session.state().to_string(), to: next.to_string() });
        }
        match self.drive(session, source).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => Err(session.fail(e)),
        }
    }

    async fn drive<S>(&self, session: &mut SigningSession, source: &mut S) -> Result<SignOutcome>
    where
        S: ChunkSource + ?Sized,
    {
        let selector = session.selector().clone();
        info!(%selector, len = source.len(), windows = session.total_windows(), "signing started");

        let algorithm = self.preflight(&selector).await?;
        session.set_algorithm(algorithm);

        let mut hashed = self.plugin.hashed_data().await?;
        hashed.set_algorithm(algorithm.id).await?;
        hashed.set_data_encoding(CADESCOM_BASE64_TO_BINARY).await?;

        let hasher = ChunkedHasher::new(session.window_size());
        hasher.run(source, &mut hashed, |event| session.on_hash_event(event)).await?;

        session.transition(SessionState::Signing)?;
        let signature = self.sign_hash(&selector, &hashed).await?;
        session.transition(SessionState::Signed)?;

        let verification = if self.config.verify {
            session.transition(SessionState::Verifying)?;
            self.verify(&hashed, &signature).await
        } else {
            Verification::Skipped
        };

        session.transition(SessionState::Done)?;
        info!(%selector, digest = algorithm.name, "signing finished");
        Ok(SignOutcome { signature, algorithm, verification })
    }

    /// Checks that the certificate exists and picks the digest for its key.
    async fn preflight(&self, selector: &CertificateSelector) -> Result<DigestAlgorithm> {
        let store = open_store(&self.plugin, &self.config).await?;
        let result = async {
            let certificate = locate(&store, selector).await?;
            Ok::<_, Error>(select_for_certificate(&certificate).await)
        }
        .await;
        close_store(&store).await;
        result
    }

    async fn sign_hash(&self, selector: &CertificateSelector, hashed: &HashedData) -> Result<DetachedSignature> {
        let store = open_store(&self.plugin, &self.config).await?;
        let result = self.sign_in_store(&store, selector, hashed).await;
        close_store(&store).await;
        result
    }

    async fn sign_in_store(&self, store: &Store, selector: &CertificateSelector, hashed: &HashedData) -> Result<DetachedSignature> {
        let certificate = locate(store, selector).await?;

        let signer = self.plugin.signer().await?;
        signer.set_certificate(&certificate).await?;
        signer.set_check_certificate(true).await?;

        let signed_data = self.plugin.signed_data().await?;
        signed_data.set_content_encoding(CADESCOM_BASE64_TO_BINARY).await?;

        let signed_data = signed_data.with_timeout(self.config.sign_timeout());
        match signed_data.sign_hash(hashed, &signer, CADESCOM_CADES_BES).await {
            Ok(signature) => Ok(DetachedSignature::new(signature)),
            Err(Error::Bridge(bridge::Error::Remote(failure))) => Err(Error::SigningFailed(failure.message)),
            Err(e) => Err(e),
        }
    }

    async fn verify(&self, hashed: &HashedData, signature: &DetachedSignature) -> Verification {
        let result = async {
            let signed_data = self.plugin.signed_data().await?;
            signed_data.verify_hash(hashed, signature.as_base64(), CADESCOM_CADES_BES).await
        }
        .await;
        match result {
            Ok(()) => Verification::Passed,
            Err(e) => {
                warn!(error = %e, "signature verification failed");
                Verification::Failed(e.to_string())
            }
        }
    }
}
