//! # Typed Plugin Objects
//!
//! Thin wrappers over `RemoteObject` for the handful of CAdES objects the
//! signing pipeline uses. Each wrapper knows the member names and argument
//! order of its object; everything else goes through the generic proxy.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio_util::sync::CancellationToken;

use nmrun::Bridge;
use nmrun::RemoteObject;
use nmrun::Value;

use crate::constants::prog_id;
use crate::error::Result;
use crate::hasher::HashAccumulator;

/// The root plugin object.
#[derive(Debug, Clone)]
pub struct Plugin(RemoteObject);

impl Plugin {
    /// Initializes the plugin for this page.
    pub async fn connect(bridge: &Bridge) -> Result<Self> {
        Ok(Self(bridge.create_plugin().await?))
    }

    pub fn bridge(&self) -> &Bridge {
        self.0.bridge()
    }

    /// A plugin whose calls, and those of every object it creates, are
    /// cancelled when `token` fires.
    pub fn scoped(&self, token: CancellationToken) -> Self {
        Self(self.0.with_bridge(self.0.bridge().scoped(token)))
    }

    async fn create(&self, prog_id: &str) -> Result<RemoteObject> {
        Ok(self.0.call("CreateObject", vec![prog_id.into()]).await?.into_object()?)
    }

    pub async fn store(&self) -> Result<Store> {
        self.create(prog_id::STORE).await.map(Store)
    }

    pub async fn hashed_data(&self) -> Result<HashedData> {
        self.create(prog_id::HASHED_DATA).await.map(HashedData)
    }

    pub async fn signer(&self) -> Result<Signer> {
        self.create(prog_id::CP_SIGNER).await.map(Signer)
    }

    pub async fn signed_data(&self) -> Result<SignedData> {
        self.create(prog_id::CADES_SIGNED_DATA).await.map(SignedData)
    }
}

/// `CAdESCOM.Store`
#[derive(Debug, Clone)]
pub struct Store(RemoteObject);

impl Store {
    pub async fn open(&self, location: i64, name: &str, mode: i64) -> Result<()> {
        self.0.call("Open", vec![location.into(), name.into(), mode.into()]).await?;
        Ok(())
    }

    pub async fn certificates(&self) -> Result<Certificates> {
        Ok(Certificates(self.0.get("Certificates").await?.into_object()?))
    }

    pub async fn close(&self) -> Result<()> {
        self.0.call("Close", vec![]).await?;
        Ok(())
    }
}

/// A certificate collection; items are numbered from 1.
#[derive(Debug, Clone)]
pub struct Certificates(RemoteObject);

impl Certificates {
    pub async fn count(&self) -> Result<i64> {
        Ok(self.0.get("Count").await?.into_i64()?)
    }

    pub async fn item(&self, index: i64) -> Result<CertificateHandle> {
        Ok(CertificateHandle(self.0.call("Item", vec![index.into()]).await?.into_object()?))
    }

    /// Narrows the collection; `find_type` is one of the `CAPICOM_CERTIFICATE_FIND_*` values.
    pub async fn find(&self, find_type: i64, criterion: &str) -> Result<Certificates> {
        let found = self.0.call("Find", vec![find_type.into(), criterion.into()]).await?;
        Ok(Certificates(found.into_object()?))
    }
}

/// `CAPICOM.Certificate`
#[derive(Debug, Clone)]
pub struct CertificateHandle(RemoteObject);

impl CertificateHandle {
    pub fn object(&self) -> &RemoteObject {
        &self.0
    }

    pub async fn has_private_key(&self) -> Result<bool> {
        Ok(self.0.call("HasPrivateKey", vec![]).await?.into_bool()?)
    }

    pub async fn subject_name(&self) -> Result<String> {
        Ok(self.0.get("SubjectName").await?.into_string()?)
    }

    pub async fn thumbprint(&self) -> Result<String> {
        Ok(self.0.get("Thumbprint").await?.into_string()?)
    }

    /// OID of the public key algorithm, via `PublicKey().Algorithm.Value`.
    pub async fn key_algorithm_oid(&self) -> Result<String> {
        let key = self.0.call("PublicKey", vec![]).await?.into_object()?;
        let algorithm = key.get("Algorithm").await?.into_object()?;
        Ok(algorithm.get("Value").await?.into_string()?)
    }
}

/// `CAdESCOM.HashedData`, the remote incremental hash accumulator.
#[derive(Debug, Clone)]
pub struct HashedData(RemoteObject);

impl HashedData {
    pub fn object(&self) -> &RemoteObject {
        &self.0
    }

    pub async fn set_algorithm(&self, id: i64) -> Result<()> {
        self.0.set("Algorithm", id).await?;
        Ok(())
    }

    pub async fn set_data_encoding(&self, encoding: i64) -> Result<()> {
        self.0.set("DataEncoding", encoding).await?;
        Ok(())
    }

    /// Feeds one piece of data, already in the configured encoding.
    pub async fn hash(&self, data: &str) -> Result<()> {
        self.0.call("Hash", vec![data.into()]).await?;
        Ok(())
    }
}

/// Windows travel base64-encoded; the accumulator must be configured with
/// `DataEncoding = CADESCOM_BASE64_TO_BINARY`.
#[async_trait]
impl HashAccumulator for HashedData {
    async fn update(&mut self, window: &[u8]) -> Result<()> {
        self.hash(&STANDARD.encode(window)).await
    }
}

/// `CAdESCOM.CPSigner`
#[derive(Debug, Clone)]
pub struct Signer(RemoteObject);

impl Signer {
    pub async fn set_certificate(&self, certificate: &CertificateHandle) -> Result<()> {
        self.0.set("Certificate", certificate.object()).await?;
        Ok(())
    }

    pub async fn set_check_certificate(&self, check: bool) -> Result<()> {
        self.0.set("CheckCertificate", check).await?;
        Ok(())
    }
}

/// `CAdESCOM.CadesSignedData`
#[derive(Debug, Clone)]
pub struct SignedData(RemoteObject);

impl SignedData {
    /// Same object, its calls waiting at most `timeout` (`None`: forever).
    pub fn with_timeout(&self, timeout: Option<Duration>) -> Self {
        Self(self.0.with_bridge(self.0.bridge().with_timeout(timeout)))
    }

    pub async fn set_content_encoding(&self, encoding: i64) -> Result<()> {
        self.0.set("ContentEncoding", encoding).await?;
        Ok(())
    }

    /// Signs the accumulated hash, returning the detached signature as base64.
    pub async fn sign_hash(&self, hashed: &HashedData, signer: &Signer, signature_type: i64) -> Result<String> {
        let args = vec![Value::from(hashed.object()), Value::from(&signer.0), signature_type.into()];
        Ok(self.0.call("SignHash", args).await?.into_string()?)
    }

    pub async fn verify_hash(&self, hashed: &HashedData, signature: &str, signature_type: i64) -> Result<()> {
        let args = vec![Value::from(hashed.object()), signature.into(), signature_type.into()];
        self.0.call("VerifyHash", args).await?;
        Ok(())
    }
}
