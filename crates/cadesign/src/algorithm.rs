//! # Digest Algorithm Selection
//!
//! The digest used for the hash accumulator must match the key family of the
//! signing certificate. The mapping is a fixed table keyed by the OID of the
//! certificate's public key algorithm.
//!
//! ## Invariants
//!
//! - `select` is pure and total: an OID it does not know yields `DEFAULT`.
//! - A certificate whose OID cannot be read also yields `DEFAULT`; the read
//!   failure is logged, never propagated.

use tracing::debug;
use tracing::warn;

use crate::constants::CADESCOM_HASH_ALGORITHM_CP_GOST_3411;
use crate::constants::CADESCOM_HASH_ALGORITHM_CP_GOST_3411_2012_256;
use crate::constants::CADESCOM_HASH_ALGORITHM_CP_GOST_3411_2012_512;
use crate::constants::CADESCOM_HASH_ALGORITHM_SHA_256;
use crate::objects::CertificateHandle;

/// A digest algorithm paired with the key algorithm it serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DigestAlgorithm {
    /// Value for `HashedData.Algorithm`.
    pub id: i64,
    pub name: &'static str,
    pub key_algorithm: &'static str,
}

pub const GOST_2012_256: DigestAlgorithm = DigestAlgorithm {
    id: CADESCOM_HASH_ALGORITHM_CP_GOST_3411_2012_256,
    name: "GOST R 34.11-2012 (256-bit)",
    key_algorithm: "GOST R 34.10-2012 (256-bit)",
};

pub const GOST_2012_512: DigestAlgorithm = DigestAlgorithm {
    id: CADESCOM_HASH_ALGORITHM_CP_GOST_3411_2012_512,
    name: "GOST R 34.11-2012 (512-bit)",
    key_algorithm: "GOST R 34.10-2012 (512-bit)",
};

pub const GOST_94: DigestAlgorithm = DigestAlgorithm {
    id: CADESCOM_HASH_ALGORITHM_CP_GOST_3411,
    name: "GOST R 34.11-94",
    key_algorithm: "GOST R 34.10-2001",
};

pub const SHA_256: DigestAlgorithm = DigestAlgorithm {
    id: CADESCOM_HASH_ALGORITHM_SHA_256,
    name: "SHA-256",
    key_algorithm: "RSA",
};

pub const DEFAULT: DigestAlgorithm = SHA_256;

pub const OID_GOST_2012_256: &str = "1.2.643.7.1.1.1.1";
pub const OID_GOST_2012_512: &str = "1.2.643.7.1.1.1.2";
pub const OID_GOST_2001: &str = "1.2.643.2.2.19";
pub const OID_RSA: &str = "1.2.840.113549.1.1.1";

/// Maps a public key algorithm OID to its digest algorithm.
pub fn select(oid: &str) -> DigestAlgorithm {
    match oid.trim() {
        OID_GOST_2012_256 => GOST_2012_256,
        OID_GOST_2012_512 => GOST_2012_512,
        OID_GOST_2001 => GOST_94,
        OID_RSA => SHA_256,
        _ => DEFAULT,
    }
}

/// Reads `PublicKey().Algorithm.Value` from the certificate and selects.
pub async fn select_for_certificate(certificate: &CertificateHandle) -> DigestAlgorithm {
    match certificate.key_algorithm_oid().await {
        Ok(oid) => {
            let algorithm = select(&oid);
            debug!(oid = %oid, digest = algorithm.name, id = algorithm.id, "selected digest algorithm");
            algorithm
        }
        Err(e) => {
            warn!(error = %e, digest = DEFAULT.name, "could not read key algorithm, using default");
            DEFAULT
        }
    }
}
