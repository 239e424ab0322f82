//! Numeric and string constants understood by the CAdES plugin.

/// `CAPICOM_STORE_LOCATION`: the current user's certificate store.
pub const CAPICOM_CURRENT_USER_STORE: i64 = 2;

/// Name of the personal certificate store.
pub const CAPICOM_MY_STORE: &str = "My";

/// `CAPICOM_STORE_OPEN_MODE`: open with the widest access granted.
pub const CAPICOM_STORE_OPEN_MAXIMUM_ALLOWED: i64 = 2;

/// `Certificates.Find` criteria.
pub const CAPICOM_CERTIFICATE_FIND_SHA1_HASH: i64 = 0;
pub const CAPICOM_CERTIFICATE_FIND_SUBJECT_NAME: i64 = 1;

/// CAdES-BES signature type.
pub const CADESCOM_CADES_BES: i64 = 1;

/// Input passed as base64 text, decoded by the plugin before use.
pub const CADESCOM_BASE64_TO_BINARY: i64 = 1;

pub const CADESCOM_HASH_ALGORITHM_SHA_256: i64 = 4;
pub const CADESCOM_HASH_ALGORITHM_CP_GOST_3411: i64 = 100;
pub const CADESCOM_HASH_ALGORITHM_CP_GOST_3411_2012_256: i64 = 101;
pub const CADESCOM_HASH_ALGORITHM_CP_GOST_3411_2012_512: i64 = 102;

/// ProgIDs accepted by `CreateObject`.
pub mod prog_id {
    pub const STORE: &str = "CAdESCOM.Store";
    pub const HASHED_DATA: &str = "CAdESCOM.HashedData";
    pub const CP_SIGNER: &str = "CAdESCOM.CPSigner";
    pub const CADES_SIGNED_DATA: &str = "CAdESCOM.CadesSignedData";
}
