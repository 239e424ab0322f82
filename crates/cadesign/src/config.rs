//! Signing configuration.

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::constants::CAPICOM_CURRENT_USER_STORE;
use crate::constants::CAPICOM_MY_STORE;
use crate::hasher::DEFAULT_WINDOW_SIZE;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Bytes read and hashed per window.
    pub window_size: usize,
    /// Verify the signature against the same hash once it is produced.
    pub verify: bool,
    /// `CAPICOM_STORE_LOCATION` of the certificate store.
    pub store_location: i64,
    pub store_name: String,
    /// Limit for `SignHash` in milliseconds; `None` waits forever. The plugin
    /// may be waiting on a PIN or confirmation prompt during this call.
    pub sign_timeout_ms: Option<u64>,
}

impl SigningConfig {
    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn with_sign_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.sign_timeout_ms = timeout.map(|t| t.as_millis() as u64);
        self
    }

    pub fn sign_timeout(&self) -> Option<Duration> {
        self.sign_timeout_ms.map(Duration::from_millis)
    }

    pub fn with_store(mut self, location: i64, name: impl Into<String>) -> Self {
        self.store_location = location;
        self.store_name = name.into();
        self
    }
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            verify: false,
            store_location: CAPICOM_CURRENT_USER_STORE,
            store_name: CAPICOM_MY_STORE.to_string(),
            sign_timeout_ms: None,
        }
    }
}
