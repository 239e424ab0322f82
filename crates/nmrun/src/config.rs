//! Bridge configuration.

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

/// Destination used when the extension id is unknown.
pub const DEFAULT_DESTINATION: &str = "nmcades_v3";

/// How long a call may stay unanswered before it fails.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings shared by every call made through one bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Value of the `destination` field on every request.
    pub destination: String,
    /// URL of the hosting page, sent with `init` and `reset`.
    pub page_url: Option<String>,
    /// Per-call timeout in milliseconds; `None` waits forever.
    pub call_timeout_ms: Option<u64>,
}

impl BridgeConfig {
    /// Configuration addressing a specific extension build (`nmcades_<id>`).
    pub fn for_extension(extension_id: &str) -> Self {
        Self { destination: format!("nmcades_{}", extension_id), ..Self::default() }
    }

    pub fn with_page_url(mut self, url: impl Into<String>) -> Self {
        self.page_url = Some(url.into());
        self
    }

    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout_ms = timeout.map(|t| t.as_millis() as u64);
        self
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            destination: DEFAULT_DESTINATION.to_string(),
            page_url: None,
            call_timeout_ms: Some(DEFAULT_CALL_TIMEOUT.as_millis() as u64),
        }
    }
}
