//! # Transport Abstraction
//!
//! A minimal, async interface for moving bytes between the page and the plugin.
//!
//! ## Philosophy
//!
//! - **Byte-Oriented**: The Transport knows nothing about frames or values.
//!   It moves opaque buffers.
//! - **One-Way**: There is no "send and await reply" here. The channel is a
//!   broadcast: anything posted can be seen by every listener on the page, and
//!   correlation is done above this layer by request id.
//! - **Origin-Tagged**: Each delivery says whether it came from our own page or
//!   from somewhere else, so foreign traffic can be filtered before correlation.

use std::fmt;

/// Errors that occur at the channel layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The plugin or extension is unreachable or the channel was dropped.
    ConnectionLost(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionLost(msg) => write!(f, "Connection lost: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Where an inbound message was posted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Posted on our own page (by us, or by the extension's content script).
    Page,
    /// Posted by some other window or frame.
    Foreign,
}

/// One inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub origin: Origin,
    pub payload: Vec<u8>,
}

impl Delivery {
    pub fn page(payload: impl Into<Vec<u8>>) -> Self {
        Self { origin: Origin::Page, payload: payload.into() }
    }

    pub fn foreign(payload: impl Into<Vec<u8>>) -> Self {
        Self { origin: Origin::Foreign, payload: payload.into() }
    }
}

/// A one-way message channel.
///
/// This trait is designed to be object-safe (`Arc<dyn Transport>`).
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Posts a payload on the channel.
    ///
    /// # invariants
    /// - Must not wait for any reply.
    /// - Must return `Err` if the channel is gone.
    async fn send(&self, payload: &[u8]) -> Result<()>;

    /// Waits for the next inbound message.
    ///
    /// Returns `Ok(None)` once the channel is closed for good.
    async fn recv(&self) -> Result<Option<Delivery>>;
}
