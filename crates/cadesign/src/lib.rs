//! # cadesign
//!
//! Detached CAdES signing of files through the CryptoPro browser plugin.
//!
//! A file is streamed window by window into the plugin's `HashedData`
//! accumulator, then signed over the hash with a certificate from the user's
//! store. Only the digest ever reaches the signing step, so file size is
//! bounded by neither memory nor the message channel.
//!
//! ```text
//! SigningClient ──> Plugin ──> RemoteObject ──> Bridge ──> Transport
//!      │
//!      ├── ChunkedHasher (ChunkSource -> HashAccumulator)
//!      └── SigningSession (state machine, observers)
//! ```

pub mod algorithm;
pub mod certificate;
pub mod config;
pub mod constants;
pub mod error;
pub mod hasher;
pub mod objects;
pub mod session;
pub mod signer;
pub mod source;

pub use algorithm::DigestAlgorithm;
pub use certificate::Certificate;
pub use certificate::CertificateSelector;
pub use certificate::extract_name_from_dn;
pub use config::SigningConfig;
pub use error::Error;
pub use error::Result;
pub use hasher::ChunkedHasher;
pub use hasher::HashAccumulator;
pub use hasher::Progress;
pub use objects::Plugin;
pub use session::SessionEvent;
pub use session::SessionObserver;
pub use session::SessionState;
pub use session::SigningSession;
pub use signer::DetachedSignature;
pub use signer::SignOutcome;
pub use signer::SigningClient;
pub use signer::Verification;
pub use source::ChunkSource;
pub use source::FileSource;
pub use source::MemorySource;
