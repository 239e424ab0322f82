use nmrun::bridge;

#[derive(Debug, Clone)]
pub enum Error {
    /// A plugin call failed below the signing layer.
    Bridge(bridge::Error),
    /// A window of the input could not be read.
    FileRead(String),
    /// The store holds no certificate matching the selector.
    CertificateNotFound(String),
    /// The plugin refused to produce the signature.
    SigningFailed(String),
    /// A session was driven through a transition its state machine forbids.
    InvalidState { from: String, to: String },
    /// The signature text is not valid base64.
    InvalidSignature(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bridge(e) => write!(f, "{}", e),
            Self::FileRead(msg) => write!(f, "File read error: {}", msg),
            Self::CertificateNotFound(selector) => write!(f, "Certificate not found ({})", selector),
            Self::SigningFailed(msg) => write!(f, "Signing failed: {}", msg),
            Self::InvalidState { from, to } => write!(f, "Invalid session transition: {} -> {}", from, to),
            Self::InvalidSignature(msg) => write!(f, "Invalid signature encoding: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Bridge(e) => Some(e),
            _ => None,
        }
    }
}

impl From<bridge::Error> for Error {
    fn from(e: bridge::Error) -> Self {
        Self::Bridge(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::FileRead(e.to_string())
    }
}

impl From<base64::DecodeError> for Error {
    fn from(e: base64::DecodeError) -> Self {
        Self::InvalidSignature(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
