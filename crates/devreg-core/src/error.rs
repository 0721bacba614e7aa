//! Error types for the dev registry.
//!
//! The registry distinguishes "nobody is serving the registry" from every
//! other failure. Client operations recover from the former and surface the
//! latter, so classification happens once, here, when a transport error is
//! converted.

use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Main error type for registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The registry refused or reset the connection: it is not running.
    #[error("Registry unavailable at {url}: {reason}")]
    Unavailable { url: String, reason: String },

    /// Binding the registry port failed for a reason other than it being in use.
    #[error("Failed to bind registry on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    // Network errors
    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Registry returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        RegistryError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl RegistryError {
    /// Classify a reqwest failure against the registry at `url`.
    ///
    /// Connection refused/reset anywhere in the source chain means the
    /// registry is absent. Decode failures keep their JSON identity.
    pub fn from_transport(err: reqwest::Error, url: &str) -> Self {
        let io_kind = io_kind_in_chain(&err);
        if signals_absent_registry(io_kind, err.is_connect(), err.is_timeout()) {
            let reason = match io_kind {
                Some(kind) => kind.to_string(),
                None => err.to_string(),
            };
            return RegistryError::Unavailable {
                url: url.to_string(),
                reason,
            };
        }

        if err.is_decode() {
            return RegistryError::Json {
                message: format!("Failed to decode registry response from {}: {}", url, err),
                source: None,
            };
        }

        RegistryError::Transport {
            message: format!("{} ({})", err, url),
        }
    }

    /// True when the error only says the registry is not running.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, RegistryError::Unavailable { .. })
    }
}

/// Refused or reset means nobody listens. A connect failure without an io
/// cause counts too, unless it timed out.
fn signals_absent_registry(
    io_kind: Option<io::ErrorKind>,
    is_connect: bool,
    is_timeout: bool,
) -> bool {
    match io_kind {
        Some(io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset) => true,
        Some(_) => false,
        None => is_connect && !is_timeout,
    }
}

fn io_kind_in_chain(err: &(dyn std::error::Error + 'static)) -> Option<io::ErrorKind> {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            return Some(io_err.kind());
        }
        current = e.source();
    }
    None
}
