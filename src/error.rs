//! Error taxonomy shared by the service clients and the release store
//!
//! The cycle and daemon layers wrap these in `anyhow::Error` with context;
//! the variants exist so callers can tell an expired session from a network
//! failure or a broken state file.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised at the boundaries of the remote services and the state file
#[derive(Debug, Error)]
pub enum Error {
    /// Bad credentials or an expired session
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// A library fetch was attempted before `authenticate` succeeded
    #[error("Not authenticated with the catalog service")]
    NotAuthenticated,

    /// Network or HTTP failure from one of the remote services
    #[error("{service} request failed: {message}")]
    Remote {
        service: &'static str,
        message: String,
    },

    /// Malformed date or missing required field in a response
    #[error("Failed to parse {what}: {message}")]
    Parse { what: String, message: String },

    /// I/O failure while reading or writing the state file
    #[error("State file {path:?}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result alias for operations that fail with [`Error`]
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn remote(service: &'static str, message: impl ToString) -> Self {
        Error::Remote {
            service,
            message: message.to_string(),
        }
    }

    pub fn parse(what: impl Into<String>, message: impl ToString) -> Self {
        Error::Parse {
            what: what.into(),
            message: message.to_string(),
        }
    }

    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Persistence {
            path: path.into(),
            source,
        }
    }

    /// Whether a failed library fetch earns a fresh login and one more try
    ///
    /// Only a fetch attempted before any login is exempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Error::NotAuthenticated)
    }
}
