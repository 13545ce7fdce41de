use std::{io, path::PathBuf};

use thiserror::Error;

/// Startup-time failures. These are the only errors allowed to stop the process.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Missing {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed {}: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("no identities found in {}", .0.display())]
    EmptyUserPool(PathBuf),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid archetype {0}")]
    InvalidArchetype(String),
}

/// A request that never produced an HTTP status.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid url {0}")]
    InvalidUrl(String),
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ClientError::Timeout
        } else {
            ClientError::Transport(e.to_string())
        }
    }
}

/// Why a session is still unauthenticated. Never fatal; the scheduler retries later.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("identity has no access token and no shared secret is configured")]
    NoCredentials,
    #[error("login rejected with status {0}")]
    Rejected(u16),
    #[error("login response carried no access_token")]
    MissingToken,
    #[error(transparent)]
    Client(#[from] ClientError),
}
