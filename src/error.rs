// Error taxonomy shared by every pipeline component.
//
// Per-row failures are turned into log lines by the publisher; only
// configuration and authentication errors are expected to end a run.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid settings, credentials or target.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Network failure or non-success HTTP status on any call.
    #[error("{action} failed{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Transport {
        action: String,
        status: Option<u16>,
        message: String,
    },

    /// A record is missing a field the profile requires.
    #[error("invalid record: {0}")]
    Validation(String),

    /// The API refused to issue a session token.
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    pub fn transport(action: impl Into<String>, status: Option<u16>, message: impl Into<String>) -> Self {
        Error::Transport {
            action: action.into(),
            status,
            message: message.into(),
        }
    }

    /// Wrap a reqwest failure, keeping the status code if the error carries one.
    pub fn from_reqwest(action: impl Into<String>, err: reqwest::Error) -> Self {
        let status = err.status().map(|s| s.as_u16());
        Error::transport(action, status, err.to_string())
    }

    /// True when the server rejected the bearer token.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Error::Transport { status: Some(401), .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Transport { status, .. } => *status,
            _ => None,
        }
    }
}
