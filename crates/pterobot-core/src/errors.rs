use std::path::PathBuf;

/// Core error type for the bot.
///
/// Adapter crates map their specific errors into this type so the relay can
/// handle failures consistently (user-facing message vs internal log).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    /// The user has not configured a panel API key. Always user-visible,
    /// never retried.
    #[error("no API key configured")]
    NoCredential,

    /// A panel call failed. `status` is present for HTTP-level failures and
    /// absent for transport-level ones. Reported once, never retried.
    #[error("panel request failed: {message}")]
    Remote {
        status: Option<u16>,
        message: String,
    },

    /// The credential file could not be written. Propagates out of
    /// `set`/`remove` so the caller knows the durable state is unchanged.
    #[error("failed to persist credentials to {path}: {reason}")]
    Persistence { path: PathBuf, reason: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
