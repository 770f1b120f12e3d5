use std::io;

use config::ConfigError;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

pub type Result<T, E = JetstreamError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum JetstreamError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid endpoint {url}: {reason}")]
    InvalidEndpoint { url: String, reason: String },

    #[error("TLS setup failed: {0}")]
    Tls(#[from] rustls::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: tungstenite::Error,
    },

    /// The top-level message was not a valid event.
    #[error("Failed to decode event: {0}")]
    Decode(#[source] serde_json::Error),

    /// The event decoded but its record did not match the collection schema.
    #[error("Failed to decode {collection} record: {reason}")]
    Record { collection: String, reason: String },
}

impl JetstreamError {
    /// Per-message failures are absorbed by the read loop; everything else ends the process.
    pub fn is_per_message(&self) -> bool {
        matches!(self, JetstreamError::Decode(_) | JetstreamError::Record { .. })
    }
}
