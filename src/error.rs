use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to read {}: {source}", path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("GPIO error: {0}")]
    Gpio(#[from] rppal::gpio::Error),

    #[error("malformed payload on {topic}: {source}")]
    Payload {
        topic: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("shadow {operation} request was rejected (code {code}): {message}")]
    ShadowRejected {
        operation: &'static str,
        code: u16,
        message: String,
    },

    #[error("broker rejected subscription (packet {pkid})")]
    SubscribeRejected { pkid: u16 },

    #[error("failed to encode JSON: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    #[error("background task failed: {0}")]
    Task(String),
}

impl Error {
    /// Whether the device should stop after this error. Bad payloads and
    /// failed publishes are logged and skipped.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Payload { .. } | Error::Client(_))
    }
}
