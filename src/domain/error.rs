use thiserror::Error;

/// Errors raised by the bridge core.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("port {0} is outside 1024..=65535")]
    InvalidPort(u32),

    #[error("failed to bind 127.0.0.1:{port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("radio error: {0}")]
    Radio(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type BridgeResult<T> = std::result::Result<T, BridgeError>;
