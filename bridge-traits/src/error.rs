use thiserror::Error;

/// Errors reported by pipeline engine implementations.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Engine capability not available: {0}")]
    NotAvailable(String),

    #[error("Engine operation failed: {0}")]
    OperationFailed(String),

    #[error("Unsupported media format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid engine parameter: {0}")]
    InvalidParameter(String),

    #[error("Engine has been released")]
    Released,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
