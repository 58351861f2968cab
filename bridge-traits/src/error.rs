use thiserror::Error;

/// Failures surfaced by host bridge implementations.
///
/// Messages describe the platform failure in host terms and must never
/// contain secret material.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The host has no implementation for this capability (e.g. no
    /// keychain service running).
    #[error("Host capability not available: {0}")]
    NotAvailable(String),

    /// The platform refused the operation, typically a locked or
    /// permission-denied keychain.
    #[error("Host denied access: {0}")]
    AccessDenied(String),

    /// The operation was attempted and failed.
    #[error("Host operation failed: {0}")]
    OperationFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
