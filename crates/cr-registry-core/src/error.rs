use thiserror::Error;

/// `Display` text goes straight into the status line.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Ethereum object not found")]
    ProviderUnavailable,
    #[error("wallet connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Contract not initialized")]
    NotConnected,
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    TransactionRejectedOrReverted(String),
    #[error("failed to read students: {0}")]
    ReadFailure(String),
}

impl RegistryError {
    pub(crate) fn rejected(err: anyhow::Error) -> Self {
        Self::TransactionRejectedOrReverted(format!("{err:#}"))
    }
}
