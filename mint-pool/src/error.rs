use thiserror::Error;

use crate::wallet::WalletAddress;

#[derive(Error, Debug)]
pub enum MintPoolError {
    #[error("Mint Pool Validation Error: {0}")]
    PoolValidationError(String),
    #[error("Invalid wallet address: {0}")]
    InvalidWalletAddress(String),
    #[error("Mint link {0} not found")]
    LinkNotFound(String),
    #[error("Mint link {0} is already claimed")]
    LinkAlreadyClaimed(String),
    #[error("Wallet {0} already holds mint link {1}")]
    WalletAlreadyAssigned(WalletAddress, String),
    #[error("Persisted pool changed since it was last read")]
    StoreConflict,
    #[error("Could not commit claim for {0} after {1} attempts")]
    CommitConflict(WalletAddress, usize),
    #[error("io Error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serde Error: {0}")]
    SerdeError(#[from] serde_json::Error),
    #[error("Csv Error: {0}")]
    CsvError(#[from] csv::Error),
}
