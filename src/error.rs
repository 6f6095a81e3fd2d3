//! Error types for the omnipool bridge engine

use thiserror::Error;

/// Main error type for the bridge engine
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unsupported token {address} on chain {chain}")]
    UnsupportedToken { chain: u32, address: String },

    #[error("Ambiguous token match for {address} on chain {chain}")]
    AmbiguousToken { chain: u32, address: String },

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Refund wallet has no pool identity configured")]
    RefundNotConfigured,

    #[error("Withdrawal fee {fee} exceeds requested amount {amount}")]
    FeeExceedsAmount { fee: u128, amount: u128 },

    #[error("Insufficient funds on chain {chain}: have {have}, need {need}")]
    InsufficientFunds { chain: u32, have: u128, need: u128 },

    #[error("Rejected by user")]
    UserRejected,

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Pool ledger RPC error: {0}")]
    Rpc(String),

    #[error("Broadcast failed on chain {chain}: {message}")]
    BroadcastFailed { chain: u32, message: String },

    #[error("Settlement failed: {0}")]
    SettlementFailed(String),

    #[error("Settlement refunded: {0}")]
    SettlementRefunded(String),

    #[error("Duplicate intent publish for signer {signer_id}")]
    DuplicateIntent { signer_id: String },

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Chain {chain_id} not found")]
    ChainNotFound { chain_id: u32 },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BridgeError::Network(_) | BridgeError::Timeout { .. }
        )
    }

    /// Check if error describes a terminal settlement outcome
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BridgeError::SettlementFailed(_)
                | BridgeError::SettlementRefunded(_)
                | BridgeError::UserRejected
        )
    }
}

impl From<reqwest::Error> for BridgeError {
    fn from(err: reqwest::Error) -> Self {
        BridgeError::Network(err.to_string())
    }
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;
