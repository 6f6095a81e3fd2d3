//! Omnipool - cross-chain swap and bridge orchestration over an intents pool
//!
//! The engine reconciles heterogeneous chain semantics behind one uniform
//! lifecycle: resolve tokens against the pool catalog, price a swap into a
//! frozen [`Review`], then drive it through submission and settlement
//! polling to a terminal state. Value moves either through the external swap
//! aggregator or directly between a native chain and the pool ledger.
//!
//! Chain adapters stay outside the engine; they plug in through the
//! [`Wallet`] capability contract.

pub mod aggregator;
pub mod bridge;
pub mod chains;
pub mod config;
pub mod error;
pub mod exchange;
pub mod intents;
pub mod mocks;
pub mod token;
pub mod wallet;

pub use chains::ChainFamily;
pub use config::Settings;
pub use error::{BridgeError, BridgeResult};
pub use exchange::execute::{cancel_pair, CancelHandle, CancelToken, NoProgress, ProgressSink};
pub use exchange::{Exchange, Review, Route, SwapMode, SwapRequest, SwapSender, SwapStatus};
pub use intents::{Commitment, Intent, IntentsBuilder};
pub use token::{Token, TokenId, TokenRegistry};
pub use wallet::{FeeEstimate, SignOptions, TransferArgs, Wallet};

/// Initialize logging for binaries and tests embedding the engine
pub fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,omnipool=debug,hyper=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}
