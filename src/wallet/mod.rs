//! Wallet capability contract
//!
//! Every chain adapter plugs into the engine through [`Wallet`]: balances,
//! transfers, fee estimation and intent signing. The engine never constructs
//! chain transactions itself; a wallet is an opaque capability provider for
//! its chain family.

pub mod signer;

use crate::chains::ChainFamily;
use crate::error::BridgeResult;
use crate::intents::{Commitment, Intent};
use crate::token::{Token, TokenId};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Fee estimate for a single transfer
///
/// A pool-internal leg carries a zero estimate denominated on the pool chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeEstimate {
    pub chain: u32,
    pub base_fee: u128,
    pub gas_limit: u128,
    pub gas_price: u128,
    /// Fee denomination; `None` means the chain's gas token
    pub token: Option<TokenId>,
}

impl FeeEstimate {
    pub fn new(chain: u32, base_fee: u128, gas_limit: u128, gas_price: u128) -> Self {
        Self {
            chain,
            base_fee,
            gas_limit,
            gas_price,
            token: None,
        }
    }

    /// Zero-cost estimate for a pool-internal operation
    pub fn pool(chain: u32) -> Self {
        Self::new(chain, 0, 0, 0)
    }

    pub fn total(&self) -> u128 {
        self.base_fee
            .saturating_add(self.gas_limit.saturating_mul(self.gas_price))
    }

    pub fn is_free(&self) -> bool {
        self.total() == 0
    }
}

/// Options for [`Wallet::sign_intents`]
///
/// The nonce must be random 32 bytes and never reused by the same signer; a
/// missing nonce is generated by the signer. A missing deadline falls back to
/// the far-future sentinel, so time-sensitive callers must pass their own.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignOptions {
    pub nonce: Option<[u8; 32]>,
    pub deadline: Option<DateTime<Utc>>,
}

/// Arguments for [`Wallet::transfer`]
#[derive(Debug, Clone)]
pub struct TransferArgs<'a> {
    pub token: &'a Token,
    pub receiver: &'a str,
    pub amount: u128,
    /// Chain-level memo/comment for deposit correlation
    pub memo: Option<&'a str>,
    pub fee_hint: Option<&'a FeeEstimate>,
}

/// Capability contract every chain adapter implements
///
/// Capabilities are invoked only on the wallet owning the relevant chain
/// family; the engine dispatches by [`ChainFamily`].
#[async_trait]
pub trait Wallet: Send + Sync {
    /// Chain-native account address
    fn address(&self) -> &str;

    /// Identity used on the pool ledger when signing intents; may differ
    /// from the chain-native address
    fn pool_identity(&self) -> Option<&str>;

    fn chain_family(&self) -> ChainFamily;

    fn public_key(&self) -> Option<String> {
        None
    }

    /// Fetch an absolute balance in minor units
    ///
    /// Transport failures must surface as `NetworkError`; a zero balance is
    /// a successful result, never an error fallback.
    async fn fetch_balance(&self, chain: u32, address: &str) -> BridgeResult<u128>;

    /// Fetch balances for several tokens at once
    async fn fetch_balances(
        &self,
        tokens: &[TokenId],
    ) -> BridgeResult<HashMap<TokenId, u128>> {
        let mut balances = HashMap::with_capacity(tokens.len());
        for token in tokens {
            let amount = self.fetch_balance(token.chain, &token.address).await?;
            balances.insert(token.clone(), amount);
        }
        Ok(balances)
    }

    /// Estimate the fee for a transfer without side effects
    ///
    /// Adapters without a static fee model return `UnsupportedOperation` and
    /// are expected to fall back to live estimation inside `transfer`.
    async fn transfer_fee(
        &self,
        token: &Token,
        receiver: &str,
        amount: u128,
    ) -> BridgeResult<FeeEstimate>;

    /// Broadcast a transfer and return the chain-native transaction id
    ///
    /// At-most-once from the caller's perspective; the adapter owns
    /// double-broadcast protection for chain-internal retries.
    async fn transfer(&self, args: TransferArgs<'_>) -> BridgeResult<String>;

    /// Sign an ordered intent set into a commitment
    async fn sign_intents(
        &self,
        intents: &[Intent],
        options: SignOptions,
    ) -> BridgeResult<Commitment>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_total_combines_base_and_gas() {
        let fee = FeeEstimate::new(1, 21, 100, 3);
        assert_eq!(fee.total(), 321);
        assert!(!fee.is_free());
        assert!(FeeEstimate::pool(0).is_free());
    }
}
