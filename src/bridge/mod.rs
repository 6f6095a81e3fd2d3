//! Direct pool entry and exit
//!
//! Chains with a native pool vault move value in and out of the pool ledger
//! without touching the aggregator: deposits are plain transfers into the
//! vault correlated by pool identity, withdrawals are signed `ft_withdraw`
//! intents, optionally bundled with a gas top-up swap when the relayer fee
//! is priced in the chain's gas token.

use crate::chains::{ChainFamily, ChainRegistry};
use crate::config::Settings;
use crate::error::{BridgeError, BridgeResult};
use crate::exchange::execute::CancelToken;
use crate::intents::rpc::{IntentState, PendingDeposit, PoolLedgerApi};
use crate::intents::IntentsBuilder;
use crate::token::{parse_minor, Token, TokenRegistry, NATIVE_ADDRESS};
use crate::wallet::{FeeEstimate, TransferArgs, Wallet};

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// Priced withdrawal, computed before any intent is signed
#[derive(Debug, Clone)]
pub struct WithdrawPlan {
    /// Relayer fee denominated in the withdrawn asset
    pub fee: u128,
    /// Relayer fee in gas-token units
    pub gas_price: u128,
    /// Present when covering the fee needs a same-asset swap into gas
    pub topup: Option<WithdrawTopup>,
}

#[derive(Debug, Clone)]
pub struct WithdrawTopup {
    pub amount_in: u128,
    pub gas_out: u128,
    pub native_asset: String,
    pub quote_hash: String,
}

/// Pool-ledger entry/exit for chains with a native pool contract
pub struct PoolBridge {
    settings: Arc<Settings>,
    chains: ChainRegistry,
    registry: Arc<TokenRegistry>,
    ledger: Arc<dyn PoolLedgerApi>,
}

impl PoolBridge {
    pub fn new(
        settings: Arc<Settings>,
        registry: Arc<TokenRegistry>,
        ledger: Arc<dyn PoolLedgerApi>,
    ) -> Self {
        Self {
            settings,
            chains: registry.chains().clone(),
            registry,
            ledger,
        }
    }

    fn vault(&self, chain: u32) -> BridgeResult<&str> {
        self.chains.pool_vault(chain).ok_or_else(|| {
            BridgeError::UnsupportedOperation(format!("Chain {} has no pool vault", chain))
        })
    }

    /// Fee estimate for depositing `amount` of `token` into the pool vault
    pub async fn deposit_fee(
        &self,
        wallet: &dyn Wallet,
        token: &Token,
        amount: u128,
    ) -> BridgeResult<FeeEstimate> {
        let vault = self.vault(token.id.chain)?;
        wallet.transfer_fee(token, vault, amount).await
    }

    /// Broadcast the vault transfer that starts a deposit
    ///
    /// Single on-chain action: a failure here is fatal for the attempt, the
    /// caller must not retry blindly.
    pub async fn broadcast_deposit(
        &self,
        wallet: &dyn Wallet,
        token: &Token,
        amount: u128,
        receiver: &str,
    ) -> BridgeResult<String> {
        let vault = self.vault(token.id.chain)?;
        debug!(
            "Depositing {} of {} into vault {} for {}",
            amount, token.id, vault, receiver
        );

        wallet
            .transfer(TransferArgs {
                token,
                receiver: vault,
                amount,
                memo: Some(receiver),
                fee_hint: None,
            })
            .await
    }

    /// Wait until the pool ledger observes the deposit transaction
    ///
    /// Returns `None` when cancelled; cancellation stops observation only,
    /// the deposit may still settle asynchronously.
    pub async fn await_deposit(
        &self,
        chain: u32,
        tx_hash: &str,
        receiver: &str,
        mut cancel: CancelToken,
    ) -> BridgeResult<Option<PendingDeposit>> {
        let interval = Duration::from_millis(self.settings.execution.poll_interval_ms);

        for attempt in 0..self.settings.execution.deposit_wait_attempts {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Deposit wait cancelled for tx {}", tx_hash);
                    return Ok(None);
                }
                _ = sleep(interval) => {}
            }

            match self
                .ledger
                .find_pending_deposit(chain, tx_hash, receiver)
                .await
            {
                Ok(Some(deposit)) => return Ok(Some(deposit)),
                Ok(None) => {}
                Err(e) if e.is_retryable() => {
                    warn!(
                        "Deposit lookup failed (attempt {}): {}",
                        attempt + 1,
                        e
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(BridgeError::Timeout {
            operation: format!("pending deposit {}", tx_hash),
        })
    }

    /// Credit an observed deposit to the pool ledger
    pub async fn finalize_deposit(&self, deposit: &PendingDeposit) -> BridgeResult<()> {
        self.ledger.finalize_deposit(deposit).await
    }

    /// Price a gasless withdrawal of `token` to `receiver`
    pub async fn plan_withdraw(
        &self,
        pool_asset: &str,
        token: &Token,
        receiver: &str,
    ) -> BridgeResult<WithdrawPlan> {
        // NEAR-family exits settle on the pool's home chain without a relayer
        if self.chains.family(token.id.chain) == Some(ChainFamily::Near) {
            return Ok(WithdrawPlan {
                fee: 0,
                gas_price: 0,
                topup: None,
            });
        }

        let quote = self
            .ledger
            .gasless_withdraw_fee(token.id.chain, &token.id.address, receiver)
            .await?;
        let gas_price = quote.gas_price_units()?;

        if gas_price == 0 {
            return Ok(WithdrawPlan {
                fee: 0,
                gas_price: 0,
                topup: None,
            });
        }

        if token.is_native() {
            // Fee is already denominated in the withdrawn asset
            return Ok(WithdrawPlan {
                fee: gas_price,
                gas_price,
                topup: None,
            });
        }

        let native_asset = self
            .registry
            .resolve_pool_address(token.id.chain, NATIVE_ADDRESS)?;
        let topup = self
            .ledger
            .quote_exact_out(pool_asset, &native_asset, gas_price, receiver)
            .await?;
        let amount_in = parse_minor(&topup.amount_in)?;

        Ok(WithdrawPlan {
            fee: amount_in,
            gas_price,
            topup: Some(WithdrawTopup {
                amount_in,
                gas_out: gas_price,
                native_asset,
                quote_hash: topup.quote_hash,
            }),
        })
    }

    /// Sign and publish the intents for a gasless withdrawal
    ///
    /// Returns the published intent hash for settlement polling.
    pub async fn withdraw(
        &self,
        wallet: &dyn Wallet,
        token: &Token,
        amount: u128,
        receiver: &str,
    ) -> BridgeResult<String> {
        let account = wallet.pool_identity().ok_or_else(|| {
            BridgeError::UnsupportedOperation(
                "Wallet has no pool identity to withdraw from".to_string(),
            )
        })?;

        let pool_asset = self
            .registry
            .resolve_pool_address(token.id.chain, &token.id.address)?;
        let plan = self.plan_withdraw(&pool_asset, token, receiver).await?;

        if plan.fee >= amount {
            return Err(BridgeError::FeeExceedsAmount {
                fee: plan.fee,
                amount,
            });
        }

        let deadline =
            Utc::now() + ChronoDuration::seconds(self.settings.aggregator.quote_deadline_secs as i64);
        let mut builder = IntentsBuilder::new().with_deadline(deadline);
        let mut quote_hashes = Vec::new();

        if let Some(topup) = plan.topup {
            builder = builder.token_diff(
                (pool_asset.as_str(), topup.amount_in),
                (topup.native_asset.as_str(), topup.gas_out),
            );
            quote_hashes.push(topup.quote_hash);
        }

        // Non-NEAR destinations are encoded in the withdrawal memo; the token
        // contract is the pool asset without its standard prefix.
        let memo = if self.chains.family(token.id.chain) == Some(ChainFamily::Near) {
            None
        } else {
            Some(format!("WITHDRAW_TO:{}", receiver))
        };
        let receiver_id = if memo.is_some() {
            self.vault(token.id.chain).unwrap_or(receiver).to_string()
        } else {
            receiver.to_string()
        };

        builder = builder.ft_withdraw(
            contract_of(&pool_asset),
            &receiver_id,
            amount - plan.fee,
            memo,
        );

        info!(
            "Withdrawing {} of {} to {} (fee {})",
            amount, pool_asset, receiver, plan.fee
        );

        let result = builder
            .with_quote_hashes(quote_hashes)
            .execute(wallet, self.ledger.as_ref())
            .await?;

        let hash = result
            .intent_hash()
            .map(String::from)
            .ok_or_else(|| BridgeError::Rpc("Publish returned no intent hash".to_string()))?;
        debug!("Withdrawal published as intent {}", hash);
        Ok(hash)
    }

    /// Wait until pool balances for `account` cover every entry in `needs`
    ///
    /// Bounded by the deposit wait budget; returns `false` when cancelled.
    pub async fn wait_for_balance(
        &self,
        needs: &std::collections::HashMap<String, u128>,
        account: &str,
        mut cancel: CancelToken,
    ) -> BridgeResult<bool> {
        let assets: Vec<String> = needs.keys().cloned().collect();
        let interval = Duration::from_millis(self.settings.execution.poll_interval_ms);

        for _ in 0..self.settings.execution.deposit_wait_attempts {
            let balances = self.ledger.get_intents_balances(&assets, account).await?;
            let covered = needs
                .iter()
                .all(|(asset, need)| balances.get(asset).copied().unwrap_or(0) >= *need);
            if covered {
                return Ok(true);
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Balance wait cancelled for {}", account);
                    return Ok(false);
                }
                _ = sleep(interval) => {}
            }
        }

        Err(BridgeError::Timeout {
            operation: format!("pool balance for {}", account),
        })
    }

    /// Poll a published intent until it reaches a terminal state
    ///
    /// Returns `None` when cancelled.
    pub async fn await_intent(
        &self,
        intent_hash: &str,
        mut cancel: CancelToken,
    ) -> BridgeResult<Option<IntentState>> {
        let interval = Duration::from_millis(self.settings.execution.poll_interval_ms);
        let max_retries = self.settings.execution.max_poll_retries;
        let mut failures = 0u32;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Intent wait cancelled for {}", intent_hash);
                    return Ok(None);
                }
                _ = sleep(interval) => {}
            }

            match self.ledger.get_status(intent_hash).await {
                Ok(status) => {
                    failures = 0;
                    if status.status.is_terminal() {
                        return Ok(Some(status.status));
                    }
                    debug!("Intent {} still {:?}", intent_hash, status.status);
                }
                Err(e) if e.is_retryable() && failures < max_retries => {
                    failures += 1;
                    warn!(
                        "Intent status poll failed (attempt {}/{}): {}",
                        failures, max_retries, e
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Contract account of a standard-prefixed pool asset id
fn contract_of(pool_asset: &str) -> &str {
    pool_asset
        .split_once(':')
        .map(|(_, contract)| contract)
        .unwrap_or(pool_asset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_strips_the_standard_prefix() {
        assert_eq!(contract_of("nep141:usdt.tether-token.near"), "usdt.tether-token.near");
        assert_eq!(contract_of("usdt.tether-token.near"), "usdt.tether-token.near");
    }
}
