//! Quote & review engine
//!
//! Turns a swap request into a frozen [`Review`]: resolves pool addresses,
//! decides routing (direct pool entry/exit vs aggregator), prices fees and
//! captures the quote. Execution of a review lives in [`execute`].

pub mod execute;

use crate::aggregator::{
    AggregatorApi, AppFee, DepositMode, DepositType, QuoteRequest, RecipientType, RefundType,
    SwapType, TokenEntry,
};
use crate::bridge::PoolBridge;
use crate::chains::{ChainFamily, ChainRegistry};
use crate::config::Settings;
use crate::error::{BridgeError, BridgeResult};
use crate::intents::rpc::PoolLedgerApi;
use crate::intents::format_deadline;
use crate::token::{parse_minor, Token, TokenRegistry, NATIVE_ADDRESS};
use crate::wallet::{FeeEstimate, Wallet};

use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Quote direction requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapMode {
    ExactIn,
    ExactOut,
}

/// How a review settles; closed so every consumer matches exhaustively
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Pool entry on a chain with a native pool vault, no aggregator involved
    DirectDeposit,
    /// Pool exit to a chain with a native pool vault
    DirectWithdraw,
    /// Aggregator-settled swap keyed by its deposit address
    Aggregator {
        deposit_address: String,
        deposit_memo: Option<String>,
        quote_id: String,
    },
}

/// Execution state of a review
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapStatus {
    Pending,
    Submitted,
    Settling,
    Success,
    Failed,
}

impl SwapStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SwapStatus::Success | SwapStatus::Failed)
    }
}

impl fmt::Display for SwapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SwapStatus::Pending => "pending",
            SwapStatus::Submitted => "submitted",
            SwapStatus::Settling => "settling",
            SwapStatus::Success => "success",
            SwapStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Frozen quote for one swap/deposit/withdraw
///
/// `from`/`to`/`amount_in`/`route` never change after creation; the execution
/// state machine mutates only `status`, `status_message` and refines
/// `amount_out` from the reported settlement.
#[derive(Debug, Clone)]
pub struct Review {
    pub id: Uuid,
    pub from: Token,
    pub to: Token,
    pub amount_in: u128,
    pub amount_out: u128,
    pub slippage_bps: u32,
    pub receiver: String,
    pub fee: FeeEstimate,
    pub route: Route,
    pub status: SwapStatus,
    pub status_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Review {
    /// Advance along the happy path; transitions never skip a state
    pub(crate) fn advance(&mut self, next: SwapStatus) -> BridgeResult<()> {
        let legal = matches!(
            (self.status, next),
            (SwapStatus::Pending, SwapStatus::Submitted)
                | (SwapStatus::Submitted, SwapStatus::Settling)
                | (SwapStatus::Settling, SwapStatus::Success)
                | (SwapStatus::Settling, SwapStatus::Failed)
        );
        if !legal {
            return Err(BridgeError::InvalidStateTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        debug!("Review {} {} -> {}", self.id, self.status, next);
        self.status = next;
        Ok(())
    }

    /// Abort from any non-terminal state
    pub(crate) fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        debug!("Review {} failed: {}", self.id, message);
        self.status = SwapStatus::Failed;
        self.status_message = Some(message);
    }
}

/// Who funds the swap
#[derive(Clone, Copy)]
pub enum SwapSender<'a> {
    Wallet(&'a dyn Wallet),
    /// Externally funded (e.g. a payment QR); no sender-side fee is priced
    External,
}

impl<'a> SwapSender<'a> {
    fn wallet(&self) -> Option<&'a dyn Wallet> {
        match self {
            SwapSender::Wallet(wallet) => Some(*wallet),
            SwapSender::External => None,
        }
    }
}

/// Input to [`Exchange::review_swap`]
pub struct SwapRequest<'a> {
    pub sender: SwapSender<'a>,
    /// Wallet refunds are routed to on failure
    pub refund: &'a dyn Wallet,
    pub from: &'a Token,
    pub to: &'a Token,
    /// Minor units of `from` (`ExactIn`) or `to` (`ExactOut`)
    pub amount: u128,
    pub receiver: String,
    pub slippage_bps: u32,
    pub mode: SwapMode,
}

/// Cross-chain swap orchestration engine
pub struct Exchange {
    settings: Arc<Settings>,
    chains: ChainRegistry,
    registry: Arc<TokenRegistry>,
    aggregator: Arc<dyn AggregatorApi>,
    bridge: PoolBridge,
}

impl Exchange {
    pub fn new(
        settings: Arc<Settings>,
        registry: Arc<TokenRegistry>,
        aggregator: Arc<dyn AggregatorApi>,
        ledger: Arc<dyn PoolLedgerApi>,
    ) -> Self {
        let chains = registry.chains().clone();
        let bridge = PoolBridge::new(settings.clone(), registry.clone(), ledger);

        Self {
            settings,
            chains,
            registry,
            aggregator,
            bridge,
        }
    }

    pub fn registry(&self) -> &TokenRegistry {
        &self.registry
    }

    pub fn bridge(&self) -> &PoolBridge {
        &self.bridge
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.settings
    }

    pub(crate) fn aggregator(&self) -> &dyn AggregatorApi {
        self.aggregator.as_ref()
    }

    /// Pull the aggregator catalog and merge it into the registry
    ///
    /// Returns the number of newly discovered tokens. Stale rates are
    /// acceptable; callers refresh on their own cadence.
    pub async fn sync_catalog(&self) -> BridgeResult<usize> {
        let entries = self.aggregator.get_tokens().await?;
        let tokens: Vec<Token> = entries
            .into_iter()
            .filter_map(|entry| self.token_from_entry(entry))
            .collect();

        let added = self.registry.merge(tokens);
        info!("Catalog synced, {} tokens added", added);
        Ok(added)
    }

    fn token_from_entry(&self, entry: TokenEntry) -> Option<Token> {
        let Some(chain) = self.chains.chain_for_slug(&entry.blockchain) else {
            debug!("Skipping catalog entry on unknown chain {}", entry.blockchain);
            return None;
        };

        let address = entry
            .contract_address
            .unwrap_or_else(|| NATIVE_ADDRESS.to_string());
        let mut token = Token::new(chain, address, entry.symbol, entry.decimals)
            .with_pool_address(entry.asset_id);
        token.usd_rate = entry.price;
        Some(token)
    }

    /// Produce a frozen review for a swap/deposit/withdraw request
    ///
    /// Validation and routing errors surface here, before any on-chain
    /// action; a returned review has taken no side effects yet.
    pub async fn review_swap(&self, request: SwapRequest<'_>) -> BridgeResult<Review> {
        let from = request.from;
        let to = request.to;

        let pool_from = self
            .registry
            .resolve_pool_address(from.id.chain, &from.id.address)?;
        let pool_to = self
            .registry
            .resolve_pool_address(to.id.chain, to.id.address.as_str())?;

        // A same-asset same-chain request has nothing to route; it must never
        // reach the aggregator fee path.
        if from.id.chain == to.id.chain && pool_from == pool_to {
            return Err(BridgeError::UnsupportedOperation(
                "Same asset on the same chain cannot be swapped".to_string(),
            ));
        }

        // Direct pool entry: depositing an asset into its own pool
        // representation on a pool-native chain.
        if let Some(sender) = request.sender.wallet() {
            if self.chains.is_direct(from.id.chain)
                && self.chains.is_pool(to.id.chain)
                && pool_from == pool_to
            {
                let fee = self
                    .bridge
                    .deposit_fee(sender, from, request.amount)
                    .await?;

                info!(
                    "Review {} -> {}: direct deposit of {}",
                    from.id, to.id, request.amount
                );
                return Ok(self.build_review(
                    &request,
                    request.amount,
                    request.amount,
                    fee,
                    Route::DirectDeposit,
                ));
            }

            if self.chains.is_pool(from.id.chain)
                && self.chains.is_direct(to.id.chain)
                && pool_from == pool_to
            {
                let fee = self.withdraw_fee(&request, &pool_to).await?;
                if fee >= request.amount {
                    return Err(BridgeError::FeeExceedsAmount {
                        fee,
                        amount: request.amount,
                    });
                }

                info!(
                    "Review {} -> {}: direct withdraw of {}",
                    from.id, to.id, request.amount
                );
                return Ok(self.build_review(
                    &request,
                    request.amount,
                    request.amount - fee,
                    FeeEstimate::pool(self.chains.pool_chain()),
                    Route::DirectWithdraw,
                ));
            }
        }

        // Aggregator path. Refunds can only go back to the origin chain when
        // the refund wallet actually lives there; otherwise they target the
        // pool identity.
        let (refund_type, refund_to) =
            if Some(request.refund.chain_family()) != self.chains.family(from.id.chain) {
                let identity = request
                    .refund
                    .pool_identity()
                    .ok_or(BridgeError::RefundNotConfigured)?;
                (RefundType::Intents, identity.to_string())
            } else {
                (RefundType::OriginChain, request.refund.address().to_string())
            };

        let deadline = Utc::now()
            + Duration::seconds(self.settings.aggregator.quote_deadline_secs as i64);
        let suppress_app_fee = from.symbol == to.symbol;
        let app_fees = if suppress_app_fee {
            Vec::new()
        } else {
            vec![AppFee {
                recipient: self.settings.aggregator.app_fee_recipient.clone(),
                fee: self.settings.aggregator.app_fee_bps,
            }]
        };

        let quote_request = QuoteRequest {
            origin_asset: pool_from,
            destination_asset: pool_to,
            amount: request.amount.to_string(),
            slippage_tolerance: request.slippage_bps,
            swap_type: match request.mode {
                SwapMode::ExactIn => SwapType::ExactInput,
                SwapMode::ExactOut => SwapType::ExactOutput,
            },
            deposit_type: if self.chains.is_pool(from.id.chain) {
                DepositType::Intents
            } else {
                DepositType::OriginChain
            },
            deposit_mode: if self.chains.family(from.id.chain) == Some(ChainFamily::Stellar) {
                DepositMode::Memo
            } else {
                DepositMode::Simple
            },
            recipient_type: if self.chains.is_pool(to.id.chain) {
                RecipientType::Intents
            } else {
                RecipientType::DestinationChain
            },
            refund_type,
            refund_to,
            recipient: request.receiver.clone(),
            referral: self.settings.aggregator.referral.clone(),
            app_fees,
            deadline: format_deadline(deadline),
            dry: false,
        };

        let response = self.aggregator.get_quote(&quote_request).await?;
        let quote = response.quote;

        let amount_in = parse_minor(&quote.amount_in)?;
        let amount_out = parse_minor(&quote.amount_out)?;
        let deposit_address = quote.deposit_address.ok_or_else(|| BridgeError::Api {
            status: 200,
            message: "Quote carries no deposit address".to_string(),
        })?;

        // Sender-side transfer fee applies only when the input leaves a
        // native chain; pool-side inputs move by intent.
        let fee = match request.sender.wallet() {
            Some(sender) if !self.chains.is_pool(from.id.chain) => {
                sender.transfer_fee(from, &deposit_address, amount_in).await?
            }
            _ => FeeEstimate::pool(self.chains.pool_chain()),
        };

        info!(
            "Review {} -> {}: aggregator quote {} in, {} out",
            from.id, to.id, amount_in, amount_out
        );
        Ok(self.build_review(
            &request,
            amount_in,
            amount_out,
            fee,
            Route::Aggregator {
                deposit_address,
                deposit_memo: quote.deposit_memo,
                quote_id: quote.quote_id,
            },
        ))
    }

    fn build_review(
        &self,
        request: &SwapRequest<'_>,
        amount_in: u128,
        amount_out: u128,
        fee: FeeEstimate,
        route: Route,
    ) -> Review {
        Review {
            id: Uuid::new_v4(),
            from: request.from.clone(),
            to: request.to.clone(),
            amount_in,
            amount_out,
            slippage_bps: request.slippage_bps,
            receiver: request.receiver.clone(),
            fee,
            route,
            status: SwapStatus::Pending,
            status_message: None,
            created_at: Utc::now(),
        }
    }

    /// Relayer fee for a gasless direct withdrawal, denominated in the
    /// withdrawn asset
    async fn withdraw_fee(&self, request: &SwapRequest<'_>, pool_to: &str) -> BridgeResult<u128> {
        let plan = self
            .bridge
            .plan_withdraw(pool_to, request.to, &request.receiver)
            .await?;
        Ok(plan.fee)
    }
}
