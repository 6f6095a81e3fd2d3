//! Execution state machine
//!
//! Drives a frozen [`Review`] through submission, on-chain wait and status
//! polling to a terminal state. One logical flow per review, no internal
//! parallelism; concurrent reviews share nothing but the token registry.
//! Once a review is past `Submitted` the underlying action may already have
//! taken effect, so errors surface through `status`/`status_message` instead
//! of being thrown.

use crate::aggregator::ExecutionStatus;
use crate::error::BridgeResult;
use crate::exchange::{Exchange, Review, Route, SwapStatus};
use crate::intents::rpc::IntentState;
use crate::token::parse_minor;
use crate::wallet::{TransferArgs, Wallet};

use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Caller-supplied sink for human-readable progress messages
pub trait ProgressSink: Send + Sync {
    fn log(&self, message: &str);
}

/// Discards all progress messages
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn log(&self, _message: &str) {}
}

impl<F: Fn(&str) + Send + Sync> ProgressSink for F {
    fn log(&self, message: &str) {
        self(message)
    }
}

/// Cancels an in-flight execution flow
///
/// Cancelling stops further observation only; an already-submitted deposit
/// may still settle asynchronously and the caller reconciles afterwards.
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Receiving side of a cancellation signal
#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
    // keeps the channel open for tokens that can never fire
    _keepalive: Option<Arc<watch::Sender<bool>>>,
}

impl CancelToken {
    /// A token that never cancels
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            rx,
            _keepalive: Some(Arc::new(tx)),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancelled; pends forever on a dropped handle
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Create a linked cancellation pair
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (
        CancelHandle { tx },
        CancelToken {
            rx,
            _keepalive: None,
        },
    )
}

fn status_message(status: ExecutionStatus) -> &'static str {
    match status {
        ExecutionStatus::PendingDeposit => "Waiting for deposit",
        ExecutionStatus::IncompleteDeposit => "Incomplete deposit",
        ExecutionStatus::KnownDepositTx => "Known deposit tx",
        ExecutionStatus::Processing => "Processing swap",
        ExecutionStatus::Success => "Swap successful",
        ExecutionStatus::Failed => "Swap failed",
        ExecutionStatus::Refunded => "Swap refunded",
    }
}

impl Exchange {
    /// Drive a review to a terminal state (or until cancelled)
    ///
    /// Dispatches on the review's route; every route passes through
    /// `Submitted` and `Settling`. Errors before submission are returned,
    /// everything after lands in the review itself.
    pub async fn make_swap(
        &self,
        sender: &dyn Wallet,
        review: Review,
        progress: &dyn ProgressSink,
        cancel: CancelToken,
    ) -> BridgeResult<Review> {
        match &review.route {
            Route::DirectDeposit => self.run_direct_deposit(sender, review, progress, cancel).await,
            Route::DirectWithdraw => {
                self.run_direct_withdraw(sender, review, progress, cancel).await
            }
            Route::Aggregator { .. } => self.run_aggregator(sender, review, progress, cancel).await,
        }
    }

    async fn run_aggregator(
        &self,
        sender: &dyn Wallet,
        mut review: Review,
        progress: &dyn ProgressSink,
        cancel: CancelToken,
    ) -> BridgeResult<Review> {
        let Route::Aggregator {
            deposit_address,
            deposit_memo,
            ..
        } = review.route.clone()
        else {
            unreachable!("run_aggregator dispatched on aggregator route");
        };

        let from = review.from.clone();
        let tx_hash = sender
            .transfer(TransferArgs {
                token: &from,
                receiver: &deposit_address,
                amount: review.amount_in,
                memo: deposit_memo.as_deref(),
                fee_hint: Some(&review.fee),
            })
            .await?;

        review.advance(SwapStatus::Submitted)?;
        progress.log("Submitting tx");
        let _ = self.registry().refresh_balance(sender, &from).await;

        // Best-effort notification; the aggregator also watches the chain.
        if let Err(e) = self
            .aggregator()
            .submit_deposit_tx(&tx_hash, &deposit_address)
            .await
        {
            debug!("Deposit notification failed (ignored): {}", e);
        }

        progress.log("Checking status");
        review.advance(SwapStatus::Settling)?;
        self.poll_until_terminal(&mut review, progress, cancel).await;

        let to = review.to.clone();
        let _ = self.registry().refresh_balance(sender, &to).await;
        Ok(review)
    }

    async fn run_direct_deposit(
        &self,
        sender: &dyn Wallet,
        mut review: Review,
        progress: &dyn ProgressSink,
        cancel: CancelToken,
    ) -> BridgeResult<Review> {
        let from = review.from.clone();

        progress.log("Sending deposit transaction");
        let tx_hash = match self
            .bridge()
            .broadcast_deposit(sender, &from, review.amount_in, &review.receiver)
            .await
        {
            Ok(hash) => hash,
            Err(e) => {
                // Single on-chain action: fatal, no retry
                review.fail(format!("Deposit broadcast failed: {}", e));
                return Ok(review);
            }
        };

        review.advance(SwapStatus::Submitted)?;
        progress.log("Waiting for deposit");
        review.advance(SwapStatus::Settling)?;

        match self
            .bridge()
            .await_deposit(from.id.chain, &tx_hash, &review.receiver, cancel)
            .await
        {
            Ok(Some(deposit)) => {
                progress.log("Finishing deposit");
                match self.bridge().finalize_deposit(&deposit).await {
                    Ok(()) => {
                        progress.log("Deposit finished");
                        review.status_message = Some("Deposit finished".to_string());
                        review.advance(SwapStatus::Success)?;
                    }
                    Err(e) => review.fail(format!("Deposit finalization failed: {}", e)),
                }
            }
            // Cancelled: stop observing, the deposit may still settle
            Ok(None) => {}
            Err(e) => review.fail(format!("Deposit did not land: {}", e)),
        }

        let _ = self.registry().refresh_balance(sender, &from).await;
        Ok(review)
    }

    async fn run_direct_withdraw(
        &self,
        sender: &dyn Wallet,
        mut review: Review,
        progress: &dyn ProgressSink,
        cancel: CancelToken,
    ) -> BridgeResult<Review> {
        let to = review.to.clone();

        progress.log("Signing withdrawal");
        let intent_hash = match self
            .bridge()
            .withdraw(sender, &to, review.amount_in, &review.receiver)
            .await
        {
            Ok(hash) => hash,
            Err(e) => {
                review.fail(format!("Withdrawal publish failed: {}", e));
                return Ok(review);
            }
        };

        review.advance(SwapStatus::Submitted)?;
        progress.log("Waiting for withdrawal");
        review.advance(SwapStatus::Settling)?;

        match self.bridge().await_intent(&intent_hash, cancel).await {
            Ok(Some(IntentState::Settled)) => {
                progress.log("Withdrawal settled");
                review.status_message = Some("Withdrawal settled".to_string());
                review.advance(SwapStatus::Success)?;
            }
            Ok(Some(state)) => {
                review.fail(format!("Withdrawal did not settle: {:?}", state));
            }
            // Cancelled: stop observing
            Ok(None) => {}
            Err(e) => review.fail(format!("Withdrawal status polling failed: {}", e)),
        }

        Ok(review)
    }

    /// Query the aggregator once and fold the result into the review
    ///
    /// Non-terminal codes only refresh `status_message`; `SUCCESS` refines
    /// `amount_out` from the reported settlement.
    pub async fn check_status(&self, review: &mut Review) -> BridgeResult<()> {
        let (deposit_address, deposit_memo) = match &review.route {
            Route::Aggregator {
                deposit_address,
                deposit_memo,
                ..
            } => (deposit_address.clone(), deposit_memo.clone()),
            _ => return Ok(()),
        };

        let response = self
            .aggregator()
            .get_execution_status(&deposit_address, deposit_memo.as_deref())
            .await?;

        review.status_message = Some(status_message(response.status).to_string());

        match response.status {
            ExecutionStatus::Success => {
                if let Some(amount_out) = response.swap_details.amount_out {
                    review.amount_out = parse_minor(&amount_out)?;
                }
                review.advance(SwapStatus::Success)?;
            }
            ExecutionStatus::Failed | ExecutionStatus::Refunded => {
                review.advance(SwapStatus::Failed)?;
            }
            _ => {}
        }

        Ok(())
    }

    /// Poll settlement status until terminal or cancelled
    ///
    /// Transient transport errors are retried up to the configured budget;
    /// aggregator-reported failures are terminal immediately. There is no
    /// built-in timeout: an unresponsive aggregator is bounded by the
    /// caller's cancellation signal.
    async fn poll_until_terminal(
        &self,
        review: &mut Review,
        progress: &dyn ProgressSink,
        mut cancel: CancelToken,
    ) {
        let mut ticker = interval(Duration::from_millis(
            self.settings().execution.poll_interval_ms,
        ));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let max_retries = self.settings().execution.max_poll_retries;
        let mut failures = 0u32;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Polling cancelled for review {}", review.id);
                    return;
                }
                _ = ticker.tick() => {}
            }

            match self.check_status(review).await {
                Ok(()) => {
                    failures = 0;
                    if let Some(message) = &review.status_message {
                        progress.log(message);
                    }
                    if review.status.is_terminal() {
                        return;
                    }
                }
                Err(e) if e.is_retryable() && failures < max_retries => {
                    failures += 1;
                    warn!(
                        "Status poll failed for review {} (attempt {}/{}): {}",
                        review.id, failures, max_retries, e
                    );
                }
                Err(e) => {
                    error!("Giving up polling review {}: {}", review.id, e);
                    review.fail(format!("Status polling failed: {}", e));
                    return;
                }
            }
        }
    }
}
