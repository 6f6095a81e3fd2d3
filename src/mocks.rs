//! In-memory mock implementations for tests and examples
//!
//! Deterministic stand-ins for the aggregator, the pool ledger and a chain
//! wallet. Status sequences are queued ahead of time so polling behavior can
//! be exercised without a network.

use crate::aggregator::{
    AggregatorApi, ExecutionStatusResponse, Quote, QuoteRequest, QuoteResponse, TokenEntry,
};
use crate::chains::ChainFamily;
use crate::error::{BridgeError, BridgeResult};
use crate::intents::rpc::{
    ExactOutQuote, IntentState, IntentStatus, PendingDeposit, PoolLedgerApi, PublishResult,
    WithdrawFeeQuote,
};
use crate::intents::{Commitment, Intent};
use crate::token::{Token, TokenId};
use crate::wallet::signer::Ed25519Signer;
use crate::wallet::{FeeEstimate, SignOptions, TransferArgs, Wallet};

use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Scripted aggregator
#[derive(Default)]
pub struct MockAggregator {
    tokens: Mutex<Vec<TokenEntry>>,
    quote: Mutex<Option<Quote>>,
    quote_requests: Mutex<Vec<QuoteRequest>>,
    statuses: Mutex<VecDeque<BridgeResult<ExecutionStatusResponse>>>,
    repeat: Mutex<Option<ExecutionStatusResponse>>,
    submitted: Mutex<Vec<(String, String)>>,
}

impl MockAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_tokens(&self, tokens: Vec<TokenEntry>) {
        *self.tokens.lock().unwrap() = tokens;
    }

    pub fn set_quote(&self, quote: Quote) {
        *self.quote.lock().unwrap() = Some(quote);
    }

    /// Queue one status poll result
    pub fn push_status(&self, status: BridgeResult<ExecutionStatusResponse>) {
        self.statuses.lock().unwrap().push_back(status);
    }

    /// Status returned whenever the queue is empty
    pub fn repeat_status(&self, status: ExecutionStatusResponse) {
        *self.repeat.lock().unwrap() = Some(status);
    }

    pub fn quote_requests(&self) -> Vec<QuoteRequest> {
        self.quote_requests.lock().unwrap().clone()
    }

    /// Deposit notifications received, as `(tx_hash, deposit_address)`
    pub fn submitted(&self) -> Vec<(String, String)> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl AggregatorApi for MockAggregator {
    async fn get_tokens(&self) -> BridgeResult<Vec<TokenEntry>> {
        Ok(self.tokens.lock().unwrap().clone())
    }

    async fn get_quote(&self, request: &QuoteRequest) -> BridgeResult<QuoteResponse> {
        self.quote_requests.lock().unwrap().push(request.clone());
        let quote = self.quote.lock().unwrap().clone().ok_or(BridgeError::Api {
            status: 404,
            message: "No quote fixture".to_string(),
        })?;
        Ok(QuoteResponse { quote })
    }

    async fn get_execution_status(
        &self,
        _deposit_address: &str,
        _deposit_memo: Option<&str>,
    ) -> BridgeResult<ExecutionStatusResponse> {
        if let Some(status) = self.statuses.lock().unwrap().pop_front() {
            return status;
        }
        if let Some(status) = self.repeat.lock().unwrap().clone() {
            return Ok(status);
        }
        Err(BridgeError::Network("Status queue exhausted".to_string()))
    }

    async fn submit_deposit_tx(&self, tx_hash: &str, deposit_address: &str) -> BridgeResult<()> {
        self.submitted
            .lock()
            .unwrap()
            .push((tx_hash.to_string(), deposit_address.to_string()));
        Ok(())
    }
}

/// Scripted pool ledger with `(signer, nonce)` duplicate rejection
#[derive(Default)]
pub struct MockLedger {
    published: Mutex<Vec<(Vec<Commitment>, Vec<String>)>>,
    seen_nonces: Mutex<HashSet<(String, String)>>,
    intent_statuses: Mutex<VecDeque<IntentState>>,
    pending_deposits: Mutex<VecDeque<Option<PendingDeposit>>>,
    finalized: Mutex<Vec<PendingDeposit>>,
    withdraw_gas_price: Mutex<Option<String>>,
    exact_out: Mutex<Option<ExactOutQuote>>,
    balances: Mutex<HashMap<String, u128>>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_withdraw_fee(&self, gas_price: &str) {
        *self.withdraw_gas_price.lock().unwrap() = Some(gas_price.to_string());
    }

    pub fn set_exact_out(&self, amount_in: &str, quote_hash: &str) {
        *self.exact_out.lock().unwrap() = Some(ExactOutQuote {
            amount_in: amount_in.to_string(),
            quote_hash: quote_hash.to_string(),
        });
    }

    /// Queue one `find_pending_deposit` answer; an empty queue always finds
    /// a synthesized deposit
    pub fn push_pending_deposit(&self, deposit: Option<PendingDeposit>) {
        self.pending_deposits.lock().unwrap().push_back(deposit);
    }

    /// Queue one intent status; an empty queue reports `Settled`
    pub fn push_intent_status(&self, state: IntentState) {
        self.intent_statuses.lock().unwrap().push_back(state);
    }

    pub fn set_balance(&self, asset: &str, amount: u128) {
        self.balances.lock().unwrap().insert(asset.to_string(), amount);
    }

    pub fn published(&self) -> Vec<(Vec<Commitment>, Vec<String>)> {
        self.published.lock().unwrap().clone()
    }

    pub fn finalized(&self) -> Vec<PendingDeposit> {
        self.finalized.lock().unwrap().clone()
    }
}

#[derive(Deserialize)]
struct PayloadKey {
    signer_id: String,
    nonce: String,
}

#[async_trait]
impl PoolLedgerApi for MockLedger {
    async fn publish_intents(
        &self,
        signed: &[Commitment],
        quote_hashes: &[String],
    ) -> BridgeResult<PublishResult> {
        for commitment in signed {
            let key: PayloadKey = serde_json::from_str(&commitment.payload)
                .map_err(|e| BridgeError::Rpc(format!("Malformed payload: {}", e)))?;
            let inserted = self
                .seen_nonces
                .lock()
                .unwrap()
                .insert((key.signer_id.clone(), key.nonce));
            if !inserted {
                return Err(BridgeError::DuplicateIntent {
                    signer_id: key.signer_id,
                });
            }
        }

        let mut published = self.published.lock().unwrap();
        published.push((signed.to_vec(), quote_hashes.to_vec()));
        Ok(PublishResult {
            intent_hashes: vec![format!("intent-hash-{}", published.len())],
            status: Some("OK".to_string()),
        })
    }

    async fn get_status(&self, intent_hash: &str) -> BridgeResult<IntentStatus> {
        let status = self
            .intent_statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(IntentState::Settled);
        Ok(IntentStatus {
            intent_hash: intent_hash.to_string(),
            status,
        })
    }

    async fn get_intents_balances(
        &self,
        assets: &[String],
        _account: &str,
    ) -> BridgeResult<HashMap<String, u128>> {
        let balances = self.balances.lock().unwrap();
        Ok(assets
            .iter()
            .map(|asset| (asset.clone(), balances.get(asset).copied().unwrap_or(0)))
            .collect())
    }

    async fn find_pending_deposit(
        &self,
        chain: u32,
        tx_hash: &str,
        receiver: &str,
    ) -> BridgeResult<Option<PendingDeposit>> {
        if let Some(queued) = self.pending_deposits.lock().unwrap().pop_front() {
            return Ok(queued);
        }
        Ok(Some(PendingDeposit {
            chain,
            tx_hash: tx_hash.to_string(),
            receiver: receiver.to_string(),
            asset: "nep141:mock.asset".to_string(),
            amount: "0".to_string(),
        }))
    }

    async fn finalize_deposit(&self, deposit: &PendingDeposit) -> BridgeResult<()> {
        self.finalized.lock().unwrap().push(deposit.clone());
        Ok(())
    }

    async fn gasless_withdraw_fee(
        &self,
        _chain: u32,
        _token: &str,
        _receiver: &str,
    ) -> BridgeResult<WithdrawFeeQuote> {
        Ok(WithdrawFeeQuote {
            gas_price: self
                .withdraw_gas_price
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| "0".to_string()),
        })
    }

    async fn quote_exact_out(
        &self,
        _asset_in: &str,
        _asset_out: &str,
        _amount_out: u128,
        _account: &str,
    ) -> BridgeResult<ExactOutQuote> {
        self.exact_out
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| BridgeError::Rpc("No exact-out fixture".to_string()))
    }
}

/// One recorded [`Wallet::transfer`] call
#[derive(Debug, Clone)]
pub struct RecordedTransfer {
    pub token: TokenId,
    pub receiver: String,
    pub amount: u128,
    pub memo: Option<String>,
}

/// Scripted wallet with a real Ed25519 intent signer inside
pub struct MockWallet {
    address: String,
    family: ChainFamily,
    pool_identity: Option<String>,
    fee: FeeEstimate,
    signer: Ed25519Signer,
    balances: Mutex<HashMap<TokenId, u128>>,
    transfers: Mutex<Vec<RecordedTransfer>>,
    next_transfer_error: Mutex<Option<BridgeError>>,
    transfer_counter: AtomicU64,
}

impl MockWallet {
    pub fn with_family(family: ChainFamily, address: &str) -> Self {
        // deterministic signing key per address
        let mut secret = [0u8; 32];
        let digest: [u8; 32] = {
            let mut hasher = Sha256::new();
            hasher.update(address.as_bytes());
            hasher.finalize().into()
        };
        secret.copy_from_slice(&digest);

        let pool_identity = format!("{}-pool", address.to_lowercase());
        Self {
            address: address.to_string(),
            family,
            pool_identity: Some(pool_identity.clone()),
            fee: FeeEstimate::new(0, 10, 21_000, 2),
            signer: Ed25519Signer::new(secret, Some(pool_identity)),
            balances: Mutex::new(HashMap::new()),
            transfers: Mutex::new(Vec::new()),
            next_transfer_error: Mutex::new(None),
            transfer_counter: AtomicU64::new(0),
        }
    }

    pub fn evm(address: &str) -> Self {
        Self::with_family(ChainFamily::Evm, address)
    }

    pub fn without_identity(mut self) -> Self {
        self.pool_identity = None;
        self
    }

    pub fn set_balance(&self, token: TokenId, amount: u128) {
        self.balances.lock().unwrap().insert(token, amount);
    }

    /// Make the next transfer fail with the given error
    pub fn fail_next_transfer(&self, error: BridgeError) {
        *self.next_transfer_error.lock().unwrap() = Some(error);
    }

    pub fn transfers(&self) -> Vec<RecordedTransfer> {
        self.transfers.lock().unwrap().clone()
    }
}

#[async_trait]
impl Wallet for MockWallet {
    fn address(&self) -> &str {
        &self.address
    }

    fn pool_identity(&self) -> Option<&str> {
        self.pool_identity.as_deref()
    }

    fn chain_family(&self) -> ChainFamily {
        self.family
    }

    async fn fetch_balance(&self, chain: u32, address: &str) -> BridgeResult<u128> {
        self.balances
            .lock()
            .unwrap()
            .get(&TokenId::new(chain, address))
            .copied()
            .ok_or_else(|| BridgeError::Network("No balance fixture".to_string()))
    }

    async fn transfer_fee(
        &self,
        token: &Token,
        _receiver: &str,
        _amount: u128,
    ) -> BridgeResult<FeeEstimate> {
        let mut fee = self.fee.clone();
        fee.chain = token.id.chain;
        Ok(fee)
    }

    async fn transfer(&self, args: TransferArgs<'_>) -> BridgeResult<String> {
        if let Some(error) = self.next_transfer_error.lock().unwrap().take() {
            return Err(error);
        }

        self.transfers.lock().unwrap().push(RecordedTransfer {
            token: args.token.id.clone(),
            receiver: args.receiver.to_string(),
            amount: args.amount,
            memo: args.memo.map(String::from),
        });

        let seq = self.transfer_counter.fetch_add(1, Ordering::SeqCst);
        Ok(format!("0xmocktx{}", seq))
    }

    async fn sign_intents(
        &self,
        intents: &[Intent],
        options: SignOptions,
    ) -> BridgeResult<Commitment> {
        self.signer.sign_intents(intents, options).await
    }
}
