//! Pool-ledger JSON-RPC client
//!
//! The pool ledger is a black-box JSON-RPC endpoint: publish signed intent
//! sets, poll intent status, query pool balances and track pending deposits.
//! The [`PoolLedgerApi`] trait keeps the engine testable without a network.

use crate::config::PoolConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::intents::Commitment;
use crate::token::parse_minor;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Result of a successful `publish_intents`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublishResult {
    #[serde(default)]
    pub intent_hashes: Vec<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl PublishResult {
    /// Hash of the first published intent set
    pub fn intent_hash(&self) -> Option<&str> {
        self.intent_hashes.first().map(String::as_str)
    }
}

/// Settlement state of a published intent set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentState {
    Pending,
    TxBroadcasted,
    Settled,
    NotFoundOrNotValid,
}

impl IntentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, IntentState::Settled | IntentState::NotFoundOrNotValid)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IntentStatus {
    pub intent_hash: String,
    pub status: IntentState,
}

/// A deposit observed on a native chain but not yet credited to the pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingDeposit {
    pub chain: u32,
    pub tx_hash: String,
    pub receiver: String,
    /// Pool asset id being credited
    pub asset: String,
    pub amount: String,
}

/// Relayer-priced fee for a gasless withdrawal
#[derive(Debug, Clone, Deserialize)]
pub struct WithdrawFeeQuote {
    /// Fee in minor units of the target chain's gas token
    pub gas_price: String,
}

impl WithdrawFeeQuote {
    pub fn gas_price_units(&self) -> BridgeResult<u128> {
        parse_minor(&self.gas_price)
    }
}

/// Pool-side exact-output swap quote, used to price gas top-ups
#[derive(Debug, Clone, Deserialize)]
pub struct ExactOutQuote {
    pub amount_in: String,
    pub quote_hash: String,
}

/// Capability surface of the pool ledger
#[async_trait]
pub trait PoolLedgerApi: Send + Sync {
    /// Publish signed commitments; idempotent keyed by `(signer, nonce)`
    async fn publish_intents(
        &self,
        signed: &[Commitment],
        quote_hashes: &[String],
    ) -> BridgeResult<PublishResult>;

    /// Settlement status of a published intent set
    async fn get_status(&self, intent_hash: &str) -> BridgeResult<IntentStatus>;

    /// Pool-ledger balances for an account
    async fn get_intents_balances(
        &self,
        assets: &[String],
        account: &str,
    ) -> BridgeResult<HashMap<String, u128>>;

    /// Look up a chain deposit the pool has observed but not yet credited
    async fn find_pending_deposit(
        &self,
        chain: u32,
        tx_hash: &str,
        receiver: &str,
    ) -> BridgeResult<Option<PendingDeposit>>;

    /// Credit an observed deposit to the pool ledger
    async fn finalize_deposit(&self, deposit: &PendingDeposit) -> BridgeResult<()>;

    /// Fee for a gasless withdrawal on the given chain
    async fn gasless_withdraw_fee(
        &self,
        chain: u32,
        token: &str,
        receiver: &str,
    ) -> BridgeResult<WithdrawFeeQuote>;

    /// Pool-side exact-output quote between two pool assets
    async fn quote_exact_out(
        &self,
        asset_in: &str,
        asset_out: &str,
        amount_out: u128,
        account: &str,
    ) -> BridgeResult<ExactOutQuote>;
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

/// HTTP JSON-RPC implementation of [`PoolLedgerApi`]
pub struct PoolLedgerClient {
    http: reqwest::Client,
    rpc_url: String,
}

impl PoolLedgerClient {
    pub fn new(config: &PoolConfig) -> BridgeResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| BridgeError::Config(e.to_string()))?;

        Ok(Self {
            http,
            rpc_url: config.rpc_url.clone(),
        })
    }

    /// Single JSON-RPC round trip; a `null` result maps to `None`
    async fn call_opt<P: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> BridgeResult<Option<R>> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": "dontcare",
            "method": method,
            "params": [params],
        });

        debug!("Pool ledger call: {}", method);
        let response = self.http.post(&self.rpc_url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let envelope: RpcEnvelope<R> = response.json().await?;
        if let Some(error) = envelope.error {
            return Err(BridgeError::Rpc(format!(
                "{} ({})",
                error.message, error.code
            )));
        }

        Ok(envelope.result)
    }

    async fn call<P: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> BridgeResult<R> {
        self.call_opt(method, params).await?.ok_or_else(|| {
            BridgeError::Rpc(format!("Missing result for method {}", method))
        })
    }
}

#[async_trait]
impl PoolLedgerApi for PoolLedgerClient {
    async fn publish_intents(
        &self,
        signed: &[Commitment],
        quote_hashes: &[String],
    ) -> BridgeResult<PublishResult> {
        let result: Result<PublishResult, BridgeError> = self
            .call(
                "publish_intents",
                json!({ "signed_datas": signed, "quote_hashes": quote_hashes }),
            )
            .await;

        // A reused (signer, nonce) pair is a rejected duplicate, not a failure
        // of the new payload.
        match result {
            Err(BridgeError::Rpc(message)) if message.to_lowercase().contains("nonce") => {
                let signer_id = signed
                    .first()
                    .and_then(|c| c.signer_id())
                    .unwrap_or_default();
                Err(BridgeError::DuplicateIntent { signer_id })
            }
            other => other,
        }
    }

    async fn get_status(&self, intent_hash: &str) -> BridgeResult<IntentStatus> {
        self.call("get_status", json!({ "intent_hash": intent_hash }))
            .await
    }

    async fn get_intents_balances(
        &self,
        assets: &[String],
        account: &str,
    ) -> BridgeResult<HashMap<String, u128>> {
        let raw: HashMap<String, String> = self
            .call(
                "get_intents_balances",
                json!({ "account": account, "assets": assets }),
            )
            .await?;

        let mut balances = HashMap::with_capacity(raw.len());
        for (asset, amount) in raw {
            let amount = parse_minor(&amount)?;
            balances.insert(asset, amount);
        }
        Ok(balances)
    }

    async fn find_pending_deposit(
        &self,
        chain: u32,
        tx_hash: &str,
        receiver: &str,
    ) -> BridgeResult<Option<PendingDeposit>> {
        self.call_opt(
            "get_pending_deposit",
            json!({ "chain": chain, "tx_hash": tx_hash, "receiver": receiver }),
        )
        .await
    }

    async fn finalize_deposit(&self, deposit: &PendingDeposit) -> BridgeResult<()> {
        let _: serde_json::Value = self.call("finish_deposit", deposit).await?;
        Ok(())
    }

    async fn gasless_withdraw_fee(
        &self,
        chain: u32,
        token: &str,
        receiver: &str,
    ) -> BridgeResult<WithdrawFeeQuote> {
        self.call(
            "get_withdraw_fee",
            json!({ "chain": chain, "token": token, "receiver": receiver }),
        )
        .await
    }

    async fn quote_exact_out(
        &self,
        asset_in: &str,
        asset_out: &str,
        amount_out: u128,
        account: &str,
    ) -> BridgeResult<ExactOutQuote> {
        self.call(
            "quote_exact_out",
            json!({
                "asset_in": asset_in,
                "asset_out": asset_out,
                "amount_out": amount_out.to_string(),
                "account": account,
            }),
        )
        .await
    }
}
