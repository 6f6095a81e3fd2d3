//! Swap aggregator HTTP API
//!
//! Quote sourcing, execution-status polling and best-effort deposit
//! notification against the external aggregator service. [`AggregatorApi`]
//! abstracts the transport so the quote engine and state machine can be
//! exercised against in-memory implementations.

use crate::config::AggregatorConfig;
use crate::error::{BridgeError, BridgeResult};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Quote direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SwapType {
    ExactInput,
    ExactOutput,
}

/// Where the input funds come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DepositType {
    OriginChain,
    Intents,
}

/// How the deposit is correlated to the quote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DepositMode {
    Simple,
    Memo,
}

/// Where the output funds land
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecipientType {
    DestinationChain,
    Intents,
}

/// Where refunds are routed on failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundType {
    OriginChain,
    Intents,
}

/// Application fee attached to a quote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppFee {
    pub recipient: String,
    /// Basis points
    pub fee: u32,
}

/// Quote request body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub origin_asset: String,
    pub destination_asset: String,
    /// Minor units as a decimal string
    pub amount: String,
    /// Basis points
    pub slippage_tolerance: u32,
    pub swap_type: SwapType,
    pub deposit_type: DepositType,
    pub deposit_mode: DepositMode,
    pub recipient_type: RecipientType,
    pub refund_type: RefundType,
    pub refund_to: String,
    pub recipient: String,
    pub referral: String,
    pub app_fees: Vec<AppFee>,
    /// ISO-8601 quote expiry
    pub deadline: String,
    pub dry: bool,
}

/// Frozen quote terms
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Quote {
    pub deposit_address: Option<String>,
    pub deposit_memo: Option<String>,
    pub amount_in: String,
    pub amount_out: String,
    pub quote_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuoteResponse {
    pub quote: Quote,
}

/// Aggregator-reported execution state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    PendingDeposit,
    IncompleteDeposit,
    KnownDepositTx,
    Processing,
    Success,
    Failed,
    Refunded,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Success | ExecutionStatus::Failed | ExecutionStatus::Refunded
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SwapDetails {
    pub amount_out: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStatusResponse {
    pub status: ExecutionStatus,
    #[serde(default)]
    pub swap_details: SwapDetails,
}

/// Catalog entry from the aggregator token list
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenEntry {
    /// Canonical pool-ledger asset id
    pub asset_id: String,
    /// Aggregator blockchain slug
    pub blockchain: String,
    pub symbol: String,
    pub decimals: u8,
    #[serde(default)]
    pub contract_address: Option<String>,
    #[serde(default)]
    pub price: f64,
}

/// Aggregator quote/settlement service
#[async_trait]
pub trait AggregatorApi: Send + Sync {
    /// Full supported token catalog
    async fn get_tokens(&self) -> BridgeResult<Vec<TokenEntry>>;

    /// Request a quote; the returned terms are frozen until the deadline
    async fn get_quote(&self, request: &QuoteRequest) -> BridgeResult<QuoteResponse>;

    /// Execution status keyed by deposit address (and memo where used)
    async fn get_execution_status(
        &self,
        deposit_address: &str,
        deposit_memo: Option<&str>,
    ) -> BridgeResult<ExecutionStatusResponse>;

    /// Best-effort deposit notification; the aggregator also observes the
    /// chain independently, so failures are ignored by callers
    async fn submit_deposit_tx(&self, tx_hash: &str, deposit_address: &str) -> BridgeResult<()>;
}

/// HTTP implementation of [`AggregatorApi`]
pub struct AggregatorClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl AggregatorClient {
    pub fn new(config: &AggregatorConfig) -> BridgeResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| BridgeError::Config(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.http.request(method, format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }

    async fn check<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> BridgeResult<T> {
        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl AggregatorApi for AggregatorClient {
    async fn get_tokens(&self) -> BridgeResult<Vec<TokenEntry>> {
        let response = self
            .request(reqwest::Method::GET, "/v0/tokens")
            .send()
            .await?;
        Self::check(response).await
    }

    async fn get_quote(&self, request: &QuoteRequest) -> BridgeResult<QuoteResponse> {
        debug!(
            "Requesting quote {} -> {}",
            request.origin_asset, request.destination_asset
        );
        let response = self
            .request(reqwest::Method::POST, "/v0/quote")
            .json(request)
            .send()
            .await?;
        Self::check(response).await
    }

    async fn get_execution_status(
        &self,
        deposit_address: &str,
        deposit_memo: Option<&str>,
    ) -> BridgeResult<ExecutionStatusResponse> {
        let mut query = vec![("depositAddress", deposit_address)];
        if let Some(memo) = deposit_memo {
            query.push(("depositMemo", memo));
        }

        let response = self
            .request(reqwest::Method::GET, "/v0/status")
            .query(&query)
            .send()
            .await?;
        Self::check(response).await
    }

    async fn submit_deposit_tx(&self, tx_hash: &str, deposit_address: &str) -> BridgeResult<()> {
        let response = self
            .request(reqwest::Method::POST, "/v0/deposit/submit")
            .json(&serde_json::json!({
                "txHash": tx_hash,
                "depositAddress": deposit_address,
            }))
            .send()
            .await?;

        let _: serde_json::Value = Self::check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_request_serializes_to_the_wire_shape() {
        let request = QuoteRequest {
            origin_asset: "nep141:usdt.tether-token.near".to_string(),
            destination_asset: "nep141:wrap.near".to_string(),
            amount: "10500000".to_string(),
            slippage_tolerance: 50,
            swap_type: SwapType::ExactInput,
            deposit_type: DepositType::OriginChain,
            deposit_mode: DepositMode::Simple,
            recipient_type: RecipientType::Intents,
            refund_type: RefundType::OriginChain,
            refund_to: "alice.near".to_string(),
            recipient: "0xabc".to_string(),
            referral: "omnipool".to_string(),
            app_fees: vec![AppFee {
                recipient: "omnipool".to_string(),
                fee: 25,
            }],
            deadline: "2026-08-07T12:20:00.000Z".to_string(),
            dry: false,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["originAsset"], "nep141:usdt.tether-token.near");
        assert_eq!(json["swapType"], "EXACT_INPUT");
        assert_eq!(json["depositMode"], "SIMPLE");
        assert_eq!(json["slippageTolerance"], 50);
        assert_eq!(json["appFees"][0]["fee"], 25);
    }

    #[test]
    fn execution_status_parses_wire_codes() {
        let response: ExecutionStatusResponse = serde_json::from_str(
            r#"{"status":"KNOWN_DEPOSIT_TX","swapDetails":{"amountOut":null}}"#,
        )
        .unwrap();
        assert_eq!(response.status, ExecutionStatus::KnownDepositTx);
        assert!(!response.status.is_terminal());

        let response: ExecutionStatusResponse =
            serde_json::from_str(r#"{"status":"SUCCESS","swapDetails":{"amountOut":"10480000"}}"#)
                .unwrap();
        assert_eq!(response.status, ExecutionStatus::Success);
        assert_eq!(response.swap_details.amount_out.as_deref(), Some("10480000"));
        assert!(response.status.is_terminal());
    }

    #[test]
    fn status_response_tolerates_missing_details() {
        let response: ExecutionStatusResponse =
            serde_json::from_str(r#"{"status":"REFUNDED"}"#).unwrap();
        assert_eq!(response.status, ExecutionStatus::Refunded);
        assert!(response.swap_details.amount_out.is_none());
    }
}
