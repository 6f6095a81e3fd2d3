//! Commitment / intents protocol
//!
//! An intent is one atomic instruction against the pool ledger; a signed,
//! canonically serialized set of intents forms a [`Commitment`]. Intents
//! within one commitment execute atomically and in array order; there is no
//! ordering between commitments under different nonces.

pub mod rpc;

use crate::error::{BridgeError, BridgeResult};
use crate::wallet::{SignOptions, Wallet};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use self::rpc::{PoolLedgerApi, PublishResult};

/// Deadline sentinel used when a commitment is not time-sensitive
pub const FAR_FUTURE_DEADLINE: &str = "2100-01-01T00:00:00.000Z";

/// 1 TGas in gas units
pub const TGAS: u128 = 1_000_000_000_000;

/// One atomic pool-ledger instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum Intent {
    /// Move pool-ledger balances to a receiver
    Transfer {
        tokens: BTreeMap<String, String>,
        receiver_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        memo: Option<String>,
    },
    /// Atomic exchange of pool-ledger balances; negative entries are given,
    /// positive entries received
    TokenDiff { diff: BTreeMap<String, String> },
    /// Pool-ledger exit of a fungible token to a native chain
    FtWithdraw {
        token: String,
        receiver_id: String,
        amount: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        memo: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        msg: Option<String>,
    },
    /// Multi-token withdrawal
    MtWithdraw {
        token: String,
        receiver_id: String,
        token_ids: Vec<String>,
        amounts: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        memo: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        msg: Option<String>,
    },
    /// Non-fungible withdrawal
    NftWithdraw {
        token: String,
        receiver_id: String,
        token_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        memo: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        msg: Option<String>,
    },
    /// Authenticated contract invocation
    AuthCall {
        contract_id: String,
        msg: String,
        attached_deposit: String,
        min_gas: String,
    },
    AddPublicKey { public_key: String },
    RemovePublicKey { public_key: String },
}

/// Signed authorization artifact, immutable once created
///
/// Valid only until the deadline embedded in `payload`; the `(signer, nonce)`
/// pair inside the payload must never be reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment {
    /// Signature scheme tag (`raw_ed25519` or `raw_secp256k1`)
    pub standard: String,
    /// Scheme-prefixed base58 signature
    pub signature: String,
    /// Embedded public key; absent for recoverable schemes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    /// Canonical serialized intent payload
    pub payload: String,
}

impl Commitment {
    /// Signer id embedded in the canonical payload
    pub fn signer_id(&self) -> Option<String> {
        #[derive(Deserialize)]
        struct Head {
            signer_id: String,
        }
        serde_json::from_str::<Head>(&self.payload)
            .ok()
            .map(|h| h.signer_id)
    }
}

// Canonical field order; re-serializing identical inputs is byte-identical.
#[derive(Serialize)]
struct PayloadRepr<'a> {
    deadline: &'a str,
    intents: &'a [Intent],
    nonce: &'a str,
    signer_id: &'a str,
    verifying_contract: &'a str,
}

/// Render a deadline the way payloads carry it
pub fn format_deadline(deadline: DateTime<Utc>) -> String {
    deadline.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Serialize the canonical signing payload
pub fn encode_payload(
    signer_id: &str,
    verifying_contract: &str,
    intents: &[Intent],
    nonce: &[u8; 32],
    deadline: Option<DateTime<Utc>>,
) -> BridgeResult<String> {
    let deadline = deadline
        .map(format_deadline)
        .unwrap_or_else(|| FAR_FUTURE_DEADLINE.to_string());
    let nonce = BASE64.encode(nonce);

    serde_json::to_string(&PayloadRepr {
        deadline: &deadline,
        intents,
        nonce: &nonce,
        signer_id,
        verifying_contract,
    })
    .map_err(|e| BridgeError::Signing(e.to_string()))
}

/// Accumulates an ordered intent set, then signs and publishes it
#[derive(Default)]
pub struct IntentsBuilder {
    intents: Vec<Intent>,
    quote_hashes: Vec<String>,
    nonce: Option<[u8; 32]>,
    deadline: Option<DateTime<Utc>>,
}

impl IntentsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pool-balance transfer
    pub fn transfer(mut self, asset: &str, amount: u128, recipient: &str) -> Self {
        let mut tokens = BTreeMap::new();
        tokens.insert(asset.to_string(), amount.to_string());
        self.intents.push(Intent::Transfer {
            tokens,
            receiver_id: recipient.to_lowercase(),
            memo: None,
        });
        self
    }

    /// Append an atomic swap of `give` for `take`
    pub fn token_diff(mut self, give: (&str, u128), take: (&str, u128)) -> Self {
        let mut diff = BTreeMap::new();
        diff.insert(give.0.to_string(), format!("-{}", give.1));
        diff.insert(take.0.to_string(), take.1.to_string());
        self.intents.push(Intent::TokenDiff { diff });
        self
    }

    /// Append a fungible-token pool exit
    pub fn ft_withdraw(
        mut self,
        token: &str,
        receiver: &str,
        amount: u128,
        memo: Option<String>,
    ) -> Self {
        self.intents.push(Intent::FtWithdraw {
            token: token.to_string(),
            receiver_id: receiver.to_string(),
            amount: amount.to_string(),
            memo,
            msg: None,
        });
        self
    }

    /// Append an authenticated contract call
    pub fn auth_call(
        mut self,
        contract_id: &str,
        msg: &str,
        attached_deposit: u128,
        tgas: u128,
    ) -> Self {
        self.intents.push(Intent::AuthCall {
            contract_id: contract_id.to_string(),
            msg: msg.to_string(),
            attached_deposit: attached_deposit.to_string(),
            min_gas: (tgas * TGAS).to_string(),
        });
        self
    }

    /// Append an arbitrary intent
    pub fn intent(mut self, intent: Intent) -> Self {
        self.intents.push(intent);
        self
    }

    /// Attach aggregator-issued correlation hashes to the publish call
    pub fn with_quote_hashes(mut self, hashes: Vec<String>) -> Self {
        self.quote_hashes.extend(hashes);
        self
    }

    pub fn with_nonce(mut self, nonce: [u8; 32]) -> Self {
        self.nonce = Some(nonce);
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }

    pub fn intents(&self) -> &[Intent] {
        &self.intents
    }

    /// Sign the accumulated intents and publish the commitment
    ///
    /// Publishing is idempotent keyed by `(signer, nonce)`; resubmitting an
    /// identical signed payload surfaces `DuplicateIntent` instead of
    /// double-executing.
    pub async fn execute(
        self,
        signer: &dyn Wallet,
        ledger: &dyn PoolLedgerApi,
    ) -> BridgeResult<PublishResult> {
        if self.intents.is_empty() {
            return Err(BridgeError::Internal("No intents to publish".to_string()));
        }

        let commitment = signer
            .sign_intents(
                &self.intents,
                SignOptions {
                    nonce: self.nonce,
                    deadline: self.deadline,
                },
            )
            .await?;

        ledger
            .publish_intents(&[commitment], &self.quote_hashes)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn intent_tags_follow_the_wire_format() {
        let intent = Intent::TokenDiff {
            diff: BTreeMap::from([
                ("nep141:usdt.tether-token.near".to_string(), "-100".to_string()),
                ("nep141:wrap.near".to_string(), "95".to_string()),
            ]),
        };
        let json = serde_json::to_value(&intent).unwrap();
        assert_eq!(json["intent"], "token_diff");
        assert_eq!(json["diff"]["nep141:usdt.tether-token.near"], "-100");

        let withdraw = Intent::FtWithdraw {
            token: "usdt.tether-token.near".to_string(),
            receiver_id: "alice.near".to_string(),
            amount: "5".to_string(),
            memo: None,
            msg: None,
        };
        let json = serde_json::to_value(&withdraw).unwrap();
        assert_eq!(json["intent"], "ft_withdraw");
        assert!(json.get("memo").is_none());
    }

    #[test]
    fn payload_is_canonical_and_deterministic() {
        let intents = vec![Intent::Transfer {
            tokens: BTreeMap::from([("nep141:wrap.near".to_string(), "1".to_string())]),
            receiver_id: "bob.near".to_string(),
            memo: None,
        }];
        let nonce = [7u8; 32];
        let deadline = Utc.with_ymd_and_hms(2026, 8, 7, 12, 0, 0).unwrap();

        let a = encode_payload("signer", "intents.near", &intents, &nonce, Some(deadline)).unwrap();
        let b = encode_payload("signer", "intents.near", &intents, &nonce, Some(deadline)).unwrap();
        assert_eq!(a, b);

        // fixed key order: deadline, intents, nonce, signer_id, verifying_contract
        assert!(a.starts_with("{\"deadline\":\"2026-08-07T12:00:00.000Z\",\"intents\":"));
        let nonce_at = a.find("\"nonce\":").unwrap();
        let signer_at = a.find("\"signer_id\":").unwrap();
        let contract_at = a.find("\"verifying_contract\":").unwrap();
        assert!(nonce_at < signer_at && signer_at < contract_at);
    }

    #[test]
    fn missing_deadline_uses_the_far_future_sentinel() {
        let payload = encode_payload("signer", "intents.near", &[], &[0u8; 32], None).unwrap();
        assert!(payload.contains(FAR_FUTURE_DEADLINE));
    }

    #[test]
    fn builder_preserves_intent_order() {
        let builder = IntentsBuilder::new()
            .token_diff(("nep141:a", 10), ("nep141:b", 9))
            .transfer("nep141:b", 9, "Carol.Near")
            .ft_withdraw("usdt.tether-token.near", "alice.near", 9, None);

        let intents = builder.intents();
        assert_eq!(intents.len(), 3);
        assert!(matches!(intents[0], Intent::TokenDiff { .. }));
        assert!(matches!(
            &intents[1],
            Intent::Transfer { receiver_id, .. } if receiver_id == "carol.near"
        ));
        assert!(matches!(intents[2], Intent::FtWithdraw { .. }));
    }
}
