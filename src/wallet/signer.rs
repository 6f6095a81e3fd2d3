//! Raw intent signers
//!
//! Pool-identity wallets that can authorize intents but hold no chain-side
//! capabilities: balances and transfers go through a chain adapter, these
//! only produce commitments. Two schemes are supported, both hash-then-sign
//! over the canonical UTF-8 JSON payload:
//!
//! - `raw_ed25519` embeds the public key in the commitment
//! - `raw_secp256k1` embeds a recovery id in the signature instead, so the
//!   verifier recovers the key

use crate::chains::ChainFamily;
use crate::error::{BridgeError, BridgeResult};
use crate::intents::{encode_payload, Commitment, Intent};
use crate::token::Token;
use crate::wallet::{FeeEstimate, SignOptions, TransferArgs, Wallet};

use async_trait::async_trait;
use ed25519_dalek::Signer as _;
use k256::ecdsa::SigningKey as Secp256k1Key;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

const VERIFYING_CONTRACT_DEFAULT: &str = "intents.near";

fn digest_payload(payload: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    hasher.finalize().into()
}

fn nonce_or_random(options: &SignOptions) -> [u8; 32] {
    options.nonce.unwrap_or_else(|| {
        let mut nonce = [0u8; 32];
        OsRng.fill_bytes(&mut nonce);
        nonce
    })
}

/// Ed25519 pool-identity signer (`standard = "raw_ed25519"`)
pub struct Ed25519Signer {
    signing_key: ed25519_dalek::SigningKey,
    signer_id: String,
    address: String,
    verifying_contract: String,
}

impl Ed25519Signer {
    /// Build from a 32-byte secret; the signer id defaults to the hex-encoded
    /// public key when not supplied
    pub fn new(secret: [u8; 32], signer_id: Option<String>) -> Self {
        let signing_key = ed25519_dalek::SigningKey::from_bytes(&secret);
        let public = signing_key.verifying_key().to_bytes();
        let signer_id = signer_id.unwrap_or_else(|| hex::encode(public));
        let address = bs58::encode(public).into_string();

        Self {
            signing_key,
            signer_id,
            address,
            verifying_contract: VERIFYING_CONTRACT_DEFAULT.to_string(),
        }
    }

    pub fn with_verifying_contract(mut self, contract: impl Into<String>) -> Self {
        self.verifying_contract = contract.into();
        self
    }

    /// Base58 public key
    pub fn public_key_b58(&self) -> String {
        bs58::encode(self.signing_key.verifying_key().to_bytes()).into_string()
    }
}

#[async_trait]
impl Wallet for Ed25519Signer {
    fn address(&self) -> &str {
        &self.address
    }

    fn pool_identity(&self) -> Option<&str> {
        Some(&self.signer_id)
    }

    fn chain_family(&self) -> ChainFamily {
        ChainFamily::Near
    }

    fn public_key(&self) -> Option<String> {
        Some(format!("ed25519:{}", self.public_key_b58()))
    }

    async fn fetch_balance(&self, _chain: u32, _address: &str) -> BridgeResult<u128> {
        Err(BridgeError::UnsupportedOperation(
            "Raw signer has no balance capability".to_string(),
        ))
    }

    async fn transfer_fee(
        &self,
        _token: &Token,
        _receiver: &str,
        _amount: u128,
    ) -> BridgeResult<FeeEstimate> {
        Err(BridgeError::UnsupportedOperation(
            "Raw signer has no transfer capability".to_string(),
        ))
    }

    async fn transfer(&self, _args: TransferArgs<'_>) -> BridgeResult<String> {
        Err(BridgeError::UnsupportedOperation(
            "Raw signer has no transfer capability".to_string(),
        ))
    }

    async fn sign_intents(
        &self,
        intents: &[Intent],
        options: SignOptions,
    ) -> BridgeResult<Commitment> {
        let nonce = nonce_or_random(&options);
        let payload = encode_payload(
            &self.signer_id,
            &self.verifying_contract,
            intents,
            &nonce,
            options.deadline,
        )?;

        let signature = self.signing_key.sign(&digest_payload(&payload));

        Ok(Commitment {
            standard: "raw_ed25519".to_string(),
            signature: format!("ed25519:{}", bs58::encode(signature.to_bytes()).into_string()),
            public_key: Some(format!("ed25519:{}", self.public_key_b58())),
            payload,
        })
    }
}

/// Secp256k1 pool-identity signer (`standard = "raw_secp256k1"`)
pub struct Secp256k1Signer {
    signing_key: Secp256k1Key,
    signer_id: String,
    verifying_contract: String,
}

impl Secp256k1Signer {
    /// Build from a 32-byte secret; the signer id is the lowercase
    /// hex-encoded compressed public key
    pub fn new(secret: [u8; 32]) -> BridgeResult<Self> {
        let signing_key = Secp256k1Key::from_slice(&secret)
            .map_err(|e| BridgeError::Signing(format!("Invalid secp256k1 secret: {}", e)))?;
        let compressed = signing_key
            .verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec();
        let signer_id = hex::encode(compressed);

        Ok(Self {
            signing_key,
            signer_id,
            verifying_contract: VERIFYING_CONTRACT_DEFAULT.to_string(),
        })
    }

    pub fn with_verifying_contract(mut self, contract: impl Into<String>) -> Self {
        self.verifying_contract = contract.into();
        self
    }
}

#[async_trait]
impl Wallet for Secp256k1Signer {
    fn address(&self) -> &str {
        &self.signer_id
    }

    fn pool_identity(&self) -> Option<&str> {
        Some(&self.signer_id)
    }

    fn chain_family(&self) -> ChainFamily {
        ChainFamily::Evm
    }

    async fn fetch_balance(&self, _chain: u32, _address: &str) -> BridgeResult<u128> {
        Err(BridgeError::UnsupportedOperation(
            "Raw signer has no balance capability".to_string(),
        ))
    }

    async fn transfer_fee(
        &self,
        _token: &Token,
        _receiver: &str,
        _amount: u128,
    ) -> BridgeResult<FeeEstimate> {
        Err(BridgeError::UnsupportedOperation(
            "Raw signer has no transfer capability".to_string(),
        ))
    }

    async fn transfer(&self, _args: TransferArgs<'_>) -> BridgeResult<String> {
        Err(BridgeError::UnsupportedOperation(
            "Raw signer has no transfer capability".to_string(),
        ))
    }

    async fn sign_intents(
        &self,
        intents: &[Intent],
        options: SignOptions,
    ) -> BridgeResult<Commitment> {
        let nonce = nonce_or_random(&options);
        let payload = encode_payload(
            &self.signer_id,
            &self.verifying_contract,
            intents,
            &nonce,
            options.deadline,
        )?;

        let digest = digest_payload(&payload);
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(&digest)
            .map_err(|e| BridgeError::Signing(e.to_string()))?;

        // 65 bytes: r ‖ s ‖ recovery id, so verifiers can recover the key
        let mut bytes = signature.to_bytes().to_vec();
        bytes.push(recovery_id.to_byte());

        Ok(Commitment {
            standard: "raw_secp256k1".to_string(),
            signature: format!("secp256k1:{}", bs58::encode(bytes).into_string()),
            public_key: None,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use ed25519_dalek::Verifier as _;
    use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};

    fn sample_intents() -> Vec<Intent> {
        vec![Intent::Transfer {
            tokens: std::collections::BTreeMap::from([(
                "nep141:wrap.near".to_string(),
                "100".to_string(),
            )]),
            receiver_id: "bob.near".to_string(),
            memo: None,
        }]
    }

    fn fixed_options() -> SignOptions {
        SignOptions {
            nonce: Some([9u8; 32]),
            deadline: Some(Utc.with_ymd_and_hms(2026, 8, 7, 12, 0, 0).unwrap()),
        }
    }

    #[tokio::test]
    async fn ed25519_commitments_are_deterministic_and_verifiable() {
        let signer = Ed25519Signer::new([1u8; 32], None);
        let a = signer
            .sign_intents(&sample_intents(), fixed_options())
            .await
            .unwrap();
        let b = signer
            .sign_intents(&sample_intents(), fixed_options())
            .await
            .unwrap();

        assert_eq!(a.payload, b.payload);
        assert_eq!(a.signature, b.signature);
        assert_eq!(a.standard, "raw_ed25519");
        assert!(a.public_key.is_some());

        let sig_b58 = a.signature.strip_prefix("ed25519:").unwrap();
        let sig_bytes = bs58::decode(sig_b58).into_vec().unwrap();
        let signature = ed25519_dalek::Signature::from_slice(&sig_bytes).unwrap();
        let verifying = ed25519_dalek::SigningKey::from_bytes(&[1u8; 32]).verifying_key();
        verifying
            .verify(&digest_payload(&a.payload), &signature)
            .expect("signature verifies against the payload digest");
    }

    #[tokio::test]
    async fn fresh_nonces_differ_between_commitments() {
        let signer = Ed25519Signer::new([1u8; 32], None);
        let options = SignOptions::default();
        let a = signer.sign_intents(&sample_intents(), options).await.unwrap();
        let b = signer.sign_intents(&sample_intents(), options).await.unwrap();
        assert_ne!(a.payload, b.payload);
    }

    #[tokio::test]
    async fn secp256k1_public_key_is_recoverable() {
        let signer = Secp256k1Signer::new([2u8; 32]).unwrap();
        let commitment = signer
            .sign_intents(&sample_intents(), fixed_options())
            .await
            .unwrap();

        assert_eq!(commitment.standard, "raw_secp256k1");
        assert!(commitment.public_key.is_none());

        let sig_b58 = commitment.signature.strip_prefix("secp256k1:").unwrap();
        let bytes = bs58::decode(sig_b58).into_vec().unwrap();
        assert_eq!(bytes.len(), 65);

        let signature = Signature::from_slice(&bytes[..64]).unwrap();
        let recovery_id = RecoveryId::from_byte(bytes[64]).unwrap();
        let digest = digest_payload(&commitment.payload);
        let recovered =
            VerifyingKey::recover_from_prehash(&digest, &signature, recovery_id).unwrap();

        let expected_id = hex::encode(recovered.to_encoded_point(true).as_bytes());
        assert_eq!(commitment.signer_id().as_deref(), Some(expected_id.as_str()));
    }

    #[tokio::test]
    async fn signer_id_override_lands_in_the_payload() {
        let signer = Ed25519Signer::new([3u8; 32], Some("custom.pool".to_string()));
        let commitment = signer
            .sign_intents(&sample_intents(), fixed_options())
            .await
            .unwrap();
        assert_eq!(commitment.signer_id().as_deref(), Some("custom.pool"));
    }
}
