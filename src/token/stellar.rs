//! Stellar asset normalization
//!
//! Stellar tokens are catalogued as (asset code, issuer) pairs but addressed
//! on-chain by their Soroban contract id. The derivation is deterministic:
//! SHA-256 over the XDR-encoded contract-id preimage for the network, so the
//! catalog can be matched against a queried contract address without any RPC.
//! The network passphrase comes from chain configuration.

use crate::error::{BridgeError, BridgeResult};

use sha2::{Digest, Sha256};

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Strkey version byte for ed25519 account ids (`G...`)
const VERSION_ACCOUNT: u8 = 6 << 3;
/// Strkey version byte for contract ids (`C...`)
const VERSION_CONTRACT: u8 = 2 << 3;

// XDR discriminants for the contract-id hash preimage
const ENVELOPE_TYPE_CONTRACT_ID: u32 = 8;
const CONTRACT_ID_PREIMAGE_FROM_ASSET: u32 = 1;
const ASSET_TYPE_NATIVE: u32 = 0;
const ASSET_TYPE_CREDIT_ALPHANUM4: u32 = 1;
const ASSET_TYPE_CREDIT_ALPHANUM12: u32 = 2;
const PUBLIC_KEY_TYPE_ED25519: u32 = 0;

/// Contract id of the native (XLM) asset on the given network
pub fn native_contract_id(passphrase: &str) -> String {
    let mut preimage = preimage_header(passphrase);
    preimage.extend_from_slice(&ASSET_TYPE_NATIVE.to_be_bytes());
    encode_strkey(VERSION_CONTRACT, &sha256(&preimage))
}

/// Contract id of an issued asset on the given network
pub fn asset_contract_id(passphrase: &str, code: &str, issuer: &str) -> BridgeResult<String> {
    if code.is_empty() || code.len() > 12 || !code.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(BridgeError::Internal(format!(
            "Invalid Stellar asset code: {}",
            code
        )));
    }

    let issuer_key = decode_account_id(issuer)?;

    let mut preimage = preimage_header(passphrase);
    if code.len() <= 4 {
        preimage.extend_from_slice(&ASSET_TYPE_CREDIT_ALPHANUM4.to_be_bytes());
        let mut padded = [0u8; 4];
        padded[..code.len()].copy_from_slice(code.as_bytes());
        preimage.extend_from_slice(&padded);
    } else {
        preimage.extend_from_slice(&ASSET_TYPE_CREDIT_ALPHANUM12.to_be_bytes());
        let mut padded = [0u8; 12];
        padded[..code.len()].copy_from_slice(code.as_bytes());
        preimage.extend_from_slice(&padded);
    }
    preimage.extend_from_slice(&PUBLIC_KEY_TYPE_ED25519.to_be_bytes());
    preimage.extend_from_slice(&issuer_key);

    Ok(encode_strkey(VERSION_CONTRACT, &sha256(&preimage)))
}

/// Decode a `G...` strkey into the raw ed25519 public key
pub fn decode_account_id(strkey: &str) -> BridgeResult<[u8; 32]> {
    let raw = base32_decode(strkey)
        .ok_or_else(|| BridgeError::Internal(format!("Invalid Stellar strkey: {}", strkey)))?;

    if raw.len() != 35 || raw[0] != VERSION_ACCOUNT {
        return Err(BridgeError::Internal(format!(
            "Not a Stellar account id: {}",
            strkey
        )));
    }

    let checksum = u16::from_le_bytes([raw[33], raw[34]]);
    if crc16_xmodem(&raw[..33]) != checksum {
        return Err(BridgeError::Internal(format!(
            "Stellar strkey checksum mismatch: {}",
            strkey
        )));
    }

    let mut key = [0u8; 32];
    key.copy_from_slice(&raw[1..33]);
    Ok(key)
}

fn preimage_header(passphrase: &str) -> Vec<u8> {
    let mut preimage = Vec::with_capacity(72);
    preimage.extend_from_slice(&ENVELOPE_TYPE_CONTRACT_ID.to_be_bytes());
    preimage.extend_from_slice(&sha256(passphrase.as_bytes()));
    preimage.extend_from_slice(&CONTRACT_ID_PREIMAGE_FROM_ASSET.to_be_bytes());
    preimage
}

fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

fn encode_strkey(version: u8, payload: &[u8; 32]) -> String {
    let mut raw = Vec::with_capacity(35);
    raw.push(version);
    raw.extend_from_slice(payload);
    let checksum = crc16_xmodem(&raw);
    raw.extend_from_slice(&checksum.to_le_bytes());
    base32_encode(&raw)
}

// 35 input bytes are exactly 56 base32 characters, so no padding is involved
fn base32_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity((data.len() * 8 + 4) / 5);
    let mut buffer: u32 = 0;
    let mut bits = 0u32;

    for &byte in data {
        buffer = (buffer << 8) | byte as u32;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(BASE32_ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(BASE32_ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }
    out
}

fn base32_decode(input: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits = 0u32;

    for ch in input.bytes() {
        let value = BASE32_ALPHABET.iter().position(|&a| a == ch)? as u32;
        buffer = (buffer << 5) | value;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push(((buffer >> bits) & 0xff) as u8);
        }
    }
    Some(out)
}

fn crc16_xmodem(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    const PUBNET: &str = "Public Global Stellar Network ; September 2015";
    const USDC_ISSUER: &str = "GA5ZSEJYB37JRC5AVCIA5MOP4RHTM335X2KGX3IHOJAPP5RE34K4KZVN";

    #[test]
    fn native_contract_matches_known_sac() {
        assert_eq!(
            native_contract_id(PUBNET),
            "CAS3J7GYLGXMF6TDJBBYYSE3HQ6BBSMLNUQ34T6TZMYMW2EVH34XOWMA"
        );
    }

    #[test]
    fn issued_asset_contract_matches_known_sac() {
        let id = asset_contract_id(PUBNET, "USDC", USDC_ISSUER).unwrap();
        assert_eq!(id, "CCW67TSZV3SSS2HXMBQ5JFGCKJNXKZM7UQUWUZPUTHXSTZLEO7SJMI75");
    }

    #[test]
    fn derivation_is_network_dependent() {
        let pubnet = asset_contract_id(PUBNET, "USDC", USDC_ISSUER).unwrap();
        let testnet =
            asset_contract_id("Test SDF Network ; September 2015", "USDC", USDC_ISSUER).unwrap();
        assert_ne!(pubnet, testnet);
        assert!(testnet.starts_with('C'));
    }

    #[test]
    fn account_decode_rejects_tampered_checksum() {
        let mut tampered = USDC_ISSUER.to_string();
        tampered.pop();
        tampered.push('2');
        assert!(decode_account_id(&tampered).is_err());
        assert!(decode_account_id(USDC_ISSUER).is_ok());
    }

    #[test]
    fn bad_asset_codes_are_rejected() {
        assert!(asset_contract_id(PUBNET, "", USDC_ISSUER).is_err());
        assert!(asset_contract_id(PUBNET, "WAYTOOLONGCODE", USDC_ISSUER).is_err());
    }
}
