//! Token model - canonical token identity, catalog and balance cache
//!
//! This module provides:
//! - Fixed-point conversion between human and minor units (exact integer
//!   arithmetic, no floating point)
//! - The token catalog with pool-address resolution per chain
//! - The concurrent balance cache shared by in-flight swaps

pub mod stellar;

use crate::chains::{ChainFamily, ChainRegistry};
use crate::config::Settings;
use crate::error::{BridgeError, BridgeResult};
use crate::wallet::Wallet;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Sentinel address for a chain's gas token
pub const NATIVE_ADDRESS: &str = "native";

/// Parse a wire amount carried as a decimal string of minor units
pub fn parse_minor(value: &str) -> BridgeResult<u128> {
    value
        .trim()
        .parse::<u128>()
        .map_err(|_| BridgeError::InvalidAmount(value.to_string()))
}

/// Unique token identity: chain id plus chain-native address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenId {
    pub chain: u32,
    pub address: String,
}

impl TokenId {
    pub fn new(chain: u32, address: impl Into<String>) -> Self {
        Self {
            chain,
            address: address.into(),
        }
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chain, self.address)
    }
}

/// A fungible asset on one chain
#[derive(Debug, Clone)]
pub struct Token {
    pub id: TokenId,
    pub symbol: String,
    /// 0..=24
    pub decimals: u8,
    /// Best-effort USD rate, display data only
    pub usd_rate: f64,
    /// Canonical pool-ledger asset id, resolved from the catalog
    pub pool_address: Option<String>,
}

impl Token {
    pub fn new(chain: u32, address: impl Into<String>, symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            id: TokenId::new(chain, address),
            symbol: symbol.into(),
            decimals,
            usd_rate: 0.0,
            pool_address: None,
        }
    }

    pub fn with_pool_address(mut self, pool_address: impl Into<String>) -> Self {
        self.pool_address = Some(pool_address.into());
        self
    }

    pub fn is_native(&self) -> bool {
        self.id.address == NATIVE_ADDRESS
    }

    /// Convert a decimal string into minor units
    ///
    /// Exact integer arithmetic throughout; amounts with more fractional
    /// digits than the token carries are rejected rather than rounded.
    pub fn to_minor_units(&self, human: &str) -> BridgeResult<u128> {
        let human = human.trim();
        let (int_part, frac_part) = match human.split_once('.') {
            Some((i, f)) => (i, f),
            None => (human, ""),
        };

        if int_part.is_empty() && frac_part.is_empty() {
            return Err(BridgeError::InvalidAmount(human.to_string()));
        }
        if !int_part.bytes().all(|b| b.is_ascii_digit())
            || !frac_part.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(BridgeError::InvalidAmount(human.to_string()));
        }
        if frac_part.len() > self.decimals as usize {
            return Err(BridgeError::InvalidAmount(format!(
                "{} has more than {} decimal places",
                human, self.decimals
            )));
        }

        let scale = 10u128.pow(self.decimals as u32);
        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part
                .parse()
                .map_err(|_| BridgeError::InvalidAmount(human.to_string()))?
        };
        let frac: u128 = if frac_part.is_empty() {
            0
        } else {
            let parsed: u128 = frac_part
                .parse()
                .map_err(|_| BridgeError::InvalidAmount(human.to_string()))?;
            parsed * 10u128.pow((self.decimals as usize - frac_part.len()) as u32)
        };

        whole
            .checked_mul(scale)
            .and_then(|v| v.checked_add(frac))
            .ok_or_else(|| BridgeError::InvalidAmount(format!("{} overflows", human)))
    }

    /// Render minor units as a decimal string without precision loss
    pub fn to_human_units(&self, minor: u128) -> String {
        let scale = 10u128.pow(self.decimals as u32);
        let whole = minor / scale;
        let frac = minor % scale;

        if frac == 0 {
            return whole.to_string();
        }

        let frac_str = format!("{:0>width$}", frac, width = self.decimals as usize);
        format!("{}.{}", whole, frac_str.trim_end_matches('0'))
    }
}

/// Token catalog plus the shared balance cache
///
/// The catalog is read-mostly: lookups and resolution run concurrently with
/// rate refreshes. Balances are written only by explicit refresh calls,
/// last-writer-wins per `(owner, token)` key.
pub struct TokenRegistry {
    chains: ChainRegistry,
    tokens: DashMap<TokenId, Token>,
    balances: DashMap<(String, TokenId), u128>,
}

impl TokenRegistry {
    /// Build the registry from the seed catalog in settings
    pub fn new(settings: &Settings) -> Self {
        let registry = Self {
            chains: ChainRegistry::new(settings),
            tokens: DashMap::new(),
            balances: DashMap::new(),
        };

        for seed in &settings.tokens {
            let token = Token::new(seed.chain, &seed.address, &seed.symbol, seed.decimals)
                .with_pool_address(&seed.pool_address);
            registry.insert(token);
        }

        registry
    }

    pub fn chains(&self) -> &ChainRegistry {
        &self.chains
    }

    /// Insert a token, creating its pool-side twin when one is not known yet
    pub fn insert(&self, token: Token) {
        if let Some(pool_address) = token.pool_address.clone() {
            let twin_id = TokenId::new(self.chains.pool_chain(), pool_address.clone());
            if !self.tokens.contains_key(&twin_id) {
                self.tokens.insert(
                    twin_id.clone(),
                    Token {
                        id: twin_id,
                        symbol: token.symbol.clone(),
                        decimals: token.decimals,
                        usd_rate: token.usd_rate,
                        pool_address: Some(pool_address),
                    },
                );
            }
        }
        self.tokens.insert(token.id.clone(), token);
    }

    pub fn get(&self, chain: u32, address: &str) -> Option<Token> {
        self.tokens
            .get(&TokenId::new(chain, address))
            .map(|t| t.clone())
    }

    pub fn by_symbol(&self, symbol: &str, chain: Option<u32>) -> Option<Token> {
        self.tokens
            .iter()
            .find(|t| t.symbol == symbol && chain.map_or(true, |c| t.id.chain == c))
            .map(|t| t.clone())
    }

    pub fn all(&self) -> Vec<Token> {
        self.tokens.iter().map(|t| t.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Merge live catalog data: refresh rates for known tokens, insert
    /// unknown ones. Returns the number of newly added tokens.
    ///
    /// Rate refresh never touches balances, so stale rates can land while
    /// balance reads proceed.
    pub fn merge(&self, live: Vec<Token>) -> usize {
        let mut added = 0;
        for token in live {
            let known = {
                match self.tokens.get_mut(&token.id) {
                    Some(mut existing) => {
                        existing.usd_rate = token.usd_rate;
                        if existing.pool_address.is_none() {
                            existing.pool_address = token.pool_address.clone();
                        }
                        true
                    }
                    None => false,
                }
            };
            if !known {
                self.insert(token);
                added += 1;
            }
        }
        added
    }

    /// Resolve the canonical pool-ledger asset id for a chain-native address
    ///
    /// On the pool chain the address already is the pool asset id. On Stellar
    /// the queried address is a contract id and catalog entries are matched
    /// through deterministic contract-id derivation. Everywhere else the
    /// match is case-insensitive, with `"native"` also matching the chain's
    /// configured wrapped-native alias.
    pub fn resolve_pool_address(&self, chain: u32, address: &str) -> BridgeResult<String> {
        if self.chains.is_pool(chain) {
            return Ok(address.to_string());
        }

        let stellar = self.chains.family(chain) == Some(ChainFamily::Stellar);
        let mut pools: Vec<String> = Vec::new();

        for entry in self.tokens.iter() {
            let token = entry.value();
            if token.id.chain != chain {
                continue;
            }

            let hit = if stellar {
                self.stellar_contract_matches(chain, token, address)
            } else {
                token.id.address.eq_ignore_ascii_case(address)
                    || (address == NATIVE_ADDRESS
                        && self.chains.native_alias(chain) == Some(token.id.address.as_str()))
            };

            if hit {
                if let Some(pool) = &token.pool_address {
                    pools.push(pool.clone());
                }
            }
        }

        pools.sort();
        pools.dedup();

        match pools.len() {
            0 => Err(BridgeError::UnsupportedToken {
                chain,
                address: address.to_string(),
            }),
            1 => Ok(pools.remove(0)),
            _ => Err(BridgeError::AmbiguousToken {
                chain,
                address: address.to_string(),
            }),
        }
    }

    fn stellar_contract_matches(&self, chain: u32, token: &Token, address: &str) -> bool {
        let Some(passphrase) = self.chains.stellar_passphrase(chain) else {
            return false;
        };

        let derived = if token.is_native() {
            Ok(stellar::native_contract_id(passphrase))
        } else {
            stellar::asset_contract_id(passphrase, &token.symbol, &token.id.address)
        };

        match derived {
            Ok(contract_id) => contract_id.eq_ignore_ascii_case(address),
            Err(e) => {
                debug!("Skipping underivable Stellar catalog entry {}: {}", token.id, e);
                false
            }
        }
    }

    /// Record an absolute balance for `(owner, token)`
    pub fn record_balance(&self, owner: &str, token: &TokenId, amount: u128) {
        self.balances
            .insert((owner.to_string(), token.clone()), amount);
    }

    /// Last cached balance for `(owner, token)`, if any
    pub fn cached_balance(&self, owner: &str, token: &TokenId) -> Option<u128> {
        self.balances
            .get(&(owner.to_string(), token.clone()))
            .map(|b| *b)
    }

    /// Fetch a fresh balance through the wallet and cache it
    pub async fn refresh_balance(&self, wallet: &dyn Wallet, token: &Token) -> BridgeResult<u128> {
        let amount = wallet
            .fetch_balance(token.id.chain, &token.id.address)
            .await?;
        self.record_balance(wallet.address(), &token.id, amount);
        Ok(amount)
    }

    /// Refresh a batch of balances concurrently
    pub async fn refresh_balances(
        &self,
        wallet: &dyn Wallet,
        tokens: &[Token],
    ) -> Vec<BridgeResult<u128>> {
        futures::future::join_all(tokens.iter().map(|t| self.refresh_balance(wallet, t))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Settings, TokenSeed};

    fn usdc() -> Token {
        Token::new(1, "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48", "USDC", 6)
    }

    #[test]
    fn minor_unit_conversion_is_exact() {
        let token = usdc();
        assert_eq!(token.to_minor_units("10.5").unwrap(), 10_500_000);
        assert_eq!(token.to_minor_units("0.000001").unwrap(), 1);
        assert_eq!(token.to_minor_units("100").unwrap(), 100_000_000);
        assert_eq!(token.to_human_units(10_480_000), "10.48");
        assert_eq!(token.to_human_units(0), "0");
    }

    #[test]
    fn round_trip_law_holds_for_representable_amounts() {
        for decimals in [0u8, 6, 18, 24] {
            let token = Token::new(1, "native", "T", decimals);
            let samples: &[&str] = match decimals {
                0 => &["0", "1", "987654321"],
                6 => &["0.5", "10.5", "123456.654321"],
                18 => &["1.000000000000000001", "0.000000000000000001"],
                _ => &["42.000000000000000000000001", "7"],
            };
            for s in samples {
                let minor = token.to_minor_units(s).unwrap();
                assert_eq!(&token.to_human_units(minor), s, "decimals={}", decimals);
                assert_eq!(token.to_minor_units(&token.to_human_units(minor)).unwrap(), minor);
            }
        }
    }

    #[test]
    fn malformed_amounts_are_rejected() {
        let token = usdc();
        assert!(token.to_minor_units("10.1234567").is_err()); // excess precision
        assert!(token.to_minor_units("10,5").is_err());
        assert!(token.to_minor_units("-3").is_err());
        assert!(token.to_minor_units("").is_err());
        assert!(token.to_minor_units(".").is_err());
        assert!(token.to_minor_units("1e6").is_err());
    }

    #[test]
    fn resolution_is_case_insensitive_on_evm() {
        let registry = TokenRegistry::new(&Settings::default());
        let pool = registry
            .resolve_pool_address(1, "0xA0B86991C6218B36C1D19D4A2E9EB0CE3606EB48")
            .unwrap();
        assert_eq!(
            pool,
            "nep141:eth-0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48.omft.near"
        );
    }

    #[test]
    fn native_matches_wrapped_alias_on_near() {
        let registry = TokenRegistry::new(&Settings::default());
        assert_eq!(
            registry.resolve_pool_address(1010, "native").unwrap(),
            "nep141:wrap.near"
        );
    }

    #[test]
    fn pool_chain_addresses_resolve_to_themselves() {
        let settings = Settings::default();
        let registry = TokenRegistry::new(&settings);
        assert_eq!(
            registry
                .resolve_pool_address(settings.pool.chain_id, "nep141:wrap.near")
                .unwrap(),
            "nep141:wrap.near"
        );
    }

    #[test]
    fn unknown_tokens_are_unsupported() {
        let registry = TokenRegistry::new(&Settings::default());
        let err = registry.resolve_pool_address(1, "0xdeadbeef").unwrap_err();
        assert!(matches!(err, BridgeError::UnsupportedToken { .. }));
    }

    #[test]
    fn conflicting_native_aliases_are_ambiguous() {
        let mut settings = Settings::default();
        settings.tokens.push(TokenSeed {
            chain: 1010,
            address: "native".to_string(),
            symbol: "NEAR".to_string(),
            decimals: 24,
            pool_address: "nep141:near-native.omft.near".to_string(),
        });

        let registry = TokenRegistry::new(&settings);
        let err = registry.resolve_pool_address(1010, "native").unwrap_err();
        assert!(matches!(err, BridgeError::AmbiguousToken { .. }));
    }

    #[test]
    fn stellar_contracts_resolve_through_derivation() {
        let registry = TokenRegistry::new(&Settings::default());

        let native = registry
            .resolve_pool_address(1100, "CAS3J7GYLGXMF6TDJBBYYSE3HQ6BBSMLNUQ34T6TZMYMW2EVH34XOWMA")
            .unwrap();
        assert_eq!(native, "nep141:stellar.omft.near");

        let usdc = registry
            .resolve_pool_address(1100, "CCW67TSZV3SSS2HXMBQ5JFGCKJNXKZM7UQUWUZPUTHXSTZLEO7SJMI75")
            .unwrap();
        assert_eq!(usdc, "nep141:stellar-usdc.omft.near");
    }

    #[test]
    fn balance_cache_is_last_writer_wins() {
        let registry = TokenRegistry::new(&Settings::default());
        let id = TokenId::new(1, "native");
        registry.record_balance("0xowner", &id, 5);
        registry.record_balance("0xowner", &id, 7);
        assert_eq!(registry.cached_balance("0xowner", &id), Some(7));
        assert_eq!(registry.cached_balance("0xother", &id), None);
    }

    #[test]
    fn merge_refreshes_rates_without_dropping_tokens() {
        let registry = TokenRegistry::new(&Settings::default());
        let before = registry.len();

        let mut live = usdc().with_pool_address(
            "nep141:eth-0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48.omft.near",
        );
        live.usd_rate = 1.0001;
        let added = registry.merge(vec![live]);

        assert_eq!(added, 0);
        assert_eq!(registry.len(), before);
        let refreshed = registry
            .get(1, "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48")
            .unwrap();
        assert!((refreshed.usd_rate - 1.0001).abs() < f64::EPSILON);
    }
}
