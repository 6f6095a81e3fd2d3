//! Configuration management for the bridge engine
//!
//! Loads configuration from TOML files with environment variable substitution.
//! Chain-specific normalization rules (native-token aliases, pool vault
//! accounts, the Stellar network passphrase) are configuration data here, not
//! code, so new chains and wrapped representations can be added without a
//! release.

use crate::chains::ChainFamily;

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub aggregator: AggregatorConfig,
    pub pool: PoolConfig,
    pub execution: ExecutionConfig,
    pub chains: HashMap<String, ChainConfig>,
    pub tokens: Vec<TokenSeed>,
}

/// Swap aggregator endpoint and fee policy
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Referral tag attached to every quote request
    pub referral: String,
    pub app_fee_recipient: String,
    /// Application fee in basis points, suppressed for same-symbol bridging
    pub app_fee_bps: u32,
    /// Quote deadline horizon in seconds
    pub quote_deadline_secs: u64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            base_url: "https://1click.chaindefuser.com".to_string(),
            api_key: None,
            referral: "omnipool".to_string(),
            app_fee_recipient: "omnipool".to_string(),
            app_fee_bps: 25,
            quote_deadline_secs: 20 * 60,
        }
    }
}

/// Pool-ledger (intents pool) endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Virtual chain id the pool ledger is addressed as
    pub chain_id: u32,
    pub rpc_url: String,
    /// Contract the signed intent payloads name as verifier
    pub verifying_contract: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            chain_id: 0,
            rpc_url: "https://solver-relay-v2.chaindefuser.com/rpc".to_string(),
            verifying_contract: "intents.near".to_string(),
        }
    }
}

/// Execution state machine tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub poll_interval_ms: u64,
    /// Transient transport failures tolerated per polling loop before the
    /// review degrades to failed
    pub max_poll_retries: u32,
    pub retry_delay_ms: u64,
    /// Poll attempts while waiting for a direct deposit to land
    pub deposit_wait_attempts: u32,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 3000,
            max_poll_retries: 5,
            retry_delay_ms: 1000,
            deposit_wait_attempts: 120,
        }
    }
}

/// Per-chain configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u32,
    pub name: String,
    /// Blockchain slug the aggregator catalog uses for this chain
    pub slug: String,
    pub family: ChainFamily,
    /// Wrapped-native token treated as equivalent to "native" when bridging
    /// into the pool
    #[serde(default)]
    pub native_alias: Option<String>,
    /// Pool vault account; present only on chains with a native pool contract
    #[serde(default)]
    pub pool_vault: Option<String>,
    /// Network passphrase for contract-id derivation; Stellar only
    #[serde(default)]
    pub stellar_passphrase: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Seed catalog entry; the live catalog is merged on top of these
#[derive(Debug, Clone, Deserialize)]
pub struct TokenSeed {
    pub chain: u32,
    pub address: String,
    pub symbol: String,
    pub decimals: u8,
    /// Canonical pool-ledger asset id
    pub pool_address: String,
}

impl Settings {
    /// Load settings from the configured file, falling back to defaults
    pub fn load() -> Result<Self> {
        match env::var("OMNIPOOL_CONFIG") {
            Ok(path) => Self::load_from(PathBuf::from(path)),
            Err(_) => Ok(Self::default()),
        }
    }

    /// Load settings from a specific TOML file
    pub fn load_from(config_path: PathBuf) -> Result<Self> {
        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        // Substitute environment variables
        let config_str = substitute_env_vars(&config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.enabled_chains().is_empty() {
            anyhow::bail!("At least one chain must be enabled");
        }

        if self.aggregator.base_url.is_empty() {
            anyhow::bail!("Aggregator base URL must be configured");
        }

        if self.pool.rpc_url.is_empty() {
            anyhow::bail!("Pool ledger RPC URL must be configured");
        }

        for (name, chain) in &self.chains {
            if !chain.enabled {
                continue;
            }
            if chain.slug.is_empty() {
                anyhow::bail!("Chain {} has no aggregator slug configured", name);
            }
            if chain.chain_id == self.pool.chain_id {
                anyhow::bail!(
                    "Chain {} reuses the pool ledger chain id {}",
                    name,
                    self.pool.chain_id
                );
            }
            if chain.family == ChainFamily::Stellar && chain.stellar_passphrase.is_none() {
                anyhow::bail!("Stellar chain {} needs a network passphrase", name);
            }
        }

        for token in &self.tokens {
            if token.decimals > 24 {
                anyhow::bail!(
                    "Token {} on chain {} has {} decimals, maximum is 24",
                    token.symbol,
                    token.chain,
                    token.decimals
                );
            }
        }

        Ok(())
    }

    /// Get list of enabled chains
    pub fn enabled_chains(&self) -> Vec<(&String, &ChainConfig)> {
        self.chains.iter().filter(|(_, c)| c.enabled).collect()
    }

    /// Get chain config by chain ID
    pub fn get_chain_by_id(&self, chain_id: u32) -> Option<&ChainConfig> {
        self.chains.values().find(|c| c.chain_id == chain_id)
    }
}

impl Default for Settings {
    fn default() -> Self {
        let mut chains = HashMap::new();

        let evm = |chain_id: u32, name: &str, slug: &str| ChainConfig {
            chain_id,
            name: name.to_string(),
            slug: slug.to_string(),
            family: ChainFamily::Evm,
            native_alias: None,
            pool_vault: None,
            stellar_passphrase: None,
            enabled: true,
        };

        chains.insert("ethereum".to_string(), evm(1, "Ethereum", "eth"));
        chains.insert("optimism".to_string(), evm(10, "Optimism", "op"));
        chains.insert("bnb".to_string(), evm(56, "BNB Chain", "bsc"));
        chains.insert("polygon".to_string(), evm(137, "Polygon", "pol"));
        chains.insert("base".to_string(), evm(8453, "Base", "base"));
        chains.insert("arbitrum".to_string(), evm(42161, "Arbitrum", "arb"));
        chains.insert("avalanche".to_string(), evm(43114, "Avalanche", "avax"));
        chains.insert("gnosis".to_string(), evm(100, "Gnosis", "gnosis"));

        chains.insert(
            "near".to_string(),
            ChainConfig {
                chain_id: 1010,
                name: "NEAR".to_string(),
                slug: "near".to_string(),
                family: ChainFamily::Near,
                native_alias: Some("wrap.near".to_string()),
                pool_vault: Some("intents.near".to_string()),
                stellar_passphrase: None,
                enabled: true,
            },
        );
        chains.insert(
            "solana".to_string(),
            ChainConfig {
                chain_id: 1001,
                name: "Solana".to_string(),
                slug: "sol".to_string(),
                family: ChainFamily::Solana,
                native_alias: None,
                pool_vault: None,
                stellar_passphrase: None,
                enabled: true,
            },
        );
        chains.insert(
            "stellar".to_string(),
            ChainConfig {
                chain_id: 1100,
                name: "Stellar".to_string(),
                slug: "stellar".to_string(),
                family: ChainFamily::Stellar,
                native_alias: None,
                pool_vault: None,
                stellar_passphrase: Some(
                    "Public Global Stellar Network ; September 2015".to_string(),
                ),
                enabled: true,
            },
        );
        chains.insert(
            "ton".to_string(),
            ChainConfig {
                chain_id: 1111,
                name: "TON".to_string(),
                slug: "ton".to_string(),
                family: ChainFamily::Ton,
                native_alias: None,
                pool_vault: None,
                stellar_passphrase: None,
                enabled: true,
            },
        );
        chains.insert(
            "juno".to_string(),
            ChainConfig {
                chain_id: 1119,
                name: "Juno".to_string(),
                slug: "juno".to_string(),
                family: ChainFamily::Cosmos,
                native_alias: None,
                pool_vault: Some(
                    "juno1va9q7gma6l62aqq988gghv4r7u4hnlgm85ssmsdf9ypw77qfwa0qaz7ea4".to_string(),
                ),
                stellar_passphrase: None,
                enabled: true,
            },
        );

        let seed = |chain: u32, address: &str, symbol: &str, decimals: u8, pool: &str| TokenSeed {
            chain,
            address: address.to_string(),
            symbol: symbol.to_string(),
            decimals,
            pool_address: pool.to_string(),
        };

        let tokens = vec![
            seed(1010, "wrap.near", "NEAR", 24, "nep141:wrap.near"),
            seed(
                1010,
                "usdt.tether-token.near",
                "USDT",
                6,
                "nep141:usdt.tether-token.near",
            ),
            seed(1, "native", "ETH", 18, "nep141:eth.omft.near"),
            seed(
                1,
                "0xdac17f958d2ee523a2206206994597c13d831ec7",
                "USDT",
                6,
                "nep141:eth-0xdac17f958d2ee523a2206206994597c13d831ec7.omft.near",
            ),
            seed(
                1,
                "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48",
                "USDC",
                6,
                "nep141:eth-0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48.omft.near",
            ),
            seed(1001, "native", "SOL", 9, "nep141:sol.omft.near"),
            seed(1111, "native", "TON", 9, "nep141:ton.omft.near"),
            seed(1100, "native", "XLM", 7, "nep141:stellar.omft.near"),
            seed(
                1100,
                "GA5ZSEJYB37JRC5AVCIA5MOP4RHTM335X2KGX3IHOJAPP5RE34K4KZVN",
                "USDC",
                7,
                "nep141:stellar-usdc.omft.near",
            ),
        ];

        Self {
            aggregator: AggregatorConfig::default(),
            pool: PoolConfig::default(),
            execution: ExecutionConfig::default(),
            chains,
            tokens,
        }
    }
}

lazy_static! {
    static ref ENV_VAR_RE: regex::Regex =
        regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();

    for cap in ENV_VAR_RE.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_env_var_substitution() {
        env::set_var("TEST_VAR", "test_value");
        let input = "url = \"https://api.example.com/${TEST_VAR}/endpoint\"";
        let result = substitute_env_vars(input);
        assert_eq!(result, "url = \"https://api.example.com/test_value/endpoint\"");
    }

    #[test]
    fn defaults_validate() {
        Settings::default().validate().expect("defaults are valid");
    }

    #[test]
    fn load_from_file_overrides_defaults() {
        env::set_var("TEST_AGG_KEY", "sekret");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[aggregator]
api_key = "${{TEST_AGG_KEY}}"

[execution]
poll_interval_ms = 500

[chains.devnet]
chain_id = 9000
name = "Devnet"
slug = "dev"
family = "evm"
"#
        )
        .unwrap();

        let settings = Settings::load_from(file.path().to_path_buf()).unwrap();
        assert_eq!(settings.aggregator.api_key.as_deref(), Some("sekret"));
        assert_eq!(settings.execution.poll_interval_ms, 500);
        assert!(settings.get_chain_by_id(9000).is_some());
        // untouched sections keep their defaults
        assert_eq!(settings.pool.verifying_contract, "intents.near");
    }

    #[test]
    fn stellar_without_passphrase_is_rejected() {
        let mut settings = Settings::default();
        if let Some(chain) = settings.chains.get_mut("stellar") {
            chain.stellar_passphrase = None;
        }
        assert!(settings.validate().is_err());
    }
}
