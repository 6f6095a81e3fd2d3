//! Chain families and the chain registry
//!
//! Every chain the engine touches is described by a [`crate::config::ChainConfig`]
//! entry; this module provides the typed view over those entries. The pool
//! ledger itself is addressed as a virtual chain with its own id.

use crate::config::{ChainConfig, Settings};
use crate::error::{BridgeError, BridgeResult};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Wallet capability family a chain belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
    Evm,
    Near,
    Solana,
    Cosmos,
    Stellar,
    Ton,
}

impl fmt::Display for ChainFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChainFamily::Evm => "evm",
            ChainFamily::Near => "near",
            ChainFamily::Solana => "solana",
            ChainFamily::Cosmos => "cosmos",
            ChainFamily::Stellar => "stellar",
            ChainFamily::Ton => "ton",
        };
        f.write_str(name)
    }
}

struct Inner {
    pool_chain: u32,
    by_id: HashMap<u32, ChainConfig>,
    by_slug: HashMap<String, u32>,
}

/// Cheaply cloneable lookup table over the configured chains
#[derive(Clone)]
pub struct ChainRegistry {
    inner: Arc<Inner>,
}

impl ChainRegistry {
    /// Build the registry from enabled chains in settings
    pub fn new(settings: &Settings) -> Self {
        let mut by_id = HashMap::new();
        let mut by_slug = HashMap::new();

        for (_, chain) in settings.enabled_chains() {
            by_slug.insert(chain.slug.clone(), chain.chain_id);
            by_id.insert(chain.chain_id, chain.clone());
        }

        Self {
            inner: Arc::new(Inner {
                pool_chain: settings.pool.chain_id,
                by_id,
                by_slug,
            }),
        }
    }

    /// Chain id of the virtual pool-ledger chain
    pub fn pool_chain(&self) -> u32 {
        self.inner.pool_chain
    }

    /// Whether a chain id addresses the pool ledger itself
    pub fn is_pool(&self, chain_id: u32) -> bool {
        chain_id == self.inner.pool_chain
    }

    /// Whether a chain has a native pool vault (direct deposit/withdraw capable)
    pub fn is_direct(&self, chain_id: u32) -> bool {
        self.get(chain_id)
            .map(|c| c.pool_vault.is_some())
            .unwrap_or(false)
    }

    pub fn get(&self, chain_id: u32) -> Option<&ChainConfig> {
        self.inner.by_id.get(&chain_id)
    }

    /// Config for a chain, failing when unknown
    pub fn require(&self, chain_id: u32) -> BridgeResult<&ChainConfig> {
        self.get(chain_id)
            .ok_or(BridgeError::ChainNotFound { chain_id })
    }

    /// Capability family for a chain
    pub fn family(&self, chain_id: u32) -> Option<ChainFamily> {
        self.get(chain_id).map(|c| c.family)
    }

    /// Pool vault account for a direct-capable chain
    pub fn pool_vault(&self, chain_id: u32) -> Option<&str> {
        self.get(chain_id).and_then(|c| c.pool_vault.as_deref())
    }

    /// Wrapped-native alias for a chain (e.g. `wrap.near`)
    pub fn native_alias(&self, chain_id: u32) -> Option<&str> {
        self.get(chain_id).and_then(|c| c.native_alias.as_deref())
    }

    /// Stellar network passphrase, present only on Stellar entries
    pub fn stellar_passphrase(&self, chain_id: u32) -> Option<&str> {
        self.get(chain_id)
            .and_then(|c| c.stellar_passphrase.as_deref())
    }

    /// Resolve an aggregator blockchain slug to a chain id
    pub fn chain_for_slug(&self, slug: &str) -> Option<u32> {
        self.inner.by_slug.get(slug).copied()
    }

    /// Aggregator blockchain slug for a chain id
    pub fn slug(&self, chain_id: u32) -> Option<&str> {
        self.get(chain_id).map(|c| c.slug.as_str())
    }

    /// All registered chain ids
    pub fn chain_ids(&self) -> Vec<u32> {
        self.inner.by_id.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    #[test]
    fn registry_resolves_families_and_slugs() {
        let settings = Settings::default();
        let chains = ChainRegistry::new(&settings);

        assert_eq!(chains.family(1), Some(ChainFamily::Evm));
        let near = chains.chain_for_slug("near").expect("near chain configured");
        assert_eq!(chains.family(near), Some(ChainFamily::Near));
        assert_eq!(chains.native_alias(near), Some("wrap.near"));
        assert!(chains.is_direct(near));
        assert!(chains.is_pool(settings.pool.chain_id));
        assert!(!chains.is_direct(1));
    }
}
