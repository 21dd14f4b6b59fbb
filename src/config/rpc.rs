//! RPC endpoint configuration
//!
//! Resolution order for each supported chain:
//! 1. Per-chain env vars (GOERLI_RPC_URL, OPTIMISM_RPC_URL, ...) - highest priority
//! 2. ALCHEMY_API_KEY - builds URLs for every chain Alchemy serves
//! 3. Public RPC fallbacks - for testing only
//!
//! # Examples
//!
//! ```bash
//! # Option 1: Per-chain URLs (recommended for production)
//! export POLYGON_RPC_URL="https://polygon-mainnet.g.alchemy.com/v2/YOUR_KEY"
//!
//! # Option 2: Single provider API key
//! export ALCHEMY_API_KEY="YOUR_KEY"
//!
//! # Option 3: No env vars - uses public RPCs (rate limited, for testing only)
//! ```

use crate::chains::SupportedChain;
use std::collections::BTreeMap;

/// RPC configuration for the supported chains
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RpcConfig {
    /// RPC URLs indexed by chain ID
    urls: BTreeMap<u64, String>,
}

/// Environment variable names
pub mod env_vars {
    pub const GOERLI_RPC_URL: &str = "GOERLI_RPC_URL";
    pub const OPTIMISM_RPC_URL: &str = "OPTIMISM_RPC_URL";
    pub const POLYGON_RPC_URL: &str = "POLYGON_RPC_URL";
    pub const CELO_RPC_URL: &str = "CELO_RPC_URL";

    pub const ALCHEMY_API_KEY: &str = "ALCHEMY_API_KEY";
}

/// Public RPC endpoints (rate limited, for testing only)
mod public_rpcs {
    pub const GOERLI: &str = "https://rpc.ankr.com/eth_goerli";
    pub const OPTIMISM: &str = "https://mainnet.optimism.io";
    pub const POLYGON: &str = "https://polygon-rpc.com";
    pub const CELO: &str = "https://forno.celo.org";
}

fn url_var(chain: SupportedChain) -> &'static str {
    match chain {
        SupportedChain::Goerli => env_vars::GOERLI_RPC_URL,
        SupportedChain::Optimism => env_vars::OPTIMISM_RPC_URL,
        SupportedChain::Polygon => env_vars::POLYGON_RPC_URL,
        SupportedChain::Celo => env_vars::CELO_RPC_URL,
    }
}

fn public_rpc(chain: SupportedChain) -> &'static str {
    match chain {
        SupportedChain::Goerli => public_rpcs::GOERLI,
        SupportedChain::Optimism => public_rpcs::OPTIMISM,
        SupportedChain::Polygon => public_rpcs::POLYGON,
        SupportedChain::Celo => public_rpcs::CELO,
    }
}

/// Alchemy has no Celo network
fn alchemy_url(chain: SupportedChain, key: &str) -> Option<String> {
    let network = match chain {
        SupportedChain::Goerli => "eth-goerli",
        SupportedChain::Optimism => "opt-mainnet",
        SupportedChain::Polygon => "polygon-mainnet",
        SupportedChain::Celo => return None,
    };
    Some(format!("https://{}.g.alchemy.com/v2/{}", network, key))
}

impl RpcConfig {
    /// Create RPC config from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve URLs through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let alchemy_key = lookup(env_vars::ALCHEMY_API_KEY);
        let mut urls = BTreeMap::new();

        for chain in SupportedChain::all() {
            let var = url_var(*chain);
            let url = if let Some(url) = lookup(var) {
                tracing::debug!("Using {} for {}", var, chain.name());
                url
            } else if let Some(url) = alchemy_key
                .as_deref()
                .and_then(|key| alchemy_url(*chain, key))
            {
                tracing::debug!("Using ALCHEMY_API_KEY for {}", chain.name());
                url
            } else {
                tracing::debug!(
                    "No RPC configured for {}, using public RPC (rate limited)",
                    chain.name()
                );
                public_rpc(*chain).to_string()
            };
            urls.insert(chain.chain_id(), url);
        }

        Self { urls }
    }

    /// Create with explicit RPC URLs
    pub fn with_urls(urls: BTreeMap<u64, String>) -> Self {
        Self { urls }
    }

    /// Get RPC URL for a chain
    pub fn get(&self, chain_id: u64) -> Option<&str> {
        self.urls.get(&chain_id).map(|s| s.as_str())
    }

    /// Get all configured chain IDs
    pub fn chains(&self) -> impl Iterator<Item = &u64> {
        self.urls.keys()
    }

    pub fn has_chain(&self, chain_id: u64) -> bool {
        self.urls.contains_key(&chain_id)
    }

    pub fn into_urls(self) -> BTreeMap<u64, String> {
        self.urls
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::ids;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_public_rpc_fallbacks() {
        let config = RpcConfig::from_lookup(lookup_from(&[]));

        for chain in SupportedChain::all() {
            assert!(config.has_chain(chain.chain_id()));
        }
        assert_eq!(config.get(ids::CELO), Some(public_rpcs::CELO));
        assert_eq!(config.get(ids::GOERLI), Some(public_rpcs::GOERLI));
    }

    #[test]
    fn test_per_chain_var_beats_alchemy() {
        let config = RpcConfig::from_lookup(lookup_from(&[
            (env_vars::POLYGON_RPC_URL, "https://custom.polygon"),
            (env_vars::ALCHEMY_API_KEY, "abc"),
        ]));

        assert_eq!(config.get(ids::POLYGON), Some("https://custom.polygon"));
        assert_eq!(
            config.get(ids::OPTIMISM),
            Some("https://opt-mainnet.g.alchemy.com/v2/abc")
        );
        // Alchemy does not serve Celo
        assert_eq!(config.get(ids::CELO), Some(public_rpcs::CELO));
    }

    #[test]
    fn test_blank_values_are_ignored() {
        let config = RpcConfig::from_lookup(lookup_from(&[(env_vars::GOERLI_RPC_URL, "  ")]));
        assert_eq!(config.get(ids::GOERLI), Some(public_rpcs::GOERLI));
    }

    #[test]
    fn test_get_returns_url() {
        let mut urls = BTreeMap::new();
        urls.insert(5, "https://custom.rpc".to_string());
        let config = RpcConfig::with_urls(urls);

        assert_eq!(config.get(5), Some("https://custom.rpc"));
        assert_eq!(config.get(999), None);
    }
}
