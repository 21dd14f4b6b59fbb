//! Known chains
//!
//! A closed table of the chains the wallet can be bound to. Switching to a
//! chain id that is not listed here fails with `Error::UnsupportedChain`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Chain ID constants
pub mod ids {
    pub const GOERLI: u64 = 5;
    pub const OPTIMISM: u64 = 10;
    pub const POLYGON: u64 = 137;
    pub const CELO: u64 = 42220;
}

/// Chains supported out of the box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupportedChain {
    Goerli,
    Optimism,
    Polygon,
    Celo,
}

impl SupportedChain {
    pub fn all() -> &'static [SupportedChain] {
        &[
            SupportedChain::Goerli,
            SupportedChain::Optimism,
            SupportedChain::Polygon,
            SupportedChain::Celo,
        ]
    }

    pub fn chain_id(&self) -> u64 {
        match self {
            SupportedChain::Goerli => ids::GOERLI,
            SupportedChain::Optimism => ids::OPTIMISM,
            SupportedChain::Polygon => ids::POLYGON,
            SupportedChain::Celo => ids::CELO,
        }
    }

    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            SupportedChain::Goerli => "Goerli",
            SupportedChain::Optimism => "Optimism",
            SupportedChain::Polygon => "Polygon",
            SupportedChain::Celo => "Celo",
        }
    }

    pub fn from_chain_id(chain_id: u64) -> Option<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|chain| chain.chain_id() == chain_id)
    }

    /// Like `from_chain_id`, but failing with `UnsupportedChain`
    pub fn lookup(chain_id: u64) -> Result<Self> {
        Self::from_chain_id(chain_id).ok_or(Error::UnsupportedChain(chain_id))
    }
}

/// The `{id, name}` identity bound to one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainContext {
    pub chain_id: u64,
    pub name: String,
}

impl ChainContext {
    pub fn new(chain_id: u64, name: impl Into<String>) -> Self {
        Self {
            chain_id,
            name: name.into(),
        }
    }

    /// Whether the id is outside the known table
    pub fn is_unsupported(&self) -> bool {
        SupportedChain::from_chain_id(self.chain_id).is_none()
    }
}

impl From<SupportedChain> for ChainContext {
    fn from(chain: SupportedChain) -> Self {
        Self::new(chain.chain_id(), chain.name())
    }
}
