use crate::canonical::{CanonicalizeError, canonicalize_contract_address, parse_token_id};
use ethers::types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Arbitrary nested JSON metadata, either fetched off-chain or synthesized.
pub type TokenMetadata = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Ethereum,
    Polygon,
    Optimism,
    Arbitrum,
    Base,
    Zora,
    Tezos,
}

impl Chain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Polygon => "polygon",
            Chain::Optimism => "optimism",
            Chain::Arbitrum => "arbitrum",
            Chain::Base => "base",
            Chain::Zora => "zora",
            Chain::Tezos => "tezos",
        }
    }

    pub fn is_evm(&self) -> bool {
        !matches!(self, Chain::Tezos)
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chain {
    type Err = CanonicalizeError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "ethereum" | "eth" | "mainnet" => Ok(Chain::Ethereum),
            "polygon" | "matic" => Ok(Chain::Polygon),
            "optimism" => Ok(Chain::Optimism),
            "arbitrum" => Ok(Chain::Arbitrum),
            "base" => Ok(Chain::Base),
            "zora" => Ok(Chain::Zora),
            "tezos" => Ok(Chain::Tezos),
            "" => Err(CanonicalizeError::InvalidChain),
            _ => Err(CanonicalizeError::UnknownChain),
        }
    }
}

/// The unit of work for the pipeline: one token of one contract on one chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenIdentifier {
    pub contract_address: String,
    pub chain: Chain,
    pub token_id: U256,
}

impl TokenIdentifier {
    pub fn new(
        contract_address: &str,
        chain: Chain,
        token_id: U256,
    ) -> Result<Self, CanonicalizeError> {
        Ok(Self {
            contract_address: canonicalize_contract_address(contract_address, chain)?,
            chain,
            token_id,
        })
    }

    pub fn parse(
        contract_address: &str,
        chain: &str,
        token_id: &str,
    ) -> Result<Self, CanonicalizeError> {
        let chain = chain.parse::<Chain>()?;
        Self::new(contract_address, chain, parse_token_id(token_id)?)
    }
}

impl fmt::Display for TokenIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.chain, self.contract_address, self.token_id)
    }
}
