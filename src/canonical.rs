use crate::token::Chain;
use ethers::types::{Address, U256};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CanonicalizeError {
    #[error("invalid chain")]
    InvalidChain,
    #[error("unknown chain")]
    UnknownChain,
    #[error("invalid contract address")]
    InvalidContractAddress,
    #[error("invalid token id")]
    InvalidTokenId,
}

/// EVM addresses become lowercase `0x` hex; Tezos addresses are case-sensitive
/// base58 and are only trimmed.
pub fn canonicalize_contract_address(
    address: &str,
    chain: Chain,
) -> Result<String, CanonicalizeError> {
    let trimmed = address.trim();
    if !chain.is_evm() {
        if trimmed.is_empty()
            || trimmed.len() > 64
            || !trimmed.chars().all(|ch| ch.is_ascii_alphanumeric())
        {
            return Err(CanonicalizeError::InvalidContractAddress);
        }
        return Ok(trimmed.to_string());
    }
    let addr =
        Address::from_str(trimmed).map_err(|_| CanonicalizeError::InvalidContractAddress)?;
    Ok(format!("{:#x}", addr))
}

/// Accepts decimal or `0x`-prefixed hex token ids.
pub fn parse_token_id(raw: &str) -> Result<U256, CanonicalizeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CanonicalizeError::InvalidTokenId);
    }
    match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => U256::from_str_radix(hex, 16).map_err(|_| CanonicalizeError::InvalidTokenId),
        None => U256::from_dec_str(trimmed).map_err(|_| CanonicalizeError::InvalidTokenId),
    }
}
