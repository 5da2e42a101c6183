use crate::capabilities::ReadOnChain;
use crate::config::Config;
use crate::error::MediaError;
use crate::token::{Chain, TokenIdentifier};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use ethers::prelude::*;
use std::collections::HashMap;
use std::future::Future;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::warn;
use url::Url;

abigen!(
    Erc721Metadata,
    r#"[
        function tokenURI(uint256 tokenId) view returns (string)
    ]"#
);

abigen!(
    CryptopunksData,
    r#"[
        function punkImageSvg(uint16 index) view returns (string)
    ]"#
);

abigen!(
    ZoraMedia,
    r#"[
        function tokenMetadataURI(uint256 tokenId) view returns (string)
    ]"#
);

pub const CRYPTOPUNKS_DATA_ADDRESS: &str = "0x16f5a35647d6f03d5d3da7b35409d65ba03af3b2";

/// ethers-backed contract reads with per-endpoint failover and cooldown.
#[derive(Clone)]
pub struct ChainClient {
    config: Arc<Config>,
    providers: Arc<Mutex<HashMap<String, Arc<Provider<Http>>>>>,
    endpoint_health: Arc<Mutex<HashMap<String, EndpointHealth>>>,
}

#[derive(Debug, Clone)]
struct EndpointHealth {
    failures: u32,
    cooldown_until: Option<Instant>,
}

impl ChainClient {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            providers: Arc::new(Mutex::new(HashMap::new())),
            endpoint_health: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn get_token_uri(
        &self,
        chain: Chain,
        contract: &str,
        token_id: U256,
    ) -> Result<String> {
        let contract = Address::from_str(contract).context("invalid contract address")?;
        let response = self
            .call_with_failover(chain, move |provider| {
                let contract = Erc721Metadata::new(contract, provider);
                async move {
                    contract
                        .token_uri(token_id)
                        .call()
                        .await
                        .map_err(|err| err.into())
                }
            })
            .await?;
        Ok(strip_nul(response))
    }

    pub async fn get_punk_image_svg(&self, punk_index: u16) -> Result<String> {
        let data_contract = Address::from_str(CRYPTOPUNKS_DATA_ADDRESS)?;
        self.call_with_failover(Chain::Ethereum, move |provider| {
            let contract = CryptopunksData::new(data_contract, provider);
            async move {
                contract
                    .punk_image_svg(punk_index)
                    .call()
                    .await
                    .map_err(|err| err.into())
            }
        })
        .await
    }

    pub async fn get_token_metadata_uri(
        &self,
        chain: Chain,
        contract: &str,
        token_id: U256,
    ) -> Result<String> {
        let contract = Address::from_str(contract).context("invalid contract address")?;
        let response = self
            .call_with_failover(chain, move |provider| {
                let contract = ZoraMedia::new(contract, provider);
                async move {
                    contract
                        .token_metadata_uri(token_id)
                        .call()
                        .await
                        .map_err(|err| err.into())
                }
            })
            .await?;
        Ok(strip_nul(response))
    }

    async fn call_with_failover<T, F, Fut>(&self, chain: Chain, f: F) -> Result<T>
    where
        F: Fn(Arc<Provider<Http>>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let endpoints = self.config.rpc_urls(chain.as_str())?;
        let now = Instant::now();
        let mut available = Vec::new();
        let mut cooldown = Vec::new();
        for endpoint in endpoints {
            if self.is_endpoint_on_cooldown(endpoint, now) {
                cooldown.push(endpoint);
            } else {
                available.push(endpoint);
            }
        }
        if available.is_empty() {
            available = cooldown;
        }
        let mut last_err: Option<anyhow::Error> = None;
        for endpoint in available {
            let provider = match self.provider_for_url(endpoint) {
                Ok(provider) => provider,
                Err(err) => {
                    self.record_endpoint_failure(endpoint);
                    last_err = Some(anyhow!("rpc endpoint {} init failed: {}", endpoint, err));
                    continue;
                }
            };
            match f(provider).await {
                Ok(result) => {
                    self.record_endpoint_success(endpoint);
                    return Ok(result);
                }
                Err(err) => {
                    warn!(chain = %chain, endpoint = %endpoint, error = %err, "rpc call failed");
                    self.record_endpoint_failure(endpoint);
                    last_err = Some(anyhow!("rpc endpoint {} failed: {}", endpoint, err));
                }
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow!("rpc call failed for {chain}")))
    }

    fn is_endpoint_on_cooldown(&self, url: &str, now: Instant) -> bool {
        let mut map = self
            .endpoint_health
            .lock()
            .unwrap_or_else(|err| err.into_inner());
        if let Some(entry) = map.get_mut(url) {
            if let Some(until) = entry.cooldown_until {
                if until > now {
                    return true;
                }
                entry.cooldown_until = None;
            }
        }
        false
    }

    fn record_endpoint_failure(&self, url: &str) {
        if self.config.rpc_failure_threshold == 0 || self.config.rpc_failure_cooldown_seconds == 0 {
            return;
        }
        let mut map = self
            .endpoint_health
            .lock()
            .unwrap_or_else(|err| err.into_inner());
        let entry = map.entry(url.to_string()).or_insert(EndpointHealth {
            failures: 0,
            cooldown_until: None,
        });
        entry.failures = entry.failures.saturating_add(1);
        if entry.failures >= self.config.rpc_failure_threshold {
            entry.failures = 0;
            entry.cooldown_until = Some(
                Instant::now() + Duration::from_secs(self.config.rpc_failure_cooldown_seconds),
            );
        }
    }

    fn record_endpoint_success(&self, url: &str) {
        let mut map = self
            .endpoint_health
            .lock()
            .unwrap_or_else(|err| err.into_inner());
        if let Some(entry) = map.get_mut(url) {
            entry.failures = 0;
            entry.cooldown_until = None;
        }
    }

    fn provider_for_url(&self, url: &str) -> Result<Arc<Provider<Http>>> {
        if let Some(provider) = self
            .providers
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .get(url)
            .cloned()
        {
            return Ok(provider);
        }
        let client = reqwest11::Client::builder()
            .timeout(Duration::from_secs(self.config.rpc_timeout_seconds))
            .connect_timeout(Duration::from_secs(self.config.rpc_connect_timeout_seconds))
            .build()
            .context("build rpc http client")?;
        let parsed = Url::parse(url).context("invalid rpc url")?;
        let http = Http::new_with_client(parsed, client);
        let provider = Arc::new(Provider::new(http));
        self.providers
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .insert(url.to_string(), provider.clone());
        Ok(provider)
    }
}

#[async_trait]
impl ReadOnChain for ChainClient {
    async fn token_uri(&self, token: &TokenIdentifier) -> Result<String, MediaError> {
        self.get_token_uri(token.chain, &token.contract_address, token.token_id)
            .await
            .map_err(|err| MediaError::transport(token.to_string(), format!("{err:#}")))
    }

    async fn punk_image_svg(&self, punk_index: u16) -> Result<String, MediaError> {
        self.get_punk_image_svg(punk_index)
            .await
            .map_err(|err| {
                MediaError::transport(format!("cryptopunks:{punk_index}"), format!("{err:#}"))
            })
    }

    async fn token_metadata_uri(&self, token: &TokenIdentifier) -> Result<String, MediaError> {
        self.get_token_metadata_uri(token.chain, &token.contract_address, token.token_id)
            .await
            .map_err(|err| MediaError::transport(token.to_string(), format!("{err:#}")))
    }
}

fn strip_nul(value: String) -> String {
    if value.contains('\0') {
        value.replace('\0', "")
    } else {
        value
    }
}
