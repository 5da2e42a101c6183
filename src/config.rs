use anyhow::{Context, Result, anyhow};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Config {
    pub ipfs_api_url: String,
    pub ipfs_gateways: Vec<String>,
    pub arweave_gateway: String,
    pub http_timeout: Duration,
    pub max_body_bytes: usize,
    pub user_agent: String,
    pub max_concurrent_fetches: usize,
    pub probe_deadline: Duration,
    pub ffprobe_path: PathBuf,
    pub ffprobe_timeout: Duration,
    pub enrich_workers: usize,
    pub ens_graph_url: String,
    pub rpc_endpoints: HashMap<String, Vec<String>>,
    pub rpc_timeout_seconds: u64,
    pub rpc_connect_timeout_seconds: u64,
    pub rpc_failure_threshold: u32,
    pub rpc_failure_cooldown_seconds: u64,
    pub image_keywords: Option<Vec<String>>,
    pub animation_keywords: Option<Vec<String>>,
    pub failure_log_path: Option<PathBuf>,
    pub failure_log_max_bytes: u64,
}

const DEFAULT_IPFS_GATEWAYS: [&str; 3] = [
    "https://ipfs.io/ipfs/",
    "https://cloudflare-ipfs.com/ipfs/",
    "https://dweb.link/ipfs/",
];

const DEFAULT_ENS_GRAPH_URL: &str = "https://api.thegraph.com/subgraphs/name/ensdomains/ens";

impl Config {
    pub fn from_env() -> Result<Self> {
        let ipfs_api_url = trim_base_url(
            env::var("IPFS_API_URL").unwrap_or_else(|_| "https://ipfs.io".to_string()),
        );
        let ipfs_gateways = parse_list_env("IPFS_GATEWAYS")
            .unwrap_or_else(|| {
                DEFAULT_IPFS_GATEWAYS
                    .iter()
                    .map(|gateway| gateway.to_string())
                    .collect()
            })
            .into_iter()
            .map(normalize_gateway)
            .collect::<Vec<_>>();
        if ipfs_gateways.is_empty() {
            return Err(anyhow!("IPFS_GATEWAYS must list at least one gateway"));
        }
        let arweave_gateway = trim_base_url(
            env::var("ARWEAVE_GATEWAY").unwrap_or_else(|_| "https://arweave.net".to_string()),
        );

        let http_timeout = Duration::from_secs(parse_u64("HTTP_TIMEOUT_SECONDS", 20));
        let max_body_bytes = parse_usize("MAX_BODY_BYTES", 8 * 1024 * 1024);
        let user_agent =
            env::var("USER_AGENT").unwrap_or_else(|_| "token-media/0.1".to_string());
        let max_concurrent_fetches = parse_usize("MAX_CONCURRENT_FETCHES", 64);
        let probe_deadline = Duration::from_secs(parse_u64("PROBE_DEADLINE_SECONDS", 30));

        let ffprobe_path =
            PathBuf::from(env::var("FFPROBE_PATH").unwrap_or_else(|_| "ffprobe".to_string()));
        let ffprobe_timeout = Duration::from_secs(parse_u64("FFPROBE_TIMEOUT_SECONDS", 60));
        let enrich_workers = parse_usize("ENRICH_WORKERS", 50);

        let ens_graph_url =
            env::var("ENS_GRAPH_URL").unwrap_or_else(|_| DEFAULT_ENS_GRAPH_URL.to_string());
        let rpc_endpoints = normalize_chain_map(
            parse_json_env::<HashMap<String, Vec<String>>>("RPC_ENDPOINTS").unwrap_or_default(),
        );
        if rpc_endpoints.is_empty() {
            warn!("RPC_ENDPOINTS is empty; on-chain synthesis handlers will fail");
        }
        let rpc_timeout_seconds = parse_u64("RPC_TIMEOUT_SECONDS", 30);
        let rpc_connect_timeout_seconds = parse_u64("RPC_CONNECT_TIMEOUT_SECONDS", 5);
        let rpc_failure_threshold = parse_u32("RPC_FAILURE_THRESHOLD", 3);
        let rpc_failure_cooldown_seconds = parse_u64("RPC_FAILURE_COOLDOWN_SECONDS", 60);

        let image_keywords = parse_list_env("IMAGE_KEYWORDS");
        let animation_keywords = parse_list_env("ANIMATION_KEYWORDS");

        let failure_log_path = env::var("FAILURE_LOG_PATH")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);
        let failure_log_max_bytes = parse_u64("FAILURE_LOG_MAX_BYTES", 1024 * 1024);

        Ok(Self {
            ipfs_api_url,
            ipfs_gateways,
            arweave_gateway,
            http_timeout,
            max_body_bytes,
            user_agent,
            max_concurrent_fetches,
            probe_deadline,
            ffprobe_path,
            ffprobe_timeout,
            enrich_workers,
            ens_graph_url,
            rpc_endpoints,
            rpc_timeout_seconds,
            rpc_connect_timeout_seconds,
            rpc_failure_threshold,
            rpc_failure_cooldown_seconds,
            image_keywords,
            animation_keywords,
            failure_log_path,
            failure_log_max_bytes,
        })
    }

    /// A configuration with defaults only; no environment access.
    pub fn defaults() -> Self {
        Self {
            ipfs_api_url: "https://ipfs.io".to_string(),
            ipfs_gateways: DEFAULT_IPFS_GATEWAYS
                .iter()
                .map(|gateway| gateway.to_string())
                .collect(),
            arweave_gateway: "https://arweave.net".to_string(),
            http_timeout: Duration::from_secs(20),
            max_body_bytes: 8 * 1024 * 1024,
            user_agent: "token-media/0.1".to_string(),
            max_concurrent_fetches: 64,
            probe_deadline: Duration::from_secs(30),
            ffprobe_path: PathBuf::from("ffprobe"),
            ffprobe_timeout: Duration::from_secs(60),
            enrich_workers: 50,
            ens_graph_url: DEFAULT_ENS_GRAPH_URL.to_string(),
            rpc_endpoints: HashMap::new(),
            rpc_timeout_seconds: 30,
            rpc_connect_timeout_seconds: 5,
            rpc_failure_threshold: 3,
            rpc_failure_cooldown_seconds: 60,
            image_keywords: None,
            animation_keywords: None,
            failure_log_path: None,
            failure_log_max_bytes: 1024 * 1024,
        }
    }

    pub fn rpc_urls(&self, chain: &str) -> Result<&[String]> {
        self.rpc_endpoints
            .get(&chain.to_ascii_lowercase())
            .map(|urls| urls.as_slice())
            .filter(|urls| !urls.is_empty())
            .with_context(|| format!("no rpc endpoints configured for {chain}"))
    }
}

fn trim_base_url(value: String) -> String {
    value.trim().trim_end_matches('/').to_string()
}

fn normalize_gateway(value: String) -> String {
    let trimmed = value.trim().trim_end_matches('/');
    if trimmed.ends_with("/ipfs") {
        format!("{trimmed}/")
    } else {
        format!("{trimmed}/ipfs/")
    }
}

fn parse_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

fn parse_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

fn parse_json_env<T: DeserializeOwned>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(error = ?err, key, "ignoring unparseable json env value");
            None
        }
    }
}

fn normalize_chain_map<T>(map: HashMap<String, T>) -> HashMap<String, T> {
    let mut normalized = HashMap::new();
    for (key, value) in map {
        normalized.insert(key.to_ascii_lowercase(), value);
    }
    normalized
}

fn parse_list_env(key: &str) -> Option<Vec<String>> {
    let raw = env::var(key).ok()?;
    if raw.trim_start().starts_with('[') {
        serde_json::from_str(&raw).ok()
    } else {
        let list = raw
            .split(',')
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect::<Vec<_>>();
        if list.is_empty() { None } else { Some(list) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn with_env_lock<F: FnOnce()>(f: F) {
        let lock = ENV_LOCK.get_or_init(|| Mutex::new(()));
        let _guard = lock.lock().unwrap_or_else(|err| err.into_inner());
        f();
    }

    #[test]
    fn parse_list_env_csv() {
        with_env_lock(|| {
            unsafe { env::set_var("IMAGE_KEYWORDS", "image, image_url , ,thumbnail") };
            let list = parse_list_env("IMAGE_KEYWORDS").unwrap();
            assert_eq!(list, vec!["image", "image_url", "thumbnail"]);
            unsafe { env::remove_var("IMAGE_KEYWORDS") };
        });
    }

    #[test]
    fn parse_list_env_json() {
        with_env_lock(|| {
            unsafe { env::set_var("ANIMATION_KEYWORDS", r#"["animation","video"]"#) };
            let list = parse_list_env("ANIMATION_KEYWORDS").unwrap();
            assert_eq!(list, vec!["animation", "video"]);
            unsafe { env::remove_var("ANIMATION_KEYWORDS") };
        });
    }

    #[test]
    fn gateways_are_normalized() {
        assert_eq!(
            normalize_gateway("https://gw.example".to_string()),
            "https://gw.example/ipfs/"
        );
        assert_eq!(
            normalize_gateway("https://gw.example/ipfs/".to_string()),
            "https://gw.example/ipfs/"
        );
    }

    #[test]
    fn from_env_uses_defaults() {
        with_env_lock(|| {
            unsafe { env::remove_var("IPFS_GATEWAYS") };
            unsafe { env::remove_var("ENRICH_WORKERS") };
            unsafe { env::remove_var("FAILURE_LOG_PATH") };
            let config = Config::from_env().unwrap();
            assert_eq!(config.ipfs_gateways.len(), DEFAULT_IPFS_GATEWAYS.len());
            assert_eq!(config.enrich_workers, 50);
            assert!(config.failure_log_path.is_none());
        });
    }

    #[test]
    fn from_env_parses_rpc_endpoints() {
        with_env_lock(|| {
            unsafe { env::set_var("RPC_ENDPOINTS", r#"{"Ethereum":["https://rpc.example"]}"#) };
            let config = Config::from_env().unwrap();
            assert_eq!(
                config.rpc_urls("ethereum").unwrap(),
                &["https://rpc.example".to_string()]
            );
            assert!(config.rpc_urls("base").is_err());
            unsafe { env::remove_var("RPC_ENDPOINTS") };
        });
    }
}
