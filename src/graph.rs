use crate::capabilities::GraphLookup;
use crate::config::Config;
use crate::error::MediaError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

/// POSTs GraphQL documents to the configured graph index.
#[derive(Clone)]
pub struct GraphClient {
    client: reqwest::Client,
    endpoint: String,
}

impl GraphClient {
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .context("build graph client")?;
        Ok(Self {
            client,
            endpoint: config.ens_graph_url.clone(),
        })
    }
}

#[async_trait]
impl GraphLookup for GraphClient {
    async fn query(&self, query: &str) -> Result<Value, MediaError> {
        debug!(endpoint = %self.endpoint, "graph query");
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request_body(query))
            .send()
            .await
            .map_err(|err| MediaError::transport(&self.endpoint, err))?;
        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::transport(
                &self.endpoint,
                format!("graph returned {status}"),
            ));
        }
        response
            .json::<Value>()
            .await
            .map_err(|err| MediaError::transport(&self.endpoint, err))
    }
}

fn request_body(query: &str) -> Value {
    json!({ "query": query })
}
