//! HTTP Cache - REST Key-Value Store
//!
//! Client for key-value services that expose Redis commands over HTTP, one
//! command per request with the arguments as path segments:
//!
//! ```text
//! GET  {base}/GET/{key}                 -> {"result": "<payload>" | null}
//! POST {base}/SET/{key}/{value}[/EX/n]  -> {"result": "OK"}
//! POST {base}/DEL/{key}[/{key}...]      -> {"result": <removed>}
//! GET  {base}/SCAN/{cursor}/MATCH/{p}/COUNT/{n} -> {"result": [cursor, [keys]]}
//! ```
//!
//! Every request carries `Authorization: Bearer {token}`. Errors are reported
//! as `{"error": "..."}` bodies or non-2xx statuses.

use anyhow::{Context, Result};
use reqwest::{Client, Method, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::HttpCacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::key::is_pattern;

/// Keys requested per `SCAN` page, and keys per `DEL` batch
const SCAN_BATCH: usize = 100;

#[derive(Debug, Deserialize)]
struct RestResponse<T> {
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct RestError {
    error: String,
}

/// REST key-value client
///
/// Pattern deletes are done client-side: the matching keys are enumerated
/// with `SCAN` and deleted in batches. This is not atomic; a key written
/// between the scan and the delete survives the invalidation.
///
/// # Example
///
/// ```rust,no_run
/// use entity_cache::backends::HttpCache;
/// use entity_cache::config::HttpCacheConfig;
///
/// # fn example() -> anyhow::Result<()> {
/// let store = HttpCache::new(HttpCacheConfig::new("https://cache.example.com", "secret"))?;
/// # Ok(())
/// # }
/// ```
pub struct HttpCache {
    client: Client,
    base_url: Url,
    token: String,
}

impl HttpCache {
    /// Create a client for `config.base_url`
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the HTTP client cannot be built.
    pub fn new(config: HttpCacheConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("Invalid cache REST URL: {}", config.base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("Cache REST URL cannot carry a path: {base_url}");
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to build HTTP client for cache REST API")?;

        info!(base_url = %base_url, "Initializing HTTP cache store");

        Ok(Self {
            client,
            base_url,
            token: config.token,
        })
    }

    fn command_url(&self, segments: &[&str]) -> CacheResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| CacheError::Backend(format!("base URL cannot carry a path: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send one command and return the raw body of a successful response
    async fn execute(&self, command: &'static str, method: Method, segments: &[&str]) -> CacheResult<Vec<u8>> {
        let url = self.command_url(segments)?;
        let response = self
            .client
            .request(method, url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?.to_vec();

        if let Ok(RestError { error }) = serde_json::from_slice::<RestError>(&body) {
            return Err(CacheError::Backend(format!("{command}: {error}")));
        }
        if !status.is_success() {
            return Err(CacheError::UnexpectedStatus {
                command,
                status: status.as_u16(),
            });
        }
        Ok(body)
    }

    fn parse_result<T: DeserializeOwned>(body: &[u8]) -> CacheResult<Option<T>> {
        let response: RestResponse<T> = serde_json::from_slice(body)?;
        Ok(response.result)
    }

    /// Enumerate keys matching `pattern` with cursor-based `SCAN`
    ///
    /// # Errors
    ///
    /// Transport failures or a malformed `SCAN` reply.
    pub async fn scan_keys(&self, pattern: &str) -> CacheResult<Vec<String>> {
        let count = SCAN_BATCH.to_string();
        let mut cursor = "0".to_string();
        let mut keys = Vec::new();

        loop {
            let body = self
                .execute("SCAN", Method::GET, &["SCAN", &cursor, "MATCH", pattern, "COUNT", &count])
                .await?;
            let Some((next, batch)) = Self::parse_result::<(serde_json::Value, Vec<String>)>(&body)? else {
                break;
            };

            keys.extend(batch);
            cursor = match next {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            if cursor == "0" {
                break;
            }
        }

        debug!(pattern = %pattern, count = keys.len(), "[HTTP] Scanned keys matching pattern");
        Ok(keys)
    }

    /// Delete several keys in one `DEL`
    ///
    /// # Errors
    ///
    /// Transport failures.
    pub async fn remove_bulk(&self, keys: &[String]) -> CacheResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut segments = Vec::with_capacity(keys.len() + 1);
        segments.push("DEL");
        segments.extend(keys.iter().map(String::as_str));

        let body = self.execute("DEL", Method::POST, &segments).await?;
        // The reply body is opaque; a count is used when the server sends one
        Ok(Self::parse_result::<u64>(&body).ok().flatten().unwrap_or(0))
    }
}

// ===== Trait Implementations =====

use crate::traits::RemoteStore;
use async_trait::async_trait;

#[async_trait]
impl RemoteStore for HttpCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let body = self.execute("GET", Method::GET, &["GET", key]).await?;
        Self::parse_result::<String>(&body)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()> {
        match ttl {
            Some(ttl) => {
                let secs = ttl.as_secs().max(1).to_string();
                self.execute("SET", Method::POST, &["SET", key, value, "EX", &secs])
                    .await?;
            }
            None => {
                self.execute("SET", Method::POST, &["SET", key, value]).await?;
            }
        }
        debug!(key = %key, "[HTTP] Stored key");
        Ok(())
    }

    async fn delete(&self, key_or_pattern: &str) -> CacheResult<u64> {
        if is_pattern(key_or_pattern) {
            let keys = self.scan_keys(key_or_pattern).await?;
            let mut removed = 0;
            for chunk in keys.chunks(SCAN_BATCH) {
                removed += self.remove_bulk(chunk).await?;
            }
            debug!(pattern = %key_or_pattern, count = removed, "[HTTP] Removed keys matching pattern");
            Ok(removed)
        } else {
            self.remove_bulk(&[key_or_pattern.to_string()]).await
        }
    }

    async fn health_check(&self) -> bool {
        let test_key = format!("health_check:{}", Uuid::new_v4());

        match self.set(&test_key, "ok", Some(Duration::from_secs(10))).await {
            Ok(()) => match self.get(&test_key).await {
                Ok(Some(retrieved)) => {
                    let _ = self.delete(&test_key).await;
                    retrieved == "ok"
                }
                _ => false,
            },
            Err(_) => false,
        }
    }

    fn name(&self) -> &'static str {
        "HTTP"
    }
}
