//! Cache-fronted blacklist oracle.
//!
//! The provider serves the full list as JSON; we cache it for an hour and
//! scan linearly per lookup. When a refresh fails we keep answering from the
//! stale copy; with no copy at all the check fails closed (retryable), so an
//! unreachable provider can never wave a banned address through.

use async_trait::async_trait;
use eyre::WrapErr;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use pawchain_rs::types::NativeAddress;

use crate::error::{BridgeError, BridgeResult};

const CACHE_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Deserialize)]
pub struct BlacklistEntry {
    pub address: String,
    #[serde(default)]
    pub alias: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Oracle capability; tests use a fixed list.
#[async_trait]
pub trait BlacklistOracle: Send + Sync {
    async fn entry(&self, native: &NativeAddress) -> BridgeResult<Option<BlacklistEntry>>;
}

struct Cache {
    fetched_at: Instant,
    entries: Vec<BlacklistEntry>,
}

pub struct HttpBlacklistOracle {
    http: reqwest::Client,
    url: String,
    cache: RwLock<Option<Cache>>,
}

impl HttpBlacklistOracle {
    pub fn new(url: &str) -> eyre::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .wrap_err("Failed to build HTTP client")?;
        Ok(Self {
            http,
            url: url.to_string(),
            cache: RwLock::new(None),
        })
    }

    async fn fetch(&self) -> eyre::Result<Vec<BlacklistEntry>> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .wrap_err("blacklist fetch failed")?;
        if !response.status().is_success() {
            return Err(eyre::eyre!(
                "blacklist provider returned status {}",
                response.status()
            ));
        }
        response
            .json::<Vec<BlacklistEntry>>()
            .await
            .wrap_err("blacklist response is not a JSON array")
    }

    async fn entries(&self) -> BridgeResult<Vec<BlacklistEntry>> {
        {
            let cache = self.cache.read().await;
            if let Some(cache) = cache.as_ref() {
                if cache.fetched_at.elapsed() < CACHE_TTL {
                    return Ok(cache.entries.clone());
                }
            }
        }

        match self.fetch().await {
            Ok(entries) => {
                tracing::debug!(count = entries.len(), "blacklist refreshed");
                let mut cache = self.cache.write().await;
                *cache = Some(Cache {
                    fetched_at: Instant::now(),
                    entries: entries.clone(),
                });
                Ok(entries)
            }
            Err(e) => {
                let cache = self.cache.read().await;
                if let Some(cache) = cache.as_ref() {
                    tracing::warn!(error = %e, "blacklist refresh failed, serving stale copy");
                    return Ok(cache.entries.clone());
                }
                Err(BridgeError::External(e))
            }
        }
    }
}

#[async_trait]
impl BlacklistOracle for HttpBlacklistOracle {
    async fn entry(&self, native: &NativeAddress) -> BridgeResult<Option<BlacklistEntry>> {
        let entries = self.entries().await?;
        Ok(entries
            .into_iter()
            .find(|entry| entry.address == native.as_str()))
    }
}
