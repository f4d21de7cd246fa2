/*
 * aurvark - AUR install assistant for Arch Linux.
 * Copyright (C) 2025  aurvark contributors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! AUR RPC API client with caching and batched info requests.

use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::AurRpcResponse;
use crate::error::{AurvarkError, AurvarkResult};
use crate::package::{AurBasic, AurPackage};

/// Remote AUR metadata lookups.
///
/// The resolver calls `info` repeatedly during graph discovery, so
/// implementations must batch one request per name set, never one per
/// name. Names absent from the response are returned as missing; a
/// transport or decode failure is an error, never an empty result.
#[async_trait]
pub trait AurSource {
    /// Keyword search returning lightweight records
    async fn search(&self, query: &str) -> AurvarkResult<Vec<AurBasic>>;

    /// Batched info lookup returning full records plus missing names
    async fn info(&self, names: &[String]) -> AurvarkResult<(Vec<AurPackage>, Vec<String>)>;
}

/// AUR RPC client with a small response cache
pub struct AurClient {
    client: reqwest::Client,
    cache: Arc<RwLock<LruCache<String, CacheEntry>>>,
    base_url: String,
    last_request: Arc<RwLock<Instant>>,
    min_request_interval: Duration,
}

#[derive(Clone)]
struct CacheEntry {
    info: AurPackage,
    cached_at: Instant,
}

/// Cached info entries stay valid for this long
const CACHE_TTL: Duration = Duration::from_secs(300);

/// The RPC interface accepts up to this many names per info request
const BATCH_SIZE: usize = 250;

impl AurClient {
    pub fn new(base_url: String, cache_size: usize) -> AurvarkResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("aurvark/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AurvarkError::metadata("http client setup", e))?;

        let cache_size = NonZeroUsize::new(cache_size.max(1)).unwrap_or(NonZeroUsize::MIN);

        Ok(Self {
            client,
            cache: Arc::new(RwLock::new(LruCache::new(cache_size))),
            base_url,
            last_request: Arc::new(RwLock::new(Instant::now())),
            min_request_interval: Duration::from_millis(100),
        })
    }

    /// Space out requests to avoid hammering the RPC endpoint
    async fn rate_limit(&self) {
        let mut last = self.last_request.write().await;
        let elapsed = last.elapsed();
        if elapsed < self.min_request_interval {
            tokio::time::sleep(self.min_request_interval - elapsed).await;
        }
        *last = Instant::now();
    }

    async fn fetch_info_chunk(&self, chunk: &[String]) -> AurvarkResult<Vec<AurPackage>> {
        self.rate_limit().await;

        let args: Vec<String> = chunk
            .iter()
            .map(|n| format!("arg[]={}", urlencoding::encode(n)))
            .collect();
        let url = format!("{}?v=5&type=info&{}", self.base_url, args.join("&"));

        let response: AurRpcResponse<AurPackage> = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AurvarkError::metadata("AUR info request", e))?
            .json()
            .await
            .map_err(|e| AurvarkError::metadata("AUR info response", e))?;

        if let Some(error) = response.error {
            return Err(AurvarkError::metadata_msg("AUR info request", error));
        }

        Ok(response.results)
    }
}

#[async_trait]
impl AurSource for AurClient {
    async fn search(&self, query: &str) -> AurvarkResult<Vec<AurBasic>> {
        self.rate_limit().await;

        let url = format!(
            "{}?v=5&type=search&arg={}",
            self.base_url,
            urlencoding::encode(query)
        );

        let response: AurRpcResponse<AurBasic> = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AurvarkError::metadata("AUR search request", e))?
            .json()
            .await
            .map_err(|e| AurvarkError::metadata("AUR search response", e))?;

        if let Some(error) = response.error {
            return Err(AurvarkError::metadata_msg("AUR search request", error));
        }

        Ok(response.results)
    }

    async fn info(&self, names: &[String]) -> AurvarkResult<(Vec<AurPackage>, Vec<String>)> {
        if names.is_empty() {
            return Ok((vec![], vec![]));
        }

        let mut found = Vec::new();
        let mut to_fetch = Vec::new();

        {
            let cache = self.cache.read().await;
            for name in names {
                if let Some(entry) = cache.peek(name) {
                    if entry.cached_at.elapsed() < CACHE_TTL {
                        found.push(entry.info.clone());
                        continue;
                    }
                }
                to_fetch.push(name.clone());
            }
        }

        for chunk in to_fetch.chunks(BATCH_SIZE) {
            let results = self.fetch_info_chunk(chunk).await?;

            let mut cache = self.cache.write().await;
            for pkg in &results {
                cache.put(
                    pkg.name.clone(),
                    CacheEntry {
                        info: pkg.clone(),
                        cached_at: Instant::now(),
                    },
                );
            }
            found.extend(results);
        }

        let missing = names
            .iter()
            .filter(|n| !found.iter().any(|p| &&p.name == n))
            .cloned()
            .collect();

        Ok((found, missing))
    }
}
