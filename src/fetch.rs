//! Byte fetching for audio tracks and clip preloading.
//!
//! URLs are opaque strings handed over by the storage layer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("fetch failed for {url}: {reason}")]
pub struct FetchError {
    pub url: String,
    pub reason: String,
}

impl FetchError {
    pub fn new(url: &str, reason: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Fetch `url`, giving up after `timeout` or as soon as `cancel` fires.
///
/// The pending fetch future is dropped on either outcome.
pub async fn fetch_with_deadline(
    fetcher: &dyn Fetcher,
    url: &str,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Vec<u8>, FetchError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(FetchError::new(url, "cancelled")),
        result = tokio::time::timeout(timeout, fetcher.fetch(url)) => match result {
            Ok(fetched) => fetched,
            Err(_) => Err(FetchError::new(url, format!("timed out after {timeout:?}"))),
        },
    }
}

/// Never resolves; stands in for a stalled network request
#[derive(Debug, Clone, Copy, Default)]
pub struct StalledFetcher;

#[async_trait]
impl Fetcher for StalledFetcher {
    async fn fetch(&self, _url: &str) -> Result<Vec<u8>, FetchError> {
        std::future::pending().await
    }
}

/// Reads local paths and `file://` URLs
#[derive(Debug, Clone, Copy, Default)]
pub struct FileFetcher;

#[async_trait]
impl Fetcher for FileFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let path = url.strip_prefix("file://").unwrap_or(url);
        tokio::fs::read(path)
            .await
            .map_err(|e| FetchError::new(url, e.to_string()))
    }
}

/// Serves byte blobs registered up front
#[derive(Debug, Clone, Default)]
pub struct MemoryFetcher {
    blobs: Arc<RwLock<HashMap<String, Arc<Vec<u8>>>>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, url: impl Into<String>, bytes: Vec<u8>) {
        self.blobs.write().insert(url.into(), Arc::new(bytes));
    }
}

#[async_trait]
impl Fetcher for MemoryFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.blobs
            .read()
            .get(url)
            .map(|bytes| bytes.as_ref().clone())
            .ok_or_else(|| FetchError::new(url, "not found"))
    }
}
