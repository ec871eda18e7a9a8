//! Fetch-by-key access to region geometry and per-region chart data.
//!
//! The transport (HTTP, filesystem, fixtures) is supplied by the host; the
//! loaders only see this trait.

use std::future::Future;
use std::pin::Pin;

use formats::RegionFeature;
use serde_json::Value;

/// Type alias for a boxed future that can be sent between threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A failed fetch for one region code.
#[derive(Debug)]
pub struct FetchError {
    pub code: String,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "fetch failed for {}: {}", self.code, self.message)
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

impl FetchError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        code: impl Into<String>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Region data provider.
///
/// Implementations must be `Send + Sync` for use across async tasks.
/// Methods return boxed futures for dyn-compatibility.
pub trait RegionSource: Send + Sync {
    /// Boundary geometry for a primary region code.
    fn fetch_region<'a>(&'a self, code: &'a str) -> BoxFuture<'a, Result<RegionFeature, FetchError>>;

    /// Per-date outlier series for a region, at most `limit` rows.
    fn fetch_outliers<'a>(
        &'a self,
        code: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, Result<Value, FetchError>>;

    /// Client count by date for a region.
    fn fetch_date_histogram<'a>(&'a self, code: &'a str) -> BoxFuture<'a, Result<Value, FetchError>>;
}
