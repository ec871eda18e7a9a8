//! Region data providers for the CLI.
//!
//! - Filesystem: `<root>/geo/<code>.json`, `<root>/outliers/<code>.json`,
//!   `<root>/histogram/<code>.json`
//! - HTTP: the overlay server's `/geo/:code`, `/outliers/:code/:limit` and
//!   `/histogram/:code` routes

use std::path::{Path, PathBuf};

use formats::RegionFeature;
use serde_json::Value;
use streaming::{BoxFuture, FetchError, RegionSource};
use tracing::debug;

async fn read_json(code: &str, path: &Path) -> Result<Value, FetchError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| FetchError::with_source(code, format!("read {}", path.display()), e))?;
    serde_json::from_slice(&bytes).map_err(|e| FetchError::with_source(code, "invalid JSON", e))
}

fn parse_region(code: &str, value: &Value) -> Result<RegionFeature, FetchError> {
    RegionFeature::from_geojson_value(value)
        .map_err(|e| FetchError::with_source(code, "invalid region geometry", e))
}

/// Fixture directory laid out like the server's routes.
pub struct FilesystemSource {
    root: PathBuf,
}

impl FilesystemSource {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn path(&self, dir: &str, code: &str) -> PathBuf {
        self.root.join(dir).join(format!("{code}.json"))
    }
}

impl RegionSource for FilesystemSource {
    fn fetch_region<'a>(
        &'a self,
        code: &'a str,
    ) -> BoxFuture<'a, Result<RegionFeature, FetchError>> {
        let path = self.path("geo", code);
        Box::pin(async move {
            let value = read_json(code, &path).await?;
            parse_region(code, &value)
        })
    }

    /// Stored series are truncated to `limit` rows.
    fn fetch_outliers<'a>(
        &'a self,
        code: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, Result<Value, FetchError>> {
        let path = self.path("outliers", code);
        Box::pin(async move {
            let mut value = read_json(code, &path).await?;
            if let Some(rows) = value.get_mut(code).and_then(Value::as_array_mut) {
                rows.truncate(limit);
            }
            Ok(value)
        })
    }

    fn fetch_date_histogram<'a>(
        &'a self,
        code: &'a str,
    ) -> BoxFuture<'a, Result<Value, FetchError>> {
        let path = self.path("histogram", code);
        Box::pin(async move { read_json(code, &path).await })
    }
}

/// The overlay server's JSON routes.
pub struct HttpSource {
    base_url: String,
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn get_json(&self, code: &str, path: String) -> Result<Value, FetchError> {
        let url = format!("{}{path}", self.base_url);
        debug!(%url, "fetching");
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::with_source(code, "HTTP request failed", e))?;

        if !resp.status().is_success() {
            return Err(FetchError::new(code, format!("HTTP error: {}", resp.status())));
        }

        resp.json()
            .await
            .map_err(|e| FetchError::with_source(code, "invalid JSON body", e))
    }
}

impl RegionSource for HttpSource {
    fn fetch_region<'a>(
        &'a self,
        code: &'a str,
    ) -> BoxFuture<'a, Result<RegionFeature, FetchError>> {
        Box::pin(async move {
            let value = self.get_json(code, format!("/geo/{code}")).await?;
            parse_region(code, &value)
        })
    }

    fn fetch_outliers<'a>(
        &'a self,
        code: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, Result<Value, FetchError>> {
        Box::pin(self.get_json(code, format!("/outliers/{code}/{limit}")))
    }

    fn fetch_date_histogram<'a>(
        &'a self,
        code: &'a str,
    ) -> BoxFuture<'a, Result<Value, FetchError>> {
        Box::pin(self.get_json(code, format!("/histogram/{code}")))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use streaming::RegionSource;

    use super::FilesystemSource;

    fn fixture_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        for sub in ["geo", "outliers"] {
            std::fs::create_dir(dir.path().join(sub)).expect("mkdir");
        }
        let geo = json!({
            "type": "FeatureCollection",
            "cc_3": "FRA",
            "features": [{
                "type": "Feature",
                "properties": {},
                "geometry": { "type": "Polygon", "coordinates": [[[2.0, 48.0], [3.0, 49.0], [2.5, 47.0]]] }
            }]
        });
        std::fs::write(dir.path().join("geo/fr.json"), geo.to_string()).expect("write");
        let outliers = json!({ "fr": [1, 2, 3, 4, 5, 6] });
        std::fs::write(dir.path().join("outliers/fr.json"), outliers.to_string()).expect("write");
        dir
    }

    #[tokio::test]
    async fn reads_regions_and_truncates_outliers() {
        let dir = fixture_dir();
        let source = FilesystemSource::new(dir.path());

        let feature = source.fetch_region("fr").await.expect("region");
        assert_eq!(feature.secondary_code(), Some("FRA"));
        assert_eq!(feature.ring_count(), 1);

        let outliers = source.fetch_outliers("fr", 5).await.expect("outliers");
        assert_eq!(outliers, json!({ "fr": [1, 2, 3, 4, 5] }));
    }

    #[tokio::test]
    async fn missing_files_are_fetch_errors() {
        let dir = fixture_dir();
        let source = FilesystemSource::new(dir.path());

        let err = source.fetch_region("de").await.expect_err("missing");
        assert_eq!(err.code, "de");
        assert!(source.fetch_date_histogram("fr").await.is_err());
    }
}
