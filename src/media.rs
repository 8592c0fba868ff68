use crate::catalog::normalize::absolutize;
use crate::http::build_client;
use crate::metrics;
use crate::models::Product;
use async_trait::async_trait;
use futures::future::join_all;
use reqwest::{Client, StatusCode};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

const KNOWN_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];
const DEFAULT_EXTENSION: &str = "jpg";

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("unable to store `{path}`: {message}")]
    Store { path: String, message: String },
}

#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, MediaError>;
}

pub struct HttpMediaFetcher {
    http: Client,
}

impl HttpMediaFetcher {
    pub fn new() -> Self {
        Self {
            http: build_client(),
        }
    }
}

impl Default for HttpMediaFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaFetcher for HttpMediaFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, MediaError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| MediaError::Request(err.to_string()))?;
        if response.status() != StatusCode::OK {
            return Err(MediaError::Status(response.status().as_u16()));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|err| MediaError::Request(err.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaReport {
    pub local_paths: Vec<String>,
    pub fetched: usize,
    pub reused: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct MediaSettings {
    pub upload_dir: PathBuf,
    pub media_base: String,
    pub max_images: usize,
    pub fetch_timeout: Duration,
}

pub struct MediaCollector<F> {
    fetcher: F,
    settings: MediaSettings,
}

enum Stored {
    Fetched(String),
    Reused(String),
    Failed,
}

impl<F: MediaFetcher> MediaCollector<F> {
    pub fn new(fetcher: F, settings: MediaSettings) -> Self {
        Self { fetcher, settings }
    }

    /// Image references to download: absolute, primary first, no repeats,
    /// capped at the configured maximum.
    pub fn planned_urls(&self, product: &Product) -> Vec<String> {
        let base = &self.settings.media_base;
        let mut urls: Vec<String> = Vec::new();
        let candidates = product
            .primary_image
            .iter()
            .chain(product.images.iter())
            .map(|url| absolutize(url, base));
        for url in candidates {
            if urls.len() >= self.settings.max_images {
                break;
            }
            if url.is_empty() || urls.contains(&url) {
                continue;
            }
            urls.push(url);
        }
        urls
    }

    /// Fetches every planned image concurrently. Files already on disk are
    /// reused without a request; failed fetches are counted, not raised.
    pub async fn collect(&self, product: &Product) -> MediaReport {
        let urls = self.planned_urls(product);
        if urls.is_empty() {
            return MediaReport::default();
        }
        if let Err(err) = tokio::fs::create_dir_all(&self.settings.upload_dir).await {
            warn!(target = "catalog.media", dir = %self.settings.upload_dir.display(), error = %err, "upload_dir_unavailable");
            return MediaReport {
                failed: urls.len(),
                ..MediaReport::default()
            };
        }

        let safe_id = safe_identity(&product.id);
        let tasks = urls.iter().enumerate().map(|(index, url)| {
            let target = self
                .settings
                .upload_dir
                .join(format!("{safe_id}_{index}.{}", extension_for(url)));
            self.store_one(url, target)
        });
        let outcomes = join_all(tasks).await;

        let mut report = MediaReport::default();
        for outcome in outcomes {
            match outcome {
                Stored::Fetched(path) => {
                    report.fetched += 1;
                    report.local_paths.push(path);
                }
                Stored::Reused(path) => {
                    report.reused += 1;
                    report.local_paths.push(path);
                }
                Stored::Failed => report.failed += 1,
            }
        }
        report
    }

    async fn store_one(&self, url: &str, target: PathBuf) -> Stored {
        let path_text = target.display().to_string();
        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            debug!(target = "catalog.media", path = %path_text, "image_already_present");
            metrics::media_outcome("reused");
            return Stored::Reused(path_text);
        }

        let timeout = self.settings.fetch_timeout;
        let fetched = match tokio::time::timeout(timeout, self.fetcher.fetch(url)).await {
            Ok(result) => result,
            Err(_) => Err(MediaError::Timeout(timeout)),
        };
        let outcome = match fetched {
            Ok(bytes) => write_atomically(&target, &bytes).await,
            Err(err) => Err(err),
        };
        match outcome {
            Ok(()) => {
                metrics::media_outcome("fetched");
                Stored::Fetched(path_text)
            }
            Err(err) => {
                warn!(target = "catalog.media", url = %url, error = %err, "image_fetch_failed");
                metrics::media_outcome("failed");
                Stored::Failed
            }
        }
    }
}

/// A crash mid-write must not leave a file that a re-run mistakes for a
/// finished download.
async fn write_atomically(target: &Path, bytes: &[u8]) -> Result<(), MediaError> {
    let store_err = |err: std::io::Error| MediaError::Store {
        path: target.display().to_string(),
        message: err.to_string(),
    };
    let mut name = target.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".{}.part", Uuid::new_v4().simple()));
    let partial = target.with_file_name(name);
    tokio::fs::write(&partial, bytes).await.map_err(store_err)?;
    if let Err(err) = tokio::fs::rename(&partial, target).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(store_err(err));
    }
    Ok(())
}

pub fn safe_identity(identity: &str) -> String {
    identity.replace(['/', '\\'], "_")
}

/// Extension from the URL path; unknown or missing extensions map to `jpg`.
pub fn extension_for(url: &str) -> String {
    let path = reqwest::Url::parse(url)
        .map(|parsed| parsed.path().to_string())
        .unwrap_or_else(|_| url.split(['?', '#']).next().unwrap_or("").to_string());
    let file = path.rsplit('/').next().unwrap_or("");
    file.rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .filter(|ext| KNOWN_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}


#[cfg(test)]
mod tests {
    use super::fakes::FakeFetcher;
    use super::*;
    use crate::models::sample_product;

    fn collector(fetcher: FakeFetcher, dir: &Path) -> MediaCollector<FakeFetcher> {
        collector_with(fetcher, dir, 5, Duration::from_millis(200))
    }

    fn collector_with(
        fetcher: FakeFetcher,
        dir: &Path,
        max_images: usize,
        fetch_timeout: Duration,
    ) -> MediaCollector<FakeFetcher> {
        MediaCollector::new(
            fetcher,
            MediaSettings {
                upload_dir: dir.to_path_buf(),
                media_base: "https://img.example.com".into(),
                max_images,
                fetch_timeout,
            },
        )
    }

    #[test]
    fn extension_inference() {
        assert_eq!(extension_for("https://a.com/x/photo.PNG?w=100"), "png");
        assert_eq!(extension_for("https://a.com/x/photo.webp#frag"), "webp");
        assert_eq!(extension_for("https://a.com/x/photo.tiff"), "jpg");
        assert_eq!(extension_for("https://a.com/x/photo"), "jpg");
        assert_eq!(extension_for("relative/p.gif?x=1"), "gif");
    }

    #[test]
    fn safe_identity_strips_separators() {
        assert_eq!(safe_identity("a/b\\c"), "a_b_c");
    }

    #[test]
    fn planned_urls_dedupe_against_primary_and_cap() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut product = sample_product("1");
        product.primary_image = Some("p/main.jpg".into());
        product.images = (0..8).map(|i| format!("https://img.example.com/p/{i}.jpg")).collect();
        product.images.insert(0, "https://img.example.com/p/main.jpg".into());
        let planned = collector(FakeFetcher::default(), dir.path()).planned_urls(&product);
        assert_eq!(planned.len(), 5);
        assert_eq!(planned[0], "https://img.example.com/p/main.jpg");
        assert_eq!(planned[1], "https://img.example.com/p/0.jpg");
    }

    #[tokio::test]
    async fn zero_image_cap_plans_and_fetches_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fetcher = FakeFetcher::default();
        let collector = collector_with(fetcher.clone(), dir.path(), 0, Duration::from_millis(200));
        let product = sample_product("4");
        assert!(collector.planned_urls(&product).is_empty());
        assert_eq!(collector.collect(&product).await, MediaReport::default());
        assert_eq!(fetcher.call_count(), 0);

        let single = collector_with(FakeFetcher::default(), dir.path(), 1, Duration::from_millis(200));
        let mut product = sample_product("4");
        product.push_image("https://img.example.com/4/side.jpg".into());
        assert_eq!(
            single.planned_urls(&product),
            vec!["https://cdn.example.com/4/main.jpg".to_string()]
        );
    }

    #[tokio::test]
    async fn images_of_one_product_are_fetched_concurrently() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fetcher = FakeFetcher::default();
        let collector = collector_with(fetcher.clone(), dir.path(), 5, Duration::from_secs(5));
        let mut product = sample_product("11");
        product.primary_image = None;
        product.images.clear();
        for i in 0..4 {
            product.push_image(format!("https://img.example.com/11/delay_{i}.jpg"));
        }

        let started = std::time::Instant::now();
        let report = collector.collect(&product).await;
        let elapsed = started.elapsed();

        assert_eq!(report.fetched, 4);
        assert_eq!(fetcher.call_count(), 4);
        let sequential = fakes::FETCH_DELAY * 4;
        assert!(
            elapsed < sequential * 3 / 4,
            "collect took {elapsed:?}, sequential fetches would take {sequential:?}"
        );
    }

    #[tokio::test]
    async fn second_collect_performs_no_fetches() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fetcher = FakeFetcher::default();
        let collector = collector(fetcher.clone(), dir.path());
        let mut product = sample_product("7");
        product.push_image("https://img.example.com/7/side.png".into());

        let first = collector.collect(&product).await;
        assert_eq!(first.fetched, 2);
        assert_eq!(fetcher.call_count(), 2);
        assert!(dir.path().join("7_0.jpg").is_file());
        assert!(dir.path().join("7_1.png").is_file());

        let second = collector.collect(&product).await;
        assert_eq!(second.fetched, 0);
        assert_eq!(second.reused, 2);
        assert_eq!(second.local_paths, first.local_paths);
        assert_eq!(fetcher.call_count(), 2);
    }

    #[tokio::test]
    async fn failures_and_timeouts_do_not_abort_siblings() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fetcher = FakeFetcher::default();
        let collector = collector(fetcher.clone(), dir.path());
        let mut product = sample_product("9");
        product.push_image("https://img.example.com/9/fail.jpg".into());
        product.push_image("https://img.example.com/9/slow.jpg".into());
        product.push_image("https://img.example.com/9/ok.jpg".into());

        let report = collector.collect(&product).await;
        assert_eq!(report.fetched, 2);
        assert_eq!(report.failed, 2);
        assert_eq!(report.local_paths.len(), 2);
        assert!(!dir.path().join("9_1.jpg").exists());
        assert!(!dir.path().join("9_2.jpg").exists());
        let leftovers = std::fs::read_dir(dir.path())
            .expect("read_dir")
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".part"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn product_without_images_reports_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut product = sample_product("3");
        product.primary_image = None;
        product.images.clear();
        let report = collector(FakeFetcher::default(), dir.path()).collect(&product).await;
        assert_eq!(report, MediaReport::default());
    }
}
