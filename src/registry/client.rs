//! HTTP client for the registry API

use super::types::*;
use crate::error::{Result, SyncError};
use crate::reconciler::RegistrySource;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::{header, Client};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore, SemaphorePermit};
use tracing::{debug, info, warn};

/// HTTP client for the registry
///
/// Cheap to clone: clones share the connection pool and the request permits.
///
/// # Example
///
/// ```rust,no_run
/// use biosample_sync::{RegistryClient, RegistryConfig};
/// use futures::StreamExt;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = RegistryClient::new(RegistryConfig::default())?;
///
/// let mut accessions = client.list_accessions().await?;
/// while let Some(accession) = accessions.next().await {
///     let (record, etag) = client.fetch_record(&accession).await?;
///     println!("{} {}", record.accession, etag);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RegistryClient {
    config: Arc<RegistryConfig>,
    client: Client,
    permits: Arc<Semaphore>,
}

impl RegistryClient {
    /// Create a new registry client
    pub fn new(config: RegistryConfig) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let permits = Arc::new(Semaphore::new(config.max_connections.max(1)));

        Ok(Self {
            config: Arc::new(config),
            client,
            permits,
        })
    }

    /// Enumerate every accession of the configured project
    ///
    /// The first page is fetched before returning: if it fails the whole
    /// enumeration fails with [`SyncError::Connection`]. Remaining pages are
    /// requested together on spawned tasks and yielded in completion order; a
    /// failing page is skipped with a warning. Must be called from within a
    /// tokio runtime.
    pub async fn list_accessions(&self) -> Result<BoxStream<'static, String>> {
        info!(project = %self.config.project, "Searching for registry accessions");

        let first = self.fetch_page(0).await.map_err(|e| {
            SyncError::Connection(format!("Can't fetch registry accessions: {}", e))
        })?;

        let total_pages = first.page.total_pages;
        info!(
            total = first.page.total_elements,
            pages = total_pages,
            "Got registry accessions"
        );

        // Each page runs as its own task so that its permit is released even
        // while the consumer is busy fetching records from the same pool.
        let (tx, rx) = mpsc::unbounded_channel();
        for page in 1..total_pages {
            let client = self.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let accessions = match client.fetch_page(page).await {
                    Ok(data) => data.into_accessions(),
                    Err(e) => {
                        warn!(page = page, error = %e, "Skipping registry page");
                        return;
                    }
                };
                // Receiver gone means the consumer stopped listening
                let _ = tx.send(accessions);
            });
        }
        drop(tx);

        let pending = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|accessions| (accessions, rx))
        });

        Ok(stream::iter(first.into_accessions())
            .chain(pending.flat_map(stream::iter))
            .boxed())
    }

    /// Fetch one page of the accessions listing
    pub async fn fetch_page(&self, page: u32) -> Result<AccessionsPage> {
        let url = format!("{}/accessions", self.config.base_url);
        let filter = format!("attr:project:{}", self.config.project);

        let _permit = self.acquire().await?;
        debug!(url = %url, page = page, "GET");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("size", self.config.page_size.to_string()),
                ("filter", filter),
                ("page", page.to_string()),
            ])
            .send()
            .await?;

        let data: AccessionsPage = handle_response(response).await?;
        debug!(page = page, count = data.embedded.accessions.len(), "Got registry page");
        Ok(data)
    }

    /// Fetch a single record and the etag from its response header
    pub async fn fetch_record(&self, accession: &str) -> Result<(RegistryRecord, String)> {
        let url = format!(
            "{}/samples/{}",
            self.config.base_url,
            urlencoding::encode(accession)
        );

        let _permit = self.acquire().await?;
        debug!(url = %url, "GET");

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(SyncError::Server { status, message });
        }

        let etag = response
            .headers()
            .get(header::ETAG)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .map(str::to_string);

        let record: RegistryRecord = response.json().await?;
        let etag = etag.ok_or_else(|| SyncError::MissingEtag(accession.to_string()))?;

        Ok((record, etag))
    }

    async fn acquire(&self) -> Result<SemaphorePermit<'_>> {
        self.permits
            .acquire()
            .await
            .map_err(|_| SyncError::Connection("Registry connection pool closed".into()))
    }
}

#[async_trait]
impl RegistrySource for RegistryClient {
    async fn fetch_record(&self, accession: &str) -> Result<(RegistryRecord, String)> {
        RegistryClient::fetch_record(self, accession).await
    }
}

async fn handle_response<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        return Err(SyncError::Server { status, message });
    }

    Ok(response.json().await?)
}
