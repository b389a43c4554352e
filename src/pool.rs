//! HTTP client for the data-pool backend

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, error, info, warn};

use crate::convert::PoolRecord;
use crate::error::{Result, SyncError};
use crate::reconciler::PoolStore;
use crate::types::{Category, EtagIndex, WriteOutcome};

/// Characters of a rejected response body kept in logs
const LOGGED_BODY_CHARS: usize = 200;

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Base URL of the pool REST API
    pub base_url: String,
    /// Basic-Auth user for writes
    pub username: String,
    /// Basic-Auth password for writes
    pub password: Option<String>,
    /// Records requested per page when enumerating etags
    pub page_size: u32,
    /// Maximum simultaneous requests toward the pool
    pub max_connections: usize,
    /// Request timeout in seconds (default: 30)
    pub timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            base_url: "http://nginx/data_portal/backend".to_string(),
            username: "admin".to_string(),
            password: None,
            page_size: 1000,
            max_connections: 20,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize)]
struct EtagEntry {
    data_source_id: String,
    #[serde(default)]
    etag: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EtagPage {
    #[serde(default)]
    count: u64,
    next: Option<String>,
    #[serde(default)]
    results: Vec<EtagEntry>,
}

/// REST client over the pool's record and etag endpoints
pub struct PoolGateway {
    config: PoolConfig,
    client: Client,
    permits: Arc<Semaphore>,
}

impl PoolGateway {
    pub fn new(config: PoolConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let permits = Arc::new(Semaphore::new(config.max_connections.max(1)));

        Ok(Self {
            config,
            client,
            permits,
        })
    }

    /// Current pool etag of a record, `None` when the pool doesn't know it
    pub async fn get_etag(&self, accession: &str) -> Result<Option<String>> {
        let url = format!(
            "{}/etag/{}/",
            self.config.base_url,
            urlencoding::encode(accession)
        );

        let _permit = self.acquire().await?;
        debug!(url = %url, "GET");

        let response = self.client.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(accession = %accession, "Not in pool");
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(SyncError::Server { status, message });
        }

        let entry: EtagEntry = response.json().await?;
        Ok(Some(entry.etag.unwrap_or_default()))
    }

    /// Every `data_source_id → etag` pair of a category, following `next` links
    pub async fn list_all_etags(&self, category: Category) -> Result<EtagIndex> {
        let mut url = format!(
            "{}/{}/?page_size={}&ordering=data_source_id",
            self.config.base_url,
            category.as_path(),
            self.config.page_size
        );
        let mut index = EtagIndex::new();

        loop {
            let page: EtagPage = {
                let _permit = self.acquire().await?;
                debug!(url = %url, "GET");

                let response = self.client.get(&url).send().await?;
                if !response.status().is_success() {
                    let status = response.status().as_u16();
                    let message = response.text().await.unwrap_or_default();
                    return Err(SyncError::Server { status, message });
                }
                response.json().await?
            };

            debug!(category = %category, count = page.count, page_len = page.results.len(), "Got pool etag page");
            for entry in page.results {
                index.insert(entry.data_source_id, entry.etag.unwrap_or_default());
            }

            match page.next {
                Some(next) if !next.is_empty() => url = next,
                _ => break,
            }
        }

        info!(category = %category, count = index.len(), "Got etags from pool");
        Ok(index)
    }

    /// POST a new record; anything but 201 is logged and reported as rejected
    pub async fn create(&self, category: Category, record: &PoolRecord) -> Result<WriteOutcome> {
        let url = format!("{}/{}/", self.config.base_url, category.as_path());
        let accession = record
            .get("data_source_id")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let _permit = self.acquire().await?;
        debug!(accession = %accession, url = %url, "POST");

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.config.username, self.config.password.as_deref())
            .json(record)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::CREATED {
            return Ok(WriteOutcome::Written);
        }

        let body = response.text().await.unwrap_or_default();
        error!(
            accession = %accession,
            category = %category,
            status = status.as_u16(),
            body = %tail(&body, LOGGED_BODY_CHARS),
            "Pool rejected record"
        );
        Ok(WriteOutcome::Rejected {
            status: status.as_u16(),
        })
    }

    /// Delete then recreate a record
    ///
    /// The delete is best-effort: a non-202 answer is logged and the create
    /// still runs.
    pub async fn replace(
        &self,
        category: Category,
        accession: &str,
        record: &PoolRecord,
    ) -> Result<WriteOutcome> {
        let url = format!(
            "{}/{}/{}",
            self.config.base_url,
            category.as_path(),
            urlencoding::encode(accession)
        );

        {
            let _permit = self.acquire().await?;
            debug!(accession = %accession, url = %url, "DELETE");

            let response = self
                .client
                .delete(&url)
                .basic_auth(&self.config.username, self.config.password.as_deref())
                .send()
                .await?;

            let status = response.status();
            if status != StatusCode::ACCEPTED {
                let body = response.text().await.unwrap_or_default();
                warn!(
                    accession = %accession,
                    category = %category,
                    status = status.as_u16(),
                    body = %tail(&body, LOGGED_BODY_CHARS),
                    "Pool delete not accepted, recreating anyway"
                );
            }
        }

        self.create(category, record).await
    }

    async fn acquire(&self) -> Result<SemaphorePermit<'_>> {
        self.permits
            .acquire()
            .await
            .map_err(|_| SyncError::Connection("Pool connection pool closed".into()))
    }
}

#[async_trait]
impl PoolStore for PoolGateway {
    async fn get_etag(&self, accession: &str) -> Result<Option<String>> {
        PoolGateway::get_etag(self, accession).await
    }

    async fn list_all_etags(&self, category: Category) -> Result<EtagIndex> {
        PoolGateway::list_all_etags(self, category).await
    }

    async fn create(&self, category: Category, record: &PoolRecord) -> Result<WriteOutcome> {
        PoolGateway::create(self, category, record).await
    }

    async fn replace(
        &self,
        category: Category,
        accession: &str,
        record: &PoolRecord,
    ) -> Result<WriteOutcome> {
        PoolGateway::replace(self, category, accession, record).await
    }
}

/// Last `max_chars` characters of `body`
fn tail(body: &str, max_chars: usize) -> &str {
    let count = body.chars().count();
    if count <= max_chars {
        return body;
    }
    match body.char_indices().nth(count - max_chars) {
        Some((start, _)) => &body[start..],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_keeps_short_bodies() {
        assert_eq!(tail("short", 200), "short");
        assert_eq!(tail("", 10), "");
    }

    #[test]
    fn test_tail_truncates_on_char_boundary() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("ääöö", 2), "öö");
    }

    #[test]
    fn test_etag_page_deserializes() {
        let page: EtagPage = serde_json::from_str(
            r#"{"count": 2, "next": null, "previous": null,
                "results": [{"data_source_id": "SAMEA1", "etag": "e1", "species": "Gallus gallus"},
                            {"data_source_id": "SAMEA2", "etag": null}]}"#,
        )
        .unwrap();

        assert_eq!(page.count, 2);
        assert!(page.next.is_none());
        assert_eq!(page.results[0].etag.as_deref(), Some("e1"));
        assert!(page.results[1].etag.is_none());
    }
}
