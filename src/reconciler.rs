//! Reconciler - etag-driven sync of registry records into the pool
//!
//! ## Flow
//!
//! ```text
//! accession stream ──► batch (N accessions) ──► process_one × N (concurrent)
//!                                                  │
//!                       fetch record + etag ◄──────┤
//!                       detect category            │
//!                       compare with pool index ───┼──► ignore
//!                                                  ├──► convert + create
//!                                                  └──► convert + replace
//! ```
//!
//! A batch is fully drained, in completion order, before the next one starts.
//! Failures are contained to the accession that caused them.

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, Stream, StreamExt};
use serde::Serialize;
use std::pin::pin;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::convert::{convert_record, PoolRecord};
use crate::error::Result;
use crate::registry::RegistryRecord;
use crate::ruleset::Rulesets;
use crate::types::{Category, EtagIndex, Operation, WriteOutcome};

/// Characters of the characteristics payload logged for uncategorized records
const LOGGED_PAYLOAD_CHARS: usize = 200;

// ============================================================================
// Collaborator traits (for dependency injection)
// ============================================================================

/// Source of registry records
#[async_trait]
pub trait RegistrySource: Send + Sync {
    /// Fetch one record and its etag
    async fn fetch_record(&self, accession: &str) -> Result<(RegistryRecord, String)>;
}

/// Pool backend operations used by the reconciler
#[async_trait]
pub trait PoolStore: Send + Sync {
    async fn get_etag(&self, accession: &str) -> Result<Option<String>>;

    async fn list_all_etags(&self, category: Category) -> Result<EtagIndex>;

    async fn create(&self, category: Category, record: &PoolRecord) -> Result<WriteOutcome>;

    async fn replace(
        &self,
        category: Category,
        accession: &str,
        record: &PoolRecord,
    ) -> Result<WriteOutcome>;
}

// ============================================================================
// Types
// ============================================================================

/// Configuration for the reconciler
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Accessions processed concurrently before the next batch starts
    pub batch_size: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self { batch_size: 100 }
    }
}

/// Pool etag indices, one per category
#[derive(Debug, Clone, Default)]
pub struct PoolIndex {
    pub organism: EtagIndex,
    pub specimen: EtagIndex,
}

impl PoolIndex {
    pub fn get(&self, category: Category) -> &EtagIndex {
        match category {
            Category::Organism => &self.organism,
            Category::Specimen => &self.specimen,
        }
    }
}

/// What to do with one accession
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Create,
    Update,
    Ignore,
}

/// Compare a registry etag against the pool index
pub fn decide(index: &EtagIndex, accession: &str, registry_etag: &str) -> Decision {
    match index.get(accession) {
        None => Decision::Create,
        Some(pool_etag) if pool_etag != registry_etag => Decision::Update,
        Some(_) => Decision::Ignore,
    }
}

/// Result of processing one accession
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub operation: Operation,
    pub accession: String,
    /// Registry etag, when the record could be fetched
    pub etag: Option<String>,
}

/// Summary of a reconciliation run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub created: usize,
    pub updated: usize,
    pub ignored: usize,
    pub errors: usize,
    /// Registry etags observed during the run
    #[serde(skip)]
    pub registry_etags: EtagIndex,
}

impl RunReport {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome.operation {
            Operation::Created => self.created += 1,
            Operation::Updated => self.updated += 1,
            Operation::Ignored => self.ignored += 1,
            Operation::Error => self.errors += 1,
        }
        if let Some(etag) = outcome.etag {
            self.registry_etags.insert(outcome.accession, etag);
        }
    }

    pub fn total(&self) -> usize {
        self.created + self.updated + self.ignored + self.errors
    }
}

// ============================================================================
// Reconciler
// ============================================================================

/// Drives per-accession create/update/ignore decisions
pub struct Reconciler<R: RegistrySource, P: PoolStore> {
    config: ReconcilerConfig,
    registry: Arc<R>,
    pool: Arc<P>,
    rulesets: Arc<Rulesets>,
}

impl<R: RegistrySource, P: PoolStore> Reconciler<R, P> {
    pub fn new(config: ReconcilerConfig, registry: Arc<R>, pool: Arc<P>, rulesets: Rulesets) -> Self {
        Self {
            config,
            registry,
            pool,
            rulesets: Arc::new(rulesets),
        }
    }

    /// Build both pool indices concurrently
    pub async fn load_index(&self) -> Result<PoolIndex> {
        let (organism, specimen) = tokio::try_join!(
            self.pool.list_all_etags(Category::Organism),
            self.pool.list_all_etags(Category::Specimen),
        )?;

        Ok(PoolIndex { organism, specimen })
    }

    /// Load the pool indices, then reconcile every accession of the stream
    pub async fn run<S>(&self, accessions: S) -> Result<RunReport>
    where
        S: Stream<Item = String>,
    {
        let index = self.load_index().await?;
        Ok(self.reconcile(&index, accessions).await)
    }

    /// Reconcile against an already built index
    pub async fn reconcile<S>(&self, index: &PoolIndex, accessions: S) -> RunReport
    where
        S: Stream<Item = String>,
    {
        let mut report = RunReport::default();
        let mut batches = pin!(accessions.chunks(self.config.batch_size.max(1)));
        let mut batch_index = 0usize;

        while let Some(batch) = batches.next().await {
            debug!(batch = batch_index, size = batch.len(), "Processing batch");

            let mut tasks: FuturesUnordered<_> = batch
                .into_iter()
                .map(|accession| self.process_one(index, accession))
                .collect();

            while let Some(outcome) = tasks.next().await {
                debug!(
                    accession = %outcome.accession,
                    operation = %outcome.operation,
                    etag = outcome.etag.as_deref().unwrap_or(""),
                    "Processed"
                );
                report.record(outcome);
            }

            info!(batch = batch_index, processed = report.total(), "Batch completed");
            batch_index += 1;
        }

        info!(
            created = report.created,
            updated = report.updated,
            ignored = report.ignored,
            errors = report.errors,
            "Reconciliation finished"
        );

        report
    }

    /// Fetch, decide, convert and write one accession
    pub async fn process_one(&self, index: &PoolIndex, accession: String) -> Outcome {
        let (record, etag) = match self.registry.fetch_record(&accession).await {
            Ok(fetched) => fetched,
            Err(e) => {
                error!(accession = %accession, error = %e, "Failed to fetch registry record");
                return Outcome {
                    operation: Operation::Error,
                    accession,
                    etag: None,
                };
            }
        };

        let category = match Category::of_record(&record) {
            Ok(category) => category,
            Err(e) => {
                let payload = serde_json::to_string(&record.characteristics).unwrap_or_default();
                error!(
                    accession = %accession,
                    error = %e,
                    payload = %head(&payload, LOGGED_PAYLOAD_CHARS),
                    "Cannot determine record category"
                );
                return Outcome {
                    operation: Operation::Error,
                    accession,
                    etag: Some(etag),
                };
            }
        };

        let decision = decide(index.get(category), &accession, &etag);
        let (result, done) = match decision {
            Decision::Ignore => {
                return Outcome {
                    operation: Operation::Ignored,
                    accession,
                    etag: Some(etag),
                };
            }
            Decision::Create => {
                info!(accession = %accession, category = %category, "New record");
                (self.create(category, &record, &etag).await, Operation::Created)
            }
            Decision::Update => {
                info!(accession = %accession, category = %category, "Updating record");
                (self.update(category, &record, &etag).await, Operation::Updated)
            }
        };

        let operation = match result {
            Ok(WriteOutcome::Written) => done,
            Ok(WriteOutcome::Rejected { .. }) => Operation::Error,
            Err(e) => {
                error!(accession = %accession, error = %e, "Failed to write record");
                Operation::Error
            }
        };

        Outcome {
            operation,
            accession,
            etag: Some(etag),
        }
    }

    async fn create(&self, category: Category, record: &RegistryRecord, etag: &str) -> Result<WriteOutcome> {
        let converted = convert_record(record, etag, &self.rulesets)?;
        self.pool.create(category, &converted).await
    }

    async fn update(&self, category: Category, record: &RegistryRecord, etag: &str) -> Result<WriteOutcome> {
        let converted = convert_record(record, etag, &self.rulesets)?;
        self.pool.replace(category, &record.accession, &converted).await
    }
}

/// First `max_chars` characters of `text`
fn head(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

// ============================================================================
// Tests
// ============================================================================
