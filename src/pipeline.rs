//! One full synchronization run over the concrete clients

use std::sync::Arc;
use tracing::info;

use crate::error::Result;
use crate::pool::PoolGateway;
use crate::reconciler::{Reconciler, ReconcilerConfig, RunReport};
use crate::registry::RegistryClient;
use crate::ruleset::RulesetLoader;

/// Load rulesets and start the accession listing together, then reconcile
///
/// Either startup step failing aborts the run, as does failing to enumerate
/// the pool indices. Per-accession failures only show up in the report.
pub async fn run_sync(
    registry: RegistryClient,
    pool: PoolGateway,
    loader: &RulesetLoader,
    config: ReconcilerConfig,
) -> Result<RunReport> {
    let (rulesets, accessions) = tokio::try_join!(loader.load(), registry.list_accessions())?;

    let reconciler = Reconciler::new(config, Arc::new(registry), Arc::new(pool), rulesets);
    let report = reconciler.run(accessions).await?;

    info!(
        total = report.total(),
        created = report.created,
        updated = report.updated,
        ignored = report.ignored,
        errors = report.errors,
        "Sync completed"
    );

    Ok(report)
}
