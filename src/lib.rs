//! Registry → data-pool synchronization for IMAGE sample metadata
//!
//! Records are listed and fetched from the BioSamples registry, converted into
//! the pool's flat shape according to the published IMAGE ruleset, and written
//! to the pool only when their etag differs from the one the pool holds.
//!
//! # Example
//!
//! ```rust,no_run
//! use biosample_sync::{run_sync, PoolConfig, PoolGateway, ReconcilerConfig, RegistryClient,
//!     RegistryConfig, RulesetLoader, DEFAULT_RULESET_URL};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = RegistryClient::new(RegistryConfig::default())?;
//! let pool = PoolGateway::new(PoolConfig {
//!     password: Some("secret".into()),
//!     ..Default::default()
//! })?;
//! let loader = RulesetLoader::new(DEFAULT_RULESET_URL, 30)?;
//!
//! let report = run_sync(registry, pool, &loader, ReconcilerConfig::default()).await?;
//! println!("created {} updated {}", report.created, report.updated);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod convert;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod pool;
pub mod reconciler;
pub mod registry;
pub mod ruleset;
pub mod types;

// Re-export main types
pub use convert::{convert_record, PoolRecord};
pub use error::{Result, SyncError};
pub use pipeline::run_sync;
pub use pool::{PoolConfig, PoolGateway};
pub use reconciler::{
    PoolStore, Reconciler, ReconcilerConfig, RegistrySource, RunReport,
};
pub use registry::{RegistryClient, RegistryConfig, RegistryRecord};
pub use ruleset::{Ruleset, RulesetLoader, Rulesets, DEFAULT_RULESET_URL};
pub use types::*;
