//! Configuration for biosample-sync
//!
//! CLI arguments and environment variable handling using clap.

use clap::{Parser, Subcommand};

use crate::error::{Result, SyncError};
use crate::logging::LogFormat;
use crate::pool::PoolConfig;
use crate::reconciler::ReconcilerConfig;
use crate::registry::RegistryConfig;
use crate::ruleset::DEFAULT_RULESET_URL;

/// biosample-sync - keep the data pool in step with the sample registry
#[derive(Parser, Debug, Clone)]
#[command(name = "biosample-sync")]
#[command(about = "Synchronize registry sample metadata into the data pool")]
pub struct Args {
    /// Registry API base URL
    #[arg(long, env = "REGISTRY_URL", default_value = "https://www.ebi.ac.uk/biosamples")]
    pub registry_url: String,

    /// Registry project whose accessions are synchronized
    #[arg(long, env = "PROJECT", default_value = "IMAGE")]
    pub project: String,

    /// URL of the ruleset schema document
    #[arg(long, env = "RULESET_URL", default_value = DEFAULT_RULESET_URL)]
    pub ruleset_url: String,

    /// Pool REST API base URL
    #[arg(long, env = "POOL_URL", default_value = "http://nginx/data_portal/backend")]
    pub pool_url: String,

    /// Basic-Auth user for pool writes
    #[arg(long, env = "POOL_USER", default_value = "admin")]
    pub pool_user: String,

    /// Basic-Auth password for pool writes (required for sync)
    #[arg(long, env = "IMPORT_PASSWORD", hide_env_values = true)]
    pub import_password: Option<String>,

    /// Accessions requested per registry page
    #[arg(long, env = "REGISTRY_PAGE_SIZE", default_value = "500")]
    pub registry_page_size: u32,

    /// Records requested per pool etag page
    #[arg(long, env = "POOL_PAGE_SIZE", default_value = "1000")]
    pub pool_page_size: u32,

    /// Accessions processed concurrently per batch
    #[arg(long, env = "BATCH_SIZE", default_value = "100")]
    pub batch_size: usize,

    /// Maximum simultaneous registry requests
    #[arg(long, env = "REGISTRY_MAX_CONNECTIONS", default_value = "10")]
    pub registry_max_connections: usize,

    /// Maximum simultaneous pool requests
    #[arg(long, env = "POOL_MAX_CONNECTIONS", default_value = "20")]
    pub pool_max_connections: usize,

    /// Per-request timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value = "30")]
    pub request_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "text")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Operations exposed by the binary
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Reconcile every registry accession into the pool (default)
    Sync,

    /// Enumerate the project's registry accessions
    Accessions {
        /// Print every accession, one per line
        #[arg(long)]
        print: bool,
    },

    /// Fetch the ruleset schema and print the parsed rulesets as JSON
    Rulesets,

    /// Show the pool's current etag for one accession
    Etag {
        /// Registry accession (data_source_id)
        accession: String,
    },
}

impl Args {
    /// Subcommand to run, `sync` when none was given
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Sync)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.command() == Command::Sync && self.import_password.is_none() {
            return Err(SyncError::Config(
                "IMPORT_PASSWORD is required to write to the pool".to_string(),
            ));
        }

        let sizes = [
            ("REGISTRY_PAGE_SIZE", self.registry_page_size as usize),
            ("POOL_PAGE_SIZE", self.pool_page_size as usize),
            ("BATCH_SIZE", self.batch_size),
            ("REGISTRY_MAX_CONNECTIONS", self.registry_max_connections),
            ("POOL_MAX_CONNECTIONS", self.pool_max_connections),
        ];
        if let Some((name, _)) = sizes.iter().find(|(_, value)| *value == 0) {
            return Err(SyncError::Config(format!("{} must be greater than zero", name)));
        }

        if self.request_timeout_secs == 0 {
            return Err(SyncError::Config(
                "REQUEST_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            base_url: self.registry_url.trim_end_matches('/').to_string(),
            project: self.project.clone(),
            page_size: self.registry_page_size,
            max_connections: self.registry_max_connections,
            timeout_secs: self.request_timeout_secs,
        }
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            base_url: self.pool_url.trim_end_matches('/').to_string(),
            username: self.pool_user.clone(),
            password: self.import_password.clone(),
            page_size: self.pool_page_size,
            max_connections: self.pool_max_connections,
            timeout_secs: self.request_timeout_secs,
        }
    }

    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            batch_size: self.batch_size,
        }
    }
}
