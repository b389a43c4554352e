//! biosample-sync - registry to data-pool synchronization

use clap::Parser;
use futures::StreamExt;
use tracing::{error, info};

use biosample_sync::{
    config::{Args, Command},
    logging, run_sync, PoolGateway, RegistryClient, RulesetLoader,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    logging::init(&args.log_level, args.log_format);

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    match args.command() {
        Command::Sync => sync(&args).await,
        Command::Accessions { print } => accessions(&args, print).await,
        Command::Rulesets => rulesets(&args).await,
        Command::Etag { accession } => etag(&args, &accession).await,
    }
}

async fn sync(args: &Args) -> anyhow::Result<()> {
    info!("======================================");
    info!("  biosample-sync");
    info!("======================================");
    info!("Registry: {} (project {})", args.registry_url, args.project);
    info!("Ruleset: {}", args.ruleset_url);
    info!("Pool: {}", args.pool_url);
    info!("Batch size: {}", args.batch_size);
    info!("======================================");

    let registry = RegistryClient::new(args.registry_config())?;
    let pool = PoolGateway::new(args.pool_config())?;
    let loader = RulesetLoader::new(args.ruleset_url.clone(), args.request_timeout_secs)?;

    let report = run_sync(registry, pool, &loader, args.reconciler_config()).await?;
    if report.errors > 0 {
        info!(errors = report.errors, "Some records failed, see the log above");
    }
    println!("{}", serde_json::to_string(&report)?);

    Ok(())
}

async fn accessions(args: &Args, print: bool) -> anyhow::Result<()> {
    let registry = RegistryClient::new(args.registry_config())?;
    let mut accessions = registry.list_accessions().await?;

    let mut count = 0usize;
    while let Some(accession) = accessions.next().await {
        if print {
            println!("{}", accession);
        }
        count += 1;
    }

    info!(project = %args.project, count = count, "Enumerated registry accessions");
    Ok(())
}

async fn rulesets(args: &Args) -> anyhow::Result<()> {
    let loader = RulesetLoader::new(args.ruleset_url.clone(), args.request_timeout_secs)?;
    let rulesets = loader.load().await?;

    println!("{}", serde_json::to_string_pretty(&rulesets)?);
    Ok(())
}

async fn etag(args: &Args, accession: &str) -> anyhow::Result<()> {
    let pool = PoolGateway::new(args.pool_config())?;

    match pool.get_etag(accession).await? {
        Some(etag) => println!("{}", etag),
        None => info!(accession = %accession, "Accession not found in pool"),
    }

    Ok(())
}
