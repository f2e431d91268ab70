// src/main.rs

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use operator_catalog::config::parse_duration;
use operator_catalog::{
    CatalogConfig, CatalogSource, EntityCache, EntitySource, GrpcRegistryClient,
    InMemoryCatalogSourceStore, InMemoryInstallRequestStore, OperatorResolver, ProxyConfig,
    RegistryClient, bundle_for_package,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[command(name = "opcat")]
#[command(author, version, about = "Operator catalog sync and bundle resolution", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch every entity a catalog registry serves and print them as JSON
    Entities {
        /// Registry address (host:port)
        #[arg(short, long)]
        address: String,
        /// Catalog source name used in entity ids
        #[arg(short, long, default_value = "catalog")]
        name: String,
        #[arg(long, default_value = "default")]
        namespace: String,
        /// Fetch timeout (e.g., "30s", "2m")
        #[arg(short, long, default_value = "2m")]
        timeout: String,
    },
    /// Sync the configured catalog sources and resolve the install requests
    Resolve {
        /// Path to the TOML configuration file
        #[arg(short, long)]
        config: PathBuf,
        /// How long to wait for the initial sync (e.g., "5m")
        #[arg(short, long, default_value = "5m")]
        wait: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Entities {
            address,
            name,
            namespace,
            timeout,
        } => cmd_entities(address, name, namespace, &timeout).await,
        Commands::Resolve { config, wait } => cmd_resolve(&config, &wait).await,
    }
}

async fn cmd_entities(address: String, name: String, namespace: String, timeout: &str) -> Result<()> {
    let timeout = parse_duration(timeout).context("Invalid --timeout")?;
    let client = GrpcRegistryClient::new(timeout).with_proxy_config(ProxyConfig::from_env());
    let source = CatalogSource::new(name, namespace, address);

    let entities = client
        .list_entities(&source)
        .await
        .with_context(|| format!("Failed to list entities from {}", source.address))?;
    info!(count = entities.len(), source = %source.key(), "Fetched entities");

    println!("{}", serde_json::to_string_pretty(&entities)?);
    Ok(())
}

async fn cmd_resolve(path: &std::path::Path, wait: &str) -> Result<()> {
    let config = CatalogConfig::load(path)?;
    let wait = parse_duration(wait).context("Invalid --wait")?;

    let store = InMemoryCatalogSourceStore::with_sources(config.catalog_sources.clone());
    let cache = Arc::new(EntityCache::new(
        Arc::new(config.registry_client()?),
        Arc::new(store),
        config.cache_config()?,
    ));

    let cancel = CancellationToken::new();
    let handle = cache.spawn(cancel.clone());

    tokio::time::timeout(wait, cache.wait_until_serving())
        .await
        .context("Timed out waiting for the initial catalog sync")??;
    info!(
        sources = cache.sources().len(),
        entities = cache.entity_count(),
        "Catalog cache ready"
    );

    let requests = Arc::new(InMemoryInstallRequestStore::new(config.install_requests.clone()));
    let entities: Arc<dyn EntitySource> = cache.clone();
    let resolver = OperatorResolver::with_default_solver(requests, entities);
    let outcome = resolver.resolve().await;

    cancel.cancel();
    handle.await.context("Cache task panicked")??;
    let solution = outcome.context("Resolution failed")?;

    let mut selected = Vec::new();
    for request in &config.install_requests {
        let bundle = bundle_for_package(&solution, &request.package_name)?;
        selected.push(serde_json::json!({
            "name": request.name,
            "package": request.package_name,
            "bundle": bundle.as_ref().map(|b| b.id().to_string()),
            "bundlePath": bundle.as_ref().map(|b| b.bundle_path()).transpose()?,
        }));
    }

    println!("{}", serde_json::to_string_pretty(&selected)?);
    Ok(())
}
