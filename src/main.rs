use anyhow::Context;
use possync::{init_db, Config, HttpVenueReader, Repository, SyncRunner, VenueTradeReader};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %format!("{:#}", e), "Sync run failed");
        eprintln!("Sync run failed: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = Config::from_env().context("loading configuration")?;

    let pool = init_db(&config.database_path)
        .await
        .with_context(|| format!("opening database at {}", config.database_path))?;

    let repo = Arc::new(Repository::new(pool));
    let venue: Arc<dyn VenueTradeReader> =
        Arc::new(HttpVenueReader::new(config.venue_api_url.clone()));

    let outcome = SyncRunner::new(repo, venue, config.sync_settings())
        .run()
        .await?;

    println!("{}", serde_json::to_string(&outcome)?);
    Ok(())
}
