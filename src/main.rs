use std::{process::ExitCode, sync::Arc};

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use watch_recommender::{
    cli::{Cli, Command},
    config::Config,
    db::{create_pool, create_redis_client, run_migrations, Cache, PgStore, RecommendationStore},
    services::{providers::tmdb::catalog_rate_limiter, BatchOrchestrator, TmdbProvider},
};

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr, stdout carries the JSON result
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let command = Cli::parse().command();

    match run(command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "watch-recommender failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> Result<()> {
    let config = Config::from_env()?;

    let pool = create_pool(&config.database_url, config.db_max_connections).await?;
    if config.run_migrations {
        run_migrations(&pool).await?;
    }

    let redis_client = create_redis_client(&config.redis_url)?;
    let (cache, cache_handle) = Cache::new(redis_client);

    let rate_limiter = Arc::new(catalog_rate_limiter(
        config.catalog_requests_per_second,
        config.catalog_burst,
    )?);
    let catalog = TmdbProvider::new(
        cache,
        pool.clone(),
        config.tmdb_api_key.clone(),
        config.tmdb_api_url.clone(),
        rate_limiter,
    )
    .with_cache_ttl(config.attribute_cache_ttl)
    .with_max_retries(config.catalog_max_retries);

    let store = Arc::new(PgStore::new(pool, config.purge_stale_recommendations));

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, finishing in-flight users");
                cancel.cancel();
            }
        }
    });

    let orchestrator = BatchOrchestrator::new(
        store.clone(),
        store.clone(),
        Arc::new(catalog),
        config.engine_settings(),
    )
    .with_concurrency(config.user_concurrency)
    .with_cancellation(cancel);

    let result = execute(orchestrator, store.as_ref(), command).await;

    // Flush pending attribute cache writes even when the command failed
    cache_handle.shutdown().await;

    result
}

async fn execute(
    orchestrator: BatchOrchestrator,
    store: &dyn RecommendationStore,
    command: Command,
) -> Result<()> {
    match command {
        Command::Run { dry_run, user } => {
            let orchestrator = orchestrator.with_dry_run(dry_run);
            let summary = match user {
                Some(user_id) => orchestrator.run_for_users(vec![user_id]).await,
                None => orchestrator.run().await?,
            };
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Similar { user, limit } => {
            let similar = orchestrator.engine().find_similar_users(user, limit).await?;
            println!("{}", serde_json::to_string_pretty(&similar)?);
        }
        Command::Recommend { user } => {
            let recommendations = orchestrator.engine().recommend(user).await?;
            println!("{}", serde_json::to_string_pretty(&recommendations)?);
        }
        Command::Show { user, limit } => {
            let stored = store.get_recommendations(user, limit).await?;
            println!("{}", serde_json::to_string_pretty(&stored)?);
        }
    }

    Ok(())
}
