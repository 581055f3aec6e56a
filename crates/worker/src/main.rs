//! `palettepool-worker` -- load driver for the palette worker pool.
//!
//! Spawns a pool of loopback computation units, pushes a burst of palette
//! round-trip jobs through it and logs the outcome. Useful for watching
//! queueing and failure isolation under load.
//!
//! Pool sizing reads `PALETTEPOOL_*` variables (see `PoolConfig`); the
//! load itself reads `LOAD_*` variables (see `LoadConfig`).

mod load;

use palettepool_core::PoolConfig;
use palettepool_engine::{ComputeUnit, LoopbackEngine};
use palettepool_pool::PoolFactory;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::load::LoadConfig;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "palettepool_worker=info,palettepool_pool=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let pool_config = PoolConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid pool configuration");
        std::process::exit(1);
    });
    let load_config = LoadConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid load configuration");
        std::process::exit(1);
    });

    tracing::info!(
        pool_size = pool_config.resolved_pool_size(),
        jobs = load_config.jobs,
        latency_ms = load_config.latency.as_millis() as u64,
        failure_every = load_config.failure_every,
        "Starting palettepool-worker",
    );

    let latency = load_config.latency;
    let factory = PoolFactory::new(pool_config, move |worker_id| {
        ComputeUnit::spawn(
            format!("palette-unit-{worker_id}"),
            LoopbackEngine::with_latency(latency),
        )
    });

    let pool = match factory.get_pool().await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start worker pool");
            std::process::exit(1);
        }
    };

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Ctrl-C received, stopping");
                shutdown.cancel();
            }
        }
    });

    tokio::select! {
        report = load::run(&pool, &load_config) => {
            tracing::info!(
                succeeded = report.succeeded,
                failed = report.failed,
                rejected = report.rejected,
                max_depth = report.max_depth,
                "Load run finished",
            );
        }
        _ = shutdown.cancelled() => {
            tracing::warn!("Load run interrupted; queued jobs were not awaited");
        }
    }

    load::log_stats(&pool.stats());
}
