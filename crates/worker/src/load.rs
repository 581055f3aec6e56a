//! Synthetic load against a worker pool.

use std::time::Duration;

use futures::future::join_all;
use palettepool_core::CoreError;
use palettepool_engine::UnitClient;
use palettepool_pool::{DispatchEvent, JobError, PoolStats, WorkerPool};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

const DEFAULT_JOBS: usize = 64;
const DEFAULT_LATENCY_MS: u64 = 20;

/// Shape of the synthetic load.
///
/// | Variable             | Default | Description                              |
/// |----------------------|---------|------------------------------------------|
/// | `LOAD_JOBS`          | `64`    | Number of jobs to submit                 |
/// | `LOAD_LATENCY_MS`    | `20`    | Simulated engine latency per operation   |
/// | `LOAD_FAILURE_EVERY` | `0`     | Make every Nth job fail (`0` = never)    |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadConfig {
    pub jobs: usize,
    pub latency: Duration,
    pub failure_every: usize,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            jobs: DEFAULT_JOBS,
            latency: Duration::from_millis(DEFAULT_LATENCY_MS),
            failure_every: 0,
        }
    }
}

impl LoadConfig {
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parse = |key: &str| -> Result<Option<u64>, CoreError> {
            match lookup(key) {
                None => Ok(None),
                Some(raw) => raw
                    .trim()
                    .parse()
                    .map(Some)
                    .map_err(|e| CoreError::Config(format!("{key}={raw:?} is invalid: {e}"))),
            }
        };

        Ok(Self {
            jobs: parse("LOAD_JOBS")?.map_or(defaults.jobs, |v| v as usize),
            latency: parse("LOAD_LATENCY_MS")?
                .map_or(defaults.latency, Duration::from_millis),
            failure_every: parse("LOAD_FAILURE_EVERY")?
                .map_or(defaults.failure_every, |v| v as usize),
        })
    }

    fn should_fail(&self, job: usize) -> bool {
        self.failure_every != 0 && (job + 1) % self.failure_every == 0
    }
}

/// Outcome tally for one load run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub succeeded: usize,
    pub failed: usize,
    pub rejected: usize,
    pub max_depth: usize,
}

/// Submit `config.jobs` palette round trips and wait for all of them.
pub async fn run(pool: &WorkerPool<UnitClient>, config: &LoadConfig) -> LoadReport {
    let events = pool.subscribe();
    let stop = CancellationToken::new();
    let depth_watch = tokio::spawn(watch_depth(events, stop.clone()));

    let handles: Vec<_> = (0..config.jobs)
        .map(|job| {
            let fail = config.should_fail(job);
            pool.submit(move |unit| async move {
                let pixels = sample_image(job);
                let generated = unit.gen_palette(pixels.clone(), 4, job as u64).await?;
                // An empty palette is refused before it reaches the engine.
                let palette = if fail { Vec::new() } else { generated.palette };
                let encoded = unit.encode_image(palette.clone(), pixels.clone()).await?;
                let decoded = unit.decode_image(palette, encoded).await?;
                unit.compute_loss(pixels, decoded).await
            })
        })
        .collect();

    let mut report = LoadReport::default();
    for result in join_all(handles).await {
        match result {
            Ok(_) => report.succeeded += 1,
            Err(JobError::QueueFull { .. }) => report.rejected += 1,
            Err(e) => {
                tracing::debug!(error = %e, "Load job did not succeed");
                report.failed += 1;
            }
        }
    }

    stop.cancel();
    report.max_depth = depth_watch.await.unwrap_or_default();
    report
}

/// Track the deepest queue position seen until `stop` fires.
async fn watch_depth(
    mut events: broadcast::Receiver<DispatchEvent>,
    stop: CancellationToken,
) -> usize {
    let mut max_depth = 0;
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            event = events.recv() => match event {
                Ok(DispatchEvent::Queued { depth, .. }) => max_depth = max_depth.max(depth),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event watcher lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    max_depth
}

pub fn log_stats(stats: &PoolStats) {
    tracing::info!(
        size = stats.size,
        idle = stats.idle,
        busy = stats.busy,
        pending = stats.pending,
        submitted = stats.submitted,
        completed = stats.completed,
        failed = stats.failed,
        rejected = stats.rejected,
        "Pool stats",
    );
}

/// A small striped RGBA image; the stripe colour varies with `seed`.
fn sample_image(seed: usize) -> Vec<u8> {
    let shade = (seed % 256) as u8;
    (0..64)
        .flat_map(|i| {
            if i % 2 == 0 {
                [shade, 0, 255 - shade, 255]
            } else {
                [0, shade, 0, 255]
            }
        })
        .collect()
}
