//! Lazy, idempotent construction of the process-wide worker pool.

use std::sync::Arc;

use palettepool_core::{PoolConfig, WorkerId};
use tokio::sync::OnceCell;

use crate::error::PoolError;
use crate::pool::WorkerPool;

type Spawner<U> = Arc<dyn Fn(WorkerId) -> Result<U, String> + Send + Sync>;

/// Builds a [`WorkerPool`] on first use and hands out the same pool
/// afterwards.
///
/// Concurrent first callers all await one in-flight initialization, so at
/// most one set of units is ever spawned. If initialization fails the
/// cell stays empty and the next call tries again.
pub struct PoolFactory<U> {
    config: PoolConfig,
    spawner: Spawner<U>,
    pool: OnceCell<Arc<WorkerPool<U>>>,
}

impl<U: Send + Sync + 'static> PoolFactory<U> {
    /// `spawner` is called once per worker, on a blocking thread, with
    /// the id that worker will carry.
    pub fn new<F, E>(config: PoolConfig, spawner: F) -> Self
    where
        F: Fn(WorkerId) -> Result<U, E> + Send + Sync + 'static,
        E: std::fmt::Display,
    {
        Self {
            config,
            spawner: Arc::new(move |id| spawner(id).map_err(|e| e.to_string())),
            pool: OnceCell::new(),
        }
    }

    /// Get the pool, creating it if this is the first call.
    pub async fn get_pool(&self) -> Result<Arc<WorkerPool<U>>, PoolError> {
        let pool = self.pool.get_or_try_init(|| self.init()).await?;
        Ok(Arc::clone(pool))
    }

    /// The pool, if it has been created already.
    pub fn get(&self) -> Option<Arc<WorkerPool<U>>> {
        self.pool.get().cloned()
    }

    pub fn is_initialized(&self) -> bool {
        self.pool.initialized()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    async fn init(&self) -> Result<Arc<WorkerPool<U>>, PoolError> {
        let size = self.config.resolved_pool_size();
        tracing::info!(size, "Spawning computation units");

        let spawner = Arc::clone(&self.spawner);
        let units = tokio::task::spawn_blocking(move || {
            (0..size)
                .map(|i| {
                    let worker_id = WorkerId(i);
                    spawner(worker_id).map_err(|reason| PoolError::UnitSpawn { worker_id, reason })
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(|e| PoolError::Init(e.to_string()))?;

        let units = units.inspect_err(|e| {
            tracing::error!(error = %e, "Worker pool initialization failed");
        })?;

        WorkerPool::with_units(units, &self.config).map(Arc::new)
    }
}

impl<U> std::fmt::Debug for PoolFactory<U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolFactory")
            .field("config", &self.config)
            .field("initialized", &self.pool.initialized())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use assert_matches::assert_matches;

    use super::*;

    fn counting_factory(size: usize) -> (PoolFactory<WorkerId>, Arc<AtomicUsize>) {
        let spawned = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&spawned);
        let factory = PoolFactory::new(PoolConfig::default().with_pool_size(size), move |id| {
            counter.fetch_add(1, Ordering::SeqCst);
            // Give racing callers a chance to pile up on the cell.
            std::thread::sleep(std::time::Duration::from_millis(5));
            Ok::<_, String>(id)
        });
        (factory, spawned)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_calls_share_one_pool() {
        let (factory, spawned) = counting_factory(3);
        let factory = Arc::new(factory);

        let calls: Vec<_> = (0..8)
            .map(|_| {
                let factory = Arc::clone(&factory);
                tokio::spawn(async move { factory.get_pool().await })
            })
            .collect();

        let mut pools = Vec::new();
        for call in futures::future::join_all(calls).await {
            pools.push(call.unwrap().unwrap());
        }

        assert!(pools.iter().all(|p| Arc::ptr_eq(p, &pools[0])));
        assert_eq!(spawned.load(Ordering::SeqCst), 3);
        assert_eq!(pools[0].size(), 3);
    }

    #[tokio::test]
    async fn units_carry_their_worker_ids() {
        let (factory, _) = counting_factory(2);
        let pool = factory.get_pool().await.unwrap();

        let ids = futures::future::join_all(
            (0..2).map(|_| pool.submit(|lease| async move { Ok::<_, String>(*lease.unit()) })),
        )
        .await;
        let mut ids: Vec<_> = ids.into_iter().map(Result::unwrap).collect();
        ids.sort_by_key(|id| id.0);
        assert_eq!(ids, vec![WorkerId(0), WorkerId(1)]);
    }

    #[tokio::test]
    async fn get_is_empty_until_first_call() {
        let (factory, _) = counting_factory(1);
        assert!(factory.get().is_none());
        assert!(!factory.is_initialized());

        let pool = factory.get_pool().await.unwrap();
        assert!(factory.is_initialized());
        assert!(Arc::ptr_eq(&factory.get().unwrap(), &pool));
    }

    #[tokio::test]
    async fn failed_spawn_leaves_factory_retryable() {
        let fail = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&fail);
        let factory = PoolFactory::new(PoolConfig::default().with_pool_size(2), move |id| {
            if id == WorkerId(1) && flag.load(Ordering::SeqCst) {
                return Err("engine binary missing".to_string());
            }
            Ok(id)
        });

        let err = factory.get_pool().await.unwrap_err();
        assert_matches!(
            err,
            PoolError::UnitSpawn { worker_id: WorkerId(1), ref reason } if reason == "engine binary missing"
        );
        assert!(!factory.is_initialized());

        fail.store(false, Ordering::SeqCst);
        let pool = factory.get_pool().await.unwrap();
        assert_eq!(pool.size(), 2);
    }

    #[tokio::test]
    async fn explicit_size_is_clamped() {
        let (factory, spawned) = counting_factory(0);
        // A zero size never passes `validate`, but a hand-built config can
        // still carry one.
        let pool = factory.get_pool().await.unwrap();
        assert_eq!(pool.size(), 1);
        assert_eq!(spawned.load(Ordering::SeqCst), 1);
    }
}
