// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::blueprint::PoolBlueprint;
use crate::error::{PoolError, Result};
use crate::gathered::Gathered;
use crate::map_options::MapOptions;
use crate::partitioner::split_items;
use crate::star_fn::StarFn;
use crate::worker_pool::{Job, WorkerInit, WorkerPool};
use crate::worker_task::WorkerTask;
use log::{debug, info, warn};
use std::sync::Arc;

/// Pool coordinator: splits each batch over a fixed set of workers and gives
/// every worker task its own resource for the whole partition.
///
/// The live pool is released by `close`, or on drop if `close` was never
/// called, so workers are joined on every exit path.
pub struct SessionPool<P: WorkerPool, R> {
    blueprint: PoolBlueprint<R>,
    pool: Option<P>,
}

impl<P: WorkerPool, R: 'static> SessionPool<P, R> {
    /// Validates the blueprint and starts the underlying pool
    pub fn start(blueprint: PoolBlueprint<R>) -> Result<Self> {
        let workers = blueprint.worker_count();
        if workers == 0 {
            return Err(PoolError::InvalidWorkerCount(workers));
        }

        let init = blueprint.initializer_hook().cloned().map(|hook| {
            let args = blueprint.config().initializer_args.clone();
            Arc::new(move |worker: usize| {
                debug!("Running initializer on worker {}", worker);
                hook(&args)
            }) as WorkerInit
        });

        info!("Starting session pool with {} workers", workers);
        let pool = P::start(workers, init)?;

        Ok(Self {
            blueprint,
            pool: Some(pool),
        })
    }

    /// Starts a pool, runs `body` with it and closes it again, reporting
    /// the first error from either
    pub fn scope<X>(
        blueprint: PoolBlueprint<R>,
        body: impl FnOnce(&Self) -> Result<X>,
    ) -> Result<X> {
        let mut pool = Self::start(blueprint)?;
        let outcome = body(&pool);
        let closed = pool.close();
        let value = outcome?;
        closed?;
        Ok(value)
    }

    /// Applies `func(item, &mut resource)` to every item.
    ///
    /// Flattened results are partition-major: all of partition 0's results,
    /// then partition 1's, and so on. Any failing partition fails the call.
    pub fn map<T, U, F>(&self, func: F, items: Vec<T>, options: MapOptions) -> Result<Gathered<U>>
    where
        T: Send + 'static,
        U: Send + 'static,
        F: Fn(T, &mut R) -> anyhow::Result<U> + Send + Sync + 'static,
    {
        let outcomes = self.dispatch(Arc::new(func), items, &options)?;
        let failed = outcomes.iter().filter(|outcome| outcome.is_err()).count();
        if failed > 0 {
            warn!("{} of {} partitions failed", failed, outcomes.len());
        }

        let partitions = outcomes.into_iter().collect::<Result<Vec<_>>>()?;
        Ok(Gathered::from_partitions(partitions, options.flatten))
    }

    /// Like `map`, but each item is a tuple unpacked into positional
    /// arguments ahead of the resource
    pub fn starmap<Args, F>(
        &self,
        func: F,
        items: Vec<Args>,
        options: MapOptions,
    ) -> Result<Gathered<F::Output>>
    where
        Args: Send + 'static,
        F: StarFn<Args, R> + Send + Sync + 'static,
        F::Output: Send + 'static,
    {
        self.map(
            move |args: Args, resource: &mut R| func.call_star(args, resource),
            items,
            options,
        )
    }

    /// Like `map`, but reports every partition's outcome separately so
    /// successful partitions survive a failing one. The outer error is
    /// reserved for usage errors.
    pub fn map_settled<T, U, F>(
        &self,
        func: F,
        items: Vec<T>,
        options: MapOptions,
    ) -> Result<Vec<Result<Vec<U>>>>
    where
        T: Send + 'static,
        U: Send + 'static,
        F: Fn(T, &mut R) -> anyhow::Result<U> + Send + Sync + 'static,
    {
        self.dispatch(Arc::new(func), items, &options)
    }

    pub fn starmap_settled<Args, F>(
        &self,
        func: F,
        items: Vec<Args>,
        options: MapOptions,
    ) -> Result<Vec<Result<Vec<F::Output>>>>
    where
        Args: Send + 'static,
        F: StarFn<Args, R> + Send + Sync + 'static,
        F::Output: Send + 'static,
    {
        self.map_settled(
            move |args: Args, resource: &mut R| func.call_star(args, resource),
            items,
            options,
        )
    }

    fn dispatch<T, U, F>(
        &self,
        func: Arc<F>,
        items: Vec<T>,
        options: &MapOptions,
    ) -> Result<Vec<Result<Vec<U>>>>
    where
        T: Send + 'static,
        U: Send + 'static,
        F: Fn(T, &mut R) -> anyhow::Result<U> + Send + Sync + 'static,
    {
        let pool = self.pool.as_ref().ok_or(PoolError::Closed)?;
        let chunk_size = options.effective_chunk_size()?;
        let workers = pool.workers();
        let total = items.len();

        let partitions = split_items(items, workers)?;
        debug!(
            "Dispatching {} items over {} partitions (chunk size {})",
            total, workers, chunk_size
        );

        let jobs: Vec<Job<Vec<U>>> = partitions
            .into_iter()
            .enumerate()
            .map(|(partition, items)| {
                let task = WorkerTask::new(
                    partition,
                    workers,
                    items,
                    Arc::clone(self.blueprint.factory()),
                    self.blueprint.config().resource_args.clone(),
                    Arc::clone(&func),
                );
                Box::new(move || task.run()) as Job<Vec<U>>
            })
            .collect();

        Ok(pool.run_batch(jobs, chunk_size))
    }

    /// Shuts the pool down and joins its workers
    pub fn close(&mut self) -> Result<()> {
        let mut pool = self.pool.take().ok_or(PoolError::AlreadyClosed)?;
        info!("Closing session pool with {} workers", pool.workers());
        pool.shutdown()
    }
}

impl<P: WorkerPool, R> SessionPool<P, R> {
    /// Transferable configuration of this pool, without the live handle
    pub fn blueprint(&self) -> PoolBlueprint<R> {
        self.blueprint.clone()
    }

    pub fn workers(&self) -> usize {
        self.blueprint.worker_count()
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_none()
    }
}

impl<P: WorkerPool, R> Drop for SessionPool<P, R> {
    fn drop(&mut self) {
        if let Some(mut pool) = self.pool.take() {
            debug!("Session pool dropped while open, shutting down");
            if let Err(e) = pool.shutdown() {
                warn!("Failed to shut down session pool: {}", e);
            }
        }
    }
}
