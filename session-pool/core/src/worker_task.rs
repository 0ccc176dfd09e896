// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::blueprint::ResourceFactory;
use crate::error::{PoolError, Result};
use crate::factory_args::FactoryArgs;
use log::{debug, warn};
use std::sync::Arc;

/// One partition's worth of work, plus what it needs to build its resource.
///
/// The resource only exists inside `run`: it is built on the worker that
/// executes the task and dropped when the task returns, so it never has to
/// be `Send`.
pub struct WorkerTask<T, R, F> {
    partition: usize,
    stride: usize,
    items: Vec<T>,
    factory: ResourceFactory<R>,
    args: FactoryArgs,
    func: Arc<F>,
}

impl<T, R, F> WorkerTask<T, R, F> {
    /// `stride` is the partition count, used to report failing items by
    /// their index in the original batch
    pub fn new(
        partition: usize,
        stride: usize,
        items: Vec<T>,
        factory: ResourceFactory<R>,
        args: FactoryArgs,
        func: Arc<F>,
    ) -> Self {
        Self {
            partition,
            stride,
            items,
            factory,
            args,
            func,
        }
    }

    /// Builds the resource once, then applies the function to every item in
    /// order. The first failure ends the task.
    pub fn run<U>(self) -> Result<Vec<U>>
    where
        F: Fn(T, &mut R) -> anyhow::Result<U>,
    {
        let partition = self.partition;

        let mut resource = (self.factory)(&self.args).map_err(|source| {
            warn!("Partition {} could not build its resource: {:#}", partition, source);
            PoolError::ResourceFactory { partition, source }
        })?;
        debug!(
            "Partition {} built its resource, processing {} items",
            partition,
            self.items.len()
        );

        let mut results = Vec::with_capacity(self.items.len());
        for (position, item) in self.items.into_iter().enumerate() {
            let value = (self.func)(item, &mut resource).map_err(|source| {
                let item = partition + position * self.stride;
                warn!("Partition {} failed on item {}: {:#}", partition, item, source);
                PoolError::TargetFunction {
                    partition,
                    item,
                    source,
                }
            })?;
            results.push(value);
        }

        debug!("Partition {} finished {} items", partition, results.len());
        Ok(results)
    }
}
