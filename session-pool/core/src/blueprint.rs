// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::factory_args::FactoryArgs;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Builds one auxiliary resource from its argument bundle
pub type ResourceFactory<R> = Arc<dyn Fn(&FactoryArgs) -> anyhow::Result<R> + Send + Sync>;

/// Hook run once on every worker when it starts
pub type Initializer = Arc<dyn Fn(&[Value]) -> anyhow::Result<()> + Send + Sync>;

/// Worker count used when none is configured
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_workers() -> usize {
    default_worker_count()
}

/// Serializable part of a pool's configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub resource_args: FactoryArgs,
    #[serde(default)]
    pub initializer_args: Vec<Value>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: default_worker_count(),
            resource_args: FactoryArgs::default(),
            initializer_args: Vec::new(),
        }
    }
}

/// Everything needed to start a session pool, without the live pool itself.
///
/// A blueprint is cheap to clone and can be moved into other threads or
/// tasks; starting it there builds a fresh, local pool handle.
pub struct PoolBlueprint<R> {
    config: PoolConfig,
    factory: ResourceFactory<R>,
    initializer: Option<Initializer>,
}

impl<R> PoolBlueprint<R> {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(&FactoryArgs) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        Self {
            config: PoolConfig::default(),
            factory: Arc::new(factory),
            initializer: None,
        }
    }

    /// Rebuilds a blueprint from a previously serialized configuration
    pub fn with_config(config: PoolConfig, factory: ResourceFactory<R>) -> Self {
        Self {
            config,
            factory,
            initializer: None,
        }
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    pub fn resource_args(mut self, args: FactoryArgs) -> Self {
        self.config.resource_args = args;
        self
    }

    pub fn initializer<F>(mut self, initializer: F, args: Vec<Value>) -> Self
    where
        F: Fn(&[Value]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.initializer = Some(Arc::new(initializer));
        self.config.initializer_args = args;
        self
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn worker_count(&self) -> usize {
        self.config.workers
    }

    pub fn factory(&self) -> &ResourceFactory<R> {
        &self.factory
    }

    pub fn initializer_hook(&self) -> Option<&Initializer> {
        self.initializer.as_ref()
    }

    /// Calls the factory with the configured arguments
    pub fn build_resource(&self) -> anyhow::Result<R> {
        (self.factory)(&self.config.resource_args)
    }
}

impl<R> Clone for PoolBlueprint<R> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            factory: Arc::clone(&self.factory),
            initializer: self.initializer.clone(),
        }
    }
}

impl<R> fmt::Debug for PoolBlueprint<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolBlueprint")
            .field("config", &self.config)
            .field("initializer", &self.initializer.is_some())
            .finish_non_exhaustive()
    }
}
