// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

mod error;
pub use error::{PoolError, Result};

pub mod partitioner;
pub use partitioner::split_items;

mod factory_args;
pub use factory_args::FactoryArgs;

mod blueprint;
pub use blueprint::{default_worker_count, Initializer, PoolBlueprint, PoolConfig, ResourceFactory};

pub mod star_fn;
pub use star_fn::StarFn;

mod worker_task;
pub use worker_task::WorkerTask;

pub mod worker_pool;
pub use worker_pool::{Job, WorkerInit, WorkerPool};

pub mod worker_context;
pub use worker_context::current_worker;

mod gathered;
pub use gathered::Gathered;

mod map_options;
pub use map_options::MapOptions;

mod session_pool;
pub use session_pool::SessionPool;
