// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

mod tokio_worker_pool;
pub use tokio_worker_pool::TokioWorkerPool;

/// Session pool backed by a dedicated tokio runtime
pub type TokioSessionPool<R> = session_pool_core::SessionPool<TokioWorkerPool, R>;
