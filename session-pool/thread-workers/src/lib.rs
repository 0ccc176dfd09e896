// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

mod thread_worker_pool;
pub use thread_worker_pool::ThreadWorkerPool;

/// Session pool backed by OS threads
pub type ThreadSessionPool<R> = session_pool_core::SessionPool<ThreadWorkerPool, R>;
