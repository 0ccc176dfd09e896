// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Thread-local identity of the pool worker running the current code.

use std::cell::Cell;

thread_local! {
    static WORKER_ID: Cell<Option<usize>> = const { Cell::new(None) };
}

/// Marks the current thread as pool worker `worker_id`.
/// Called by pool implementations when a worker thread starts.
pub fn bind_worker(worker_id: usize) {
    WORKER_ID.with(|id| id.set(Some(worker_id)));
}

/// Id of the pool worker running on this thread, `None` outside a pool
pub fn current_worker() -> Option<usize> {
    WORKER_ID.with(Cell::get)
}
