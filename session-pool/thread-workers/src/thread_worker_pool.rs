// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use anyhow::anyhow;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use log::{debug, warn};
use session_pool_core::worker_context::bind_worker;
use session_pool_core::worker_pool::{in_submission_order, into_chunks, panic_message};
use session_pool_core::{Job, PoolError, Result, WorkerInit, WorkerPool};
use std::panic::{self, AssertUnwindSafe};
use std::thread;

/// Type-erased job that reports its own result
type Thunk = Box<dyn FnOnce() + Send>;

/// Fixed set of OS threads pulling chunks of jobs from one shared queue
pub struct ThreadWorkerPool {
    handles: Vec<thread::JoinHandle<()>>,
    chunk_tx: Option<Sender<Vec<Thunk>>>,
    size: usize,
}

impl WorkerPool for ThreadWorkerPool {
    fn start(workers: usize, init: Option<WorkerInit>) -> Result<Self> {
        if workers == 0 {
            return Err(PoolError::InvalidWorkerCount(workers));
        }

        let (chunk_tx, chunk_rx) = unbounded::<Vec<Thunk>>();
        let (ready_tx, ready_rx) = bounded::<(usize, anyhow::Result<()>)>(workers);

        let mut pool = Self {
            handles: Vec::with_capacity(workers),
            chunk_tx: Some(chunk_tx),
            size: workers,
        };

        for worker_id in 0..workers {
            let chunk_rx = chunk_rx.clone();
            let ready_tx = ready_tx.clone();
            let init = init.clone();

            let spawned = thread::Builder::new()
                .name(format!("session-worker-{}", worker_id))
                .spawn(move || {
                    bind_worker(worker_id);
                    let ready = run_initializer(worker_id, init.as_ref());
                    let initialized = ready.is_ok();
                    let _ = ready_tx.send((worker_id, ready));
                    drop(ready_tx);

                    if initialized {
                        worker_loop(worker_id, chunk_rx);
                    }
                });

            match spawned {
                Ok(handle) => pool.handles.push(handle),
                Err(e) => {
                    pool.shutdown()?;
                    return Err(PoolError::Spawn(e));
                }
            }
        }
        drop(ready_tx);

        // Wait until every worker has run its initializer
        let mut failure = None;
        for _ in 0..workers {
            match ready_rx.recv() {
                Ok((_, Ok(()))) => {}
                Ok((worker, Err(source))) => {
                    warn!("Worker {} failed to initialize: {:#}", worker, source);
                    failure.get_or_insert(PoolError::Initializer { worker, source });
                }
                Err(_) => break,
            }
        }

        if let Some(failure) = failure {
            pool.shutdown()?;
            return Err(failure);
        }

        debug!("Started {} worker threads", workers);
        Ok(pool)
    }

    fn workers(&self) -> usize {
        self.size
    }

    fn run_batch<T: Send + 'static>(&self, jobs: Vec<Job<T>>, chunk_size: usize) -> Vec<Result<T>> {
        let len = jobs.len();
        let Some(chunk_tx) = self.chunk_tx.as_ref() else {
            return (0..len).map(|_| Err(PoolError::Closed)).collect();
        };

        let (result_tx, result_rx) = unbounded::<(usize, Result<T>)>();

        for chunk in into_chunks(jobs, chunk_size) {
            let thunks: Vec<Thunk> = chunk
                .into_iter()
                .map(|(index, job)| {
                    let result_tx = result_tx.clone();
                    Box::new(move || {
                        let result = panic::catch_unwind(AssertUnwindSafe(job)).unwrap_or_else(
                            |payload| {
                                let message = panic_message(payload);
                                warn!("Job {} panicked: {}", index, message);
                                Err(PoolError::WorkerPanicked {
                                    job: index,
                                    message,
                                })
                            },
                        );
                        let _ = result_tx.send((index, result));
                    }) as Thunk
                })
                .collect();

            if chunk_tx.send(thunks).is_err() {
                warn!("Worker queue closed while dispatching, remaining jobs are lost");
                break;
            }
        }
        drop(result_tx);

        // Ends once every thunk has run (or been dropped) and released its sender
        in_submission_order(len, result_rx.iter())
    }

    fn shutdown(&mut self) -> Result<()> {
        // Closing the queue lets each worker finish its current chunk and exit
        self.chunk_tx.take();

        for handle in self.handles.drain(..) {
            let name = handle.thread().name().unwrap_or("session-worker").to_string();
            if handle.join().is_err() {
                warn!("Worker thread {} panicked", name);
            }
        }
        Ok(())
    }
}

impl Drop for ThreadWorkerPool {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

fn run_initializer(worker_id: usize, init: Option<&WorkerInit>) -> anyhow::Result<()> {
    let Some(init) = init else {
        return Ok(());
    };
    panic::catch_unwind(AssertUnwindSafe(|| init(worker_id))).unwrap_or_else(|payload| {
        Err(anyhow!(
            "initializer panicked: {}",
            panic_message(payload)
        ))
    })
}

fn worker_loop(worker_id: usize, chunk_rx: Receiver<Vec<Thunk>>) {
    debug!("Worker {} ready", worker_id);
    while let Ok(chunk) = chunk_rx.recv() {
        for thunk in chunk {
            thunk();
        }
    }
    debug!("Worker {} stopping", worker_id);
}
