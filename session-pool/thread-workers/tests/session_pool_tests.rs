// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use session_pool_core::{
    current_worker, partitioner::split_items, FactoryArgs, MapOptions, PoolBlueprint, PoolConfig,
    PoolError,
};
use session_pool_threads::ThreadSessionPool;
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Stand-in for a network session: remembers who built it and what it served
struct Session {
    id: usize,
    built_on: Option<usize>,
    served: Vec<String>,
}

fn session_blueprint(workers: usize) -> (PoolBlueprint<Session>, Arc<AtomicUsize>) {
    let built = Arc::new(AtomicUsize::new(0));
    let counter = built.clone();
    let blueprint = PoolBlueprint::new(move |_: &FactoryArgs| {
        Ok(Session {
            id: counter.fetch_add(1, Ordering::SeqCst),
            built_on: current_worker(),
            served: Vec::new(),
        })
    })
    .workers(workers);
    (blueprint, built)
}

fn fetch(item: String, session: &mut Session) -> anyhow::Result<(String, usize)> {
    session.served.push(item.clone());
    Ok((item, session.id))
}

fn fetch_with_timeout(
    url: String,
    timeout_ms: u64,
    session: &mut Session,
) -> anyhow::Result<(String, u64, usize)> {
    session.served.push(url.clone());
    Ok((url, timeout_ms, session.id))
}

// ============================================================
// Partitioning
// ============================================================

#[test]
fn test_scenario_a_ten_items_three_partitions() {
    let partitions = split_items((1..=10).collect::<Vec<i32>>(), 3).unwrap();
    assert_eq!(
        partitions,
        vec![vec![1, 4, 7, 10], vec![2, 5, 8], vec![3, 6, 9]]
    );
}

#[test]
fn test_scenario_a_through_pool_grouped() {
    let (blueprint, _) = session_blueprint(3);
    let pool = ThreadSessionPool::start(blueprint).unwrap();

    let groups = pool
        .map(
            |item: i32, _: &mut Session| Ok(item),
            (1..=10).collect(),
            MapOptions::default().grouped(),
        )
        .unwrap()
        .into_groups()
        .unwrap();

    assert_eq!(groups, vec![vec![1, 4, 7, 10], vec![2, 5, 8], vec![3, 6, 9]]);
}

// ============================================================
// Empty input
// ============================================================

#[test]
fn test_scenario_b_empty_input_flat() {
    let (blueprint, built) = session_blueprint(4);
    let pool = ThreadSessionPool::start(blueprint).unwrap();

    let flat = pool
        .map(fetch, Vec::new(), MapOptions::default())
        .unwrap()
        .into_flat();

    assert!(flat.is_empty());
    // every worker task still builds its session
    assert_eq!(built.load(Ordering::SeqCst), 4);
}

#[test]
fn test_scenario_b_empty_input_grouped() {
    let (blueprint, _) = session_blueprint(4);
    let pool = ThreadSessionPool::start(blueprint).unwrap();

    let groups = pool
        .map(fetch, Vec::new(), MapOptions::default().grouped())
        .unwrap()
        .into_groups()
        .unwrap();

    assert_eq!(groups.len(), 4);
    assert!(groups.iter().all(Vec::is_empty));
}

// ============================================================
// Resource affinity
// ============================================================

#[test]
fn test_scenario_c_two_sessions_partition_major_order() {
    let (blueprint, built) = session_blueprint(2);
    let pool = ThreadSessionPool::start(blueprint).unwrap();

    let items: Vec<String> = ["a", "b", "c", "d", "e"].iter().map(|s| s.to_string()).collect();
    let results = pool
        .map(fetch, items, MapOptions::default())
        .unwrap()
        .into_flat();

    assert_eq!(results.len(), 5);
    let order: Vec<&str> = results.iter().map(|(item, _)| item.as_str()).collect();
    assert_eq!(order, vec!["a", "c", "e", "b", "d"]);

    let ids: HashSet<usize> = results.iter().map(|(_, id)| *id).collect();
    assert_eq!(ids.len(), 2);
    assert_eq!(results[0].1, results[1].1);
    assert_eq!(results[1].1, results[2].1);
    assert_eq!(results[3].1, results[4].1);
    assert_ne!(results[0].1, results[3].1);
    assert_eq!(built.load(Ordering::SeqCst), 2);
}

#[test]
fn test_liveness_one_session_per_worker_task_across_many_items() {
    let (blueprint, built) = session_blueprint(4);
    let pool = ThreadSessionPool::start(blueprint).unwrap();

    let results = pool
        .map(
            |item: usize, session: &mut Session| {
                session.served.push(item.to_string());
                Ok((session.id, session.built_on, session.served.len()))
            },
            (0..100).collect(),
            MapOptions::default(),
        )
        .unwrap()
        .into_flat();

    assert_eq!(built.load(Ordering::SeqCst), 4);
    let ids: HashSet<usize> = results.iter().map(|(id, _, _)| *id).collect();
    assert_eq!(ids.len(), 4);
    // each session was built on a pool worker, not the calling thread
    assert!(results.iter().all(|(_, built_on, _)| built_on.is_some()));
    // the session carried state across its 25 items
    assert_eq!(results.iter().map(|(_, _, n)| *n).max(), Some(25));
}

#[test]
fn test_liveness_sessions_are_rebuilt_per_call() {
    let (blueprint, built) = session_blueprint(3);
    let pool = ThreadSessionPool::start(blueprint).unwrap();

    for _ in 0..2 {
        pool.map(
            |item: u8, _: &mut Session| Ok(item),
            vec![1, 2, 3],
            MapOptions::default(),
        )
        .unwrap();
    }

    assert_eq!(built.load(Ordering::SeqCst), 6);
}

#[test]
fn test_liveness_non_send_resource() {
    let blueprint =
        PoolBlueprint::new(|_: &FactoryArgs| Ok(Rc::new(RefCell::new(Vec::<u32>::new())))).workers(2);
    let pool = ThreadSessionPool::start(blueprint).unwrap();

    let totals = pool
        .map(
            |item: u32, log: &mut Rc<RefCell<Vec<u32>>>| {
                log.borrow_mut().push(item);
                Ok(log.borrow().iter().sum::<u32>())
            },
            vec![1, 2, 3, 4],
            MapOptions::default(),
        )
        .unwrap()
        .into_flat();

    // partition 0 = [1, 3], partition 1 = [2, 4]
    assert_eq!(totals, vec![1, 4, 2, 6]);
}

// ============================================================
// Star mode
// ============================================================

#[test]
fn test_scenario_d_starmap_unpacks_arguments() {
    let (blueprint, _) = session_blueprint(2);
    let pool = ThreadSessionPool::start(blueprint).unwrap();

    let items = vec![("x1".to_string(), 100u64), ("x2".to_string(), 200u64)];
    let results = pool
        .starmap(fetch_with_timeout, items, MapOptions::default())
        .unwrap()
        .into_flat();

    assert_eq!(results.len(), 2);
    assert_eq!((results[0].0.as_str(), results[0].1), ("x1", 100));
    assert_eq!((results[1].0.as_str(), results[1].1), ("x2", 200));
    assert_ne!(results[0].2, results[1].2);
}

#[test]
fn test_starmap_grouped_one_item_per_worker() {
    let (blueprint, _) = session_blueprint(3);
    let pool = ThreadSessionPool::start(blueprint).unwrap();

    let urls = ["https://pypi.org/", "https://git.io", "https://gentoo.org"];
    let items: Vec<(String, u64)> = urls.iter().map(|u| (u.to_string(), 6)).collect();
    let groups = pool
        .starmap(fetch_with_timeout, items, MapOptions::default().grouped())
        .unwrap()
        .into_groups()
        .unwrap();

    assert_eq!(groups.len(), 3);
    assert!(groups.iter().all(|g| g.len() == 1));
    assert_eq!(groups[2][0].0, "https://gentoo.org");
}

// ============================================================
// Chunk size
// ============================================================

#[test]
fn test_chunk_size_does_not_change_results() {
    let expected: Vec<usize> = {
        let (blueprint, _) = session_blueprint(4);
        let pool = ThreadSessionPool::start(blueprint).unwrap();
        pool.map(|i: usize, _: &mut Session| Ok(i * i), (0..23).collect(), MapOptions::default())
            .unwrap()
            .into_flat()
    };

    for chunk_size in [1, 2, 4, 9] {
        let (blueprint, built) = session_blueprint(4);
        let pool = ThreadSessionPool::start(blueprint).unwrap();
        let flat = pool
            .map(
                |i: usize, _: &mut Session| Ok(i * i),
                (0..23).collect(),
                MapOptions::default().chunk_size(chunk_size),
            )
            .unwrap()
            .into_flat();
        assert_eq!(flat, expected, "chunk size {}", chunk_size);
        assert_eq!(built.load(Ordering::SeqCst), 4);
    }
}

#[test]
fn test_safety_zero_chunk_size_rejected() {
    let (blueprint, built) = session_blueprint(2);
    let pool = ThreadSessionPool::start(blueprint).unwrap();

    let err = pool
        .map(fetch, vec!["a".to_string()], MapOptions::default().chunk_size(0))
        .unwrap_err();
    assert!(matches!(err, PoolError::InvalidChunkSize(0)));
    assert_eq!(built.load(Ordering::SeqCst), 0);
}

// ============================================================
// Failures
// ============================================================

#[test]
fn test_factory_runs_on_worker_threads() {
    let blueprint = PoolBlueprint::new(|_: &FactoryArgs| match current_worker() {
        Some(worker) => Ok(worker),
        None => anyhow::bail!("factory called outside the pool"),
    })
    .workers(3);
    let pool = ThreadSessionPool::start(blueprint).unwrap();

    let workers: HashSet<usize> = pool
        .map(
            |_: u8, worker: &mut usize| Ok(*worker),
            vec![0; 9],
            MapOptions::default(),
        )
        .unwrap()
        .into_flat()
        .into_iter()
        .collect();
    assert!(workers.iter().all(|w| *w < 3));
}

#[test]
fn test_safety_failure_scenario_worker_one_of_three() {
    let built = Arc::new(Mutex::new(Vec::new()));
    let log = built.clone();
    // the factory cannot see the partition, so it fails on the second build
    // and every other build succeeds; with chunk size 3 the builds happen in
    // partition order on a single worker
    let blueprint = PoolBlueprint::new(move |_: &FactoryArgs| {
        let mut log = log.lock().unwrap();
        let n = log.len();
        log.push(n);
        if n == 1 {
            anyhow::bail!("connection refused");
        }
        Ok(n)
    })
    .workers(3);
    let pool = ThreadSessionPool::start(blueprint).unwrap();

    let err = pool
        .map(
            |item: u32, _: &mut usize| Ok(item),
            (0..9).collect(),
            MapOptions::default().chunk_size(3),
        )
        .unwrap_err();

    match err {
        PoolError::ResourceFactory { partition, source } => {
            assert_eq!(partition, 1);
            assert_eq!(source.to_string(), "connection refused");
        }
        other => panic!("Expected ResourceFactory error, got {:?}", other),
    }
    // the other partitions still ran to completion
    assert_eq!(built.lock().unwrap().len(), 3);
}

#[test]
fn test_safety_target_failure_fails_call() {
    let (blueprint, _) = session_blueprint(3);
    let pool = ThreadSessionPool::start(blueprint).unwrap();

    let err = pool
        .map(
            |item: u32, _: &mut Session| {
                if item == 7 {
                    anyhow::bail!("HTTP 503");
                }
                Ok(item)
            },
            (0..12).collect(),
            MapOptions::default(),
        )
        .unwrap_err();

    assert!(matches!(
        err,
        PoolError::TargetFunction {
            partition: 1,
            item: 7,
            ..
        }
    ));
}

#[test]
fn test_settled_mode_reports_each_partition() {
    let (blueprint, _) = session_blueprint(3);
    let pool = ThreadSessionPool::start(blueprint).unwrap();

    let outcomes = pool
        .map_settled(
            |item: u32, _: &mut Session| {
                if item == 7 {
                    anyhow::bail!("HTTP 503");
                }
                Ok(item)
            },
            (0..9).collect(),
            MapOptions::default(),
        )
        .unwrap();

    assert_eq!(outcomes[0].as_ref().unwrap(), &vec![0, 3, 6]);
    assert!(matches!(
        outcomes[1],
        Err(PoolError::TargetFunction { partition: 1, .. })
    ));
    assert_eq!(outcomes[2].as_ref().unwrap(), &vec![2, 5, 8]);
}

#[test]
fn test_starmap_settled() {
    let (blueprint, _) = session_blueprint(2);
    let pool = ThreadSessionPool::start(blueprint).unwrap();

    let outcomes = pool
        .starmap_settled(
            fetch_with_timeout,
            vec![("a".to_string(), 1), ("b".to_string(), 2), ("c".to_string(), 3)],
            MapOptions::default(),
        )
        .unwrap();

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].as_ref().unwrap().len(), 2);
    assert_eq!(outcomes[1].as_ref().unwrap().len(), 1);
}

#[test]
fn test_panicking_target_reported_and_pool_reusable() {
    let (blueprint, _) = session_blueprint(2);
    let pool = ThreadSessionPool::start(blueprint).unwrap();

    let err = pool
        .map(
            |item: u8, _: &mut Session| -> anyhow::Result<u8> {
                if item == 1 {
                    panic!("unexpected payload");
                }
                Ok(item)
            },
            vec![0, 1],
            MapOptions::default(),
        )
        .unwrap_err();
    assert!(matches!(err, PoolError::WorkerPanicked { job: 1, .. }));

    let flat = pool
        .map(|item: u8, _: &mut Session| Ok(item), vec![0, 1], MapOptions::default())
        .unwrap()
        .into_flat();
    assert_eq!(flat, vec![0, 1]);
}

// ============================================================
// Lifecycle
// ============================================================

#[test]
fn test_safety_zero_workers_rejected_at_construction() {
    let (blueprint, built) = session_blueprint(0);
    let err = ThreadSessionPool::start(blueprint).err().unwrap();
    assert!(matches!(err, PoolError::InvalidWorkerCount(0)));
    assert_eq!(built.load(Ordering::SeqCst), 0);
}

#[test]
fn test_safety_close_twice_and_use_after_close() {
    let (blueprint, _) = session_blueprint(2);
    let mut pool = ThreadSessionPool::start(blueprint).unwrap();

    pool.close().unwrap();
    assert!(matches!(pool.close(), Err(PoolError::AlreadyClosed)));
    assert!(matches!(
        pool.map(fetch, vec!["a".to_string()], MapOptions::default()),
        Err(PoolError::Closed)
    ));
    assert!(matches!(
        pool.starmap(fetch_with_timeout, vec![("a".to_string(), 1)], MapOptions::default()),
        Err(PoolError::Closed)
    ));
}

#[test]
fn test_scope_releases_pool_after_error() {
    let (blueprint, _) = session_blueprint(2);
    let result = ThreadSessionPool::scope(blueprint, |pool| {
        pool.map(
            |_: u8, _: &mut Session| -> anyhow::Result<u8> { anyhow::bail!("down") },
            vec![1],
            MapOptions::default(),
        )
    });
    assert!(matches!(result, Err(PoolError::TargetFunction { .. })));
}

#[test]
fn test_initializer_runs_on_every_worker() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let (blueprint, _) = session_blueprint(3);
    let blueprint = blueprint.initializer(
        move |args| {
            let tag: String = serde_json::from_value(args[0].clone())?;
            sink.lock().unwrap().push((tag, current_worker()));
            Ok(())
        },
        vec![serde_json::json!("warm")],
    );

    let _pool = ThreadSessionPool::start(blueprint).unwrap();
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 3);
    let workers: HashSet<Option<usize>> = seen.iter().map(|(_, w)| *w).collect();
    assert_eq!(workers, [Some(0), Some(1), Some(2)].into_iter().collect());
    assert!(seen.iter().all(|(tag, _)| tag == "warm"));
}

#[test]
fn test_failing_initializer_fails_construction() {
    let (blueprint, _) = session_blueprint(2);
    let blueprint = blueprint.initializer(|_| anyhow::bail!("missing certificate"), Vec::new());

    let err = ThreadSessionPool::start(blueprint).err().unwrap();
    assert!(matches!(err, PoolError::Initializer { .. }));
}

// ============================================================
// Blueprint transfer
// ============================================================

#[test]
fn test_blueprint_config_round_trip_starts_equivalent_pool() {
    let args = FactoryArgs::new().named_arg("prefix", "conn").unwrap();
    let factory_blueprint = PoolBlueprint::new(|args: &FactoryArgs| args.named::<String>("prefix"))
        .workers(2)
        .resource_args(args);
    let pool = ThreadSessionPool::start(factory_blueprint).unwrap();

    let json = serde_json::to_string(pool.blueprint().config()).unwrap();
    let config: PoolConfig = serde_json::from_str(&json).unwrap();
    let rebuilt = PoolBlueprint::with_config(config, pool.blueprint().factory().clone());
    let copy = ThreadSessionPool::start(rebuilt).unwrap();

    let flat = copy
        .map(
            |item: u8, prefix: &mut String| Ok(format!("{}-{}", prefix, item)),
            vec![1, 2],
            MapOptions::default(),
        )
        .unwrap()
        .into_flat();
    assert_eq!(flat, vec!["conn-1", "conn-2"]);
    assert_eq!(copy.workers(), 2);
}

#[test]
fn test_blueprint_started_inside_worker_task() {
    let (outer, _) = session_blueprint(2);
    let (inner, inner_built) = session_blueprint(2);
    let pool = ThreadSessionPool::start(outer).unwrap();

    let flat = pool
        .map(
            move |item: u32, _: &mut Session| {
                let nested = ThreadSessionPool::start(inner.clone())?;
                let doubled = nested
                    .map(|x: u32, _: &mut Session| Ok(x * 2), vec![item, item], MapOptions::default())?
                    .into_flat();
                Ok(doubled.iter().sum::<u32>())
            },
            vec![1, 2, 3],
            MapOptions::default(),
        )
        .unwrap()
        .into_flat();

    assert_eq!(flat, vec![4, 12, 8]);
    assert_eq!(inner_built.load(Ordering::SeqCst), 6);
}
