// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

mod config;
mod echo_server;
mod echo_session;
mod protocol;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use config::Config;
use echo_server::EchoServer;
use echo_session::{echo_once, echo_repeated, EchoSession};
use log::info;
use protocol::EchoReply;
use session_pool_core::{FactoryArgs, Gathered, MapOptions, PoolBlueprint, SessionPool, WorkerPool};
use session_pool_threads::ThreadWorkerPool;
use session_pool_tokio::TokioWorkerPool;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Backend {
    Thread,
    Tokio,
}

/// Fans echo requests out over a session pool, one TCP session per worker task
#[derive(Debug, Parser)]
struct Args {
    #[arg(long, default_value = "config.json")]
    config: String,
    #[arg(long)]
    workers: Option<usize>,
    #[arg(long)]
    messages: Option<usize>,
    #[arg(long, value_enum, default_value_t = Backend::Thread)]
    backend: Backend,
    /// Report one result list per worker task instead of a flat list
    #[arg(long)]
    grouped: bool,
}

fn random_message(len: usize) -> String {
    (0..len.max(1)).map(|_| fastrand::alphanumeric()).collect()
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let start_time = Instant::now();
    let args = Args::parse();

    let mut config = match Config::load(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load {}: {:#}", args.config, e);
            eprintln!("Using default configuration...");
            Config::default()
        }
    };
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(messages) = args.messages {
        config.messages = messages;
    }

    println!("=== ECHO SESSIONS ===");
    println!("Configuration:");
    println!("  - Backend: {:?}", args.backend);
    println!("  - Workers: {}", config.workers);
    println!("  - Messages: {}", config.messages);
    println!("  - Message length: {}", config.message_length);
    println!("  - Max repeat: {}", config.max_repeat);
    println!("  - Chunk size: {}", config.chunk_size);
    println!("  - Grouped: {}", args.grouped);

    // The server gets its own runtime; the pool is driven from this thread
    let server_runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("echo-server")
        .enable_all()
        .build()
        .context("building server runtime")?;
    let server = server_runtime
        .block_on(EchoServer::bind("127.0.0.1:0"))
        .context("binding echo server")?;
    let addr = server.local_addr()?;
    let connections = server.connections();
    let token = server.cancellation_token();
    let server_handle = server_runtime.spawn(server.run());
    println!("\nEcho server listening on {}", addr);

    let blueprint = PoolBlueprint::new(EchoSession::connect)
        .workers(config.workers)
        .resource_args(
            FactoryArgs::new()
                .named_arg("addr", addr.to_string())?
                .named_arg("timeout_ms", config.read_timeout_ms)?,
        );

    let outcome = match args.backend {
        Backend::Thread => {
            run_demo::<ThreadWorkerPool>(blueprint, &config, args.grouped, &connections)
        }
        Backend::Tokio => {
            run_demo::<TokioWorkerPool>(blueprint, &config, args.grouped, &connections)
        }
    };

    token.cancel();
    server_runtime
        .block_on(server_handle)
        .context("echo server task failed")?;
    server_runtime.shutdown_timeout(Duration::from_secs(1));

    outcome?;
    println!("\nTotal time: {:.2?}", start_time.elapsed());
    Ok(())
}

fn run_demo<P: WorkerPool>(
    blueprint: PoolBlueprint<EchoSession>,
    config: &Config,
    grouped: bool,
    connections: &AtomicUsize,
) -> anyhow::Result<()> {
    let mut pool = SessionPool::<P, EchoSession>::start(blueprint)?;
    let workers = pool.workers();
    let options = MapOptions::default()
        .flatten(!grouped)
        .chunk_size(config.chunk_size);

    let messages: Vec<String> = (0..config.messages)
        .map(|_| random_message(config.message_length))
        .collect();

    println!("\n--- map: {} messages ---", messages.len());
    let before = connections.load(Ordering::SeqCst);
    let replies = pool.map(echo_once, messages.clone(), options)?;
    report(replies)?;
    verify_sessions(connections, before, workers)?;

    let starred: Vec<(String, usize)> = messages
        .into_iter()
        .map(|message| (message, fastrand::usize(1..=config.max_repeat.max(1))))
        .collect();

    println!("\n--- starmap: {} (message, repeat) pairs ---", starred.len());
    let before = connections.load(Ordering::SeqCst);
    let replies = pool.starmap(echo_repeated, starred, options)?;
    report(replies)?;
    verify_sessions(connections, before, workers)?;

    pool.close()?;
    Ok(())
}

fn report(replies: Gathered<EchoReply>) -> anyhow::Result<()> {
    match replies {
        Gathered::Flat(replies) => {
            for reply in &replies {
                println!(
                    "  conn {} #{}: {}",
                    reply.connection, reply.sequence, reply.echoed
                );
            }
        }
        Gathered::Grouped(groups) => {
            for (partition, group) in groups.iter().enumerate() {
                let used: BTreeSet<usize> = group.iter().map(|r| r.connection).collect();
                if used.len() > 1 {
                    bail!(
                        "Worker task {} used {} connections: {:?}",
                        partition,
                        used.len(),
                        used
                    );
                }
                println!(
                    "  worker task {}: {} replies on connection {:?}",
                    partition,
                    group.len(),
                    used.iter().next()
                );
            }
        }
    }
    Ok(())
}

/// Waits for the server to account for every session opened by one call
fn verify_sessions(connections: &AtomicUsize, before: usize, expected: usize) -> anyhow::Result<()> {
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        let opened = connections.load(Ordering::SeqCst) - before;
        if opened == expected {
            info!("Server saw {} sessions for {} worker tasks", opened, expected);
            println!("✓ One session per worker task ({})", expected);
            return Ok(());
        }
        if opened > expected || Instant::now() >= deadline {
            bail!("Expected {} sessions, server saw {}", expected, opened);
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}
