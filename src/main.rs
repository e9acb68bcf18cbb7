//! BlazeKV server entry point.
//!
//! Startup order matters: parse arguments, load the snapshot into the
//! keyspace, start the expiry sweeper, kick off the replica handshake when
//! configured as one, and only then start accepting clients.

use blazekv::commands::CommandHandler;
use blazekv::config::{Environment, Role, ServerConfig};
use blazekv::connection::{handle_connection, ConnectionStats};
use blazekv::replication::handshake;
use blazekv::snapshot;
use blazekv::storage::{ExpirySweeper, StorageEngine, DEFAULT_SWEEP_INTERVAL};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn print_help() {
    println!(
        r#"
BlazeKV - A Redis-subset in-memory key-value server

USAGE:
    blazekv [OPTIONS]

OPTIONS:
    --dir <PATH>              Directory holding the snapshot file (default: .)
    --dbfilename <NAME>       Snapshot filename (default: dump.rdb)
    --port <PORT>             Port to listen on (default: 6379)
    --replicaof "<HOST> <PORT>"
                              Bootstrap as a replica of the given master
    --version                 Print version information
    --help                    Print this help message

EXAMPLES:
    blazekv                                 # master on 127.0.0.1:6379
    blazekv --port 6380                     # master on another port
    blazekv --dir /data --dbfilename db.rdb # load /data/db.rdb at startup
    blazekv --port 6380 --replicaof "localhost 6379"
"#
    );
}

fn config_from_args() -> ServerConfig {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.iter().any(|a| a == "--help") {
        print_help();
        std::process::exit(0);
    }
    if args.iter().any(|a| a == "--version") {
        println!("BlazeKV version {}", blazekv::VERSION);
        std::process::exit(0);
    }

    match ServerConfig::parse_args(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            print_help();
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config_from_args();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let env = Arc::new(Environment::new(&config));
    info!(
        version = blazekv::VERSION,
        port = env.port,
        role = env.role.as_str(),
        "starting BlazeKV"
    );

    // Seed the keyspace before anyone can talk to it. A missing snapshot
    // file means a fresh start; a corrupt one is fatal.
    let storage = Arc::new(StorageEngine::new());
    let loaded = snapshot::load(&config.snapshot_path())?;
    let (kept, dropped) = storage.bulk_load(
        loaded
            .entries
            .into_iter()
            .map(|e| (e.key, e.value, e.expires_at)),
    );
    info!(
        path = %config.snapshot_path().display(),
        loaded = kept,
        expired = dropped,
        "keyspace seeded from snapshot"
    );

    let _sweeper = ExpirySweeper::start(Arc::clone(&storage), DEFAULT_SWEEP_INTERVAL);

    // A replica bootstraps on its own connection and its own task; client
    // serving starts regardless.
    if env.role == Role::Slave {
        if let Some(master) = env.replica_of.clone() {
            let storage = Arc::clone(&storage);
            let port = env.port;
            tokio::spawn(async move {
                match handshake::run(&master, port).await {
                    Ok(outcome) => match snapshot::parse(&outcome.snapshot) {
                        Ok(parsed) => {
                            let (kept, dropped) = storage.bulk_load(
                                parsed
                                    .entries
                                    .into_iter()
                                    .map(|e| (e.key, e.value, e.expires_at)),
                            );
                            info!(loaded = kept, expired = dropped, "applied master snapshot");
                        }
                        Err(e) => warn!(error = %e, "master snapshot did not parse"),
                    },
                    Err(e) => error!(error = %e, "replica bootstrap failed"),
                }
            });
        }
    }

    let bind_addr = format!("{}:{}", blazekv::DEFAULT_HOST, env.port);
    let listener = TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "listening");

    let stats = Arc::new(ConnectionStats::new());

    let shutdown = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
        info!("shutdown signal received");
    };

    tokio::select! {
        _ = accept_loop(listener, storage.clone(), env, stats) => {}
        _ = shutdown => {}
    }

    let stats = storage.stats();
    info!(
        keys = stats.keys,
        gets = stats.get_ops,
        sets = stats.set_ops,
        "server shutdown complete"
    );
    Ok(())
}

/// Accepts clients forever, one task each.
async fn accept_loop(
    listener: TcpListener,
    storage: Arc<StorageEngine>,
    env: Arc<Environment>,
    stats: Arc<ConnectionStats>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let commands = CommandHandler::new(Arc::clone(&storage), Arc::clone(&env));
                let stats = Arc::clone(&stats);
                tokio::spawn(async move {
                    handle_connection(stream, addr, commands, stats).await;
                });
            }
            Err(e) => {
                error!(error = %e, "failed to accept connection");
            }
        }
    }
}
