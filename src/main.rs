mod config;
mod db;
mod links;
mod store;
mod telemetry;
mod web;

use log::{error, info};
use std::env;
use std::process;
use std::sync::Arc;

use config::{Config, StoreKind};
use store::{EventStore, MemoryStore, StoreError};
use telemetry::{Aggregator, Range, Recorder, SystemClock, ALL_PAGES};

fn open_store(config: &Config) -> Result<Arc<dyn EventStore>, StoreError> {
    match config.store {
        StoreKind::Memory => {
            info!("[main] using in-memory event store; events are lost on exit");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreKind::Postgres => {
            let database = db::Database::try_open(&config.database_url, config.migrations_dir.as_deref())?;
            Ok(Arc::new(database))
        }
    }
}

fn open_store_or_exit(config: &Config) -> Arc<dyn EventStore> {
    open_store(config).unwrap_or_else(|e| {
        error!("[main] failed to open event store: {}", e);
        process::exit(1);
    })
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => {
            error!("[main] failed to serialize output: {}", e);
            process::exit(1);
        }
    }
}

// The sync postgres client drives its own runtime, so the store is opened
// and CLI commands run before any tokio runtime exists.
fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");

    info!("[main] pageviews starting, command={}", command);

    match command {
        "serve" => {
            let config = Config::from_env();
            info!(
                "[main] serve: addr={}, store={:?}, public_base_url={}",
                config.bind_addr(),
                config.store,
                config.public_base_url
            );

            let state = web::AppState {
                store: open_store_or_exit(&config),
                clock: Arc::new(SystemClock),
                public_base_url: config.public_base_url.clone(),
            };

            let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
                error!("[main] failed to start async runtime: {}", e);
                process::exit(1);
            });
            if let Err(e) = runtime.block_on(web::start_server(state, &config.bind_addr())) {
                error!("[main] server error: {}", e);
                process::exit(1);
            }
        }
        "record" => {
            let Some(page) = args.get(2) else {
                error!("[record] usage: pageviews record <page> [timestamp]");
                process::exit(2);
            };
            let timestamp = args.get(3).map(|s| s.as_str());

            let config = Config::from_env();
            let store = open_store_or_exit(&config);
            match Recorder::new(store.as_ref(), &SystemClock).record(page, timestamp) {
                Ok(record) => print_json(&record),
                Err(e) => {
                    error!("[record] {}", e);
                    process::exit(1);
                }
            }
        }
        "stats" => {
            let range = Range::parse(args.get(2).map(|s| s.as_str()).unwrap_or("hour"));
            let page = args.get(3).map(|s| s.as_str()).unwrap_or(ALL_PAGES);

            let config = Config::from_env();
            let store = open_store_or_exit(&config);
            match Aggregator::new(store.as_ref(), &SystemClock).query(range, Some(page)) {
                Ok(buckets) => print_json(&buckets),
                Err(e) => {
                    error!("[stats] failed to fetch telemetry stats: {}", e);
                    process::exit(1);
                }
            }
        }
        "migrate" => {
            let config = Config::from_env();
            match db::Database::try_open(&config.database_url, config.migrations_dir.as_deref()) {
                Ok(_) => info!("[migrate] database schema is up to date"),
                Err(e) => {
                    error!("[migrate] {}", e);
                    process::exit(1);
                }
            }
        }
        other => {
            if other != "help" {
                error!("[main] unknown command: {}", other);
            }
            println!("pageviews - page visit telemetry and contract-call links");
            println!();
            println!("Usage:");
            println!("  pageviews serve                      Start the HTTP API");
            println!("  pageviews record <page> [timestamp]  Record one page visit");
            println!("  pageviews stats [range] [page]       Print the bucketed series (range: hour|day|week)");
            println!("  pageviews migrate                    Apply database migrations");
            println!();
            println!("Environment variables:");
            println!("  PORT             HTTP port (default: 8080)");
            println!("  BIND_HOST        Bind address (default: 0.0.0.0)");
            println!("  DATABASE_URL     PostgreSQL connection string");
            println!("  STORE            postgres | memory (default: postgres)");
            println!("  PUBLIC_BASE_URL  Origin used in generated links (default: http://localhost:PORT)");
            println!("  MIGRATIONS_DIR   Directory of .sql migrations (default: ./migrations, /app/migrations)");
        }
    }
}
