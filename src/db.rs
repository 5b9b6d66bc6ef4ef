use log::{debug, error, info, warn};
use postgres::{Client, NoTls};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::store::{EventStore, StoreError};
use crate::telemetry::EventRecord;

const DEFAULT_MIGRATION_DIRS: [&str; 2] = ["migrations", "/app/migrations"];
const MAX_CONNECT_RETRIES: u32 = 30;

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Client>>,
}

fn load_available_migrations(dir: Option<&str>) -> Vec<(String, String)> {
    let mut migrations = Vec::new();
    let candidates: Vec<&str> = match dir {
        Some(d) => vec![d],
        None => DEFAULT_MIGRATION_DIRS.to_vec(),
    };

    let Some(base) = candidates.iter().map(|d| Path::new(*d)).find(|p| p.is_dir()) else {
        warn!("[db] no migrations directory found (checked {:?})", candidates);
        return migrations;
    };

    debug!("[db] loading migrations from {}", base.display());
    if let Ok(entries) = std::fs::read_dir(base) {
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|ext| ext.to_str()) != Some("sql") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            match std::fs::read_to_string(&path) {
                Ok(sql) => migrations.push((name.to_string(), sql)),
                Err(e) => warn!("[db] failed to read migration {}: {}", path.display(), e),
            }
        }
    }

    migrations.sort_by(|a, b| a.0.cmp(&b.0));
    migrations
}

fn run_migrations(client: &mut Client, dir: Option<&str>) -> Result<usize, postgres::Error> {
    info!("[db] checking for database migrations");

    client.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            id SERIAL PRIMARY KEY,
            name TEXT UNIQUE NOT NULL,
            applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
        &[],
    )?;

    let migrations = load_available_migrations(dir);
    if migrations.is_empty() {
        warn!("[db] no migration files found");
        return Ok(0);
    }

    let mut applied = 0;
    for (name, sql) in migrations {
        let rows = client.query("SELECT id FROM _migrations WHERE name = $1", &[&name])?;
        if !rows.is_empty() {
            debug!("[db] migration {} already applied", name);
            continue;
        }

        info!("[db] applying migration: {}", name);
        let mut transaction = client.transaction()?;
        transaction.batch_execute(&sql)?;
        transaction.execute("INSERT INTO _migrations (name) VALUES ($1)", &[&name])?;
        transaction.commit()?;
        applied += 1;
        info!("[db] migration {} applied successfully", name);
    }

    Ok(applied)
}

impl Database {
    /// Connect, retrying once a second, then bring the schema up to date.
    pub fn try_open(url: &str, migrations_dir: Option<&str>) -> Result<Self, StoreError> {
        info!("[db] opening PostgreSQL database");
        let mut retry_count = 0;
        let mut client = loop {
            match Client::connect(url, NoTls) {
                Ok(c) => break c,
                Err(e) => {
                    retry_count += 1;
                    if retry_count >= MAX_CONNECT_RETRIES {
                        error!(
                            "[db] failed to connect to PostgreSQL after {} retries: {}",
                            MAX_CONNECT_RETRIES, e
                        );
                        return Err(StoreError::Connect(format!(
                            "gave up after {} retries: {}",
                            MAX_CONNECT_RETRIES, e
                        )));
                    }
                    warn!(
                        "[db] failed to connect to PostgreSQL, retrying ({}/{}): {}",
                        retry_count, MAX_CONNECT_RETRIES, e
                    );
                    std::thread::sleep(std::time::Duration::from_secs(1));
                }
            }
        };

        let applied = run_migrations(&mut client, migrations_dir)?;
        info!(
            "[db] PostgreSQL database opened, {} new migrations applied",
            applied
        );
        Ok(Database {
            conn: Arc::new(Mutex::new(client)),
        })
    }

    /// Acquire the database connection, recovering from mutex poisoning.
    fn conn(&self) -> MutexGuard<'_, Client> {
        self.conn.lock().unwrap_or_else(|e| {
            warn!("[db] mutex was poisoned, recovering connection");
            e.into_inner()
        })
    }
}

impl EventStore for Database {
    fn append(&self, record: &EventRecord) -> Result<(), StoreError> {
        debug!(
            "[db] inserting telemetry event page={}, minute={}",
            record.page, record.minute_timestamp
        );
        let mut conn = self.conn();
        conn.execute(
            "INSERT INTO telemetry_events (page, timestamp, minute_timestamp)
             VALUES ($1, $2, $3)",
            &[&record.page, &record.timestamp, &record.minute_timestamp],
        )?;
        Ok(())
    }

    fn since(&self, start_key: &str, page: Option<&str>) -> Result<Vec<EventRecord>, StoreError> {
        debug!(
            "[db] listing telemetry events since={}, page={:?}",
            start_key, page
        );
        let mut conn = self.conn();
        let rows = match page {
            Some(page) => conn.query(
                "SELECT page, timestamp, minute_timestamp FROM telemetry_events
                 WHERE minute_timestamp >= $1 AND page = $2",
                &[&start_key, &page],
            )?,
            None => conn.query(
                "SELECT page, timestamp, minute_timestamp FROM telemetry_events
                 WHERE minute_timestamp >= $1",
                &[&start_key],
            )?,
        };

        Ok(rows
            .into_iter()
            .map(|row| EventRecord {
                page: row.get(0),
                timestamp: row.get(1),
                minute_timestamp: row.get(2),
            })
            .collect())
    }

    fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn();
        conn.simple_query("SELECT 1")?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}
