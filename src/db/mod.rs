//! Scan history store. A dedicated worker thread owns the SQLite connection;
//! async callers hand it closures over a channel and await the reply, so no
//! connection handle ever crosses an await point.

use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use log::{error, info};
use rusqlite::{params, Connection};
use tokio::sync::oneshot;

mod migrations;

use crate::models::{ScanHistoryEntry, ScanOutcome};
use migrations::run_migrations;

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct DatabaseInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(DbCommand::Shutdown) {
                error!("failed to send shutdown to DB thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("failed to join DB thread: {join_err:?}");
            }
        }
    }
}

fn parse_datetime(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| anyhow!("invalid datetime '{value}': {err}"))
}

fn outcome_from_str(value: &str) -> Result<ScanOutcome> {
    match value {
        "Success" => Ok(ScanOutcome::Success),
        "Failed" => Ok(ScanOutcome::Failed),
        "Error" => Ok(ScanOutcome::Error),
        _ => Err(anyhow!("unknown scan outcome '{value}'")),
    }
}

/// Per-outcome row counts over the whole history.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutcomeTotals {
    pub success: u64,
    pub failed: u64,
    pub error: u64,
}

#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
    db_path: Arc<PathBuf>,
}

impl Database {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = db_path.clone();

        let worker = thread::Builder::new()
            .name("attendscan-db".into())
            .spawn(move || {
                let mut conn = match Connection::open(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(anyhow::Error::new(err)
                            .context("failed to open SQLite database")));
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("failed to enable WAL mode: {err}");
                }

                let init_result =
                    run_migrations(&mut conn).context("failed to run database migrations");
                if ready_tx.send(init_result).is_err() {
                    error!("DB initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => {
                            task(&mut conn);
                        }
                        DbCommand::Shutdown => break,
                    }
                }

                info!("database thread shutting down");
            })
            .with_context(|| "failed to spawn database worker thread")?;

        ready_rx
            .recv()
            .context("database worker exited before signaling readiness")??;

        info!("scan history database ready at {}", db_path.display());

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            db_path: Arc::new(db_path),
        })
    }

    pub fn path(&self) -> &Path {
        self.db_path.as_path()
    }

    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.inner.sender.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("DB caller dropped before receiving result");
            }
        }));

        sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to DB thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database thread terminated unexpectedly"))?
    }

    pub async fn insert_scan(&self, entry: &ScanHistoryEntry) -> Result<()> {
        let record = entry.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO scan_history (id, timestamp, outcome, detail, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.id,
                    record.timestamp.to_rfc3339(),
                    record.outcome.as_str(),
                    record.detail,
                    record.payload,
                ],
            )
            .with_context(|| "failed to insert scan history entry")?;
            Ok(())
        })
        .await
    }

    /// Most-recent-first, capped at `limit` (the visible history window).
    pub async fn recent_scans(&self, limit: u32) -> Result<Vec<ScanHistoryEntry>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, timestamp, outcome, detail, payload
                 FROM scan_history
                 ORDER BY timestamp DESC
                 LIMIT ?1",
            )?;

            let mut rows = stmt.query(params![limit])?;
            let mut entries = Vec::new();
            while let Some(row) = rows.next()? {
                entries.push(ScanHistoryEntry {
                    id: row.get(0)?,
                    timestamp: parse_datetime(&row.get::<_, String>(1)?)?,
                    outcome: outcome_from_str(&row.get::<_, String>(2)?)?,
                    detail: row.get(3)?,
                    payload: row.get(4)?,
                });
            }

            Ok(entries)
        })
        .await
    }

    pub async fn outcome_totals(&self) -> Result<OutcomeTotals> {
        self.execute(|conn| {
            let mut stmt =
                conn.prepare("SELECT outcome, COUNT(*) FROM scan_history GROUP BY outcome")?;

            let mut rows = stmt.query([])?;
            let mut totals = OutcomeTotals::default();
            while let Some(row) = rows.next()? {
                let count: i64 = row.get(1)?;
                let count = u64::try_from(count).unwrap_or(0);
                match outcome_from_str(&row.get::<_, String>(0)?)? {
                    ScanOutcome::Success => totals.success = count,
                    ScanOutcome::Failed => totals.failed = count,
                    ScanOutcome::Error => totals.error = count,
                }
            }

            Ok(totals)
        })
        .await
    }
}
