//! libSQL storage layer for the normalized housing dataset.
//!
//! The [`Storage`] struct wraps one long-lived libSQL connection. Every
//! [`EntityKind`] has its own table keyed by the kind's declared primary key,
//! and [`Storage::upsert`] writes rows idempotently under a [`ConflictPolicy`].
//!
//! **Access rules:**
//! - pipelines: read-write (sole writer) via [`Storage::open`]
//! - reporting commands: read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use housing_shared::{ConflictPolicy, DatahubError, EntityKind, FieldValue, Locale, Result, Row};
use libsql::params::Params;
use libsql::{Connection, Database, Value, params};
use tracing::{debug, instrument};
use uuid::Uuid;

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
    policy: ConflictPolicy,
}

/// One finished pipeline run, as recorded in the run ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub id: String,
    pub pipeline: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub partitions: u64,
    pub rows_written: u64,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    ///
    /// Write-ahead journaling is required; open fails if the engine refuses it.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DatahubError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatahubError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| DatahubError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
            policy: ConflictPolicy::default(),
        };
        storage.enable_wal().await?;
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DatahubError::Storage(format!(
                "database not found: {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatahubError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| DatahubError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
            policy: ConflictPolicy::default(),
        })
    }

    /// Set the policy applied when an upserted row's key already exists.
    pub fn with_policy(mut self, policy: ConflictPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    async fn enable_wal(&self) -> Result<()> {
        let mut rows = self
            .conn
            .query("PRAGMA journal_mode=WAL", params![])
            .await
            .map_err(|e| DatahubError::Storage(e.to_string()))?;

        let mode = match rows.next().await {
            Ok(Some(row)) => row
                .get::<String>(0)
                .map_err(|e| DatahubError::Storage(e.to_string()))?,
            Ok(None) => String::new(),
            Err(e) => return Err(DatahubError::Storage(e.to_string())),
        };

        if !mode.eq_ignore_ascii_case("wal") {
            return Err(DatahubError::Storage(format!(
                "write-ahead journaling unavailable (journal_mode = {mode:?})"
            )));
        }
        Ok(())
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        DatahubError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(DatahubError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Entity writes
    // -----------------------------------------------------------------------

    /// Write `rows` into `kind`'s table in a single transaction.
    ///
    /// A row whose primary key already exists is dropped under
    /// [`ConflictPolicy::Ignore`] and replaces the stored non-key columns under
    /// [`ConflictPolicy::Overwrite`]. Rows are validated before anything is
    /// written; a failure rolls back this table's write only.
    ///
    /// Returns the number of rows inserted or updated.
    #[instrument(skip_all, fields(table = kind.table(), rows = rows.len()))]
    pub async fn upsert(&self, kind: EntityKind, rows: &[Row]) -> Result<u64> {
        self.check_writable()?;
        if rows.is_empty() {
            return Ok(0);
        }
        for row in rows {
            validate_row(kind, row)?;
        }

        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| DatahubError::Storage(e.to_string()))?;

        let mut written = 0u64;
        for row in rows {
            let sql = upsert_sql(kind, row, self.policy);
            let values: Vec<Value> = row.values().map(to_sql_value).collect();
            match tx.execute(&sql, Params::Positional(values)).await {
                Ok(changed) => written += changed,
                Err(e) => {
                    let message = format!("{}: {e}", kind.table());
                    if let Err(rollback) = tx.rollback().await {
                        tracing::warn!(table = kind.table(), error = %rollback, "rollback failed");
                    }
                    return Err(DatahubError::Storage(message));
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| DatahubError::Storage(format!("{}: commit failed: {e}", kind.table())))?;

        debug!(written, "upsert committed");
        Ok(written)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Number of stored rows of `kind`.
    pub async fn count_rows(&self, kind: EntityKind) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", kind.table());
        let mut rows = self
            .conn
            .query(&sql, params![])
            .await
            .map_err(|e| DatahubError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get::<u64>(0)
                .map_err(|e| DatahubError::Storage(e.to_string())),
            Ok(None) => Ok(0),
            Err(e) => Err(DatahubError::Storage(e.to_string())),
        }
    }

    /// Whether a row with the given primary key values exists.
    ///
    /// `key` must list one value per primary key column, in declared order.
    pub async fn contains_key(&self, kind: EntityKind, key: &[FieldValue]) -> Result<bool> {
        let pk = kind.primary_key();
        if key.len() != pk.len() {
            return Err(DatahubError::validation(format!(
                "{}: expected {} key values, got {}",
                kind.table(),
                pk.len(),
                key.len()
            )));
        }

        let predicate = pk
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{column} = ?{}", i + 1))
            .collect::<Vec<_>>()
            .join(" AND ");
        let sql = format!("SELECT 1 FROM {} WHERE {predicate} LIMIT 1", kind.table());
        let values: Vec<Value> = key.iter().map(to_sql_value).collect();

        let mut rows = self
            .conn
            .query(&sql, Params::Positional(values))
            .await
            .map_err(|e| DatahubError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(row) => Ok(row.is_some()),
            Err(e) => Err(DatahubError::Storage(e.to_string())),
        }
    }

    /// Stored estate names in one language, ordered by estate id.
    pub async fn estate_names(&self, locale: Locale) -> Result<Vec<String>> {
        let column = match locale {
            Locale::ZhHk => "estate_name_zh",
            Locale::En => "estate_name_en",
        };
        let sql = format!(
            "SELECT {column} FROM estates WHERE {column} IS NOT NULL AND {column} != '' ORDER BY estate_id"
        );
        let mut rows = self
            .conn
            .query(&sql, params![])
            .await
            .map_err(|e| DatahubError::Storage(e.to_string()))?;

        let mut names = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            names.push(
                row.get::<String>(0)
                    .map_err(|e| DatahubError::Storage(e.to_string()))?,
            );
        }
        Ok(names)
    }

    // -----------------------------------------------------------------------
    // Run ledger
    // -----------------------------------------------------------------------

    /// Record a finished pipeline run. Returns the generated run id.
    pub async fn record_run(
        &self,
        pipeline: &str,
        started_at: DateTime<Utc>,
        partitions: u64,
        rows_written: u64,
    ) -> Result<String> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        let finished_at = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO pipeline_runs (id, pipeline, started_at, finished_at, partitions, rows_written)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id.as_str(),
                    pipeline,
                    started_at.to_rfc3339(),
                    finished_at,
                    partitions as i64,
                    rows_written as i64
                ],
            )
            .await
            .map_err(|e| DatahubError::Storage(e.to_string()))?;
        Ok(id)
    }

    /// Most recent runs, newest first.
    pub async fn recent_runs(&self, limit: u32) -> Result<Vec<RunRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, pipeline, started_at, finished_at, partitions, rows_written
                 FROM pipeline_runs ORDER BY finished_at DESC, id DESC LIMIT ?1",
                params![limit],
            )
            .await
            .map_err(|e| DatahubError::Storage(e.to_string()))?;

        let mut runs = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            runs.push(row_to_run_record(&row)?);
        }
        Ok(runs)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn validate_row(kind: EntityKind, row: &Row) -> Result<()> {
    if let Some(unknown) = row
        .columns()
        .find(|c| !kind.columns().iter().any(|known| known == c))
    {
        return Err(DatahubError::validation(format!(
            "{}: unknown column {unknown:?}",
            kind.table()
        )));
    }
    for key in kind.primary_key() {
        if row.get(key).is_none_or(FieldValue::is_null) {
            return Err(DatahubError::validation(format!(
                "{}: primary key column {key:?} is missing or null",
                kind.table()
            )));
        }
    }
    Ok(())
}

fn upsert_sql(kind: EntityKind, row: &Row, policy: ConflictPolicy) -> String {
    let columns: Vec<&str> = row.columns().collect();
    let placeholders = (1..=columns.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let pk = kind.primary_key();

    let updates: Vec<String> = columns
        .iter()
        .filter(|c| !pk.iter().any(|key| key == *c))
        .map(|c| format!("{c} = excluded.{c}"))
        .collect();

    let action = match policy {
        ConflictPolicy::Overwrite if !updates.is_empty() => {
            format!("DO UPDATE SET {}", updates.join(", "))
        }
        _ => "DO NOTHING".to_string(),
    };

    format!(
        "INSERT INTO {} ({}) VALUES ({placeholders}) ON CONFLICT({}) {action}",
        kind.table(),
        columns.join(", "),
        pk.join(", "),
    )
}

fn to_sql_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null => Value::Null,
        FieldValue::Integer(v) => Value::Integer(*v),
        FieldValue::Real(v) => Value::Real(*v),
        FieldValue::Text(s) => Value::Text(s.clone()),
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| DatahubError::Storage(format!("bad timestamp {raw:?}: {e}")))
}

fn row_to_run_record(row: &libsql::Row) -> Result<RunRecord> {
    let text = |idx: i32| -> Result<String> {
        row.get::<String>(idx)
            .map_err(|e| DatahubError::Storage(e.to_string()))
    };
    let count = |idx: i32| -> Result<u64> {
        row.get::<u64>(idx)
            .map_err(|e| DatahubError::Storage(e.to_string()))
    };

    Ok(RunRecord {
        id: text(0)?,
        pipeline: text(1)?,
        started_at: parse_timestamp(&text(2)?)?,
        finished_at: parse_timestamp(&text(3)?)?,
        partitions: count(4)?,
        rows_written: count(5)?,
    })
}
