//! SQLite implementation of `ReviewRepository`.
//!
//! This provides persistent storage that survives service restarts.
//!
//! # Schema Versioning
//!
//! The database has a `schema_version` table that tracks the schema version.
//! When the schema needs to change, increment `CURRENT_SCHEMA_VERSION` and add
//! a migration in `run_migrations()`. Migrations run sequentially from the
//! current version to the target version.
//!
//! Records and event payloads are stored as JSON. New `ReviewRecord` fields
//! must carry `#[serde(default)]` so older rows still deserialize.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use smartscripts_core::{ReviewEvent, ReviewEventType, ReviewRecord, SubmissionId};
use tracing::warn;

use super::{RepositoryError, ReviewRepository};

/// Current schema version. Increment this when making schema changes and add
/// corresponding migration logic in `run_migrations()`.
const CURRENT_SCHEMA_VERSION: i64 = 2;

/// SQLite-backed review repository.
///
/// Uses `tokio::task::spawn_blocking` to run synchronous rusqlite operations
/// without blocking the async runtime.
pub struct SqliteRepository {
    conn: Arc<Mutex<Connection>>,
}

fn lock<'a>(
    conn: &'a Mutex<Connection>,
    operation: &str,
) -> Result<MutexGuard<'a, Connection>, RepositoryError> {
    conn.lock()
        .map_err(|_| RepositoryError::storage(operation, "connection mutex poisoned"))
}

/// Best-effort chmod. Failure is logged, not returned.
#[cfg(unix)]
fn restrict_permissions(path: &Path, mode: u32, what: &str) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)) {
        warn!("Failed to set restrictive permissions on {}: {}", what, e);
    }
}

impl SqliteRepository {
    /// Open (or create) a repository at the given path.
    ///
    /// Creates the parent directory, the database file and the schema if
    /// they don't exist, and runs pending migrations on an older schema.
    ///
    /// # Durability
    ///
    /// - `journal_mode = WAL`, verified after setting
    /// - `synchronous = FULL`
    /// - `busy_timeout = 5000ms`
    ///
    /// On unix the parent directory is set to 0700 and the database, `-wal`
    /// and `-shm` files to 0600.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, RepositoryError> {
        let path_ref = path.as_ref();
        let path_str = path_ref.to_string_lossy();
        let is_in_memory = path_str == ":memory:";

        if !is_in_memory {
            if let Some(parent) = path_ref.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        RepositoryError::storage(
                            "create database directory",
                            format!("{}: {}", parent.display(), e),
                        )
                    })?;

                    // SQLite creates the WAL and SHM siblings with umask permissions
                    #[cfg(unix)]
                    restrict_permissions(parent, 0o700, "database directory");
                }
            }
        }

        let conn = Connection::open(path_ref)
            .map_err(|e| RepositoryError::storage("open database", e.to_string()))?;

        // Reviews hold student names and teacher comments
        #[cfg(unix)]
        if !is_in_memory {
            restrict_permissions(path_ref, 0o600, "database file");
        }

        // SQLite can silently keep DELETE mode on filesystems without shared
        // memory support. In-memory databases report "memory".
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(|e| RepositoryError::storage("set journal_mode", e.to_string()))?;

        let journal_mode_ok = journal_mode.eq_ignore_ascii_case("wal")
            || (is_in_memory && journal_mode.eq_ignore_ascii_case("memory"));

        if !journal_mode_ok {
            return Err(RepositoryError::storage(
                "configure journal_mode",
                format!(
                    "Failed to enable WAL mode: SQLite returned '{}' instead of 'wal'",
                    journal_mode
                ),
            ));
        }

        conn.execute_batch(
            r#"
            PRAGMA synchronous = FULL;
            PRAGMA busy_timeout = 5000;
            "#,
        )
        .map_err(|e| RepositoryError::storage("configure pragmas", e.to_string()))?;

        #[cfg(unix)]
        if !is_in_memory {
            for suffix in ["-wal", "-shm"] {
                let sibling = format!("{}{}", path_str, suffix);
                let sibling = Path::new(&sibling);
                if sibling.exists() {
                    restrict_permissions(sibling, 0o600, &format!("{} file", suffix));
                }
            }
        }

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| RepositoryError::storage("create schema_version table", e.to_string()))?;

        // 0 if the table is empty, i.e. a fresh database
        let current_version: i64 = conn
            .query_row(
                "SELECT version FROM schema_version WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| RepositoryError::storage("get schema version", e.to_string()))?
            .unwrap_or(0);

        Self::run_migrations(&conn, current_version)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run migrations from `from_version` to `CURRENT_SCHEMA_VERSION`.
    fn run_migrations(conn: &Connection, from_version: i64) -> Result<(), RepositoryError> {
        if from_version > CURRENT_SCHEMA_VERSION {
            return Err(RepositoryError::storage(
                "schema version",
                format!(
                    "Database schema version {} is newer than supported version {}. \
                     Please upgrade the application.",
                    from_version, CURRENT_SCHEMA_VERSION
                ),
            ));
        }

        if from_version == CURRENT_SCHEMA_VERSION {
            return Ok(());
        }

        if from_version < 1 {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS reviews (
                    submission_id TEXT PRIMARY KEY,
                    record_json TEXT NOT NULL,
                    updated_at INTEGER NOT NULL
                );
                "#,
            )
            .map_err(|e| RepositoryError::storage("migration v1", e.to_string()))?;
        }

        // v2: audit trail
        if from_version < 2 {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS review_events (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    submission_id TEXT NOT NULL,
                    event_type TEXT NOT NULL,
                    event_data TEXT NOT NULL,
                    recorded_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_review_events_submission
                    ON review_events(submission_id, recorded_at);
                "#,
            )
            .map_err(|e| RepositoryError::storage("migration v2", e.to_string()))?;
        }

        conn.execute(
            "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?1)",
            params![CURRENT_SCHEMA_VERSION],
        )
        .map_err(|e| RepositoryError::storage("update schema version", e.to_string()))?;

        Ok(())
    }

    /// Create a new in-memory SQLite repository (for testing).
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, RepositoryError> {
        Self::new(":memory:")
    }
}

#[async_trait]
impl ReviewRepository for SqliteRepository {
    async fn get(&self, id: &SubmissionId) -> Result<Option<ReviewRecord>, RepositoryError> {
        let conn = self.conn.clone();
        let submission_id = id.0.clone();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn, "get")?;

            let json: Option<String> = conn
                .query_row(
                    "SELECT record_json FROM reviews WHERE submission_id = ?1",
                    params![submission_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| RepositoryError::storage("get", e.to_string()))?;

            json.map(|json| {
                serde_json::from_str::<ReviewRecord>(&json)
                    .map_err(|_| RepositoryError::corruption("review JSON"))
            })
            .transpose()
        })
        .await
        .map_err(|e| RepositoryError::storage("get", e.to_string()))?
    }

    async fn put_with_events(
        &self,
        id: &SubmissionId,
        record: ReviewRecord,
        events: Vec<ReviewEventType>,
        recorded_at: i64,
    ) -> Result<(), RepositoryError> {
        let conn = self.conn.clone();
        let submission_id = id.0.clone();
        let record_json = serde_json::to_string(&record)
            .map_err(|e| RepositoryError::storage("serialize review", e.to_string()))?;
        let event_rows = events
            .iter()
            .map(|event_type| {
                serde_json::to_string(event_type)
                    .map(|json| (event_type.variant_name(), json))
                    .map_err(|e| RepositoryError::storage("serialize event", e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let updated_at = chrono::Utc::now().timestamp();

        tokio::task::spawn_blocking(move || {
            let mut conn = lock(&conn, "put")?;

            // Dropped without commit on any error, which rolls back
            let tx = conn
                .transaction()
                .map_err(|e| RepositoryError::storage("begin put", e.to_string()))?;

            tx.execute(
                "INSERT INTO reviews (submission_id, record_json, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(submission_id) DO UPDATE SET
                    record_json = excluded.record_json,
                    updated_at = excluded.updated_at",
                params![submission_id, record_json, updated_at],
            )
            .map_err(|e| RepositoryError::storage("put", e.to_string()))?;

            for (event_type_name, event_json) in &event_rows {
                tx.execute(
                    "INSERT INTO review_events (submission_id, event_type, event_data, recorded_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![submission_id, event_type_name, event_json, recorded_at],
                )
                .map_err(|e| RepositoryError::storage("log event", e.to_string()))?;
            }

            tx.commit()
                .map_err(|e| RepositoryError::storage("commit put", e.to_string()))?;

            Ok(())
        })
        .await
        .map_err(|e| RepositoryError::storage("put", e.to_string()))?
    }

    async fn list(&self) -> Result<Vec<(SubmissionId, ReviewRecord)>, RepositoryError> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn, "list")?;

            let mut stmt = conn
                .prepare("SELECT submission_id, record_json FROM reviews ORDER BY submission_id")
                .map_err(|e| RepositoryError::storage("list", e.to_string()))?;

            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(|e| RepositoryError::storage("list", e.to_string()))?;

            let mut reviews = Vec::new();
            for row in rows {
                let (submission_id, json) =
                    row.map_err(|e| RepositoryError::storage("list row", e.to_string()))?;
                let record: ReviewRecord = serde_json::from_str(&json)
                    .map_err(|_| RepositoryError::corruption("review JSON"))?;
                reviews.push((SubmissionId(submission_id), record));
            }

            Ok(reviews)
        })
        .await
        .map_err(|e| RepositoryError::storage("list", e.to_string()))?
    }

    async fn get_events(
        &self,
        id: &SubmissionId,
        limit: usize,
    ) -> Result<Vec<ReviewEvent>, RepositoryError> {
        let conn = self.conn.clone();
        let submission_id = id.0.clone();
        let limit = i64::try_from(limit).map_err(|_| {
            RepositoryError::storage("get_events", format!("limit {} out of range", limit))
        })?;

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn, "get_events")?;

            let mut stmt = conn
                .prepare(
                    "SELECT id, event_data, recorded_at
                     FROM review_events
                     WHERE submission_id = ?1
                     ORDER BY recorded_at DESC, id DESC
                     LIMIT ?2",
                )
                .map_err(|e| RepositoryError::storage("get_events", e.to_string()))?;

            let rows = stmt
                .query_map(params![submission_id, limit], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                })
                .map_err(|e| RepositoryError::storage("get_events", e.to_string()))?;

            let mut events = Vec::new();
            for row in rows {
                let (event_id, event_data, recorded_at) =
                    row.map_err(|e| RepositoryError::storage("get_events row", e.to_string()))?;

                let event_type: ReviewEventType = serde_json::from_str(&event_data)
                    .map_err(|_| RepositoryError::corruption("event_data JSON"))?;

                events.push(ReviewEvent {
                    id: event_id,
                    submission_id: SubmissionId(submission_id.clone()),
                    event_type,
                    recorded_at,
                });
            }

            Ok(events)
        })
        .await
        .map_err(|e| RepositoryError::storage("get_events", e.to_string()))?
    }
}
