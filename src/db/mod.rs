mod schema;
pub mod chores;
pub mod users;

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

pub use chores::{
    normalize, Chore, ChoreFilters, ChorePage, ChorePatch, ChoreRow, ChoreStatus, ListQuery,
    NewChore, Priority, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
pub use schema::{ColumnMigration, MIGRATIONS, SCHEMA};
pub use users::User;

use schema::{BACKFILL_STATUS, DERIVE_STATUS_FROM_COMPLETED, INDEXES};

/// SQLite handle shared by all request handlers.
///
/// A single connection behind a mutex: every statement runs to completion
/// before the next one starts, and concurrent writers are last-write-wins.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> crate::error::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Ok(Self::from_connection(conn)?)
    }

    pub fn open_in_memory() -> rusqlite::Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> rusqlite::Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create missing tables, apply column migrations, then backfill statuses.
    pub fn initialize(&self) -> rusqlite::Result<()> {
        let conn = self.conn();
        conn.execute_batch(SCHEMA)?;
        let applied = run_migrations(&conn);
        conn.execute_batch(INDEXES)?;

        let backfilled = conn.execute(BACKFILL_STATUS, [])?;
        if backfilled > 0 {
            info!(rows = backfilled, "Backfilled chore statuses");
        }
        debug!(migrations = applied, "Database initialized");
        Ok(())
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock cannot leave a half-applied statement behind.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    for name in names {
        if name? == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Apply every migration whose column is missing. Failures are logged and skipped.
fn run_migrations(conn: &Connection) -> usize {
    let mut applied = 0;
    for migration in MIGRATIONS {
        match column_exists(conn, migration.table, migration.column) {
            Ok(true) => continue,
            Ok(false) => {}
            Err(e) => {
                warn!("Could not inspect {}.{}: {}", migration.table, migration.column, e);
                continue;
            }
        }

        if let Err(e) = conn.execute(&migration.alter_sql(), []) {
            warn!("Migration {}.{} failed: {}", migration.table, migration.column, e);
            continue;
        }
        info!("Added column {}.{}", migration.table, migration.column);
        applied += 1;

        if migration.table == "chores" && migration.column == "status" {
            if let Err(e) = conn.execute(DERIVE_STATUS_FROM_COMPLETED, []) {
                warn!("Deriving status from completed failed: {}", e);
            }
        }
    }
    applied
}
