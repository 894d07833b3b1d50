pub const SCHEMA: &str = r#"
-- Users: account rows, managed by the auth collaborator
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT UNIQUE NOT NULL,
    password TEXT NOT NULL,             -- opaque hash
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);

-- Chores: one row per user-owned task
CREATE TABLE IF NOT EXISTS chores (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    title TEXT NOT NULL,
    description TEXT,
    completed BOOLEAN DEFAULT FALSE,    -- mirrors status = 'completed'
    status TEXT DEFAULT 'pending',      -- pending/in-progress/completed
    priority TEXT DEFAULT 'medium',     -- low/medium/high
    due_date DATETIME,
    points INTEGER DEFAULT 0,
    photo_url TEXT,
    photo_path TEXT,                    -- relative to the upload root
    latitude REAL,
    longitude REAL,
    location_name TEXT,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE
);
"#;

/// Created after column migrations so legacy tables have every indexed column.
pub const INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_chores_user_created ON chores(user_id, created_at);
CREATE INDEX IF NOT EXISTS idx_chores_user_status ON chores(user_id, status);
"#;

/// A column added after the first release of a table.
#[derive(Debug, Clone, Copy)]
pub struct ColumnMigration {
    pub table: &'static str,
    pub column: &'static str,
    pub definition: &'static str,
}

impl ColumnMigration {
    pub fn alter_sql(&self) -> String {
        format!("ALTER TABLE {} ADD COLUMN {} {}", self.table, self.column, self.definition)
    }
}

/// Ordered; applied only when the column is missing.
pub const MIGRATIONS: &[ColumnMigration] = &[
    ColumnMigration { table: "chores", column: "status", definition: "TEXT DEFAULT 'pending'" },
    ColumnMigration { table: "chores", column: "points", definition: "INTEGER DEFAULT 0" },
    ColumnMigration { table: "chores", column: "photo_url", definition: "TEXT" },
    ColumnMigration { table: "chores", column: "photo_path", definition: "TEXT" },
    ColumnMigration { table: "chores", column: "latitude", definition: "REAL" },
    ColumnMigration { table: "chores", column: "longitude", definition: "REAL" },
    ColumnMigration { table: "chores", column: "location_name", definition: "TEXT" },
];

/// Assigns a status to rows that have none.
pub const BACKFILL_STATUS: &str = r#"
UPDATE chores
SET status = CASE WHEN completed = 1 THEN 'completed' ELSE 'pending' END
WHERE status IS NULL OR status = ''
"#;

/// Run once when the status column is first added: every existing row holds the
/// column default, so `completed` is the only real source.
pub const DERIVE_STATUS_FROM_COMPLETED: &str = r#"
UPDATE chores
SET status = CASE WHEN completed = 1 THEN 'completed' ELSE 'pending' END
"#;
