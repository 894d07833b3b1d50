//! User rows. Accounts are provisioned by the auth collaborator, never by chore routes.

use rusqlite::{params, OptionalExtension};

use super::Database;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub created_at: Option<String>,
}

impl Database {
    /// Insert the user if the username is free and return its id either way.
    pub fn ensure_user(&self, username: &str, password_hash: &str) -> rusqlite::Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO users (username, password) VALUES (?, ?)",
            params![username, password_hash],
        )?;
        conn.query_row(
            "SELECT id FROM users WHERE username = ?",
            [username],
            |row| row.get(0),
        )
    }

    pub fn find_user(&self, username: &str) -> rusqlite::Result<Option<User>> {
        self.conn()
            .query_row(
                "SELECT id, username, created_at FROM users WHERE username = ?",
                [username],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                },
            )
            .optional()
    }
}
