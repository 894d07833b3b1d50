//! Chore records: stored rows, normalized chores, write inputs and queries.

use rusqlite::types::ValueRef;
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Deserializer, Serialize};

use super::Database;

pub const DEFAULT_PAGE_SIZE: u32 = 5;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Workflow state of a chore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChoreStatus {
    Pending,
    InProgress,
    Completed,
}

impl ChoreStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChoreStatus::Pending => "pending",
            ChoreStatus::InProgress => "in-progress",
            ChoreStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ChoreStatus::Pending),
            "in-progress" => Some(ChoreStatus::InProgress),
            "completed" => Some(ChoreStatus::Completed),
            _ => None,
        }
    }

    pub fn from_completed(completed: bool) -> Self {
        if completed {
            ChoreStatus::Completed
        } else {
            ChoreStatus::Pending
        }
    }

    pub fn is_completed(&self) -> bool {
        *self == ChoreStatus::Completed
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            _ => None,
        }
    }
}

/// A chore exactly as stored. Nullable where legacy rows may hold NULL.
#[derive(Debug, Clone, Default)]
pub struct ChoreRow {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub status: Option<String>,
    pub completed: Option<bool>,
    pub priority: Option<String>,
    pub due_date: Option<String>,
    pub points: Option<i64>,
    pub photo_url: Option<String>,
    pub photo_path: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location_name: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// A chore as returned to callers: `completed` always equals `status == completed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chore {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub status: ChoreStatus,
    pub completed: bool,
    pub priority: Priority,
    pub due_date: Option<String>,
    pub points: i64,
    pub photo_url: Option<String>,
    pub photo_path: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location_name: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Derive a consistent status/completed pair from a stored row.
///
/// A recognised status wins; otherwise the completed flag decides; otherwise
/// the chore is pending. Every other field passes through.
pub fn normalize(row: ChoreRow) -> Chore {
    let status = row
        .status
        .as_deref()
        .and_then(ChoreStatus::parse)
        .or_else(|| row.completed.map(ChoreStatus::from_completed))
        .unwrap_or(ChoreStatus::Pending);

    Chore {
        id: row.id,
        user_id: row.user_id,
        title: row.title,
        description: row.description,
        status,
        completed: status.is_completed(),
        priority: row
            .priority
            .as_deref()
            .and_then(Priority::parse)
            .unwrap_or_default(),
        due_date: row.due_date,
        points: row.points.unwrap_or(0),
        photo_url: row.photo_url,
        photo_path: row.photo_path,
        latitude: row.latitude,
        longitude: row.longitude,
        location_name: row.location_name,
        created_at: row.created_at.unwrap_or_default(),
        updated_at: row.updated_at.unwrap_or_default(),
    }
}

/// Deserialize a present field as `Some`, so `null` becomes `Some(None)` and an
/// absent field (via `#[serde(default)]`) stays `None`.
fn explicit<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Body of a create request. Values are validated by the repository.
///
/// Photo fields are not accepted here; only the upload endpoint sets them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewChore {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    /// Any JSON value; coerced to a number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_name: Option<String>,
}

impl NewChore {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }
}

/// Body of a partial update. `None` keeps the stored value; `Some(None)`
/// clears a nullable field. Photo fields are set only by the upload endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChorePatch {
    #[serde(default, deserialize_with = "explicit", skip_serializing_if = "Option::is_none")]
    pub title: Option<Option<String>>,
    #[serde(default, deserialize_with = "explicit", skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    /// `Some(None)` resets to pending.
    #[serde(default, deserialize_with = "explicit", skip_serializing_if = "Option::is_none")]
    pub status: Option<Option<String>>,
    /// `Some(None)` counts as false.
    #[serde(default, deserialize_with = "explicit", skip_serializing_if = "Option::is_none")]
    pub completed: Option<Option<bool>>,
    /// `Some(None)` resets to medium.
    #[serde(default, deserialize_with = "explicit", skip_serializing_if = "Option::is_none")]
    pub priority: Option<Option<String>>,
    #[serde(default, deserialize_with = "explicit", skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Option<String>>,
    #[serde(default, deserialize_with = "explicit", skip_serializing_if = "Option::is_none")]
    pub points: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "explicit", skip_serializing_if = "Option::is_none")]
    pub latitude: Option<Option<f64>>,
    #[serde(default, deserialize_with = "explicit", skip_serializing_if = "Option::is_none")]
    pub longitude: Option<Option<f64>>,
    #[serde(default, deserialize_with = "explicit", skip_serializing_if = "Option::is_none")]
    pub location_name: Option<Option<String>>,
}

/// Filters shared by the list endpoint and the client cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChoreFilters {
    pub status: Option<ChoreStatus>,
    pub query: Option<String>,
}

impl ChoreFilters {
    /// Whether a chore would be returned by a list request with these filters.
    pub fn matches(&self, chore: &Chore) -> bool {
        if let Some(status) = self.status {
            if chore.status != status {
                return false;
            }
        }
        match self.query.as_deref().map(str::trim) {
            Some(q) if !q.is_empty() => {
                let q = q.to_lowercase();
                chore.title.to_lowercase().contains(&q)
                    || chore
                        .description
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase().contains(&q))
            }
            _ => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub page: u32,
    pub limit: u32,
    pub filters: ChoreFilters,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
            filters: ChoreFilters::default(),
        }
    }
}

impl ListQuery {
    /// Build a query from raw request parameters.
    ///
    /// Unparseable numbers fall back to the defaults, `page` floors at 1,
    /// `limit` clamps to `1..=MAX_PAGE_SIZE`, unknown statuses and blank
    /// search terms are ignored.
    pub fn from_params(
        page: Option<&str>,
        limit: Option<&str>,
        status: Option<&str>,
        query: Option<&str>,
    ) -> Self {
        let page = parse_int(page).unwrap_or(1).max(1);
        let limit = parse_int(limit)
            .unwrap_or(DEFAULT_PAGE_SIZE as i64)
            .clamp(1, MAX_PAGE_SIZE as i64);

        Self {
            page: u32::try_from(page).unwrap_or(u32::MAX),
            limit: limit as u32,
            filters: ChoreFilters {
                status: status.and_then(ChoreStatus::parse),
                query: query
                    .filter(|q| !q.trim().is_empty())
                    .map(str::to_string),
            },
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.limit as i64
    }
}

fn parse_int(value: Option<&str>) -> Option<i64> {
    value.and_then(|v| v.trim().parse::<i64>().ok())
}

/// One page of a list request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChorePage {
    pub items: Vec<Chore>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

impl ChorePage {
    pub fn has_more(&self) -> bool {
        (self.page as u64) * (self.limit as u64) < self.total
    }
}

/// Fully resolved column values for an insert or update.
#[derive(Debug, Clone)]
pub(crate) struct ChoreWrite {
    pub title: String,
    pub description: Option<String>,
    pub status: ChoreStatus,
    pub priority: Priority,
    pub due_date: Option<String>,
    pub points: i64,
    pub photo_url: Option<String>,
    pub photo_path: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location_name: Option<String>,
}

impl From<&Chore> for ChoreWrite {
    fn from(chore: &Chore) -> Self {
        Self {
            title: chore.title.clone(),
            description: chore.description.clone(),
            status: chore.status,
            priority: chore.priority,
            due_date: chore.due_date.clone(),
            points: chore.points,
            photo_url: chore.photo_url.clone(),
            photo_path: chore.photo_path.clone(),
            latitude: chore.latitude,
            longitude: chore.longitude,
            location_name: chore.location_name.clone(),
        }
    }
}

const CHORE_COLUMNS: &str = "id, user_id, title, description, status, completed, priority, due_date, \
     points, photo_url, photo_path, latitude, longitude, location_name, created_at, updated_at";

/// Points may have been stored as REAL by older writers.
fn points_column(row: &Row, idx: usize) -> rusqlite::Result<Option<i64>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Integer(i) => Some(i),
        ValueRef::Real(f) if f.is_finite() => Some(f as i64),
        ValueRef::Text(t) => std::str::from_utf8(t).ok().and_then(|s| s.trim().parse().ok()),
        _ => None,
    })
}

fn completed_column(row: &Row, idx: usize) -> rusqlite::Result<Option<bool>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Integer(i) => Some(i != 0),
        ValueRef::Real(f) => Some(f != 0.0),
        ValueRef::Text(t) => match t {
            b"1" | b"true" | b"TRUE" => Some(true),
            b"0" | b"false" | b"FALSE" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

fn row_to_chore_row(row: &Row) -> rusqlite::Result<ChoreRow> {
    Ok(ChoreRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        status: row.get(4)?,
        completed: completed_column(row, 5)?,
        priority: row.get(6)?,
        due_date: row.get(7)?,
        points: points_column(row, 8)?,
        photo_url: row.get(9)?,
        photo_path: row.get(10)?,
        latitude: row.get(11)?,
        longitude: row.get(12)?,
        location_name: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

/// Escape LIKE wildcards so the search term matches literally.
fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for c in query.to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

impl Database {
    /// Rows owned by `user_id` that match the filters, newest first, plus the
    /// total number of matches across all pages.
    pub fn list_chores(
        &self,
        user_id: i64,
        query: &ListQuery,
    ) -> rusqlite::Result<(Vec<ChoreRow>, u64)> {
        let mut clauses = vec!["user_id = ?"];
        let mut args: Vec<rusqlite::types::Value> = vec![user_id.into()];

        if let Some(status) = query.filters.status {
            clauses.push("status = ?");
            args.push(status.as_str().to_string().into());
        }
        if let Some(q) = query.filters.query.as_deref().filter(|q| !q.trim().is_empty()) {
            clauses.push(
                "(LOWER(title) LIKE ? ESCAPE '\\' OR LOWER(COALESCE(description, '')) LIKE ? ESCAPE '\\')",
            );
            let pattern = like_pattern(q);
            args.push(pattern.clone().into());
            args.push(pattern.into());
        }
        let filter = clauses.join(" AND ");

        let conn = self.conn();
        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM chores WHERE {}", filter),
            rusqlite::params_from_iter(args.iter()),
            |row| row.get(0),
        )?;

        let mut page_args = args;
        page_args.push((query.limit as i64).into());
        page_args.push(query.offset().into());

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM chores WHERE {} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            CHORE_COLUMNS, filter
        ))?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(page_args.iter()), row_to_chore_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok((rows, total.max(0) as u64))
    }

    pub fn get_chore(&self, id: i64, user_id: i64) -> rusqlite::Result<Option<ChoreRow>> {
        self.conn()
            .query_row(
                &format!("SELECT {} FROM chores WHERE id = ? AND user_id = ?", CHORE_COLUMNS),
                params![id, user_id],
                row_to_chore_row,
            )
            .optional()
    }

    pub(crate) fn insert_chore(&self, user_id: i64, chore: &ChoreWrite) -> rusqlite::Result<i64> {
        let conn = self.conn();
        conn.execute(
            r#"
            INSERT INTO chores (user_id, title, description, priority, due_date, status, completed,
                                points, photo_url, photo_path, latitude, longitude, location_name)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                user_id,
                chore.title,
                chore.description,
                chore.priority.as_str(),
                chore.due_date,
                chore.status.as_str(),
                chore.status.is_completed(),
                chore.points,
                chore.photo_url,
                chore.photo_path,
                chore.latitude,
                chore.longitude,
                chore.location_name,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Overwrite every mutable column. Returns the number of rows changed.
    pub(crate) fn update_chore(
        &self,
        id: i64,
        user_id: i64,
        chore: &ChoreWrite,
    ) -> rusqlite::Result<usize> {
        self.conn().execute(
            r#"
            UPDATE chores
            SET title = ?, description = ?, completed = ?, status = ?, priority = ?, due_date = ?,
                points = ?, photo_url = ?, photo_path = ?, latitude = ?, longitude = ?,
                location_name = ?, updated_at = CURRENT_TIMESTAMP
            WHERE id = ? AND user_id = ?
            "#,
            params![
                chore.title,
                chore.description,
                chore.status.is_completed(),
                chore.status.as_str(),
                chore.priority.as_str(),
                chore.due_date,
                chore.points,
                chore.photo_url,
                chore.photo_path,
                chore.latitude,
                chore.longitude,
                chore.location_name,
                id,
                user_id,
            ],
        )
    }

    pub fn set_chore_photo(
        &self,
        id: i64,
        user_id: i64,
        photo_url: &str,
        photo_path: &str,
    ) -> rusqlite::Result<usize> {
        self.conn().execute(
            r#"
            UPDATE chores
            SET photo_url = ?, photo_path = ?, updated_at = CURRENT_TIMESTAMP
            WHERE id = ? AND user_id = ?
            "#,
            params![photo_url, photo_path, id, user_id],
        )
    }

    pub fn delete_chore(&self, id: i64, user_id: i64) -> rusqlite::Result<usize> {
        self.conn().execute(
            "DELETE FROM chores WHERE id = ? AND user_id = ?",
            params![id, user_id],
        )
    }
}
