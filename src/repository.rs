//! Chore operations scoped by owner: validation, persistence, normalization
//! and change notification.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::db::chores::ChoreWrite;
use crate::db::{normalize, Chore, ChorePage, ChorePatch, ChoreStatus, Database, ListQuery, NewChore, Priority};
use crate::error::{ChoreError, Result};
use crate::notify::{ChoreEvent, Notifier};
use crate::photos::PhotoStore;

/// An uploaded photo body.
#[derive(Debug, Clone)]
pub struct PhotoUpload {
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

/// Response body of a photo upload.
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
pub struct PhotoAttached {
    pub message: String,
    pub photo_url: String,
    pub photo_path: String,
    pub chore: Chore,
}

pub struct ChoreRepository {
    db: Arc<Database>,
    photos: PhotoStore,
    notifier: Arc<Notifier>,
}

impl ChoreRepository {
    pub fn new(db: Arc<Database>, photos: PhotoStore, notifier: Arc<Notifier>) -> Self {
        Self { db, photos, notifier }
    }

    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    pub fn list(&self, user_id: i64, query: &ListQuery) -> Result<ChorePage> {
        let (rows, total) = self.db.list_chores(user_id, query)?;
        Ok(ChorePage {
            items: rows.into_iter().map(normalize).collect(),
            total,
            page: query.page,
            limit: query.limit,
        })
    }

    pub fn get(&self, id: i64, user_id: i64) -> Result<Chore> {
        self.db
            .get_chore(id, user_id)?
            .map(normalize)
            .ok_or(ChoreError::NotFound)
    }

    pub fn create(&self, user_id: i64, fields: NewChore) -> Result<Chore> {
        let title = required_title(fields.title)?;

        // An explicit status is authoritative; `completed` only speaks when status is absent.
        let status = match (fields.status.as_deref(), fields.completed) {
            (Some(status), _) => parse_status(status)?,
            (None, Some(completed)) => ChoreStatus::from_completed(completed),
            (None, None) => ChoreStatus::Pending,
        };

        let write = ChoreWrite {
            title,
            description: fields.description,
            status,
            priority: fields
                .priority
                .as_deref()
                .map(parse_priority)
                .transpose()?
                .unwrap_or_default(),
            due_date: validate_due_date(fields.due_date)?,
            points: fields.points.as_ref().and_then(coerce_points).unwrap_or(0),
            photo_url: None,
            photo_path: None,
            latitude: validate_coordinate(fields.latitude, 90.0, "latitude")?,
            longitude: validate_coordinate(fields.longitude, 180.0, "longitude")?,
            location_name: fields.location_name,
        };

        let id = self.db.insert_chore(user_id, &write)?;
        let chore = self.get(id, user_id)?;
        info!(user_id, chore_id = id, "Chore created");

        self.notifier.broadcast_to_user(
            user_id,
            &ChoreEvent::ChoreCreated { chore: chore.clone() },
        );
        Ok(chore)
    }

    pub fn update(&self, id: i64, user_id: i64, patch: ChorePatch) -> Result<Chore> {
        let existing = self.get(id, user_id)?;
        let mut write = ChoreWrite::from(&existing);

        if let Some(title) = patch.title {
            write.title = required_title(title)?;
        }
        if let Some(description) = patch.description {
            write.description = description;
        }
        // Status wins over completed; either one re-derives the other. An
        // explicit null for either leaves the chore pending.
        match (patch.status, patch.completed) {
            (Some(Some(status)), _) => write.status = parse_status(&status)?,
            (Some(None), _) => write.status = ChoreStatus::Pending,
            (None, Some(completed)) => {
                write.status = ChoreStatus::from_completed(completed.unwrap_or(false));
            }
            (None, None) => {}
        }
        if let Some(priority) = patch.priority {
            write.priority = match priority {
                Some(priority) => parse_priority(&priority)?,
                None => Priority::default(),
            };
        }
        if let Some(due_date) = patch.due_date {
            write.due_date = validate_due_date(due_date)?;
        }
        if let Some(points) = patch.points.as_ref().and_then(coerce_points) {
            write.points = points;
        }
        if let Some(latitude) = patch.latitude {
            write.latitude = validate_coordinate(latitude, 90.0, "latitude")?;
        }
        if let Some(longitude) = patch.longitude {
            write.longitude = validate_coordinate(longitude, 180.0, "longitude")?;
        }
        if let Some(location_name) = patch.location_name {
            write.location_name = location_name;
        }

        if self.db.update_chore(id, user_id, &write)? == 0 {
            return Err(ChoreError::NotFound);
        }
        let chore = self.get(id, user_id)?;
        info!(user_id, chore_id = id, status = chore.status.as_str(), "Chore updated");

        self.notifier.broadcast_to_user(
            user_id,
            &ChoreEvent::ChoreUpdated { chore: chore.clone() },
        );
        Ok(chore)
    }

    pub fn delete(&self, id: i64, user_id: i64) -> Result<()> {
        let existing = self.get(id, user_id)?;

        if let Some(photo_path) = existing.photo_path.as_deref() {
            self.remove_photo_file(id, photo_path);
        }

        if self.db.delete_chore(id, user_id)? == 0 {
            return Err(ChoreError::NotFound);
        }
        info!(user_id, chore_id = id, "Chore deleted");

        self.notifier
            .broadcast_to_user(user_id, &ChoreEvent::ChoreDeleted { chore_id: id });
        Ok(())
    }

    pub fn attach_photo(
        &self,
        id: i64,
        user_id: i64,
        upload: Option<PhotoUpload>,
    ) -> Result<PhotoAttached> {
        let existing = self.get(id, user_id)?;
        let upload = upload.ok_or_else(|| ChoreError::validation("No photo file uploaded"))?;

        let stored = self.photos.store(id, upload.file_name.as_deref(), &upload.bytes)?;
        match self.db.set_chore_photo(id, user_id, &stored.url, &stored.path) {
            Ok(0) => {
                self.remove_photo_file(id, &stored.path);
                return Err(ChoreError::NotFound);
            }
            Ok(_) => {}
            Err(e) => {
                self.remove_photo_file(id, &stored.path);
                return Err(e.into());
            }
        }

        if let Some(old_path) = existing.photo_path.as_deref() {
            self.remove_photo_file(id, old_path);
        }

        let chore = self.get(id, user_id)?;
        info!(user_id, chore_id = id, photo = %stored.path, "Chore photo attached");

        self.notifier.broadcast_to_user(
            user_id,
            &ChoreEvent::ChoreUpdated { chore: chore.clone() },
        );
        Ok(PhotoAttached {
            message: "Photo uploaded successfully".to_string(),
            photo_url: stored.url,
            photo_path: stored.path,
            chore,
        })
    }

    /// Best effort: a failure is logged and never aborts the owning operation.
    fn remove_photo_file(&self, chore_id: i64, photo_path: &str) {
        match self.photos.remove(photo_path) {
            Ok(true) => info!(chore_id, photo = photo_path, "Removed photo file"),
            Ok(false) => {}
            Err(e) => warn!(chore_id, photo = photo_path, "Failed to delete photo file: {}", e),
        }
    }
}

fn required_title(title: Option<String>) -> Result<String> {
    match title {
        Some(title) if !title.trim().is_empty() => Ok(title),
        _ => Err(ChoreError::validation("Title is required")),
    }
}

fn parse_status(value: &str) -> Result<ChoreStatus> {
    ChoreStatus::parse(value).ok_or_else(|| {
        ChoreError::validation(format!(
            "Invalid status '{}': expected pending, in-progress or completed",
            value
        ))
    })
}

fn parse_priority(value: &str) -> Result<Priority> {
    Priority::parse(value).ok_or_else(|| {
        ChoreError::validation(format!("Invalid priority '{}': expected low, medium or high", value))
    })
}

/// Accepts RFC 3339, a naive `YYYY-MM-DDTHH:MM[:SS]` timestamp or a plain date.
/// The value is stored as given; an empty string clears it.
fn validate_due_date(due_date: Option<String>) -> Result<Option<String>> {
    let Some(due_date) = due_date.filter(|d| !d.trim().is_empty()) else {
        return Ok(None);
    };
    let trimmed = due_date.trim();
    let valid = DateTime::parse_from_rfc3339(trimmed).is_ok()
        || NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M").is_ok()
        || NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S").is_ok()
        || NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").is_ok();
    if !valid {
        return Err(ChoreError::validation(format!("Invalid due_date '{}'", due_date)));
    }
    Ok(Some(due_date))
}

fn validate_coordinate(value: Option<f64>, bound: f64, name: &str) -> Result<Option<f64>> {
    match value {
        Some(v) if !v.is_finite() || v.abs() > bound => Err(ChoreError::validation(format!(
            "Invalid {} {}: must be within ±{}",
            name, v, bound
        ))),
        other => Ok(other),
    }
}

/// Coerce a JSON value to whole points the way a loose numeric field is read:
/// numbers and numeric strings as-is, booleans as 1/0, null and blank as 0.
/// Anything else is not a finite number.
fn coerce_points(value: &Value) -> Option<i64> {
    let number = match value {
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => n.as_f64()?,
        Value::String(s) if s.trim().is_empty() => 0.0,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        Value::Array(_) | Value::Object(_) => return None,
    };
    number.is_finite().then(|| number.trunc() as i64)
}
