use std::sync::Arc;

use axum::async_trait;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequestParts, Multipart, Path, Query, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{ApiError, AppState};
use crate::auth::bearer_token;
use crate::db::{Chore, ChorePage, ChorePatch, ListQuery, NewChore};
use crate::error::Result as ChoreResult;
use crate::repository::{ChoreRepository, PhotoAttached, PhotoUpload};

/// The caller, resolved from its bearer token.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub id: i64,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("Access denied. No token provided."))?;
        state
            .auth
            .authenticate(token)
            .map(|id| AuthUser { id })
            .ok_or_else(|| ApiError::unauthorized("Invalid token"))
    }
}

/// Non-numeric ids cannot match a row.
fn chore_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse::<i64>()
        .map_err(|_| ApiError::not_found("Chore not found"))
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
}

/// Run repository work on the blocking pool; SQLite and upload writes block.
async fn blocking<T, F>(state: &AppState, failure: &'static str, work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&ChoreRepository) -> ChoreResult<T> + Send + 'static,
{
    let repo = Arc::clone(&state.repo);
    let expose = state.expose_errors;
    run_blocking(failure, expose, move || work(&repo)).await
}

async fn run_blocking<T, F>(failure: &'static str, expose: bool, work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> ChoreResult<T> + Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result.map_err(|e| ApiError::from_chore(e, failure, expose)),
        Err(join_error) => Err(ApiError::internal(failure, &join_error, expose)),
    }
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "OK",
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}

pub async fn not_found() -> ApiError {
    ApiError::not_found("Route not found")
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    page: Option<String>,
    limit: Option<String>,
    status: Option<String>,
    q: Option<String>,
}

pub async fn list_chores(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<ListParams>,
) -> Result<Json<ChorePage>, ApiError> {
    let query = ListQuery::from_params(
        params.page.as_deref(),
        params.limit.as_deref(),
        params.status.as_deref(),
        params.q.as_deref(),
    );
    blocking(&state, "Failed to fetch chores", move |repo| repo.list(user.id, &query))
        .await
        .map(Json)
}

pub async fn get_chore(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Chore>, ApiError> {
    let id = chore_id(&id)?;
    blocking(&state, "Failed to fetch chore", move |repo| repo.get(id, user.id))
        .await
        .map(Json)
}

pub async fn create_chore(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<NewChore>, JsonRejection>,
) -> Result<(StatusCode, Json<Chore>), ApiError> {
    let fields = json_body(payload)?;
    blocking(&state, "Failed to create chore", move |repo| repo.create(user.id, fields))
        .await
        .map(|chore| (StatusCode::CREATED, Json(chore)))
}

pub async fn update_chore(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<ChorePatch>, JsonRejection>,
) -> Result<Json<Chore>, ApiError> {
    let id = chore_id(&id)?;
    let patch = json_body(payload)?;
    blocking(&state, "Failed to update chore", move |repo| repo.update(id, user.id, patch))
        .await
        .map(Json)
}

pub async fn delete_chore(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = chore_id(&id)?;
    blocking(&state, "Failed to delete chore", move |repo| repo.delete(id, user.id))
        .await
        .map(|()| StatusCode::NO_CONTENT)
}

/// Read the multipart `photo` field. A missing or empty field is no upload.
async fn read_photo_field(multipart: &mut Multipart) -> Result<Option<PhotoUpload>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?
    {
        if field.name() != Some("photo") {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        if bytes.is_empty() && file_name.as_deref().map_or(true, str::is_empty) {
            return Ok(None);
        }
        return Ok(Some(PhotoUpload {
            file_name,
            bytes: bytes.to_vec(),
        }));
    }
    Ok(None)
}

pub async fn upload_photo(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PhotoAttached>, ApiError> {
    let id = chore_id(&id)?;
    let upload = match multipart {
        Ok(mut multipart) => read_photo_field(&mut multipart).await?,
        Err(rejection) => {
            debug!("Photo upload without multipart body: {}", rejection.body_text());
            None
        }
    };
    blocking(&state, "Failed to upload photo", move |repo| {
        repo.attach_photo(id, user.id, upload)
    })
    .await
    .map(Json)
}
