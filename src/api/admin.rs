use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, put},
    Json, Router,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::middleware::auth::require_admin;
use crate::api::AppState;
use crate::error::{AppError, Result};
use crate::models::applicant::ProfilePatch;
use crate::services::approval;

async fn pending_users(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Value>> {
    require_admin(&state.tokens, &headers)?;

    let users = approval::list_pending(&state.pool).await?;

    Ok(Json(json!({ "success": true, "users": users })))
}

async fn all_users(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Value>> {
    require_admin(&state.tokens, &headers)?;

    let users = approval::list_all(&state.pool).await?;

    Ok(Json(json!({ "success": true, "users": users })))
}

async fn approve_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>> {
    require_admin(&state.tokens, &headers)?;

    let user = approval::approve(&state.pool, &state.id_scheme, id).await?;

    Ok(Json(json!({ "success": true, "user": user })))
}

async fn reject_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>> {
    require_admin(&state.tokens, &headers)?;

    let user = approval::reject(&state.pool, id).await?;

    Ok(Json(json!({ "success": true, "user": user })))
}

/// Edit of the demographic whitelist. The admin UI posts every form field,
/// empty ones included, so blanks and nulls are dropped before the payload
/// becomes a patch.
async fn edit_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<Value>,
) -> Result<Json<Value>> {
    require_admin(&state.tokens, &headers)?;

    let payload = match payload {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null() && v.as_str().map_or(true, |s| !s.trim().is_empty()))
                .collect(),
        ),
        other => other,
    };

    let patch: ProfilePatch = serde_json::from_value(payload)
        .map_err(|e| AppError::Validation(format!("Invalid patch: {e}")))?;

    let user = approval::edit(&state.pool, id, patch).await?;

    Ok(Json(json!({ "success": true, "user": user })))
}

async fn delete_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>> {
    require_admin(&state.tokens, &headers)?;

    approval::delete(&state.pool, state.file_store.as_ref(), id).await?;

    Ok(Json(json!({ "success": true, "message": "Applicant deleted" })))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/admin/pending-users", get(pending_users))
        .route("/api/admin/all-users", get(all_users))
        .route("/api/admin/approve/:id", put(approve_user))
        .route("/api/admin/reject/:id", put(reject_user))
        .route("/api/admin/user/:id", put(edit_user).delete(delete_user))
}
