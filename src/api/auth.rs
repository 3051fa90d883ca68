use axum::{extract::State, routing::post, Json, Router};
use chrono::Duration;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::AppState;
use crate::error::{AppError, Result};
use crate::models::{Applicant, MembershipStatus};
use crate::services::registration::normalize_phone;
use crate::services::token::{ROLE_ADMIN, ROLE_MEMBER};

const ADMIN_TOKEN_TTL_HOURS: i64 = 24;
const MEMBER_TOKEN_TTL_DAYS: i64 = 7;

#[derive(Debug, Deserialize)]
struct AdminLoginRequest {
    username: String,
    password: String,
}

async fn admin_login(
    State(state): State<AppState>,
    Json(request): Json<AdminLoginRequest>,
) -> Result<Json<Value>> {
    if !state
        .credentials
        .verify(request.username.trim(), &request.password)
    {
        tracing::warn!(username = %request.username, "Failed admin login attempt");
        return Err(AppError::Unauthorized);
    }

    let token = state
        .tokens
        .issue(
            request.username.trim(),
            ROLE_ADMIN,
            Duration::hours(ADMIN_TOKEN_TTL_HOURS),
        )
        .map_err(|e| AppError::Internal(anyhow::Error::new(e)))?;

    tracing::info!("Admin logged in");

    Ok(Json(json!({
        "success": true,
        "message": "Login successful",
        "token": token,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MemberLoginRequest {
    phone: String,
    membership_id: String,
}

/// Members authenticate with their phone number and issued membership
/// identifier; only approved memberships get a token.
async fn member_login(
    State(state): State<AppState>,
    Json(request): Json<MemberLoginRequest>,
) -> Result<Json<Value>> {
    if request.phone.trim().is_empty() || request.membership_id.trim().is_empty() {
        return Err(AppError::Validation(
            "Phone number and Membership ID are required".to_string(),
        ));
    }

    let phone = normalize_phone(&request.phone)
        .ok_or_else(|| AppError::Validation("Invalid phone number".to_string()))?;

    let member = Applicant::find_by_phone_and_membership_id(
        &state.pool,
        &phone,
        request.membership_id.trim(),
    )
    .await?
    .ok_or(AppError::Unauthorized)?;

    if member.status != MembershipStatus::Approved {
        return Err(AppError::Forbidden(
            "Membership not approved yet".to_string(),
        ));
    }

    let token = state
        .tokens
        .issue(
            &member.id.to_string(),
            ROLE_MEMBER,
            Duration::days(MEMBER_TOKEN_TTL_DAYS),
        )
        .map_err(|e| AppError::Internal(anyhow::Error::new(e)))?;

    tracing::info!(applicant_id = %member.id, "Member logged in");

    Ok(Json(json!({
        "success": true,
        "message": "Login successful",
        "token": token,
        "userId": member.id,
    })))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/admin/login", post(admin_login))
        .route("/api/member/login", post(member_login))
}
