use std::collections::HashMap;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::middleware::auth::require_member;
use crate::api::AppState;
use crate::error::{AppError, Result};
use crate::models::{Applicant, BloodGroup};
use crate::services::registration::{
    self, AttachmentUpload, RegistrationForm, RegistrationRequest,
};

// Attachments are phone-camera images; the provider rejects big ones anyway.
const MAX_ATTACHMENT_BYTES: usize = 5 * 1024 * 1024;

#[derive(Default)]
struct ParsedUpload {
    fields: HashMap<String, String>,
    photo: Option<AttachmentUpload>,
    payment_proof: Option<AttachmentUpload>,
}

async fn read_multipart(multipart: &mut Multipart) -> Result<ParsedUpload> {
    let mut parsed = ParsedUpload::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart payload: {e}")))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        match name.as_str() {
            "photo" | "paymentProof" | "paymentScreenshot" => {
                let filename = field.file_name().unwrap_or("upload.jpg").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Invalid file upload: {e}")))?;

                if bytes.is_empty() {
                    continue;
                }
                if bytes.len() > MAX_ATTACHMENT_BYTES {
                    return Err(AppError::Validation(
                        "Attachment exceeds the 5 MB limit".to_string(),
                    ));
                }

                let upload = AttachmentUpload {
                    bytes: bytes.to_vec(),
                    filename,
                };
                if name == "photo" {
                    parsed.photo = Some(upload);
                } else {
                    parsed.payment_proof = Some(upload);
                }
            }
            _ => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Invalid form field: {e}")))?;
                parsed.fields.insert(name, text);
            }
        }
    }

    Ok(parsed)
}

fn parse_blood_group(value: Option<&str>) -> Result<BloodGroup> {
    let raw = value.ok_or_else(|| AppError::Validation("Blood group is required".to_string()))?;

    if raw.eq_ignore_ascii_case("nil") {
        return Ok(BloodGroup::Nil);
    }

    serde_json::from_value(Value::String(raw.to_uppercase()))
        .map_err(|_| AppError::Validation(format!("Invalid blood group: {raw}")))
}

fn form_from_fields(fields: &HashMap<String, String>) -> Result<RegistrationForm> {
    let get = |key: &str| {
        fields
            .get(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let age = get("age")
        .map(|v| v.parse::<i32>())
        .transpose()
        .map_err(|_| AppError::Validation("Age must be a number".to_string()))?;

    let dob = get("dob")
        .map(|v| NaiveDate::parse_from_str(&v, "%Y-%m-%d"))
        .transpose()
        .map_err(|_| AppError::Validation("Date of birth must be YYYY-MM-DD".to_string()))?;

    let blood_group = parse_blood_group(get("bloodGroup").as_deref())?;

    Ok(RegistrationForm {
        name: get("name").unwrap_or_default(),
        nickname: get("nickname").unwrap_or_default(),
        father_name: get("fatherName"),
        email: get("email"),
        phone: get("phone").unwrap_or_default(),
        whatsapp: get("whatsapp"),
        age,
        dob,
        blood_group,
        address: get("address").unwrap_or_default(),
    })
}

/// Public registration endpoint. Attachments are optional at this point;
/// supplying the payment proof up front lands the record straight in
/// `pending_approval`.
async fn register(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse> {
    let parsed = read_multipart(&mut multipart).await?;
    let form = form_from_fields(&parsed.fields)?;

    let applicant = registration::register(
        &state.pool,
        state.file_store.as_ref(),
        &state.config.storage_folder,
        RegistrationRequest {
            form,
            photo: parsed.photo,
            payment_proof: parsed.payment_proof,
        },
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Registration successful",
            "user": applicant,
        })),
    ))
}

/// Public status/profile read; the record id is the capability.
async fn show_applicant(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>> {
    let applicant = Applicant::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("applicant".to_string()))?;

    Ok(Json(json!({ "success": true, "user": applicant })))
}

async fn upload_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<Value>> {
    let parsed = read_multipart(&mut multipart).await?;

    let proof = parsed
        .payment_proof
        .ok_or_else(|| AppError::Validation("No payment screenshot uploaded".to_string()))?;

    let applicant = registration::submit_payment(
        &state.pool,
        state.file_store.as_ref(),
        &state.config.storage_folder,
        id,
        proof,
        parsed.photo,
    )
    .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Payment screenshot uploaded successfully",
        "user": applicant,
    })))
}

/// Token-guarded self read for approved members.
async fn me(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Value>> {
    let claims = require_member(&state.tokens, &headers)?;

    let id = Uuid::parse_str(&claims.sub).map_err(|_| AppError::Unauthorized)?;

    let applicant = Applicant::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("applicant".to_string()))?;

    Ok(Json(json!({ "success": true, "user": applicant })))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/user/:id", get(show_applicant))
        .route("/api/user/upload-payment/:id", post(upload_payment))
        .route("/api/member/me", get(me))
        .layer(DefaultBodyLimit::max(2 * MAX_ATTACHMENT_BYTES + 64 * 1024))
}
