use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

use crate::db;
use crate::models::applicant::{Applicant, NewApplicant};
use crate::models::{BloodGroup, MembershipStatus};
use crate::services::storage::{FileStore, StorageError, StoredFile};

// Ten digits, Indian mobile range, after normalization.
static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[6-9]\d{9}$").expect("valid regex"));

#[derive(Error, Debug)]
pub enum RegistrationError {
    #[error("{0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("{0}")]
    InvalidField(String),

    #[error("Phone number already registered")]
    DuplicatePhone,

    #[error("Applicant not found")]
    NotFound,

    #[error("Record was modified concurrently")]
    Conflict,

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Registration input after multipart decoding. The derive is the single
/// place that says which fields are required and which are optional.
#[derive(Debug, Clone, Validate)]
pub struct RegistrationForm {
    #[validate(length(min = 2, max = 100, message = "name is required"))]
    pub name: String,

    #[validate(length(min = 1, max = 50, message = "nickname is required"))]
    pub nickname: String,

    pub father_name: Option<String>,

    #[validate(email(message = "invalid email address"))]
    pub email: Option<String>,

    #[validate(length(min = 10, message = "phone is required"))]
    pub phone: String,

    pub whatsapp: Option<String>,

    #[validate(range(min = 10, max = 100, message = "age must be between 10 and 100"))]
    pub age: Option<i32>,

    pub dob: Option<NaiveDate>,

    pub blood_group: BloodGroup,

    #[validate(length(min = 5, max = 500, message = "address is required"))]
    pub address: String,
}

/// Raw attachment bytes received from the HTTP layer.
#[derive(Debug, Clone)]
pub struct AttachmentUpload {
    pub bytes: Vec<u8>,
    pub filename: String,
}

#[derive(Debug)]
pub struct RegistrationRequest {
    pub form: RegistrationForm,
    pub photo: Option<AttachmentUpload>,
    pub payment_proof: Option<AttachmentUpload>,
}

/// Strips formatting from a contact number and keeps the trailing ten
/// digits. Returns `None` when what's left isn't a plausible mobile number.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    let start = digits.len().saturating_sub(10);
    let last_ten = &digits[start..];

    PHONE_RE.is_match(last_ten).then(|| last_ten.to_string())
}

/// Registers a new applicant.
///
/// Validation runs as one schema pass over the form, then the contact
/// numbers are normalized, the phone is checked for duplicates, attachments
/// go to the file store, and the record lands in `registered` or
/// `pending_approval` depending on whether payment proof came along.
/// Any attachment already uploaded when a later step fails is deleted
/// again before the error surfaces.
#[tracing::instrument(skip(pool, store, request), fields(name = %request.form.name))]
pub async fn register(
    pool: &PgPool,
    store: &dyn FileStore,
    folder: &str,
    request: RegistrationRequest,
) -> Result<Applicant, RegistrationError> {
    let form = request.form;
    form.validate()?;

    let phone = normalize_phone(&form.phone)
        .ok_or_else(|| RegistrationError::InvalidField("Invalid phone number".to_string()))?;

    let whatsapp = match form.whatsapp.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => Some(normalize_phone(raw).ok_or_else(|| {
            RegistrationError::InvalidField("Invalid WhatsApp number".to_string())
        })?),
        _ => None,
    };

    if form.age.is_none() && form.dob.is_none() {
        return Err(RegistrationError::InvalidField(
            "Either age or date of birth is required".to_string(),
        ));
    }

    if Applicant::find_by_phone(pool, &phone).await?.is_some() {
        return Err(RegistrationError::DuplicatePhone);
    }

    let photo = match request.photo {
        Some(attachment) => Some(
            store
                .upload(attachment.bytes, &attachment.filename, folder)
                .await?,
        ),
        None => None,
    };

    let payment_proof = match request.payment_proof {
        Some(attachment) => {
            match store
                .upload(attachment.bytes, &attachment.filename, folder)
                .await
            {
                Ok(stored) => Some(stored),
                Err(e) => {
                    release_uploads(store, [&photo]).await;
                    return Err(e.into());
                }
            }
        }
        None => None,
    };

    let status = if payment_proof.is_some() {
        MembershipStatus::PendingApproval
    } else {
        MembershipStatus::Registered
    };

    let data = NewApplicant {
        name: form.name.trim().to_string(),
        nickname: form.nickname.trim().to_string(),
        father_name: form.father_name.map(|f| f.trim().to_string()),
        email: form.email.map(|e| e.trim().to_lowercase()),
        phone,
        whatsapp,
        age: form.age,
        dob: form.dob,
        blood_group: form.blood_group,
        address: form.address.trim().to_string(),
        photo_url: photo.as_ref().map(|f| f.url.clone()),
        photo_id: photo.as_ref().map(|f| f.public_id.clone()),
        payment_proof_url: payment_proof.as_ref().map(|f| f.url.clone()),
        payment_proof_id: payment_proof.as_ref().map(|f| f.public_id.clone()),
        status,
    };

    match Applicant::create(pool, data).await {
        Ok(applicant) => {
            tracing::info!(applicant_id = %applicant.id, status = ?applicant.status, "Applicant registered");
            Ok(applicant)
        }
        Err(e) => {
            // The insert failed after the uploads went through; take them
            // back out so the provider doesn't accumulate orphans.
            release_uploads(store, [&photo, &payment_proof]).await;

            if db::is_unique_violation(&e, "applicants_phone_key") {
                Err(RegistrationError::DuplicatePhone)
            } else {
                Err(e.into())
            }
        }
    }
}

/// Attaches payment proof (and optionally a late photo) to an existing
/// record and moves it to `pending_approval`. Allowed from `registered`,
/// `pending_approval` (replacing the proof) and `rejected` (resubmission);
/// an approved membership has nothing left to pay for.
#[tracing::instrument(skip(pool, store, proof, photo))]
pub async fn submit_payment(
    pool: &PgPool,
    store: &dyn FileStore,
    folder: &str,
    id: Uuid,
    proof: AttachmentUpload,
    photo: Option<AttachmentUpload>,
) -> Result<Applicant, RegistrationError> {
    let record = Applicant::find_by_id(pool, id)
        .await?
        .ok_or(RegistrationError::NotFound)?;

    if record.status == MembershipStatus::Approved {
        return Err(RegistrationError::InvalidField(
            "Membership is already approved".to_string(),
        ));
    }

    let stored_proof = store.upload(proof.bytes, &proof.filename, folder).await?;

    let stored_photo = match photo {
        Some(attachment) => {
            match store
                .upload(attachment.bytes, &attachment.filename, folder)
                .await
            {
                Ok(stored) => Some(stored),
                Err(e) => {
                    release_uploads(store, [&Some(stored_proof)]).await;
                    return Err(e.into());
                }
            }
        }
        None => None,
    };

    let updated = Applicant::apply_payment_proof(
        pool,
        id,
        record.revision,
        &stored_proof.url,
        &stored_proof.public_id,
        stored_photo
            .as_ref()
            .map(|f| (f.url.as_str(), f.public_id.as_str())),
    )
    .await;

    match updated {
        Ok(Some(applicant)) => {
            // The replaced proof now belongs to nobody; best-effort cleanup.
            if let Some(old_proof) = record.payment_proof_id.as_deref() {
                if old_proof != stored_proof.public_id {
                    if let Err(e) = store.delete(old_proof).await {
                        tracing::warn!(public_id = %old_proof, error = %e, "Failed to delete replaced payment proof");
                    }
                }
            }
            tracing::info!(applicant_id = %applicant.id, "Payment proof submitted");
            Ok(applicant)
        }
        Ok(None) => {
            release_uploads(store, [&Some(stored_proof), &stored_photo]).await;
            Err(RegistrationError::Conflict)
        }
        Err(e) => {
            release_uploads(store, [&Some(stored_proof), &stored_photo]).await;
            Err(e.into())
        }
    }
}

/// Compensating cleanup for uploads that ended up unreferenced. Failures
/// are logged, not propagated: the original error matters more.
async fn release_uploads<'a>(
    store: &dyn FileStore,
    uploads: impl IntoIterator<Item = &'a Option<StoredFile>>,
) {
    for stored in uploads.into_iter().flatten() {
        if let Err(e) = store.delete(&stored.public_id).await {
            tracing::warn!(public_id = %stored.public_id, error = %e, "Compensating delete failed; file orphaned");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_form() -> RegistrationForm {
        RegistrationForm {
            name: "Arun Kumar".to_string(),
            nickname: "Arun".to_string(),
            father_name: None,
            email: Some("arun@example.com".to_string()),
            phone: "+91 98765 43210".to_string(),
            whatsapp: None,
            age: Some(27),
            dob: None,
            blood_group: BloodGroup::OPositive,
            address: "12 Temple Road, Eriyapady".to_string(),
        }
    }

    #[test]
    fn normalization_strips_country_code_and_punctuation() {
        assert_eq!(
            normalize_phone("+91 98765-43210").as_deref(),
            Some("9876543210")
        );
        assert_eq!(normalize_phone("09876543210").as_deref(), Some("9876543210"));
        assert_eq!(normalize_phone("9876543210").as_deref(), Some("9876543210"));
    }

    #[test]
    fn normalization_rejects_bad_numbers() {
        assert_eq!(normalize_phone("12345"), None);
        // Leading digit outside the mobile range.
        assert_eq!(normalize_phone("5876543210"), None);
        assert_eq!(normalize_phone("no digits here"), None);
    }

    #[test]
    fn valid_form_passes_the_schema() {
        assert!(valid_form().validate().is_ok());
    }

    #[test]
    fn missing_name_fails_the_schema() {
        let mut form = valid_form();
        form.name = "".to_string();
        let errors = form.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("name"));
    }

    #[test]
    fn out_of_range_age_fails_the_schema() {
        let mut form = valid_form();
        form.age = Some(7);
        assert!(form.validate().is_err());
    }

    #[test]
    fn bad_email_fails_the_schema() {
        let mut form = valid_form();
        form.email = Some("not-an-email".to_string());
        assert!(form.validate().is_err());
    }

    #[test]
    fn optional_fields_may_be_absent() {
        let mut form = valid_form();
        form.father_name = None;
        form.email = None;
        form.whatsapp = None;
        form.dob = None;
        assert!(form.validate().is_ok());
    }
}
