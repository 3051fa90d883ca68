use chrono::{DateTime, Months, Utc};
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;
use validator::ValidateEmail;

use crate::db;
use crate::models::applicant::ProfilePatch;
use crate::models::Applicant;
use crate::services::membership_id::{self, IdScheme};
use crate::services::registration::normalize_phone;
use crate::services::storage::FileStore;

/// Lost allocation races before the approval gives up.
const MAX_ALLOCATION_ATTEMPTS: u32 = 3;

#[derive(Error, Debug)]
pub enum ApprovalError {
    #[error("Applicant not found")]
    NotFound,

    #[error("Photo and payment proof are required before approval")]
    MissingProof,

    #[error("Record was modified concurrently")]
    Conflict,

    #[error("Could not allocate a membership identifier")]
    AllocationFailed,

    #[error("Phone number already registered")]
    DuplicatePhone,

    #[error("{0}")]
    InvalidField(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// One calendar year of validity, computed once at approval time.
/// A leap-day approval clamps to Feb 28 of the following year.
pub fn expiry_after(approved_at: DateTime<Utc>) -> DateTime<Utc> {
    approved_at
        .checked_add_months(Months::new(12))
        .expect("timestamp one year out stays in range")
}

/// Everything an approval writes, derived up front so the update is a
/// single guarded statement.
#[derive(Debug, Clone)]
pub struct ApprovalStamp {
    pub membership_id: String,
    pub approved_at: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
}

/// The approve transition's rules: both attachments must be present, and a
/// record that already carries an identifier keeps it - re-approving a
/// rejected member never re-allocates.
pub fn prepare_approval(
    record: &Applicant,
    fresh_id: Option<String>,
    now: DateTime<Utc>,
) -> Result<ApprovalStamp, ApprovalError> {
    if !record.has_both_proofs() {
        return Err(ApprovalError::MissingProof);
    }

    let membership_id = match record.membership_id.clone() {
        Some(existing) => existing,
        None => fresh_id.ok_or(ApprovalError::AllocationFailed)?,
    };

    Ok(ApprovalStamp {
        membership_id,
        approved_at: now,
        expiry_date: expiry_after(now),
    })
}

/// Approves an application.
///
/// Loads the record, allocates an identifier when it has none, and applies
/// status, identifier and timestamps in one revision-guarded update. A
/// concurrent writer surfaces as `Conflict`; losing the identifier race
/// trips the unique index and triggers a re-scan, bounded by
/// `MAX_ALLOCATION_ATTEMPTS`.
#[tracing::instrument(skip(pool, scheme), fields(applicant_id = %id))]
pub async fn approve(
    pool: &PgPool,
    scheme: &IdScheme,
    id: Uuid,
) -> Result<Applicant, ApprovalError> {
    for attempt in 1..=MAX_ALLOCATION_ATTEMPTS {
        let record = Applicant::find_by_id(pool, id)
            .await?
            .ok_or(ApprovalError::NotFound)?;

        let fresh_id = if record.membership_id.is_none() {
            Some(membership_id::propose_next(pool, scheme).await?)
        } else {
            None
        };

        let stamp = prepare_approval(&record, fresh_id, Utc::now())?;

        match Applicant::apply_approval(
            pool,
            id,
            record.revision,
            &stamp.membership_id,
            stamp.approved_at,
            stamp.expiry_date,
        )
        .await
        {
            Ok(Some(applicant)) => {
                tracing::info!(
                    membership_id = %stamp.membership_id,
                    expiry_date = %stamp.expiry_date.to_rfc3339(),
                    "Applicant approved"
                );
                return Ok(applicant);
            }
            Ok(None) => return Err(ApprovalError::Conflict),
            Err(e) if db::is_unique_violation(&e, "applicants_membership_id_key") => {
                tracing::warn!(attempt, proposed = %stamp.membership_id, "Membership id collision, re-scanning");
                continue;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(ApprovalError::AllocationFailed)
}

/// Rejects an application. Status only: identifier and approval timestamps
/// stay on the record for auditability, and a later re-approval reuses the
/// same identifier.
#[tracing::instrument(skip(pool), fields(applicant_id = %id))]
pub async fn reject(pool: &PgPool, id: Uuid) -> Result<Applicant, ApprovalError> {
    let record = Applicant::find_by_id(pool, id)
        .await?
        .ok_or(ApprovalError::NotFound)?;

    match Applicant::apply_rejection(pool, id, record.revision).await? {
        Some(applicant) => {
            tracing::info!("Applicant rejected");
            Ok(applicant)
        }
        None => Err(ApprovalError::Conflict),
    }
}

/// Checks and normalizes an administrator's patch with the same per-field
/// rules registration applies.
pub fn validate_patch(patch: &mut ProfilePatch) -> Result<(), ApprovalError> {
    if let Some(name) = &patch.name {
        if name.trim().len() < 2 {
            return Err(ApprovalError::InvalidField("name is required".to_string()));
        }
    }

    if let Some(nickname) = &patch.nickname {
        if nickname.trim().is_empty() {
            return Err(ApprovalError::InvalidField(
                "nickname must not be empty".to_string(),
            ));
        }
    }

    if let Some(email) = patch.email.take() {
        let email = email.trim().to_lowercase();
        if !email.validate_email() {
            return Err(ApprovalError::InvalidField(
                "invalid email address".to_string(),
            ));
        }
        patch.email = Some(email);
    }

    if let Some(phone) = patch.phone.take() {
        patch.phone = Some(normalize_phone(&phone).ok_or_else(|| {
            ApprovalError::InvalidField("Invalid phone number".to_string())
        })?);
    }

    if let Some(whatsapp) = patch.whatsapp.take() {
        patch.whatsapp = Some(normalize_phone(&whatsapp).ok_or_else(|| {
            ApprovalError::InvalidField("Invalid WhatsApp number".to_string())
        })?);
    }

    if let Some(age) = patch.age {
        if !(10..=100).contains(&age) {
            return Err(ApprovalError::InvalidField(
                "age must be between 10 and 100".to_string(),
            ));
        }
    }

    if let Some(address) = &patch.address {
        if address.trim().len() < 5 {
            return Err(ApprovalError::InvalidField(
                "address is required".to_string(),
            ));
        }
    }

    Ok(())
}

/// Administrator edit of the demographic whitelist. The patch type cannot
/// express status, identifier or attachments, so those survive any input.
#[tracing::instrument(skip(pool, patch), fields(applicant_id = %id))]
pub async fn edit(
    pool: &PgPool,
    id: Uuid,
    mut patch: ProfilePatch,
) -> Result<Applicant, ApprovalError> {
    validate_patch(&mut patch)?;

    let record = Applicant::find_by_id(pool, id)
        .await?
        .ok_or(ApprovalError::NotFound)?;

    match Applicant::apply_profile_patch(pool, id, record.revision, &patch).await {
        Ok(Some(applicant)) => Ok(applicant),
        Ok(None) => Err(ApprovalError::Conflict),
        Err(e) if db::is_unique_violation(&e, "applicants_phone_key") => {
            Err(ApprovalError::DuplicatePhone)
        }
        Err(e) => Err(e.into()),
    }
}

/// Permanently removes a record and releases its attachments at the
/// storage provider. Attachment cleanup is best-effort: the record is
/// already gone, so failures are logged rather than surfaced.
#[tracing::instrument(skip(pool, store), fields(applicant_id = %id))]
pub async fn delete(
    pool: &PgPool,
    store: &dyn FileStore,
    id: Uuid,
) -> Result<(), ApprovalError> {
    let record = Applicant::find_by_id(pool, id)
        .await?
        .ok_or(ApprovalError::NotFound)?;

    if !Applicant::delete(pool, id).await? {
        return Err(ApprovalError::NotFound);
    }

    for public_id in [record.photo_id, record.payment_proof_id]
        .into_iter()
        .flatten()
    {
        if let Err(e) = store.delete(&public_id).await {
            tracing::warn!(public_id = %public_id, error = %e, "Failed to release attachment; file orphaned");
        }
    }

    tracing::info!("Applicant deleted");
    Ok(())
}

pub async fn list_pending(pool: &PgPool) -> Result<Vec<Applicant>, ApprovalError> {
    Ok(Applicant::list_pending(pool).await?)
}

pub async fn list_all(pool: &PgPool) -> Result<Vec<Applicant>, ApprovalError> {
    Ok(Applicant::list_all(pool).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BloodGroup, MembershipStatus};
    use chrono::TimeZone;

    fn record(
        status: MembershipStatus,
        membership_id: Option<&str>,
        with_proofs: bool,
    ) -> Applicant {
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 9, 0, 0).unwrap();
        Applicant {
            id: Uuid::new_v4(),
            name: "Arun Kumar".to_string(),
            nickname: "Arun".to_string(),
            father_name: None,
            email: None,
            phone: "9876543210".to_string(),
            whatsapp: None,
            age: Some(27),
            dob: None,
            blood_group: BloodGroup::OPositive,
            address: "12 Temple Road, Eriyapady".to_string(),
            photo_url: with_proofs.then(|| "https://files.example/photo.jpg".to_string()),
            photo_id: with_proofs.then(|| "members/photo".to_string()),
            payment_proof_url: with_proofs.then(|| "https://files.example/proof.jpg".to_string()),
            payment_proof_id: with_proofs.then(|| "members/proof".to_string()),
            status,
            approved_at: None,
            expiry_date: None,
            membership_id: membership_id.map(str::to_string),
            revision: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn expiry_is_exactly_one_year_out() {
        let approved = Utc.with_ymd_and_hms(2026, 5, 10, 14, 30, 0).unwrap();
        let expiry = expiry_after(approved);
        assert_eq!(expiry, Utc.with_ymd_and_hms(2027, 5, 10, 14, 30, 0).unwrap());
    }

    #[test]
    fn leap_day_expiry_clamps_to_feb_28() {
        let approved = Utc.with_ymd_and_hms(2024, 2, 29, 10, 0, 0).unwrap();
        let expiry = expiry_after(approved);
        assert_eq!(expiry, Utc.with_ymd_and_hms(2025, 2, 28, 10, 0, 0).unwrap());
    }

    #[test]
    fn approval_without_proofs_is_a_hard_error() {
        let pending = record(MembershipStatus::PendingApproval, None, false);
        let result = prepare_approval(&pending, Some("CLUB-0001".to_string()), Utc::now());
        assert!(matches!(result, Err(ApprovalError::MissingProof)));
    }

    #[test]
    fn first_approval_takes_the_fresh_identifier() {
        let pending = record(MembershipStatus::PendingApproval, None, true);
        let stamp = prepare_approval(&pending, Some("CLUB-0042".to_string()), Utc::now()).unwrap();
        assert_eq!(stamp.membership_id, "CLUB-0042");
        assert_eq!(stamp.expiry_date, expiry_after(stamp.approved_at));
    }

    #[test]
    fn reapproval_keeps_the_existing_identifier() {
        let rejected = record(MembershipStatus::Rejected, Some("CLUB-0007"), true);
        // Even a bogus fresh proposal must lose against the issued id.
        let stamp =
            prepare_approval(&rejected, Some("CLUB-9999".to_string()), Utc::now()).unwrap();
        assert_eq!(stamp.membership_id, "CLUB-0007");
    }

    #[test]
    fn patch_phone_is_normalized() {
        let mut patch = ProfilePatch {
            phone: Some("+91 98765-43211".to_string()),
            ..Default::default()
        };
        validate_patch(&mut patch).unwrap();
        assert_eq!(patch.phone.as_deref(), Some("9876543211"));
    }

    #[test]
    fn patch_rejects_a_bad_phone() {
        let mut patch = ProfilePatch {
            phone: Some("12345".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            validate_patch(&mut patch),
            Err(ApprovalError::InvalidField(_))
        ));
    }

    #[test]
    fn patch_rejects_a_bad_email_and_lowercases_good_ones() {
        let mut bad = ProfilePatch {
            email: Some("nope".to_string()),
            ..Default::default()
        };
        assert!(validate_patch(&mut bad).is_err());

        let mut good = ProfilePatch {
            email: Some("Arun@Example.COM".to_string()),
            ..Default::default()
        };
        validate_patch(&mut good).unwrap();
        assert_eq!(good.email.as_deref(), Some("arun@example.com"));
    }

    #[test]
    fn patch_rejects_out_of_range_age() {
        let mut patch = ProfilePatch {
            age: Some(101),
            ..Default::default()
        };
        assert!(validate_patch(&mut patch).is_err());
    }

    // The edit whitelist is structural: lifecycle keys in the payload are
    // simply not part of the patch type.
    #[test]
    fn patch_ignores_lifecycle_fields_in_the_payload() {
        let patch: ProfilePatch = serde_json::from_value(serde_json::json!({
            "name": "New Name",
            "status": "approved",
            "membershipId": "CLUB-9999",
            "photoUrl": "https://attacker.example/x.jpg",
            "approvedAt": "2026-01-01T00:00:00Z",
        }))
        .unwrap();

        assert_eq!(patch.name.as_deref(), Some("New Name"));
        assert!(patch.phone.is_none());
    }
}
