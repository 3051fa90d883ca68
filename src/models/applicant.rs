use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Lifecycle state of an application record.
///
/// Persisted as the exact snake_case strings; no other value ever reaches
/// the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    Registered,
    PendingApproval,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT")]
pub enum BloodGroup {
    #[sqlx(rename = "A+")]
    #[serde(rename = "A+")]
    APositive,
    #[sqlx(rename = "A-")]
    #[serde(rename = "A-")]
    ANegative,
    #[sqlx(rename = "B+")]
    #[serde(rename = "B+")]
    BPositive,
    #[sqlx(rename = "B-")]
    #[serde(rename = "B-")]
    BNegative,
    #[sqlx(rename = "AB+")]
    #[serde(rename = "AB+")]
    AbPositive,
    #[sqlx(rename = "AB-")]
    #[serde(rename = "AB-")]
    AbNegative,
    #[sqlx(rename = "O+")]
    #[serde(rename = "O+")]
    OPositive,
    #[sqlx(rename = "O-")]
    #[serde(rename = "O-")]
    ONegative,
    /// Unknown/undisclosed sentinel.
    #[sqlx(rename = "Nil")]
    #[serde(rename = "Nil")]
    Nil,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Applicant {
    pub id: Uuid,

    pub name: String,
    pub nickname: String,
    pub father_name: Option<String>,
    pub email: Option<String>,
    pub phone: String,
    pub whatsapp: Option<String>,

    pub age: Option<i32>,
    pub dob: Option<NaiveDate>,
    pub blood_group: BloodGroup,
    pub address: String,

    pub photo_url: Option<String>,
    pub photo_id: Option<String>,
    pub payment_proof_url: Option<String>,
    pub payment_proof_id: Option<String>,

    pub status: MembershipStatus,
    pub approved_at: Option<DateTime<Utc>>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub membership_id: Option<String>,

    pub revision: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewApplicant {
    pub name: String,
    pub nickname: String,
    pub father_name: Option<String>,
    pub email: Option<String>,
    pub phone: String,
    pub whatsapp: Option<String>,
    pub age: Option<i32>,
    pub dob: Option<NaiveDate>,
    pub blood_group: BloodGroup,
    pub address: String,
    pub photo_url: Option<String>,
    pub photo_id: Option<String>,
    pub payment_proof_url: Option<String>,
    pub payment_proof_id: Option<String>,
    pub status: MembershipStatus,
}

/// Whitelisted field subset an administrator may overwrite. Status,
/// membership identifier, attachments and timestamps are deliberately
/// not representable here.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatch {
    pub name: Option<String>,
    pub nickname: Option<String>,
    pub father_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub whatsapp: Option<String>,
    pub age: Option<i32>,
    pub dob: Option<NaiveDate>,
    pub blood_group: Option<BloodGroup>,
    pub address: Option<String>,
}

impl Applicant {
    /// Inserts a new application record.
    pub async fn create(pool: &PgPool, data: NewApplicant) -> Result<Self, sqlx::Error> {
        let applicant = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO applicants (
                name, nickname, father_name, email, phone, whatsapp,
                age, dob, blood_group, address,
                photo_url, photo_id, payment_proof_url, payment_proof_id,
                status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING *
            "#,
        )
        .bind(&data.name)
        .bind(&data.nickname)
        .bind(&data.father_name)
        .bind(&data.email)
        .bind(&data.phone)
        .bind(&data.whatsapp)
        .bind(data.age)
        .bind(data.dob)
        .bind(data.blood_group)
        .bind(&data.address)
        .bind(&data.photo_url)
        .bind(&data.photo_id)
        .bind(&data.payment_proof_url)
        .bind(&data.payment_proof_id)
        .bind(data.status)
        .fetch_one(pool)
        .await?;

        Ok(applicant)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let applicant = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM applicants WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(applicant)
    }

    pub async fn find_by_phone(pool: &PgPool, phone: &str) -> Result<Option<Self>, sqlx::Error> {
        let applicant = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM applicants WHERE phone = $1
            "#,
        )
        .bind(phone)
        .fetch_optional(pool)
        .await?;

        Ok(applicant)
    }

    /// Member login lookup: both the phone and the issued identifier must match.
    pub async fn find_by_phone_and_membership_id(
        pool: &PgPool,
        phone: &str,
        membership_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let applicant = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM applicants
            WHERE phone = $1 AND membership_id = $2
            "#,
        )
        .bind(phone)
        .bind(membership_id)
        .fetch_optional(pool)
        .await?;

        Ok(applicant)
    }

    /// Lists every record, most recent first.
    pub async fn list_all(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        let applicants = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM applicants ORDER BY created_at DESC
            "#,
        )
        .fetch_all(pool)
        .await?;

        Ok(applicants)
    }

    /// Lists records awaiting review, most recent first.
    pub async fn list_pending(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        let applicants = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM applicants
            WHERE status IN ('pending_approval', 'registered')
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(pool)
        .await?;

        Ok(applicants)
    }

    /// Every issued identifier starting with the configured prefix, for the
    /// allocator's max-suffix scan.
    pub async fn issued_membership_ids(
        pool: &PgPool,
        prefix: &str,
    ) -> Result<Vec<String>, sqlx::Error> {
        let ids: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT membership_id FROM applicants
            WHERE membership_id LIKE $1 || '%'
            "#,
        )
        .bind(prefix)
        .fetch_all(pool)
        .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    /// Attaches a payment proof (and optionally a photo) and moves the
    /// record to `pending_approval`. Guarded by the revision check; `None`
    /// means the record changed underneath the caller.
    pub async fn apply_payment_proof(
        pool: &PgPool,
        id: Uuid,
        expected_revision: i64,
        proof_url: &str,
        proof_id: &str,
        photo: Option<(&str, &str)>,
    ) -> Result<Option<Self>, sqlx::Error> {
        let (photo_url, photo_id) = match photo {
            Some((url, public_id)) => (Some(url), Some(public_id)),
            None => (None, None),
        };

        let applicant = sqlx::query_as::<_, Self>(
            r#"
            UPDATE applicants
            SET
                payment_proof_url = $3,
                payment_proof_id = $4,
                photo_url = COALESCE($5, photo_url),
                photo_id = COALESCE($6, photo_id),
                status = 'pending_approval',
                revision = revision + 1,
                updated_at = NOW()
            WHERE id = $1 AND revision = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(expected_revision)
        .bind(proof_url)
        .bind(proof_id)
        .bind(photo_url)
        .bind(photo_id)
        .fetch_optional(pool)
        .await?;

        Ok(applicant)
    }

    /// Applies an approval in one guarded update: identifier, timestamps and
    /// status together. A concurrent writer makes this return `None`; a
    /// duplicate identifier trips the unique index and surfaces as a
    /// database error for the allocator to retry.
    pub async fn apply_approval(
        pool: &PgPool,
        id: Uuid,
        expected_revision: i64,
        membership_id: &str,
        approved_at: DateTime<Utc>,
        expiry_date: DateTime<Utc>,
    ) -> Result<Option<Self>, sqlx::Error> {
        let applicant = sqlx::query_as::<_, Self>(
            r#"
            UPDATE applicants
            SET
                membership_id = $3,
                approved_at = $4,
                expiry_date = $5,
                status = 'approved',
                revision = revision + 1,
                updated_at = NOW()
            WHERE id = $1 AND revision = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(expected_revision)
        .bind(membership_id)
        .bind(approved_at)
        .bind(expiry_date)
        .fetch_optional(pool)
        .await?;

        Ok(applicant)
    }

    /// Marks the record rejected. Identifier and approval timestamps are
    /// left as-is so the history stays auditable.
    pub async fn apply_rejection(
        pool: &PgPool,
        id: Uuid,
        expected_revision: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        let applicant = sqlx::query_as::<_, Self>(
            r#"
            UPDATE applicants
            SET
                status = 'rejected',
                revision = revision + 1,
                updated_at = NOW()
            WHERE id = $1 AND revision = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(expected_revision)
        .fetch_optional(pool)
        .await?;

        Ok(applicant)
    }

    /// Overwrites the whitelisted demographic fields.
    pub async fn apply_profile_patch(
        pool: &PgPool,
        id: Uuid,
        expected_revision: i64,
        patch: &ProfilePatch,
    ) -> Result<Option<Self>, sqlx::Error> {
        let applicant = sqlx::query_as::<_, Self>(
            r#"
            UPDATE applicants
            SET
                name = COALESCE($3, name),
                nickname = COALESCE($4, nickname),
                father_name = COALESCE($5, father_name),
                email = COALESCE($6, email),
                phone = COALESCE($7, phone),
                whatsapp = COALESCE($8, whatsapp),
                age = COALESCE($9, age),
                dob = COALESCE($10, dob),
                blood_group = COALESCE($11, blood_group),
                address = COALESCE($12, address),
                revision = revision + 1,
                updated_at = NOW()
            WHERE id = $1 AND revision = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(expected_revision)
        .bind(&patch.name)
        .bind(&patch.nickname)
        .bind(&patch.father_name)
        .bind(&patch.email)
        .bind(&patch.phone)
        .bind(&patch.whatsapp)
        .bind(patch.age)
        .bind(patch.dob)
        .bind(patch.blood_group)
        .bind(&patch.address)
        .fetch_optional(pool)
        .await?;

        Ok(applicant)
    }

    /// Hard delete. Attachment cleanup at the storage provider is the
    /// caller's responsibility.
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM applicants WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Both attachment locators present - the approval precondition.
    pub fn has_both_proofs(&self) -> bool {
        self.photo_url.is_some() && self.payment_proof_url.is_some()
    }
}
