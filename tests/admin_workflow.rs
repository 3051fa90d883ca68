//! End-to-end review-workflow scenarios against a live Postgres.
//!
//! These need `DATABASE_URL` pointing at a disposable database:
//!
//! ```text
//! DATABASE_URL=postgres://localhost/clubpass_test cargo test -- --ignored
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use clubpass::models::{BloodGroup, MembershipStatus};
use clubpass::services::approval::{self, ApprovalError};
use clubpass::services::membership_id::IdScheme;
use clubpass::services::registration::{
    self, AttachmentUpload, RegistrationError, RegistrationForm, RegistrationRequest,
};
use clubpass::services::storage::{FileStore, StorageError, StoredFile};

/// In-memory stand-in for the file-storage provider.
#[derive(Default)]
struct MemoryStore {
    counter: AtomicUsize,
    deleted: Mutex<Vec<String>>,
    /// Uploads start failing once this many have succeeded.
    fail_after: Option<usize>,
}

impl MemoryStore {
    fn failing_after(n: usize) -> Self {
        Self {
            fail_after: Some(n),
            ..Default::default()
        }
    }

    fn deleted_ids(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl FileStore for MemoryStore {
    async fn upload(
        &self,
        _bytes: Vec<u8>,
        filename: &str,
        folder: &str,
    ) -> Result<StoredFile, StorageError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);

        if matches!(self.fail_after, Some(limit) if n >= limit) {
            return Err(StorageError::Api {
                status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                message: "provider unavailable".to_string(),
            });
        }

        let public_id = format!("{folder}/{n}");
        Ok(StoredFile {
            url: format!("https://files.test/{public_id}/{filename}"),
            public_id,
        })
    }

    async fn delete(&self, public_id: &str) -> Result<(), StorageError> {
        self.deleted.lock().unwrap().push(public_id.to_string());
        Ok(())
    }
}

async fn test_pool() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must point at a test database");
    let pool = clubpass::db::create_pool(&url).await.expect("connect");
    clubpass::db::run_migrations(&pool).await.expect("migrate");
    pool
}

fn scheme() -> IdScheme {
    IdScheme::new("CLUB-", 4)
}

/// A fresh, valid ten-digit mobile number per call so reruns don't trip
/// the phone unique index.
fn fresh_phone() -> String {
    let n = Uuid::new_v4().as_u128() % 1_000_000_000;
    format!("9{:09}", n)
}

fn form(phone: &str) -> RegistrationForm {
    RegistrationForm {
        name: "Arun Kumar".to_string(),
        nickname: "Arun".to_string(),
        father_name: Some("Krishnan".to_string()),
        email: Some("arun@example.com".to_string()),
        phone: phone.to_string(),
        whatsapp: None,
        age: Some(27),
        dob: None,
        blood_group: BloodGroup::OPositive,
        address: "12 Temple Road, Eriyapady".to_string(),
    }
}

fn attachment(name: &str) -> AttachmentUpload {
    AttachmentUpload {
        bytes: vec![0xFF, 0xD8, 0xFF],
        filename: format!("{name}.jpg"),
    }
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn full_lifecycle_register_pay_approve_reject_reapprove() {
    let pool = test_pool().await;
    let store = MemoryStore::default();
    let phone = fresh_phone();

    // Register without attachments: record starts in `registered`.
    let applicant = registration::register(
        &pool,
        &store,
        "members",
        RegistrationRequest {
            form: form(&phone),
            photo: None,
            payment_proof: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(applicant.status, MembershipStatus::Registered);
    assert!(applicant.membership_id.is_none());

    // Approval before payment proof is a hard error and changes nothing.
    let err = approval::approve(&pool, &scheme(), applicant.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ApprovalError::MissingProof));

    // Submit photo and payment proof: moves to `pending_approval`.
    let applicant = registration::submit_payment(
        &pool,
        &store,
        "members",
        applicant.id,
        attachment("proof"),
        Some(attachment("photo")),
    )
    .await
    .unwrap();
    assert_eq!(applicant.status, MembershipStatus::PendingApproval);
    assert!(applicant.photo_url.is_some());
    assert!(applicant.payment_proof_url.is_some());

    // Approve: identifier allocated, expiry exactly one year out.
    let approved = approval::approve(&pool, &scheme(), applicant.id)
        .await
        .unwrap();
    assert_eq!(approved.status, MembershipStatus::Approved);
    let membership_id = approved.membership_id.clone().expect("identifier assigned");
    assert!(membership_id.starts_with("CLUB-"));
    let approved_at = approved.approved_at.expect("approval timestamp");
    assert_eq!(
        approved.expiry_date.expect("expiry"),
        approval::expiry_after(approved_at)
    );

    // Reject afterwards: status flips, identifier stays.
    let rejected = approval::reject(&pool, approved.id).await.unwrap();
    assert_eq!(rejected.status, MembershipStatus::Rejected);
    assert_eq!(rejected.membership_id.as_deref(), Some(membership_id.as_str()));

    // Re-approval hands back the same identifier, never a new one.
    let reapproved = approval::approve(&pool, &scheme(), rejected.id)
        .await
        .unwrap();
    assert_eq!(reapproved.membership_id.as_deref(), Some(membership_id.as_str()));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn duplicate_phone_is_rejected_on_registration() {
    let pool = test_pool().await;
    let store = MemoryStore::default();
    let phone = fresh_phone();

    registration::register(
        &pool,
        &store,
        "members",
        RegistrationRequest {
            form: form(&phone),
            photo: None,
            payment_proof: None,
        },
    )
    .await
    .unwrap();

    let err = registration::register(
        &pool,
        &store,
        "members",
        RegistrationRequest {
            form: form(&phone),
            photo: None,
            payment_proof: None,
        },
    )
    .await
    .unwrap_err();

    assert!(matches!(err, RegistrationError::DuplicatePhone));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn sequential_approvals_allocate_consecutive_suffixes() {
    let pool = test_pool().await;
    let store = MemoryStore::default();
    let scheme = scheme();

    let mut ids = Vec::new();
    for _ in 0..2 {
        let applicant = registration::register(
            &pool,
            &store,
            "members",
            RegistrationRequest {
                form: form(&fresh_phone()),
                photo: Some(attachment("photo")),
                payment_proof: Some(attachment("proof")),
            },
        )
        .await
        .unwrap();
        assert_eq!(applicant.status, MembershipStatus::PendingApproval);

        let approved = approval::approve(&pool, &scheme, applicant.id).await.unwrap();
        ids.push(approved.membership_id.unwrap());
    }

    let first = scheme.parse_suffix(&ids[0]).unwrap();
    let second = scheme.parse_suffix(&ids[1]).unwrap();
    assert_eq!(second, first + 1);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn concurrent_approvals_never_share_an_identifier() {
    let pool = test_pool().await;
    let store = MemoryStore::default();
    let scheme = scheme();

    let mut pending = Vec::new();
    for _ in 0..2 {
        let applicant = registration::register(
            &pool,
            &store,
            "members",
            RegistrationRequest {
                form: form(&fresh_phone()),
                photo: Some(attachment("photo")),
                payment_proof: Some(attachment("proof")),
            },
        )
        .await
        .unwrap();
        pending.push(applicant.id);
    }

    let (a, b) = tokio::join!(
        approval::approve(&pool, &scheme, pending[0]),
        approval::approve(&pool, &scheme, pending[1]),
    );

    let a = a.unwrap().membership_id.unwrap();
    let b = b.unwrap().membership_id.unwrap();
    assert_ne!(a, b);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn edit_cannot_touch_lifecycle_fields() {
    let pool = test_pool().await;
    let store = MemoryStore::default();

    let applicant = registration::register(
        &pool,
        &store,
        "members",
        RegistrationRequest {
            form: form(&fresh_phone()),
            photo: Some(attachment("photo")),
            payment_proof: Some(attachment("proof")),
        },
    )
    .await
    .unwrap();
    let approved = approval::approve(&pool, &scheme(), applicant.id).await.unwrap();

    // The payload carries lifecycle keys; deserialization drops them.
    let patch = serde_json::from_value(serde_json::json!({
        "name": "Arjun Kumar",
        "status": "rejected",
        "membershipId": "CLUB-9999",
        "paymentProofUrl": "https://attacker.example/x.jpg",
    }))
    .unwrap();

    let edited = approval::edit(&pool, approved.id, patch).await.unwrap();
    assert_eq!(edited.name, "Arjun Kumar");
    assert_eq!(edited.status, MembershipStatus::Approved);
    assert_eq!(edited.membership_id, approved.membership_id);
    assert_eq!(edited.payment_proof_url, approved.payment_proof_url);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn failed_proof_upload_rolls_back_the_photo() {
    let pool = test_pool().await;
    // Photo upload succeeds, payment-proof upload fails.
    let store = MemoryStore::failing_after(1);
    let phone = fresh_phone();

    let err = registration::register(
        &pool,
        &store,
        "members",
        RegistrationRequest {
            form: form(&phone),
            photo: Some(attachment("photo")),
            payment_proof: Some(attachment("proof")),
        },
    )
    .await
    .unwrap_err();

    assert!(matches!(err, RegistrationError::Storage(_)));
    // The orphaned photo was compensated away and no record exists.
    assert_eq!(store.deleted_ids(), vec!["members/0".to_string()]);
    let pool_record = clubpass::models::Applicant::find_by_phone(&pool, &phone)
        .await
        .unwrap();
    assert!(pool_record.is_none());
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn delete_releases_both_attachments() {
    let pool = test_pool().await;
    let store = MemoryStore::default();

    let applicant = registration::register(
        &pool,
        &store,
        "members",
        RegistrationRequest {
            form: form(&fresh_phone()),
            photo: Some(attachment("photo")),
            payment_proof: Some(attachment("proof")),
        },
    )
    .await
    .unwrap();

    approval::delete(&pool, &store, applicant.id).await.unwrap();

    let deleted = store.deleted_ids();
    assert_eq!(deleted.len(), 2);
    assert!(
        clubpass::models::Applicant::find_by_id(&pool, applicant.id)
            .await
            .unwrap()
            .is_none()
    );
}
