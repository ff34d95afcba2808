use std::sync::Arc;

use chrono::{TimeZone, Utc};

use crate::engine::approval::ApprovalService;
use crate::engine::catalog::CatalogService;
use crate::engine::domain::{
    Course, CourseApproval, CourseId, Role, Session, SessionId, Subscription, User, UserId,
};
use crate::engine::enrollment::EnrollmentService;
use crate::engine::ledger::InMemoryCapacityLedger;
use crate::engine::memory::{
    InMemoryApprovalStore, InMemoryCatalogStore, InMemoryEnrollmentRepository, InMemoryGrantStore,
    InMemoryPaymentStore, InMemoryUserDirectory, RecordingPublisher,
};
use crate::engine::repository::CatalogStore;

pub(super) const FEE_BPS: u32 = 1_500;

/// Fully wired engine over in-memory stores, with the recording publisher
/// exposed so tests can assert event emission.
pub(super) struct Harness {
    pub users: Arc<InMemoryUserDirectory>,
    pub catalog: Arc<InMemoryCatalogStore>,
    pub enrollment_repo: Arc<InMemoryEnrollmentRepository>,
    pub grants: Arc<InMemoryGrantStore>,
    pub payments: Arc<InMemoryPaymentStore>,
    pub approval_store: Arc<InMemoryApprovalStore>,
    pub ledger: Arc<InMemoryCapacityLedger>,
    pub published: RecordingPublisher,
    pub enrollments: Arc<EnrollmentService>,
    pub approvals: Arc<ApprovalService>,
    pub sessions: Arc<CatalogService>,
}

pub(super) fn harness() -> Harness {
    let users = Arc::new(InMemoryUserDirectory::new());
    let catalog = Arc::new(InMemoryCatalogStore::new());
    let enrollment_repo = Arc::new(InMemoryEnrollmentRepository::new());
    let grants = Arc::new(InMemoryGrantStore::new());
    let payments = Arc::new(InMemoryPaymentStore::new());
    let approval_store = Arc::new(InMemoryApprovalStore::new());
    let ledger = Arc::new(InMemoryCapacityLedger::new());
    let published = RecordingPublisher::new();

    let enrollments = Arc::new(EnrollmentService::new(
        users.clone(),
        catalog.clone(),
        enrollment_repo.clone(),
        grants.clone(),
        ledger.clone(),
        Arc::new(published.clone()),
    ));
    let approvals = Arc::new(ApprovalService::new(
        users.clone(),
        catalog.clone(),
        approval_store.clone(),
        payments.clone(),
        grants.clone(),
        Arc::new(published.clone()),
        FEE_BPS,
    ));
    let sessions = Arc::new(CatalogService::new(users.clone(), catalog.clone()));

    Harness {
        users,
        catalog,
        enrollment_repo,
        grants,
        payments,
        approval_store,
        ledger,
        published,
        enrollments,
        approvals,
        sessions,
    }
}

impl Harness {
    pub fn add_user(&self, id: &str, role: Role) -> UserId {
        let user_id = UserId(id.to_string());
        self.users.upsert_user(User {
            id: user_id.clone(),
            role,
            subscription: Subscription::default(),
            enterprise_id: None,
            active: true,
        });
        user_id
    }

    pub fn add_subscriber(&self, id: &str) -> UserId {
        let user_id = UserId(id.to_string());
        self.users.upsert_user(User {
            id: user_id.clone(),
            role: Role::Student,
            subscription: Subscription {
                active: true,
                plan: Some("monthly".to_string()),
                ends_on: None,
            },
            enterprise_id: None,
            active: true,
        });
        user_id
    }

    pub fn add_course(
        &self,
        id: &str,
        trainer: &UserId,
        price_cents: u64,
        max_students: u32,
        approval: CourseApproval,
    ) -> CourseId {
        let course_id = CourseId(id.to_string());
        self.catalog.upsert_course(Course {
            id: course_id.clone(),
            title: format!("Course {id}"),
            trainer_id: trainer.clone(),
            price_cents,
            max_students,
            approval,
        });
        course_id
    }

    pub fn add_session(&self, id: &str, course_id: &CourseId) -> SessionId {
        let session_id = SessionId(id.to_string());
        self.catalog
            .insert_session(Session {
                id: session_id.clone(),
                course_id: course_id.clone(),
                scheduled_at: Utc.with_ymd_and_hms(2026, 9, 14, 18, 0, 0).unwrap(),
            })
            .expect("session inserted");
        session_id
    }

    /// A free approved course with one session, the common enrollment
    /// fixture.
    pub fn open_session(&self, seats: u32) -> SessionId {
        let trainer = self.add_user("trainer-1", Role::Trainer);
        let course = self.add_course("course-1", &trainer, 0, seats, CourseApproval::Approved);
        self.add_session("session-1", &course)
    }
}
