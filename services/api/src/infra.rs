use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chrono::{Duration, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::info;

use coursehub::engine::{
    ApprovalService, CatalogService, Course, CourseApproval, CourseId, DispatchError, DomainEvent,
    EngineContext, EnrollmentService, EventBus, EventSubscriber, InMemoryApprovalStore,
    InMemoryCapacityLedger, InMemoryCatalogStore, InMemoryEnrollmentRepository, InMemoryGrantStore,
    InMemoryPaymentStore, InMemoryUserDirectory, NotificationDispatcher, NotificationSender, Role,
    Session, SessionId, Subscription, User, UserId,
};
use coursehub::engine::repository::CatalogStore;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Notification transport for deployments without a real delivery channel:
/// every delivery lands in the structured log.
#[derive(Default, Clone)]
pub(crate) struct LoggingSender;

impl NotificationSender for LoggingSender {
    fn deliver(&self, recipient: &UserId, event: &DomainEvent) -> Result<(), DispatchError> {
        info!(recipient = %recipient.0, event = event.label(), "notification delivered");
        Ok(())
    }
}

/// The wired engine plus the store handles the server needs for seeding.
pub(crate) struct EngineHandles {
    pub(crate) context: EngineContext,
    pub(crate) users: Arc<InMemoryUserDirectory>,
    pub(crate) catalog: Arc<InMemoryCatalogStore>,
}

/// Wire every engine service over the in-memory adapters, with the
/// notification dispatcher subscribed to the event bus.
pub(crate) fn build_engine(
    platform_fee_bps: u32,
    sender: Arc<dyn NotificationSender>,
) -> EngineHandles {
    let users = Arc::new(InMemoryUserDirectory::new());
    let catalog = Arc::new(InMemoryCatalogStore::new());
    let enrollment_repo = Arc::new(InMemoryEnrollmentRepository::new());
    let grants = Arc::new(InMemoryGrantStore::new());
    let payments = Arc::new(InMemoryPaymentStore::new());
    let approval_store = Arc::new(InMemoryApprovalStore::new());
    let ledger = Arc::new(InMemoryCapacityLedger::new());

    let dispatcher = Arc::new(NotificationDispatcher::new(
        users.clone(),
        catalog.clone(),
        enrollment_repo.clone(),
        sender,
    ));
    let bus = Arc::new(EventBus::new().with_subscriber(dispatcher.clone() as Arc<dyn EventSubscriber>));

    let enrollments = Arc::new(EnrollmentService::new(
        users.clone(),
        catalog.clone(),
        enrollment_repo,
        grants.clone(),
        ledger,
        bus.clone(),
    ));
    let approvals = Arc::new(ApprovalService::new(
        users.clone(),
        catalog.clone(),
        approval_store,
        payments,
        grants,
        bus,
        platform_fee_bps,
    ));
    let sessions = Arc::new(CatalogService::new(users.clone(), catalog.clone()));

    EngineHandles {
        context: EngineContext {
            enrollments,
            approvals,
            catalog: sessions,
            notifications: dispatcher,
        },
        users,
        catalog,
    }
}

/// Development fixture: an admin, a trainer with one approved free course and
/// one paid course, and a pair of students.
pub(crate) fn seed_demo_catalog(handles: &EngineHandles) {
    let trainer = UserId("trainer-avery".to_string());
    for (id, role) in [
        ("admin-root", Role::Admin),
        ("trainer-avery", Role::Trainer),
        ("student-kim", Role::Student),
        ("student-lee", Role::Student),
    ] {
        handles.users.upsert_user(User {
            id: UserId(id.to_string()),
            role,
            subscription: Subscription::default(),
            enterprise_id: None,
            active: true,
        });
    }

    let free_course = CourseId("intro-to-rust".to_string());
    handles.catalog.upsert_course(Course {
        id: free_course.clone(),
        title: "Intro to Rust".to_string(),
        trainer_id: trainer.clone(),
        price_cents: 0,
        max_students: 25,
        approval: CourseApproval::Approved,
    });
    handles.catalog.upsert_course(Course {
        id: CourseId("systems-programming".to_string()),
        title: "Systems Programming".to_string(),
        trainer_id: trainer,
        price_cents: 149_00,
        max_students: 12,
        approval: CourseApproval::Approved,
    });

    if let Err(err) = handles.catalog.insert_session(Session {
        id: SessionId("ses-seed-1".to_string()),
        course_id: free_course,
        scheduled_at: Utc::now() + Duration::days(7),
    }) {
        info!(error = %err, "seed session already present");
    }
}
