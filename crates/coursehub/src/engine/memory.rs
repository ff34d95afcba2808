//! In-memory store adapters.
//!
//! Used by the service wiring in development mode and by the test suites.
//! Each adapter keeps its map behind a single mutex so the conditional
//! checks (enrollment uniqueness, approval compare-and-swap) happen inside
//! one critical section, matching the guarantees a SQL adapter provides with
//! unique constraints and conditional updates.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::domain::{
    AccessGrant, ApprovalRequest, ApprovalStatus, ApprovalSubject, Course, CourseApproval,
    CourseId, Enrollment, EnrollmentId, EnrollmentState, Enterprise, EnterpriseId, Payment,
    PaymentId, RequestId, Session, SessionId, User, UserId,
};
use super::events::{DomainEvent, EventPublisher};
use super::notification::{DispatchError, NotificationSender};
use super::repository::{
    ApprovalStore, CatalogStore, EnrollmentRepository, GrantStore, PaymentStore, RepositoryError,
    UserDirectory,
};

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>, RepositoryError> {
    mutex
        .lock()
        .map_err(|_| RepositoryError::Unavailable(format!("{what} mutex poisoned")))
}

/// Users and enterprises, keyed by id.
#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: Mutex<HashMap<UserId, User>>,
    enterprises: Mutex<HashMap<EnterpriseId, Enterprise>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_user(&self, user: User) {
        if let Ok(mut users) = self.users.lock() {
            users.insert(user.id.clone(), user);
        }
    }

    pub fn upsert_enterprise(&self, enterprise: Enterprise) {
        if let Ok(mut enterprises) = self.enterprises.lock() {
            enterprises.insert(enterprise.id.clone(), enterprise);
        }
    }
}

impl UserDirectory for InMemoryUserDirectory {
    fn user(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        Ok(lock(&self.users, "user")?.get(id).cloned())
    }

    fn enterprise(&self, id: &EnterpriseId) -> Result<Option<Enterprise>, RepositoryError> {
        Ok(lock(&self.enterprises, "enterprise")?.get(id).cloned())
    }

    fn active_user_ids(&self) -> Result<Vec<UserId>, RepositoryError> {
        let users = lock(&self.users, "user")?;
        let mut ids: Vec<_> = users
            .values()
            .filter(|user| user.active)
            .map(|user| user.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn activate_subscription(&self, user: &UserId, plan: &str) -> Result<(), RepositoryError> {
        let mut users = lock(&self.users, "user")?;
        let record = users.get_mut(user).ok_or(RepositoryError::NotFound)?;
        record.subscription.active = true;
        record.subscription.plan = Some(plan.to_string());
        Ok(())
    }
}

/// Courses and sessions, keyed by id.
#[derive(Default)]
pub struct InMemoryCatalogStore {
    courses: Mutex<HashMap<CourseId, Course>>,
    sessions: Mutex<HashMap<SessionId, Session>>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_course(&self, course: Course) {
        if let Ok(mut courses) = self.courses.lock() {
            courses.insert(course.id.clone(), course);
        }
    }
}

impl CatalogStore for InMemoryCatalogStore {
    fn course(&self, id: &CourseId) -> Result<Option<Course>, RepositoryError> {
        Ok(lock(&self.courses, "course")?.get(id).cloned())
    }

    fn set_course_approval(
        &self,
        id: &CourseId,
        approval: CourseApproval,
    ) -> Result<(), RepositoryError> {
        let mut courses = lock(&self.courses, "course")?;
        let course = courses.get_mut(id).ok_or(RepositoryError::NotFound)?;
        course.approval = approval;
        Ok(())
    }

    fn session(&self, id: &SessionId) -> Result<Option<Session>, RepositoryError> {
        Ok(lock(&self.sessions, "session")?.get(id).cloned())
    }

    fn insert_session(&self, session: Session) -> Result<Session, RepositoryError> {
        let mut sessions = lock(&self.sessions, "session")?;
        if sessions.contains_key(&session.id) {
            return Err(RepositoryError::Conflict);
        }
        sessions.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    fn course_sessions(&self, course_id: &CourseId) -> Result<Vec<SessionId>, RepositoryError> {
        let sessions = lock(&self.sessions, "session")?;
        let mut ids: Vec<_> = sessions
            .values()
            .filter(|session| &session.course_id == course_id)
            .map(|session| session.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }
}

/// Enrollment rows with the (user, session) uniqueness check and the state
/// compare-and-swap done inside the map's critical section.
#[derive(Default)]
pub struct InMemoryEnrollmentRepository {
    records: Mutex<HashMap<EnrollmentId, Enrollment>>,
}

impl InMemoryEnrollmentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EnrollmentRepository for InMemoryEnrollmentRepository {
    fn insert(&self, enrollment: Enrollment) -> Result<Enrollment, RepositoryError> {
        let mut records = lock(&self.records, "enrollment")?;
        if records.contains_key(&enrollment.id) {
            return Err(RepositoryError::Conflict);
        }
        let duplicate = records.values().any(|existing| {
            existing.user_id == enrollment.user_id
                && existing.session_id == enrollment.session_id
                && existing.state != EnrollmentState::Cancelled
        });
        if duplicate {
            return Err(RepositoryError::Conflict);
        }
        records.insert(enrollment.id.clone(), enrollment.clone());
        Ok(enrollment)
    }

    fn get(&self, id: &EnrollmentId) -> Result<Option<Enrollment>, RepositoryError> {
        Ok(lock(&self.records, "enrollment")?.get(id).cloned())
    }

    fn transition(
        &self,
        id: &EnrollmentId,
        expected: EnrollmentState,
        next: Enrollment,
    ) -> Result<Enrollment, RepositoryError> {
        let mut records = lock(&self.records, "enrollment")?;
        let current = records.get(id).ok_or(RepositoryError::NotFound)?;
        if current.state != expected {
            return Err(RepositoryError::Conflict);
        }
        records.insert(id.clone(), next.clone());
        Ok(next)
    }

    fn active_for(
        &self,
        user: &UserId,
        session: &SessionId,
    ) -> Result<Option<Enrollment>, RepositoryError> {
        let records = lock(&self.records, "enrollment")?;
        Ok(records
            .values()
            .find(|record| {
                &record.user_id == user
                    && &record.session_id == session
                    && record.state != EnrollmentState::Cancelled
            })
            .cloned())
    }

    fn confirmed_user_ids(&self, session: &SessionId) -> Result<Vec<UserId>, RepositoryError> {
        let records = lock(&self.records, "enrollment")?;
        let mut ids: Vec<_> = records
            .values()
            .filter(|record| {
                &record.session_id == session && record.state == EnrollmentState::Confirmed
            })
            .map(|record| record.user_id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }
}

/// Access grants keyed by (user, course).
#[derive(Default)]
pub struct InMemoryGrantStore {
    grants: Mutex<HashMap<(UserId, CourseId), AccessGrant>>,
}

impl InMemoryGrantStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GrantStore for InMemoryGrantStore {
    fn exists(&self, user: &UserId, course: &CourseId) -> Result<bool, RepositoryError> {
        let grants = lock(&self.grants, "grant")?;
        Ok(grants.contains_key(&(user.clone(), course.clone())))
    }

    fn insert(&self, grant: AccessGrant) -> Result<(), RepositoryError> {
        let mut grants = lock(&self.grants, "grant")?;
        grants.insert((grant.user_id.clone(), grant.course_id.clone()), grant);
        Ok(())
    }

    fn revoke(&self, user: &UserId, course: &CourseId) -> Result<(), RepositoryError> {
        let mut grants = lock(&self.grants, "grant")?;
        grants
            .remove(&(user.clone(), course.clone()))
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }
}

/// Payment rows keyed by id.
#[derive(Default)]
pub struct InMemoryPaymentStore {
    payments: Mutex<HashMap<PaymentId, Payment>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PaymentStore for InMemoryPaymentStore {
    fn get(&self, id: &PaymentId) -> Result<Option<Payment>, RepositoryError> {
        Ok(lock(&self.payments, "payment")?.get(id).cloned())
    }

    fn insert(&self, payment: Payment) -> Result<Payment, RepositoryError> {
        let mut payments = lock(&self.payments, "payment")?;
        if payments.contains_key(&payment.id) {
            return Err(RepositoryError::Conflict);
        }
        payments.insert(payment.id.clone(), payment.clone());
        Ok(payment)
    }

    fn update(&self, payment: Payment) -> Result<(), RepositoryError> {
        let mut payments = lock(&self.payments, "payment")?;
        if !payments.contains_key(&payment.id) {
            return Err(RepositoryError::NotFound);
        }
        payments.insert(payment.id.clone(), payment);
        Ok(())
    }
}

/// Approval requests with the status compare-and-swap done under the map's
/// mutex, so exactly one of two racing decisions can win.
#[derive(Default)]
pub struct InMemoryApprovalStore {
    requests: Mutex<HashMap<RequestId, ApprovalRequest>>,
}

impl InMemoryApprovalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ApprovalStore for InMemoryApprovalStore {
    fn get(&self, id: &RequestId) -> Result<Option<ApprovalRequest>, RepositoryError> {
        Ok(lock(&self.requests, "approval")?.get(id).cloned())
    }

    fn insert(&self, request: ApprovalRequest) -> Result<ApprovalRequest, RepositoryError> {
        let mut requests = lock(&self.requests, "approval")?;
        if requests.contains_key(&request.id) {
            return Err(RepositoryError::Conflict);
        }
        requests.insert(request.id.clone(), request.clone());
        Ok(request)
    }

    fn transition(
        &self,
        id: &RequestId,
        expected: ApprovalStatus,
        next: ApprovalRequest,
    ) -> Result<ApprovalRequest, RepositoryError> {
        let mut requests = lock(&self.requests, "approval")?;
        let current = requests.get(id).ok_or(RepositoryError::NotFound)?;
        if current.status != expected {
            return Err(RepositoryError::Conflict);
        }
        requests.insert(id.clone(), next.clone());
        Ok(next)
    }

    fn pending(&self, limit: usize) -> Result<Vec<ApprovalRequest>, RepositoryError> {
        let requests = lock(&self.requests, "approval")?;
        let mut pending: Vec<_> = requests
            .values()
            .filter(|request| request.status == ApprovalStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.requested_at.cmp(&b.requested_at));
        pending.truncate(limit);
        Ok(pending)
    }

    fn find_by_subject(
        &self,
        subject: &ApprovalSubject,
    ) -> Result<Option<ApprovalRequest>, RepositoryError> {
        let requests = lock(&self.requests, "approval")?;
        let mut matches: Vec<_> = requests
            .values()
            .filter(|request| &request.subject == subject)
            .collect();
        matches.sort_by(|a, b| a.requested_at.cmp(&b.requested_at));
        Ok(matches.last().map(|request| (*request).clone()))
    }
}

/// Captures deliveries so tests and the demo can assert fan-out.
#[derive(Default, Clone)]
pub struct RecordingSender {
    deliveries: Arc<Mutex<Vec<(UserId, DomainEvent)>>>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliveries(&self) -> Vec<(UserId, DomainEvent)> {
        self.deliveries
            .lock()
            .map(|deliveries| deliveries.clone())
            .unwrap_or_default()
    }
}

impl NotificationSender for RecordingSender {
    fn deliver(&self, recipient: &UserId, event: &DomainEvent) -> Result<(), DispatchError> {
        self.deliveries
            .lock()
            .map_err(|_| DispatchError::Transport("delivery log mutex poisoned".to_string()))?
            .push((recipient.clone(), event.clone()));
        Ok(())
    }
}

/// Captures published events so tests can assert transition emission.
#[derive(Default, Clone)]
pub struct RecordingPublisher {
    events: Arc<Mutex<Vec<DomainEvent>>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl EventPublisher for RecordingPublisher {
    fn publish(&self, event: DomainEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
