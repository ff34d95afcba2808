use super::domain::{
    AccessGrant, ApprovalRequest, ApprovalStatus, ApprovalSubject, Course, CourseApproval,
    CourseId, Enrollment, EnrollmentId, EnrollmentState, Enterprise, EnterpriseId, Payment,
    PaymentId, RequestId, Session, SessionId, User, UserId,
};

/// Error enumeration shared by the storage seams.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists or was modified concurrently")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Read access to users and enterprise accounts, plus the one mutation the
/// engine performs on a user: activating a subscription when its payment
/// settles.
pub trait UserDirectory: Send + Sync {
    fn user(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;
    fn enterprise(&self, id: &EnterpriseId) -> Result<Option<Enterprise>, RepositoryError>;
    /// Every active (not soft-disabled) user, for broadcast fan-out.
    fn active_user_ids(&self) -> Result<Vec<UserId>, RepositoryError>;
    fn activate_subscription(&self, user: &UserId, plan: &str) -> Result<(), RepositoryError>;
}

/// Courses and sessions. Course publication status is written only through
/// `set_course_approval`, and only the approval workflow calls it.
pub trait CatalogStore: Send + Sync {
    fn course(&self, id: &CourseId) -> Result<Option<Course>, RepositoryError>;
    fn set_course_approval(
        &self,
        id: &CourseId,
        approval: CourseApproval,
    ) -> Result<(), RepositoryError>;
    fn session(&self, id: &SessionId) -> Result<Option<Session>, RepositoryError>;
    fn insert_session(&self, session: Session) -> Result<Session, RepositoryError>;
    fn course_sessions(&self, course_id: &CourseId) -> Result<Vec<SessionId>, RepositoryError>;
}

/// Storage for enrollments. Backing stores enforce the uniqueness invariant:
/// at most one non-Cancelled enrollment per (user, session).
///
/// `transition` is the compare-and-swap seam, the enrollment counterpart of
/// [`ApprovalStore::transition`]: verify the current state equals `expected`
/// and install `next` as one atomic step, returning `Conflict` when another
/// transition won the race.
pub trait EnrollmentRepository: Send + Sync {
    fn insert(&self, enrollment: Enrollment) -> Result<Enrollment, RepositoryError>;
    fn get(&self, id: &EnrollmentId) -> Result<Option<Enrollment>, RepositoryError>;
    fn transition(
        &self,
        id: &EnrollmentId,
        expected: EnrollmentState,
        next: Enrollment,
    ) -> Result<Enrollment, RepositoryError>;
    /// The non-Cancelled enrollment for a (user, session) pair, if any.
    fn active_for(
        &self,
        user: &UserId,
        session: &SessionId,
    ) -> Result<Option<Enrollment>, RepositoryError>;
    /// Users holding a Confirmed enrollment in the session.
    fn confirmed_user_ids(&self, session: &SessionId) -> Result<Vec<UserId>, RepositoryError>;
}

/// Storage for explicit per-user-per-course access grants.
pub trait GrantStore: Send + Sync {
    fn exists(&self, user: &UserId, course: &CourseId) -> Result<bool, RepositoryError>;
    fn insert(&self, grant: AccessGrant) -> Result<(), RepositoryError>;
    fn revoke(&self, user: &UserId, course: &CourseId) -> Result<(), RepositoryError>;
}

/// Storage for payments.
pub trait PaymentStore: Send + Sync {
    fn get(&self, id: &PaymentId) -> Result<Option<Payment>, RepositoryError>;
    fn insert(&self, payment: Payment) -> Result<Payment, RepositoryError>;
    fn update(&self, payment: Payment) -> Result<(), RepositoryError>;
}

/// Storage for approval requests.
///
/// `transition` is the compare-and-swap seam: the store must verify the
/// current status equals `expected` and install `next` as one atomic step,
/// returning `Conflict` when another decision won the race. Two concurrent
/// `decide` calls on the same Pending request therefore yield exactly one
/// success.
pub trait ApprovalStore: Send + Sync {
    fn get(&self, id: &RequestId) -> Result<Option<ApprovalRequest>, RepositoryError>;
    fn insert(&self, request: ApprovalRequest) -> Result<ApprovalRequest, RepositoryError>;
    fn transition(
        &self,
        id: &RequestId,
        expected: ApprovalStatus,
        next: ApprovalRequest,
    ) -> Result<ApprovalRequest, RepositoryError>;
    /// Oldest undecided requests, for review queues.
    fn pending(&self, limit: usize) -> Result<Vec<ApprovalRequest>, RepositoryError>;
    /// The most recent request for a subject, decided or not.
    fn find_by_subject(
        &self,
        subject: &ApprovalSubject,
    ) -> Result<Option<ApprovalRequest>, RepositoryError>;
}
