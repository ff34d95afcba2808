use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::domain::{Enrollment, EnrollmentId, EnrollmentState, SessionId, UserId};
use super::entitlement::{self, AccessDecision, DenialReason, EntitlementSources};
use super::events::{DomainEvent, EventPublisher};
use super::ledger::{CapacityError, CapacityLedger};
use super::repository::{
    CatalogStore, EnrollmentRepository, GrantStore, RepositoryError, UserDirectory,
};

/// Error enumeration for enrollment transitions. All variants except
/// `Storage` are expected, typed outcomes.
#[derive(Debug, thiserror::Error)]
pub enum EnrollmentError {
    #[error("access denied: {}", .0.code())]
    EntitlementDenied(DenialReason),
    #[error("an active enrollment already exists for this session")]
    AlreadyEnrolled,
    #[error("session is at capacity")]
    CapacityExceeded,
    #[error("enrollment is not confirmed")]
    NotConfirmed,
    #[error("unknown {0}")]
    NotFound(&'static str),
    #[error(transparent)]
    Storage(#[from] RepositoryError),
}

static ENROLLMENT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_enrollment_id() -> EnrollmentId {
    let id = ENROLLMENT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    EnrollmentId(format!("enr-{id:06}"))
}

/// Service driving the `Requested -> Confirmed -> Cancelled` enrollment
/// lifecycle. Entitlement is always resolved before the ledger is touched,
/// and the ledger is the only place a capacity comparison happens.
pub struct EnrollmentService {
    users: Arc<dyn UserDirectory>,
    catalog: Arc<dyn CatalogStore>,
    enrollments: Arc<dyn EnrollmentRepository>,
    grants: Arc<dyn GrantStore>,
    ledger: Arc<dyn CapacityLedger>,
    publisher: Arc<dyn EventPublisher>,
}

impl EnrollmentService {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        catalog: Arc<dyn CatalogStore>,
        enrollments: Arc<dyn EnrollmentRepository>,
        grants: Arc<dyn GrantStore>,
        ledger: Arc<dyn CapacityLedger>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            users,
            catalog,
            enrollments,
            grants,
            ledger,
            publisher,
        }
    }

    /// Enroll a user into a session.
    ///
    /// Order matters: entitlement first (a denial must never consume a slot),
    /// then the duplicate check (re-enrolling while Confirmed must not
    /// double-count), then the atomic reservation.
    pub fn enroll(
        &self,
        user_id: &UserId,
        session_id: &SessionId,
    ) -> Result<Enrollment, EnrollmentError> {
        let user = self
            .users
            .user(user_id)?
            .ok_or(EnrollmentError::NotFound("user"))?;
        let session = self
            .catalog
            .session(session_id)?
            .ok_or(EnrollmentError::NotFound("session"))?;
        let course = self
            .catalog
            .course(&session.course_id)?
            .ok_or(EnrollmentError::NotFound("course"))?;

        let sources = EntitlementSources {
            has_grant: self.grants.exists(&user.id, &course.id)?,
            enterprise: match &user.enterprise_id {
                Some(enterprise_id) => self.users.enterprise(enterprise_id)?,
                None => None,
            },
        };
        if let AccessDecision::Denied { reason } = entitlement::resolve(&user, &course, &sources) {
            return Err(EnrollmentError::EntitlementDenied(reason));
        }

        if self.enrollments.active_for(&user.id, session_id)?.is_some() {
            return Err(EnrollmentError::AlreadyEnrolled);
        }

        self.ledger
            .try_reserve(session_id, course.max_students)
            .map_err(reservation_error)?;

        // Requested exists to bracket the checks above; the synchronous path
        // confirms immediately. An async payment gate would persist Requested
        // and confirm later.
        let mut enrollment = Enrollment {
            id: next_enrollment_id(),
            user_id: user.id.clone(),
            session_id: session_id.clone(),
            state: EnrollmentState::Requested,
            created_at: Utc::now(),
        };
        enrollment.state = EnrollmentState::Confirmed;

        let stored = match self.enrollments.insert(enrollment) {
            Ok(stored) => stored,
            Err(err) => {
                // Do not leak the seat when the write fails.
                let _ = self.ledger.release(session_id);
                return Err(match err {
                    // The store's uniqueness check caught a racing duplicate
                    // that slipped past the pre-check above.
                    RepositoryError::Conflict => EnrollmentError::AlreadyEnrolled,
                    other => EnrollmentError::Storage(other),
                });
            }
        };

        info!(
            user = %stored.user_id.0,
            session = %stored.session_id.0,
            enrollment = %stored.id.0,
            "enrollment confirmed"
        );
        self.publisher.publish(DomainEvent::EnrollmentConfirmed {
            enrollment_id: stored.id.clone(),
            user_id: stored.user_id.clone(),
            session_id: stored.session_id.clone(),
        });
        Ok(stored)
    }

    /// Cancel a Confirmed enrollment, freeing its seat.
    ///
    /// There is no path back from Cancelled; re-enrolling runs the full
    /// entitlement and capacity checks again, and the freed slot may already
    /// be gone.
    pub fn cancel(&self, enrollment_id: &EnrollmentId) -> Result<Enrollment, EnrollmentError> {
        let mut next = self
            .enrollments
            .get(enrollment_id)?
            .ok_or(EnrollmentError::NotFound("enrollment"))?;

        if next.state != EnrollmentState::Confirmed {
            return Err(EnrollmentError::NotConfirmed);
        }

        // Claim Confirmed -> Cancelled before touching the ledger. The loser
        // of two racing cancels fails the compare-and-swap and must never
        // release a seat.
        next.state = EnrollmentState::Cancelled;
        let enrollment = self
            .enrollments
            .transition(enrollment_id, EnrollmentState::Confirmed, next)
            .map_err(|err| match err {
                RepositoryError::Conflict => EnrollmentError::NotConfirmed,
                other => EnrollmentError::Storage(other),
            })?;

        if let Err(err) = self.ledger.release(&enrollment.session_id) {
            // The row is already Cancelled; a release failure is logged,
            // never propagated.
            warn!(
                session = %enrollment.session_id.0,
                error = %err,
                "seat release failed after cancellation"
            );
        }

        info!(
            user = %enrollment.user_id.0,
            session = %enrollment.session_id.0,
            enrollment = %enrollment.id.0,
            "enrollment cancelled"
        );
        self.publisher.publish(DomainEvent::EnrollmentCancelled {
            enrollment_id: enrollment.id.clone(),
            user_id: enrollment.user_id.clone(),
            session_id: enrollment.session_id.clone(),
        });
        Ok(enrollment)
    }

    /// Fetch an enrollment for API responses.
    pub fn get(&self, enrollment_id: &EnrollmentId) -> Result<Enrollment, EnrollmentError> {
        self.enrollments
            .get(enrollment_id)?
            .ok_or(EnrollmentError::NotFound("enrollment"))
    }

    /// Users holding a Confirmed enrollment in the session.
    pub fn roster(&self, session_id: &SessionId) -> Result<Vec<UserId>, EnrollmentError> {
        Ok(self.enrollments.confirmed_user_ids(session_id)?)
    }

    /// Current confirmed occupancy, read from the ledger.
    pub fn occupancy(&self, session_id: &SessionId) -> Result<u32, EnrollmentError> {
        self.ledger.occupancy(session_id).map_err(reservation_error)
    }
}

fn reservation_error(err: CapacityError) -> EnrollmentError {
    match err {
        CapacityError::Exceeded => EnrollmentError::CapacityExceeded,
        other => EnrollmentError::Storage(RepositoryError::Unavailable(other.to_string())),
    }
}
