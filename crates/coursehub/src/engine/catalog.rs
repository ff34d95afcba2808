use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use super::domain::{Course, CourseApproval, CourseId, Role, Session, SessionId, UserId};
use super::repository::{CatalogStore, RepositoryError, UserDirectory};

/// Error enumeration for catalog mutations.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("course is not approved for publication")]
    CourseNotApproved,
    #[error("only the owning trainer or an admin may schedule sessions")]
    Forbidden,
    #[error("unknown {0}")]
    NotFound(&'static str),
    #[error(transparent)]
    Storage(#[from] RepositoryError),
}

static SESSION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_session_id() -> SessionId {
    let id = SESSION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    SessionId(format!("ses-{id:06}"))
}

/// Guards session scheduling: a session on an unapproved course is invalid.
pub struct CatalogService {
    users: Arc<dyn UserDirectory>,
    catalog: Arc<dyn CatalogStore>,
}

impl CatalogService {
    pub fn new(users: Arc<dyn UserDirectory>, catalog: Arc<dyn CatalogStore>) -> Self {
        Self { users, catalog }
    }

    /// Schedule a session for an approved course owned by `actor`.
    pub fn create_session(
        &self,
        actor_id: &UserId,
        course_id: &CourseId,
        scheduled_at: DateTime<Utc>,
    ) -> Result<Session, CatalogError> {
        let actor = self
            .users
            .user(actor_id)?
            .ok_or(CatalogError::NotFound("user"))?;
        let course = self
            .catalog
            .course(course_id)?
            .ok_or(CatalogError::NotFound("course"))?;

        if actor.role != Role::Admin && course.trainer_id != actor.id {
            return Err(CatalogError::Forbidden);
        }
        if course.approval != CourseApproval::Approved {
            return Err(CatalogError::CourseNotApproved);
        }

        let session = self.catalog.insert_session(Session {
            id: next_session_id(),
            course_id: course.id.clone(),
            scheduled_at,
        })?;
        info!(course = %course.id.0, session = %session.id.0, "session scheduled");
        Ok(session)
    }

    /// Fetch a course for API responses.
    pub fn course(&self, course_id: &CourseId) -> Result<Course, CatalogError> {
        self.catalog
            .course(course_id)?
            .ok_or(CatalogError::NotFound("course"))
    }
}
