use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, warn};

use super::domain::UserId;
use super::events::{DomainEvent, EventSubscriber, Target};
use super::repository::{CatalogStore, EnrollmentRepository, RepositoryError, UserDirectory};

/// Delivery error raised by a notification transport.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Outbound delivery hook (e-mail, push, in-app feed) implemented by the
/// wiring layer.
pub trait NotificationSender: Send + Sync {
    fn deliver(&self, recipient: &UserId, event: &DomainEvent) -> Result<(), DispatchError>;
}

/// Fans one event out to the resolved recipient set.
///
/// Dispatch is a best-effort side channel: resolution and delivery failures
/// are logged and swallowed, and the triggering transition never observes
/// them. The return value is the number of successful deliveries.
pub struct NotificationDispatcher {
    users: Arc<dyn UserDirectory>,
    catalog: Arc<dyn CatalogStore>,
    enrollments: Arc<dyn EnrollmentRepository>,
    sender: Arc<dyn NotificationSender>,
}

impl NotificationDispatcher {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        catalog: Arc<dyn CatalogStore>,
        enrollments: Arc<dyn EnrollmentRepository>,
        sender: Arc<dyn NotificationSender>,
    ) -> Self {
        Self {
            users,
            catalog,
            enrollments,
            sender,
        }
    }

    pub fn dispatch(&self, event: &DomainEvent, target: &Target) -> usize {
        let recipients = match self.resolve(target) {
            Ok(recipients) => recipients,
            Err(err) => {
                warn!(event = event.label(), error = %err, "recipient resolution failed");
                return 0;
            }
        };

        let mut delivered = 0;
        for recipient in &recipients {
            match self.sender.deliver(recipient, event) {
                Ok(()) => delivered += 1,
                Err(err) => {
                    warn!(
                        event = event.label(),
                        recipient = %recipient.0,
                        error = %err,
                        "notification delivery failed"
                    );
                }
            }
        }
        debug!(
            event = event.label(),
            recipients = recipients.len(),
            delivered, "notification dispatched"
        );
        delivered
    }

    /// Resolve a target selector into a deduplicated recipient set.
    ///
    /// Course cohorts are the union of Confirmed enrollees across the
    /// course's sessions; `AllUsers` means active users only.
    fn resolve(&self, target: &Target) -> Result<BTreeSet<UserId>, RepositoryError> {
        let mut recipients = BTreeSet::new();
        match target {
            Target::User { user_id } => {
                recipients.insert(user_id.clone());
            }
            Target::SessionEnrollees { session_id } => {
                recipients.extend(self.enrollments.confirmed_user_ids(session_id)?);
            }
            Target::CourseEnrollees { course_id } => {
                for session_id in self.catalog.course_sessions(course_id)? {
                    recipients.extend(self.enrollments.confirmed_user_ids(&session_id)?);
                }
            }
            Target::AllUsers => {
                recipients.extend(self.users.active_user_ids()?);
            }
        }
        Ok(recipients)
    }
}

impl EventSubscriber for NotificationDispatcher {
    fn on_event(&self, event: &DomainEvent) {
        self.dispatch(event, &event.default_target());
    }
}
