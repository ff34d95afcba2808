use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::domain::{
    ApprovalStatus, ApprovalSubject, CourseId, EnrollmentId, PaymentId, RequestId, SessionId,
    UserId,
};

/// Recipient-resolution hint attached to an event: a single user, a course or
/// session cohort, or every active user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum Target {
    User { user_id: UserId },
    CourseEnrollees { course_id: CourseId },
    SessionEnrollees { session_id: SessionId },
    AllUsers,
}

/// Typed domain event emitted on every state transition in the engine.
///
/// Consumers (notifications, cache invalidation, analytics) subscribe to the
/// bus rather than being hard-wired into the mutation call sites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    EnrollmentConfirmed {
        enrollment_id: EnrollmentId,
        user_id: UserId,
        session_id: SessionId,
    },
    EnrollmentCancelled {
        enrollment_id: EnrollmentId,
        user_id: UserId,
        session_id: SessionId,
    },
    ApprovalDecided {
        request_id: RequestId,
        subject: ApprovalSubject,
        outcome: ApprovalStatus,
        requested_by: UserId,
    },
    PaymentRefunded {
        payment_id: PaymentId,
        payer: UserId,
    },
    Broadcast {
        target: Target,
        message: String,
        kind: String,
    },
}

impl DomainEvent {
    /// The recipients this event concerns when no explicit target is given.
    pub fn default_target(&self) -> Target {
        match self {
            DomainEvent::EnrollmentConfirmed { user_id, .. }
            | DomainEvent::EnrollmentCancelled { user_id, .. } => Target::User {
                user_id: user_id.clone(),
            },
            DomainEvent::ApprovalDecided { requested_by, .. } => Target::User {
                user_id: requested_by.clone(),
            },
            DomainEvent::PaymentRefunded { payer, .. } => Target::User {
                user_id: payer.clone(),
            },
            DomainEvent::Broadcast { target, .. } => target.clone(),
        }
    }

    pub const fn label(&self) -> &'static str {
        match self {
            DomainEvent::EnrollmentConfirmed { .. } => "enrollment_confirmed",
            DomainEvent::EnrollmentCancelled { .. } => "enrollment_cancelled",
            DomainEvent::ApprovalDecided { .. } => "approval_decided",
            DomainEvent::PaymentRefunded { .. } => "payment_refunded",
            DomainEvent::Broadcast { .. } => "broadcast",
        }
    }
}

/// Outbound event hook implemented by the wiring layer.
///
/// Publishing is a best-effort side channel: implementations handle their own
/// failures and must never surface them into the triggering transition.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: DomainEvent);
}

/// A consumer registered on the [`EventBus`].
pub trait EventSubscriber: Send + Sync {
    fn on_event(&self, event: &DomainEvent);
}

/// Fans each published event out to every registered subscriber.
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<Arc<dyn EventSubscriber>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_subscriber(mut self, subscriber: Arc<dyn EventSubscriber>) -> Self {
        self.subscribers.push(subscriber);
        self
    }
}

impl EventPublisher for EventBus {
    fn publish(&self, event: DomainEvent) {
        debug!(event = event.label(), "domain event published");
        for subscriber in &self.subscribers {
            subscriber.on_event(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<&'static str>>,
    }

    impl EventSubscriber for Recorder {
        fn on_event(&self, event: &DomainEvent) {
            self.seen
                .lock()
                .expect("recorder mutex poisoned")
                .push(event.label());
        }
    }

    #[test]
    fn bus_fans_out_to_all_subscribers() {
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        let bus = EventBus::new()
            .with_subscriber(first.clone() as Arc<dyn EventSubscriber>)
            .with_subscriber(second.clone() as Arc<dyn EventSubscriber>);

        bus.publish(DomainEvent::PaymentRefunded {
            payment_id: PaymentId("pay-1".to_string()),
            payer: UserId("u-1".to_string()),
        });

        assert_eq!(*first.seen.lock().expect("mutex"), vec!["payment_refunded"]);
        assert_eq!(*second.seen.lock().expect("mutex"), vec!["payment_refunded"]);
    }

    #[test]
    fn default_target_follows_the_affected_user() {
        let event = DomainEvent::EnrollmentConfirmed {
            enrollment_id: EnrollmentId("enr-1".to_string()),
            user_id: UserId("u-7".to_string()),
            session_id: SessionId("ses-1".to_string()),
        };
        assert_eq!(
            event.default_target(),
            Target::User {
                user_id: UserId("u-7".to_string())
            }
        );
    }
}
