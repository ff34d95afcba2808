//! Access & approval engine: the decision logic and state machines behind
//! enrollment, payments, and course publishing.
//!
//! The engine owns five concerns: the ordered entitlement decision list, the
//! atomic capacity ledger, the enrollment lifecycle, the generic approval
//! workflow shared by course publication and payment settlement, and
//! best-effort notification fan-out. Storage and transport stay behind the
//! trait seams in [`repository`] so the state machines remain correct
//! regardless of what implements them.

pub mod approval;
pub mod catalog;
pub mod domain;
pub mod enrollment;
pub mod entitlement;
pub mod events;
pub mod ledger;
pub mod memory;
pub mod notification;
pub mod repository;
pub mod router;

#[cfg(test)]
mod tests;

pub use approval::{split_fee, ApprovalError, ApprovalService, ReviewDecision};
pub use catalog::{CatalogError, CatalogService};
pub use domain::{
    AccessGrant, ApprovalRequest, ApprovalStatus, ApprovalSubject, Course, CourseApproval,
    CourseId, Enrollment, EnrollmentId, EnrollmentState, Enterprise, EnterpriseId, GrantSource,
    Payment, PaymentId, PaymentKind, RequestId, Role, Session, SessionId, Subscription, User,
    UserId,
};
pub use enrollment::{EnrollmentError, EnrollmentService};
pub use entitlement::{AccessDecision, AllowedReason, DenialReason, EntitlementSources};
pub use events::{DomainEvent, EventBus, EventPublisher, EventSubscriber, Target};
pub use ledger::{CapacityError, CapacityLedger, InMemoryCapacityLedger};
pub use memory::{
    InMemoryApprovalStore, InMemoryCatalogStore, InMemoryEnrollmentRepository, InMemoryGrantStore,
    InMemoryPaymentStore, InMemoryUserDirectory, RecordingPublisher, RecordingSender,
};
pub use notification::{DispatchError, NotificationDispatcher, NotificationSender};
pub use repository::{
    ApprovalStore, CatalogStore, EnrollmentRepository, GrantStore, PaymentStore, RepositoryError,
    UserDirectory,
};
pub use router::{engine_router, EngineContext};
