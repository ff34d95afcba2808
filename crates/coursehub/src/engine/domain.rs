use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Identifier wrapper for platform users.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

/// Identifier wrapper for marketplace courses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CourseId(pub String);

/// Identifier wrapper for scheduled course sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

/// Identifier wrapper for enrollments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnrollmentId(pub String);

/// Identifier wrapper for payments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentId(pub String);

/// Identifier wrapper for approval requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

/// Identifier wrapper for enterprise accounts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnterpriseId(pub String);

/// Platform roles that drive entitlement and approval permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Trainer,
    Admin,
    EnterpriseEmployee,
}

/// Personal subscription snapshot carried on the user record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub active: bool,
    pub plan: Option<String>,
    pub ends_on: Option<DateTime<Utc>>,
}

/// A platform user. Users are soft-disabled, never deleted, while referenced
/// by enrollments or payments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub role: Role,
    pub subscription: Subscription,
    pub enterprise_id: Option<EnterpriseId>,
    pub active: bool,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Enterprise account with pre-paid course access for its employees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enterprise {
    pub id: EnterpriseId,
    pub course_entitlements: BTreeSet<CourseId>,
    pub covers_all_courses: bool,
    pub subscription_active: bool,
}

/// Publication status of a course, owned exclusively by the approval workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CourseApproval {
    Pending,
    Approved,
    Rejected,
}

impl CourseApproval {
    pub const fn label(self) -> &'static str {
        match self {
            CourseApproval::Pending => "pending",
            CourseApproval::Approved => "approved",
            CourseApproval::Rejected => "rejected",
        }
    }
}

/// A marketplace course. Price and seat limit are immutable inputs to the
/// entitlement and capacity decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    pub title: String,
    pub trainer_id: UserId,
    pub price_cents: u64,
    pub max_students: u32,
    pub approval: CourseApproval,
}

impl Course {
    pub const fn is_free(&self) -> bool {
        self.price_cents == 0
    }
}

/// A scheduled occurrence of a course. Capacity is always the owning course's
/// seat limit; occupancy lives in the capacity ledger, never here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub course_id: CourseId,
    pub scheduled_at: DateTime<Utc>,
}

/// Lifecycle of a user's enrollment in a session.
///
/// `Requested` brackets the entitlement and capacity checks; the synchronous
/// path collapses it into `Confirmed` before returning, but the state exists
/// so an asynchronous payment step can gate confirmation later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentState {
    Requested,
    Confirmed,
    Cancelled,
}

impl EnrollmentState {
    pub const fn label(self) -> &'static str {
        match self {
            EnrollmentState::Requested => "requested",
            EnrollmentState::Confirmed => "confirmed",
            EnrollmentState::Cancelled => "cancelled",
        }
    }
}

/// A user's enrollment in a session. At most one non-Cancelled enrollment may
/// exist per (user, session) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: EnrollmentId,
    pub user_id: UserId,
    pub session_id: SessionId,
    pub state: EnrollmentState,
    pub created_at: DateTime<Utc>,
}

/// How an access grant came to exist, kept for audit trails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantSource {
    Purchase,
    Enterprise,
    AdminOverride,
}

/// Standing per-user-per-course entitlement, independent of subscription
/// state. Grants never expire implicitly; revocation is always explicit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrant {
    pub user_id: UserId,
    pub course_id: CourseId,
    pub source: GrantSource,
    pub granted_at: DateTime<Utc>,
}

/// What an approval request is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApprovalSubject {
    CoursePublication { course_id: CourseId },
    Payment { payment_id: PaymentId },
}

/// Status of a pending human decision. `Refunded` is reachable for payment
/// subjects only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Refunded,
}

impl ApprovalStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
            ApprovalStatus::Refunded => "refunded",
        }
    }
}

/// A human-in-the-loop decision gating course publication or payment
/// settlement. Status transitions are owned exclusively by the approval
/// workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: RequestId,
    pub subject: ApprovalSubject,
    pub status: ApprovalStatus,
    pub requested_by: UserId,
    pub decided_by: Option<UserId>,
    pub notes: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

/// What a payment buys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentKind {
    CoursePurchase { course_id: CourseId },
    Subscription { plan: String },
}

/// A payment awaiting settlement. Its status mirrors the approval request
/// that gates it; the revenue split is derived once, at approval time, and a
/// refunded payment is immutable thereafter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub payer: UserId,
    pub amount_cents: u64,
    pub kind: PaymentKind,
    pub status: ApprovalStatus,
    pub platform_fee_cents: Option<u64>,
    pub trainer_share_cents: Option<u64>,
}
