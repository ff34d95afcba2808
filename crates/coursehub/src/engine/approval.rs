use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::domain::{
    AccessGrant, ApprovalRequest, ApprovalStatus, ApprovalSubject, CourseApproval, CourseId,
    GrantSource, Payment, PaymentId, PaymentKind, RequestId, Role, UserId,
};
use super::events::{DomainEvent, EventPublisher};
use super::repository::{
    ApprovalStore, CatalogStore, GrantStore, PaymentStore, RepositoryError, UserDirectory,
};

/// Error enumeration for approval transitions. All variants except `Storage`
/// are expected, typed outcomes.
#[derive(Debug, thiserror::Error)]
pub enum ApprovalError {
    #[error("request has already been decided")]
    NotPending,
    #[error("only admins may decide approval requests")]
    Forbidden,
    #[error("{0}")]
    Validation(String),
    #[error("unknown {0}")]
    NotFound(&'static str),
    #[error(transparent)]
    Storage(#[from] RepositoryError),
}

/// The two decisions an admin can take on a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

/// Split an amount into (platform fee, trainer share) using a basis-point
/// rate. Integer math keeps the split exact; the remainder stays with the
/// trainer. The intermediate product is widened so the largest amounts do
/// not overflow; rates above 10_000 bps are rejected at configuration time,
/// so the fee never exceeds the amount.
pub fn split_fee(amount_cents: u64, fee_bps: u32) -> (u64, u64) {
    let fee = (u128::from(amount_cents) * u128::from(fee_bps) / 10_000) as u64;
    (fee, amount_cents - fee)
}

static REQUEST_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static PAYMENT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_request_id() -> RequestId {
    let id = REQUEST_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    RequestId(format!("req-{id:06}"))
}

fn next_payment_id() -> PaymentId {
    let id = PAYMENT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    PaymentId(format!("pay-{id:06}"))
}

/// One generic pending/approved/rejected lifecycle reused for course
/// publication and payment settlement.
///
/// This service is the sole writer of `ApprovalRequest.status` and of the
/// course publication flag; every transition goes through the store's
/// compare-and-swap so concurrent decisions cannot both win.
pub struct ApprovalService {
    users: Arc<dyn UserDirectory>,
    catalog: Arc<dyn CatalogStore>,
    approvals: Arc<dyn ApprovalStore>,
    payments: Arc<dyn PaymentStore>,
    grants: Arc<dyn GrantStore>,
    publisher: Arc<dyn EventPublisher>,
    platform_fee_bps: u32,
}

impl ApprovalService {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        catalog: Arc<dyn CatalogStore>,
        approvals: Arc<dyn ApprovalStore>,
        payments: Arc<dyn PaymentStore>,
        grants: Arc<dyn GrantStore>,
        publisher: Arc<dyn EventPublisher>,
        platform_fee_bps: u32,
    ) -> Self {
        Self {
            users,
            catalog,
            approvals,
            payments,
            grants,
            publisher,
            platform_fee_bps,
        }
    }

    /// Submit a course for publication review. A rejected course is
    /// resubmitted as a brand-new request; decided requests are never
    /// reopened for publication subjects.
    pub fn submit_course(
        &self,
        course_id: &CourseId,
        trainer_id: &UserId,
    ) -> Result<ApprovalRequest, ApprovalError> {
        let trainer = self
            .users
            .user(trainer_id)?
            .ok_or(ApprovalError::NotFound("user"))?;
        let course = self
            .catalog
            .course(course_id)?
            .ok_or(ApprovalError::NotFound("course"))?;

        if course.trainer_id != trainer.id {
            return Err(ApprovalError::Forbidden);
        }
        if course.approval == CourseApproval::Approved {
            return Err(ApprovalError::Validation(
                "course is already approved".to_string(),
            ));
        }

        let subject = ApprovalSubject::CoursePublication {
            course_id: course.id.clone(),
        };
        if let Some(open) = self.approvals.find_by_subject(&subject)? {
            if open.status == ApprovalStatus::Pending {
                return Err(ApprovalError::Validation(
                    "a publication review is already pending".to_string(),
                ));
            }
        }

        // A resubmission after rejection puts the course back under review.
        if course.approval == CourseApproval::Rejected {
            self.catalog
                .set_course_approval(&course.id, CourseApproval::Pending)?;
        }

        let request = self.approvals.insert(ApprovalRequest {
            id: next_request_id(),
            subject,
            status: ApprovalStatus::Pending,
            requested_by: trainer.id,
            decided_by: None,
            notes: None,
            requested_at: Utc::now(),
            decided_at: None,
        })?;
        info!(course = %course.id.0, request = %request.id.0, "course submitted for review");
        Ok(request)
    }

    /// Record an initiated payment and open its settlement request.
    pub fn initiate_payment(
        &self,
        payer_id: &UserId,
        amount_cents: u64,
        kind: PaymentKind,
    ) -> Result<(Payment, ApprovalRequest), ApprovalError> {
        let payer = self
            .users
            .user(payer_id)?
            .ok_or(ApprovalError::NotFound("user"))?;
        if amount_cents == 0 {
            return Err(ApprovalError::Validation(
                "payment amount must be positive".to_string(),
            ));
        }
        if let PaymentKind::CoursePurchase { course_id } = &kind {
            self.catalog
                .course(course_id)?
                .ok_or(ApprovalError::NotFound("course"))?;
        }

        let payment = self.payments.insert(Payment {
            id: next_payment_id(),
            payer: payer.id.clone(),
            amount_cents,
            kind,
            status: ApprovalStatus::Pending,
            platform_fee_cents: None,
            trainer_share_cents: None,
        })?;
        let request = self.approvals.insert(ApprovalRequest {
            id: next_request_id(),
            subject: ApprovalSubject::Payment {
                payment_id: payment.id.clone(),
            },
            status: ApprovalStatus::Pending,
            requested_by: payer.id,
            decided_by: None,
            notes: None,
            requested_at: Utc::now(),
            decided_at: None,
        })?;
        info!(payment = %payment.id.0, request = %request.id.0, "payment initiated");
        Ok((payment, request))
    }

    /// Decide a pending request. Rejections carry a reason; a rejection
    /// without one is a validation error, not a silent default.
    pub fn decide(
        &self,
        request_id: &RequestId,
        actor_id: &UserId,
        decision: ReviewDecision,
        notes: Option<String>,
    ) -> Result<ApprovalRequest, ApprovalError> {
        let actor = self.require_admin(actor_id)?;
        let request = self
            .approvals
            .get(request_id)?
            .ok_or(ApprovalError::NotFound("approval request"))?;
        if request.status != ApprovalStatus::Pending {
            return Err(ApprovalError::NotPending);
        }

        let notes = notes.filter(|text| !text.trim().is_empty());
        if decision == ReviewDecision::Reject && notes.is_none() {
            return Err(ApprovalError::Validation(
                "rejection requires a reason".to_string(),
            ));
        }

        let outcome = match decision {
            ReviewDecision::Approve => ApprovalStatus::Approved,
            ReviewDecision::Reject => ApprovalStatus::Rejected,
        };
        let next = ApprovalRequest {
            status: outcome,
            decided_by: Some(actor.id.clone()),
            notes,
            decided_at: Some(Utc::now()),
            ..request.clone()
        };

        // The store's compare-and-swap is what makes two concurrent
        // decisions yield exactly one winner.
        let decided = self
            .approvals
            .transition(request_id, ApprovalStatus::Pending, next)
            .map_err(conflict_as_not_pending)?;

        match &decided.subject {
            ApprovalSubject::CoursePublication { course_id } => {
                let approval = match outcome {
                    ApprovalStatus::Approved => CourseApproval::Approved,
                    _ => CourseApproval::Rejected,
                };
                self.catalog.set_course_approval(course_id, approval)?;
            }
            ApprovalSubject::Payment { payment_id } => {
                self.settle_payment(payment_id, outcome)?;
            }
        }

        info!(
            request = %decided.id.0,
            outcome = outcome.label(),
            actor = %actor.id.0,
            "approval request decided"
        );
        self.publisher.publish(DomainEvent::ApprovalDecided {
            request_id: decided.id.clone(),
            subject: decided.subject.clone(),
            outcome,
            requested_by: decided.requested_by.clone(),
        });
        Ok(decided)
    }

    /// Administrative reset of a rejected payment request back to Pending.
    /// Distinct from `decide` by design; publication requests have no way
    /// back and must be resubmitted.
    pub fn reopen(
        &self,
        request_id: &RequestId,
        actor_id: &UserId,
    ) -> Result<ApprovalRequest, ApprovalError> {
        let actor = self.require_admin(actor_id)?;
        let request = self
            .approvals
            .get(request_id)?
            .ok_or(ApprovalError::NotFound("approval request"))?;

        let payment_id = match &request.subject {
            ApprovalSubject::Payment { payment_id } => payment_id.clone(),
            ApprovalSubject::CoursePublication { .. } => {
                return Err(ApprovalError::Validation(
                    "publication requests cannot be reopened".to_string(),
                ))
            }
        };
        if request.status != ApprovalStatus::Rejected {
            return Err(ApprovalError::NotPending);
        }

        let next = ApprovalRequest {
            status: ApprovalStatus::Pending,
            decided_by: None,
            decided_at: None,
            ..request.clone()
        };
        let reopened = self
            .approvals
            .transition(request_id, ApprovalStatus::Rejected, next)
            .map_err(conflict_as_not_pending)?;

        let mut payment = self
            .payments
            .get(&payment_id)?
            .ok_or(ApprovalError::NotFound("payment"))?;
        payment.status = ApprovalStatus::Pending;
        self.payments.update(payment)?;

        info!(request = %reopened.id.0, actor = %actor.id.0, "payment request reopened");
        self.publisher.publish(DomainEvent::ApprovalDecided {
            request_id: reopened.id.clone(),
            subject: reopened.subject.clone(),
            outcome: ApprovalStatus::Pending,
            requested_by: reopened.requested_by.clone(),
        });
        Ok(reopened)
    }

    /// Refund an approved payment. Financial only: capacity and enrollments
    /// are untouched, and any access grant stays until the caller revokes it
    /// explicitly.
    pub fn refund(
        &self,
        payment_id: &PaymentId,
        actor_id: &UserId,
    ) -> Result<Payment, ApprovalError> {
        let actor = self.require_admin(actor_id)?;
        let payment = self
            .payments
            .get(payment_id)?
            .ok_or(ApprovalError::NotFound("payment"))?;
        if payment.status != ApprovalStatus::Approved {
            return Err(ApprovalError::NotPending);
        }

        let subject = ApprovalSubject::Payment {
            payment_id: payment.id.clone(),
        };
        let request = self
            .approvals
            .find_by_subject(&subject)?
            .ok_or(ApprovalError::NotFound("approval request"))?;
        let next = ApprovalRequest {
            status: ApprovalStatus::Refunded,
            decided_by: Some(actor.id.clone()),
            decided_at: Some(Utc::now()),
            ..request.clone()
        };
        self.approvals
            .transition(&request.id, ApprovalStatus::Approved, next)
            .map_err(conflict_as_not_pending)?;

        let mut refunded = payment;
        refunded.status = ApprovalStatus::Refunded;
        self.payments.update(refunded.clone())?;

        info!(payment = %refunded.id.0, actor = %actor.id.0, "payment refunded");
        self.publisher.publish(DomainEvent::PaymentRefunded {
            payment_id: refunded.id.clone(),
            payer: refunded.payer.clone(),
        });
        Ok(refunded)
    }

    /// Revoke an explicit access grant, e.g. alongside a refund.
    pub fn revoke_grant(
        &self,
        actor_id: &UserId,
        user_id: &UserId,
        course_id: &CourseId,
    ) -> Result<(), ApprovalError> {
        self.require_admin(actor_id)?;
        self.grants.revoke(user_id, course_id)?;
        Ok(())
    }

    /// Oldest undecided requests, for review queues.
    pub fn pending(&self, limit: usize) -> Result<Vec<ApprovalRequest>, ApprovalError> {
        Ok(self.approvals.pending(limit)?)
    }

    /// Fetch a payment for API responses.
    pub fn payment(&self, payment_id: &PaymentId) -> Result<Payment, ApprovalError> {
        self.payments
            .get(payment_id)?
            .ok_or(ApprovalError::NotFound("payment"))
    }

    fn require_admin(&self, actor_id: &UserId) -> Result<super::domain::User, ApprovalError> {
        let actor = self
            .users
            .user(actor_id)?
            .ok_or(ApprovalError::NotFound("user"))?;
        if actor.role != Role::Admin {
            return Err(ApprovalError::Forbidden);
        }
        Ok(actor)
    }

    /// Apply the settlement outcome to the payment record, deriving the
    /// revenue split at approval time. Access follows money: a course
    /// purchase grants access when the payment is Approved, never while it
    /// is merely Pending.
    fn settle_payment(
        &self,
        payment_id: &PaymentId,
        outcome: ApprovalStatus,
    ) -> Result<(), ApprovalError> {
        let mut payment = self
            .payments
            .get(payment_id)?
            .ok_or(ApprovalError::NotFound("payment"))?;
        payment.status = outcome;

        if outcome == ApprovalStatus::Approved {
            let (fee, share) = split_fee(payment.amount_cents, self.platform_fee_bps);
            payment.platform_fee_cents = Some(fee);
            payment.trainer_share_cents = Some(share);

            match &payment.kind {
                PaymentKind::CoursePurchase { course_id } => {
                    self.grants.insert(AccessGrant {
                        user_id: payment.payer.clone(),
                        course_id: course_id.clone(),
                        source: GrantSource::Purchase,
                        granted_at: Utc::now(),
                    })?;
                }
                PaymentKind::Subscription { plan } => {
                    self.users.activate_subscription(&payment.payer, plan)?;
                }
            }
        }

        self.payments.update(payment)?;
        Ok(())
    }
}

fn conflict_as_not_pending(err: RepositoryError) -> ApprovalError {
    match err {
        RepositoryError::Conflict => ApprovalError::NotPending,
        other => ApprovalError::Storage(other),
    }
}
