use serde::{Deserialize, Serialize};

use super::domain::{Course, Enterprise, Role, User};

/// Outcome of an access decision for a (user, course) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "access", rename_all = "snake_case")]
pub enum AccessDecision {
    Allowed { reason: AllowedReason },
    Denied { reason: DenialReason },
}

impl AccessDecision {
    pub const fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allowed { .. })
    }
}

/// Which rule granted access, kept for audit logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowedReason {
    AdminOverride,
    FreeCourse,
    EnterpriseCourseEntitlement,
    EnterpriseCoverage,
    ActiveSubscription,
    AccessGrant,
}

/// Why access was denied; drives the user-facing paywall message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    SubscriptionRequired,
    EnterpriseAccessRequired,
}

impl DenialReason {
    pub const fn code(self) -> &'static str {
        match self {
            DenialReason::SubscriptionRequired => "subscription_required",
            DenialReason::EnterpriseAccessRequired => "enterprise_access_required",
        }
    }
}

/// Inputs gathered by the caller so the resolver itself stays pure.
#[derive(Debug, Clone, Default)]
pub struct EntitlementSources {
    /// An explicit [`super::domain::AccessGrant`] exists for (user, course).
    pub has_grant: bool,
    /// The user's enterprise record, when affiliated.
    pub enterprise: Option<Enterprise>,
}

/// Decide whether `user` may access `course`.
///
/// The rules form an ordered precedence list and the first match wins; every
/// call site goes through here rather than re-implementing a subset of the
/// branches. The function has no side effects and is always evaluated before
/// any capacity reservation, so a denial never consumes a slot.
pub fn resolve(user: &User, course: &Course, sources: &EntitlementSources) -> AccessDecision {
    if user.role == Role::Admin {
        return allowed(AllowedReason::AdminOverride);
    }

    if course.is_free() {
        return allowed(AllowedReason::FreeCourse);
    }

    if let Some(enterprise) = &sources.enterprise {
        if user.enterprise_id.as_ref() == Some(&enterprise.id)
            && enterprise.course_entitlements.contains(&course.id)
        {
            return allowed(AllowedReason::EnterpriseCourseEntitlement);
        }

        // Enterprises pre-pay; employees never see per-course paywalls.
        if user.role == Role::EnterpriseEmployee
            && user.enterprise_id.as_ref() == Some(&enterprise.id)
            && enterprise.subscription_active
            && enterprise.covers_all_courses
        {
            return allowed(AllowedReason::EnterpriseCoverage);
        }
    }

    if user.subscription.active {
        return allowed(AllowedReason::ActiveSubscription);
    }

    if sources.has_grant {
        return allowed(AllowedReason::AccessGrant);
    }

    let reason = if course.price_cents > 0 {
        DenialReason::SubscriptionRequired
    } else {
        DenialReason::EnterpriseAccessRequired
    };
    AccessDecision::Denied { reason }
}

const fn allowed(reason: AllowedReason) -> AccessDecision {
    AccessDecision::Allowed { reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::domain::{
        CourseApproval, CourseId, EnterpriseId, Subscription, UserId,
    };
    use std::collections::BTreeSet;

    fn paid_course() -> Course {
        Course {
            id: CourseId("course-ml".to_string()),
            title: "Applied ML".to_string(),
            trainer_id: UserId("trainer-1".to_string()),
            price_cents: 49_00,
            max_students: 20,
            approval: CourseApproval::Approved,
        }
    }

    fn student(id: &str) -> User {
        User {
            id: UserId(id.to_string()),
            role: Role::Student,
            subscription: Subscription::default(),
            enterprise_id: None,
            active: true,
        }
    }

    fn acme(all_courses: bool, entitled: &[&str]) -> Enterprise {
        Enterprise {
            id: EnterpriseId("acme".to_string()),
            course_entitlements: entitled
                .iter()
                .map(|id| CourseId((*id).to_string()))
                .collect::<BTreeSet<_>>(),
            covers_all_courses: all_courses,
            subscription_active: true,
        }
    }

    #[test]
    fn admin_is_allowed_without_subscription_or_grant() {
        let mut user = student("admin-1");
        user.role = Role::Admin;
        let decision = resolve(&user, &paid_course(), &EntitlementSources::default());
        assert_eq!(
            decision,
            AccessDecision::Allowed {
                reason: AllowedReason::AdminOverride
            }
        );
    }

    #[test]
    fn free_course_is_open_to_anyone() {
        let mut course = paid_course();
        course.price_cents = 0;
        let decision = resolve(&student("s-1"), &course, &EntitlementSources::default());
        assert_eq!(
            decision,
            AccessDecision::Allowed {
                reason: AllowedReason::FreeCourse
            }
        );
    }

    #[test]
    fn enterprise_course_entitlement_beats_subscription_check() {
        let mut user = student("s-2");
        user.enterprise_id = Some(EnterpriseId("acme".to_string()));
        let sources = EntitlementSources {
            has_grant: false,
            enterprise: Some(acme(false, &["course-ml"])),
        };
        let decision = resolve(&user, &paid_course(), &sources);
        assert_eq!(
            decision,
            AccessDecision::Allowed {
                reason: AllowedReason::EnterpriseCourseEntitlement
            }
        );
    }

    #[test]
    fn covered_enterprise_employee_skips_the_paywall() {
        let mut user = student("s-3");
        user.role = Role::EnterpriseEmployee;
        user.enterprise_id = Some(EnterpriseId("acme".to_string()));
        let sources = EntitlementSources {
            has_grant: false,
            enterprise: Some(acme(true, &[])),
        };
        let decision = resolve(&user, &paid_course(), &sources);
        assert_eq!(
            decision,
            AccessDecision::Allowed {
                reason: AllowedReason::EnterpriseCoverage
            }
        );
    }

    #[test]
    fn active_subscription_allows_access() {
        let mut user = student("s-4");
        user.subscription.active = true;
        let decision = resolve(&user, &paid_course(), &EntitlementSources::default());
        assert_eq!(
            decision,
            AccessDecision::Allowed {
                reason: AllowedReason::ActiveSubscription
            }
        );
    }

    #[test]
    fn explicit_grant_allows_access_without_subscription() {
        let sources = EntitlementSources {
            has_grant: true,
            enterprise: None,
        };
        let decision = resolve(&student("s-5"), &paid_course(), &sources);
        assert_eq!(
            decision,
            AccessDecision::Allowed {
                reason: AllowedReason::AccessGrant
            }
        );
    }

    #[test]
    fn paid_course_without_any_entitlement_requires_subscription() {
        let decision = resolve(&student("s-6"), &paid_course(), &EntitlementSources::default());
        assert_eq!(
            decision,
            AccessDecision::Denied {
                reason: DenialReason::SubscriptionRequired
            }
        );
    }

    #[test]
    fn foreign_enterprise_entitlement_does_not_apply() {
        let mut user = student("s-7");
        user.enterprise_id = Some(EnterpriseId("globex".to_string()));
        let sources = EntitlementSources {
            has_grant: false,
            enterprise: Some(acme(true, &["course-ml"])),
        };
        let decision = resolve(&user, &paid_course(), &sources);
        assert_eq!(
            decision,
            AccessDecision::Denied {
                reason: DenialReason::SubscriptionRequired
            }
        );
    }
}
