use crate::infra::build_engine;
use chrono::{Duration, Utc};
use clap::Args;
use coursehub::engine::{
    Course, CourseApproval, CourseId, PaymentKind, RecordingSender, ReviewDecision, Role,
    Subscription, User, UserId,
};
use coursehub::error::AppError;
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Platform fee in basis points (defaults to 1500, i.e. 15%)
    #[arg(long)]
    pub(crate) fee_bps: Option<u32>,
    /// Seat limit for the demo course (defaults to 2)
    #[arg(long)]
    pub(crate) seats: Option<u32>,
}

/// Walk the full engine lifecycle on the console: publication review,
/// payment settlement, enrollment, refund, and the notifications each step
/// produced.
pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let fee_bps = args.fee_bps.unwrap_or(1_500);
    let seats = args.seats.unwrap_or(2);

    let sender = RecordingSender::new();
    let engine = build_engine(fee_bps, Arc::new(sender.clone()));

    println!("CourseHub access engine demo (fee {fee_bps} bps, {seats} seats)");

    let admin = UserId("admin-root".to_string());
    let trainer = UserId("trainer-avery".to_string());
    let buyer = UserId("student-kim".to_string());
    let subscriber = UserId("student-lee".to_string());
    for (id, role) in [
        (&admin, Role::Admin),
        (&trainer, Role::Trainer),
        (&buyer, Role::Student),
        (&subscriber, Role::Student),
    ] {
        engine.users.upsert_user(User {
            id: id.clone(),
            role,
            subscription: Subscription::default(),
            enterprise_id: None,
            active: true,
        });
    }

    let course = CourseId("systems-programming".to_string());
    engine.catalog.upsert_course(Course {
        id: course.clone(),
        title: "Systems Programming".to_string(),
        trainer_id: trainer.clone(),
        price_cents: 149_00,
        max_students: seats,
        approval: CourseApproval::Pending,
    });

    println!("\nPublication review");
    let first_review = match engine.context.approvals.submit_course(&course, &trainer) {
        Ok(request) => request,
        Err(err) => {
            println!("  submission failed: {err}");
            return Ok(());
        }
    };
    println!("- {} submitted {} for review", trainer.0, course.0);

    let rejection = engine.context.approvals.decide(
        &first_review.id,
        &admin,
        ReviewDecision::Reject,
        Some("outline needs a capstone project".to_string()),
    );
    match rejection {
        Ok(decided) => println!(
            "- rejected with feedback: {}",
            decided.notes.unwrap_or_default()
        ),
        Err(err) => {
            println!("  rejection failed: {err}");
            return Ok(());
        }
    }

    let resubmission = match engine.context.approvals.submit_course(&course, &trainer) {
        Ok(request) => request,
        Err(err) => {
            println!("  resubmission failed: {err}");
            return Ok(());
        }
    };
    if let Err(err) =
        engine
            .context
            .approvals
            .decide(&resubmission.id, &admin, ReviewDecision::Approve, None)
    {
        println!("  approval failed: {err}");
        return Ok(());
    }
    println!("- resubmitted and approved; the course is live");

    let session = match engine.context.catalog.create_session(
        &trainer,
        &course,
        Utc::now() + Duration::days(7),
    ) {
        Ok(session) => session,
        Err(err) => {
            println!("  scheduling failed: {err}");
            return Ok(());
        }
    };
    println!("- session {} scheduled", session.id.0);

    println!("\nPayment settlement");
    let (payment, settlement) = match engine.context.approvals.initiate_payment(
        &buyer,
        149_00,
        PaymentKind::CoursePurchase {
            course_id: course.clone(),
        },
    ) {
        Ok(opened) => opened,
        Err(err) => {
            println!("  payment initiation failed: {err}");
            return Ok(());
        }
    };
    println!("- {} opened payment {}", buyer.0, payment.id.0);

    if let Err(err) =
        engine
            .context
            .approvals
            .decide(&settlement.id, &admin, ReviewDecision::Approve, None)
    {
        println!("  settlement failed: {err}");
        return Ok(());
    }
    match engine.context.approvals.payment(&payment.id) {
        Ok(settled) => println!(
            "- settled: platform keeps {} cents, trainer receives {} cents",
            settled.platform_fee_cents.unwrap_or_default(),
            settled.trainer_share_cents.unwrap_or_default()
        ),
        Err(err) => println!("  payment lookup failed: {err}"),
    }

    println!("\nEnrollment");
    match engine.context.enrollments.enroll(&buyer, &session.id) {
        Ok(enrollment) => println!("- purchase grant admits {}: {}", buyer.0, enrollment.id.0),
        Err(err) => println!("- {} turned away: {err}", buyer.0),
    }
    match engine.context.enrollments.enroll(&subscriber, &session.id) {
        Ok(enrollment) => println!("- {} enrolled: {}", subscriber.0, enrollment.id.0),
        Err(err) => println!("- {} turned away (no entitlement yet): {err}", subscriber.0),
    }

    let (_, sub_request) = match engine.context.approvals.initiate_payment(
        &subscriber,
        29_00,
        PaymentKind::Subscription {
            plan: "monthly".to_string(),
        },
    ) {
        Ok(opened) => opened,
        Err(err) => {
            println!("  subscription initiation failed: {err}");
            return Ok(());
        }
    };
    if let Err(err) =
        engine
            .context
            .approvals
            .decide(&sub_request.id, &admin, ReviewDecision::Approve, None)
    {
        println!("  subscription settlement failed: {err}");
        return Ok(());
    }
    match engine.context.enrollments.enroll(&subscriber, &session.id) {
        Ok(enrollment) => println!(
            "- subscription admits {}: {}",
            subscriber.0, enrollment.id.0
        ),
        Err(err) => println!("- {} still turned away: {err}", subscriber.0),
    }
    match engine.context.enrollments.roster(&session.id) {
        Ok(roster) => println!(
            "- roster: {}",
            roster
                .iter()
                .map(|user| user.0.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ),
        Err(err) => println!("  roster lookup failed: {err}"),
    }

    println!("\nRefund (financial only)");
    match engine.context.approvals.refund(&payment.id, &admin) {
        Ok(refunded) => println!("- payment {} refunded", refunded.id.0),
        Err(err) => println!("  refund failed: {err}"),
    }
    match engine.context.approvals.revoke_grant(&admin, &buyer, &course) {
        Ok(()) => println!("- access grant revoked explicitly"),
        Err(err) => println!("  revocation failed: {err}"),
    }

    let deliveries = sender.deliveries();
    println!("\nNotifications delivered: {}", deliveries.len());
    for (recipient, event) in deliveries {
        println!("- {} <- {}", recipient.0, event.label());
    }

    Ok(())
}
