use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::common::*;
use crate::workflows::recruitment::{
    ApplicationId, ApplicationStatus, ErrorKind, ModuleStatus, RecruitmentError, UserId,
};

#[test]
fn acceptance_records_review_and_keeps_the_slot() {
    let harness = harness();
    let round = harness.active_round();
    let module = harness.advertised_module(&round.id, "COMP2400", 3, 2, 0);
    let receipt = harness
        .apply("stu-u1", "undergraduate", &module)
        .expect("applied");

    let accepted = harness
        .service
        .accept_application(&lecturer(), &receipt.application.id)
        .expect("accepted");

    assert_eq!(accepted.status, ApplicationStatus::Accepted);
    assert!(accepted.decided_at.is_some());
    let counters = harness.module(&module.id).undergraduate.expect("open");
    assert_eq!(counters.reviewed, 1);
    assert_eq!(counters.accepted, 1);
    assert_eq!(counters.remaining, 1);

    let events = harness.notifier.events();
    let last = events.last().expect("student notified");
    assert_eq!(last.template, "application_accepted");
    assert_eq!(last.recipients, vec![student("stu-u1")]);
}

#[test]
fn rejection_returns_slot_and_hours_and_reopens_a_full_module() {
    let harness = harness();
    let round = harness.active_round();
    let module = harness.advertised_module(&round.id, "COMP2400", 3, 1, 0);
    let receipt = harness
        .apply("stu-u1", "undergraduate", &module)
        .expect("applied");
    assert_eq!(harness.module(&module.id).status, ModuleStatus::Full);

    let rejected = harness
        .service
        .reject_application(&lecturer(), &receipt.application.id)
        .expect("rejected");
    assert_eq!(rejected.status, ApplicationStatus::Rejected);

    let stored = harness.module(&module.id);
    assert_eq!(stored.status, ModuleStatus::Advertised);
    let counters = stored.undergraduate.expect("open");
    assert_eq!(counters.remaining, 1);
    assert_eq!(counters.applied, 1);
    assert_eq!(counters.rejected(), 1);

    let budget = harness
        .service
        .get_budget(&student("stu-u1"), &round.id)
        .expect("budget read")
        .expect("budget exists");
    assert_eq!(budget.available_hours, 6);
    assert!(budget.applications.is_empty());
    assert!(harness
        .templates()
        .contains(&"application_rejected".to_string()));

    harness
        .apply("stu-u2", "undergraduate", &module)
        .expect("freed slot can be taken");
}

#[test]
fn second_decision_is_already_processed() {
    let harness = harness();
    let round = harness.active_round();
    let module = harness.advertised_module(&round.id, "COMP2400", 3, 2, 0);
    let receipt = harness
        .apply("stu-u1", "undergraduate", &module)
        .expect("applied");
    harness
        .service
        .accept_application(&lecturer(), &receipt.application.id)
        .expect("accepted");

    let error = harness
        .service
        .reject_application(&lecturer(), &receipt.application.id)
        .expect_err("already decided");
    assert!(matches!(
        error,
        RecruitmentError::AlreadyProcessed {
            status: ApplicationStatus::Accepted,
            ..
        }
    ));
    let counters = harness.module(&module.id).undergraduate.expect("open");
    assert_eq!(counters.reviewed, 1, "counters untouched by the failed decision");
}

#[test]
fn only_coordinators_decide() {
    let harness = harness();
    let round = harness.active_round();
    let module = harness.advertised_module(&round.id, "COMP2400", 3, 2, 0);
    let receipt = harness
        .apply("stu-u1", "undergraduate", &module)
        .expect("applied");

    let error = harness
        .service
        .accept_application(&UserId::new("lect-eve"), &receipt.application.id)
        .expect_err("not a coordinator");
    assert_eq!(error.kind(), ErrorKind::Forbidden);
    assert_eq!(
        harness
            .service
            .get_application(&receipt.application.id)
            .expect("still stored")
            .status,
        ApplicationStatus::Pending
    );
}

#[test]
fn unknown_application_is_not_found() {
    let harness = harness();
    let error = harness
        .service
        .accept_application(&lecturer(), &ApplicationId::new("app-missing"))
        .expect_err("no such application");
    assert_eq!(error.kind(), ErrorKind::NotFound);
}

#[test]
fn failed_counter_write_reverts_the_decision() {
    let store = Arc::new(FlakyStore::default());
    let harness = harness_with(store.clone());
    let round = harness.active_round();
    let module = harness.advertised_module(&round.id, "COMP2400", 3, 1, 0);
    let receipt = harness
        .apply("stu-u1", "undergraduate", &module)
        .expect("applied");

    store.fail_module_writes.store(true, Ordering::SeqCst);
    let error = harness
        .service
        .reject_application(&lecturer(), &receipt.application.id)
        .expect_err("module store offline");
    assert_eq!(error.kind(), ErrorKind::Internal);

    let application = harness
        .service
        .get_application(&receipt.application.id)
        .expect("still stored");
    assert_eq!(application.status, ApplicationStatus::Pending);
    assert!(application.decided_at.is_none());
    let budget = harness
        .service
        .get_budget(&student("stu-u1"), &round.id)
        .expect("budget read")
        .expect("budget exists");
    assert_eq!(budget.available_hours, 3, "no refund without the slot");
    assert_eq!(harness.module(&module.id).status, ModuleStatus::Full);
}

#[test]
fn failed_refund_leaves_application_pending_and_slot_held() {
    let store = Arc::new(FlakyStore::default());
    let harness = harness_with(store.clone());
    let round = harness.active_round();
    let module = harness.advertised_module(&round.id, "COMP2400", 3, 1, 0);
    let receipt = harness
        .apply("stu-u1", "undergraduate", &module)
        .expect("applied");

    store.fail_budget_refunds.store(true, Ordering::SeqCst);
    let error = harness
        .service
        .reject_application(&lecturer(), &receipt.application.id)
        .expect_err("budget store offline");
    assert_eq!(error.kind(), ErrorKind::Internal);

    let application = harness
        .service
        .get_application(&receipt.application.id)
        .expect("still stored");
    assert_eq!(application.status, ApplicationStatus::Pending);
    assert!(application.decided_at.is_none());
    let stored = harness.module(&module.id);
    assert_eq!(stored.status, ModuleStatus::Full);
    let counters = stored.undergraduate.expect("open");
    assert_eq!((counters.reviewed, counters.remaining), (0, 0));
    assert!(!harness
        .templates()
        .contains(&"application_rejected".to_string()));

    store.fail_budget_refunds.store(false, Ordering::SeqCst);
    harness
        .service
        .reject_application(&lecturer(), &receipt.application.id)
        .expect("retry succeeds once the store is back");
    let budget = harness
        .service
        .get_budget(&student("stu-u1"), &round.id)
        .expect("budget read")
        .expect("budget exists");
    assert_eq!(budget.available_hours, 6);
    assert_eq!(harness.module(&module.id).status, ModuleStatus::Advertised);
}
