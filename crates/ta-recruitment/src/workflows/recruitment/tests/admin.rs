use std::io::Cursor;

use super::common::*;
use crate::workflows::recruitment::{
    CatalogImportError, ErrorKind, ModuleStatus, NewRound, RoundSchedule, RoundStatus,
};

#[test]
fn new_round_takes_hour_limits_from_configuration() {
    let harness = harness();
    let round = harness.service.create_round(new_round()).expect("created");
    assert_eq!(round.status, RoundStatus::Initialised);
    assert_eq!(round.undergraduate_hours, 6);
    assert_eq!(round.postgraduate_hours, 8);

    let custom = harness
        .service
        .create_round(NewRound {
            undergraduate_hours: Some(4),
            ..new_round()
        })
        .expect("created");
    assert_eq!(custom.undergraduate_hours, 4);
}

#[test]
fn round_activates_once() {
    let harness = harness();
    let round = harness.active_round();
    let error = harness
        .service
        .activate_round(&round.id)
        .expect_err("already active");
    assert_eq!(error.kind(), ErrorKind::NotEditable);
}

#[test]
fn schedule_is_frozen_after_first_advertisement() {
    let harness = harness();
    let round = harness.active_round();
    let draft = harness.draft_module(&round.id, "COMP1000");
    let schedule = RoundSchedule {
        application_due: date(2026, 3, 8),
        document_due: date(2026, 3, 22),
        undergraduate_hours: 5,
        postgraduate_hours: 9,
    };

    let updated = harness
        .service
        .update_round_schedule(&round.id, schedule)
        .expect("nothing published yet");
    assert_eq!(updated.undergraduate_hours, 5);
    assert_eq!(draft.status, ModuleStatus::Initialised);

    harness.advertised_module(&round.id, "COMP1100", 2, 1, 0);
    let error = harness
        .service
        .update_round_schedule(&round.id, schedule)
        .expect_err("module already advertised");
    assert_eq!(error.kind(), ErrorKind::NotEditable);
}

#[test]
fn module_defaults_due_dates_from_round_and_starts_closed() {
    let harness = harness();
    let round = harness.active_round();
    let module = harness.draft_module(&round.id, "COMP1000");

    assert_eq!(module.status, ModuleStatus::Initialised);
    assert_eq!(module.application_due, round.application_due);
    assert_eq!(module.document_due, round.document_due);
    assert!(!module.open_for_undergraduates());
    assert!(!module.open_for_postgraduates());
    assert_eq!(module.version, 0);
}

#[test]
fn archived_round_takes_no_new_modules() {
    let harness = harness();
    let round = harness.active_round();
    harness.service.archive_round(&round.id).expect("archived");
    harness
        .service
        .archive_round(&round.id)
        .expect("archiving twice is harmless");

    let error = harness
        .service
        .create_module(crate::workflows::recruitment::NewModule {
            round_id: round.id.clone(),
            code: "COMP1000".to_string(),
            name: "Programming".to_string(),
            semester: "S1".to_string(),
            coordinators: vec![lecturer()],
            application_due: None,
            document_due: None,
        })
        .expect_err("round archived");
    assert_eq!(error.kind(), ErrorKind::NotEditable);
}

#[test]
fn requesting_changes_notifies_coordinators() {
    let harness = harness();
    let round = harness.active_round();
    let module = harness.draft_module(&round.id, "COMP1000");

    let updated = harness
        .service
        .request_changes(&module.id)
        .expect("requested");
    assert_eq!(updated.status, ModuleStatus::PendingChanges);

    let events = harness.notifier.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].template, "requirements_requested");
    assert_eq!(events[0].recipients, vec![lecturer()]);
    assert_eq!(
        events[0].details.get("module_code").map(String::as_str),
        Some("COMP1000")
    );
}

#[test]
fn advertisement_reaches_both_lists_once_per_student() {
    let harness = harness();
    let round = harness.active_round();
    let module = harness.draft_module(&round.id, "COMP1000");
    harness.service.request_changes(&module.id).expect("requested");
    harness
        .service
        .edit_requirements(&lecturer(), &module.id, requirement_change(3, 1, 1))
        .expect("saved");

    let advertisement = harness.service.advertise(&module.id).expect("advertised");

    assert_eq!(advertisement.module.status, ModuleStatus::Advertised);
    assert_eq!(
        advertisement.recipients,
        vec![student("stu-p1"), student("stu-u1"), student("stu-u2")]
    );
    assert_eq!(
        harness.templates().last().map(String::as_str),
        Some("module_advertised")
    );
}

#[test]
fn advertisement_skips_lists_of_closed_categories() {
    let harness = harness();
    let round = harness.active_round();
    let module = harness.advertised_module(&round.id, "COMP1000", 3, 0, 2);
    assert!(module.open_for_postgraduates());

    let event = harness
        .notifier
        .events()
        .into_iter()
        .find(|event| event.template == "module_advertised")
        .expect("advertisement sent");
    assert_eq!(event.recipients, vec![student("stu-p1"), student("stu-u1")]);
}

#[test]
fn module_without_positions_cannot_be_advertised() {
    let harness = harness();
    let round = harness.active_round();
    let module = harness.draft_module(&round.id, "COMP1000");
    harness.service.request_changes(&module.id).expect("requested");
    harness
        .service
        .edit_requirements(&lecturer(), &module.id, requirement_change(3, 0, 0))
        .expect("saved");

    let error = harness
        .service
        .advertise(&module.id)
        .expect_err("nothing to advertise");
    assert_eq!(error.kind(), ErrorKind::NotEditable);
    assert_eq!(
        harness.module(&module.id).status,
        ModuleStatus::ChangesSubmitted
    );
}

#[test]
fn advertising_needs_an_active_round() {
    let harness = harness();
    let round = harness.service.create_round(new_round()).expect("created");
    let module = harness.draft_module(&round.id, "COMP1000");
    harness.service.request_changes(&module.id).expect("requested");
    harness
        .service
        .edit_requirements(&lecturer(), &module.id, requirement_change(3, 1, 0))
        .expect("saved");

    let error = harness
        .service
        .advertise(&module.id)
        .expect_err("round not active");
    assert_eq!(error.kind(), ErrorKind::NotEditable);
}

#[test]
fn phases_advance_with_the_calendar_and_closing_appoints_documented_applicants() {
    let harness = harness();
    let round = harness.active_round();
    let module = harness.advertised_module(&round.id, "COMP1000", 2, 2, 0);
    let untouched = harness.draft_module(&round.id, "COMP1100");
    let first = harness
        .apply("stu-u1", "undergraduate", &module)
        .expect("applied");
    let second = harness
        .apply("stu-u2", "undergraduate", &module)
        .expect("applied");
    harness
        .service
        .accept_application(&lecturer(), &first.application.id)
        .expect("accepted");
    harness
        .service
        .accept_application(&lecturer(), &second.application.id)
        .expect("accepted");

    let before_due = harness
        .service
        .advance_round_phases(&round.id, round.application_due)
        .expect("advanced");
    assert!(before_due.is_empty(), "due date itself is still open");

    let advanced = harness
        .service
        .advance_round_phases(&round.id, date(2026, 3, 2))
        .expect("advanced");
    assert_eq!(advanced.len(), 1);
    assert_eq!(advanced[0].status, ModuleStatus::GettingDocuments);

    harness.documents.mark_submitted(student("stu-u1"));
    let refreshed = harness
        .service
        .refresh_documents(&module.id)
        .expect("refreshed");
    assert_eq!(refreshed.undergraduate.expect("open").doc_submitted, 1);

    let closed = harness
        .service
        .advance_round_phases(&round.id, date(2026, 3, 16))
        .expect("advanced");
    assert_eq!(closed.len(), 1);
    let counters = closed[0].undergraduate.expect("open");
    assert_eq!(closed[0].status, ModuleStatus::Closed);
    assert_eq!(counters.appointed, 1);
    assert_eq!(
        harness.module(&untouched.id).status,
        ModuleStatus::Initialised
    );
}

#[test]
fn late_run_moves_straight_to_closed() {
    let harness = harness();
    let round = harness.active_round();
    let module = harness.advertised_module(&round.id, "COMP1000", 2, 1, 0);

    let advanced = harness
        .service
        .advance_round_phases(&round.id, date(2026, 4, 1))
        .expect("advanced");
    assert_eq!(advanced.len(), 1);
    assert_eq!(harness.module(&module.id).status, ModuleStatus::Closed);
}

#[test]
fn documents_only_refresh_while_collecting() {
    let harness = harness();
    let round = harness.active_round();
    let module = harness.advertised_module(&round.id, "COMP1000", 2, 1, 0);

    let error = harness
        .service
        .refresh_documents(&module.id)
        .expect_err("still advertised");
    assert_eq!(error.kind(), ErrorKind::NotEditable);

    harness
        .service
        .open_document_collection(&module.id)
        .expect("collecting");
    let closed = harness.service.close_module(&module.id).expect("closed");
    assert_eq!(closed.status, ModuleStatus::Closed);
    let error = harness
        .service
        .close_module(&module.id)
        .expect_err("already closed");
    assert_eq!(error.kind(), ErrorKind::NotEditable);
}

#[test]
fn catalog_import_creates_modules_and_skips_known_codes() {
    let harness = harness();
    let round = harness.active_round();
    let csv = "Code,Name,Semester,Coordinators\n\
               COMP1000,Programming,S1,lect-ada\n\
               COMP2000,Algorithms,S2,lect-ada;lect-bob\n";

    let created = harness
        .service
        .import_modules(&round.id, Cursor::new(csv))
        .expect("imported");
    assert_eq!(created.len(), 2);
    assert_eq!(created[1].coordinators.len(), 2);
    assert!(created
        .iter()
        .all(|module| module.status == ModuleStatus::Initialised));

    let again = harness
        .service
        .import_modules(&round.id, Cursor::new(csv))
        .expect("re-import");
    assert!(again.is_empty());
    assert_eq!(
        harness
            .service
            .list_round_modules(&round.id)
            .expect("listed")
            .len(),
        2
    );
}

#[test]
fn catalog_import_rejects_the_whole_file_on_a_bad_row() {
    let harness = harness();
    let round = harness.active_round();
    let csv = "Code,Name,Semester,Coordinators\n\
               COMP1000,Programming,S1,lect-ada\n\
               COMP2000,Algorithms,S2,\n";

    let error = harness
        .service
        .import_modules(&round.id, Cursor::new(csv))
        .expect_err("missing coordinators");
    assert!(matches!(error, CatalogImportError::MissingCoordinators { .. }));
    assert!(harness
        .service
        .list_round_modules(&round.id)
        .expect("listed")
        .is_empty());
}
