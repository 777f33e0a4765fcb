// File: tests/pipeline_scenarios.rs
mod common;

use common::{FlakyRepository, calendar, deliver, invite, provisioned_group};
use inbound_invites::config::Config;
use inbound_invites::model::EventTime;
use inbound_invites::pipeline::{AttachmentReport, InvitationPipeline, ProcessOutcome};
use inbound_invites::reconciler::Outcome;
use inbound_invites::repository::Repository;
use inbound_invites::triggers::{ChangeKind, DispatchStatus, TriggerTable};

fn reports(outcome: ProcessOutcome) -> Vec<AttachmentReport> {
    match outcome {
        ProcessOutcome::Processed { reports, .. } => reports,
        other => panic!("expected the email to be processed, got {:?}", other),
    }
}

// --- Publish / cancel semantics ---

#[test]
fn test_publish_twice_converges() {
    let (mut repo, inbox) = provisioned_group();
    let pipeline = InvitationPipeline::new(&Config::default());
    let body = invite("REQUEST", "evt-1", "Budget");

    let (first, _) = deliver(&mut repo, &inbox, &[("a.ics", "text/calendar", body.as_str())]);
    pipeline.process_email(&mut repo, &first).unwrap();
    let cal = calendar(&repo).unwrap();
    let node = repo.find_entries(&cal, "evt-1").unwrap()[0].clone();
    let after_first = repo.entry(&node).unwrap();

    let (second, _) = deliver(&mut repo, &inbox, &[("a.ics", "text/calendar", body.as_str())]);
    let outcome = pipeline.process_email(&mut repo, &second).unwrap();

    assert_eq!(
        reports(outcome),
        vec![AttachmentReport::Reconciled(Outcome::Updated(node.clone()))]
    );
    assert_eq!(repo.find_entries(&cal, "evt-1").unwrap(), vec![node.clone()]);
    assert_eq!(repo.entry(&node).unwrap(), after_first);
}

#[test]
fn test_cancel_for_absent_identifier_is_a_noop() {
    let (mut repo, inbox) = provisioned_group();
    let body = invite("CANCEL", "never-seen", "Gone");
    let (email, _) = deliver(&mut repo, &inbox, &[("c.ics", "text/calendar", body.as_str())]);

    let outcome = InvitationPipeline::new(&Config::default())
        .process_email(&mut repo, &email)
        .unwrap();

    assert_eq!(
        reports(outcome),
        vec![AttachmentReport::Reconciled(Outcome::AlreadyAbsent)]
    );
    assert_ne!(repo.parent(&email).unwrap(), Some(inbox));
}

#[test]
fn test_second_publish_replaces_summary() {
    let (mut repo, inbox) = provisioned_group();
    let pipeline = InvitationPipeline::new(&Config::default());

    let a = invite("REQUEST", "evt-1", "Original");
    let (first, _) = deliver(&mut repo, &inbox, &[("a.ics", "text/calendar", a.as_str())]);
    pipeline.process_email(&mut repo, &first).unwrap();

    let b = invite("REQUEST", "evt-1", "X");
    let (second, _) = deliver(&mut repo, &inbox, &[("b.ics", "text/calendar", b.as_str())]);
    pipeline.process_email(&mut repo, &second).unwrap();

    let entries = repo.entries_in(&calendar(&repo).unwrap());
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].summary, "X");
    assert_eq!(
        entries[0].start,
        EventTime::Zoned {
            tzid: "Europe/Berlin".to_string(),
            local: chrono::NaiveDate::from_ymd_opt(2025, 4, 15)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
        }
    );
}

#[test]
fn test_cancel_removes_existing_entry() {
    let (mut repo, inbox) = provisioned_group();
    let pipeline = InvitationPipeline::new(&Config::default());

    let publish = invite("REQUEST", "evt-42", "Offsite");
    let (first, _) = deliver(&mut repo, &inbox, &[("p.ics", "text/calendar", publish.as_str())]);
    pipeline.process_email(&mut repo, &first).unwrap();
    let cal = calendar(&repo).unwrap();
    assert_eq!(repo.find_entries(&cal, "evt-42").unwrap().len(), 1);

    let cancel = invite("CANCEL", "evt-42", "Offsite");
    let (second, _) = deliver(&mut repo, &inbox, &[("c.ics", "text/calendar", cancel.as_str())]);
    let outcome = pipeline.process_email(&mut repo, &second).unwrap();

    assert!(matches!(
        reports(outcome)[0],
        AttachmentReport::Reconciled(Outcome::Deleted(_))
    ));
    assert!(repo.find_entries(&cal, "evt-42").unwrap().is_empty());
    assert_ne!(repo.parent(&second).unwrap(), Some(inbox));
}

// --- Bad documents ---

#[test]
fn test_unknown_method_changes_nothing_but_archives() {
    let (mut repo, inbox) = provisioned_group();
    let body = invite("PUBLISH", "evt-9", "Broadcast");
    let (email, attachments) =
        deliver(&mut repo, &inbox, &[("x.ics", "text/calendar", body.as_str())]);

    let outcome = InvitationPipeline::new(&Config::default())
        .process_email(&mut repo, &email)
        .unwrap();

    match &reports(outcome)[0] {
        AttachmentReport::Failed(reason) => assert!(reason.contains("unknown method")),
        other => panic!("expected a parse failure, got {:?}", other),
    }
    assert!(calendar(&repo).is_none(), "calendar must not be touched");
    assert_ne!(repo.parent(&attachments[0]).unwrap(), Some(inbox));
}

#[test]
fn test_missing_uid_is_rejected() {
    let (mut repo, inbox) = provisioned_group();
    let body = invite("REQUEST", "evt-1", "No id").replace("UID:evt-1\r\n", "");
    let (email, _) = deliver(&mut repo, &inbox, &[("x.ics", "text/calendar", body.as_str())]);

    let outcome = InvitationPipeline::new(&Config::default())
        .process_email(&mut repo, &email)
        .unwrap();

    assert_eq!(
        reports(outcome),
        vec![AttachmentReport::Failed("missing identifier".to_string())]
    );
}

#[test]
fn test_garbage_calendar_attachment_still_archives() {
    let (mut repo, inbox) = provisioned_group();
    let (email, _) = deliver(
        &mut repo,
        &inbox,
        &[("broken.ics", "text/calendar", "this is not a calendar")],
    );

    let outcome = InvitationPipeline::new(&Config::default())
        .process_email(&mut repo, &email)
        .unwrap();

    assert!(matches!(reports(outcome)[0], AttachmentReport::Failed(_)));
    assert!(calendar(&repo).is_none());
    assert_ne!(repo.parent(&email).unwrap(), Some(inbox));
}

#[test]
fn test_oversized_duration_fails_without_aborting_dispatch() {
    let (mut repo, inbox) = provisioned_group();
    let body = invite("REQUEST", "evt-5", "Forever").replace(
        "DTEND;TZID=Europe/Berlin:20250415T110000\r\n",
        "DURATION:P99999999999999W\r\n",
    );
    let (email, attachments) =
        deliver(&mut repo, &inbox, &[("x.ics", "text/calendar", body.as_str())]);
    let table = TriggerTable::standard(&Config::default());

    let results = table.dispatch(&mut repo, ChangeKind::NodeUpdated, &email);

    let handled = results.iter().find(|d| d.binding == "inbound-email").unwrap();
    match &handled.status {
        DispatchStatus::Handled(summary) => assert!(summary.contains("1 failed"), "{}", summary),
        other => panic!("expected the email to be handled, got {:?}", other),
    }
    assert!(calendar(&repo).is_none(), "calendar must not be touched");
    assert_ne!(repo.parent(&attachments[0]).unwrap(), Some(inbox));
}

// --- Mixed attachments ---

#[test]
fn test_text_attachment_is_never_read() {
    let (repo, inbox) = provisioned_group();
    let mut repo = FlakyRepository::new(repo);
    let body = invite("REQUEST", "evt-42", "Planning");
    let (email, attachments) = deliver(
        &mut repo.inner,
        &inbox,
        &[
            ("invite.ics", "text/calendar; method=REQUEST", body.as_str()),
            ("notes.txt", "text/plain", "BEGIN:VCALENDAR"),
        ],
    );

    let outcome = InvitationPipeline::new(&Config::default())
        .process_email(&mut repo, &email)
        .unwrap();

    let ProcessOutcome::Processed {
        archived_to,
        reports,
    } = outcome
    else {
        panic!("expected the email to be processed");
    };
    assert!(matches!(reports[0], AttachmentReport::Reconciled(Outcome::Created(_))));
    assert_eq!(
        reports[1],
        AttachmentReport::Ignored {
            content_type: Some("text/plain".to_string())
        }
    );
    assert_eq!(*repo.reads.borrow(), vec![attachments[0].clone()]);

    let cal = calendar(&repo).unwrap();
    assert_eq!(repo.find_entries(&cal, "evt-42").unwrap().len(), 1);
    for node in [&email, &attachments[0], &attachments[1]] {
        assert_eq!(repo.parent(node).unwrap(), Some(archived_to.clone()));
    }
}

#[test]
fn test_store_failure_on_one_attachment_does_not_stop_archive() {
    let (repo, inbox) = provisioned_group();
    let mut repo = FlakyRepository::new(repo);
    repo.fail_entry_writes = true;
    let body = invite("REQUEST", "evt-5", "Review");
    let (email, _) = deliver(
        &mut repo.inner,
        &inbox,
        &[("r.ics", "text/calendar", body.as_str())],
    );

    let outcome = InvitationPipeline::new(&Config::default())
        .process_email(&mut repo, &email)
        .unwrap();

    match &reports(outcome)[0] {
        AttachmentReport::Failed(reason) => assert!(reason.contains("injected create failure")),
        other => panic!("expected a store failure, got {:?}", other),
    }
    assert_ne!(repo.parent(&email).unwrap(), Some(inbox));
}

#[test]
fn test_provenance_comes_from_the_email() {
    let (mut repo, inbox) = provisioned_group();
    let body = invite("REQUEST", "evt-3", "Sync");
    let (email, _) = deliver(&mut repo, &inbox, &[("s.ics", "text/calendar", body.as_str())]);

    InvitationPipeline::new(&Config::default())
        .process_email(&mut repo, &email)
        .unwrap();

    let entries = repo.entries_in(&calendar(&repo).unwrap());
    assert_eq!(entries[0].provenance.originator.as_deref(), Some("organizer@example.com"));
    assert_eq!(entries[0].provenance.addressee.as_deref(), Some("finance@example.com"));
    assert!(entries[0].created.is_some(), "DTSTAMP fills in for CREATED");
}

// --- Trigger guards ---

#[test]
fn test_archived_email_is_rejected_on_renotification() {
    let (mut repo, inbox) = provisioned_group();
    let table = TriggerTable::standard(&Config::default());
    let body = invite("REQUEST", "evt-1", "Budget");
    let (email, _) = deliver(&mut repo, &inbox, &[("a.ics", "text/calendar", body.as_str())]);

    let first = table.dispatch(&mut repo, ChangeKind::NodeUpdated, &email);
    let handled = first
        .iter()
        .find(|d| d.binding == "inbound-email")
        .unwrap();
    assert!(matches!(handled.status, DispatchStatus::Handled(_)));

    let second = table.dispatch(&mut repo, ChangeKind::NodeUpdated, &email);
    assert!(second.iter().all(|d| d.status == DispatchStatus::Rejected));
    assert_eq!(repo.entries_in(&calendar(&repo).unwrap()).len(), 1);
}

#[test]
fn test_group_update_provisions_inbox_idempotently() {
    let mut repo = inbound_invites::store::MemoryRepository::new();
    let root = repo.create_group("legal").unwrap();
    let table = TriggerTable::standard(&Config::default());

    table.dispatch(&mut repo, ChangeKind::NodeUpdated, &root);
    let inbox = repo.resolve_alias("legal").unwrap();
    let results = table.dispatch(&mut repo, ChangeKind::NodeUpdated, &root);

    let group = results.iter().find(|d| d.binding == "group-inbox").unwrap();
    assert!(matches!(group.status, DispatchStatus::Handled(_)));
    assert_eq!(repo.resolve_alias("legal"), Some(inbox.clone()));
    assert_eq!(repo.children(&root), vec![inbox]);
}

#[test]
fn test_failed_group_provisioning_is_reported_and_isolated() {
    let mut repo = inbound_invites::store::MemoryRepository::new();
    let broken = repo.create_group("broken").unwrap();
    // An unregistered folder already holds the inbox name.
    repo.create_folder(&broken, "inboundInvitations").unwrap();
    let legal = repo.create_group("legal").unwrap();
    let table = TriggerTable::standard(&Config::default());

    let results = table.dispatch(&mut repo, ChangeKind::NodeUpdated, &broken);
    let group = results.iter().find(|d| d.binding == "group-inbox").unwrap();
    match &group.status {
        DispatchStatus::Failed(message) => assert!(message.contains("broken"), "{}", message),
        other => panic!("expected the group handler to fail, got {:?}", other),
    }
    assert_eq!(repo.resolve_alias("broken"), None);

    let results = table.dispatch(&mut repo, ChangeKind::NodeUpdated, &legal);
    let group = results.iter().find(|d| d.binding == "group-inbox").unwrap();
    assert!(matches!(group.status, DispatchStatus::Handled(_)));
    let inbox = repo.resolve_alias("legal").unwrap();
    assert_eq!(repo.parent(&inbox).unwrap(), Some(legal));
}
