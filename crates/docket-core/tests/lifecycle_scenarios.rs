//! End-to-end lifecycle behaviour over the in-memory store.
//!
//! Covers the acceptance scenarios plus timestamp bookkeeping:
//! - accept / assign authorization outcomes and their audit trail
//! - invalid edges reporting the allowed targets
//! - concurrent transitions on one ticket
//! - storage failure leaving no trace
//! - reopen / resubmit loops and notification hand-off

use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use chrono::{Duration, TimeZone, Utc};
use docket_core::clock::{Clock, ManualClock};
use docket_core::error::{ErrorCode, LifecycleError};
use docket_core::lifecycle::{
    ActionKind, AuthorizationGate, LifecycleOptions, Policy, TicketLifecycleService,
};
use docket_core::model::{HistoryAction, NewTicket, Ticket, TicketStatus, UserId};
use docket_core::notify::{NotificationRequest, NotificationSink};
use docket_core::permissions::{self, StaticPermissions};
use docket_core::store::TicketStore;
use docket_core::store::memory::MemoryStore;

const CREATOR: UserId = UserId(1);
const ASSIGNEE: UserId = UserId(7);
const DISPATCHER: UserId = UserId(20);
const APPROVER: UserId = UserId(21);
const ADMIN: UserId = UserId(99);

#[derive(Default)]
struct RecordingSink {
    requests: Mutex<Vec<NotificationRequest>>,
}

impl NotificationSink for RecordingSink {
    fn submit(&self, request: NotificationRequest) {
        self.requests.lock().unwrap().push(request);
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    service: TicketLifecycleService,
    clock: Arc<ManualClock>,
    sink: Arc<RecordingSink>,
}

fn harness() -> Harness {
    harness_with(LifecycleOptions::default())
}

fn harness_with(options: LifecycleOptions) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let perms = StaticPermissions::new()
        .with_grant(DISPATCHER, permissions::ASSIGN)
        .with_grant(APPROVER, permissions::APPROVE)
        .with_grant(ADMIN, permissions::ADMIN);
    let gate = AuthorizationGate::new(Policy::default(), Arc::new(perms));
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, 0).unwrap(),
    ));
    let sink = Arc::new(RecordingSink::default());
    let service = TicketLifecycleService::new(store.clone(), gate)
        .with_clock(clock.clone())
        .with_notifier(sink.clone())
        .with_options(options);
    Harness {
        store,
        service,
        clock,
        sink,
    }
}

impl Harness {
    fn seed(&self, status: TicketStatus, assignee: Option<UserId>) -> Ticket {
        let mut ticket = self
            .store
            .create_ticket(NewTicket::new("Badge reader offline", CREATOR))
            .unwrap();
        ticket.status = status;
        ticket.assignee_id = assignee;
        self.store.seed(ticket.clone()).unwrap();
        ticket
    }

    fn reload(&self, ticket: &Ticket) -> Ticket {
        self.store.load(ticket.id).unwrap().unwrap()
    }
}

#[test]
fn assignee_accepts_assigned_ticket() {
    let h = harness();
    let ticket = h.seed(TicketStatus::Assigned, Some(ASSIGNEE));

    let updated = h.service.accept(ticket.id, ASSIGNEE, "on my way").unwrap();

    assert_eq!(updated.status, TicketStatus::Accepted);
    assert_eq!(h.reload(&ticket).status, TicketStatus::Accepted);
    let history = h.store.history(ticket.id).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].action, HistoryAction::Accepted);
    assert_eq!(history[0].actor_id, ASSIGNEE);
}

#[test]
fn assign_without_permission_is_forbidden_and_leaves_no_trace() {
    let h = harness();
    let ticket = h.seed(TicketStatus::Submitted, None);

    let err = h
        .service
        .assign(ticket.id, CREATOR, UserId(7), "")
        .unwrap_err();

    assert!(matches!(err, LifecycleError::Forbidden { target: TicketStatus::Assigned, .. }));
    assert_eq!(err.code(), ErrorCode::Forbidden);
    let stored = h.reload(&ticket);
    assert_eq!(stored.status, TicketStatus::Submitted);
    assert_eq!(stored.assignee_id, None);
    assert!(h.store.history(ticket.id).unwrap().is_empty());
    assert!(h.sink.requests.lock().unwrap().is_empty());
}

#[test]
fn closed_ticket_cannot_jump_to_approved() {
    let h = harness();
    let ticket = h.seed(TicketStatus::Closed, Some(ASSIGNEE));

    let err = h
        .service
        .transition(ticket.id, ADMIN, TicketStatus::Approved, "")
        .unwrap_err();

    match err {
        LifecycleError::InvalidTransition { from, to, allowed } => {
            assert_eq!(from, TicketStatus::Closed);
            assert_eq!(to, TicketStatus::Approved);
            assert_eq!(allowed, vec![TicketStatus::InProgress, TicketStatus::Submitted]);
        }
        other => panic!("expected InvalidTransition, got {other:?}"),
    }
}

#[test]
fn concurrent_transitions_have_one_winner() {
    for _ in 0..20 {
        let h = Arc::new(harness());
        let ticket = h.seed(TicketStatus::InProgress, Some(ASSIGNEE));
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = [TicketStatus::Approved, TicketStatus::Pending]
            .into_iter()
            .map(|target| {
                let h = Arc::clone(&h);
                let barrier = Arc::clone(&barrier);
                let id = ticket.id;
                thread::spawn(move || {
                    barrier.wait();
                    h.service.transition(id, ADMIN, target, "race")
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|t| t.join().unwrap()).collect();

        let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1, "results: {results:?}");
        let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert!(matches!(
            loser,
            LifecycleError::InvalidTransition { .. } | LifecycleError::Conflict { .. }
        ));

        let stored = h.reload(&ticket);
        assert_eq!(stored.status, winners[0].status);
        assert_eq!(stored.version, 1);
        assert_eq!(h.store.history(ticket.id).unwrap().len(), 1);
    }
}

#[test]
fn failed_save_appends_nothing() {
    let h = harness();
    let ticket = h.seed(TicketStatus::Assigned, Some(ASSIGNEE));
    h.store.fail_next_saves(1);

    let err = h.service.accept(ticket.id, ASSIGNEE, "").unwrap_err();

    assert!(matches!(err, LifecycleError::Persistence(_)));
    assert_eq!(err.code(), ErrorCode::PersistenceFailed);
    assert_eq!(h.reload(&ticket).status, TicketStatus::Assigned);
    assert!(h.store.history(ticket.id).unwrap().is_empty());
    assert!(h.sink.requests.lock().unwrap().is_empty());
}

#[test]
fn failed_history_append_rolls_back_save() {
    let h = harness();
    let ticket = h.seed(TicketStatus::Assigned, Some(ASSIGNEE));
    h.store.fail_next_history_appends(1);

    assert!(h.service.accept(ticket.id, ASSIGNEE, "").is_err());
    let stored = h.reload(&ticket);
    assert_eq!(stored.status, TicketStatus::Assigned);
    assert_eq!(stored.version, 0);
}

#[test]
fn full_lifecycle_sets_timestamps() {
    let h = harness();
    let ticket = h.seed(TicketStatus::Submitted, None);
    let t0 = h.clock.now();

    h.service.assign(ticket.id, DISPATCHER, ASSIGNEE, "").unwrap();
    h.service.accept(ticket.id, ASSIGNEE, "").unwrap();
    h.clock.advance(Duration::minutes(10));
    let started = h
        .service
        .transition(ticket.id, ASSIGNEE, TicketStatus::InProgress, "")
        .unwrap();
    assert_eq!(started.processing_started_at, Some(t0 + Duration::minutes(10)));

    h.clock.advance(Duration::minutes(10));
    h.service
        .transition(ticket.id, ASSIGNEE, TicketStatus::Pending, "waiting on vendor")
        .unwrap();
    h.clock.advance(Duration::minutes(10));
    let resumed = h
        .service
        .transition(ticket.id, ASSIGNEE, TicketStatus::InProgress, "")
        .unwrap();
    assert_eq!(
        resumed.processing_started_at,
        Some(t0 + Duration::minutes(10)),
        "processing start is set once"
    );

    h.clock.advance(Duration::minutes(10));
    let resolved = h
        .service
        .transition(ticket.id, ASSIGNEE, TicketStatus::Resolved, "")
        .unwrap();
    let resolved_at = t0 + Duration::minutes(40);
    assert_eq!(resolved.resolved_at, Some(resolved_at));

    h.clock.advance(Duration::minutes(10));
    let closed = h
        .service
        .transition(ticket.id, CREATOR, TicketStatus::Closed, "thanks")
        .unwrap();
    assert_eq!(closed.closed_at, Some(t0 + Duration::minutes(50)));
    assert_eq!(closed.resolved_at, Some(resolved_at));
    assert_eq!(closed.updated_at, t0 + Duration::minutes(50));
    assert_eq!(closed.version, 7);

    let actions: Vec<_> = h
        .store
        .history(ticket.id)
        .unwrap()
        .into_iter()
        .map(|e| e.action)
        .collect();
    assert_eq!(
        actions,
        vec![
            HistoryAction::Assigned,
            HistoryAction::Accepted,
            HistoryAction::InProgress,
            HistoryAction::Pending,
            HistoryAction::InProgress,
            HistoryAction::Resolved,
            HistoryAction::Closed,
        ]
    );
}

#[test]
fn resolving_again_moves_resolved_at() {
    let h = harness();
    let ticket = h.seed(TicketStatus::InProgress, Some(ASSIGNEE));

    let first = h
        .service
        .transition(ticket.id, ASSIGNEE, TicketStatus::Resolved, "")
        .unwrap()
        .resolved_at;
    h.clock.advance(Duration::hours(1));
    h.service
        .transition(ticket.id, ASSIGNEE, TicketStatus::InProgress, "not fixed")
        .unwrap();
    let reprocessed = h.reload(&ticket);
    assert_eq!(reprocessed.resolved_at, first, "leaving resolved keeps resolved_at");

    h.clock.advance(Duration::hours(1));
    let second = h
        .service
        .transition(ticket.id, ASSIGNEE, TicketStatus::Resolved, "")
        .unwrap()
        .resolved_at;
    assert!(second > first);
}

#[test]
fn reopen_clears_closed_at_and_resumes_progress() {
    let h = harness();
    let mut ticket = h.seed(TicketStatus::Closed, Some(ASSIGNEE));
    ticket.closed_at = Some(h.clock.now());
    h.store.seed(ticket.clone()).unwrap();

    let reopened = h.service.reopen(ticket.id, ASSIGNEE, "came back").unwrap();

    assert_eq!(reopened.status, TicketStatus::InProgress);
    assert_eq!(reopened.closed_at, None);
    let history = h.store.history(ticket.id).unwrap();
    assert_eq!(history[0].action, HistoryAction::Reopened);
    assert_eq!(
        history[0].description,
        "status: closed -> in_progress; comment: came back"
    );
}

#[test]
fn reopen_target_is_configurable() {
    let options = LifecycleOptions::default()
        .with_reopen_target(TicketStatus::Submitted)
        .unwrap();
    let h = harness_with(options);
    let ticket = h.seed(TicketStatus::Closed, Some(ASSIGNEE));

    assert!(matches!(
        h.service.reopen(ticket.id, ASSIGNEE, "").unwrap_err(),
        LifecycleError::Forbidden { target: TicketStatus::Submitted, .. }
    ));
    let reopened = h.service.reopen(ticket.id, CREATOR, "").unwrap();
    assert_eq!(reopened.status, TicketStatus::Submitted);
}

#[test]
fn reopen_only_applies_to_closed_tickets() {
    let h = harness();
    let ticket = h.seed(TicketStatus::Resolved, Some(ASSIGNEE));
    let err = h.service.reopen(ticket.id, ASSIGNEE, "").unwrap_err();
    assert!(matches!(err, LifecycleError::Validation { field: "status", .. }));
}

#[test]
fn creator_resubmits_returned_ticket() {
    let h = harness();
    let ticket = h.seed(TicketStatus::Accepted, Some(ASSIGNEE));

    h.service
        .transition(ticket.id, APPROVER, TicketStatus::Returned, "needs a serial number")
        .unwrap();
    assert!(matches!(
        h.service.resubmit(ticket.id, ASSIGNEE, "").unwrap_err(),
        LifecycleError::Forbidden { .. }
    ));
    let resubmitted = h.service.resubmit(ticket.id, CREATOR, "added it").unwrap();

    assert_eq!(resubmitted.status, TicketStatus::Submitted);
    let history = h.store.history(ticket.id).unwrap();
    assert_eq!(history.last().unwrap().action, HistoryAction::Resubmitted);
}

#[test]
fn reject_with_reason_by_approver() {
    let h = harness();
    let ticket = h.seed(TicketStatus::Submitted, None);
    let rejected = h
        .service
        .reject(ticket.id, APPROVER, "duplicate of #3")
        .unwrap();
    assert_eq!(rejected.status, TicketStatus::Rejected);
    let history = h.store.history(ticket.id).unwrap();
    assert_eq!(
        history[0].description,
        "status: submitted -> rejected; comment: duplicate of #3"
    );
}

#[test]
fn outsiders_see_not_found() {
    let h = harness();
    let ticket = h.seed(TicketStatus::Resolved, Some(ASSIGNEE));
    let err = h
        .service
        .transition(ticket.id, UserId(500), TicketStatus::Closed, "")
        .unwrap_err();
    assert!(matches!(err, LifecycleError::TicketNotFound { .. }));
    assert_eq!(err.code(), ErrorCode::TicketNotFound);
}

#[test]
fn committed_transition_notifies_stakeholders() {
    let h = harness();
    let ticket = h.seed(TicketStatus::Submitted, None);

    h.service.assign(ticket.id, DISPATCHER, ASSIGNEE, "").unwrap();

    let requests = h.sink.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].recipients, vec![CREATOR, ASSIGNEE]);
    assert_eq!(requests[0].ticket_id, Some(ticket.id));
    assert_eq!(requests[0].category, "ticket");
}

#[test]
fn available_actions_match_transition_outcomes() {
    let h = harness();
    for status in TicketStatus::ALL {
        for assignee in [None, Some(ASSIGNEE)] {
            for actor in [CREATOR, ASSIGNEE, DISPATCHER, APPROVER, ADMIN] {
                let ticket = h.seed(status, assignee);
                let offered = h.service.available_actions(actor, &ticket);
                for action in offered {
                    let result = if action.action == ActionKind::Assign {
                        h.service.assign(ticket.id, actor, ASSIGNEE, "")
                    } else {
                        h.service.transition(ticket.id, actor, action.target, "")
                    };
                    assert!(
                        result.is_ok(),
                        "{actor:?} offered {:?} on {status} but got {result:?}",
                        action.action
                    );
                    // Put the ticket back for the next offered action.
                    h.store.seed(ticket.clone()).unwrap();
                }
            }
        }
    }
}

#[test]
fn named_actions_are_accepted_by_their_operations() {
    for reopen_target in [TicketStatus::InProgress, TicketStatus::Submitted] {
        let options = LifecycleOptions::default()
            .with_reopen_target(reopen_target)
            .unwrap();
        let h = harness_with(options);
        for status in TicketStatus::ALL {
            for actor in [CREATOR, ASSIGNEE, DISPATCHER, APPROVER, ADMIN] {
                let ticket = h.seed(status, Some(ASSIGNEE));
                for action in h.service.available_actions(actor, &ticket) {
                    let result = match action.action {
                        ActionKind::Accept => h.service.accept(ticket.id, actor, ""),
                        ActionKind::Reject => h.service.reject(ticket.id, actor, "duplicate"),
                        ActionKind::Reopen => h.service.reopen(ticket.id, actor, ""),
                        ActionKind::Resubmit => h.service.resubmit(ticket.id, actor, ""),
                        _ => continue,
                    };
                    let updated = result.unwrap_or_else(|err| {
                        panic!("{actor:?} offered {:?} on {status} but got {err:?}", action.action)
                    });
                    assert_eq!(updated.status, action.target);
                    h.store.seed(ticket.clone()).unwrap();
                }
            }
        }
    }
}
