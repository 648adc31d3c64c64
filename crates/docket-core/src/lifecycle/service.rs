//! The only code path that changes a ticket's status.
//!
//! Every mutation follows the same order: lock the ticket, load it, check
//! read scope, check the edge, check the gate, apply side effects, then save
//! the row and append its history entry in one unit of work. The notification
//! is handed off only after that unit commits.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::actions::AvailableAction;
use super::locks::TicketLocks;
use super::policy::AuthorizationGate;
use super::transitions;
use crate::clock::{Clock, SystemClock};
use crate::error::LifecycleError;
use crate::model::{HistoryEntry, NewHistoryEntry, Ticket, TicketId, TicketStatus, UserId};
use crate::notify::{NotificationRequest, NotificationSink};
use crate::store::{StoreError, TicketStore};

/// Lock wait used when configuration does not say otherwise.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleOptions {
    reopen_target: TicketStatus,
    lock_timeout: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            reopen_target: TicketStatus::InProgress,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

impl LifecycleOptions {
    /// Where `reopen` sends a closed ticket.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::Validation`] unless `target` is reachable from
    /// `closed`.
    pub fn with_reopen_target(mut self, target: TicketStatus) -> Result<Self, LifecycleError> {
        if !transitions::is_valid(TicketStatus::Closed, target) {
            return Err(LifecycleError::validation(
                "reopen_target",
                format!("{target} is not reachable from closed"),
            ));
        }
        self.reopen_target = target;
        Ok(self)
    }

    #[must_use]
    pub const fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    #[must_use]
    pub const fn reopen_target(&self) -> TicketStatus {
        self.reopen_target
    }

    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }
}

/// A generic transition request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRequest {
    pub ticket_id: TicketId,
    pub actor: UserId,
    pub target: TicketStatus,
    pub comment: String,
    /// When set, the ticket must still be in this status.
    pub expected_status: Option<TicketStatus>,
}

impl TransitionRequest {
    #[must_use]
    pub fn new(ticket_id: TicketId, actor: UserId, target: TicketStatus) -> Self {
        Self {
            ticket_id,
            actor,
            target,
            comment: String::new(),
            expected_status: None,
        }
    }

    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    #[must_use]
    pub const fn expecting(mut self, status: TicketStatus) -> Self {
        self.expected_status = Some(status);
        self
    }
}

/// Ticket snapshot plus what can happen to it next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowInfo {
    pub ticket: Ticket,
    pub allowed_transitions: Vec<TicketStatus>,
    pub available_actions: Vec<AvailableAction>,
}

/// Extra checks and edits a convenience operation layers on a transition.
struct Change<'a> {
    target: TicketStatus,
    comment: &'a str,
    expected_status: Option<TicketStatus>,
    /// The operation only applies from these statuses.
    required_status: Option<(&'static str, &'static [TicketStatus])>,
    new_assignee: Option<UserId>,
}

impl<'a> Change<'a> {
    const fn to(target: TicketStatus, comment: &'a str) -> Self {
        Self {
            target,
            comment,
            expected_status: None,
            required_status: None,
            new_assignee: None,
        }
    }

    const fn only_from(mut self, operation: &'static str, from: &'static [TicketStatus]) -> Self {
        self.required_status = Some((operation, from));
        self
    }
}

pub struct TicketLifecycleService {
    store: Arc<dyn TicketStore>,
    gate: AuthorizationGate,
    notifier: Option<Arc<dyn NotificationSink>>,
    clock: Arc<dyn Clock>,
    locks: TicketLocks,
    options: LifecycleOptions,
}

impl std::fmt::Debug for TicketLifecycleService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketLifecycleService")
            .field("gate", &self.gate)
            .field("options", &self.options)
            .field("notifications", &self.notifier.is_some())
            .finish_non_exhaustive()
    }
}

impl TicketLifecycleService {
    #[must_use]
    pub fn new(store: Arc<dyn TicketStore>, gate: AuthorizationGate) -> Self {
        Self {
            store,
            gate,
            notifier: None,
            clock: Arc::new(SystemClock),
            locks: TicketLocks::new(),
            options: LifecycleOptions::default(),
        }
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub const fn with_options(mut self, options: LifecycleOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub const fn gate(&self) -> &AuthorizationGate {
        &self.gate
    }

    #[must_use]
    pub const fn options(&self) -> &LifecycleOptions {
        &self.options
    }

    /// Move a ticket to `target`.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::TicketNotFound`] if the ticket is missing or outside
    ///   the actor's read scope
    /// - [`LifecycleError::InvalidTransition`] for an edge not in the graph
    /// - [`LifecycleError::Forbidden`] when the gate denies the actor
    /// - [`LifecycleError::Validation`] when the target needs an assignee the
    ///   ticket lacks
    /// - [`LifecycleError::Conflict`] on lock timeout or a concurrent write
    /// - [`LifecycleError::Persistence`] when the store fails
    pub fn transition(
        &self,
        ticket_id: TicketId,
        actor: UserId,
        target: TicketStatus,
        comment: &str,
    ) -> Result<Ticket, LifecycleError> {
        self.execute(ticket_id, actor, Change::to(target, comment))
    }

    /// [`Self::transition`] with an optional expected current status.
    ///
    /// # Errors
    ///
    /// As [`Self::transition`], plus [`LifecycleError::Conflict`] when the
    /// ticket has moved away from `expected_status`.
    pub fn transition_expecting(&self, request: &TransitionRequest) -> Result<Ticket, LifecycleError> {
        let mut change = Change::to(request.target, &request.comment);
        change.expected_status = request.expected_status;
        self.execute(request.ticket_id, request.actor, change)
    }

    /// Assign the ticket to `assignee` and move it to `assigned`.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::Validation`] for a zero assignee, otherwise as
    /// [`Self::transition`].
    pub fn assign(
        &self,
        ticket_id: TicketId,
        actor: UserId,
        assignee: UserId,
        reason: &str,
    ) -> Result<Ticket, LifecycleError> {
        if !assignee.is_valid() {
            return Err(LifecycleError::validation(
                "assignee_id",
                "must be a valid user id",
            ));
        }
        let reason = reason.trim();
        let comment = if reason.is_empty() {
            format!("assigned to user {assignee}")
        } else {
            format!("assigned to user {assignee}: {reason}")
        };
        let mut change = Change::to(TicketStatus::Assigned, &comment);
        change.new_assignee = Some(assignee);
        self.execute(ticket_id, actor, change)
    }

    /// Accept an assigned ticket.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::Validation`] unless the ticket is `assigned`,
    /// otherwise as [`Self::transition`].
    pub fn accept(
        &self,
        ticket_id: TicketId,
        actor: UserId,
        comment: &str,
    ) -> Result<Ticket, LifecycleError> {
        self.execute(
            ticket_id,
            actor,
            Change::to(TicketStatus::Accepted, comment)
                .only_from("accept", &[TicketStatus::Assigned]),
        )
    }

    /// Reject a ticket. `reason` is mandatory.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::Validation`] for a blank reason, otherwise as
    /// [`Self::transition`].
    pub fn reject(
        &self,
        ticket_id: TicketId,
        actor: UserId,
        reason: &str,
    ) -> Result<Ticket, LifecycleError> {
        if reason.trim().is_empty() {
            return Err(LifecycleError::validation("reason", "rejection needs a reason"));
        }
        self.execute(ticket_id, actor, Change::to(TicketStatus::Rejected, reason))
    }

    /// Reopen a closed ticket into the configured reopen target.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::Validation`] unless the ticket is `closed`,
    /// otherwise as [`Self::transition`].
    pub fn reopen(
        &self,
        ticket_id: TicketId,
        actor: UserId,
        comment: &str,
    ) -> Result<Ticket, LifecycleError> {
        self.execute(
            ticket_id,
            actor,
            Change::to(self.options.reopen_target, comment)
                .only_from("reopen", &[TicketStatus::Closed]),
        )
    }

    /// Send a rejected or returned ticket back to `submitted`.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::Validation`] unless the ticket is `rejected` or
    /// `returned`, otherwise as [`Self::transition`].
    pub fn resubmit(
        &self,
        ticket_id: TicketId,
        actor: UserId,
        comment: &str,
    ) -> Result<Ticket, LifecycleError> {
        self.execute(
            ticket_id,
            actor,
            Change::to(TicketStatus::Submitted, comment)
                .only_from("resubmit", &[TicketStatus::Rejected, TicketStatus::Returned]),
        )
    }

    /// Targets reachable from `status`, sorted by status code.
    #[must_use]
    pub const fn allowed_transitions(&self, status: TicketStatus) -> &'static [TicketStatus] {
        transitions::allowed_targets(status)
    }

    /// Actions `actor` could take on `ticket` that [`Self::transition`] (or
    /// [`Self::assign`] for the `assigned` target) would accept as of this
    /// snapshot.
    #[must_use]
    pub fn available_actions(&self, actor: UserId, ticket: &Ticket) -> Vec<AvailableAction> {
        if !self.gate.can_read(actor, ticket) {
            return Vec::new();
        }
        transitions::allowed_targets(ticket.status)
            .iter()
            .copied()
            .filter(|target| {
                *target == TicketStatus::Assigned
                    || !target.requires_assignee()
                    || ticket.assignee_id.is_some()
            })
            .filter(|target| self.gate.allows(actor, ticket, *target))
            .map(|target| {
                AvailableAction::for_edge(ticket.status, target, self.options.reopen_target)
            })
            .collect()
    }

    /// Audit trail of one ticket, oldest first.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::TicketNotFound`] outside read scope, or a store
    /// failure.
    pub fn history(
        &self,
        ticket_id: TicketId,
        actor: UserId,
    ) -> Result<Vec<HistoryEntry>, LifecycleError> {
        self.load_readable(ticket_id, actor)?;
        Ok(self.store.history(ticket_id)?)
    }

    /// Ticket, its graph neighbours and the actor's available actions.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::TicketNotFound`] outside read scope, or a store
    /// failure.
    pub fn workflow_info(
        &self,
        ticket_id: TicketId,
        actor: UserId,
    ) -> Result<WorkflowInfo, LifecycleError> {
        let ticket = self.load_readable(ticket_id, actor)?;
        Ok(WorkflowInfo {
            allowed_transitions: transitions::allowed_targets(ticket.status).to_vec(),
            available_actions: self.available_actions(actor, &ticket),
            ticket,
        })
    }

    /// Load a ticket the actor is allowed to see.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::TicketNotFound`] if missing or outside read scope.
    pub fn load_readable(&self, ticket_id: TicketId, actor: UserId) -> Result<Ticket, LifecycleError> {
        match self.store.load(ticket_id)? {
            Some(ticket) if self.gate.can_read(actor, &ticket) => Ok(ticket),
            _ => Err(LifecycleError::TicketNotFound { ticket_id }),
        }
    }

    fn execute(
        &self,
        ticket_id: TicketId,
        actor: UserId,
        change: Change<'_>,
    ) -> Result<Ticket, LifecycleError> {
        if !actor.is_valid() {
            return Err(LifecycleError::validation("actor", "must be a valid user id"));
        }
        let target = change.target;

        let guard = self
            .locks
            .acquire(ticket_id, self.options.lock_timeout)
            .map_err(|err| LifecycleError::Conflict {
                ticket_id,
                reason: err.to_string(),
            })?;

        let current = self.load_readable(ticket_id, actor)?;
        let from = current.status;
        tracing::debug!(ticket = %ticket_id, actor = actor.get(), %from, %target, "transition requested");

        if let Some(expected) = change.expected_status
            && expected != from
        {
            return Err(LifecycleError::Conflict {
                ticket_id,
                reason: format!("expected status {expected}, found {from}"),
            });
        }

        if let Some((operation, statuses)) = change.required_status
            && !statuses.contains(&from)
        {
            return Err(LifecycleError::validation(
                "status",
                format!("{operation} does not apply to a {from} ticket"),
            ));
        }

        if !transitions::is_valid(from, target) {
            return Err(LifecycleError::InvalidTransition {
                from,
                to: target,
                allowed: transitions::allowed_targets(from).to_vec(),
            });
        }

        self.gate.check(actor, &current, target)?;

        let now = self.clock.now();
        let mut next = current.clone();
        if let Some(assignee) = change.new_assignee {
            next.assignee_id = Some(assignee);
        }
        if target.requires_assignee() && next.assignee_id.is_none() {
            return Err(LifecycleError::validation(
                "assignee_id",
                format!("a {target} ticket needs an assignee; assign it first"),
            ));
        }
        apply_side_effects(&mut next, from, target, now);
        next.status = target;
        next.updated_at = now;
        next.version = current.version + 1;

        let entry =
            NewHistoryEntry::for_transition(ticket_id, actor, from, target, change.comment, now);
        self.store
            .unit_of_work(&mut |tx| {
                tx.save(&next, current.version)?;
                tx.append_history(&entry)?;
                Ok(())
            })
            .map_err(|err| match err {
                StoreError::VersionConflict { .. } => LifecycleError::Conflict {
                    ticket_id,
                    reason: "ticket was modified by another writer".to_string(),
                },
                other => LifecycleError::Persistence(other),
            })?;
        drop(guard);

        tracing::info!(
            ticket = %ticket_id,
            actor = actor.get(),
            %from,
            to = %target,
            action = %entry.action,
            version = next.version,
            "ticket transitioned"
        );

        if let Some(notifier) = &self.notifier {
            let request = NotificationRequest::ticket_update(&next, entry.action, actor, now);
            if !request.recipients.is_empty() {
                notifier.submit(request);
            }
        }

        Ok(next)
    }
}

/// Timestamp bookkeeping for entering `target` from `from`.
fn apply_side_effects(
    ticket: &mut Ticket,
    from: TicketStatus,
    target: TicketStatus,
    now: chrono::DateTime<chrono::Utc>,
) {
    if from == TicketStatus::Closed {
        ticket.closed_at = None;
    }
    match target {
        TicketStatus::InProgress => {
            ticket.processing_started_at.get_or_insert(now);
        }
        TicketStatus::Resolved => ticket.resolved_at = Some(now),
        TicketStatus::Closed => ticket.closed_at = Some(now),
        TicketStatus::Submitted
        | TicketStatus::Assigned
        | TicketStatus::Accepted
        | TicketStatus::Approved
        | TicketStatus::Pending
        | TicketStatus::Rejected
        | TicketStatus::Returned => {}
    }
}

#[cfg(test)]
mod tests {
    use super::{LifecycleOptions, TicketLifecycleService, TransitionRequest, apply_side_effects};
    use crate::error::LifecycleError;
    use crate::lifecycle::actions::ActionKind;
    use crate::lifecycle::policy::{AuthorizationGate, Policy};
    use crate::model::{HistoryAction, NewTicket, Ticket, TicketStatus, UserId};
    use crate::permissions::{self, StaticPermissions};
    use crate::store::memory::MemoryStore;
    use crate::store::TicketStore;
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Arc;

    const CREATOR: UserId = UserId(1);
    const ASSIGNEE: UserId = UserId(2);
    const DISPATCHER: UserId = UserId(3);

    fn setup() -> (Arc<MemoryStore>, TicketLifecycleService, Ticket) {
        let store = Arc::new(MemoryStore::new());
        let perms = StaticPermissions::new().with_grant(DISPATCHER, permissions::ASSIGN);
        let gate = AuthorizationGate::new(Policy::default(), Arc::new(perms));
        let service = TicketLifecycleService::new(store.clone(), gate);
        let ticket = store.create_ticket(NewTicket::new("Printer jam", CREATOR)).unwrap();
        (store, service, ticket)
    }

    #[test]
    fn side_effects_track_processing_and_closure() {
        let t0 = Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap();
        let mut ticket = NewTicket::new("t", CREATOR).into_ticket(crate::model::TicketId(1), t0);

        apply_side_effects(&mut ticket, TicketStatus::Accepted, TicketStatus::InProgress, t0);
        let later = t0 + Duration::hours(1);
        apply_side_effects(&mut ticket, TicketStatus::Pending, TicketStatus::InProgress, later);
        assert_eq!(ticket.processing_started_at, Some(t0));

        apply_side_effects(&mut ticket, TicketStatus::Resolved, TicketStatus::Closed, later);
        assert_eq!(ticket.closed_at, Some(later));
        apply_side_effects(&mut ticket, TicketStatus::Closed, TicketStatus::Submitted, later);
        assert_eq!(ticket.closed_at, None);
    }

    #[test]
    fn assign_sets_assignee_and_records_history() {
        let (store, service, ticket) = setup();
        let updated = service.assign(ticket.id, DISPATCHER, ASSIGNEE, "on call").unwrap();

        assert_eq!(updated.status, TicketStatus::Assigned);
        assert_eq!(updated.assignee_id, Some(ASSIGNEE));
        assert_eq!(updated.version, 1);

        let history = store.history(ticket.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, HistoryAction::Assigned);
        assert_eq!(
            history[0].description,
            "status: submitted -> assigned; comment: assigned to user 2: on call"
        );
    }

    #[test]
    fn assign_rejects_zero_assignee() {
        let (_store, service, ticket) = setup();
        let err = service.assign(ticket.id, DISPATCHER, UserId(0), "").unwrap_err();
        assert!(matches!(err, LifecycleError::Validation { field: "assignee_id", .. }));
    }

    #[test]
    fn accept_requires_assigned_status() {
        let (_store, service, ticket) = setup();
        let err = service.accept(ticket.id, CREATOR, "").unwrap_err();
        assert!(matches!(err, LifecycleError::Validation { field: "status", .. }));
    }

    #[test]
    fn reject_requires_reason() {
        let (_store, service, ticket) = setup();
        let err = service.reject(ticket.id, DISPATCHER, "   ").unwrap_err();
        assert!(matches!(err, LifecycleError::Validation { field: "reason", .. }));
    }

    #[test]
    fn unassigned_ticket_cannot_skip_to_accepted() {
        let store = Arc::new(MemoryStore::new());
        let perms = StaticPermissions::new().with_grant(DISPATCHER, permissions::ADMIN);
        let gate = AuthorizationGate::new(Policy::default(), Arc::new(perms));
        let service = TicketLifecycleService::new(store.clone(), gate);
        let ticket = store.create_ticket(NewTicket::new("t", CREATOR)).unwrap();

        let err = service
            .transition(ticket.id, DISPATCHER, TicketStatus::Accepted, "")
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Validation { field: "assignee_id", .. }));
        assert_eq!(store.history_len().unwrap(), 0);
    }

    #[test]
    fn expected_status_mismatch_is_conflict() {
        let (_store, service, ticket) = setup();
        let request = TransitionRequest::new(ticket.id, CREATOR, TicketStatus::Rejected)
            .expecting(TicketStatus::Assigned);
        let err = service.transition_expecting(&request).unwrap_err();
        assert!(matches!(err, LifecycleError::Conflict { .. }));
    }

    #[test]
    fn reopen_target_must_leave_closed() {
        assert!(LifecycleOptions::default()
            .with_reopen_target(TicketStatus::Submitted)
            .is_ok());
        assert!(LifecycleOptions::default()
            .with_reopen_target(TicketStatus::Resolved)
            .is_err());
    }

    #[test]
    fn available_actions_for_submitted_ticket() {
        let (_store, service, ticket) = setup();

        let dispatcher: Vec<_> = service
            .available_actions(DISPATCHER, &ticket)
            .into_iter()
            .map(|a| a.action)
            .collect();
        assert_eq!(dispatcher, vec![ActionKind::Assign]);

        // The creator can see the ticket but has no permission-backed moves,
        // and accepting needs an assignee.
        assert!(service.available_actions(CREATOR, &ticket).is_empty());
        assert!(service.available_actions(UserId(99), &ticket).is_empty());
    }

    #[test]
    fn stranger_gets_not_found() {
        let (_store, service, ticket) = setup();
        let err = service.history(ticket.id, UserId(99)).unwrap_err();
        assert!(matches!(err, LifecycleError::TicketNotFound { .. }));
        let info = service.workflow_info(ticket.id, CREATOR).unwrap();
        assert_eq!(
            info.allowed_transitions,
            vec![TicketStatus::Accepted, TicketStatus::Assigned, TicketStatus::Rejected]
        );
    }
}
