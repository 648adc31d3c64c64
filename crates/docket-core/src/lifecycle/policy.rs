//! Who may move a ticket into which status.
//!
//! A [`Policy`] maps every target status to an any-of list of
//! [`Requirement`]s. Holding one of the admin permissions satisfies every row.
//! [`AuthorizationGate`] evaluates a policy against a [`PermissionProvider`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::LifecycleError;
use crate::model::{ParseEnumError, Ticket, TicketStatus, UserId};
use crate::permissions::{self, PermissionProvider};

/// One way of satisfying a policy row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Requirement {
    Permission(String),
    Assignee,
    Creator,
}

impl Requirement {
    #[must_use]
    pub fn permission(name: impl Into<String>) -> Self {
        Self::Permission(name.into())
    }

    fn is_met(&self, actor: UserId, ticket: &Ticket, perms: &dyn PermissionProvider) -> bool {
        match self {
            Self::Permission(name) => perms.has_permission(actor, name),
            Self::Assignee => ticket.is_assignee(actor),
            Self::Creator => ticket.is_creator(actor),
        }
    }

    /// Config spelling: `creator`, `assignee`, `perm:<name>`.
    #[must_use]
    pub fn to_config_string(&self) -> String {
        match self {
            Self::Permission(name) => format!("perm:{name}"),
            Self::Assignee => "assignee".to_string(),
            Self::Creator => "creator".to_string(),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Permission(name) => write!(f, "permission {name}"),
            Self::Assignee => f.write_str("ticket assignee"),
            Self::Creator => f.write_str("ticket creator"),
        }
    }
}

impl FromStr for Requirement {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed {
            "creator" => Ok(Self::Creator),
            "assignee" => Ok(Self::Assignee),
            _ => match trimmed.strip_prefix("perm:").map(str::trim) {
                Some(name) if !name.is_empty() => Ok(Self::permission(name)),
                _ => Err(ParseEnumError {
                    expected: "requirement (creator, assignee, perm:<name>)",
                    got: s.to_string(),
                }),
            },
        }
    }
}

/// Target status -> any-of requirements, plus admin overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    rules: BTreeMap<TicketStatus, Vec<Requirement>>,
    admin_permissions: Vec<String>,
}

impl Default for Policy {
    fn default() -> Self {
        use Requirement::{Assignee, Creator};
        use TicketStatus::{
            Accepted, Approved, Assigned, Closed, InProgress, Pending, Rejected, Resolved,
            Returned, Submitted,
        };
        let perm = |name: &str| Requirement::permission(name);

        let rules = BTreeMap::from([
            (Assigned, vec![perm(permissions::ASSIGN)]),
            (Accepted, vec![Assignee]),
            (Approved, vec![perm(permissions::APPROVE)]),
            (InProgress, vec![Assignee, perm(permissions::PROCESS)]),
            (Pending, vec![Assignee]),
            (Resolved, vec![Assignee, perm(permissions::PROCESS)]),
            (Closed, vec![Creator, Assignee, perm(permissions::CLOSE)]),
            (Rejected, vec![perm(permissions::APPROVE), Assignee]),
            (Returned, vec![perm(permissions::APPROVE)]),
            (Submitted, vec![Creator]),
        ]);

        Self {
            rules,
            admin_permissions: vec![permissions::ADMIN.to_string(), permissions::STATUS.to_string()],
        }
    }
}

impl Policy {
    /// Requirements for entering `target`. Empty means admins only.
    #[must_use]
    pub fn requirements(&self, target: TicketStatus) -> &[Requirement] {
        self.rules
            .get(&target)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn admin_permissions(&self) -> &[String] {
        &self.admin_permissions
    }

    /// Replace the row for `target`.
    #[must_use]
    pub fn with_rule(mut self, target: TicketStatus, requirements: Vec<Requirement>) -> Self {
        self.rules.insert(target, requirements);
        self
    }

    #[must_use]
    pub fn with_admin_permissions(mut self, admin_permissions: Vec<String>) -> Self {
        self.admin_permissions = admin_permissions;
        self
    }

    /// Every permission name the policy mentions, admin ones included.
    #[must_use]
    pub fn permission_names(&self) -> BTreeSet<&str> {
        let mut names: BTreeSet<&str> = self.admin_permissions.iter().map(String::as_str).collect();
        for requirement in self.rules.values().flatten() {
            if let Requirement::Permission(name) = requirement {
                names.insert(name);
            }
        }
        names
    }
}

/// Evaluates a [`Policy`] for a concrete actor and ticket.
#[derive(Clone)]
pub struct AuthorizationGate {
    policy: Policy,
    permissions: Arc<dyn PermissionProvider>,
    read_permissions: Vec<String>,
}

impl fmt::Debug for AuthorizationGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationGate")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl AuthorizationGate {
    #[must_use]
    pub fn new(policy: Policy, permissions: Arc<dyn PermissionProvider>) -> Self {
        let mut read_permissions: Vec<String> = policy
            .permission_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        if !read_permissions.iter().any(|p| p == permissions::VIEW_ALL) {
            read_permissions.push(permissions::VIEW_ALL.to_string());
        }
        Self {
            policy,
            permissions,
            read_permissions,
        }
    }

    #[must_use]
    pub const fn policy(&self) -> &Policy {
        &self.policy
    }

    #[must_use]
    pub fn is_admin(&self, actor: UserId) -> bool {
        self.policy
            .admin_permissions
            .iter()
            .any(|name| self.permissions.has_permission(actor, name))
    }

    /// Whether `actor` may move `ticket` into `target`. Does not consult the
    /// transition table.
    #[must_use]
    pub fn allows(&self, actor: UserId, ticket: &Ticket, target: TicketStatus) -> bool {
        if !actor.is_valid() {
            return false;
        }
        self.is_admin(actor)
            || self
                .policy
                .requirements(target)
                .iter()
                .any(|req| req.is_met(actor, ticket, self.permissions.as_ref()))
    }

    /// Like [`Self::allows`], but a denial carries the row's requirements.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::Forbidden`] when no requirement is met.
    pub fn check(
        &self,
        actor: UserId,
        ticket: &Ticket,
        target: TicketStatus,
    ) -> Result<(), LifecycleError> {
        if self.allows(actor, ticket, target) {
            return Ok(());
        }
        tracing::debug!(ticket = %ticket.id, actor = actor.get(), %target, "transition denied");
        Err(LifecycleError::Forbidden {
            target,
            required: self.policy.requirements(target).to_vec(),
        })
    }

    /// Read scope: stakeholders, plus anyone holding a permission the policy
    /// (or `ticket:view_all`) names.
    #[must_use]
    pub fn can_read(&self, actor: UserId, ticket: &Ticket) -> bool {
        if !actor.is_valid() {
            return false;
        }
        ticket.is_creator(actor)
            || ticket.is_assignee(actor)
            || self
                .read_permissions
                .iter()
                .any(|name| self.permissions.has_permission(actor, name))
    }
}

#[cfg(test)]
mod tests {
    use super::{AuthorizationGate, Policy, Requirement};
    use crate::error::LifecycleError;
    use crate::model::{NewTicket, Ticket, TicketId, TicketStatus, UserId};
    use crate::permissions::{self, StaticPermissions};
    use chrono::Utc;
    use std::sync::Arc;

    const CREATOR: UserId = UserId(1);
    const ASSIGNEE: UserId = UserId(2);
    const STRANGER: UserId = UserId(3);

    fn ticket() -> Ticket {
        let mut ticket = NewTicket::new("t", CREATOR).into_ticket(TicketId(1), Utc::now());
        ticket.assignee_id = Some(ASSIGNEE);
        ticket
    }

    fn gate(perms: StaticPermissions) -> AuthorizationGate {
        AuthorizationGate::new(Policy::default(), Arc::new(perms))
    }

    #[test]
    fn ownership_rows() {
        let gate = gate(StaticPermissions::new());
        let ticket = ticket();

        assert!(gate.allows(ASSIGNEE, &ticket, TicketStatus::Accepted));
        assert!(!gate.allows(CREATOR, &ticket, TicketStatus::Accepted));
        assert!(gate.allows(ASSIGNEE, &ticket, TicketStatus::Pending));
        assert!(gate.allows(CREATOR, &ticket, TicketStatus::Submitted));
        assert!(!gate.allows(ASSIGNEE, &ticket, TicketStatus::Submitted));
        assert!(gate.allows(CREATOR, &ticket, TicketStatus::Closed));
        assert!(gate.allows(ASSIGNEE, &ticket, TicketStatus::Closed));
        assert!(!gate.allows(STRANGER, &ticket, TicketStatus::Closed));
        assert!(gate.allows(ASSIGNEE, &ticket, TicketStatus::Rejected));
    }

    #[test]
    fn permission_rows() {
        let perms = StaticPermissions::new()
            .with_grant(STRANGER, permissions::PROCESS)
            .with_grant(STRANGER, permissions::APPROVE);
        let gate = gate(perms);
        let ticket = ticket();

        assert!(gate.allows(STRANGER, &ticket, TicketStatus::InProgress));
        assert!(gate.allows(STRANGER, &ticket, TicketStatus::Resolved));
        assert!(gate.allows(STRANGER, &ticket, TicketStatus::Approved));
        assert!(gate.allows(STRANGER, &ticket, TicketStatus::Returned));
        assert!(!gate.allows(STRANGER, &ticket, TicketStatus::Assigned));
        assert!(!gate.allows(STRANGER, &ticket, TicketStatus::Pending));
    }

    #[test]
    fn admin_permission_short_circuits() {
        let gate = gate(StaticPermissions::new().with_grant(STRANGER, permissions::STATUS));
        let ticket = ticket();
        for target in TicketStatus::ALL {
            assert!(gate.allows(STRANGER, &ticket, target), "admin denied {target}");
        }
    }

    #[test]
    fn denial_reports_required_context() {
        let gate = gate(StaticPermissions::new());
        let err = gate
            .check(CREATOR, &ticket(), TicketStatus::Assigned)
            .unwrap_err();
        match err {
            LifecycleError::Forbidden { target, required } => {
                assert_eq!(target, TicketStatus::Assigned);
                assert_eq!(required, vec![Requirement::permission(permissions::ASSIGN)]);
            }
            other => panic!("expected Forbidden, got {other:?}"),
        }
    }

    #[test]
    fn zero_actor_is_never_allowed() {
        let gate = gate(StaticPermissions::new());
        let mut ticket = ticket();
        ticket.creator_id = UserId(0);
        assert!(!gate.allows(UserId(0), &ticket, TicketStatus::Submitted));
        assert!(!gate.can_read(UserId(0), &ticket));
    }

    #[test]
    fn read_scope() {
        let perms = StaticPermissions::new()
            .with_grant(UserId(10), permissions::VIEW_ALL)
            .with_grant(UserId(11), permissions::ASSIGN)
            .with_grant(UserId(12), "report:export");
        let gate = gate(perms);
        let ticket = ticket();

        assert!(gate.can_read(CREATOR, &ticket));
        assert!(gate.can_read(ASSIGNEE, &ticket));
        assert!(gate.can_read(UserId(10), &ticket));
        assert!(gate.can_read(UserId(11), &ticket));
        assert!(!gate.can_read(UserId(12), &ticket));
        assert!(!gate.can_read(STRANGER, &ticket));
    }

    #[test]
    fn overridden_rule_replaces_row() {
        let policy =
            Policy::default().with_rule(TicketStatus::Closed, vec![Requirement::permission("qa")]);
        let gate = AuthorizationGate::new(
            policy,
            Arc::new(StaticPermissions::new().with_grant(STRANGER, "qa")),
        );
        let ticket = ticket();
        assert!(!gate.allows(CREATOR, &ticket, TicketStatus::Closed));
        assert!(gate.allows(STRANGER, &ticket, TicketStatus::Closed));
        assert!(gate.can_read(STRANGER, &ticket));
    }

    #[test]
    fn requirement_syntax_parses() {
        assert_eq!("creator".parse::<Requirement>().unwrap(), Requirement::Creator);
        assert_eq!(" assignee ".parse::<Requirement>().unwrap(), Requirement::Assignee);
        assert_eq!(
            "perm:ticket:close".parse::<Requirement>().unwrap(),
            Requirement::permission("ticket:close")
        );
        assert!("perm:".parse::<Requirement>().is_err());
        assert!("owner".parse::<Requirement>().is_err());
        assert_eq!(Requirement::permission("x").to_config_string(), "perm:x");
    }
}
