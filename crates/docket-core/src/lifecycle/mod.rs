//! Ticket state machine: graph, authorization, orchestration.

pub mod actions;
pub mod locks;
pub mod policy;
pub mod service;
pub mod transitions;

pub use actions::{ActionKind, AvailableAction};
pub use policy::{AuthorizationGate, Policy, Requirement};
pub use service::{LifecycleOptions, TicketLifecycleService, TransitionRequest, WorkflowInfo};
