//! The ticket state graph.
//!
//! [`allowed_targets`] is the only place edges are declared; validation and
//! action listings both read from it. Each target list is sorted by status
//! code so callers get a stable order.

use crate::model::TicketStatus;

use TicketStatus::{
    Accepted, Approved, Assigned, Closed, InProgress, Pending, Rejected, Resolved, Returned,
    Submitted,
};

/// Reachable targets from `from`, sorted alphabetically by status code.
#[must_use]
pub const fn allowed_targets(from: TicketStatus) -> &'static [TicketStatus] {
    match from {
        Submitted => &[Accepted, Assigned, Rejected],
        Assigned => &[Accepted, Rejected, Returned, Submitted],
        Accepted => &[Approved, InProgress, Rejected, Returned],
        Approved => &[InProgress, Rejected, Returned],
        InProgress => &[Approved, Pending, Resolved, Returned],
        Pending => &[InProgress, Resolved, Returned],
        Resolved => &[Closed, InProgress, Returned],
        Closed => &[InProgress, Submitted],
        Rejected => &[Assigned, Submitted],
        Returned => &[Assigned, Submitted],
    }
}

/// Whether `from -> to` is an edge. Self-transitions never are.
#[must_use]
pub fn is_valid(from: TicketStatus, to: TicketStatus) -> bool {
    allowed_targets(from).contains(&to)
}

/// Every edge of the graph, in table order.
pub fn edges() -> impl Iterator<Item = (TicketStatus, TicketStatus)> {
    TicketStatus::ALL
        .into_iter()
        .flat_map(|from| allowed_targets(from).iter().map(move |to| (from, *to)))
}

#[cfg(test)]
mod tests {
    use super::{allowed_targets, edges, is_valid};
    use crate::model::TicketStatus;

    #[test]
    fn closed_reopens_to_progress_or_submitted() {
        assert_eq!(
            allowed_targets(TicketStatus::Closed),
            &[TicketStatus::InProgress, TicketStatus::Submitted]
        );
    }

    #[test]
    fn target_lists_are_sorted_by_code() {
        for from in TicketStatus::ALL {
            let codes: Vec<_> = allowed_targets(from).iter().map(|s| s.as_str()).collect();
            let mut sorted = codes.clone();
            sorted.sort_unstable();
            assert_eq!(codes, sorted, "targets of {from} out of order");
        }
    }

    #[test]
    fn no_self_loops_and_no_dead_ends() {
        for from in TicketStatus::ALL {
            assert!(!is_valid(from, from), "{from} loops to itself");
            assert!(!allowed_targets(from).is_empty(), "{from} is a dead end");
        }
    }

    #[test]
    fn spot_check_edges() {
        assert!(is_valid(TicketStatus::Submitted, TicketStatus::Assigned));
        assert!(is_valid(TicketStatus::Submitted, TicketStatus::Accepted));
        assert!(is_valid(TicketStatus::InProgress, TicketStatus::Approved));
        assert!(!is_valid(TicketStatus::Submitted, TicketStatus::Closed));
        assert!(!is_valid(TicketStatus::Closed, TicketStatus::Resolved));
        assert!(!is_valid(TicketStatus::Pending, TicketStatus::Approved));
    }

    #[test]
    fn edge_count_matches_table() {
        assert_eq!(edges().count(), 30);
    }
}
