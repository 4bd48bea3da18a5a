//! Lifecycle tables for reservations and settlements.

use crate::model::{BookingStatus, SettlementStatus};

use super::error::BookingError;

impl BookingStatus {
    /// Outbound edges of the reservation lifecycle.
    pub fn allowed_targets(self) -> &'static [BookingStatus] {
        use BookingStatus::*;
        match self {
            Pending => &[Paid, Confirmed, Cancelled],
            Paid => &[Confirmed, Cancelled],
            Confirmed => &[Completed, Cancelled],
            Cancelled | Completed => &[],
        }
    }

    pub fn can_transition_to(self, to: BookingStatus) -> bool {
        self.allowed_targets().contains(&to)
    }

    /// Validate `self -> to` against the table.
    pub fn transition(self, to: BookingStatus) -> Result<BookingStatus, BookingError> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(BookingError::InvalidTransition { from: self, to })
        }
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_targets().is_empty()
    }

    /// Statuses that count against category capacity.
    pub fn holds_inventory(self) -> bool {
        matches!(
            self,
            BookingStatus::Pending | BookingStatus::Paid | BookingStatus::Confirmed
        )
    }

    /// Guests may only cancel before anything beyond payment has happened.
    pub fn guest_cancellable(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Paid)
    }
}

impl SettlementStatus {
    fn rank(self) -> u8 {
        match self {
            SettlementStatus::Pending => 0,
            SettlementStatus::Processing => 1,
            SettlementStatus::Failed => 2,
            SettlementStatus::Succeeded => 3,
            SettlementStatus::Refunded => 4,
        }
    }

    /// Settlements only move forward: a late failure never downgrades a
    /// success, and nothing leaves `Refunded`.
    pub fn can_advance_to(self, to: SettlementStatus) -> bool {
        to.rank() > self.rank()
    }

    /// A settlement in one of these states blocks opening a new session.
    pub fn blocks_new_session(self) -> bool {
        matches!(
            self,
            SettlementStatus::Pending | SettlementStatus::Processing | SettlementStatus::Succeeded
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use BookingStatus::*;

    const ALL: [BookingStatus; 5] = [Pending, Paid, Confirmed, Cancelled, Completed];

    #[test]
    fn table_edges() {
        assert!(Pending.can_transition_to(Paid));
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Paid.can_transition_to(Confirmed));
        assert!(Paid.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(Completed));
        assert!(Confirmed.can_transition_to(Cancelled));
    }

    #[test]
    fn confirmed_cannot_return_to_pending() {
        assert!(matches!(
            Confirmed.transition(Pending),
            Err(BookingError::InvalidTransition {
                from: Confirmed,
                to: Pending
            })
        ));
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for to in ALL {
            assert!(Cancelled.transition(to).is_err());
            assert!(Completed.transition(to).is_err());
        }
        assert!(Cancelled.is_terminal());
        assert!(Completed.is_terminal());
        assert!(!Paid.is_terminal());
    }

    #[test]
    fn self_transitions_are_rejected() {
        for status in ALL {
            assert!(!status.can_transition_to(status));
        }
    }

    #[test]
    fn inventory_holding_statuses() {
        let holding: Vec<_> = ALL.into_iter().filter(|s| s.holds_inventory()).collect();
        assert_eq!(holding, vec![Pending, Paid, Confirmed]);
    }

    #[test]
    fn settlements_only_move_forward() {
        use SettlementStatus as S;
        assert!(S::Pending.can_advance_to(S::Processing));
        assert!(S::Processing.can_advance_to(S::Failed));
        assert!(S::Failed.can_advance_to(S::Succeeded));
        assert!(S::Succeeded.can_advance_to(S::Refunded));
        assert!(!S::Succeeded.can_advance_to(S::Failed));
        assert!(!S::Succeeded.can_advance_to(S::Succeeded));
        assert!(!S::Refunded.can_advance_to(S::Succeeded));
    }

    #[test]
    fn stale_settlements_do_not_block() {
        use SettlementStatus as S;
        assert!(!S::Failed.blocks_new_session());
        assert!(!S::Refunded.blocks_new_session());
        assert!(S::Processing.blocks_new_session());
    }
}
