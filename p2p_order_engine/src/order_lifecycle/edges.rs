use crate::db_types::OrderStatusType::{self, *};

const PENDING: &[OrderStatusType] = &[Accepted, Cancelled, Disputed, Expired];
const ACCEPTED: &[OrderStatusType] = &[EscrowPending, Cancelled, Disputed, Expired];
const ESCROW_PENDING: &[OrderStatusType] = &[Escrowed, Cancelled, Disputed, Expired];
const ESCROWED: &[OrderStatusType] = &[PaymentPending, Cancelled, Disputed, Expired];
const PAYMENT_PENDING: &[OrderStatusType] = &[PaymentSent, Cancelled, Disputed, Expired];
const PAYMENT_SENT: &[OrderStatusType] = &[PaymentConfirmed, Cancelled, Disputed, Expired];
const PAYMENT_CONFIRMED: &[OrderStatusType] = &[Releasing, Cancelled, Disputed, Expired];
const RELEASING: &[OrderStatusType] = &[Completed, Cancelled, Disputed, Expired];
// A dispute can hand the order back to any pre-dispute stage. Which one is legal for a given order is decided by the
// dispute record, not by this table.
const DISPUTED: &[OrderStatusType] = &[
    Pending,
    Accepted,
    EscrowPending,
    Escrowed,
    PaymentPending,
    PaymentSent,
    PaymentConfirmed,
    Releasing,
    Completed,
    Cancelled,
    Expired,
];
const TERMINAL: &[OrderStatusType] = &[];

/// The statuses reachable from `from` in a single step.
pub fn allowed_targets(from: OrderStatusType) -> &'static [OrderStatusType] {
    match from {
        Pending => PENDING,
        Accepted => ACCEPTED,
        EscrowPending => ESCROW_PENDING,
        Escrowed => ESCROWED,
        PaymentPending => PAYMENT_PENDING,
        PaymentSent => PAYMENT_SENT,
        PaymentConfirmed => PAYMENT_CONFIRMED,
        Releasing => RELEASING,
        Disputed => DISPUTED,
        Completed | Cancelled | Expired => TERMINAL,
    }
}

pub fn is_legal_edge(from: OrderStatusType, to: OrderStatusType) -> bool {
    allowed_targets(from).contains(&to)
}

#[cfg(test)]
mod test {
    use super::*;

    const ALL: [OrderStatusType; 12] = [
        Pending,
        Accepted,
        EscrowPending,
        Escrowed,
        PaymentPending,
        PaymentSent,
        PaymentConfirmed,
        Releasing,
        Completed,
        Cancelled,
        Disputed,
        Expired,
    ];

    #[test]
    fn terminal_states_have_no_exits() {
        for s in ALL.iter().filter(|s| s.is_terminal()) {
            assert!(allowed_targets(*s).is_empty(), "{s} should be terminal");
        }
    }

    #[test]
    fn side_branches_reachable_from_every_live_state() {
        for s in ALL.iter().filter(|s| !s.is_terminal() && **s != Disputed) {
            assert!(is_legal_edge(*s, Cancelled));
            assert!(is_legal_edge(*s, Disputed));
            assert!(is_legal_edge(*s, Expired));
        }
    }

    #[test]
    fn no_skipping_stages() {
        assert!(!is_legal_edge(Pending, Completed));
        assert!(!is_legal_edge(Accepted, Escrowed));
        assert!(!is_legal_edge(PaymentSent, Releasing));
        assert!(!is_legal_edge(Escrowed, Accepted));
    }

    #[test]
    fn happy_path_is_a_chain_of_legal_edges() {
        let path = [
            Pending,
            Accepted,
            EscrowPending,
            Escrowed,
            PaymentPending,
            PaymentSent,
            PaymentConfirmed,
            Releasing,
            Completed,
        ];
        for step in path.windows(2) {
            assert!(is_legal_edge(step[0], step[1]), "{} -> {}", step[0], step[1]);
        }
    }
}
