//! Pure acceptor state machine - no I/O, no async
//!
//! The acceptor is the authority of the protocol: once it has promised a
//! round, it never honors anything lower.

use crate::types::{Proposal, Round, Value};

/// Acceptor state for a single decree.
///
/// Tracks the highest round promised and the highest proposal accepted.
/// Both advance monotonically for the lifetime of the process; there is no
/// rollback path.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AcceptorCore {
    /// Highest round for which a promise was issued.
    promised: Option<Round>,
    /// Highest-numbered proposal accepted so far.
    accepted: Option<Proposal>,
}

/// Result of handling a Prepare request
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PrepareOutcome {
    /// Promised - the acceptor will ignore anything below this round.
    /// Carries the previously accepted proposal, which the proposer must
    /// consider adopting.
    Promised { prior: Option<Proposal> },
    /// The round is not above the highest promise; nothing changed.
    Ignored,
}

/// Result of handling an Accept request
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AcceptOutcome {
    /// Accepted and recorded as the highest accepted proposal.
    Accepted(Proposal),
    /// The round is below the highest promise; the request is dropped.
    Ignored,
}

impl AcceptorCore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle a Prepare: promise iff `round` is strictly above every round
    /// promised so far, and disclose the prior accepted proposal.
    ///
    /// The strict `>` means a duplicate prepare for an already-promised
    /// round is ignored rather than re-promised.
    pub fn prepare(&mut self, round: Round) -> PrepareOutcome {
        if self.promised.as_ref().is_some_and(|p| round <= *p) {
            return PrepareOutcome::Ignored;
        }
        self.promised = Some(round);
        PrepareOutcome::Promised {
            prior: self.accepted.clone(),
        }
    }

    /// Handle an Accept: accept iff `round` is at least the highest promise.
    ///
    /// `>=` rather than `>`: the proposer that just won promises for round R
    /// left this acceptor with `promised == R`, and its Accept(R, _) must
    /// still go through.
    pub fn accept(&mut self, round: Round, value: Value) -> AcceptOutcome {
        if self.promised.as_ref().is_some_and(|p| round < *p) {
            return AcceptOutcome::Ignored;
        }
        let proposal = Proposal::new(round.clone(), value);
        self.promised = Some(round);
        self.accepted = Some(proposal.clone());
        AcceptOutcome::Accepted(proposal)
    }

    #[must_use]
    pub fn highest_promised(&self) -> Option<&Round> {
        self.promised.as_ref()
    }

    #[must_use]
    pub fn highest_accepted(&self) -> Option<&Proposal> {
        self.accepted.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(n: i64) -> Round {
        Round::new(n)
    }

    #[test]
    fn prepare_empty_promises() {
        let mut core = AcceptorCore::new();
        let outcome = core.prepare(r(1));
        assert_eq!(outcome, PrepareOutcome::Promised { prior: None });
        assert_eq!(core.highest_promised(), Some(&r(1)));
    }

    #[test]
    fn prepare_higher_succeeds() {
        let mut core = AcceptorCore::new();
        core.prepare(r(1));
        let outcome = core.prepare(r(2));
        assert!(matches!(outcome, PrepareOutcome::Promised { .. }));
        assert_eq!(core.highest_promised(), Some(&r(2)));
    }

    #[test]
    fn prepare_lower_or_equal_ignored() {
        let mut core = AcceptorCore::new();
        core.prepare(r(2));
        assert_eq!(core.prepare(r(1)), PrepareOutcome::Ignored);
        assert_eq!(core.prepare(r(2)), PrepareOutcome::Ignored);
        // State unchanged
        assert_eq!(core.highest_promised(), Some(&r(2)));
    }

    #[test]
    fn prepare_discloses_prior_accepted() {
        let mut core = AcceptorCore::new();
        core.prepare(r(1));
        core.accept(r(1), Value(7));
        let outcome = core.prepare(r(5));
        assert_eq!(
            outcome,
            PrepareOutcome::Promised {
                prior: Some(Proposal::new(r(1), Value(7)))
            }
        );
    }

    #[test]
    fn accept_at_promised_round_succeeds() {
        let mut core = AcceptorCore::new();
        core.prepare(r(3));
        let outcome = core.accept(r(3), Value(42));
        assert_eq!(
            outcome,
            AcceptOutcome::Accepted(Proposal::new(r(3), Value(42)))
        );
        assert_eq!(core.highest_accepted(), Some(&Proposal::new(r(3), Value(42))));
    }

    #[test]
    fn accept_below_promise_ignored() {
        let mut core = AcceptorCore::new();
        core.prepare(r(5));
        assert_eq!(core.accept(r(3), Value(42)), AcceptOutcome::Ignored);
        assert_eq!(core.highest_accepted(), None);
    }

    #[test]
    fn accept_without_prepare_succeeds() {
        // A fresh acceptor has promised nothing, so any accept is in order.
        let mut core = AcceptorCore::new();
        let outcome = core.accept(r(1), Value(9));
        assert!(matches!(outcome, AcceptOutcome::Accepted(_)));
        assert_eq!(core.highest_promised(), Some(&r(1)));
    }

    #[test]
    fn accept_advances_promise() {
        let mut core = AcceptorCore::new();
        core.prepare(r(1));
        core.accept(r(4), Value(1));
        // The accept at round 4 raised the promise bar as well.
        assert_eq!(core.prepare(r(3)), PrepareOutcome::Ignored);
    }

    #[test]
    fn monotonic_across_interleavings() {
        let mut core = AcceptorCore::new();
        assert!(matches!(core.prepare(r(10)), PrepareOutcome::Promised { .. }));
        assert_eq!(core.prepare(r(9)), PrepareOutcome::Ignored);
        assert!(matches!(core.accept(r(10), Value(1)), AcceptOutcome::Accepted(_)));
        assert_eq!(core.accept(r(9), Value(2)), AcceptOutcome::Ignored);
        assert_eq!(core.highest_accepted(), Some(&Proposal::new(r(10), Value(1))));
    }
}
