//! Pure proposer state machine - no I/O, no async
//!
//! Drives phase 1 of a round it initiated: collects promises, applies the
//! adopt-highest-accepted-value rule, and reports the moment quorum is
//! first reached so the caller can issue the phase 2 broadcast exactly once.

use std::collections::BTreeSet;

use crate::types::{Proposal, ReplicaId, Round, Value};

/// Proposer state for the round currently under proposal.
///
/// Re-created by [`ProposerCore::new`] each time the local node begins a new
/// round; promises from earlier rounds are simply forgotten.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProposerCore {
    /// Round under proposal.
    round: Round,
    /// The value this node set out to propose.
    intended: Value,
    /// Acceptors that have promised this round, deduplicated by id.
    promises: BTreeSet<ReplicaId>,
    /// Highest previously-accepted proposal disclosed by any promise so far.
    highest_prior: Option<Proposal>,
    /// Set once quorum has been reached and the accept broadcast issued.
    satisfied: bool,
}

/// Result of processing one promise
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PromiseOutcome {
    /// Not enough distinct promises yet.
    Pending { votes: usize },
    /// Quorum just reached - broadcast Accept(round, value) now. The value
    /// is the highest disclosed prior if any promise carried one, else the
    /// intended value.
    Quorum { round: Round, value: Value },
    /// Quorum was already reached earlier; this promise is a no-op.
    AlreadySatisfied,
}

impl ProposerCore {
    /// Begin a round: fresh promise set, no observed prior.
    #[must_use]
    pub fn new(round: Round, value: Value) -> Self {
        Self {
            round,
            intended: value,
            promises: BTreeSet::new(),
            highest_prior: None,
            satisfied: false,
        }
    }

    #[must_use]
    pub fn round(&self) -> &Round {
        &self.round
    }

    #[must_use]
    pub fn intended_value(&self) -> Value {
        self.intended
    }

    #[must_use]
    pub fn is_satisfied(&self) -> bool {
        self.satisfied
    }

    /// Process a promise from `voter`, carrying the acceptor's previously
    /// accepted proposal if it had one.
    ///
    /// Duplicate voters never advance the count. If any disclosed prior has
    /// a round strictly above every prior seen so far in this aggregation,
    /// its value supersedes the intended one - the classic rule that keeps a
    /// new round from contradicting a possibly-chosen older value.
    pub fn on_promise(
        &mut self,
        voter: ReplicaId,
        prior: Option<Proposal>,
        quorum: usize,
    ) -> PromiseOutcome {
        if self.satisfied {
            return PromiseOutcome::AlreadySatisfied;
        }

        if let Some(p) = prior {
            let supersedes = self
                .highest_prior
                .as_ref()
                .is_none_or(|h| p.round > h.round);
            if supersedes {
                self.highest_prior = Some(p);
            }
        }

        if !self.promises.insert(voter) {
            return PromiseOutcome::Pending {
                votes: self.promises.len(),
            };
        }

        if self.promises.len() >= quorum {
            self.satisfied = true;
            let value = self
                .highest_prior
                .as_ref()
                .map_or(self.intended, |p| p.value);
            PromiseOutcome::Quorum {
                round: self.round.clone(),
                value,
            }
        } else {
            PromiseOutcome::Pending {
                votes: self.promises.len(),
            }
        }
    }
}
