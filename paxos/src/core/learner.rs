//! Pure learner state machine - tallies accept-notifications per round
//!
//! A value is chosen once a quorum of distinct acceptors report having
//! accepted it. Duplicate reports never double-count, and two different
//! values reported for one round is a protocol violation, not a tie to
//! resolve.

use std::collections::{BTreeMap, BTreeSet};

use crate::types::{ReplicaId, Round, Value};

/// Per-round tally of which acceptors reported a learn.
#[derive(Clone, Debug, Eq, PartialEq)]
struct RoundTally {
    reporters: BTreeSet<ReplicaId>,
    value: Value,
    chosen: bool,
}

/// Learner state: one tally per round.
///
/// Tallies are retained after a value is chosen so that late or duplicated
/// learn messages keep answering idempotently. Nothing is garbage-collected
/// for the lifetime of the process.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LearnerCore {
    rounds: BTreeMap<Round, RoundTally>,
}

/// Result of processing one learn report
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LearnOutcome {
    /// Tally advanced (or a duplicate reporter was ignored); no quorum yet.
    Pending { votes: usize },
    /// Quorum just reached - the round's value is now chosen.
    Chosen(Value),
    /// The round was already chosen; repeated learns answer the same way.
    AlreadyChosen(Value),
    /// The reporter announced a different value than the round's tally.
    /// If acceptors are correct this cannot happen, so it is surfaced
    /// instead of overwritten.
    Conflict { existing: Value, reported: Value },
}

impl LearnerCore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a learn report from `reporter` for `round`.
    pub fn on_learn(
        &mut self,
        round: Round,
        reporter: ReplicaId,
        value: Value,
        quorum: usize,
    ) -> LearnOutcome {
        let tally = self.rounds.entry(round).or_insert_with(|| RoundTally {
            reporters: BTreeSet::new(),
            value,
            chosen: false,
        });

        if tally.value != value {
            return LearnOutcome::Conflict {
                existing: tally.value,
                reported: value,
            };
        }
        if tally.chosen {
            return LearnOutcome::AlreadyChosen(tally.value);
        }

        tally.reporters.insert(reporter);
        if tally.reporters.len() >= quorum {
            tally.chosen = true;
            LearnOutcome::Chosen(tally.value)
        } else {
            LearnOutcome::Pending {
                votes: tally.reporters.len(),
            }
        }
    }

    /// The chosen value for `round`, if quorum has been reached.
    #[must_use]
    pub fn chosen(&self, round: &Round) -> Option<Value> {
        self.rounds
            .get(round)
            .filter(|t| t.chosen)
            .map(|t| t.value)
    }

    /// All rounds whose value has been chosen, in round order.
    pub fn chosen_rounds(&self) -> impl Iterator<Item = (&Round, Value)> {
        self.rounds
            .iter()
            .filter(|(_, t)| t.chosen)
            .map(|(r, t)| (r, t.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(n: i64) -> Round {
        Round::new(n)
    }

    fn reporter(n: u16) -> ReplicaId {
        ReplicaId::from_endpoint(format!("10.0.0.2:{n}").parse().unwrap())
    }

    #[test]
    fn chosen_at_quorum_of_distinct_reporters() {
        let mut core = LearnerCore::new();
        assert_eq!(
            core.on_learn(r(1), reporter(1), Value(42), 2),
            LearnOutcome::Pending { votes: 1 }
        );
        assert_eq!(
            core.on_learn(r(1), reporter(2), Value(42), 2),
            LearnOutcome::Chosen(Value(42))
        );
        assert_eq!(core.chosen(&r(1)), Some(Value(42)));
    }

    #[test]
    fn duplicate_reporter_does_not_advance() {
        let mut core = LearnerCore::new();
        core.on_learn(r(1), reporter(1), Value(42), 2);
        assert_eq!(
            core.on_learn(r(1), reporter(1), Value(42), 2),
            LearnOutcome::Pending { votes: 1 }
        );
        assert_eq!(core.chosen(&r(1)), None);
    }

    #[test]
    fn learns_after_choice_are_idempotent() {
        let mut core = LearnerCore::new();
        core.on_learn(r(1), reporter(1), Value(42), 1);
        assert_eq!(
            core.on_learn(r(1), reporter(2), Value(42), 1),
            LearnOutcome::AlreadyChosen(Value(42))
        );
    }

    #[test]
    fn conflicting_value_is_surfaced_not_overwritten() {
        let mut core = LearnerCore::new();
        core.on_learn(r(1), reporter(1), Value(42), 3);
        assert_eq!(
            core.on_learn(r(1), reporter(2), Value(7), 3),
            LearnOutcome::Conflict {
                existing: Value(42),
                reported: Value(7)
            }
        );
        // The conflicting reporter did not join the tally.
        assert_eq!(
            core.on_learn(r(1), reporter(3), Value(42), 3),
            LearnOutcome::Pending { votes: 2 }
        );
    }

    #[test]
    fn rounds_tally_independently() {
        let mut core = LearnerCore::new();
        core.on_learn(r(1), reporter(1), Value(1), 2);
        core.on_learn(r(2), reporter(1), Value(2), 2);
        assert_eq!(core.chosen(&r(1)), None);
        assert_eq!(core.chosen(&r(2)), None);
        core.on_learn(r(2), reporter(2), Value(2), 2);
        assert_eq!(core.chosen(&r(2)), Some(Value(2)));
        assert_eq!(core.chosen_rounds().count(), 1);
    }
}
