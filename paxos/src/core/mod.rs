//! Pure state machine cores for the three Paxos roles - no I/O, no async
//!
//! These contain every state transition of the protocol. The dispatcher in
//! [`crate::node`] drives them from decoded datagrams and turns their
//! outcomes into outbound messages; tests drive them directly.
//!
//! # Modules
//!
//! - [`acceptor`]: Acceptor state machine ([`AcceptorCore`])
//! - [`proposer`]: Proposer promise aggregation ([`ProposerCore`])
//! - [`learner`]: Learner quorum tally ([`LearnerCore`])

pub(crate) mod acceptor;
pub(crate) mod learner;
pub(crate) mod proposer;

pub use acceptor::{AcceptOutcome, AcceptorCore, PrepareOutcome};
pub use learner::{LearnOutcome, LearnerCore};
pub use proposer::{PromiseOutcome, ProposerCore};
