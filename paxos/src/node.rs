//! Message dispatcher: routes decoded datagrams to the role state machines.
//!
//! A [`PaxosNode`] owns the three optional role cores and the membership
//! registry, and turns each inbound datagram into zero or more [`Outbound`]
//! messages. It performs no I/O itself: the event loop (or a test) hands in
//! raw bytes and sends whatever comes back. All state is mutated from that
//! single caller, so the protocol needs no internal locking.

use std::net::SocketAddr;
use std::time::Instant;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, error, info, warn};

use crate::backoff::BackoffConfig;
use crate::core::{
    AcceptOutcome, AcceptorCore, LearnOutcome, LearnerCore, PrepareOutcome, PromiseOutcome,
    ProposerCore,
};
use crate::membership::{Membership, Role};
use crate::types::{Proposal, ReplicaId, Round, Value};
use crate::wire::{self, Packet};

/// A proposal that failed to reach promise quorum this many times is
/// abandoned rather than retried forever.
const MAX_PROPOSE_ATTEMPTS: u32 = 8;

/// An outbound protocol message for the transport to send.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Outbound {
    pub dest: SocketAddr,
    pub packet: Packet,
}

/// Why a round could not be initiated.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ProposeError {
    #[error("the proposer role is not active on this node")]
    RoleInactive,
}

/// Bookkeeping for re-proposing a stalled round at a higher number.
#[derive(Clone, Copy, Debug)]
struct RetryState {
    value: Value,
    deadline: Instant,
    attempts: u32,
}

/// A single Paxos participant: up to three roles plus membership.
pub struct PaxosNode {
    local: SocketAddr,
    id: ReplicaId,
    membership: Membership,
    /// Whether the proposer role is active. The core itself exists only
    /// while a round is in flight; a promise arriving before any round has
    /// begun must not aggregate toward anything.
    proposer_active: bool,
    proposer: Option<ProposerCore>,
    acceptor: Option<AcceptorCore>,
    learner: Option<LearnerCore>,
    backoff: BackoffConfig,
    rng: StdRng,
    retry: Option<RetryState>,
}

impl PaxosNode {
    /// A node advertising `local` (its reachable IP and listening port),
    /// with no roles active yet.
    #[must_use]
    pub fn new(local: SocketAddr) -> Self {
        Self::with_backoff(local, BackoffConfig::default(), StdRng::from_os_rng())
    }

    /// As [`new`](Self::new) with explicit retry timing and RNG, for
    /// deterministic tests.
    #[must_use]
    pub fn with_backoff(local: SocketAddr, backoff: BackoffConfig, rng: StdRng) -> Self {
        Self {
            local,
            id: ReplicaId::from_endpoint(local),
            membership: Membership::new(local),
            proposer_active: false,
            proposer: None,
            acceptor: None,
            learner: None,
            backoff,
            rng,
            retry: None,
        }
    }

    #[must_use]
    pub fn local(&self) -> SocketAddr {
        self.local
    }

    #[must_use]
    pub fn replica_id(&self) -> ReplicaId {
        self.id
    }

    #[must_use]
    pub fn membership(&self) -> &Membership {
        &self.membership
    }

    #[must_use]
    pub fn has_role(&self, role: Role) -> bool {
        match role {
            Role::Proposer => self.proposer_active,
            Role::Acceptor => self.acceptor.is_some(),
            Role::Learner => self.learner.is_some(),
        }
    }

    /// The round currently under proposal, if any.
    #[must_use]
    pub fn proposer_round(&self) -> Option<&Round> {
        self.proposer.as_ref().map(ProposerCore::round)
    }

    /// Values this node has learned as chosen, in round order.
    #[must_use]
    pub fn chosen_values(&self) -> Vec<(Round, Value)> {
        self.learner
            .as_ref()
            .map(|l| l.chosen_rounds().map(|(r, v)| (r.clone(), v)).collect())
            .unwrap_or_default()
    }

    /// Activate a role on this node, registering the local endpoint in the
    /// corresponding membership set. Returns `false` if it was already
    /// active (the existing state is kept, not reset).
    pub fn activate_role(&mut self, role: Role) -> bool {
        self.membership.activate_local_role(role);
        let newly = match role {
            Role::Proposer => {
                let newly = !self.proposer_active;
                self.proposer_active = true;
                newly
            }
            Role::Acceptor => {
                if self.acceptor.is_some() {
                    false
                } else {
                    self.acceptor = Some(AcceptorCore::new());
                    true
                }
            }
            Role::Learner => {
                if self.learner.is_some() {
                    false
                } else {
                    self.learner = Some(LearnerCore::new());
                    true
                }
            }
        };
        if newly {
            info!(?role, "role activated");
        }
        newly
    }

    /// The local endpoint changed (port rebind): update the advertised
    /// address, the replica id, and the membership sets that tracked it.
    pub fn set_local(&mut self, local: SocketAddr) {
        self.local = local;
        self.id = ReplicaId::from_endpoint(local);
        self.membership.set_local(local);
    }

    /// The `connect <ip> <port>` control action: announce ourselves to a
    /// peer. Membership is updated when the peer echoes back.
    #[must_use]
    pub fn connect(&self, peer: SocketAddr) -> Outbound {
        Outbound {
            dest: peer,
            packet: Packet::Connect,
        }
    }

    /// Begin a round as proposer: reset the aggregation state, arm the
    /// retry deadline, and broadcast `prepare` to every known acceptor.
    ///
    /// # Errors
    ///
    /// [`ProposeError::RoleInactive`] if the proposer role was never
    /// activated on this node.
    pub fn propose(
        &mut self,
        round: Round,
        value: Value,
        now: Instant,
    ) -> Result<Vec<Outbound>, ProposeError> {
        if !self.proposer_active {
            return Err(ProposeError::RoleInactive);
        }
        info!(%round, %value, "beginning round");
        self.proposer = Some(ProposerCore::new(round.clone(), value));
        self.retry = Some(RetryState {
            value,
            deadline: now + self.backoff.duration(0, &mut self.rng),
            attempts: 0,
        });

        let targets: Vec<_> = self.membership.acceptors().collect();
        if targets.is_empty() {
            warn!("no known acceptors; the prepare broadcast goes nowhere");
        }
        Ok(to_all(targets, Packet::Prepare { round, value }))
    }

    /// Evaluate the retry deadline. When a proposed round has not reached
    /// promise quorum in time, re-propose the same value under the next
    /// higher round, with jittered exponential backoff between attempts.
    pub fn check_retry(&mut self, now: Instant) -> Vec<Outbound> {
        let Some(mut retry) = self.retry.take() else {
            return Vec::new();
        };
        if now < retry.deadline {
            self.retry = Some(retry);
            return Vec::new();
        }

        retry.attempts += 1;
        if retry.attempts >= MAX_PROPOSE_ATTEMPTS {
            warn!(
                attempts = retry.attempts,
                "round never reached quorum; abandoning proposal"
            );
            return Vec::new();
        }
        let Some(proposer) = &self.proposer else {
            return Vec::new();
        };

        let round = proposer.round().next();
        let value = retry.value;
        warn!(%round, attempt = retry.attempts, "quorum not reached in time; retrying with higher round");

        retry.deadline = now + self.backoff.duration(retry.attempts, &mut self.rng);
        self.retry = Some(retry);
        self.proposer = Some(ProposerCore::new(round.clone(), value));

        let targets: Vec<_> = self.membership.acceptors().collect();
        to_all(targets, Packet::Prepare { round, value })
    }

    /// Decode and dispatch one inbound datagram, returning the messages to
    /// send in response. Malformed datagrams are logged and dropped; no
    /// state changes and no reply.
    pub fn handle_datagram(&mut self, bytes: &[u8], source: SocketAddr) -> Vec<Outbound> {
        let datagram = match wire::decode(bytes) {
            Ok(d) => d,
            Err(err) => {
                warn!(%source, %err, "dropping malformed datagram");
                return Vec::new();
            }
        };

        // Replies go to the peer's listening socket: source IP plus the
        // port carried in the payload.
        let sender = SocketAddr::new(source.ip(), datagram.sender_port);
        debug!(%sender, packet = %datagram.packet, "received");

        match datagram.packet {
            Packet::Connect => self.on_connect(sender),
            Packet::Prepare { round, value } => self.on_prepare(sender, round, value),
            Packet::Promise { acceptor, prior } => self.on_promise(acceptor, prior),
            Packet::Accept { round, value } => self.on_accept(round, value),
            Packet::Learn {
                acceptor,
                round,
                value,
            } => self.on_learn(acceptor, round, value),
        }
    }

    fn on_connect(&mut self, sender: SocketAddr) -> Vec<Outbound> {
        if self.membership.add_replica(sender) {
            info!(%sender, "connected to replica");
            // Echo so the peer admits us too; it stops echoing once we are
            // already in its membership.
            vec![Outbound {
                dest: sender,
                packet: Packet::Connect,
            }]
        } else {
            debug!(%sender, "already a member");
            Vec::new()
        }
    }

    fn on_prepare(&mut self, sender: SocketAddr, round: Round, value: Value) -> Vec<Outbound> {
        let Some(acceptor) = self.acceptor.as_mut() else {
            debug!("acceptor role not active; dropping prepare");
            return Vec::new();
        };
        info!(%sender, %round, %value, "prepare");
        match acceptor.prepare(round) {
            PrepareOutcome::Promised { prior } => {
                match &prior {
                    Some(p) => info!(prior = %p, "promised; disclosing prior accepted"),
                    None => info!("promised; nothing accepted yet"),
                }
                vec![Outbound {
                    dest: sender,
                    packet: Packet::Promise {
                        acceptor: self.id,
                        prior,
                    },
                }]
            }
            PrepareOutcome::Ignored => {
                info!("prepare below current promise; ignored");
                Vec::new()
            }
        }
    }

    fn on_promise(&mut self, voter: ReplicaId, prior: Option<Proposal>) -> Vec<Outbound> {
        if !self.proposer_active {
            debug!("proposer role not active; dropping promise");
            return Vec::new();
        }
        let Some(proposer) = self.proposer.as_mut() else {
            debug!("no round in flight; dropping promise");
            return Vec::new();
        };
        let quorum = self.membership.quorum();
        match proposer.on_promise(voter, prior, quorum) {
            PromiseOutcome::Pending { votes } => {
                info!(votes, quorum, "promise recorded");
                Vec::new()
            }
            PromiseOutcome::AlreadySatisfied => {
                debug!("round already satisfied; promise is a no-op");
                Vec::new()
            }
            PromiseOutcome::Quorum { round, value } => {
                info!(%round, %value, "promise quorum reached; broadcasting accept");
                self.retry = None;
                let targets: Vec<_> = self.membership.acceptors().collect();
                to_all(targets, Packet::Accept { round, value })
            }
        }
    }

    fn on_accept(&mut self, round: Round, value: Value) -> Vec<Outbound> {
        let Some(acceptor) = self.acceptor.as_mut() else {
            debug!("acceptor role not active; dropping accept");
            return Vec::new();
        };
        info!(%round, %value, "accept");
        match acceptor.accept(round, value) {
            AcceptOutcome::Accepted(proposal) => {
                info!(%proposal, "accepted; notifying learners");
                let targets: Vec<_> = self.membership.learners().collect();
                to_all(
                    targets,
                    Packet::Learn {
                        acceptor: self.id,
                        round: proposal.round,
                        value: proposal.value,
                    },
                )
            }
            AcceptOutcome::Ignored => {
                info!("accept below current promise; ignored");
                Vec::new()
            }
        }
    }

    fn on_learn(&mut self, reporter: ReplicaId, round: Round, value: Value) -> Vec<Outbound> {
        let Some(learner) = self.learner.as_mut() else {
            debug!("learner role not active; dropping learn");
            return Vec::new();
        };
        let quorum = self.membership.quorum();
        match learner.on_learn(round.clone(), reporter, value, quorum) {
            LearnOutcome::Pending { votes } => {
                info!(%round, votes, quorum, "learn recorded; waiting for quorum");
            }
            LearnOutcome::Chosen(value) => {
                info!(%round, %value, "value chosen");
            }
            LearnOutcome::AlreadyChosen(value) => {
                debug!(%round, %value, "value was already chosen");
            }
            LearnOutcome::Conflict { existing, reported } => {
                error!(
                    %round, %existing, %reported, %reporter,
                    "protocol violation: conflicting values learned for one round"
                );
            }
        }
        Vec::new()
    }
}

fn to_all(targets: Vec<SocketAddr>, packet: Packet) -> Vec<Outbound> {
    targets
        .into_iter()
        .map(|dest| Outbound {
            dest,
            packet: packet.clone(),
        })
        .collect()
}
