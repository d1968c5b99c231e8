//! Replica membership registry and quorum arithmetic.

use std::collections::BTreeSet;
use std::net::SocketAddr;

use tracing::info;

/// The three protocol roles a replica can fill.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
    Proposer,
    Acceptor,
    Learner,
}

/// Known peers and which role sets they belong to.
///
/// Four monotonically growing sets: every peer, plus one set per role used
/// by the dispatcher to resolve broadcast targets. There is no removal path.
/// A freshly admitted remote replica lands in all four sets - we learn of
/// its existence from a `connect`, not of its roles, so it is assumed to
/// fill them all. The local endpoint joins a role set only when that role is
/// activated here.
///
/// The quorum threshold is recomputed eagerly whenever the acceptor set
/// grows, and takes effect immediately for in-flight aggregations. Changing
/// the threshold mid-round is not safe under classical Paxos; this design
/// accepts that (membership reconfiguration as its own agreed-upon decree is
/// out of scope).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Membership {
    local: SocketAddr,
    peers: BTreeSet<SocketAddr>,
    proposers: BTreeSet<SocketAddr>,
    acceptors: BTreeSet<SocketAddr>,
    learners: BTreeSet<SocketAddr>,
}

impl Membership {
    /// A registry knowing only the local endpoint, with no roles active.
    #[must_use]
    pub fn new(local: SocketAddr) -> Self {
        Self {
            local,
            peers: BTreeSet::from([local]),
            proposers: BTreeSet::new(),
            acceptors: BTreeSet::new(),
            learners: BTreeSet::new(),
        }
    }

    /// Admit a remote replica into all four sets. Idempotent; returns `true`
    /// only on first admission.
    pub fn add_replica(&mut self, endpoint: SocketAddr) -> bool {
        if !self.peers.insert(endpoint) {
            return false;
        }
        self.proposers.insert(endpoint);
        self.acceptors.insert(endpoint);
        self.learners.insert(endpoint);
        info!(
            replicas = self.replica_count(),
            quorum = self.quorum(),
            "reconfigured membership"
        );
        true
    }

    /// Register the local endpoint in a role set. Idempotent.
    pub fn activate_local_role(&mut self, role: Role) {
        let set = match role {
            Role::Proposer => &mut self.proposers,
            Role::Acceptor => &mut self.acceptors,
            Role::Learner => &mut self.learners,
        };
        set.insert(self.local);
    }

    /// Re-home the registry after the local endpoint changed (port rebind).
    /// Every set that held the old endpoint tracks the new one.
    pub fn set_local(&mut self, local: SocketAddr) {
        for set in [
            &mut self.peers,
            &mut self.proposers,
            &mut self.acceptors,
            &mut self.learners,
        ] {
            if set.remove(&self.local) {
                set.insert(local);
            }
        }
        self.local = local;
    }

    /// Replica count: the size of the acceptor set, which is what quorum is
    /// measured against.
    #[must_use]
    pub fn replica_count(&self) -> usize {
        self.acceptors.len()
    }

    /// Majority threshold: `floor(n/2) + 1` of the current replicas.
    #[must_use]
    pub fn quorum(&self) -> usize {
        self.replica_count() / 2 + 1
    }

    #[must_use]
    pub fn local(&self) -> SocketAddr {
        self.local
    }

    #[must_use]
    pub fn contains(&self, endpoint: &SocketAddr) -> bool {
        self.peers.contains(endpoint)
    }

    pub fn peers(&self) -> impl Iterator<Item = SocketAddr> + '_ {
        self.peers.iter().copied()
    }

    pub fn proposers(&self) -> impl Iterator<Item = SocketAddr> + '_ {
        self.proposers.iter().copied()
    }

    pub fn acceptors(&self) -> impl Iterator<Item = SocketAddr> + '_ {
        self.acceptors.iter().copied()
    }

    pub fn learners(&self) -> impl Iterator<Item = SocketAddr> + '_ {
        self.learners.iter().copied()
    }
}
