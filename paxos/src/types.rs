//! Core protocol types: rounds, values, proposals, replica identifiers.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::num::ParseIntError;
use std::str::FromStr;

use num_bigint::{BigInt, ParseBigIntError};

/// Proposal number. Higher rounds take precedence; comparison is total.
///
/// Rounds are arbitrary-precision: a long-lived deployment that retries with
/// ever-higher rounds must never wrap, so a fixed-width counter is not
/// enough. On the wire a round is a decimal integer of any magnitude.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Round(BigInt);

impl Round {
    #[must_use]
    pub fn new(n: impl Into<BigInt>) -> Self {
        Self(n.into())
    }

    /// The next-higher round, used when re-proposing after a stalled round.
    #[must_use]
    pub fn next(&self) -> Self {
        Self(self.0.clone() + 1)
    }

    /// Whether this round is the wire sentinel (`-1`) that stands for
    /// "no prior accepted proposal" in `promise` messages.
    #[must_use]
    pub(crate) fn is_wire_none(&self) -> bool {
        self.0 == BigInt::from(-1)
    }

    /// The wire sentinel round. Only ever encoded, never stored.
    #[must_use]
    pub(crate) fn wire_none() -> Self {
        Self(BigInt::from(-1))
    }
}

impl fmt::Display for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for Round {
    type Err = ParseBigIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<BigInt>().map(Self)
    }
}

/// The payload under agreement. The protocol never looks inside a value;
/// only equality matters.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Value(pub i64);

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for Value {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>().map(Self)
    }
}

/// A numbered proposal: what a proposer offers and what an acceptor records.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Proposal {
    pub round: Round,
    pub value: Value,
}

impl Proposal {
    #[must_use]
    pub fn new(round: Round, value: Value) -> Self {
        Self { round, value }
    }
}

impl fmt::Display for Proposal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.round, self.value)
    }
}

/// Stable identifier for a replica, used to deduplicate quorum votes.
///
/// Derived from the replica's advertised endpoint, so the same endpoint
/// yields the same id across process restarts. An in-memory object identity
/// would be unsound here: a restarted acceptor would count as a fresh voter.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ReplicaId(u64);

impl ReplicaId {
    /// Pack the endpoint's address and listening port into one integer.
    /// IPv4 fits exactly; IPv6 is folded down to 48 bits first.
    #[must_use]
    pub fn from_endpoint(endpoint: SocketAddr) -> Self {
        let ip_bits: u64 = match endpoint.ip() {
            IpAddr::V4(v4) => u64::from(u32::from(v4)),
            IpAddr::V6(v6) => {
                let raw = u128::from_be_bytes(v6.octets());
                ((raw ^ (raw >> 48) ^ (raw >> 96)) as u64) & 0xFFFF_FFFF_FFFF
            }
        };
        Self((ip_bits << 16) | u64::from(endpoint.port()))
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for ReplicaId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(Self)
    }
}
