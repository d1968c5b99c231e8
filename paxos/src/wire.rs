//! Text wire format for protocol datagrams.
//!
//! Every datagram is whitespace-delimited ASCII:
//! `<senderPort> <tag> <field> <field> ...`. The sender's reply address is
//! its datagram source IP combined with the carried port - the port is in
//! the payload because replies must reach the peer's listening socket, not
//! whatever ephemeral socket the datagram left from.
//!
//! Round fields are decimal integers of unbounded magnitude. A `promise`
//! with no prior accepted proposal carries the sentinel round `-1` (and a
//! meaningless value field).

use std::fmt;

use crate::types::{Proposal, ReplicaId, Round, Value};

/// A decoded protocol message, minus addressing.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Packet {
    /// Membership announcement; the sender wants to be admitted.
    Connect,
    /// Phase 1a, proposer to acceptor.
    Prepare { round: Round, value: Value },
    /// Phase 1b, acceptor to proposer: a promise plus the acceptor's prior
    /// accepted proposal, if any.
    Promise {
        acceptor: ReplicaId,
        prior: Option<Proposal>,
    },
    /// Phase 2a, proposer to acceptors.
    Accept { round: Round, value: Value },
    /// Phase 2b, acceptor to learners: notification of an accept.
    Learn {
        acceptor: ReplicaId,
        round: Round,
        value: Value,
    },
}

impl Packet {
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Packet::Connect => "connect",
            Packet::Prepare { .. } => "prepare",
            Packet::Promise { .. } => "promise",
            Packet::Accept { .. } => "accept",
            Packet::Learn { .. } => "learn",
        }
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Packet::Connect => f.write_str("connect"),
            Packet::Prepare { round, value } => {
                write!(f, "prepare(round={round}, value={value})")
            }
            Packet::Promise { acceptor, prior } => match prior {
                Some(p) => write!(f, "promise(acceptor={acceptor}, prior={p})"),
                None => write!(f, "promise(acceptor={acceptor}, prior=none)"),
            },
            Packet::Accept { round, value } => {
                write!(f, "accept(round={round}, value={value})")
            }
            Packet::Learn {
                acceptor,
                round,
                value,
            } => write!(f, "learn(acceptor={acceptor}, round={round}, value={value})"),
        }
    }
}

/// A decoded datagram: the packet plus the sender's listening port.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Datagram {
    pub sender_port: u16,
    pub packet: Packet,
}

/// Why a datagram failed to decode. Offenders are logged and dropped;
/// decoding never aborts the receive loop.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum WireError {
    #[error("datagram is not valid UTF-8")]
    NotText,
    #[error("empty datagram")]
    Empty,
    #[error("invalid sender port {0:?}")]
    BadPort(String),
    #[error("unknown tag {0:?}")]
    UnknownTag(String),
    #[error("tag {tag:?} expects {expected} fields, got {got}")]
    WrongArity {
        tag: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("invalid integer field {0:?}")]
    BadInt(String),
}

/// Encode a packet for the wire, stamping the local listening port.
#[must_use]
pub fn encode(sender_port: u16, packet: &Packet) -> Vec<u8> {
    let text = match packet {
        Packet::Connect => format!("{sender_port} connect"),
        Packet::Prepare { round, value } => {
            format!("{sender_port} prepare {round} {value}")
        }
        Packet::Promise { acceptor, prior } => {
            let (round, value) = match prior {
                Some(p) => (p.round.clone(), p.value),
                None => (Round::wire_none(), Value(0)),
            };
            format!("{sender_port} promise {acceptor} {round} {value}")
        }
        Packet::Accept { round, value } => {
            format!("{sender_port} accept {round} {value}")
        }
        Packet::Learn {
            acceptor,
            round,
            value,
        } => format!("{sender_port} learn {acceptor} {round} {value}"),
    };
    text.into_bytes()
}

/// Decode a raw datagram.
///
/// # Errors
///
/// Returns a [`WireError`] describing the first thing wrong with the
/// payload: encoding, port, tag, arity, or a non-numeric field.
pub fn decode(bytes: &[u8]) -> Result<Datagram, WireError> {
    let text = std::str::from_utf8(bytes).map_err(|_| WireError::NotText)?;
    let mut tokens = text.split_whitespace();

    let port_token = tokens.next().ok_or(WireError::Empty)?;
    let sender_port: u16 = port_token
        .parse()
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| WireError::BadPort(port_token.to_owned()))?;

    let tag = tokens.next().ok_or(WireError::Empty)?;
    let fields: Vec<&str> = tokens.collect();

    let packet = match tag {
        "connect" => {
            expect_arity("connect", &fields, 0)?;
            Packet::Connect
        }
        "prepare" => {
            expect_arity("prepare", &fields, 2)?;
            Packet::Prepare {
                round: parse_round(fields[0])?,
                value: parse_value(fields[1])?,
            }
        }
        "promise" => {
            expect_arity("promise", &fields, 3)?;
            let acceptor = parse_replica(fields[0])?;
            let round = parse_round(fields[1])?;
            let value = parse_value(fields[2])?;
            let prior = if round.is_wire_none() {
                None
            } else {
                Some(Proposal::new(round, value))
            };
            Packet::Promise { acceptor, prior }
        }
        "accept" => {
            expect_arity("accept", &fields, 2)?;
            Packet::Accept {
                round: parse_round(fields[0])?,
                value: parse_value(fields[1])?,
            }
        }
        "learn" => {
            expect_arity("learn", &fields, 3)?;
            Packet::Learn {
                acceptor: parse_replica(fields[0])?,
                round: parse_round(fields[1])?,
                value: parse_value(fields[2])?,
            }
        }
        other => return Err(WireError::UnknownTag(other.to_owned())),
    };

    Ok(Datagram {
        sender_port,
        packet,
    })
}

fn expect_arity(tag: &'static str, fields: &[&str], expected: usize) -> Result<(), WireError> {
    if fields.len() == expected {
        Ok(())
    } else {
        Err(WireError::WrongArity {
            tag,
            expected,
            got: fields.len(),
        })
    }
}

fn parse_round(token: &str) -> Result<Round, WireError> {
    token
        .parse()
        .map_err(|_| WireError::BadInt(token.to_owned()))
}

fn parse_value(token: &str) -> Result<Value, WireError> {
    token
        .parse()
        .map_err(|_| WireError::BadInt(token.to_owned()))
}

fn parse_replica(token: &str) -> Result<ReplicaId, WireError> {
    token
        .parse()
        .map_err(|_| WireError::BadInt(token.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(packet: Packet) {
        let bytes = encode(24805, &packet);
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.sender_port, 24805);
        assert_eq!(decoded.packet, packet);
    }

    #[test]
    fn connect_round_trips() {
        round_trip(Packet::Connect);
    }

    #[test]
    fn prepare_round_trips_with_huge_round() {
        round_trip(Packet::Prepare {
            round: "340282366920938463463374607431768211456".parse().unwrap(), // 2^128
            value: Value(42),
        });
    }

    #[test]
    fn promise_with_prior_round_trips() {
        round_trip(Packet::Promise {
            acceptor: ReplicaId::from_endpoint("10.0.0.3:9000".parse().unwrap()),
            prior: Some(Proposal::new(Round::new(1), Value(7))),
        });
    }

    #[test]
    fn promise_without_prior_uses_sentinel() {
        let packet = Packet::Promise {
            acceptor: ReplicaId::from_endpoint("10.0.0.3:9000".parse().unwrap()),
            prior: None,
        };
        let bytes = encode(5000, &packet);
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.ends_with("-1 0"), "got {text:?}");
        assert_eq!(decode(&bytes).unwrap().packet, packet);
    }

    #[test]
    fn learn_round_trips() {
        round_trip(Packet::Learn {
            acceptor: ReplicaId::from_endpoint("10.0.0.3:9000".parse().unwrap()),
            round: Round::new(3),
            value: Value(-5),
        });
    }

    #[test]
    fn garbage_is_a_bad_port() {
        assert_eq!(
            decode(b"abc garbage xyz"),
            Err(WireError::BadPort("abc".to_owned()))
        );
    }

    #[test]
    fn empty_and_portless_datagrams_fail() {
        assert_eq!(decode(b""), Err(WireError::Empty));
        assert_eq!(decode(b"   "), Err(WireError::Empty));
        assert_eq!(decode(b"9000"), Err(WireError::Empty));
    }

    #[test]
    fn unknown_tag_fails() {
        assert_eq!(
            decode(b"9000 gossip 1 2"),
            Err(WireError::UnknownTag("gossip".to_owned()))
        );
    }

    #[test]
    fn wrong_arity_fails() {
        assert_eq!(
            decode(b"9000 prepare 1"),
            Err(WireError::WrongArity {
                tag: "prepare",
                expected: 2,
                got: 1
            })
        );
        assert_eq!(
            decode(b"9000 connect now"),
            Err(WireError::WrongArity {
                tag: "connect",
                expected: 0,
                got: 1
            })
        );
    }

    #[test]
    fn non_numeric_field_fails() {
        assert_eq!(
            decode(b"9000 accept one 2"),
            Err(WireError::BadInt("one".to_owned()))
        );
    }

    #[test]
    fn non_utf8_fails() {
        assert_eq!(decode(&[0xff, 0xfe, 0x20]), Err(WireError::NotText));
    }
}
