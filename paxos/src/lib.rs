//! Single-decree Paxos over UDP datagrams
//!
//! This library implements one participant in a Paxos deployment: a node
//! that can fill any combination of the three protocol roles and agree with
//! its peers on one value per round, over a transport that may lose,
//! duplicate, or reorder messages.
//!
//! # Architecture
//!
//! - [`core`]: pure state machines for the three roles - every protocol
//!   transition lives here, with no I/O
//! - [`Membership`]: who the peers are, which role sets they belong to, and
//!   the majority threshold derived from them
//! - [`wire`]: the whitespace-delimited ASCII datagram format
//! - [`PaxosNode`]: the dispatcher tying the above together - datagrams in,
//!   outbound messages back
//! - [`UdpTransport`]: the socket itself
//!
//! # Quick Start
//!
//! ```ignore
//! use dgram_paxos::{PaxosNode, Role, Round, UdpTransport, Value, wire};
//!
//! let mut transport = UdpTransport::bind(24805).await?;
//! let mut node = PaxosNode::new(advertised_addr);
//! node.activate_role(Role::Acceptor);
//!
//! loop {
//!     if let Some((bytes, source)) = transport.recv(POLL_TIMEOUT).await {
//!         for out in node.handle_datagram(&bytes, source) {
//!             let bytes = wire::encode(transport.port(), &out.packet);
//!             transport.send_to(&bytes, out.dest).await?;
//!         }
//!     }
//! }
//! ```

#![warn(clippy::pedantic)]

pub mod backoff;
pub mod core;
mod membership;
mod node;
mod transport;
mod types;
pub mod wire;

pub use backoff::BackoffConfig;
pub use membership::{Membership, Role};
pub use node::{Outbound, PaxosNode, ProposeError};
pub use transport::{TransportError, UdpTransport, local_ip};
pub use types::{Proposal, ReplicaId, Round, Value};
