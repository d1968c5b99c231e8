//! REPL command handling for the interactive node.
//!
//! Each command maps onto one core operation: role activation, peer
//! connection, round initiation, or the port/announce controls.

use std::fmt::Write;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use dgram_paxos::{Outbound, PaxosNode, Role, Round, UdpTransport, Value, wire};
use tracing::warn;

/// How long one receive poll blocks before the loop looks at control
/// actions and retry deadlines again.
const POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Everything the event loop owns: the node state machine and its socket.
pub struct NodeContext {
    node: PaxosNode,
    transport: UdpTransport,
    advertised_ip: IpAddr,
}

impl NodeContext {
    #[must_use]
    pub fn new(node: PaxosNode, transport: UdpTransport, advertised_ip: IpAddr) -> Self {
        Self {
            node,
            transport,
            advertised_ip,
        }
    }

    #[must_use]
    pub fn announce(&self) -> String {
        format!("hosting at {}:{}", self.advertised_ip, self.transport.port())
    }

    /// Execute a REPL command
    pub async fn execute(&mut self, line: &str) -> Result<String, String> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            return Ok(String::new());
        }

        match parts[0] {
            "help" | "?" => Ok(Self::help()),
            "port" => match &parts[1..] {
                [] => Ok(self.announce()),
                [port] => {
                    let port: u16 = port.parse().map_err(|_| "Usage: port [number]")?;
                    self.cmd_port(port).await
                }
                _ => Err("Usage: port [number]".to_owned()),
            },
            "add" => match &parts[1..] {
                [] => Ok(self.announce()),
                [role] => self.cmd_add(role),
                _ => Err("Usage: add [proposer|acceptor|learner]".to_owned()),
            },
            "connect" => match &parts[1..] {
                [ip, port] => self.cmd_connect(ip, port).await,
                _ => Err("Usage: connect <ip> <port>".to_owned()),
            },
            "propose" => match &parts[1..] {
                [round, value] => self.cmd_propose(round, value).await,
                _ => Err("Usage: propose <round> <value>".to_owned()),
            },
            "status" => Ok(self.cmd_status()),
            _ => Err(format!(
                "Unknown command: {}. Type 'help' for available commands.",
                parts[0]
            )),
        }
    }

    fn help() -> String {
        r"Available commands:
  port                       - Announce the current host and port
  port <number>              - Rebind to a port (probes upward if taken)
  add proposer               - Activate the proposer role on this node
  add acceptor               - Activate the acceptor role on this node
  add learner                - Activate the learner role on this node
  connect <ip> <port>        - Announce this node to a peer replica
  propose <round> <value>    - Begin a consensus round (needs the proposer role)
  status                     - Show roles, membership, quorum and chosen values
  help                       - Show this help
  exit / quit                - Exit
"
        .to_owned()
    }

    async fn cmd_port(&mut self, port: u16) -> Result<String, String> {
        self.transport
            .rebind(port)
            .await
            .map_err(|e| format!("Failed to rebind: {e}"))?;
        self.node
            .set_local(SocketAddr::new(self.advertised_ip, self.transport.port()));
        Ok(self.announce())
    }

    fn cmd_add(&mut self, role: &str) -> Result<String, String> {
        let (role, label) = match role {
            "proposer" => (Role::Proposer, "Proposer"),
            "acceptor" => (Role::Acceptor, "Acceptor"),
            "learner" => (Role::Learner, "Learner"),
            other => return Err(format!("Unknown role: {other}")),
        };
        if self.node.activate_role(role) {
            Ok(format!("{label} role added"))
        } else {
            Ok(format!("{label} role was already active"))
        }
    }

    async fn cmd_connect(&mut self, ip: &str, port: &str) -> Result<String, String> {
        let ip: IpAddr = ip.parse().map_err(|_| format!("Invalid address: {ip}"))?;
        let port: u16 = port.parse().map_err(|_| format!("Invalid port: {port}"))?;
        let peer = SocketAddr::new(ip, port);

        let out = self.node.connect(peer);
        self.flush(vec![out]).await;
        Ok(format!("connect sent to {peer}"))
    }

    async fn cmd_propose(&mut self, round: &str, value: &str) -> Result<String, String> {
        let round: Round = round.parse().map_err(|_| format!("Invalid round: {round}"))?;
        let value: Value = value.parse().map_err(|_| format!("Invalid value: {value}"))?;

        let outs = self
            .node
            .propose(round.clone(), value, Instant::now())
            .map_err(|e| e.to_string())?;
        let prepares = outs.len();
        self.flush(outs).await;
        Ok(format!(
            "proposing {value} in round {round}; prepare sent to {prepares} acceptor(s)"
        ))
    }

    fn cmd_status(&self) -> String {
        let mut output = String::new();
        let roles: Vec<&str> = [
            (Role::Proposer, "proposer"),
            (Role::Acceptor, "acceptor"),
            (Role::Learner, "learner"),
        ]
        .into_iter()
        .filter(|(role, _)| self.node.has_role(*role))
        .map(|(_, name)| name)
        .collect();

        let _ = writeln!(output, "Endpoint: {}", self.node.local());
        let _ = writeln!(
            output,
            "Roles: {}",
            if roles.is_empty() {
                "none".to_owned()
            } else {
                roles.join(", ")
            }
        );
        let membership = self.node.membership();
        let _ = writeln!(
            output,
            "Peers: {} ({} replicas, quorum {})",
            membership.peers().count(),
            membership.replica_count(),
            membership.quorum()
        );
        if let Some(round) = self.node.proposer_round() {
            let _ = writeln!(output, "Round under proposal: {round}");
        }

        let chosen = self.node.chosen_values();
        if chosen.is_empty() {
            output.push_str("Chosen: none\n");
        } else {
            output.push_str("Chosen:\n");
            for (round, value) in chosen {
                let _ = writeln!(output, "  round {round} -> {value}");
            }
        }
        output
    }

    /// One turn of the receive loop: poll the socket with the bounded
    /// timeout, dispatch anything that arrived, then evaluate retry
    /// deadlines.
    pub async fn pump(&mut self) {
        if let Some((bytes, source)) = self.transport.recv(POLL_TIMEOUT).await {
            let outs = self.node.handle_datagram(&bytes, source);
            self.flush(outs).await;
        }
        let retries = self.node.check_retry(Instant::now());
        self.flush(retries).await;
    }

    async fn flush(&mut self, outs: Vec<Outbound>) {
        for out in outs {
            let bytes = wire::encode(self.transport.port(), &out.packet);
            if let Err(err) = self.transport.send_to(&bytes, out.dest).await {
                warn!(dest = %out.dest, %err, "send failed");
            }
        }
    }
}
