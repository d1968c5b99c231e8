//! Interactive Paxos replica.
//!
//! Binds a UDP endpoint, then runs a REPL for role activation, peer
//! connection and round initiation while a single event loop drives the
//! protocol dispatcher.

use std::net::SocketAddr;

use clap::Parser;
use dgram_paxos::{PaxosNode, UdpTransport, local_ip};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

mod repl;

use repl::NodeContext;

#[derive(Parser, Debug)]
#[command(name = "paxos-node")]
#[command(about = "Run an interactive Paxos replica over UDP")]
struct Args {
    /// UDP port to listen on; probes upward if the port is taken
    #[arg(short, long, default_value_t = 24805)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    println!("==================== PAXOS ====================");

    let transport = UdpTransport::bind(args.port).await?;
    let ip = local_ip();
    let advertised = SocketAddr::new(ip, transport.port());
    let node = PaxosNode::new(advertised);
    let mut ctx = NodeContext::new(node, transport, ip);

    println!("{}", ctx.announce());
    println!("Type 'help' for available commands.\n");

    let (cmd_tx, mut cmd_rx) = mpsc::channel::<String>(1);
    let (resp_tx, mut resp_rx) = mpsc::channel::<Result<String, String>>(1);

    let mut rl = DefaultEditor::new()?;
    tokio::task::spawn_blocking(move || {
        loop {
            match rl.readline("paxos> ") {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    if line == "exit" || line == "quit" {
                        break;
                    }

                    let _ = rl.add_history_entry(line);
                    if cmd_tx.blocking_send(line.to_owned()).is_err() {
                        break;
                    }

                    match resp_rx.blocking_recv() {
                        Some(Ok(output)) if !output.is_empty() => println!("{output}"),
                        Some(Err(e)) => eprintln!("Error: {e}"),
                        _ => {}
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("Interrupted. Use 'exit' to quit.");
                }
                Err(ReadlineError::Eof) => {
                    println!("Goodbye!");
                    break;
                }
                Err(e) => {
                    eprintln!("Readline error: {e}");
                    break;
                }
            }
        }
    });

    // One loop owns all protocol state: commands are applied between
    // receive polls, and the bounded poll timeout is what lets a port
    // change or a retry deadline be noticed while the network is quiet.
    loop {
        match cmd_rx.try_recv() {
            Ok(line) => {
                let res = ctx.execute(&line).await;
                let _ = resp_tx.send(res).await;
            }
            Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => ctx.pump().await,
        }
    }

    Ok(())
}
