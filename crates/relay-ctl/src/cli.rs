use clap::{Args, Parser, Subcommand};
use relay_proto::ConnectionDescription;

/// Operator CLI for a relay node (grounded on `flux-ctl`'s `main.rs`/`lib.rs`
/// split): manual smoke-testing of the handshake, ping, and barrier paths
/// without pulling in the embedding application.
#[derive(Parser, Debug)]
#[command(name = "relay-ctl", about = "Probe and drive a relay node from the command line")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start a bare node and log accepted peers/commands until Ctrl-C.
    Listen(ListenArgs),
    /// Connect to a peer, ping it, and report the round trip and known peers.
    Connect(ConnectArgs),
    /// Join an ad-hoc barrier for manual testing.
    Barrier(BarrierArgs),
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Address(es) to listen on, e.g. `tcp://127.0.0.1:4000`.
    #[arg(long = "bind", required = true)]
    pub bind: Vec<ConnectionDescription>,
}

#[derive(Args, Debug)]
pub struct ConnectArgs {
    /// Address(es) this node listens on; may be empty for an outbound-only run.
    #[arg(long = "bind")]
    pub bind: Vec<ConnectionDescription>,
    /// The peer to connect to and ping.
    #[arg(long = "peer")]
    pub peer: ConnectionDescription,
    /// Deadline for the connect handshake and the ping round trip.
    #[arg(long = "timeout-ms", default_value_t = 5_000)]
    pub timeout_ms: u64,
}

#[derive(Args, Debug)]
pub struct BarrierArgs {
    /// Address(es) this node listens on.
    #[arg(long = "bind")]
    pub bind: Vec<ConnectionDescription>,
    /// Other participants to dial before entering the barrier.
    #[arg(long = "peer")]
    pub peer: Vec<ConnectionDescription>,
    /// Party count the barrier waits for.
    #[arg(long = "height")]
    pub height: u32,
    /// How long `enter` waits before returning `TimeoutBarrier`.
    #[arg(long = "timeout-ms", default_value_t = 5_000)]
    pub timeout_ms: u64,
    /// Joins an existing barrier as a slave instead of mastering a new one;
    /// the hex id printed by the mastering invocation. Must be paired with
    /// `--master`.
    #[arg(long = "object-id", requires = "master")]
    pub object_id: Option<String>,
    /// The master's node id, as printed by the mastering invocation. Must be
    /// paired with `--object-id`.
    #[arg(long = "master", requires = "object_id")]
    pub master: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_connect_subcommand() {
        let cli = Cli::try_parse_from([
            "relay-ctl",
            "connect",
            "--bind",
            "tcp://127.0.0.1:0",
            "--peer",
            "tcp://127.0.0.1:4000",
        ])
        .unwrap();
        let Command::Connect(args) = cli.command else { panic!("expected connect") };
        assert_eq!(args.peer, ConnectionDescription::new(relay_proto::TransportKind::Tcp, "127.0.0.1", 4000));
        assert_eq!(args.timeout_ms, 5_000);
    }

    #[test]
    fn barrier_object_id_requires_master() {
        let err = Cli::try_parse_from([
            "relay-ctl",
            "barrier",
            "--height",
            "3",
            "--object-id",
            "00000000000000000000000000000001",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn parses_listen_with_multiple_binds() {
        let cli = Cli::try_parse_from([
            "relay-ctl",
            "listen",
            "--bind",
            "tcp://127.0.0.1:4000",
            "--bind",
            "tcp://127.0.0.1:4001",
        ])
        .unwrap();
        let Command::Listen(args) = cli.command else { panic!("expected listen") };
        assert_eq!(args.bind.len(), 2);
    }
}
