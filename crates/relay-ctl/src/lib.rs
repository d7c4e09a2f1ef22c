//! Library half of the `relay-ctl` operator binary: argument types and
//! command bodies, kept separate from `main.rs` (the `flux-ctl` split) so the
//! subcommands can be driven directly without spawning a process.

mod cli;
mod commands;
mod error;

pub use cli::{BarrierArgs, Cli, Command, ConnectArgs, ListenArgs};
pub use commands::{run_barrier, run_connect, run_listen};
pub use error::CliError;
