use clap::Parser;
use relay_ctl::{run_barrier, run_connect, run_listen, Cli, Command};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Listen(args) => run_listen(args),
        Command::Connect(args) => run_connect(args),
        Command::Barrier(args) => run_barrier(args),
    };

    if let Err(e) = result {
        eprintln!("relay-ctl: {e}");
        std::process::exit(1);
    }
}
