use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration as StdDuration,
};

use relay_node::{LocalNode, RuntimeConfig};
use relay_proto::{NodeId, ObjectId};
use relay_timing::Duration as RelayDuration;
use tracing::info;

use crate::{
    cli::{BarrierArgs, ConnectArgs, ListenArgs},
    error::CliError,
};

fn parse_id(s: &str) -> Result<u128, CliError> {
    u128::from_str_radix(s, 16).map_err(|_| CliError::BadId(s.to_owned()))
}

/// `relay-ctl listen`: start a bare node and let its own receiver-thread
/// logging (handshake, keep-alive, peer churn) surface at whatever level the
/// caller's `RUST_LOG` selects, until interrupted.
pub fn run_listen(args: ListenArgs) -> Result<(), CliError> {
    let config = RuntimeConfig::new(args.bind.clone());
    let node = LocalNode::start(config)?;
    info!(node_id = %node.id(), bind = ?args.bind, "node listening, waiting for peers (Ctrl-C to stop)");

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || flag.store(true, Ordering::Release)).expect("failed to install Ctrl-C handler");

    let mut last_count = node.peer_count();
    while !shutdown.load(Ordering::Acquire) {
        let count = node.peer_count();
        if count != last_count {
            info!(peers = count, "peer count changed");
            last_count = count;
        }
        std::thread::sleep(StdDuration::from_millis(200));
    }

    info!("Ctrl-C received, shutting down");
    node.close();
    Ok(())
}

/// `relay-ctl connect`: Scenario 1 from the testable-properties list, run as
/// an operator smoke check — connect, ping once, report what the node now
/// knows about its peers.
pub fn run_connect(args: ConnectArgs) -> Result<(), CliError> {
    let mut config = RuntimeConfig::new(args.bind.clone());
    config.timeout_default = RelayDuration::from_millis(args.timeout_ms);
    let node = LocalNode::start(config)?;

    let peer_id = node.connect(&args.peer)?;
    info!(peer = %peer_id, "handshake complete");

    let rtt = node.ping(peer_id, Some(RelayDuration::from_millis(args.timeout_ms)))?;
    println!("pong from {peer_id} in {:?}", StdDuration::from(rtt));
    println!("known peers: {:?}", node.peers());

    node.close();
    Ok(())
}

/// `relay-ctl barrier`: a manual harness for scenarios 2-4. Without
/// `--object-id`/`--master` this invocation masters a fresh barrier and
/// prints the id pair an operator pastes into the slave invocations'
/// `--object-id`/`--master` flags; with them it joins as a slave instead.
pub fn run_barrier(args: BarrierArgs) -> Result<(), CliError> {
    let config = RuntimeConfig::new(args.bind.clone());
    let node = LocalNode::start(config)?;

    for peer in &args.peer {
        match node.connect(peer) {
            Ok(id) => info!(peer = %id, %peer, "connected"),
            Err(e) => tracing::warn!(%peer, error = %e, "failed to connect to peer"),
        }
    }

    let timeout = Some(RelayDuration::from_millis(args.timeout_ms));

    let object_id = match (&args.object_id, &args.master) {
        (Some(object_id), Some(master)) => {
            let object_id = ObjectId::from_u128(parse_id(object_id)?);
            let master_id = NodeId::from_u128(parse_id(master)?);
            node.map_barrier(object_id, master_id, args.height);
            object_id
        }
        (None, None) => {
            let (object_id, _barrier) = node.create_barrier(args.height);
            println!("mastering barrier object-id={object_id} master={}", node.id());
            object_id
        }
        _ => return Err(CliError::IncompleteSlaveArgs),
    };

    info!(%object_id, height = args.height, "entering barrier");
    node.enter_barrier(object_id, timeout)?;
    println!("barrier {object_id} released");

    node.close();
    Ok(())
}
