use std::{sync::Arc, time::Duration};

use relay_node::{LocalNode, RuntimeConfig};
use relay_proto::{ConnectionDescription, TransportKind};

fn wait_until(mut cond: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

fn connected_pair() -> (Arc<LocalNode>, Arc<LocalNode>) {
    let server_config = RuntimeConfig::new(vec![ConnectionDescription::new(TransportKind::Tcp, "127.0.0.1", 0)]);
    let server = LocalNode::start(server_config).unwrap();
    let server_addr = server.listen_addr().unwrap();

    let client = LocalNode::start(RuntimeConfig::new(Vec::new())).unwrap();
    let desc = ConnectionDescription::new(TransportKind::Tcp, server_addr.ip().to_string(), server_addr.port());
    client.connect(&desc).unwrap();
    assert!(wait_until(|| server.peer_count() == 1, Duration::from_secs(1)));
    (server, client)
}

/// A lone acquire against a peer holding no grant is satisfied right away.
#[test]
fn a_single_acquire_grants_immediately() {
    let (server, client) = connected_pair();
    client.acquire_send_token(server.id(), Some(relay_timing::Duration::from_millis(500))).unwrap();
    client.release_send_token(server.id());
    server.close();
    client.close();
}

/// A granter only ever hands out one outstanding token; a second requester
/// queues behind the first until it releases.
#[test]
fn a_second_requester_queues_behind_the_first_until_released() {
    let granter_config = RuntimeConfig::new(vec![ConnectionDescription::new(TransportKind::Tcp, "127.0.0.1", 0)]);
    let granter = LocalNode::start(granter_config).unwrap();
    let addr = granter.listen_addr().unwrap();
    let desc = ConnectionDescription::new(TransportKind::Tcp, addr.ip().to_string(), addr.port());

    let first = LocalNode::start(RuntimeConfig::new(Vec::new())).unwrap();
    first.connect(&desc).unwrap();
    let second = LocalNode::start(RuntimeConfig::new(Vec::new())).unwrap();
    second.connect(&desc).unwrap();
    assert!(wait_until(|| granter.peer_count() == 2, Duration::from_secs(1)));

    first.acquire_send_token(granter.id(), Some(relay_timing::Duration::from_millis(500))).unwrap();

    let second_for_thread = second.clone();
    let granter_id = granter.id();
    let acquired = std::thread::spawn(move || {
        second_for_thread.acquire_send_token(granter_id, Some(relay_timing::Duration::from_millis(2_000)))
    });

    std::thread::sleep(Duration::from_millis(150));
    assert!(!acquired.is_finished(), "second acquire must not be granted while the first holds the token");

    first.release_send_token(granter.id());
    acquired.join().unwrap().unwrap();

    granter.close();
    first.close();
    second.close();
}

/// Releasing a token this node was never granted is a caller bug, flagged
/// rather than swallowed.
#[test]
#[should_panic(expected = "without a held token")]
fn releasing_an_unheld_token_panics_in_debug() {
    let (server, client) = connected_pair();
    client.release_send_token(server.id());
}
