use std::time::Duration;

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

#[test]
fn two_nodes_complete_a_handshake_and_see_each_other() {
    let server_config = RuntimeConfig::new(vec![ConnectionDescription::new(TransportKind::Tcp, "127.0.0.1", 0)]);
    let server = LocalNode::start(server_config).unwrap();
    let server_addr = server.listen_addr().expect("server listens on tcp");

    let client = LocalNode::start(RuntimeConfig::new(Vec::new())).unwrap();
    let desc = ConnectionDescription::new(TransportKind::Tcp, server_addr.ip().to_string(), server_addr.port());

    let server_id = client.connect(&desc).unwrap();
    assert_eq!(server_id, server.id());

    assert!(wait_until(|| server.peer_count() == 1, Duration::from_secs(1)));
    assert!(server.is_connected_to(client.id()));
    assert!(client.is_connected_to(server.id()));

    server.close();
    client.close();
}

#[test]
fn connecting_to_an_unreachable_address_fails() {
    let mut config = RuntimeConfig::new(Vec::new());
    config.timeout_default = relay_timing::Duration::from_millis(50);
    let client = LocalNode::start(config).unwrap();

    // Nothing listens on this port; the one-shot reconnect retry exhausts
    // and `connect` surfaces the underlying connection error.
    let desc = ConnectionDescription::new(TransportKind::Tcp, "127.0.0.1", 1);
    let result = client.connect(&desc);
    assert!(result.is_err());
    client.close();
}
