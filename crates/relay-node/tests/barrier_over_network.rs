use std::time::Duration;

use relay_node::{LocalNode, RuntimeConfig};
use relay_proto::{ConnectionDescription, TransportKind};
use relay_timing::Duration as RelayDuration;

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

/// Two connected nodes rendezvous at a height-2 barrier mastered by one of
/// them, each blocking in `enter_barrier` on its own thread until both have
/// arrived.
#[test]
fn two_nodes_release_each_other_from_a_networked_barrier() {
    let master_config =
        RuntimeConfig::new(vec![ConnectionDescription::new(TransportKind::Tcp, "127.0.0.1", 0)]);
    let master = LocalNode::start(master_config).unwrap();
    let master_addr = master.listen_addr().unwrap();

    let slave = LocalNode::start(RuntimeConfig::new(Vec::new())).unwrap();
    let desc = ConnectionDescription::new(TransportKind::Tcp, master_addr.ip().to_string(), master_addr.port());
    slave.connect(&desc).unwrap();
    assert!(wait_until(|| master.peer_count() == 1, Duration::from_secs(1)));

    let (object_id, _barrier) = master.create_barrier(2);
    slave.map_barrier(object_id, master.id(), 2);

    let master_for_thread = master.clone();
    let master_entered = std::thread::spawn(move || {
        master_for_thread.enter_barrier(object_id, Some(RelayDuration::from_millis(2_000)))
    });

    std::thread::sleep(Duration::from_millis(50));
    slave.enter_barrier(object_id, Some(RelayDuration::from_millis(2_000))).unwrap();

    master_entered.join().unwrap().unwrap();

    master.close();
    slave.close();
}
