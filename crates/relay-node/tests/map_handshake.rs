use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use relay_node::{LocalNode, NodeError, RuntimeConfig};
use relay_object::ChangeManager;
use relay_proto::{ConnectionDescription, ObjectId, TransportKind, Version};
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

fn connected_pair() -> (Arc<LocalNode>, Arc<LocalNode>) {
    let master_config = RuntimeConfig::new(vec![ConnectionDescription::new(TransportKind::Tcp, "127.0.0.1", 0)]);
    let master = LocalNode::start(master_config).unwrap();
    let master_addr = master.listen_addr().unwrap();

    let slave = LocalNode::start(RuntimeConfig::new(Vec::new())).unwrap();
    let desc = ConnectionDescription::new(TransportKind::Tcp, master_addr.ip().to_string(), master_addr.port());
    slave.connect(&desc).unwrap();
    assert!(wait_until(|| master.peer_count() == 1, Duration::from_secs(1)));
    (master, slave)
}

/// Mapping a concrete, still-retained version resolves over the wire and
/// lands the requested version (not just whatever the ring's head was).
#[test]
fn mapping_a_concrete_retained_version_returns_its_data() {
    let (master, slave) = connected_pair();
    let master_obj = master.register_object(ChangeManager::DeltaInstanceMaster { ring_capacity: 4 });
    master_obj.commit(Arc::from(vec![7u8, 8, 9]));
    let target = master_obj.version();

    let slave_obj = slave
        .map_object_sync(
            master_obj.id,
            0,
            master.id(),
            ChangeManager::VersionedSlave,
            target,
            Some(RelayDuration::from_millis(1_000)),
        )
        .unwrap();
    assert_eq!(slave_obj.version(), target);

    master.close();
    slave.close();
}

/// The non-blocking map variant never waits for a concrete version that's
/// still above the master's head — it surfaces the timeout immediately
/// instead of parking the caller.
#[test]
fn mapping_above_head_non_blocking_times_out_promptly() {
    let (master, slave) = connected_pair();
    let master_obj = master.register_object(ChangeManager::DeltaInstanceMaster { ring_capacity: 4 });

    let started = Instant::now();
    let result =
        slave.map_object_nb(master_obj.id, 0, master.id(), ChangeManager::VersionedSlave, Version::concrete(50));
    assert!(matches!(result, Err(NodeError::TimeoutMap)));
    assert!(started.elapsed() < Duration::from_millis(500));

    master.close();
    slave.close();
}

/// Mapping an id the master never registered is denied, not silently
/// queued forever.
#[test]
fn mapping_an_unknown_object_is_denied() {
    let (master, slave) = connected_pair();
    let bogus = ObjectId::random();

    let result = slave.map_object(bogus, 0, master.id(), ChangeManager::VersionedSlave);
    assert!(matches!(result, Err(NodeError::MapDenied(_))));

    master.close();
    slave.close();
}
