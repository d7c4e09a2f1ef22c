use std::sync::{Arc, Mutex};

use relay_node::{LocalNode, PushStream, RuntimeConfig};
use relay_proto::ObjectId;

/// A push tagged with a registered group id is handed straight to that
/// handler rather than touching the object registry at all.
#[test]
fn registered_push_handler_receives_the_pushed_object() {
    let node = LocalNode::start(RuntimeConfig::new(Vec::new())).unwrap();
    let seen: Arc<Mutex<Option<(u32, ObjectId, Vec<u8>)>>> = Arc::new(Mutex::new(None));
    let seen_for_handler = seen.clone();
    node.register_push_handler(
        7,
        Arc::new(move |object_type, object_id, stream| {
            *seen_for_handler.lock().unwrap() = Some((object_type, object_id, stream.data));
        }),
    );

    let from = node.id();
    let object_id = ObjectId::random();
    node.object_push(7, 42, object_id, PushStream { from, data: vec![1, 2, 3] }).unwrap();

    let got = seen.lock().unwrap().take().expect("handler ran");
    assert_eq!(got.0, 42);
    assert_eq!(got.1, object_id);
    assert_eq!(got.2, vec![1, 2, 3]);

    node.close();
}

/// A push for a group with no registered handler falls back to mapping the
/// object by its pushed type, seeding it with the pushed bytes as its
/// first committed version.
#[test]
fn unhandled_push_falls_back_to_mapping_the_object() {
    let node = LocalNode::start(RuntimeConfig::new(Vec::new())).unwrap();
    let from = node.id();
    let object_id = ObjectId::random();

    node.object_push(99, 3, object_id, PushStream { from, data: vec![9, 9] }).unwrap();

    let queue = node.object_queue(object_id);
    assert!(queue.is_some(), "default push installs the object's command queue on map");

    node.close();
}

/// A second push for an id the default handler already mapped is a no-op,
/// not a `DuplicateRegister` error bubbling up to the caller.
#[test]
fn a_repeated_unhandled_push_for_the_same_object_does_not_error() {
    let node = LocalNode::start(RuntimeConfig::new(Vec::new())).unwrap();
    let from = node.id();
    let object_id = ObjectId::random();

    node.object_push(1, 1, object_id, PushStream { from, data: vec![1] }).unwrap();
    node.object_push(1, 1, object_id, PushStream { from, data: vec![2] }).unwrap();

    node.close();
}
