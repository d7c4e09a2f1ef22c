//! Two-node TCP roundtrip: one manager listens, another connects, both send
//! a command through the other's accepted/outbound connection and see it
//! arrive framed on the far side. Exercises scenario 1 (two-node command
//! exchange) end to end through real sockets.

use std::{net::SocketAddr, time::Duration};

use relay_buffers::BufferPool;
use relay_net::{ConnectionHandle, ConnectionManager, PollEvent, TcpConnection};

fn poll_until<F, T>(mgr: &mut ConnectionManager, mut extract: F) -> T
where
    F: FnMut(&PollEvent) -> Option<T>,
{
    for _ in 0..200 {
        let events = mgr.poll(Some(Duration::from_millis(20))).expect("poll");
        for event in &events {
            if let Some(value) = extract(event) {
                return value;
            }
        }
    }
    panic!("expected event did not arrive in time");
}

#[test]
fn client_and_server_exchange_a_framed_command() {
    let pool = BufferPool::new();

    let mut server = ConnectionManager::new(pool.clone()).unwrap();
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let bound = server.listen(addr).unwrap();

    let mut client = ConnectionManager::new(pool).unwrap();
    let client_conn = TcpConnection::connect(bound).unwrap();
    let client_handle = client.add_tcp(client_conn).unwrap();

    let server_handle: ConnectionHandle = poll_until(&mut server, |event| match event {
        PollEvent::Accept(handle, _addr) => Some(*handle),
        _ => None,
    });

    client.send(client_handle, 0, 7, b"ping").unwrap();

    let payload = poll_until(&mut server, |event| match event {
        PollEvent::Command(handle, cmd) if *handle == server_handle => Some(cmd.payload().to_vec()),
        _ => None,
    });
    assert_eq!(payload, b"ping");
}

#[test]
fn closing_one_side_surfaces_a_disconnect_on_the_other() {
    let pool = BufferPool::new();

    let mut server = ConnectionManager::new(pool.clone()).unwrap();
    let bound = server.listen("127.0.0.1:0".parse().unwrap()).unwrap();

    let mut client = ConnectionManager::new(pool).unwrap();
    let client_conn = TcpConnection::connect(bound).unwrap();
    let client_handle = client.add_tcp(client_conn).unwrap();

    poll_until(&mut server, |event| match event {
        PollEvent::Accept(handle, _addr) => Some(*handle),
        _ => None,
    });

    client.close(client_handle);
    drop(client);

    poll_until(&mut server, |event| match event {
        PollEvent::Disconnect(_handle) => Some(()),
        _ => None,
    });
}
