use std::{
    collections::{HashMap, HashSet, VecDeque},
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc, Mutex, OnceLock, RwLock, Weak,
    },
    thread::JoinHandle,
    time::Duration as StdDuration,
};

use relay_barrier::{Barrier, BarrierError, BarrierTransport};
use relay_buffers::BufferPool;
use relay_dispatch::{CommandQueue, PendingCommands};
use relay_net::{ConnectionHandle, ConnectionManager, EventHandle, PollEvent, TcpConnection};
use relay_object::{AttachedObject, ChangeManager, InstanceCache, InstanceData, ObjectError, ObjectRegistry};
use relay_proto::{
    CommandKind, ConnectionDescription, ControlCommand, ICommand, NodeId, ObjectCommand, ObjectId, TransportKind,
    Version,
};
use relay_timing::{Duration, Instant};
use relay_utils::safe_panic;
use tracing::{debug, trace, warn};

use crate::{
    commands::QueuedCommand,
    config::RuntimeConfig,
    error::NodeError,
    peer::Peer,
    wire::{BarrierEnterPayload, BarrierEnterReplyPayload, HelloPayload, MapObjReplyPayload, MapObjReqPayload},
};

struct PendingConnect {
    tx: mpsc::Sender<Result<NodeId, NodeError>>,
}

/// FIFO grant queue for a node's single outstanding send token, mirroring
/// `_cmdAcquireSendToken`/`_cmdReleaseSendToken`'s one-token-at-a-time
/// protocol: at most one peer holds the token, everyone else waits in line.
#[derive(Default)]
struct SendTokenGrants {
    holder: Option<NodeId>,
    queue: VecDeque<NodeId>,
}

/// A stream of bytes pushed to an [`LocalNode::object_push`] handler ahead
/// of any map request, alongside the peer that pushed it.
pub struct PushStream {
    pub from: NodeId,
    pub data: Vec<u8>,
}

/// A handler registered for a push group id, invoked with the pushed
/// object's type, id and stream whenever that group receives a push this
/// node has no more specific handler for.
pub type PushHandler = Arc<dyn Fn(u32, ObjectId, PushStream) + Send + Sync>;

/// A peer-to-peer node: owns a listening socket (if any), a set of live
/// peer connections, the object registry attached objects dispatch
/// through, and the replicated barriers this node participates in.
///
/// One background thread (§5: the receiver) drives `ConnectionManager::poll`
/// and handles the handshake/keep-alive/barrier-routing control plane
/// inline; application threads interact with attached objects through their
/// own [`CommandQueue`], never touching the network directly.
pub struct LocalNode {
    id: NodeId,
    config: RuntimeConfig,
    manager: Mutex<ConnectionManager>,
    peers: RwLock<HashMap<NodeId, Peer>>,
    handle_to_peer: RwLock<HashMap<ConnectionHandle, NodeId>>,
    pending_connects: Mutex<HashMap<ConnectionHandle, PendingConnect>>,
    objects: ObjectRegistry,
    instance_cache: InstanceCache,
    barriers: RwLock<HashMap<ObjectId, Arc<Barrier>>>,
    object_queues: RwLock<HashMap<ObjectId, CommandQueue<QueuedCommand>>>,
    pending_commands: PendingCommands<QueuedCommand>,
    pending_pings: Mutex<HashMap<NodeId, Vec<mpsc::Sender<()>>>>,
    pending_maps: Mutex<HashMap<ObjectId, mpsc::Sender<MapObjReplyPayload>>>,
    send_token_grants: Mutex<SendTokenGrants>,
    send_token_waiters: Mutex<HashMap<NodeId, VecDeque<mpsc::Sender<()>>>>,
    send_token_held: Mutex<HashSet<NodeId>>,
    push_handlers: RwLock<HashMap<u32, PushHandler>>,
    shutdown: AtomicBool,
    shutdown_event: OnceLock<EventHandle>,
    receiver_thread: Mutex<Option<JoinHandle<()>>>,
    listen_addr: Option<SocketAddr>,
    self_handle: OnceLock<Weak<LocalNode>>,
}

impl LocalNode {
    /// Starts a node: binds the first configured listen address (if any —
    /// `ConnectionManager` supports a single bound listener) and spawns the
    /// receiver thread.
    pub fn start(config: RuntimeConfig) -> Result<Arc<Self>, NodeError> {
        let pool = BufferPool::new();
        let mut manager = ConnectionManager::new(pool).map_err(relay_net::ConnError::Io)?;

        let listen_addr = match config.listen.first() {
            Some(desc) if desc.scheme == TransportKind::Tcp => {
                let addr: SocketAddr = format!("{}:{}", desc.host, desc.port)
                    .parse()
                    .map_err(|_| NodeError::Protocol(format!("invalid listen address: {desc}")))?;
                Some(manager.listen(addr)?)
            }
            Some(desc) => {
                return Err(NodeError::Protocol(format!("unsupported listen transport: {}", desc.scheme)));
            }
            None => None,
        };

        let (_, shutdown_event) = manager.add_self_event().map_err(relay_net::ConnError::Io)?;

        let node = Arc::new(Self {
            id: NodeId::random(),
            instance_cache: InstanceCache::new(config.instance_cache_enabled),
            config,
            manager: Mutex::new(manager),
            peers: RwLock::new(HashMap::new()),
            handle_to_peer: RwLock::new(HashMap::new()),
            pending_connects: Mutex::new(HashMap::new()),
            objects: ObjectRegistry::new(),
            barriers: RwLock::new(HashMap::new()),
            object_queues: RwLock::new(HashMap::new()),
            pending_commands: PendingCommands::new(),
            pending_pings: Mutex::new(HashMap::new()),
            pending_maps: Mutex::new(HashMap::new()),
            send_token_grants: Mutex::new(SendTokenGrants::default()),
            send_token_waiters: Mutex::new(HashMap::new()),
            send_token_held: Mutex::new(HashSet::new()),
            push_handlers: RwLock::new(HashMap::new()),
            shutdown: AtomicBool::new(false),
            shutdown_event: OnceLock::new(),
            receiver_thread: Mutex::new(None),
            listen_addr,
            self_handle: OnceLock::new(),
        });
        let _ = node.shutdown_event.set(shutdown_event);
        let _ = node.self_handle.set(Arc::downgrade(&node));

        let receiver = Arc::clone(&node);
        let handle = std::thread::Builder::new()
            .name("relay-node-recv".into())
            .spawn(move || receiver.run_receiver())
            .expect("failed to spawn receiver thread");
        *node.receiver_thread.lock().unwrap() = Some(handle);

        Ok(node)
    }

    /// Recovers a strong reference to this node from within a `&self`
    /// method, for code paths (the blocking map-resolution worker thread)
    /// that need an owned handle the receiver loop's `&self` signature
    /// doesn't give them directly.
    fn arc(&self) -> Arc<Self> {
        self.self_handle
            .get()
            .and_then(Weak::upgrade)
            .expect("self_handle is set before the receiver thread can observe it")
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn listen_addr(&self) -> Option<SocketAddr> {
        self.listen_addr
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn peer_count(&self) -> usize {
        self.peers.read().unwrap().len()
    }

    pub fn is_connected_to(&self, id: NodeId) -> bool {
        self.peers.read().unwrap().contains_key(&id)
    }

    /// The ids of every handshaken peer, the rough equivalent of the
    /// reference implementation's `LocalNode::getNodes()`.
    pub fn peers(&self) -> Vec<NodeId> {
        self.peers.read().unwrap().keys().copied().collect()
    }

    /// Sends a `Ping` to `peer_id` and blocks until its `Pong` arrives or
    /// `timeout` (falling back to `config().timeout_default`) elapses,
    /// returning the measured round trip.
    pub fn ping(&self, peer_id: NodeId, timeout: Option<Duration>) -> Result<Duration, NodeError> {
        let handle = self.peers.read().unwrap().get(&peer_id).map(|p| p.handle).ok_or(NodeError::UnknownPeer(peer_id))?;

        let (tx, rx) = mpsc::channel();
        self.pending_pings.lock().unwrap().entry(peer_id).or_default().push(tx);

        let start = Instant::now();
        self.send_control(handle, ControlCommand::Ping, &[])?;

        let wait = timeout.unwrap_or(self.config.timeout_default);
        rx.recv_timeout(StdDuration::from(wait)).map_err(|_| NodeError::TimeoutConnect)?;
        Ok(start.elapsed())
    }

    // -- connection lifecycle --------------------------------------------

    /// Opens a TCP connection to `desc` and blocks until the handshake
    /// (`ConnectReq` / `ConnectReply` / `ConnectAck`) completes or
    /// `config().timeout_default` elapses.
    pub fn connect(self: &Arc<Self>, desc: &ConnectionDescription) -> Result<NodeId, NodeError> {
        if desc.scheme != TransportKind::Tcp {
            return Err(NodeError::Protocol(format!("unsupported transport for connect: {}", desc.scheme)));
        }
        let addr: SocketAddr = format!("{}:{}", desc.host, desc.port)
            .parse()
            .map_err(|_| NodeError::Protocol(format!("invalid address: {desc}")))?;

        let conn = TcpConnection::connect(addr)?;
        let handle = self.manager.lock().unwrap().add_tcp(conn)?;

        let (tx, rx) = mpsc::channel();
        self.pending_connects.lock().unwrap().insert(handle, PendingConnect { tx });

        let hello = HelloPayload { id: self.id, kind: self.config.kind, descriptions: self.config.listen.clone() };
        if let Err(e) = self.send_control(handle, ControlCommand::ConnectReq, &hello.encode()) {
            self.pending_connects.lock().unwrap().remove(&handle);
            return Err(e);
        }

        rx.recv_timeout(StdDuration::from(self.config.timeout_default)).unwrap_or(Err(NodeError::TimeoutConnect))
    }

    /// Signals the receiver thread to stop and waits for it to exit.
    /// Already-established peer connections are dropped, not gracefully
    /// torn down with a `Disconnect` handshake — callers that need that
    /// should call [`Self::disconnect`] on each peer first.
    pub fn close(&self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(event) = self.shutdown_event.get() {
            let _ = event.signal();
        }
        if let Some(handle) = self.receiver_thread.lock().unwrap().take() {
            let _ = handle.join();
        }
        self.object_queues.read().unwrap().values().for_each(|q| q.close());
    }

    pub fn disconnect(&self, peer_id: NodeId) {
        if let Some(peer) = self.peers.write().unwrap().remove(&peer_id) {
            let _ = self.send_control(peer.handle, ControlCommand::Disconnect, &[]);
            self.manager.lock().unwrap().close(peer.handle);
            self.handle_to_peer.write().unwrap().remove(&peer.handle);
        }
    }

    // -- object registry ---------------------------------------------------

    pub fn register_object(&self, change_manager: ChangeManager) -> Arc<AttachedObject> {
        let obj = self.objects.register(self.id, change_manager);
        self.object_queues.write().unwrap().insert(obj.id, CommandQueue::new());
        obj
    }

    /// Maps a slave-side replica, defaulting the requested version to
    /// [`Version::OLDEST`] (the caller just wants a working starting point,
    /// not a specific one). See [`Self::map_object_nb`]/[`Self::map_object_sync`]
    /// for control over the requested version.
    pub fn map_object(
        &self,
        id: ObjectId,
        instance_id: u32,
        master_id: NodeId,
        change_manager: ChangeManager,
    ) -> Result<Arc<AttachedObject>, NodeError> {
        self.map_object_sync(id, instance_id, master_id, change_manager, Version::OLDEST, None)
    }

    /// Maps a slave-side replica and resolves it to `requested` without
    /// blocking: if the master can't answer without waiting for its head to
    /// advance, this returns [`NodeError::TimeoutMap`] immediately rather
    /// than parking the caller (the non-blocking counterpart to
    /// [`Self::map_object_sync`]).
    pub fn map_object_nb(
        &self,
        id: ObjectId,
        instance_id: u32,
        master_id: NodeId,
        change_manager: ChangeManager,
        requested: Version,
    ) -> Result<Arc<AttachedObject>, NodeError> {
        self.map_object_sync(id, instance_id, master_id, change_manager, requested, Some(Duration::from(StdDuration::ZERO)))
    }

    /// Maps a slave-side replica and resolves it to `requested`, blocking
    /// up to `timeout` (`None` waits indefinitely) for the master's reply —
    /// the real wire handshake `_cmdMapObj`/`_cmdMapObjReply` and
    /// `ObjectRegistry::map`'s doc comment defer to the caller.
    pub fn map_object_sync(
        &self,
        id: ObjectId,
        instance_id: u32,
        master_id: NodeId,
        change_manager: ChangeManager,
        requested: Version,
        timeout: Option<Duration>,
    ) -> Result<Arc<AttachedObject>, NodeError> {
        if !self.peers.read().unwrap().contains_key(&master_id) {
            return Err(NodeError::UnknownPeer(master_id));
        }

        let (tx, rx) = mpsc::channel();
        self.pending_maps.lock().unwrap().insert(id, tx);

        let req = MapObjReqPayload { requested, instance_id };
        if let Err(e) = self.send_object_data(master_id, id, ObjectCommand::MapObj, &req.encode()) {
            self.pending_maps.lock().unwrap().remove(&id);
            return Err(e);
        }

        let wait = timeout.unwrap_or(self.config.timeout_default);
        let reply = match rx.recv_timeout(StdDuration::from(wait)) {
            Ok(reply) => reply,
            Err(_) => {
                self.pending_maps.lock().unwrap().remove(&id);
                return Err(NodeError::TimeoutMap);
            }
        };

        if reply.is_denied() {
            return Err(NodeError::MapDenied(id));
        }

        let obj = self.objects.map(id, instance_id, master_id, change_manager)?;
        self.install_object_queue(id);
        if !reply.data.is_empty() || reply.version != Version::NONE {
            obj.commit(InstanceData::from(reply.data));
        }
        let _ = self.send_object_data(master_id, id, ObjectCommand::MapObjSuccess, &[]);
        Ok(obj)
    }

    fn install_object_queue(&self, id: ObjectId) {
        let queue = CommandQueue::new();
        for queued in self.pending_commands.take_ready(id) {
            queue.push(queued);
        }
        self.object_queues.write().unwrap().insert(id, queue);
    }

    pub fn unmap_object(&self, id: ObjectId) -> Result<(), NodeError> {
        self.objects.unmap(id)?;
        if let Some(queue) = self.object_queues.write().unwrap().remove(&id) {
            queue.close();
        }
        Ok(())
    }

    pub fn object_queue(&self, id: ObjectId) -> Option<CommandQueue<QueuedCommand>> {
        self.object_queues.read().unwrap().get(&id).cloned()
    }

    /// Sends an opaque object-destined command to `to`, landing in its
    /// `object_id` queue the same way `BarrierEnter`/`BarrierEnterReply`
    /// traffic does. The generic counterpart to those two: callers use it to
    /// push `Instance`/`Delta`/`Commit` payloads to a slave, since encoding
    /// instance data itself is out of this runtime's business (it only
    /// guarantees per-connection send order and per-object queue delivery).
    pub fn send_object_data(
        &self,
        to: NodeId,
        object_id: ObjectId,
        command: ObjectCommand,
        payload: &[u8],
    ) -> Result<(), NodeError> {
        let (low, high) = object_id.to_le_parts();
        let mut framed = Vec::with_capacity(16 + payload.len());
        framed.extend_from_slice(&low.to_le_bytes());
        framed.extend_from_slice(&high.to_le_bytes());
        framed.extend_from_slice(payload);
        self.send_object_command(to, command, &framed)
    }

    pub fn instance_cache(&self) -> &InstanceCache {
        &self.instance_cache
    }

    // -- barriers -----------------------------------------------------------

    /// Creates a master-side barrier for a freshly minted object id.
    pub fn create_barrier(&self, height: u32) -> (ObjectId, Arc<Barrier>) {
        let id = ObjectId::random();
        let barrier = Arc::new(Barrier::new_master(self.id, height));
        self.barriers.write().unwrap().insert(id, barrier.clone());
        (id, barrier)
    }

    /// Attaches a slave-side replica of a barrier whose master is elsewhere.
    pub fn map_barrier(&self, id: ObjectId, master_id: NodeId, height: u32) -> Arc<Barrier> {
        let barrier = Arc::new(Barrier::new_slave(master_id, height));
        self.barriers.write().unwrap().insert(id, barrier.clone());
        barrier
    }

    pub fn barrier(&self, id: ObjectId) -> Option<Arc<Barrier>> {
        self.barriers.read().unwrap().get(&id).cloned()
    }

    pub fn enter_barrier(&self, id: ObjectId, timeout: Option<Duration>) -> Result<(), NodeError> {
        let barrier = self.barrier(id).ok_or(NodeError::UnknownBarrier(id))?;
        let transport = NodeBarrierTransport { node: self, object_id: id };
        barrier.enter(&transport, timeout).map_err(NodeError::Barrier)
    }

    fn send_object_command(&self, to: NodeId, command: ObjectCommand, payload: &[u8]) -> Result<(), NodeError> {
        let handle = self.peers.read().unwrap().get(&to).map(|p| p.handle).ok_or(NodeError::UnknownPeer(to))?;
        self.manager
            .lock()
            .unwrap()
            .send(handle, CommandKind::Object.to_type_field(), command as u32, payload)
            .map_err(NodeError::from)
    }

    fn send_control(&self, handle: ConnectionHandle, command: ControlCommand, payload: &[u8]) -> Result<(), NodeError> {
        self.manager
            .lock()
            .unwrap()
            .send(handle, CommandKind::Control.to_type_field(), command as u32, payload)
            .map_err(NodeError::from)
    }

    // -- receiver loop --------------------------------------------------------

    fn run_receiver(self: Arc<Self>) {
        let mut last_keepalive = Instant::now();
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                break;
            }

            let events = {
                let mut manager = self.manager.lock().unwrap();
                match manager.poll(Some(StdDuration::from(self.config.receiver_poll_interval))) {
                    Ok(events) => events,
                    Err(e) => {
                        warn!(error = %e, "poll failed");
                        continue;
                    }
                }
            };

            for event in events {
                match event {
                    PollEvent::Accept(handle, addr) => {
                        trace!(?handle, %addr, "accepted connection, awaiting handshake");
                    }
                    PollEvent::Disconnect(handle) => self.handle_disconnect(handle),
                    PollEvent::Command(handle, cmd) => self.handle_command(handle, cmd),
                }
            }

            self.pending_commands.expire(self.config.pending_command_ttl);

            if u64::from(last_keepalive.elapsed()) > u64::from(self.config.keepalive_interval) {
                self.run_keepalive();
                last_keepalive = Instant::now();
            }
        }
        debug!(node_id = %self.id, "receiver thread exiting");
    }

    fn run_keepalive(&self) {
        let now = Instant::now();
        let snapshot: Vec<(NodeId, ConnectionHandle, Duration)> = self
            .peers
            .read()
            .unwrap()
            .values()
            .map(|p| (p.id, p.handle, now.elapsed_since(p.last_seen)))
            .collect();

        for (id, handle, idle) in snapshot {
            if u64::from(idle) > u64::from(self.config.keepalive_timeout) {
                warn!(peer = %id, "peer exceeded keepalive timeout, disconnecting");
                self.manager.lock().unwrap().close(handle);
                self.handle_disconnect(handle);
            } else if u64::from(idle) > u64::from(self.config.keepalive_interval) {
                if let Err(e) = self.send_control(handle, ControlCommand::Ping, &[]) {
                    warn!(peer = %id, error = %e, "failed to send keepalive ping");
                }
            }
        }
    }

    fn handle_command(&self, handle: ConnectionHandle, cmd: ICommand) {
        match cmd.kind() {
            CommandKind::Control => self.handle_control_command(handle, cmd),
            CommandKind::Object => self.handle_object_command(handle, cmd),
        }
    }

    fn handle_control_command(&self, handle: ConnectionHandle, cmd: ICommand) {
        let Some(ctrl) = ControlCommand::from_u32(cmd.command()) else {
            warn!(command = cmd.command(), "unknown control command");
            return;
        };
        match ctrl {
            ControlCommand::ConnectReq => self.handle_connect_req(handle, cmd.payload()),
            ControlCommand::ConnectReply => self.handle_connect_reply(handle, cmd.payload()),
            ControlCommand::ConnectAck => trace!(?handle, "connect handshake acknowledged"),
            ControlCommand::Disconnect => {
                self.manager.lock().unwrap().close(handle);
                self.handle_disconnect(handle);
            }
            ControlCommand::Ping => {
                self.touch_peer(handle);
                if let Err(e) = self.send_control(handle, ControlCommand::Pong, &[]) {
                    warn!(error = %e, "failed to reply to ping");
                }
            }
            ControlCommand::Pong => {
                self.touch_peer(handle);
                if let Some(id) = self.peer_id_for_handle(handle) {
                    if let Some(waiters) = self.pending_pings.lock().unwrap().remove(&id) {
                        for tx in waiters {
                            let _ = tx.send(());
                        }
                    }
                }
            }
            ControlCommand::AcquireSendToken => self.handle_acquire_send_token(handle),
            ControlCommand::AcquireSendTokenReply => self.handle_acquire_send_token_reply(handle),
            ControlCommand::ReleaseSendToken => self.handle_release_send_token(handle),
            other => trace!(?other, "ignoring unsupported control command"),
        }
    }

    // -- send tokens ----------------------------------------------------------

    /// Blocks until this node holds the single send token `peer` grants,
    /// so that a burst of sends to `peer` can be paced against its receive
    /// buffer the way `_cmdAcquireSendToken`'s caller does. At most one
    /// token is outstanding per granting peer; a second `acquire` for the
    /// same peer queues behind the first until it's released.
    pub fn acquire_send_token(&self, peer: NodeId, timeout: Option<Duration>) -> Result<(), NodeError> {
        let handle = self.peers.read().unwrap().get(&peer).map(|p| p.handle).ok_or(NodeError::UnknownPeer(peer))?;

        let (tx, rx) = mpsc::channel();
        self.send_token_waiters.lock().unwrap().entry(peer).or_default().push_back(tx);
        self.send_control(handle, ControlCommand::AcquireSendToken, &[])?;

        let wait = timeout.unwrap_or(self.config.timeout_default);
        rx.recv_timeout(StdDuration::from(wait)).map_err(|_| NodeError::TimeoutSendToken)?;
        self.send_token_held.lock().unwrap().insert(peer);
        Ok(())
    }

    /// Releases a token previously granted by `peer`. Releasing without
    /// holding it is a caller bug, logged rather than silently ignored.
    pub fn release_send_token(&self, peer: NodeId) {
        if !self.send_token_held.lock().unwrap().remove(&peer) {
            safe_panic!("release_send_token called for {peer} without a held token");
            return;
        }
        if let Some(handle) = self.peers.read().unwrap().get(&peer).map(|p| p.handle) {
            if let Err(e) = self.send_control(handle, ControlCommand::ReleaseSendToken, &[]) {
                warn!(peer = %peer, error = %e, "failed to release send token");
            }
        }
    }

    fn handle_acquire_send_token(&self, handle: ConnectionHandle) {
        let Some(requester) = self.peer_id_for_handle(handle) else { return };
        let mut grants = self.send_token_grants.lock().unwrap();
        if grants.holder.is_none() {
            grants.holder = Some(requester);
            drop(grants);
            if let Err(e) = self.send_control(handle, ControlCommand::AcquireSendTokenReply, &[]) {
                warn!(peer = %requester, error = %e, "failed to grant send token");
            }
        } else {
            grants.queue.push_back(requester);
        }
    }

    fn handle_acquire_send_token_reply(&self, handle: ConnectionHandle) {
        let Some(peer) = self.peer_id_for_handle(handle) else { return };
        if let Some(queue) = self.send_token_waiters.lock().unwrap().get_mut(&peer) {
            if let Some(tx) = queue.pop_front() {
                let _ = tx.send(());
            }
        }
    }

    fn handle_release_send_token(&self, handle: ConnectionHandle) {
        let Some(releaser) = self.peer_id_for_handle(handle) else { return };
        let mut grants = self.send_token_grants.lock().unwrap();
        if grants.holder != Some(releaser) {
            safe_panic!("peer {releaser} released a send token it was never granted");
            return;
        }
        grants.holder = grants.queue.pop_front();
        let next = grants.holder;
        drop(grants);
        let Some(next) = next else { return };
        if let Some(next_handle) = self.peers.read().unwrap().get(&next).map(|p| p.handle) {
            if let Err(e) = self.send_control(next_handle, ControlCommand::AcquireSendTokenReply, &[]) {
                warn!(peer = %next, error = %e, "failed to grant queued send token");
            }
        }
    }

    // -- object pushes ----------------------------------------------------------

    /// Registers the handler invoked for pushes (`object_push`) tagged with
    /// `group_id` this node has no more specific handler for.
    pub fn register_push_handler(&self, group_id: u32, handler: PushHandler) {
        self.push_handlers.write().unwrap().insert(group_id, handler);
    }

    /// Delivers a pushed object to its registered handler, or a default
    /// handler that maps it as a fresh [`ChangeManager::VersionedSlave`]
    /// attachment (mirroring `objectPush`'s "create by type if no handler
    /// claims it" fallback).
    pub fn object_push(
        &self,
        group_id: u32,
        object_type: u32,
        object_id: ObjectId,
        istream: PushStream,
    ) -> Result<(), NodeError> {
        let handler = self.push_handlers.read().unwrap().get(&group_id).cloned();
        match handler {
            Some(handler) => {
                handler(object_type, object_id, istream);
                Ok(())
            }
            None => self.default_push(object_type, object_id, istream),
        }
    }

    fn default_push(&self, object_type: u32, object_id: ObjectId, istream: PushStream) -> Result<(), NodeError> {
        let obj = match self.objects.map(object_id, object_type, istream.from, ChangeManager::VersionedSlave) {
            Ok(obj) => {
                self.install_object_queue(object_id);
                obj
            }
            Err(ObjectError::DuplicateRegister(_)) => self.objects.get(object_id)?,
            Err(e) => return Err(NodeError::from(e)),
        };
        if !istream.data.is_empty() {
            obj.commit(InstanceData::from(istream.data));
        }
        Ok(())
    }

    fn handle_object_command(&self, handle: ConnectionHandle, mut cmd: ICommand) {
        let Some(from) = self.peer_id_for_handle(handle) else {
            warn!(?handle, "object command from an un-handshaken connection");
            return;
        };
        self.touch_peer(handle);

        let object_id = match read_object_id(&mut cmd) {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "malformed object command");
                return;
            }
        };

        match ObjectCommand::from_u32(cmd.command()) {
            Some(ObjectCommand::BarrierEnter) => self.handle_barrier_enter(from, object_id, cmd.remaining()),
            Some(ObjectCommand::BarrierEnterReply) => self.handle_barrier_enter_reply(object_id, cmd.remaining()),
            Some(ObjectCommand::MapObj) => self.handle_map_obj_req(from, object_id, cmd.remaining()),
            Some(ObjectCommand::MapObjReply) => self.handle_map_obj_reply(object_id, cmd.remaining()),
            Some(ObjectCommand::MapObjSuccess) => {
                trace!(%object_id, %from, "slave confirmed its map, no broadcast subscribers to notify");
            }
            _ => self.dispatch_object_command(from, object_id, cmd),
        }
    }

    fn dispatch_object_command(&self, from: NodeId, object_id: ObjectId, cmd: ICommand) {
        let queued = QueuedCommand { from, command: cmd };
        let queues = self.object_queues.read().unwrap();
        if let Some(queue) = queues.get(&object_id) {
            queue.push(queued);
        } else {
            drop(queues);
            trace!(%object_id, "holding command for unmapped object");
            self.pending_commands.hold(object_id, queued);
        }
    }

    fn handle_barrier_enter(&self, from: NodeId, object_id: ObjectId, payload: &[u8]) {
        let msg = match BarrierEnterPayload::decode(payload) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "malformed barrier enter payload");
                return;
            }
        };
        let Some(barrier) = self.barrier(object_id) else {
            warn!(%object_id, "barrier enter for an unknown barrier");
            return;
        };
        let transport = NodeBarrierTransport { node: self, object_id };
        barrier.handle_enter(&transport, from, msg.version, msg.incarnation, Some(self.config.timeout_default));
    }

    fn handle_barrier_enter_reply(&self, object_id: ObjectId, payload: &[u8]) {
        let msg = match BarrierEnterReplyPayload::decode(payload) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "malformed barrier enter-reply payload");
                return;
            }
        };
        let Some(barrier) = self.barrier(object_id) else {
            warn!(%object_id, "barrier enter-reply for an unknown barrier");
            return;
        };
        barrier.handle_enter_reply(msg.version);
    }

    /// Master-side `CMD_MAP_OBJ` handler: resolves the requested version
    /// against this object's ring, replying inline when possible or, for a
    /// concrete version still above head, spawning a worker to wait on it
    /// so the receiver thread never blocks (§4.E).
    fn handle_map_obj_req(&self, from: NodeId, object_id: ObjectId, payload: &[u8]) {
        let req = match MapObjReqPayload::decode(payload) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "malformed map request payload");
                return;
            }
        };
        let Ok(obj) = self.objects.get(object_id) else {
            self.deny_map(from, object_id);
            return;
        };
        match obj.resolve(req.requested) {
            Ok(resolved) => self.send_map_reply(from, object_id, resolved),
            Err(ObjectError::VersionUnavailable) => {
                let node = self.arc();
                let timeout = self.config.timeout_default;
                let requested = req.requested;
                std::thread::spawn(move || {
                    let Ok(obj) = node.objects.get(object_id) else {
                        node.deny_map(from, object_id);
                        return;
                    };
                    match obj.sync_to(requested, Some(timeout)) {
                        Ok(resolved) => node.send_map_reply(from, object_id, resolved),
                        Err(_) => node.deny_map(from, object_id),
                    }
                });
            }
            Err(_) => self.deny_map(from, object_id),
        }
    }

    fn send_map_reply(&self, to: NodeId, object_id: ObjectId, resolved: Option<(Version, InstanceData)>) {
        let payload = match resolved {
            Some((version, data)) => MapObjReplyPayload { version, data: data.to_vec() },
            None => MapObjReplyPayload { version: Version::NONE, data: Vec::new() },
        };
        if let Err(e) = self.send_object_data(to, object_id, ObjectCommand::MapObjReply, &payload.encode()) {
            warn!(peer = %to, error = %e, "failed to reply to map request");
        }
    }

    fn deny_map(&self, to: NodeId, object_id: ObjectId) {
        let payload = MapObjReplyPayload::denied();
        if let Err(e) = self.send_object_data(to, object_id, ObjectCommand::MapObjReply, &payload.encode()) {
            warn!(peer = %to, error = %e, "failed to deny map request");
        }
    }

    /// Requester-side `CMD_MAP_OBJ_REPLY` handler: hands the reply to
    /// whichever call to [`Self::map_object_sync`] is blocked waiting on it.
    fn handle_map_obj_reply(&self, object_id: ObjectId, payload: &[u8]) {
        let reply = match MapObjReplyPayload::decode(payload) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "malformed map reply payload");
                return;
            }
        };
        if let Some(tx) = self.pending_maps.lock().unwrap().remove(&object_id) {
            let _ = tx.send(reply);
        }
    }

    fn handle_connect_req(&self, handle: ConnectionHandle, payload: &[u8]) {
        let hello = match HelloPayload::decode(payload) {
            Ok(h) => h,
            Err(e) => {
                warn!(error = %e, "malformed connect request");
                self.manager.lock().unwrap().close(handle);
                return;
            }
        };
        let remote_id = hello.id;

        let existing_handle = self.peers.read().unwrap().get(&remote_id).map(|p| p.handle);
        if let Some(existing_handle) = existing_handle {
            if self.id < remote_id {
                debug!(peer = %remote_id, "duplicate connect lost tie-break, keeping existing connection");
                self.manager.lock().unwrap().close(handle);
                return;
            }
            debug!(peer = %remote_id, "duplicate connect won tie-break, replacing existing connection");
            self.manager.lock().unwrap().close(existing_handle);
            self.handle_to_peer.write().unwrap().remove(&existing_handle);
        }

        self.install_peer(remote_id, handle, hello.descriptions);

        let reply = HelloPayload { id: self.id, kind: self.config.kind, descriptions: self.config.listen.clone() };
        if let Err(e) = self.send_control(handle, ControlCommand::ConnectReply, &reply.encode()) {
            warn!(error = %e, "failed to reply to connect request");
        }
    }

    fn handle_connect_reply(&self, handle: ConnectionHandle, payload: &[u8]) {
        let hello = match HelloPayload::decode(payload) {
            Ok(h) => h,
            Err(e) => {
                warn!(error = %e, "malformed connect reply");
                return;
            }
        };
        let remote_id = hello.id;
        self.install_peer(remote_id, handle, hello.descriptions);

        if let Err(e) = self.send_control(handle, ControlCommand::ConnectAck, &[]) {
            warn!(error = %e, "failed to acknowledge connect reply");
        }

        if let Some(pending) = self.pending_connects.lock().unwrap().remove(&handle) {
            let _ = pending.tx.send(Ok(remote_id));
        }
    }

    fn install_peer(&self, id: NodeId, handle: ConnectionHandle, descriptions: Vec<ConnectionDescription>) {
        self.peers.write().unwrap().insert(id, Peer::new(id, handle, descriptions));
        self.handle_to_peer.write().unwrap().insert(handle, id);
        debug!(peer = %id, "peer handshake complete");
    }

    fn handle_disconnect(&self, handle: ConnectionHandle) {
        if let Some(pending) = self.pending_connects.lock().unwrap().remove(&handle) {
            let _ = pending.tx.send(Err(NodeError::Closed));
        }
        if let Some(peer_id) = self.handle_to_peer.write().unwrap().remove(&handle) {
            self.peers.write().unwrap().remove(&peer_id);
            self.pending_pings.lock().unwrap().remove(&peer_id);
            debug!(peer = %peer_id, "peer disconnected");
        }
    }

    fn peer_id_for_handle(&self, handle: ConnectionHandle) -> Option<NodeId> {
        self.handle_to_peer.read().unwrap().get(&handle).copied()
    }

    fn touch_peer(&self, handle: ConnectionHandle) {
        if let Some(id) = self.peer_id_for_handle(handle) {
            if let Some(peer) = self.peers.write().unwrap().get_mut(&id) {
                peer.touch();
            }
        }
    }
}

fn read_object_id(cmd: &mut ICommand) -> Result<ObjectId, NodeError> {
    let bytes = cmd.remaining();
    if bytes.len() < 16 {
        return Err(NodeError::Protocol("object command missing destination object id".into()));
    }
    let low = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
    let high = u64::from_le_bytes(bytes[8..16].try_into().unwrap());
    cmd.advance(16);
    Ok(ObjectId::from_le_parts(low, high))
}

/// Routes a [`Barrier`]'s enter/enter-reply traffic over this node's peer
/// connections, looping back directly when this node is the barrier's own
/// master (mirroring the local fast-path the reference implementation takes
/// for same-node sends).
struct NodeBarrierTransport<'a> {
    node: &'a LocalNode,
    object_id: ObjectId,
}

impl BarrierTransport for NodeBarrierTransport<'_> {
    fn local_node_id(&self) -> NodeId {
        self.node.id
    }

    fn send_enter(
        &self,
        master: NodeId,
        version: Version,
        incarnation: u32,
        timeout: Option<Duration>,
    ) -> Result<(), BarrierError> {
        if master == self.node.id {
            let barrier = self.node.barrier(self.object_id).ok_or(BarrierError::NoMaster)?;
            barrier.handle_enter(
                self,
                self.node.id,
                version,
                incarnation,
                timeout.or(Some(self.node.config.timeout_default)),
            );
            return Ok(());
        }
        let payload = BarrierEnterPayload { version, incarnation }.encode();
        self.node
            .send_object_data(master, self.object_id, ObjectCommand::BarrierEnter, &payload)
            .map_err(|e| BarrierError::Transport(e.to_string()))
    }

    fn send_enter_reply(&self, to: NodeId, version: Version) -> Result<(), BarrierError> {
        let payload = BarrierEnterReplyPayload { version }.encode();
        self.node
            .send_object_data(to, self.object_id, ObjectCommand::BarrierEnterReply, &payload)
            .map_err(|e| BarrierError::Transport(e.to_string()))
    }
}
