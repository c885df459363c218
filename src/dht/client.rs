use super::id::{InfoHash, NodeId};
use super::message::{Message, Query, Response};
use super::node::DhtNode;
use super::table::RoutingTable;
use super::transactions::{QueryKind, TransactionManager};
use super::transport::UdpTransport;
use bytes::Bytes;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Well-known routers used to seed an empty routing table.
pub const DEFAULT_ROUTERS: &[&str] = &[
    "router.bittorrent.com:6881",
    "dht.transmissionbt.com:6881",
    "router.utorrent.com:6881",
];

const SEARCH_TICK: Duration = Duration::from_secs(1);
const GET_PEERS_INTERVAL: Duration = Duration::from_secs(60);
/// Minimum gap between two announces to the same node.
const ANNOUNCE_INTERVAL: Duration = Duration::from_secs(10 * 60);
const EVENT_CHANNEL_CAPACITY: usize = 64;
const DISPATCH_CHANNEL_CAPACITY: usize = 256;

/// Host-supplied identity, peer list and persistence hook.
///
/// The DHT core knows nothing about where peers or node records are kept;
/// the embedding application implements this trait and hands it in.
pub trait PeersHolder: Send + Sync {
    /// The local node's identity.
    fn client_node_id(&self) -> NodeId;
    /// Locally known peers of the network, advertised to `get_peers`
    /// queries for the tracked signature.
    fn peers_list(&self) -> Vec<SocketAddr>;
    /// Called whenever a node is admitted to the routing table.
    fn save_node(&self, node: &DhtNode);
}

/// Discovery results, delivered over a broadcast channel.
#[derive(Debug, Clone)]
pub enum DhtEvent {
    /// Peers of the tracked network signature were returned by a
    /// `get_peers` round trip.
    PeersFound(Vec<SocketAddr>),
    /// A node answered our ping.
    PeerPinged { addr: SocketAddr, id: NodeId },
    /// A query outside the core four arrived; passed through untouched,
    /// raw datagram included so the host can decode and answer it.
    QueryReceived {
        addr: SocketAddr,
        id: Option<NodeId>,
        name: String,
        payload: Bytes,
    },
    /// A response arrived for a transaction we do not remember issuing.
    /// The raw datagram rides along for host inspection.
    ResponseReceived {
        addr: SocketAddr,
        id: Option<NodeId>,
        payload: Bytes,
    },
}

#[derive(Debug, Clone)]
pub struct DhtConfig {
    /// Local UDP port; 0 binds an ephemeral port.
    pub port: u16,
    /// Router hostnames resolved at start, best-effort.
    pub routers: Vec<String>,
    /// How long the routing table may go without an update before it is
    /// cleared and the client re-bootstraps.
    pub table_stale_after: Duration,
}

impl Default for DhtConfig {
    fn default() -> Self {
        Self {
            port: 6881,
            routers: DEFAULT_ROUTERS.iter().map(|s| s.to_string()).collect(),
            table_stale_after: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhtState {
    Stopped,
    Bootstrapping,
    Searching,
}

struct Running {
    transport: UdpTransport,
    target: InfoHash,
    routers: Vec<SocketAddr>,
    local_port: u16,
}

/// The DHT orchestrator.
///
/// Owns the transport, routing table and transaction manager, runs the
/// bootstrap/search loop and dispatches incoming datagrams. All failures
/// below `start` are asynchronous: they are logged and the client keeps
/// running, which is the only sane posture on a lossy, hostile network.
pub struct DhtClient {
    holder: Arc<dyn PeersHolder>,
    config: DhtConfig,
    table: Arc<RoutingTable>,
    transactions: TransactionManager,
    events: broadcast::Sender<DhtEvent>,
    running: Mutex<Option<Arc<Running>>>,
    state: Mutex<DhtState>,
}

impl DhtClient {
    pub fn new(config: DhtConfig, holder: Arc<dyn PeersHolder>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            holder,
            config,
            table: Arc::new(RoutingTable::new()),
            transactions: TransactionManager::new(),
            events,
            running: Mutex::new(None),
            state: Mutex::new(DhtState::Stopped),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DhtEvent> {
        self.events.subscribe()
    }

    pub fn routing_table(&self) -> &RoutingTable {
        &self.table
    }

    pub fn state(&self) -> DhtState {
        *self.state.lock()
    }

    /// The bound UDP address while running, `None` when stopped.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running
            .lock()
            .as_ref()
            .and_then(|running| running.transport.local_addr().ok())
    }

    /// Opens the transport and starts searching for peers of `target`.
    ///
    /// Router resolution is best-effort: a router that fails DNS is
    /// logged and skipped, and starting with zero resolved routers is
    /// legal (the client then waits for inbound traffic to seed the
    /// table). The only error surfaced here is failing to bind the local
    /// socket. Calling `start` on a running client is a no-op.
    pub async fn start(self: &Arc<Self>, target: InfoHash) -> Result<(), super::DhtError> {
        if self.running.lock().is_some() {
            return Ok(());
        }

        let transport = UdpTransport::bind(self.config.port).await?;
        let local_port = transport.local_addr()?.port();

        let mut routers = Vec::new();
        for host in &self.config.routers {
            match tokio::net::lookup_host(host.as_str()).await {
                Ok(mut addrs) => {
                    if let Some(addr) = addrs.find(|a| a.is_ipv4()) {
                        routers.push(addr);
                    }
                }
                Err(err) => warn!(host = host.as_str(), "router resolution failed, skipping: {err}"),
            }
        }
        if routers.is_empty() {
            warn!("no routers resolved; bootstrap depends on inbound traffic");
        }

        let (dispatch_tx, mut dispatch_rx) = mpsc::channel(DISPATCH_CHANNEL_CAPACITY);
        transport.open(dispatch_tx);

        let running = Arc::new(Running {
            transport,
            target,
            routers,
            local_port,
        });

        {
            let mut slot = self.running.lock();
            if slot.is_some() {
                // Lost a start race; discard the new transport.
                running.transport.close();
                return Ok(());
            }
            *slot = Some(running.clone());
        }
        *self.state.lock() = DhtState::Bootstrapping;
        info!(port = local_port, target = %target, "dht client started");

        let client = self.clone();
        let run = running.clone();
        tokio::spawn(async move {
            while let Some((addr, data)) = dispatch_rx.recv().await {
                if !run.transport.is_open() {
                    break;
                }
                client.handle_datagram(&run, addr, data).await;
            }
        });

        let client = self.clone();
        tokio::spawn(async move {
            client.search_loop(running).await;
        });

        Ok(())
    }

    /// Stops the client. Idempotent; the loops observe the closed flag on
    /// their next wakeup rather than being interrupted.
    pub fn stop(&self) {
        let running = self.running.lock().take();
        if let Some(running) = running {
            running.transport.close();
            self.transactions.clear();
            *self.state.lock() = DhtState::Stopped;
            info!("dht client stopped");
        }
    }

    /// Sends an arbitrary message; dropped with a log line when stopped.
    pub async fn send(&self, addr: SocketAddr, message: &Message, blocking: bool) {
        let running = self.running.lock().clone();
        match running {
            Some(running) => running.transport.send(addr, message.encode(), blocking).await,
            None => debug!(%addr, "send ignored, client stopped"),
        }
    }

    /// Once-per-second control loop: clears a stale table, re-bootstraps
    /// an empty one, otherwise walks the nodes closest to the target and
    /// refreshes `get_peers` on the ones that are due.
    async fn search_loop(self: Arc<Self>, running: Arc<Running>) {
        loop {
            sleep(SEARCH_TICK).await;
            if !running.transport.is_open() {
                break;
            }

            if self.table.idle_for() > self.config.table_stale_after {
                debug!("routing table stale, clearing for re-bootstrap");
                self.table.clear();
            }

            if self.table.is_empty() {
                *self.state.lock() = DhtState::Bootstrapping;
                for router in &running.routers {
                    self.send_find_node(&running, *router).await;
                }
            } else {
                *self.state.lock() = DhtState::Searching;
                for node in self.table.closest(&running.target) {
                    let due = node
                        .last_get_peers
                        .map_or(true, |at| at.elapsed() >= GET_PEERS_INTERVAL);
                    if due {
                        self.send_get_peers(&running, node.addr).await;
                        self.table.stamp_get_peers(&node.addr);
                    }
                }
            }
        }
    }

    async fn handle_datagram(&self, running: &Running, addr: SocketAddr, data: Vec<u8>) {
        let raw = Bytes::from(data);
        let Some(message) = Message::parse(&raw) else {
            debug!(%addr, len = raw.len(), "dropping unparseable datagram");
            return;
        };

        match message {
            Message::Query {
                transaction_id,
                query,
            } => {
                self.handle_query(running, addr, transaction_id, query, raw)
                    .await
            }
            Message::Response {
                transaction_id,
                response,
            } => {
                self.handle_response(running, addr, transaction_id, response, raw)
                    .await
            }
            Message::Error { code, message, .. } => {
                debug!(%addr, code, %message, "dht error message received");
            }
        }
    }

    async fn handle_query(
        &self,
        running: &Running,
        addr: SocketAddr,
        tid: Bytes,
        query: Query,
        raw: Bytes,
    ) {
        let self_id = self.holder.client_node_id();

        match query {
            Query::Ping { id } => {
                self.update_routing_table(id, addr);
                let reply = Message::ping_response(tid, self_id);
                running.transport.send(addr, reply.encode(), false).await;
            }
            Query::FindNode { id, target } => {
                self.update_routing_table(id, addr);
                let nodes = self.table.closest(&target);
                let reply = Message::find_node_response(tid, self_id, nodes);
                running.transport.send(addr, reply.encode(), false).await;
            }
            Query::GetPeers { id, info_hash } => {
                self.update_routing_table(id, addr);
                let nodes = self.table.closest(&info_hash);
                // The peer list is only advertised for our own network
                // signature; strangers get nodes and a token.
                let values = if info_hash == running.target {
                    self.holder.peers_list()
                } else {
                    Vec::new()
                };
                let reply = Message::get_peers_response(tid, self_id, info_hash, values, nodes);
                running.transport.send(addr, reply.encode(), false).await;
            }
            Query::AnnouncePeer { id, info_hash, .. } => {
                self.update_routing_table(id, addr);
                if info_hash == running.target {
                    debug!(%addr, node = %id, "peer announced itself to us");
                    let reply = Message::announce_peer_response(tid, self_id);
                    running.transport.send(addr, reply.encode(), false).await;
                }
            }
            Query::Other { name, id } => {
                if let Some(id) = id {
                    self.update_routing_table(id, addr);
                }
                self.emit(DhtEvent::QueryReceived {
                    addr,
                    id,
                    name,
                    payload: raw,
                });
            }
        }
    }

    async fn handle_response(
        &self,
        running: &Running,
        addr: SocketAddr,
        tid: Bytes,
        response: Response,
        raw: Bytes,
    ) {
        if let Some(id) = response.id {
            self.update_routing_table(id, addr);
        }

        match self.transactions.check_query(&tid) {
            Some(QueryKind::Ping) => {
                if let Some(id) = response.id {
                    self.emit(DhtEvent::PeerPinged { addr, id });
                }
            }
            Some(QueryKind::FindNode) => {
                self.merge_nodes(&response.nodes);
            }
            Some(QueryKind::GetPeers) => {
                self.merge_nodes(&response.nodes);

                if !response.values.is_empty() {
                    debug!(%addr, count = response.values.len(), "peers found");
                    self.emit(DhtEvent::PeersFound(response.values));
                } else if let Some(token) = response.token {
                    // An empty get_peers reply with a token is the cue to
                    // put ourselves on that node's peer list.
                    if !token.is_empty() && self.may_announce_to(&addr) {
                        self.send_announce(running, addr, token).await;
                    }
                }
            }
            Some(QueryKind::AnnouncePeer) => {
                debug!(%addr, "announce_peer acknowledged");
            }
            None => {
                // Foreign, expired or duplicate transaction; the host may
                // still care (mirrored responses are a thing out there).
                self.emit(DhtEvent::ResponseReceived {
                    addr,
                    id: response.id,
                    payload: raw,
                });
            }
        }
    }

    async fn send_find_node(&self, running: &Running, addr: SocketAddr) {
        let tid = self.transactions.next_id();
        let msg = Message::find_node_query(tid.clone(), self.neighbor_id(&running.target));
        self.transactions.set_query(&tid, QueryKind::FindNode);
        running.transport.send(addr, msg.encode(), false).await;
    }

    async fn send_get_peers(&self, running: &Running, addr: SocketAddr) {
        let tid = self.transactions.next_id();
        let msg = Message::get_peers_query(
            tid.clone(),
            self.neighbor_id(&running.target),
            running.target,
        );
        self.transactions.set_query(&tid, QueryKind::GetPeers);
        running.transport.send(addr, msg.encode(), false).await;
    }

    async fn send_announce(&self, running: &Running, addr: SocketAddr, token: Bytes) {
        let tid = self.transactions.next_id();
        let msg = Message::announce_peer_query(
            tid.clone(),
            self.neighbor_id(&running.target),
            running.target,
            true,
            running.local_port,
            token,
        );
        self.transactions.set_query(&tid, QueryKind::AnnouncePeer);
        running.transport.send(addr, msg.encode(), false).await;
        self.table.stamp_announce(&addr);
        debug!(%addr, "announced ourselves");
    }

    /// Outgoing queries carry a neighbor id so remote tables file us next
    /// to the target.
    fn neighbor_id(&self, target: &InfoHash) -> NodeId {
        NodeId::neighbor(target, &self.holder.client_node_id())
    }

    fn may_announce_to(&self, addr: &SocketAddr) -> bool {
        match self.table.find(addr).and_then(|node| node.last_announce) {
            Some(at) => at.elapsed() >= ANNOUNCE_INTERVAL,
            None => true,
        }
    }

    fn merge_nodes(&self, nodes: &[DhtNode]) {
        for node in nodes {
            self.update_routing_table(node.id, node.addr);
        }
    }

    /// Single funnel for every node id observed anywhere in the flow;
    /// admitted nodes are also handed to the host for persistence.
    fn update_routing_table(&self, id: NodeId, addr: SocketAddr) {
        let node = DhtNode::new(id, addr);
        if self.table.update_node(node.clone()) {
            self.holder.save_node(&node);
        }
    }

    fn emit(&self, event: DhtEvent) {
        // No subscribers is fine; discovery keeps running regardless.
        let _ = self.events.send(event);
    }
}
