use super::id::NodeId;
use super::node::{DhtNode, NodeState};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::Instant;

/// Upper bound on tracked nodes.
pub const K_TABLE_SIZE: usize = 2048;
/// How many nodes a closest-to-target query returns.
pub const CLOSEST_NODES: usize = 8;

/// Well-known service ports are never valid DHT endpoints; queries claiming
/// one are either spoofed or trying to bounce traffic off us.
const MIN_NODE_PORT: u16 = 1024;

/// Bounded set of known nodes, keyed by endpoint.
///
/// The endpoint is authoritative for identity: a peer that shows up with a
/// new id at a known address supersedes the old record. One lock covers
/// the whole table so a closest-N selection sees a consistent snapshot
/// while evictions run concurrently.
pub struct RoutingTable {
    inner: RwLock<Inner>,
}

struct Inner {
    nodes: HashMap<SocketAddr, DhtNode>,
    last_touched: Instant,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                nodes: HashMap::new(),
                last_touched: Instant::now(),
            }),
        }
    }

    /// Inserts or refreshes a node.
    ///
    /// Rejects endpoints on privileged ports. A full table first sheds its
    /// `Bad` entries; if none were bad the insertion is silently dropped,
    /// which is the table's only backpressure signal.
    pub fn update_node(&self, node: DhtNode) -> bool {
        if node.addr.port() <= MIN_NODE_PORT {
            return false;
        }

        let mut inner = self.inner.write();

        if !inner.nodes.contains_key(&node.addr) && inner.nodes.len() >= K_TABLE_SIZE {
            let now = Instant::now();
            inner.nodes.retain(|_, n| n.state_at(now) != NodeState::Bad);
            if inner.nodes.len() >= K_TABLE_SIZE {
                return false;
            }
        }

        let refreshed = match inner.nodes.get_mut(&node.addr) {
            // Same node seen again: keep its per-node timestamps.
            Some(existing) if existing.id == node.id => {
                existing.touch();
                true
            }
            _ => false,
        };

        if !refreshed {
            let mut node = node;
            node.touch();
            inner.nodes.insert(node.addr, node);
        }

        inner.last_touched = Instant::now();
        true
    }

    /// The nodes closest to `target` by XOR distance, at most
    /// [`CLOSEST_NODES`] of them. A table no larger than that is returned
    /// whole. Duplicate distances are collapsed to the first-seen node and
    /// `Bad` entries encountered during the scan are evicted on the spot.
    pub fn closest(&self, target: &NodeId) -> Vec<DhtNode> {
        let mut inner = self.inner.write();

        if inner.nodes.len() <= CLOSEST_NODES {
            return inner.nodes.values().cloned().collect();
        }

        let now = Instant::now();
        let mut best: Vec<([u8; 20], DhtNode)> = Vec::with_capacity(CLOSEST_NODES + 1);
        let mut evict = Vec::new();

        for node in inner.nodes.values() {
            if node.state_at(now) == NodeState::Bad {
                evict.push(node.addr);
                continue;
            }

            let dist = node.id.distance(target);
            if best.iter().any(|(d, _)| *d == dist) {
                continue;
            }
            if best.len() == CLOSEST_NODES {
                match best.last() {
                    Some((farthest, _)) if dist >= *farthest => continue,
                    _ => {}
                }
            }

            let pos = best.partition_point(|(d, _)| *d < dist);
            best.insert(pos, (dist, node.clone()));
            if best.len() > CLOSEST_NODES {
                best.pop();
            }
        }

        for addr in evict {
            inner.nodes.remove(&addr);
        }

        best.into_iter().map(|(_, node)| node).collect()
    }

    pub fn find(&self, addr: &SocketAddr) -> Option<DhtNode> {
        self.inner.read().nodes.get(addr).cloned()
    }

    /// Records that a `get_peers` was just sent to `addr`.
    pub fn stamp_get_peers(&self, addr: &SocketAddr) {
        if let Some(node) = self.inner.write().nodes.get_mut(addr) {
            node.last_get_peers = Some(Instant::now());
        }
    }

    /// Records that we just announced ourselves to `addr`.
    pub fn stamp_announce(&self, addr: &SocketAddr) {
        if let Some(node) = self.inner.write().nodes.get_mut(addr) {
            node.last_announce = Some(Instant::now());
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().nodes.is_empty()
    }

    /// Time since the last successful insert or refresh.
    pub fn idle_for(&self) -> Duration {
        self.inner.read().last_touched.elapsed()
    }

    /// Empties the table, forcing the next search-loop pass to
    /// re-bootstrap from the routers.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.nodes.clear();
        inner.last_touched = Instant::now();
    }
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::new()
    }
}
