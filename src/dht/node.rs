use super::id::NodeId;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::time::Instant;

const GOOD_WINDOW: Duration = Duration::from_secs(3 * 60);
const QUESTIONABLE_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Size of a compact node record: 20-byte id, 4-byte IPv4, 2-byte port.
pub const COMPACT_NODE_LEN: usize = 26;
/// Size of a compact peer record: 4-byte IPv4, 2-byte port.
pub const COMPACT_PEER_LEN: usize = 6;

/// Liveness of a node, derived from its timestamps at query time.
///
/// Never stored on the node, so it cannot drift from the wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Heard from within the last 3 minutes.
    Good,
    /// Between 3 and 15 minutes silent.
    Questionable,
    /// Silent for over 15 minutes.
    Bad,
    /// Never heard from at all.
    Unknown,
}

/// A remote DHT node as tracked by the routing table.
#[derive(Debug, Clone)]
pub struct DhtNode {
    pub id: NodeId,
    pub addr: SocketAddr,
    pub last_update: Option<Instant>,
    /// When we last sent this node a `get_peers`.
    pub last_get_peers: Option<Instant>,
    /// When we last announced ourselves to this node.
    pub last_announce: Option<Instant>,
}

impl DhtNode {
    pub fn new(id: NodeId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_update: None,
            last_get_peers: None,
            last_announce: None,
        }
    }

    /// Marks the node as heard-from now.
    pub fn touch(&mut self) {
        self.last_update = Some(Instant::now());
    }

    pub fn state(&self) -> NodeState {
        self.state_at(Instant::now())
    }

    pub fn state_at(&self, now: Instant) -> NodeState {
        let Some(last) = self.last_update else {
            return NodeState::Unknown;
        };

        let silent = now.saturating_duration_since(last);
        if silent < GOOD_WINDOW {
            NodeState::Good
        } else if silent < QUESTIONABLE_WINDOW {
            NodeState::Questionable
        } else {
            NodeState::Bad
        }
    }

    pub fn from_compact(data: &[u8]) -> Option<Self> {
        if data.len() != COMPACT_NODE_LEN {
            return None;
        }

        let id = NodeId::from_bytes(&data[..20]).ok()?;
        let addr = decode_compact_peer(&data[20..])?;
        Some(Self::new(id, addr))
    }

    /// IPv6 endpoints have no compact form and encode to `None`.
    pub fn to_compact(&self) -> Option<[u8; COMPACT_NODE_LEN]> {
        let mut out = [0u8; COMPACT_NODE_LEN];
        out[..20].copy_from_slice(&self.id.0);

        match self.addr {
            SocketAddr::V4(v4) => {
                out[20..24].copy_from_slice(&v4.ip().octets());
                out[24..26].copy_from_slice(&v4.port().to_be_bytes());
                Some(out)
            }
            SocketAddr::V6(_) => None,
        }
    }
}

/// Decodes a concatenated `nodes` buffer. Buffers whose length is not a
/// multiple of 26 are rejected outright rather than partially decoded.
pub fn decode_compact_nodes(data: &[u8]) -> Option<Vec<DhtNode>> {
    if data.len() % COMPACT_NODE_LEN != 0 {
        return None;
    }
    data.chunks_exact(COMPACT_NODE_LEN)
        .map(DhtNode::from_compact)
        .collect()
}

pub fn decode_compact_peer(data: &[u8]) -> Option<SocketAddr> {
    if data.len() != COMPACT_PEER_LEN {
        return None;
    }
    let ip = Ipv4Addr::new(data[0], data[1], data[2], data[3]);
    let port = u16::from_be_bytes([data[4], data[5]]);
    Some(SocketAddr::new(IpAddr::V4(ip), port))
}

pub fn encode_compact_peer(addr: &SocketAddr) -> Option<[u8; COMPACT_PEER_LEN]> {
    match addr {
        SocketAddr::V4(v4) => {
            let mut out = [0u8; COMPACT_PEER_LEN];
            out[..4].copy_from_slice(&v4.ip().octets());
            out[4..].copy_from_slice(&v4.port().to_be_bytes());
            Some(out)
        }
        SocketAddr::V6(_) => None,
    }
}
