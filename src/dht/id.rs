use super::error::DhtError;
use rand::Rng as _;
use std::fmt;

/// A 160-bit DHT identifier.
///
/// The same type doubles as a node's self identifier and as a lookup
/// target: an info hash is nothing but a `NodeId` that names a resource
/// instead of a node. Ordering is plain byte-wise comparison, which is
/// also how XOR distances are ranked.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub [u8; 20]);

/// The identifier of a resource; here, the fixed network signature the
/// client searches for.
pub type InfoHash = NodeId;

impl NodeId {
    pub fn generate() -> Self {
        let mut id = [0u8; 20];
        rand::rng().fill(&mut id);
        Self(id)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DhtError> {
        if bytes.len() != 20 {
            return Err(DhtError::InvalidNodeId);
        }
        let mut id = [0u8; 20];
        id.copy_from_slice(bytes);
        Ok(Self(id))
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// XOR distance to `other`. Distances compare lexicographically: the
    /// earlier the first set bit, the farther apart the ids.
    pub fn distance(&self, other: &NodeId) -> [u8; 20] {
        let mut dist = [0u8; 20];
        for (i, d) in dist.iter_mut().enumerate() {
            *d = self.0[i] ^ other.0[i];
        }
        dist
    }

    /// An id that sorts close to `target` while keeping `local`'s tail.
    ///
    /// Outgoing queries use this as their sender id so that remote routing
    /// tables file us near the target, which improves the odds of being
    /// handed back to other searchers of the same info hash.
    pub fn neighbor(target: &InfoHash, local: &NodeId) -> NodeId {
        let mut id = [0u8; 20];
        id[..10].copy_from_slice(&target.0[..10]);
        id[10..].copy_from_slice(&local.0[10..]);
        NodeId(id)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({:02x}{:02x}{:02x}..)", self.0[0], self.0[1], self.0[2])
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}
