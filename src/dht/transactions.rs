use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, Ordering};

/// The four query types a transaction can be waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Ping,
    FindNode,
    GetPeers,
    AnnouncePeer,
}

/// Correlates outstanding queries with their asynchronous responses.
///
/// Transaction ids are two big-endian bytes from a wrapping counter.
/// Entries are never expired: a response either consumes its entry or the
/// id eventually gets reused after the counter wraps. A very old response
/// can therefore alias a newer query with the same id; that imprecision is
/// inherited from the protocol and accepted (see DESIGN.md).
pub struct TransactionManager {
    counter: AtomicU16,
    pending: Mutex<HashMap<u16, QueryKind>>,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self {
            counter: AtomicU16::new(0),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// The next transaction id, as the two bytes that go on the wire.
    pub fn next_id(&self) -> Bytes {
        let id = self.counter.fetch_add(1, Ordering::Relaxed);
        Bytes::copy_from_slice(&id.to_be_bytes())
    }

    /// Records an outstanding query. Ids that are not exactly two bytes
    /// are ignored; we never issue them, so nothing could correlate back.
    pub fn set_query(&self, id: &[u8], kind: QueryKind) {
        let Some(key) = Self::key(id) else { return };
        self.pending.lock().insert(key, kind);
    }

    /// Consumes and returns the query type recorded for `id`.
    ///
    /// `None` means "a response to nothing we remember": either a foreign
    /// or expired transaction, or a duplicate response whose first copy
    /// already consumed the entry.
    pub fn check_query(&self, id: &[u8]) -> Option<QueryKind> {
        let key = Self::key(id)?;
        self.pending.lock().remove(&key)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Drops all outstanding transactions; called on transport shutdown.
    pub fn clear(&self) {
        self.pending.lock().clear();
    }

    fn key(id: &[u8]) -> Option<u16> {
        let raw: [u8; 2] = id.try_into().ok()?;
        Some(u16::from_be_bytes(raw))
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}
