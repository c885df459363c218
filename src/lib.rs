//! signet-dht - peer discovery over the BitTorrent Mainline DHT
//!
//! This library implements a BEP-5 compatible DHT client used for
//! rendezvous rather than file sharing: instead of looking up peers for a
//! torrent, it looks up peers that announce a fixed "network signature"
//! info hash. A host application supplies its identity and peer list
//! through the [`dht::PeersHolder`] trait and receives discovery results
//! as [`dht::DhtEvent`]s.
//!
//! # Modules
//!
//! - [`bencode`] - BEP-3 bencode encoding/decoding
//! - [`dht`] - the DHT client: wire codec, routing table, UDP transport

pub mod bencode;
pub mod dht;

pub use bencode::{decode, encode, BencodeError, Value};
pub use dht::{
    DhtClient, DhtConfig, DhtError, DhtEvent, DhtNode, DhtState, InfoHash, Message, NodeId,
    NodeState, PeersHolder, Query, QueryKind, Response, RoutingTable, TransactionManager,
    UdpTransport,
};
