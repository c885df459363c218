//! Distributed Hash Table client ([BEP-5]).
//!
//! This module speaks the Mainline DHT wire protocol to discover peers
//! that announce a shared "network signature" info hash. It contains the
//! KRPC wire codec, a bounded endpoint-keyed routing table ordered by XOR
//! distance, a transaction manager that correlates asynchronous UDP
//! responses with outstanding queries, a UDP transport with a resilient
//! receive loop, and the [`DhtClient`] orchestrator that ties them
//! together and drives the bootstrap/search cycle.
//!
//! [BEP-5]: http://bittorrent.org/beps/bep_0005.html

mod client;
mod error;
mod id;
mod message;
mod node;
mod table;
mod transactions;
mod transport;

pub use client::{DhtClient, DhtConfig, DhtEvent, DhtState, PeersHolder, DEFAULT_ROUTERS};
pub use error::DhtError;
pub use id::{InfoHash, NodeId};
pub use message::{Message, Query, Response};
pub use node::{DhtNode, NodeState};
pub use table::RoutingTable;
pub use transactions::{QueryKind, TransactionManager};
pub use transport::UdpTransport;
