use super::id::{InfoHash, NodeId};
use super::node::{decode_compact_nodes, decode_compact_peer, encode_compact_peer, DhtNode};
use crate::bencode::{decode, encode, Value};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::net::SocketAddr;

/// Version tag appended to every outgoing message under the `v` key.
pub const CLIENT_VERSION: &[u8; 4] = b"SG01";

/// A KRPC message: query, response or error.
///
/// Responses are structurally ambiguous on the wire (a `get_peers` reply
/// and a `find_node` reply can carry the same keys), so [`Response`] is a
/// single shape and the transaction manager supplies the query type when
/// the response is correlated.
#[derive(Debug, Clone)]
pub enum Message {
    Query {
        transaction_id: Bytes,
        query: Query,
    },
    Response {
        transaction_id: Bytes,
        response: Response,
    },
    Error {
        transaction_id: Bytes,
        code: i64,
        message: String,
    },
}

#[derive(Debug, Clone)]
pub enum Query {
    Ping {
        id: NodeId,
    },
    FindNode {
        id: NodeId,
        target: NodeId,
    },
    GetPeers {
        id: NodeId,
        info_hash: InfoHash,
    },
    AnnouncePeer {
        id: NodeId,
        info_hash: InfoHash,
        implied_port: bool,
        port: u16,
        token: Bytes,
    },
    /// A query outside the core four, passed through to the host.
    Other {
        name: String,
        id: Option<NodeId>,
    },
}

/// Return values of any response message.
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub id: Option<NodeId>,
    pub nodes: Vec<DhtNode>,
    pub values: Vec<SocketAddr>,
    pub token: Option<Bytes>,
}

/// Token handed out in `get_peers` responses: the first two bytes of the
/// requested info hash. Not a secret and trivially forgeable; kept
/// deliberately, see DESIGN.md.
pub fn token_for(info_hash: &InfoHash) -> Bytes {
    Bytes::copy_from_slice(&info_hash.0[..2])
}

impl Message {
    pub fn ping_query(transaction_id: Bytes, id: NodeId) -> Self {
        Message::Query {
            transaction_id,
            query: Query::Ping { id },
        }
    }

    pub fn ping_response(transaction_id: Bytes, id: NodeId) -> Self {
        Message::Response {
            transaction_id,
            response: Response {
                id: Some(id),
                ..Response::default()
            },
        }
    }

    /// Builds a `find_node` query for a freshly randomized target; used
    /// during bootstrap to populate the table with spread-out nodes.
    pub fn find_node_query(transaction_id: Bytes, id: NodeId) -> Self {
        Message::Query {
            transaction_id,
            query: Query::FindNode {
                id,
                target: NodeId::generate(),
            },
        }
    }

    pub fn find_node_response(transaction_id: Bytes, id: NodeId, nodes: Vec<DhtNode>) -> Self {
        Message::Response {
            transaction_id,
            response: Response {
                id: Some(id),
                nodes,
                ..Response::default()
            },
        }
    }

    pub fn get_peers_query(transaction_id: Bytes, id: NodeId, info_hash: InfoHash) -> Self {
        Message::Query {
            transaction_id,
            query: Query::GetPeers { id, info_hash },
        }
    }

    pub fn get_peers_response(
        transaction_id: Bytes,
        id: NodeId,
        info_hash: InfoHash,
        values: Vec<SocketAddr>,
        nodes: Vec<DhtNode>,
    ) -> Self {
        Message::Response {
            transaction_id,
            response: Response {
                id: Some(id),
                nodes,
                values,
                token: Some(token_for(&info_hash)),
            },
        }
    }

    pub fn announce_peer_query(
        transaction_id: Bytes,
        id: NodeId,
        info_hash: InfoHash,
        implied_port: bool,
        port: u16,
        token: Bytes,
    ) -> Self {
        Message::Query {
            transaction_id,
            query: Query::AnnouncePeer {
                id,
                info_hash,
                implied_port,
                port,
                token,
            },
        }
    }

    pub fn announce_peer_response(transaction_id: Bytes, id: NodeId) -> Self {
        Message::Response {
            transaction_id,
            response: Response {
                id: Some(id),
                ..Response::default()
            },
        }
    }

    pub fn error(transaction_id: Bytes, code: i64, message: String) -> Self {
        Message::Error {
            transaction_id,
            code,
            message,
        }
    }

    pub fn transaction_id(&self) -> &Bytes {
        match self {
            Message::Query { transaction_id, .. }
            | Message::Response { transaction_id, .. }
            | Message::Error { transaction_id, .. } => transaction_id,
        }
    }

    /// Parses a datagram. Anything malformed, truncated or unrecognized
    /// yields `None`; the caller drops the datagram.
    pub fn parse(data: &[u8]) -> Option<Message> {
        let value = decode(data).ok()?;
        let dict = value.as_dict()?;

        let transaction_id = dict.get(b"t".as_slice())?.as_bytes()?.clone();

        match dict.get(b"y".as_slice())?.as_str()? {
            "q" => parse_query(transaction_id, dict),
            "r" => parse_response(transaction_id, dict),
            "e" => parse_error(transaction_id, dict),
            _ => None,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut dict = BTreeMap::new();
        dict.insert(
            Bytes::from_static(b"t"),
            Value::Bytes(self.transaction_id().clone()),
        );
        dict.insert(Bytes::from_static(b"v"), Value::bytes(CLIENT_VERSION));

        match self {
            Message::Query { query, .. } => {
                dict.insert(Bytes::from_static(b"y"), Value::string("q"));
                let (name, args) = encode_query(query);
                dict.insert(Bytes::from_static(b"q"), Value::string(name));
                dict.insert(Bytes::from_static(b"a"), Value::Dict(args));
            }
            Message::Response { response, .. } => {
                dict.insert(Bytes::from_static(b"y"), Value::string("r"));
                dict.insert(Bytes::from_static(b"r"), Value::Dict(encode_response(response)));
            }
            Message::Error { code, message, .. } => {
                dict.insert(Bytes::from_static(b"y"), Value::string("e"));
                dict.insert(
                    Bytes::from_static(b"e"),
                    Value::List(vec![Value::Integer(*code), Value::string(message)]),
                );
            }
        }

        encode(&Value::Dict(dict))
    }
}

fn get_id(dict: &BTreeMap<Bytes, Value>, key: &[u8]) -> Option<NodeId> {
    NodeId::from_bytes(dict.get(key)?.as_bytes()?).ok()
}

fn parse_query(transaction_id: Bytes, dict: &BTreeMap<Bytes, Value>) -> Option<Message> {
    let name = dict.get(b"q".as_slice())?.as_str()?;
    let args = dict.get(b"a".as_slice())?.as_dict()?;

    let query = match name {
        "ping" => Query::Ping {
            id: get_id(args, b"id")?,
        },
        "find_node" => Query::FindNode {
            id: get_id(args, b"id")?,
            target: get_id(args, b"target")?,
        },
        "get_peers" => Query::GetPeers {
            id: get_id(args, b"id")?,
            info_hash: get_id(args, b"info_hash")?,
        },
        "announce_peer" => Query::AnnouncePeer {
            id: get_id(args, b"id")?,
            info_hash: get_id(args, b"info_hash")?,
            implied_port: args
                .get(b"implied_port".as_slice())
                .and_then(|v| v.as_integer())
                == Some(1),
            port: u16::try_from(args.get(b"port".as_slice())?.as_integer()?).ok()?,
            token: args.get(b"token".as_slice())?.as_bytes()?.clone(),
        },
        other => Query::Other {
            name: other.to_string(),
            id: get_id(args, b"id"),
        },
    };

    Some(Message::Query {
        transaction_id,
        query,
    })
}

fn parse_response(transaction_id: Bytes, dict: &BTreeMap<Bytes, Value>) -> Option<Message> {
    let ret = dict.get(b"r".as_slice())?.as_dict()?;

    let id = get_id(ret, b"id");

    let nodes = match ret.get(b"nodes".as_slice()) {
        Some(v) => decode_compact_nodes(v.as_bytes()?)?,
        None => Vec::new(),
    };

    let values = match ret.get(b"values".as_slice()) {
        Some(v) => v
            .as_list()?
            .iter()
            .map(|item| decode_compact_peer(item.as_bytes()?))
            .collect::<Option<Vec<_>>>()?,
        None => Vec::new(),
    };

    let token = ret
        .get(b"token".as_slice())
        .and_then(|v| v.as_bytes())
        .cloned();

    Some(Message::Response {
        transaction_id,
        response: Response {
            id,
            nodes,
            values,
            token,
        },
    })
}

fn parse_error(transaction_id: Bytes, dict: &BTreeMap<Bytes, Value>) -> Option<Message> {
    let list = dict.get(b"e".as_slice())?.as_list()?;

    let code = list.first()?.as_integer()?;
    let message = list.get(1).and_then(|v| v.as_str()).unwrap_or("").to_string();

    Some(Message::Error {
        transaction_id,
        code,
        message,
    })
}

fn encode_query(query: &Query) -> (&'static str, BTreeMap<Bytes, Value>) {
    let mut args = BTreeMap::new();
    let put_id = |args: &mut BTreeMap<Bytes, Value>, id: &NodeId| {
        args.insert(Bytes::from_static(b"id"), Value::bytes(&id.0));
    };

    match query {
        Query::Ping { id } => {
            put_id(&mut args, id);
            ("ping", args)
        }
        Query::FindNode { id, target } => {
            put_id(&mut args, id);
            args.insert(Bytes::from_static(b"target"), Value::bytes(&target.0));
            ("find_node", args)
        }
        Query::GetPeers { id, info_hash } => {
            put_id(&mut args, id);
            args.insert(Bytes::from_static(b"info_hash"), Value::bytes(&info_hash.0));
            ("get_peers", args)
        }
        Query::AnnouncePeer {
            id,
            info_hash,
            implied_port,
            port,
            token,
        } => {
            put_id(&mut args, id);
            args.insert(Bytes::from_static(b"info_hash"), Value::bytes(&info_hash.0));
            if *implied_port {
                args.insert(Bytes::from_static(b"implied_port"), Value::Integer(1));
            }
            args.insert(Bytes::from_static(b"port"), Value::Integer(*port as i64));
            args.insert(Bytes::from_static(b"token"), Value::Bytes(token.clone()));
            ("announce_peer", args)
        }
        // Outgoing Other queries carry no arguments beyond the id; the
        // variant exists for inbound passthrough.
        Query::Other { id, .. } => {
            if let Some(id) = id {
                put_id(&mut args, id);
            }
            ("unknown", args)
        }
    }
}

fn encode_response(response: &Response) -> BTreeMap<Bytes, Value> {
    let mut ret = BTreeMap::new();

    if let Some(id) = &response.id {
        ret.insert(Bytes::from_static(b"id"), Value::bytes(&id.0));
    }

    if !response.nodes.is_empty() {
        let mut compact = Vec::with_capacity(response.nodes.len() * 26);
        for node in &response.nodes {
            if let Some(bytes) = node.to_compact() {
                compact.extend_from_slice(&bytes);
            }
        }
        ret.insert(Bytes::from_static(b"nodes"), Value::Bytes(Bytes::from(compact)));
    } else if response.token.is_some() {
        // get_peers responses always carry a nodes key, even when empty.
        ret.insert(Bytes::from_static(b"nodes"), Value::Bytes(Bytes::new()));
    }

    if !response.values.is_empty() {
        let values = response
            .values
            .iter()
            .filter_map(encode_compact_peer)
            .map(|raw| Value::bytes(&raw))
            .collect();
        ret.insert(Bytes::from_static(b"values"), Value::List(values));
    }

    if let Some(token) = &response.token {
        ret.insert(Bytes::from_static(b"token"), Value::Bytes(token.clone()));
    }

    ret
}
