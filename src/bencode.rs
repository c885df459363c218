//! Bencode encoding and decoding ([BEP-3]).
//!
//! Bencode is the serialization format carried in every DHT datagram. It
//! has four data types: integers (`i42e`), byte strings (`4:spam`), lists
//! (`l...e`) and dictionaries (`d...e`, keys sorted lexicographically).
//!
//! # Examples
//!
//! ```
//! use signet_dht::bencode::{decode, encode, Value};
//!
//! let value = decode(b"d1:ad2:id2:hhe1:q4:ping1:t2:aa1:y1:qe").unwrap();
//! assert_eq!(value.get(b"q").and_then(|v| v.as_str()), Some("ping"));
//!
//! let roundtrip = encode(&value);
//! assert_eq!(decode(&roundtrip).unwrap(), value);
//! ```
//!
//! Decoding is strict: malformed integers, truncated strings, trailing
//! bytes and over-deep nesting are all rejected, so a [`decode`] success
//! means the input was a single well-formed bencode value.
//!
//! [BEP-3]: http://bittorrent.org/beps/bep_0003.html

mod decode;
mod encode;
mod error;
mod value;

pub use decode::decode;
pub use encode::encode;
pub use error::BencodeError;
pub use value::Value;
