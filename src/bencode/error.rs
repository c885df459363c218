use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BencodeError {
    #[error("truncated input")]
    Truncated,

    #[error("malformed integer")]
    MalformedInteger,

    #[error("malformed string length")]
    MalformedLength,

    #[error("unexpected byte {0:#04x}")]
    UnexpectedByte(u8),

    #[error("dictionary key is not a byte string")]
    NonStringKey,

    #[error("trailing bytes after value")]
    TrailingBytes,

    #[error("nesting deeper than {0} levels")]
    TooDeep(usize),
}
