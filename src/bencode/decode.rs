use super::error::BencodeError;
use super::value::{Dict, Value};
use bytes::Bytes;

const MAX_DEPTH: usize = 32;

/// Decodes a single bencode value from `data`.
///
/// The whole input must be consumed; anything left over after the first
/// value is an error. Nesting is capped at 32 levels so hostile input
/// cannot blow the stack.
pub fn decode(data: &[u8]) -> Result<Value, BencodeError> {
    let mut parser = Parser { data, pos: 0 };
    let value = parser.value(0)?;

    if parser.pos != data.len() {
        return Err(BencodeError::TrailingBytes);
    }

    Ok(value)
}

struct Parser<'a> {
    data: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Result<u8, BencodeError> {
        self.data.get(self.pos).copied().ok_or(BencodeError::Truncated)
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    /// Advances past bytes until `stop`, returning the skipped slice. The
    /// stop byte itself is consumed.
    fn take_until(&mut self, stop: u8) -> Result<&[u8], BencodeError> {
        let start = self.pos;
        while self.peek()? != stop {
            self.bump();
        }
        let slice = &self.data[start..self.pos];
        self.bump();
        Ok(slice)
    }

    fn value(&mut self, depth: usize) -> Result<Value, BencodeError> {
        if depth >= MAX_DEPTH {
            return Err(BencodeError::TooDeep(MAX_DEPTH));
        }

        match self.peek()? {
            b'i' => self.integer(),
            b'l' => self.list(depth),
            b'd' => self.dict(depth),
            b'0'..=b'9' => self.byte_string().map(Value::Bytes),
            other => Err(BencodeError::UnexpectedByte(other)),
        }
    }

    fn integer(&mut self) -> Result<Value, BencodeError> {
        self.bump();
        let digits = self.take_until(b'e')?;
        parse_i64(digits)
            .map(Value::Integer)
            .ok_or(BencodeError::MalformedInteger)
    }

    fn byte_string(&mut self) -> Result<Bytes, BencodeError> {
        let digits = self.take_until(b':')?;
        // A length field never has a sign or leading zeros (except "0").
        let len = parse_i64(digits)
            .filter(|n| *n >= 0)
            .ok_or(BencodeError::MalformedLength)? as usize;

        let end = self.pos.checked_add(len).ok_or(BencodeError::Truncated)?;
        if end > self.data.len() {
            return Err(BencodeError::Truncated);
        }

        let bytes = Bytes::copy_from_slice(&self.data[self.pos..end]);
        self.pos = end;
        Ok(bytes)
    }

    fn list(&mut self, depth: usize) -> Result<Value, BencodeError> {
        self.bump();
        let mut items = Vec::new();

        while self.peek()? != b'e' {
            items.push(self.value(depth + 1)?);
        }
        self.bump();

        Ok(Value::List(items))
    }

    fn dict(&mut self, depth: usize) -> Result<Value, BencodeError> {
        self.bump();
        let mut dict = Dict::new();

        while self.peek()? != b'e' {
            if !self.peek()?.is_ascii_digit() {
                return Err(BencodeError::NonStringKey);
            }
            let key = self.byte_string()?;
            let value = self.value(depth + 1)?;
            dict.insert(key, value);
        }
        self.bump();

        Ok(Value::Dict(dict))
    }
}

/// Canonical bencode integer: optional leading minus, no leading zeros
/// (except "0" itself), no "-0".
fn parse_i64(digits: &[u8]) -> Option<i64> {
    let (negative, body) = match digits.split_first()? {
        (b'-', rest) => (true, rest),
        _ => (false, digits),
    };

    if body.is_empty() || (body[0] == b'0' && body.len() > 1) {
        return None;
    }
    if negative && body == b"0" {
        return None;
    }

    let text = std::str::from_utf8(digits).ok()?;
    text.parse().ok()
}
