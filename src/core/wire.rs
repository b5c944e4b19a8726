// Protobuf (proto3) wire primitives: varints, field keys, length-delimited reads, skipping.
use std::fmt;

/// Largest length-delimited field accepted by the reader.
pub const MAX_FIELD_LEN: usize = 64 * 1024 * 1024;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WireType {
    Varint = 0,
    Fixed64 = 1,
    LengthDelimited = 2,
    Fixed32 = 5,
}

impl WireType {
    fn from_u8(value: u8) -> Result<Self, WireError> {
        match value {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::Fixed64),
            2 => Ok(WireType::LengthDelimited),
            5 => Ok(WireType::Fixed32),
            other => Err(WireError::InvalidWireType(other)),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum WireError {
    Truncated,
    VarintOverflow,
    InvalidWireType(u8),
    InvalidFieldNumber,
    LengthOverflow(u64),
    UnexpectedWireType {
        field: u32,
        expected: WireType,
        found: WireType,
    },
    InvalidUtf8 {
        field: u32,
    },
    InvalidValue {
        field: u32,
        reason: &'static str,
    },
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::Truncated => write!(f, "message truncated"),
            WireError::VarintOverflow => write!(f, "varint exceeds 64 bits"),
            WireError::InvalidWireType(value) => write!(f, "invalid wire type {value}"),
            WireError::InvalidFieldNumber => write!(f, "invalid field number 0"),
            WireError::LengthOverflow(len) => write!(f, "field length {len} exceeds limit"),
            WireError::UnexpectedWireType {
                field,
                expected,
                found,
            } => write!(
                f,
                "field {field}: expected wire type {expected:?}, found {found:?}"
            ),
            WireError::InvalidUtf8 { field } => write!(f, "field {field}: invalid utf-8"),
            WireError::InvalidValue { field, reason } => write!(f, "field {field}: {reason}"),
        }
    }
}

impl std::error::Error for WireError {}

/// Cursor over an encoded message. Borrowed slices point into the input.
#[derive(Clone, Debug)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Reads the next field key, or `None` at the end of the message.
    pub fn next_field(&mut self) -> Result<Option<(u32, WireType)>, WireError> {
        if self.is_empty() {
            return Ok(None);
        }
        let key = self.read_varint()?;
        let wire_type = WireType::from_u8((key & 0x7) as u8)?;
        let field = key >> 3;
        if field == 0 {
            return Err(WireError::InvalidFieldNumber);
        }
        let field = u32::try_from(field).map_err(|_| WireError::InvalidFieldNumber)?;
        Ok(Some((field, wire_type)))
    }

    pub fn read_varint(&mut self) -> Result<u64, WireError> {
        let mut value: u64 = 0;
        for index in 0..10 {
            let byte = *self.buf.get(self.pos).ok_or(WireError::Truncated)?;
            self.pos += 1;
            if index == 9 && byte > 1 {
                return Err(WireError::VarintOverflow);
            }
            value |= u64::from(byte & 0x7f) << (7 * index);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(WireError::VarintOverflow)
    }

    pub fn read_bytes(&mut self) -> Result<&'a [u8], WireError> {
        let len = self.read_varint()?;
        if len > MAX_FIELD_LEN as u64 {
            return Err(WireError::LengthOverflow(len));
        }
        let len = len as usize;
        let end = self.pos.checked_add(len).ok_or(WireError::Truncated)?;
        let slice = self.buf.get(self.pos..end).ok_or(WireError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    pub fn read_string(&mut self, field: u32) -> Result<String, WireError> {
        let bytes = self.read_bytes()?;
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|_| WireError::InvalidUtf8 { field })
    }

    pub fn read_int64(&mut self) -> Result<i64, WireError> {
        Ok(self.read_varint()? as i64)
    }

    /// proto3 `int32`: negative values arrive sign-extended to ten bytes.
    pub fn read_int32(&mut self) -> Result<i32, WireError> {
        Ok(self.read_varint()? as i64 as i32)
    }

    pub fn skip(&mut self, wire_type: WireType) -> Result<(), WireError> {
        match wire_type {
            WireType::Varint => {
                self.read_varint()?;
            }
            WireType::Fixed64 => self.advance(8)?,
            WireType::Fixed32 => self.advance(4)?,
            WireType::LengthDelimited => {
                self.read_bytes()?;
            }
        }
        Ok(())
    }

    fn advance(&mut self, len: usize) -> Result<(), WireError> {
        let end = self.pos.checked_add(len).ok_or(WireError::Truncated)?;
        if end > self.buf.len() {
            return Err(WireError::Truncated);
        }
        self.pos = end;
        Ok(())
    }
}

pub fn expect_wire_type(
    field: u32,
    found: WireType,
    expected: WireType,
) -> Result<(), WireError> {
    if found == expected {
        Ok(())
    } else {
        Err(WireError::UnexpectedWireType {
            field,
            expected,
            found,
        })
    }
}

/// Emits fields in call order; proto3 default scalars are omitted.
#[derive(Clone, Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn string(&mut self, field: u32, value: &str) -> &mut Self {
        if !value.is_empty() {
            self.key(field, WireType::LengthDelimited);
            self.put_len_prefixed(value.as_bytes());
        }
        self
    }

    pub fn optional_string(&mut self, field: u32, value: Option<&str>) -> &mut Self {
        if let Some(value) = value {
            self.key(field, WireType::LengthDelimited);
            self.put_len_prefixed(value.as_bytes());
        }
        self
    }

    /// Repeated strings keep every element, empty ones included.
    pub fn repeated_string(&mut self, field: u32, values: &[String]) -> &mut Self {
        for value in values {
            self.key(field, WireType::LengthDelimited);
            self.put_len_prefixed(value.as_bytes());
        }
        self
    }

    pub fn bytes(&mut self, field: u32, value: &[u8]) -> &mut Self {
        if !value.is_empty() {
            self.key(field, WireType::LengthDelimited);
            self.put_len_prefixed(value);
        }
        self
    }

    /// Embedded messages are always written so presence survives a round trip.
    pub fn message(&mut self, field: u32, encoded: &[u8]) -> &mut Self {
        self.key(field, WireType::LengthDelimited);
        self.put_len_prefixed(encoded);
        self
    }

    pub fn int64(&mut self, field: u32, value: i64) -> &mut Self {
        if value != 0 {
            self.key(field, WireType::Varint);
            self.put_varint(value as u64);
        }
        self
    }

    pub fn int32(&mut self, field: u32, value: i32) -> &mut Self {
        if value != 0 {
            self.key(field, WireType::Varint);
            self.put_varint(i64::from(value) as u64);
        }
        self
    }

    fn key(&mut self, field: u32, wire_type: WireType) {
        self.put_varint((u64::from(field) << 3) | wire_type as u64);
    }

    fn put_len_prefixed(&mut self, value: &[u8]) {
        self.put_varint(value.len() as u64);
        self.buf.extend_from_slice(value);
    }

    fn put_varint(&mut self, mut value: u64) {
        while value >= 0x80 {
            self.buf.push((value as u8) | 0x80);
            value >>= 7;
        }
        self.buf.push(value as u8);
    }
}
