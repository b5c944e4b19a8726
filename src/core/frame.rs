// gRPC-web body framing: 5-byte prefix (flags, u32 big-endian length), data and trailer frames.
use crate::core::error::{Error, ErrorKind};

pub const FRAME_PREFIX_LEN: usize = 5;
pub const FLAG_DATA: u8 = 0x00;
pub const FLAG_COMPRESSED: u8 = 0x01;
pub const FLAG_TRAILERS: u8 = 0x80;
/// Matches the default gRPC receive limit.
pub const MAX_MESSAGE_LEN: usize = 4 * 1024 * 1024;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FramePrefix {
    pub flags: u8,
    pub len: u32,
}

impl FramePrefix {
    pub fn encode(&self) -> [u8; FRAME_PREFIX_LEN] {
        let mut buf = [0u8; FRAME_PREFIX_LEN];
        buf[0] = self.flags;
        buf[1..5].copy_from_slice(&self.len.to_be_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < FRAME_PREFIX_LEN {
            return Err(Error::new(ErrorKind::Corrupt).with_message("grpc-web frame prefix truncated"));
        }
        let mut len = [0u8; 4];
        len.copy_from_slice(&buf[1..5]);
        Ok(Self {
            flags: buf[0],
            len: u32::from_be_bytes(len),
        })
    }

    pub fn is_trailers(&self) -> bool {
        self.flags & FLAG_TRAILERS != 0
    }

    pub fn validate(&self, max_len: usize) -> Result<(), Error> {
        if self.flags & FLAG_COMPRESSED != 0 {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message("compressed grpc-web frames are not supported")
                .with_hint("Disable response compression on the server or proxy."));
        }
        if self.flags & !(FLAG_TRAILERS | FLAG_COMPRESSED) != 0 {
            return Err(Error::new(ErrorKind::Corrupt).with_message("unknown grpc-web frame flags"));
        }
        if self.len as usize > max_len {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message(format!("grpc-web frame of {} bytes exceeds limit", self.len)));
        }
        Ok(())
    }
}

pub fn encode_message(message: &[u8]) -> Result<Vec<u8>, Error> {
    encode_frame(FLAG_DATA, message)
}

pub fn encode_trailers(trailers: &Trailers) -> Result<Vec<u8>, Error> {
    encode_frame(FLAG_TRAILERS, trailers.to_block().as_bytes())
}

fn encode_frame(flags: u8, payload: &[u8]) -> Result<Vec<u8>, Error> {
    let len = u32::try_from(payload.len()).map_err(|_| {
        Error::new(ErrorKind::Usage).with_message("grpc-web message exceeds u32 length")
    })?;
    let prefix = FramePrefix { flags, len };
    let mut out = Vec::with_capacity(FRAME_PREFIX_LEN + payload.len());
    out.extend_from_slice(&prefix.encode());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Lower-cased trailer metadata, in arrival order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Trailers {
    entries: Vec<(String, String)>,
}

impl Trailers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.entries.push((name.to_ascii_lowercase(), value.into()));
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.entries
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `grpc-status` as a number; `None` when absent or unparsable.
    pub fn status(&self) -> Option<u32> {
        self.get("grpc-status")?.trim().parse().ok()
    }

    pub fn message(&self) -> Option<String> {
        self.get("grpc-message").map(percent_decode)
    }

    /// Parses an HTTP/1-style header block (`name: value\r\n` lines).
    pub fn parse(block: &[u8]) -> Result<Self, Error> {
        let text = std::str::from_utf8(block).map_err(|err| {
            Error::new(ErrorKind::Corrupt)
                .with_message("grpc-web trailers are not utf-8")
                .with_source(err)
        })?;
        let mut trailers = Trailers::new();
        for line in text.split('\n') {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let Some((name, value)) = line.split_once(':') else {
                return Err(Error::new(ErrorKind::Corrupt)
                    .with_message(format!("malformed grpc-web trailer line {line:?}")));
            };
            trailers = trailers.with(name.trim(), value.trim());
        }
        Ok(trailers)
    }

    pub fn to_block(&self) -> String {
        let mut block = String::new();
        for (name, value) in &self.entries {
            block.push_str(name);
            block.push(':');
            block.push_str(value);
            block.push_str("\r\n");
        }
        block
    }
}

/// A decoded gRPC-web response body.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct GrpcWebBody {
    pub messages: Vec<Vec<u8>>,
    pub trailers: Trailers,
}

pub fn decode_body(body: &[u8], max_len: usize) -> Result<GrpcWebBody, Error> {
    let mut decoded = GrpcWebBody::default();
    let mut offset = 0;
    while offset < body.len() {
        let prefix = FramePrefix::decode(&body[offset..])?;
        prefix.validate(max_len)?;
        let start = offset + FRAME_PREFIX_LEN;
        let end = start + prefix.len as usize;
        let Some(payload) = body.get(start..end) else {
            return Err(Error::new(ErrorKind::Corrupt).with_message("grpc-web frame truncated"));
        };
        if prefix.is_trailers() {
            decoded.trailers = Trailers::parse(payload)?;
            if end != body.len() {
                return Err(Error::new(ErrorKind::Corrupt)
                    .with_message("data after grpc-web trailer frame"));
            }
        } else {
            decoded.messages.push(payload.to_vec());
        }
        offset = end;
    }
    Ok(decoded)
}

// grpc-message is percent-encoded per the gRPC HTTP/2 mapping.
fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut idx = 0;
    while idx < bytes.len() {
        if bytes[idx] == b'%' && idx + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[idx + 1..idx + 3]).ok();
            if let Some(byte) = hex.and_then(|hex| u8::from_str_radix(hex, 16).ok()) {
                out.push(byte);
                idx += 3;
                continue;
            }
        }
        out.push(bytes[idx]);
        idx += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
