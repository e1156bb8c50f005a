//! TFTP packet codec.
//!
//! Decoding and encoding of the six TFTP packet kinds (RFC 1350, RFC 2347).

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, TftpError};

/// Smallest block size a client may negotiate (RFC 2348).
pub const MIN_BLOCK_SIZE: u16 = 8;

/// Largest block size a client may negotiate (RFC 2348).
pub const MAX_BLOCK_SIZE: u16 = 65464;

/// Block size used when none was negotiated (RFC 1350).
pub const DEFAULT_BLOCK_SIZE: u16 = 512;

/// Packet opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Opcode {
    Rrq = 1,
    Wrq = 2,
    Data = 3,
    Ack = 4,
    Error = 5,
    Oack = 6,
}

impl TryFrom<u16> for Opcode {
    type Error = TftpError;

    fn try_from(value: u16) -> Result<Self> {
        match value {
            1 => Ok(Opcode::Rrq),
            2 => Ok(Opcode::Wrq),
            3 => Ok(Opcode::Data),
            4 => Ok(Opcode::Ack),
            5 => Ok(Opcode::Error),
            6 => Ok(Opcode::Oack),
            other => Err(TftpError::InvalidPacket(format!("unknown opcode {other}"))),
        }
    }
}

/// Error codes carried by ERROR packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    NotDefined = 0,
    FileNotFound = 1,
    AccessViolation = 2,
    DiskFull = 3,
    IllegalOperation = 4,
    UnknownTransferId = 5,
    FileAlreadyExists = 6,
    NoSuchUser = 7,
    /// RFC 2347
    OptionNegotiationFailed = 8,
}

impl From<u16> for ErrorCode {
    fn from(value: u16) -> Self {
        match value {
            1 => ErrorCode::FileNotFound,
            2 => ErrorCode::AccessViolation,
            3 => ErrorCode::DiskFull,
            4 => ErrorCode::IllegalOperation,
            5 => ErrorCode::UnknownTransferId,
            6 => ErrorCode::FileAlreadyExists,
            7 => ErrorCode::NoSuchUser,
            8 => ErrorCode::OptionNegotiationFailed,
            _ => ErrorCode::NotDefined,
        }
    }
}

/// Transfer mode named in a request.
///
/// The engine moves bytes verbatim in every mode; netascii translation is
/// left to the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Octet,
    NetAscii,
    Mail,
}

impl Mode {
    fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "octet" => Ok(Mode::Octet),
            "netascii" => Ok(Mode::NetAscii),
            "mail" => Ok(Mode::Mail),
            other => Err(TftpError::InvalidPacket(format!("unknown mode {other:?}"))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Octet => "octet",
            Mode::NetAscii => "netascii",
            Mode::Mail => "mail",
        }
    }
}

/// Negotiable transfer options.
///
/// Unknown options and options with unparsable values are dropped while
/// decoding, which RFC 2347 treats as the server not supporting them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferOptions {
    /// Block size (RFC 2348)
    pub blksize: Option<u16>,
    /// Transfer size (RFC 2349)
    pub tsize: Option<u64>,
    /// Retransmission timeout in seconds (RFC 2349)
    pub timeout: Option<u8>,
}

impl TransferOptions {
    pub fn is_empty(&self) -> bool {
        self.blksize.is_none() && self.tsize.is_none() && self.timeout.is_none()
    }

    fn decode(mut fields: Fields<'_>) -> Self {
        let mut options = TransferOptions::default();
        while let Some(key) = fields.next() {
            let Some(value) = fields.next() else { break };
            match key.to_ascii_lowercase().as_str() {
                "blksize" => {
                    options.blksize = value.parse().ok().filter(|b| *b >= MIN_BLOCK_SIZE)
                }
                "tsize" => options.tsize = value.parse().ok(),
                "timeout" => options.timeout = value.parse().ok().filter(|t| *t > 0),
                _ => {}
            }
        }
        options
    }

    fn encode(&self, buf: &mut BytesMut) {
        if let Some(blksize) = self.blksize {
            put_field(buf, "blksize");
            put_field(buf, &blksize.to_string());
        }
        if let Some(tsize) = self.tsize {
            put_field(buf, "tsize");
            put_field(buf, &tsize.to_string());
        }
        if let Some(timeout) = self.timeout {
            put_field(buf, "timeout");
            put_field(buf, &timeout.to_string());
        }
    }
}

/// Body of an RRQ or WRQ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub filename: String,
    pub mode: Mode,
    pub options: TransferOptions,
}

/// A decoded TFTP packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Rrq(Request),
    Wrq(Request),
    Data { block: u16, data: Bytes },
    Ack(u16),
    Error { code: ErrorCode, message: String },
    Oack(TransferOptions),
}

impl Packet {
    /// Decode a datagram.
    pub fn parse(datagram: &[u8]) -> Result<Self> {
        if datagram.len() < 2 {
            return Err(TftpError::InvalidPacket("packet too short".to_string()));
        }
        let mut buf = datagram;
        let opcode = Opcode::try_from(buf.get_u16())?;

        match opcode {
            Opcode::Rrq => Ok(Packet::Rrq(Self::parse_request(buf)?)),
            Opcode::Wrq => Ok(Packet::Wrq(Self::parse_request(buf)?)),
            Opcode::Data => {
                if buf.len() < 2 {
                    return Err(TftpError::InvalidPacket("truncated DATA".to_string()));
                }
                let block = buf.get_u16();
                Ok(Packet::Data {
                    block,
                    data: Bytes::copy_from_slice(buf),
                })
            }
            Opcode::Ack => {
                if buf.len() < 2 {
                    return Err(TftpError::InvalidPacket("truncated ACK".to_string()));
                }
                Ok(Packet::Ack(buf.get_u16()))
            }
            Opcode::Error => {
                if buf.len() < 2 {
                    return Err(TftpError::InvalidPacket("truncated ERROR".to_string()));
                }
                let code = ErrorCode::from(buf.get_u16());
                let message = Fields::new(buf).next().unwrap_or_default();
                Ok(Packet::Error { code, message })
            }
            Opcode::Oack => Ok(Packet::Oack(TransferOptions::decode(Fields::new(buf)))),
        }
    }

    fn parse_request(body: &[u8]) -> Result<Request> {
        let mut fields = Fields::new(body);
        let filename = fields
            .next_terminated()
            .ok_or_else(|| TftpError::InvalidPacket("missing filename".to_string()))?;
        let mode = fields
            .next_terminated()
            .ok_or_else(|| TftpError::InvalidPacket("missing mode".to_string()))?;
        let mode = Mode::parse(&mode)?;
        let options = TransferOptions::decode(fields);

        Ok(Request {
            filename,
            mode,
            options,
        })
    }

    /// Encode into a datagram.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        match self {
            Packet::Rrq(request) => Self::encode_request(&mut buf, Opcode::Rrq, request),
            Packet::Wrq(request) => Self::encode_request(&mut buf, Opcode::Wrq, request),
            Packet::Data { block, data } => {
                buf.reserve(4 + data.len());
                buf.put_u16(Opcode::Data as u16);
                buf.put_u16(*block);
                buf.put_slice(data);
            }
            Packet::Ack(block) => {
                buf.put_u16(Opcode::Ack as u16);
                buf.put_u16(*block);
            }
            Packet::Error { code, message } => {
                buf.put_u16(Opcode::Error as u16);
                buf.put_u16(*code as u16);
                put_field(&mut buf, message);
            }
            Packet::Oack(options) => {
                buf.put_u16(Opcode::Oack as u16);
                options.encode(&mut buf);
            }
        }
        buf.freeze()
    }

    fn encode_request(buf: &mut BytesMut, opcode: Opcode, request: &Request) {
        buf.put_u16(opcode as u16);
        put_field(buf, &request.filename);
        put_field(buf, request.mode.as_str());
        request.options.encode(buf);
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Packet::Error {
            code,
            message: message.into(),
        }
    }
}

fn put_field(buf: &mut BytesMut, value: &str) {
    buf.put_slice(value.as_bytes());
    buf.put_u8(0);
}

/// Iterator over NUL-terminated string fields.
struct Fields<'a> {
    rest: &'a [u8],
}

impl<'a> Fields<'a> {
    fn new(rest: &'a [u8]) -> Self {
        Self { rest }
    }

    /// Next field, only if it is properly NUL-terminated.
    fn next_terminated(&mut self) -> Option<String> {
        let end = self.rest.iter().position(|&b| b == 0)?;
        let field = String::from_utf8_lossy(&self.rest[..end]).into_owned();
        self.rest = &self.rest[end + 1..];
        Some(field)
    }
}

impl Iterator for Fields<'_> {
    type Item = String;

    /// Next field; a trailing field without terminator is accepted.
    fn next(&mut self) -> Option<String> {
        if self.rest.is_empty() {
            return None;
        }
        if let Some(field) = self.next_terminated() {
            return Some(field);
        }
        let field = String::from_utf8_lossy(self.rest).into_owned();
        self.rest = &[];
        Some(field)
    }
}
