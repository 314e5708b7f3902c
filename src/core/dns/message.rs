// src/core/dns/message.rs

//! Just enough of the DNS wire format to ask one question and read the
//! answer section of the reply.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

pub const HEADER_LEN: usize = 12;
/// Longest encoded domain name.
pub const MAX_NAME_LEN: usize = 255;
pub const MAX_LABEL_LEN: usize = 63;
pub const CLASS_IN: u16 = 1;

// Limit on compression pointers followed while reading one name.
const MAX_POINTER_HOPS: usize = 64;

const FLAG_RESPONSE: u16 = 0x8000;
const FLAG_TRUNCATED: u16 = 0x0200;
const FLAG_RECURSION_DESIRED: u16 = 0x0100;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    #[error("message truncated")]
    Truncated,
    #[error("compression pointer loop")]
    PointerLoop,
    #[error("domain name exceeds {MAX_NAME_LEN} octets")]
    NameTooLong,
    #[error("unsupported label type 0x{0:02x}")]
    BadLabelType(u8),
    #[error("invalid query name '{0}'")]
    InvalidName(String),
    #[error("record data overruns its length")]
    RdataOverrun,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    A,
    Aaaa,
    Afsdb,
    Other(u16),
}

impl From<u16> for RecordType {
    fn from(value: u16) -> Self {
        match value {
            1 => RecordType::A,
            28 => RecordType::Aaaa,
            18 => RecordType::Afsdb,
            other => RecordType::Other(other),
        }
    }
}

impl From<RecordType> for u16 {
    fn from(value: RecordType) -> Self {
        match value {
            RecordType::A => 1,
            RecordType::Aaaa => 28,
            RecordType::Afsdb => 18,
            RecordType::Other(other) => other,
        }
    }
}

/// Response codes, as carried in the low four header flag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rcode {
    NoError,
    FormErr,
    ServFail,
    NxDomain,
    NotImp,
    Refused,
    Other(u8),
}

impl From<u8> for Rcode {
    fn from(value: u8) -> Self {
        match value {
            0 => Rcode::NoError,
            1 => Rcode::FormErr,
            2 => Rcode::ServFail,
            3 => Rcode::NxDomain,
            4 => Rcode::NotImp,
            5 => Rcode::Refused,
            other => Rcode::Other(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub id: u16,
    pub flags: u16,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

impl Header {
    pub fn parse(msg: &[u8]) -> Result<Self, MessageError> {
        let mut buf = msg.get(..HEADER_LEN).ok_or(MessageError::Truncated)?;
        Ok(Self {
            id: buf.get_u16(),
            flags: buf.get_u16(),
            qdcount: buf.get_u16(),
            ancount: buf.get_u16(),
            nscount: buf.get_u16(),
            arcount: buf.get_u16(),
        })
    }

    pub fn is_response(&self) -> bool {
        self.flags & FLAG_RESPONSE != 0
    }

    pub fn is_truncated(&self) -> bool {
        self.flags & FLAG_TRUNCATED != 0
    }

    pub fn rcode(&self) -> Rcode {
        Rcode::from((self.flags & 0x000f) as u8)
    }
}

/// A single-question recursive query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query<'a> {
    pub id: u16,
    pub name: &'a str,
    pub rtype: RecordType,
}

impl Query<'_> {
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), MessageError> {
        dst.reserve(HEADER_LEN + self.name.len() + 6);
        dst.put_u16(self.id);
        dst.put_u16(FLAG_RECURSION_DESIRED);
        dst.put_u16(1);
        dst.put_u16(0);
        dst.put_u16(0);
        dst.put_u16(0);
        encode_name(self.name, dst)?;
        dst.put_u16(self.rtype.into());
        dst.put_u16(CLASS_IN);
        Ok(())
    }
}

fn encode_name(name: &str, dst: &mut BytesMut) -> Result<(), MessageError> {
    let invalid = || MessageError::InvalidName(name.to_string());
    let trimmed = name.strip_suffix('.').unwrap_or(name);

    let mut encoded_len = 1;
    if !trimmed.is_empty() {
        for label in trimmed.split('.') {
            if label.is_empty() || label.len() > MAX_LABEL_LEN {
                return Err(invalid());
            }
            encoded_len += 1 + label.len();
            if encoded_len > MAX_NAME_LEN {
                return Err(invalid());
            }
            dst.put_u8(label.len() as u8);
            dst.put_slice(label.as_bytes());
        }
    }
    dst.put_u8(0);
    Ok(())
}

/// Appends one label in presentation form.
fn push_label(out: &mut String, label: &[u8]) {
    for &b in label {
        match b {
            b'.' | b'\\' | b'"' | b';' | b'(' | b')' | b'@' | b'$' => {
                out.push('\\');
                out.push(b as char);
            }
            0x21..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\{b:03}")),
        }
    }
}

/// Reads a possibly compressed name starting at `start`. Returns the name
/// in presentation form (no trailing dot) and the offset just past the
/// name's encoding at `start`.
pub fn read_name(msg: &[u8], start: usize) -> Result<(String, usize), MessageError> {
    let mut out = String::new();
    let mut pos = start;
    let mut resume = None;
    let mut hops = 0;
    let mut wire_len = 0;

    loop {
        let len = *msg.get(pos).ok_or(MessageError::Truncated)?;
        match len & 0xc0 {
            0x00 if len == 0 => {
                resume.get_or_insert(pos + 1);
                break;
            }
            0x00 => {
                let len = len as usize;
                let label = msg
                    .get(pos + 1..pos + 1 + len)
                    .ok_or(MessageError::Truncated)?;
                wire_len += 1 + len;
                if wire_len + 1 > MAX_NAME_LEN {
                    return Err(MessageError::NameTooLong);
                }
                if !out.is_empty() {
                    out.push('.');
                }
                push_label(&mut out, label);
                pos += 1 + len;
            }
            0xc0 => {
                let low = *msg.get(pos + 1).ok_or(MessageError::Truncated)?;
                resume.get_or_insert(pos + 2);
                hops += 1;
                if hops > MAX_POINTER_HOPS {
                    return Err(MessageError::PointerLoop);
                }
                pos = (((len & 0x3f) as usize) << 8) | low as usize;
            }
            _ => return Err(MessageError::BadLabelType(len)),
        }
    }

    if out.is_empty() {
        out.push('.');
    }
    Ok((out, resume.unwrap_or(pos + 1)))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordData {
    Afsdb { subtype: u16, hostname: String },
    Other(Bytes),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    pub name: String,
    pub rtype: RecordType,
    pub class: u16,
    pub ttl: u32,
    pub data: RecordData,
}

/// A decoded reply: its header and answer section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: Header,
    pub answers: Vec<ResourceRecord>,
}

impl Message {
    pub fn parse(msg: &[u8]) -> Result<Self, MessageError> {
        let header = Header::parse(msg)?;
        let mut pos = HEADER_LEN;

        for _ in 0..header.qdcount {
            let (_, after) = read_name(msg, pos)?;
            pos = after + 4;
            if pos > msg.len() {
                return Err(MessageError::Truncated);
            }
        }

        let mut answers = Vec::with_capacity(header.ancount as usize);
        for _ in 0..header.ancount {
            let (record, after) = parse_record(msg, pos)?;
            answers.push(record);
            pos = after;
        }

        Ok(Self { header, answers })
    }
}

fn parse_record(msg: &[u8], start: usize) -> Result<(ResourceRecord, usize), MessageError> {
    let (name, pos) = read_name(msg, start)?;
    let mut fixed = msg.get(pos..pos + 10).ok_or(MessageError::Truncated)?;
    let rtype = RecordType::from(fixed.get_u16());
    let class = fixed.get_u16();
    let ttl = fixed.get_u32();
    let rdlength = fixed.get_u16() as usize;

    let rdata_start = pos + 10;
    let rdata_end = rdata_start + rdlength;
    let rdata = msg
        .get(rdata_start..rdata_end)
        .ok_or(MessageError::Truncated)?;

    let data = match rtype {
        RecordType::Afsdb => {
            if rdata.len() < 3 {
                return Err(MessageError::RdataOverrun);
            }
            let subtype = u16::from_be_bytes([rdata[0], rdata[1]]);
            // The host name may point back into earlier parts of the message.
            let (hostname, name_end) = read_name(msg, rdata_start + 2)?;
            if name_end > rdata_end {
                return Err(MessageError::RdataOverrun);
            }
            RecordData::Afsdb { subtype, hostname }
        }
        _ => RecordData::Other(Bytes::copy_from_slice(rdata)),
    };

    Ok((
        ResourceRecord {
            name,
            rtype,
            class,
            ttl,
            data,
        },
        rdata_end,
    ))
}
