//! DNS message inspection.
//!
//! The proxy relays messages byte-for-byte, so nothing here decodes a full
//! message model. We only read the few header and question fields that the
//! cache needs, and walk replies far enough to know they are well formed.

use std::fmt::Write;

use thiserror::Error;

pub const HEADER_LEN: usize = 12;

/// Record type of an IPv4 address query.
pub const TYPE_A: u16 = 1;
/// Record type of an IPv6 address query.
pub const TYPE_AAAA: u16 = 28;

const QR_BIT: u8 = 0x80;
const LABEL_KIND_MASK: u8 = 0xC0;
const RR_FIXED_LEN: usize = 10;

/// Why a reply was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MalformedMessage {
    #[error("message shorter than a DNS header")]
    Short,
    #[error("QR bit not set")]
    NotResponse,
    #[error("transaction id does not match the query")]
    IdMismatch,
    #[error("question section runs past the end of the message")]
    TruncatedQuestion,
    #[error("resource record runs past the end of the message")]
    TruncatedRecord,
}

/// The question of a single-question query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    /// Name in presentation form, with trailing dot and original case.
    pub name: String,
    pub qtype: u16,
    pub qclass: u16,
}

/// A parsed DNS query.
#[derive(Debug, Clone)]
pub struct Query {
    pub id: u16,
    /// Present only when the query carries exactly one readable question.
    pub question: Option<Question>,
}

impl Query {
    /// Parse a DNS query from raw bytes.
    ///
    /// Returns `None` only when `data` is too short to hold a header. A query
    /// whose question section is absent, repeated or unreadable parses with
    /// `question: None`.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < HEADER_LEN {
            return None;
        }

        let id = read_u16(data, 0)?;
        let qdcount = read_u16(data, 4)?;
        let question = if qdcount == 1 {
            parse_question(data)
        } else {
            None
        };

        Some(Self { id, question })
    }
}

fn parse_question(data: &[u8]) -> Option<Question> {
    let (name, pos) = read_name(data, HEADER_LEN)?;
    let qtype = read_u16(data, pos)?;
    let qclass = read_u16(data, pos + 2)?;

    Some(Question {
        name,
        qtype,
        qclass,
    })
}

/// Read an uncompressed name at `pos`, returning its presentation form and
/// the offset just past it.
fn read_name(data: &[u8], mut pos: usize) -> Option<(String, usize)> {
    let mut name = String::new();

    loop {
        let len = *data.get(pos)?;
        pos += 1;
        if len == 0 {
            break;
        }
        // Compression pointers and the reserved label kinds.
        if len & LABEL_KIND_MASK != 0 {
            return None;
        }
        let label = data.get(pos..pos + len as usize)?;
        for &b in label {
            escape_byte(&mut name, b);
        }
        name.push('.');
        pos += len as usize;
    }

    if name.is_empty() {
        name.push('.');
    }

    Some((name, pos))
}

fn escape_byte(out: &mut String, b: u8) {
    match b {
        b'.' | b'\\' => {
            out.push('\\');
            out.push(b as char);
        }
        0x21..=0x7E => out.push(b as char),
        _ => {
            let _ = write!(out, "\\{b:03}");
        }
    }
}

/// Skip a possibly compressed name at `pos`.
fn skip_name(data: &[u8], mut pos: usize) -> Option<usize> {
    loop {
        let b = *data.get(pos)?;
        if b == 0 {
            return Some(pos + 1);
        }
        match b & LABEL_KIND_MASK {
            LABEL_KIND_MASK => {
                data.get(pos + 1)?;
                return Some(pos + 2);
            }
            0 => pos += 1 + b as usize,
            _ => return None,
        }
    }
}

/// Fields of a validated reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply {
    pub id: u16,
    pub answer_count: u16,
    /// TTL in seconds of the first answer record.
    pub first_answer_ttl: Option<u32>,
}

impl Reply {
    /// Validate a reply and extract the fields the cache relies on.
    ///
    /// Every question and every resource record of all three record sections
    /// must lie within the message. Trailing bytes are tolerated.
    pub fn parse(data: &[u8]) -> Result<Self, MalformedMessage> {
        if data.len() < HEADER_LEN {
            return Err(MalformedMessage::Short);
        }
        if data[2] & QR_BIT == 0 {
            return Err(MalformedMessage::NotResponse);
        }

        let id = u16::from_be_bytes([data[0], data[1]]);
        let qdcount = u16::from_be_bytes([data[4], data[5]]);
        let ancount = u16::from_be_bytes([data[6], data[7]]);
        let nscount = u16::from_be_bytes([data[8], data[9]]);
        let arcount = u16::from_be_bytes([data[10], data[11]]);

        let mut pos = HEADER_LEN;
        for _ in 0..qdcount {
            pos = skip_name(data, pos).ok_or(MalformedMessage::TruncatedQuestion)? + 4;
            if pos > data.len() {
                return Err(MalformedMessage::TruncatedQuestion);
            }
        }

        let total_rrs = ancount as usize + nscount as usize + arcount as usize;
        let mut first_answer_ttl = None;

        for i in 0..total_rrs {
            pos = skip_name(data, pos).ok_or(MalformedMessage::TruncatedRecord)?;
            let fixed = data
                .get(pos..pos + RR_FIXED_LEN)
                .ok_or(MalformedMessage::TruncatedRecord)?;

            if i == 0 && ancount > 0 {
                first_answer_ttl = Some(u32::from_be_bytes([fixed[4], fixed[5], fixed[6], fixed[7]]));
            }

            let rdlength = u16::from_be_bytes([fixed[8], fixed[9]]) as usize;
            pos += RR_FIXED_LEN + rdlength;
            if pos > data.len() {
                return Err(MalformedMessage::TruncatedRecord);
            }
        }

        Ok(Self {
            id,
            answer_count: ancount,
            first_answer_ttl,
        })
    }
}

/// Read the transaction id of a message.
pub fn message_id(data: &[u8]) -> Option<u16> {
    read_u16(data, 0)
}

/// Overwrite the transaction id of a message in place.
pub fn set_id(data: &mut [u8], id: u16) {
    if let Some(bytes) = data.get_mut(..2) {
        bytes.copy_from_slice(&id.to_be_bytes());
    }
}

/// Mnemonic for the record types this proxy cares about.
pub fn type_name(qtype: u16) -> &'static str {
    match qtype {
        TYPE_A => "A",
        TYPE_AAAA => "AAAA",
        _ => "OTHER",
    }
}

fn read_u16(data: &[u8], pos: usize) -> Option<u16> {
    let bytes = data.get(pos..pos + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}
