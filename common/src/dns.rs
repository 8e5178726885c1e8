//! Wildcard DNS: every A question is answered with the portal address.

use std::net::Ipv4Addr;

pub const DNS_RESPONSE_TTL: u32 = 60;
pub const MAX_DNS_PACKET: usize = 512;

const HEADER_LEN: usize = 12;
const QTYPE_A: u16 = 1;
const QTYPE_ANY: u16 = 255;
const QCLASS_IN: u16 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsQuestion {
    /// Length of the question section (name + qtype + qclass).
    pub len: usize,
    pub qtype: u16,
    pub qclass: u16,
    pub name: String,
}

impl DnsQuestion {
    fn wants_ipv4(&self) -> bool {
        matches!(self.qtype, QTYPE_A | QTYPE_ANY)
    }
}

/// Parses the first question of a standard query. Responses, non-zero opcodes
/// and compressed or truncated names are rejected.
pub fn parse_question(packet: &[u8]) -> Option<DnsQuestion> {
    if packet.len() < HEADER_LEN {
        return None;
    }

    let flags = packet[2];
    let is_response = flags & 0x80 != 0;
    let opcode = (flags >> 3) & 0x0F;
    if is_response || opcode != 0 {
        return None;
    }

    let qdcount = u16::from_be_bytes([packet[4], packet[5]]);
    if qdcount == 0 {
        return None;
    }

    let mut idx = HEADER_LEN;
    let mut name = String::new();

    loop {
        let label_len = *packet.get(idx)? as usize;
        idx += 1;
        if label_len == 0 {
            break;
        }
        // compression pointers never appear in a well-formed first question
        if label_len & 0xC0 != 0 || idx + label_len > packet.len() {
            return None;
        }
        let label = std::str::from_utf8(&packet[idx..idx + label_len]).ok()?;
        if !name.is_empty() {
            name.push('.');
        }
        name.push_str(label);
        idx += label_len;
    }

    if idx + 4 > packet.len() {
        return None;
    }

    let qtype = u16::from_be_bytes([packet[idx], packet[idx + 1]]);
    let qclass = u16::from_be_bytes([packet[idx + 2], packet[idx + 3]]);
    idx += 4;

    Some(DnsQuestion {
        len: idx - HEADER_LEN,
        qtype,
        qclass,
        name,
    })
}

/// Builds the reply for `query`. A/ANY questions in class IN get a single A
/// record; anything else gets an empty NOERROR answer.
pub fn build_response(query: &[u8], question: &DnsQuestion, answer_ip: Ipv4Addr) -> Vec<u8> {
    let question_end = HEADER_LEN + question.len;
    let answer = question.wants_ipv4() && question.qclass == QCLASS_IN;
    let answer_count: u16 = u16::from(answer);

    let mut response = Vec::with_capacity(question_end + 16);
    response.extend_from_slice(&query[0..2]);
    // QR + recursion desired copied from the query, recursion available
    response.push(0x80 | (query[2] & 0x01));
    response.push(0x80);
    response.extend_from_slice(&1u16.to_be_bytes());
    response.extend_from_slice(&answer_count.to_be_bytes());
    response.extend_from_slice(&0u16.to_be_bytes());
    response.extend_from_slice(&0u16.to_be_bytes());
    response.extend_from_slice(&query[HEADER_LEN..question_end]);

    if answer {
        // name pointer back to the question at offset 12
        response.extend_from_slice(&[0xC0, 0x0C]);
        response.extend_from_slice(&QTYPE_A.to_be_bytes());
        response.extend_from_slice(&QCLASS_IN.to_be_bytes());
        response.extend_from_slice(&DNS_RESPONSE_TTL.to_be_bytes());
        response.extend_from_slice(&4u16.to_be_bytes());
        response.extend_from_slice(&answer_ip.octets());
    }

    response
}

/// Parses `query` and returns the reply to send, or `None` when the packet
/// should be dropped.
pub fn answer_query(query: &[u8], answer_ip: Ipv4Addr) -> Option<(DnsQuestion, Vec<u8>)> {
    let question = parse_question(query)?;
    let response = build_response(query, &question, answer_ip);
    Some((question, response))
}
