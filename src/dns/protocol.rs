//! implements the DNS protocol in a transport agnostic fashion

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use derive_more::{Display, Error, From};

use crate::dns::buffer::{PacketBuffer, VectorPacketBuffer};
use crate::dns::record_parsers::RecordParser;

#[derive(Debug, Display, From, Error)]
pub enum ProtocolError {
    Buffer(crate::dns::buffer::BufferError),
    Io(std::io::Error),
}

type Result<T> = std::result::Result<T, ProtocolError>;

/// The Internet class
pub const CLASS_IN: u16 = 1;

/// Top bit of the class field of a resource record in an mDNS response:
/// receivers should flush previously cached records for the name (RFC 6762 §10.2)
pub const CACHE_FLUSH_BIT: u16 = 0x8000;

/// Top bit of the class field of an mDNS question: the querier prefers a
/// unicast response (RFC 6762 §5.4)
pub const UNICAST_RESPONSE_BIT: u16 = 0x8000;

/// `QueryType` represents the requested Record Type of a query
///
/// The specific type Unknown that an integer parameter in order to retain the
/// id of an unknown query when compiling the reply. An integer can be converted
/// to a querytype using the `from_num` function, and back to an integer using
/// the `to_num` method.
#[derive(PartialEq, Eq, Debug, Clone, Hash, Copy, PartialOrd, Ord)]
pub enum QueryType {
    Unknown(u16),
    A,     // 1
    Ns,    // 2
    Cname, // 5
    Ptr,   // 12
    Txt,   // 16
    Aaaa,  // 28
    Srv,   // 33
    Any,   // 255
}

impl QueryType {
    pub fn to_num(&self) -> u16 {
        match *self {
            QueryType::Unknown(x) => x,
            QueryType::A => 1,
            QueryType::Ns => 2,
            QueryType::Cname => 5,
            QueryType::Ptr => 12,
            QueryType::Txt => 16,
            QueryType::Aaaa => 28,
            QueryType::Srv => 33,
            QueryType::Any => 255,
        }
    }

    pub fn from_num(num: u16) -> QueryType {
        match num {
            1 => QueryType::A,
            2 => QueryType::Ns,
            5 => QueryType::Cname,
            12 => QueryType::Ptr,
            16 => QueryType::Txt,
            28 => QueryType::Aaaa,
            33 => QueryType::Srv,
            255 => QueryType::Any,
            _ => QueryType::Unknown(num),
        }
    }

    /// Whether a record of type `rtype` answers a question of this type.
    pub fn matches(&self, rtype: QueryType) -> bool {
        *self == QueryType::Any || *self == rtype
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            QueryType::Unknown(x) => write!(f, "TYPE{}", x),
            QueryType::A => write!(f, "A"),
            QueryType::Ns => write!(f, "NS"),
            QueryType::Cname => write!(f, "CNAME"),
            QueryType::Ptr => write!(f, "PTR"),
            QueryType::Txt => write!(f, "TXT"),
            QueryType::Aaaa => write!(f, "AAAA"),
            QueryType::Srv => write!(f, "SRV"),
            QueryType::Any => write!(f, "ANY"),
        }
    }
}

/// Presentation name of a class value, ignoring the mDNS top bit
pub fn class_name(class: u16) -> String {
    match class & !CACHE_FLUSH_BIT {
        1 => "IN".to_string(),
        3 => "CH".to_string(),
        4 => "HS".to_string(),
        other => format!("CLASS{}", other),
    }
}

/// Type specific data of a resource record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordData {
    A {
        addr: Ipv4Addr,
    }, // 1
    Ns {
        host: String,
    }, // 2
    Cname {
        host: String,
    }, // 5
    Ptr {
        host: String,
    }, // 12
    Txt {
        data: Vec<String>,
    }, // 16
    Aaaa {
        addr: Ipv6Addr,
    }, // 28
    Srv {
        priority: u16,
        weight: u16,
        port: u16,
        host: String,
    }, // 33
    Unknown {
        qtype: u16,
        data: Vec<u8>,
    },
}

/// `DnsRecord` is the primary representation of a DNS record
///
/// This is used for reading records from the network, for the records held
/// by the zone, and for writing responses. Equality covers every field,
/// including the TTL and the raw class value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DnsRecord {
    pub domain: String,
    pub class: u16,
    pub ttl: u32,
    pub data: RecordData,
}

impl DnsRecord {
    pub fn new(domain: &str, ttl: u32, data: RecordData) -> DnsRecord {
        DnsRecord {
            domain: domain.trim_end_matches('.').to_string(),
            class: CLASS_IN,
            ttl,
            data,
        }
    }

    pub fn read<T: PacketBuffer>(buffer: &mut T) -> Result<DnsRecord> {
        let mut domain = String::new();
        buffer.read_qname(&mut domain)?;

        let qtype_num = buffer.read_u16()?;
        let qtype = QueryType::from_num(qtype_num);
        let class = buffer.read_u16()?;
        let ttl = buffer.read_u32()?;
        let data_len = buffer.read_u16()?;

        let data_start = buffer.pos();

        let data = match qtype {
            QueryType::A => RecordParser::parse_a(buffer)?,
            QueryType::Aaaa => RecordParser::parse_aaaa(buffer)?,
            QueryType::Ns => RecordData::Ns {
                host: RecordParser::parse_name(buffer)?,
            },
            QueryType::Cname => RecordData::Cname {
                host: RecordParser::parse_name(buffer)?,
            },
            QueryType::Ptr => RecordData::Ptr {
                host: RecordParser::parse_name(buffer)?,
            },
            QueryType::Srv => RecordParser::parse_srv(buffer)?,
            QueryType::Txt => RecordParser::parse_txt(buffer, data_len)?,
            QueryType::Any | QueryType::Unknown(_) => {
                RecordParser::parse_unknown(buffer, qtype_num, data_len)?
            }
        };

        // rdata may hold compression pointers, so trust the declared length
        buffer.seek(data_start + data_len as usize)?;

        Ok(DnsRecord {
            domain,
            class,
            ttl,
            data,
        })
    }

    pub fn write<T: PacketBuffer>(&self, buffer: &mut T) -> Result<usize> {
        let start_pos = buffer.pos();

        buffer.write_qname(&self.domain)?;
        buffer.write_u16(self.get_querytype().to_num())?;
        buffer.write_u16(self.class)?;
        buffer.write_u32(self.ttl)?;

        let pos = buffer.pos();
        buffer.write_u16(0)?;

        match self.data {
            RecordData::A { ref addr } => {
                for octet in &addr.octets() {
                    buffer.write_u8(*octet)?;
                }
            }
            RecordData::Aaaa { ref addr } => {
                for segment in &addr.segments() {
                    buffer.write_u16(*segment)?;
                }
            }
            RecordData::Ns { ref host }
            | RecordData::Cname { ref host }
            | RecordData::Ptr { ref host } => {
                buffer.write_qname(host)?;
            }
            RecordData::Srv {
                priority,
                weight,
                port,
                ref host,
            } => {
                buffer.write_u16(priority)?;
                buffer.write_u16(weight)?;
                buffer.write_u16(port)?;
                buffer.write_qname(host)?;
            }
            RecordData::Txt { ref data } => {
                if data.is_empty() {
                    buffer.write_u8(0)?;
                }
                for chunk in data {
                    let bytes = chunk.as_bytes();
                    let len = bytes.len().min(255);
                    buffer.write_u8(len as u8)?;
                    for b in &bytes[..len] {
                        buffer.write_u8(*b)?;
                    }
                }
            }
            RecordData::Unknown { ref data, .. } => {
                for b in data {
                    buffer.write_u8(*b)?;
                }
            }
        }

        let size = buffer.pos() - (pos + 2);
        buffer.set_u16(pos, size as u16)?;

        Ok(buffer.pos() - start_pos)
    }

    pub fn get_querytype(&self) -> QueryType {
        match self.data {
            RecordData::A { .. } => QueryType::A,
            RecordData::Aaaa { .. } => QueryType::Aaaa,
            RecordData::Ns { .. } => QueryType::Ns,
            RecordData::Cname { .. } => QueryType::Cname,
            RecordData::Ptr { .. } => QueryType::Ptr,
            RecordData::Srv { .. } => QueryType::Srv,
            RecordData::Txt { .. } => QueryType::Txt,
            RecordData::Unknown { qtype, .. } => QueryType::from_num(qtype),
        }
    }

    pub fn get_domain(&self) -> &str {
        &self.domain
    }

    pub fn get_ttl(&self) -> u32 {
        self.ttl
    }

    /// Host name referenced by the rdata, if the type carries one
    pub fn get_target(&self) -> Option<&str> {
        match self.data {
            RecordData::Ns { ref host }
            | RecordData::Cname { ref host }
            | RecordData::Ptr { ref host }
            | RecordData::Srv { ref host, .. } => Some(host),
            _ => None,
        }
    }

    pub fn has_cache_flush(&self) -> bool {
        self.class & CACHE_FLUSH_BIT != 0
    }

    /// The record with its owner and target names lowercased and without
    /// trailing dots, so that names differing only in case compare equal
    pub fn canonical(&self) -> DnsRecord {
        let mut rec = self.clone();
        rec.domain = rec.domain.trim_end_matches('.').to_ascii_lowercase();

        match rec.data {
            RecordData::Ns { ref mut host }
            | RecordData::Cname { ref mut host }
            | RecordData::Ptr { ref mut host }
            | RecordData::Srv { ref mut host, .. } => {
                *host = host.trim_end_matches('.').to_ascii_lowercase();
            }
            _ => {}
        }

        rec
    }
}

/// Presentation format, e.g. `web.local. 120 IN A 10.0.0.9`
impl fmt::Display for DnsRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}. {} {} {} ",
            self.domain,
            self.ttl,
            class_name(self.class),
            self.get_querytype()
        )?;

        match self.data {
            RecordData::A { ref addr } => write!(f, "{}", addr),
            RecordData::Aaaa { ref addr } => write!(f, "{}", addr),
            RecordData::Ns { ref host }
            | RecordData::Cname { ref host }
            | RecordData::Ptr { ref host } => write!(f, "{}.", host),
            RecordData::Srv {
                priority,
                weight,
                port,
                ref host,
            } => write!(f, "{} {} {} {}.", priority, weight, port, host),
            RecordData::Txt { ref data } => {
                let quoted: Vec<String> = data.iter().map(|s| format!("\"{}\"", s)).collect();
                write!(f, "{}", quoted.join(" "))
            }
            RecordData::Unknown { ref data, .. } => {
                write!(f, "\\# {} {}", data.len(), hex::encode(data))
            }
        }
    }
}

/// The result code for a DNS query, as described in the specification
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum ResultCode {
    #[default]
    NOERROR = 0,
    FORMERR = 1,
    SERVFAIL = 2,
    NXDOMAIN = 3,
    NOTIMP = 4,
    REFUSED = 5,
}

impl ResultCode {
    pub fn from_num(num: u8) -> ResultCode {
        match num {
            1 => ResultCode::FORMERR,
            2 => ResultCode::SERVFAIL,
            3 => ResultCode::NXDOMAIN,
            4 => ResultCode::NOTIMP,
            5 => ResultCode::REFUSED,
            _ => ResultCode::NOERROR,
        }
    }
}

/// Representation of a DNS header
#[derive(Clone, Debug, Default)]
pub struct DnsHeader {
    pub id: u16, // 16 bits

    pub recursion_desired: bool,    // 1 bit
    pub truncated_message: bool,    // 1 bit
    pub authoritative_answer: bool, // 1 bit
    pub opcode: u8,                 // 4 bits
    pub response: bool,             // 1 bit

    pub rescode: ResultCode,       // 4 bits
    pub checking_disabled: bool,   // 1 bit
    pub authed_data: bool,         // 1 bit
    pub z: bool,                   // 1 bit
    pub recursion_available: bool, // 1 bit

    pub questions: u16,             // 16 bits
    pub answers: u16,               // 16 bits
    pub authoritative_entries: u16, // 16 bits
    pub resource_entries: u16,      // 16 bits
}

impl DnsHeader {
    pub fn new() -> DnsHeader {
        DnsHeader::default()
    }

    pub fn write<T: PacketBuffer>(&self, buffer: &mut T) -> Result<()> {
        buffer.write_u16(self.id)?;

        buffer.write_u8(
            (self.recursion_desired as u8)
                | ((self.truncated_message as u8) << 1)
                | ((self.authoritative_answer as u8) << 2)
                | (self.opcode << 3)
                | ((self.response as u8) << 7),
        )?;

        buffer.write_u8(
            (self.rescode as u8)
                | ((self.checking_disabled as u8) << 4)
                | ((self.authed_data as u8) << 5)
                | ((self.z as u8) << 6)
                | ((self.recursion_available as u8) << 7),
        )?;

        buffer.write_u16(self.questions)?;
        buffer.write_u16(self.answers)?;
        buffer.write_u16(self.authoritative_entries)?;
        buffer.write_u16(self.resource_entries)?;

        Ok(())
    }

    pub fn read<T: PacketBuffer>(&mut self, buffer: &mut T) -> Result<()> {
        self.id = buffer.read_u16()?;

        let flags = buffer.read_u16()?;
        let a = (flags >> 8) as u8;
        let b = (flags & 0xFF) as u8;
        self.recursion_desired = (a & (1 << 0)) > 0;
        self.truncated_message = (a & (1 << 1)) > 0;
        self.authoritative_answer = (a & (1 << 2)) > 0;
        self.opcode = (a >> 3) & 0x0F;
        self.response = (a & (1 << 7)) > 0;

        self.rescode = ResultCode::from_num(b & 0x0F);
        self.checking_disabled = (b & (1 << 4)) > 0;
        self.authed_data = (b & (1 << 5)) > 0;
        self.z = (b & (1 << 6)) > 0;
        self.recursion_available = (b & (1 << 7)) > 0;

        self.questions = buffer.read_u16()?;
        self.answers = buffer.read_u16()?;
        self.authoritative_entries = buffer.read_u16()?;
        self.resource_entries = buffer.read_u16()?;

        Ok(())
    }
}

impl fmt::Display for DnsHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "DnsHeader:")?;
        writeln!(f, "\tid: {0}", self.id)?;
        writeln!(f, "\tresponse: {0}", self.response)?;
        writeln!(f, "\topcode: {0}", self.opcode)?;
        writeln!(
            f,
            "\tauthoritative_answer: {0}",
            self.authoritative_answer
        )?;
        writeln!(f, "\ttruncated_message: {0}", self.truncated_message)?;
        writeln!(f, "\trescode: {:?}", self.rescode)?;

        writeln!(f, "\tquestions: {0}", self.questions)?;
        writeln!(f, "\tanswers: {0}", self.answers)?;
        writeln!(
            f,
            "\tauthoritative_entries: {0}",
            self.authoritative_entries
        )?;
        writeln!(f, "\tresource_entries: {0}", self.resource_entries)?;

        Ok(())
    }
}

/// Representation of a DNS question
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DnsQuestion {
    pub name: String,
    pub qtype: QueryType,
    pub qclass: u16,
}

impl DnsQuestion {
    pub fn new(name: String, qtype: QueryType) -> DnsQuestion {
        DnsQuestion {
            name,
            qtype,
            qclass: CLASS_IN,
        }
    }

    /// The QU bit: the querier asked for a unicast reply
    pub fn unicast_response(&self) -> bool {
        self.qclass & UNICAST_RESPONSE_BIT != 0
    }

    pub fn write<T: PacketBuffer>(&self, buffer: &mut T) -> Result<()> {
        buffer.write_qname(&self.name)?;
        buffer.write_u16(self.qtype.to_num())?;
        buffer.write_u16(self.qclass)?;

        Ok(())
    }

    pub fn read<T: PacketBuffer>(&mut self, buffer: &mut T) -> Result<()> {
        buffer.read_qname(&mut self.name)?;
        self.qtype = QueryType::from_num(buffer.read_u16()?);
        self.qclass = buffer.read_u16()?;

        Ok(())
    }
}

impl fmt::Display for DnsQuestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}. {} {}", self.name, class_name(self.qclass), self.qtype)
    }
}

/// Representation of a complete DNS packet
#[derive(Clone, Debug, Default)]
pub struct DnsPacket {
    pub header: DnsHeader,
    pub questions: Vec<DnsQuestion>,
    pub answers: Vec<DnsRecord>,
    pub authorities: Vec<DnsRecord>,
    pub resources: Vec<DnsRecord>,
}

impl DnsPacket {
    pub fn new() -> DnsPacket {
        DnsPacket::default()
    }

    pub fn from_buffer<T: PacketBuffer>(buffer: &mut T) -> Result<DnsPacket> {
        let mut result = DnsPacket::new();
        result.header.read(buffer)?;

        for _ in 0..result.header.questions {
            let mut question = DnsQuestion::new(String::new(), QueryType::Unknown(0));
            question.read(buffer)?;
            result.questions.push(question);
        }

        for _ in 0..result.header.answers {
            let rec = DnsRecord::read(buffer)?;
            result.answers.push(rec);
        }
        for _ in 0..result.header.authoritative_entries {
            let rec = DnsRecord::read(buffer)?;
            result.authorities.push(rec);
        }
        for _ in 0..result.header.resource_entries {
            let rec = DnsRecord::read(buffer)?;
            result.resources.push(rec);
        }

        Ok(result)
    }

    /// Decode a received datagram
    pub fn from_bytes(data: &[u8]) -> Result<DnsPacket> {
        let mut buffer = VectorPacketBuffer::from_bytes(data);
        DnsPacket::from_buffer(&mut buffer)
    }

    /// Write the packet, dropping trailing records (and setting the TC bit)
    /// once `max_size` would be exceeded.
    pub fn write<T: PacketBuffer>(&mut self, buffer: &mut T, max_size: usize) -> Result<()> {
        let mut test_buffer = VectorPacketBuffer::new();

        self.header.write(&mut test_buffer)?;
        for question in &self.questions {
            question.write(&mut test_buffer)?;
        }

        let mut answers = 0;
        let mut authorities = 0;
        let mut resources = 0;
        let mut record_count = 0;
        self.header.truncated_message = false;

        for (i, rec) in self
            .answers
            .iter()
            .chain(self.authorities.iter())
            .chain(self.resources.iter())
            .enumerate()
        {
            rec.write(&mut test_buffer)?;
            if test_buffer.pos() > max_size {
                self.header.truncated_message = true;
                break;
            } else if i < self.answers.len() {
                answers += 1;
            } else if i < self.answers.len() + self.authorities.len() {
                authorities += 1;
            } else {
                resources += 1;
            }
            record_count += 1;
        }

        self.header.questions = self.questions.len() as u16;
        self.header.answers = answers;
        self.header.authoritative_entries = authorities;
        self.header.resource_entries = resources;

        self.header.write(buffer)?;

        for question in &self.questions {
            question.write(buffer)?;
        }

        for rec in self
            .answers
            .iter()
            .chain(self.authorities.iter())
            .chain(self.resources.iter())
            .take(record_count)
        {
            rec.write(buffer)?;
        }

        Ok(())
    }

    /// Encode into a fresh byte vector
    pub fn to_bytes(&mut self, max_size: usize) -> Result<Vec<u8>> {
        let mut buffer = VectorPacketBuffer::new();
        self.write(&mut buffer, max_size)?;

        Ok(buffer.buffer)
    }
}
