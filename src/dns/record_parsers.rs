//! Rdata decoding for each supported record type
//!
//! Every parser starts at the first byte of the rdata. The caller owns the
//! owner name, class and TTL, and re-seeks to the declared end of the rdata
//! afterwards.

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::dns::buffer::PacketBuffer;
use crate::dns::protocol::{ProtocolError, RecordData};

type Result<T> = std::result::Result<T, ProtocolError>;

/// Parser functions for each DNS record type
pub struct RecordParser;

impl RecordParser {
    /// Parse an A record (IPv4 address)
    pub fn parse_a<T: PacketBuffer>(buffer: &mut T) -> Result<RecordData> {
        let raw_addr = buffer.read_u32()?;

        Ok(RecordData::A {
            addr: Ipv4Addr::from(raw_addr),
        })
    }

    /// Parse an AAAA record (IPv6 address)
    pub fn parse_aaaa<T: PacketBuffer>(buffer: &mut T) -> Result<RecordData> {
        let mut segments = [0u16; 8];
        for segment in segments.iter_mut() {
            *segment = buffer.read_u16()?;
        }

        Ok(RecordData::Aaaa {
            addr: Ipv6Addr::from(segments),
        })
    }

    /// Parse a single domain name, as carried by NS, CNAME and PTR rdata
    pub fn parse_name<T: PacketBuffer>(buffer: &mut T) -> Result<String> {
        let mut host = String::new();
        buffer.read_qname(&mut host)?;

        Ok(host)
    }

    /// Parse a TXT record as its sequence of character strings
    pub fn parse_txt<T: PacketBuffer>(buffer: &mut T, data_len: u16) -> Result<RecordData> {
        let mut data = Vec::new();

        let target_pos = buffer.pos() + data_len as usize;

        while buffer.pos() < target_pos {
            let len = buffer.read()? as usize;
            let pos = buffer.pos();
            let str_buffer = buffer.get_range(pos, len)?;
            let chunk = String::from_utf8_lossy(str_buffer).into_owned();
            buffer.step(len)?;

            // a lone empty string is how an empty TXT record is encoded
            if !chunk.is_empty() {
                data.push(chunk);
            }
        }

        Ok(RecordData::Txt { data })
    }

    /// Parse an SRV record (Service)
    pub fn parse_srv<T: PacketBuffer>(buffer: &mut T) -> Result<RecordData> {
        let priority = buffer.read_u16()?;
        let weight = buffer.read_u16()?;
        let port = buffer.read_u16()?;
        let host = RecordParser::parse_name(buffer)?;

        Ok(RecordData::Srv {
            priority,
            weight,
            port,
            host,
        })
    }

    /// Keep the raw rdata of a type we don't interpret
    pub fn parse_unknown<T: PacketBuffer>(
        buffer: &mut T,
        qtype: u16,
        data_len: u16,
    ) -> Result<RecordData> {
        let pos = buffer.pos();
        let data = buffer.get_range(pos, data_len as usize)?.to_vec();
        buffer.step(data_len as usize)?;

        Ok(RecordData::Unknown { qtype, data })
    }
}
