//! Presentation format parser for resource records
//!
//! Accepts the textual record syntax used by zone files:
//! - `owner [ttl] [class] type rdata`, with TTL and class in either order
//! - `$ORIGIN` and `$TTL` directives
//! - `;` comments and parenthesised multi-line records
//! - relative names, `@` for the origin, and owner reuse on lines that start
//!   with whitespace
//!
//! Supported types are A, AAAA, PTR, SRV, CNAME, NS and TXT.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::Path;
use std::str::FromStr;

use crate::dns::buffer::MAX_LABEL_LENGTH;
use crate::dns::protocol::{DnsRecord, RecordData, CLASS_IN};

/// Default TTL when neither the record nor a `$TTL` directive sets one
pub const DEFAULT_TTL: u32 = 3600;

/// Longest encoded name, length octets and root label included
const MAX_NAME_LENGTH: usize = 255;

/// Parser errors with line number information
#[derive(Debug)]
pub enum ParseError {
    InvalidSyntax { line: usize, message: String },
    InvalidRecordType { line: usize, record_type: String },
    InvalidIpAddress { line: usize, addr: String },
    InvalidDomainName { line: usize, domain: String },
    InvalidTtl { line: usize, ttl: String },
    MissingField { line: usize, field: String },
    IoError { line: usize, error: std::io::Error },
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::InvalidSyntax { line, message } => {
                write!(f, "Line {}: Invalid syntax: {}", line, message)
            }
            ParseError::InvalidRecordType { line, record_type } => {
                write!(f, "Line {}: Unknown record type: {}", line, record_type)
            }
            ParseError::InvalidIpAddress { line, addr } => {
                write!(f, "Line {}: Invalid IP address: {}", line, addr)
            }
            ParseError::InvalidDomainName { line, domain } => {
                write!(f, "Line {}: Invalid domain name: {}", line, domain)
            }
            ParseError::InvalidTtl { line, ttl } => {
                write!(f, "Line {}: Invalid TTL value: {}", line, ttl)
            }
            ParseError::MissingField { line, field } => {
                write!(f, "Line {}: Missing required field: {}", line, field)
            }
            ParseError::IoError { line, error } => write!(f, "Line {}: IO error: {}", line, error),
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ParseError::IoError { error, .. } => Some(error),
            _ => None,
        }
    }
}

type Result<T> = std::result::Result<T, ParseError>;

/// Parse exactly one record from its single-line presentation form.
///
/// Names without a trailing dot are taken as written.
pub fn parse_record(text: &str) -> Result<DnsRecord> {
    let mut parser = ZoneParser::new("");
    let mut records = parser.parse_string(text.trim())?;

    match records.len() {
        1 => Ok(records.remove(0)),
        0 => Err(ParseError::MissingField {
            line: 1,
            field: "record".to_string(),
        }),
        n => Err(ParseError::InvalidSyntax {
            line: 1,
            message: format!("expected a single record, found {}", n),
        }),
    }
}

/// Zone file parser state
pub struct ZoneParser {
    origin: String,
    default_ttl: u32,
    line_number: usize,
    last_domain: Option<String>,
}

impl ZoneParser {
    /// Create a parser that resolves relative names against `origin`
    pub fn new(origin: &str) -> Self {
        ZoneParser {
            origin: origin.trim_end_matches('.').to_string(),
            default_ttl: DEFAULT_TTL,
            line_number: 0,
            last_domain: None,
        }
    }

    /// Parse records from a string
    pub fn parse_string(&mut self, content: &str) -> Result<Vec<DnsRecord>> {
        let lines: Vec<&str> = content.lines().collect();
        self.parse_lines(&lines)
    }

    /// Parse records from a file path
    pub fn parse_file(&mut self, path: &Path) -> Result<Vec<DnsRecord>> {
        let content = std::fs::read_to_string(path).map_err(|e| ParseError::IoError {
            line: self.line_number,
            error: e,
        })?;

        self.parse_string(&content)
    }

    fn parse_lines(&mut self, lines: &[&str]) -> Result<Vec<DnsRecord>> {
        let mut records = Vec::new();

        let mut in_multiline = false;
        let mut multiline_buffer = String::new();
        let mut multiline_start = 0;

        for (idx, line) in lines.iter().enumerate() {
            self.line_number = idx + 1;
            let line = strip_comment(line);

            // Handle multi-line records (parentheses)
            if in_multiline {
                multiline_buffer.push(' ');
                multiline_buffer.push_str(line.trim());
                if line.contains(')') {
                    in_multiline = false;
                    self.line_number = multiline_start;
                    if let Some(record) = self.parse_line(&multiline_buffer)? {
                        records.push(record);
                    }
                    multiline_buffer.clear();
                }
                continue;
            }

            if line.contains('(') && !line.contains(')') {
                in_multiline = true;
                multiline_start = self.line_number;
                multiline_buffer = line.to_string();
                continue;
            }

            if let Some(record) = self.parse_line(line)? {
                records.push(record);
            }
        }

        if in_multiline {
            return Err(ParseError::InvalidSyntax {
                line: multiline_start,
                message: "Unclosed parentheses in multi-line record".to_string(),
            });
        }

        Ok(records)
    }

    /// Parse a single comment-free line
    fn parse_line(&mut self, line: &str) -> Result<Option<DnsRecord>> {
        if line.trim().is_empty() {
            return Ok(None);
        }

        if line.starts_with('$') {
            self.parse_directive(line)?;
            return Ok(None);
        }

        self.parse_record_line(line).map(Some)
    }

    fn parse_directive(&mut self, line: &str) -> Result<()> {
        let parts: Vec<&str> = line.split_whitespace().collect();

        match parts[0].to_uppercase().as_str() {
            "$ORIGIN" => {
                let origin = parts.get(1).ok_or_else(|| ParseError::MissingField {
                    line: self.line_number,
                    field: "origin domain".to_string(),
                })?;
                self.origin = self.normalize_domain(origin)?;
            }
            "$TTL" => {
                let ttl = parts.get(1).ok_or_else(|| ParseError::MissingField {
                    line: self.line_number,
                    field: "TTL value".to_string(),
                })?;
                self.default_ttl = self.parse_ttl(ttl)?;
            }
            _ => {
                return Err(ParseError::InvalidSyntax {
                    line: self.line_number,
                    message: format!("Unknown directive: {}", parts[0]),
                });
            }
        }

        Ok(())
    }

    fn parse_record_line(&mut self, line: &str) -> Result<DnsRecord> {
        let owner_omitted = line.starts_with(|c: char| c.is_whitespace());
        let parts = tokenize(line);

        let mut idx = 0;

        let domain = if owner_omitted {
            self.last_domain.clone().ok_or_else(|| ParseError::MissingField {
                line: self.line_number,
                field: "domain name".to_string(),
            })?
        } else {
            let owner = self.first(&parts, "domain name")?;
            idx += 1;
            self.normalize_domain(owner)?
        };
        self.last_domain = Some(domain.clone());

        // TTL and class are both optional and may come in either order
        let mut ttl = None;
        let mut class = None;
        while idx < parts.len() {
            if ttl.is_none() && looks_like_ttl(&parts[idx]) {
                ttl = Some(self.parse_ttl(&parts[idx])?);
            } else if class.is_none() && parse_class(&parts[idx]).is_some() {
                class = parse_class(&parts[idx]);
            } else {
                break;
            }
            idx += 1;
        }

        let record_type = parts
            .get(idx)
            .ok_or_else(|| ParseError::MissingField {
                line: self.line_number,
                field: "record type".to_string(),
            })?
            .to_uppercase();
        idx += 1;

        let rdata = &parts[idx..];
        let (data, fields) = match record_type.as_str() {
            "A" => (self.parse_a(rdata)?, 1),
            "AAAA" => (self.parse_aaaa(rdata)?, 1),
            "PTR" => {
                let host = self.parse_host(rdata, "PTR target")?;
                (RecordData::Ptr { host }, 1)
            }
            "CNAME" => {
                let host = self.parse_host(rdata, "canonical name")?;
                (RecordData::Cname { host }, 1)
            }
            "NS" => {
                let host = self.parse_host(rdata, "nameserver")?;
                (RecordData::Ns { host }, 1)
            }
            "SRV" => (self.parse_srv(rdata)?, 4),
            "TXT" => (self.parse_txt(rdata)?, rdata.len()),
            _ => {
                return Err(ParseError::InvalidRecordType {
                    line: self.line_number,
                    record_type,
                });
            }
        };

        if rdata.len() > fields {
            return Err(ParseError::InvalidSyntax {
                line: self.line_number,
                message: format!(
                    "Unexpected data after {} record: {}",
                    record_type,
                    rdata[fields..].join(" ")
                ),
            });
        }

        Ok(DnsRecord {
            domain,
            class: class.unwrap_or(CLASS_IN),
            ttl: ttl.unwrap_or(self.default_ttl),
            data,
        })
    }

    fn first<'a>(&self, parts: &'a [String], field: &str) -> Result<&'a str> {
        parts
            .first()
            .map(|s| s.as_str())
            .ok_or_else(|| ParseError::MissingField {
                line: self.line_number,
                field: field.to_string(),
            })
    }

    fn parse_a(&self, parts: &[String]) -> Result<RecordData> {
        let text = self.first(parts, "IPv4 address")?;
        let addr = Ipv4Addr::from_str(text).map_err(|_| ParseError::InvalidIpAddress {
            line: self.line_number,
            addr: text.to_string(),
        })?;

        Ok(RecordData::A { addr })
    }

    fn parse_aaaa(&self, parts: &[String]) -> Result<RecordData> {
        let text = self.first(parts, "IPv6 address")?;
        let addr = Ipv6Addr::from_str(text).map_err(|_| ParseError::InvalidIpAddress {
            line: self.line_number,
            addr: text.to_string(),
        })?;

        Ok(RecordData::Aaaa { addr })
    }

    fn parse_host(&self, parts: &[String], field: &str) -> Result<String> {
        let text = self.first(parts, field)?;
        self.normalize_domain(text)
    }

    fn parse_srv(&self, parts: &[String]) -> Result<RecordData> {
        if parts.len() < 4 {
            return Err(ParseError::MissingField {
                line: self.line_number,
                field: "SRV fields".to_string(),
            });
        }

        let number = |idx: usize, what: &str| {
            parts[idx]
                .parse::<u16>()
                .map_err(|_| ParseError::InvalidSyntax {
                    line: self.line_number,
                    message: format!("Invalid SRV {}: {}", what, parts[idx]),
                })
        };

        Ok(RecordData::Srv {
            priority: number(0, "priority")?,
            weight: number(1, "weight")?,
            port: number(2, "port")?,
            host: self.normalize_domain(&parts[3])?,
        })
    }

    fn parse_txt(&self, parts: &[String]) -> Result<RecordData> {
        if parts.is_empty() {
            return Err(ParseError::MissingField {
                line: self.line_number,
                field: "text data".to_string(),
            });
        }

        let data = parts
            .iter()
            .map(|part| {
                if part.len() >= 2 && part.starts_with('"') && part.ends_with('"') {
                    part[1..part.len() - 1].to_string()
                } else {
                    part.clone()
                }
            })
            .filter(|chunk| !chunk.is_empty())
            .collect();

        Ok(RecordData::Txt { data })
    }

    /// Parse TTL value (supports time units)
    pub fn parse_ttl(&self, ttl_str: &str) -> Result<u32> {
        let ttl_str = ttl_str.to_uppercase();
        let invalid = || ParseError::InvalidTtl {
            line: self.line_number,
            ttl: ttl_str.clone(),
        };

        // Handle time units (1h, 30m, 1d, etc.)
        if let Some(last_char) = ttl_str.chars().last() {
            if last_char.is_alphabetic() {
                let value = ttl_str[..ttl_str.len() - last_char.len_utf8()]
                    .parse::<u32>()
                    .map_err(|_| invalid())?;

                let factor = match last_char {
                    'S' => 1,
                    'M' => 60,
                    'H' => 3600,
                    'D' => 86400,
                    'W' => 604800,
                    _ => return Err(invalid()),
                };

                return value.checked_mul(factor).ok_or_else(invalid);
            }
        }

        ttl_str.parse::<u32>().map_err(|_| invalid())
    }

    /// Resolve `@` and relative names against the origin and validate the
    /// result. The returned name has no trailing dot.
    fn normalize_domain(&self, domain: &str) -> Result<String> {
        let domain = domain.trim();

        let name = if domain == "@" {
            self.origin.clone()
        } else if let Some(absolute) = domain.strip_suffix('.') {
            absolute.to_string()
        } else if self.origin.is_empty() {
            domain.to_string()
        } else {
            format!("{}.{}", domain, self.origin)
        };

        self.validate_domain(&name)?;

        Ok(name)
    }

    fn validate_domain(&self, name: &str) -> Result<()> {
        let invalid = || ParseError::InvalidDomainName {
            line: self.line_number,
            domain: name.to_string(),
        };

        if name.is_empty() || name.len() + 2 > MAX_NAME_LENGTH {
            return Err(invalid());
        }

        if name
            .split('.')
            .any(|label| label.is_empty() || label.len() > MAX_LABEL_LENGTH)
        {
            return Err(invalid());
        }

        Ok(())
    }
}

/// Class mnemonic to number: IN, CH, HS or the generic CLASSnn form
fn parse_class(token: &str) -> Option<u16> {
    let upper = token.to_uppercase();
    match upper.as_str() {
        "IN" => Some(1),
        "CH" => Some(3),
        "HS" => Some(4),
        _ => upper.strip_prefix("CLASS").and_then(|n| n.parse().ok()),
    }
}

/// A TTL is all digits, optionally followed by a single unit letter
fn looks_like_ttl(token: &str) -> bool {
    let digits = token.trim_end_matches(|c: char| "sSmMhHdDwW".contains(c));
    !digits.is_empty()
        && token.len() - digits.len() <= 1
        && digits.chars().all(|c| c.is_ascii_digit())
}

/// Drop a `;` comment, ignoring semicolons inside quoted strings
fn strip_comment(line: &str) -> &str {
    let mut in_quotes = false;
    let mut escaped = false;
    for (idx, ch) in line.char_indices() {
        match ch {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => return &line[..idx],
            _ => {}
        }
    }
    line
}

/// Split on whitespace, keeping quoted strings (quotes included) together.
/// Parentheses outside quotes are treated as whitespace.
fn tokenize(line: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars();

    while let Some(ch) = chars.next() {
        if ch == '\\' && in_quotes {
            if let Some(next) = chars.next() {
                current.push(next);
            }
        } else if ch == '"' {
            in_quotes = !in_quotes;
            current.push(ch);
        } else if !in_quotes && (ch.is_whitespace() || ch == '(' || ch == ')') {
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
        } else {
            current.push(ch);
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }

    parts
}
