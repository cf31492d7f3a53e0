//! mDNS responder engine
//!
//! # Module Structure
//!
//! * `buffer` - Low-level buffer operations and name compression
//! * `protocol` - DNS packet, header, question and record types
//! * `record_parsers` - Rdata decoding per record type
//! * `zone_parser` - Textual record syntax and zone-style files
//! * `authority` - The zone store task and its handle
//! * `server` - Interface connectors answering mDNS queries
//! * `netutil` - Multicast socket setup
//! * `context` - Listener configuration
//! * `responder` - Publish/unpublish facade and engine lifecycle

/// The zone store task and its handle
pub mod authority;

/// Low-level buffer operations for DNS packet handling
pub mod buffer;

/// Listener configuration shared by the connectors
pub mod context;

/// Errors returned by the responder facade
pub mod errors;

/// Logging setup
pub mod logging;

/// Multicast socket helpers
pub mod netutil;

/// DNS protocol definitions and packet handling
pub mod protocol;

/// Rdata parsers for each record type
pub mod record_parsers;

/// Publish/unpublish facade and lifecycle
pub mod responder;

/// mDNS interface connectors
pub mod server;

/// Presentation format parser
pub mod zone_parser;

#[cfg(test)]
mod authority_test;
