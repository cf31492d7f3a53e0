//! Errors surfaced to callers of the responder

use std::fmt;

use crate::dns::authority::AuthorityError;
use crate::dns::server::ServerError;
use crate::dns::zone_parser::ParseError;

#[derive(Debug)]
pub enum ResponderError {
    /// The record text could not be parsed
    Parse(ParseError),
    /// The zone store is not running
    ZoneClosed,
    /// A listener socket could not be set up
    Socket(ServerError),
}

impl fmt::Display for ResponderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponderError::Parse(e) => write!(f, "Invalid record: {}", e),
            ResponderError::ZoneClosed => write!(f, "Zone store is not running"),
            ResponderError::Socket(e) => write!(f, "Socket error: {}", e),
        }
    }
}

impl std::error::Error for ResponderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResponderError::Parse(e) => Some(e),
            ResponderError::ZoneClosed => None,
            ResponderError::Socket(e) => Some(e),
        }
    }
}

impl From<ParseError> for ResponderError {
    fn from(err: ParseError) -> Self {
        ResponderError::Parse(err)
    }
}

impl From<AuthorityError> for ResponderError {
    fn from(_: AuthorityError) -> Self {
        ResponderError::ZoneClosed
    }
}

impl From<ServerError> for ResponderError {
    fn from(err: ServerError) -> Self {
        ResponderError::Socket(err)
    }
}

impl From<std::io::Error> for ResponderError {
    fn from(err: std::io::Error) -> Self {
        ResponderError::Socket(ServerError::Io(err))
    }
}
