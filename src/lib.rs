//! external-mdns
//!
//! Advertises records for orchestrated services and ingresses on the local
//! network over multicast DNS.
//!
//! # Architecture
//!
//! The crate is divided into two main modules:
//! * `dns` - The mDNS responder engine: wire codec, zone store, connectors
//!   and the publish facade
//! * `k8s` - Endpoint events, the Service/Ingress mapping rules and the
//!   record synthesis that feeds the responder

/// mDNS responder implementation and protocol handling
pub mod dns;

/// Endpoint sources and record synthesis
pub mod k8s;
