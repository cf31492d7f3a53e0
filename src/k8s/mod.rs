//! Mapping of Kubernetes endpoints onto published mDNS records

pub mod advertiser;
pub mod records;
pub mod resource;
pub mod source;
