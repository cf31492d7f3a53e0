//! Record synthesis for named endpoints
//!
//! Each address of an endpoint is published under up to three names, each
//! with a matching reverse pointer:
//!
//! - `<name>.<namespace>.local.`
//! - `<name>-<namespace>.local.`
//! - `<name>.local.`, only for the default namespace, for ingresses, or when
//!   namespaces are left out entirely

use std::net::IpAddr;

use sha2::{Digest, Sha256};

use crate::dns::buffer::MAX_LABEL_LENGTH;
use crate::k8s::resource::{EndpointEvent, SourceKind};

/// Characters kept from an over-long label before the hash suffix
const TRUNCATED_PREFIX_LENGTH: usize = 51;

/// Hex digits of the SHA-256 digest appended to a truncated label
const TRUNCATED_HASH_LENGTH: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOptions {
    /// Endpoints in this namespace are also published as `<name>.local.`
    pub default_namespace: String,
    pub ttl: u32,
    pub expose_ipv4: bool,
    pub expose_ipv6: bool,
    /// Shorten over-long labels instead of dropping their records
    pub truncate_long_labels: bool,
    /// Publish `<name>.local.` for every namespace
    pub without_namespace: bool,
}

impl Default for RecordOptions {
    fn default() -> Self {
        RecordOptions {
            default_namespace: "default".to_string(),
            ttl: 120,
            expose_ipv4: true,
            expose_ipv6: false,
            truncate_long_labels: false,
            without_namespace: false,
        }
    }
}

/// Reverse lookup name, with trailing dot
pub fn reverse_name(ip: &IpAddr) -> String {
    match ip {
        IpAddr::V4(addr) => {
            let o = addr.octets();
            format!("{}.{}.{}.{}.in-addr.arpa.", o[3], o[2], o[1], o[0])
        }
        IpAddr::V6(addr) => {
            let mut name = String::with_capacity(72);
            for byte in addr.octets().iter().rev() {
                name.push_str(&format!("{:x}.{:x}.", byte & 0x0F, byte >> 4));
            }
            name.push_str("ip6.arpa.");
            name
        }
    }
}

/// At most 51 bytes of `label` (cut at a character boundary), a hyphen and
/// the first 8 hex digits of the label's SHA-256 digest
pub fn truncate_label(label: &str) -> String {
    let digest = hex::encode(Sha256::digest(label.as_bytes()));

    let mut end = label.len().min(TRUNCATED_PREFIX_LENGTH);
    while !label.is_char_boundary(end) {
        end -= 1;
    }

    format!("{}-{}", &label[..end], &digest[..TRUNCATED_HASH_LENGTH])
}

/// `label` if it fits in a DNS label, its truncated form when truncation is
/// enabled, otherwise `None`
fn validated_label(label: &str, truncate: bool, rtype: &str) -> Option<String> {
    if label.len() <= MAX_LABEL_LENGTH {
        return Some(label.to_string());
    }

    if truncate {
        let short = truncate_label(label);
        log::info!(
            "DNS label '{}' exceeds {} characters for {} record, truncated to '{}'",
            label,
            MAX_LABEL_LENGTH,
            rtype,
            short
        );
        Some(short)
    } else {
        log::warn!(
            "DNS label '{}' exceeds {} characters for {} record, record will not be published",
            label,
            MAX_LABEL_LENGTH,
            rtype
        );
        None
    }
}

/// The names an endpoint is published under, in publication order
fn endpoint_names(event: &EndpointEvent, opts: &RecordOptions, rtype: &str) -> Vec<String> {
    let truncate = opts.truncate_long_labels;
    let name = validated_label(&event.name, truncate, rtype);
    let namespace = validated_label(&event.namespace, truncate, rtype);

    let mut names = Vec::new();

    if let (Some(name), Some(namespace)) = (&name, &namespace) {
        names.push(format!("{}.{}.local.", name, namespace));

        let flat = format!("{}-{}", name, namespace);
        if let Some(flat) = validated_label(&flat, truncate, rtype) {
            names.push(format!("{}.local.", flat));
        }
    }

    let short_form = event.namespace == opts.default_namespace
        || opts.without_namespace
        || event.source_kind == SourceKind::Ingress;
    if short_form {
        if let Some(name) = &name {
            names.push(format!("{}.local.", name));
        }
    }

    names
}

/// Textual records for every address of `event`.
///
/// Unparseable addresses and addresses of a family that is not exposed are
/// skipped. Per address the forward record of each name is followed by its
/// PTR record.
pub fn endpoint_records(event: &EndpointEvent, opts: &RecordOptions) -> Vec<String> {
    let mut records = Vec::new();

    for ip_text in &event.ips {
        let ip: IpAddr = match ip_text.trim().parse() {
            Ok(ip) => ip,
            Err(_) => {
                log::debug!("Skipping unparseable address '{}' of {}", ip_text, event.name);
                continue;
            }
        };

        let rtype = match ip {
            IpAddr::V4(_) if opts.expose_ipv4 => "A",
            IpAddr::V6(_) if opts.expose_ipv6 => "AAAA",
            _ => continue,
        };

        let reverse = reverse_name(&ip);
        for fqdn in endpoint_names(event, opts, rtype) {
            records.push(format!("{} {} IN {} {}", fqdn, opts.ttl, rtype, ip));
            records.push(format!("{} {} IN PTR {}", reverse, opts.ttl, fqdn));
        }
    }

    records
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::k8s::resource::Action;

    fn event(name: &str, namespace: &str, ips: &[&str]) -> EndpointEvent {
        EndpointEvent::new(
            Action::Added,
            SourceKind::Service,
            name,
            namespace,
            ips.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn test_default_namespace_endpoint() {
        let records = endpoint_records(
            &event("web", "default", &["10.0.0.9"]),
            &RecordOptions::default(),
        );

        assert_eq!(
            vec![
                "web.default.local. 120 IN A 10.0.0.9",
                "9.0.0.10.in-addr.arpa. 120 IN PTR web.default.local.",
                "web-default.local. 120 IN A 10.0.0.9",
                "9.0.0.10.in-addr.arpa. 120 IN PTR web-default.local.",
                "web.local. 120 IN A 10.0.0.9",
                "9.0.0.10.in-addr.arpa. 120 IN PTR web.local.",
            ],
            records
        );
    }

    #[test]
    fn test_other_namespace_has_no_short_form() {
        let records = endpoint_records(
            &event("api", "apps", &["10.0.0.7"]),
            &RecordOptions::default(),
        );

        assert_eq!(4, records.len());
        assert!(records
            .iter()
            .all(|r| !r.contains(" api.local.") && !r.starts_with("api.local.")));
    }

    #[test]
    fn test_without_namespace_and_ingress_get_short_form() {
        let opts = RecordOptions {
            without_namespace: true,
            ..RecordOptions::default()
        };
        let records = endpoint_records(&event("api", "apps", &["10.0.0.7"]), &opts);
        assert_eq!(6, records.len());
        assert_eq!("api.local. 120 IN A 10.0.0.7", records[4]);

        let mut ingress = event("shop", "apps", &["10.0.0.8"]);
        ingress.source_kind = SourceKind::Ingress;
        let records = endpoint_records(&ingress, &RecordOptions::default());
        assert_eq!(6, records.len());
        assert_eq!("shop.local. 120 IN A 10.0.0.8", records[4]);
    }

    #[test]
    fn test_address_families() {
        let e = event("web", "apps", &["fd00::1", "10.0.0.9", "bogus"]);

        let records = endpoint_records(&e, &RecordOptions::default());
        assert_eq!(4, records.len());
        assert!(records.iter().all(|r| !r.contains("AAAA")));

        let opts = RecordOptions {
            expose_ipv4: false,
            expose_ipv6: true,
            ..RecordOptions::default()
        };
        let records = endpoint_records(&e, &opts);
        assert_eq!(4, records.len());
        assert_eq!("web.apps.local. 120 IN AAAA fd00::1", records[0]);
        assert!(records[1].starts_with(
            "1.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.d.f.ip6.arpa. 120 IN PTR"
        ));
    }

    #[test]
    fn test_reverse_names() {
        assert_eq!(
            "9.0.0.10.in-addr.arpa.",
            reverse_name(&"10.0.0.9".parse().unwrap())
        );
        assert_eq!(
            "b.a.9.8.7.6.5.0.4.0.0.0.3.0.0.0.2.0.0.0.1.0.0.0.0.0.0.0.1.2.3.4.ip6.arpa.",
            reverse_name(&"4321:0:1:2:3:4:567:89ab".parse().unwrap())
        );
    }

    struct CapturedLogs;

    static LOGGER: CapturedLogs = CapturedLogs;
    static CAPTURED: Mutex<Vec<(log::Level, String)>> = Mutex::new(Vec::new());

    impl log::Log for CapturedLogs {
        fn enabled(&self, _: &log::Metadata<'_>) -> bool {
            true
        }

        fn log(&self, record: &log::Record<'_>) {
            if let Ok(mut logs) = CAPTURED.lock() {
                logs.push((record.level(), record.args().to_string()));
            }
        }

        fn flush(&self) {}
    }

    /// Log lines mentioning `needle`, captured since the logger was installed
    fn captured(needle: &str) -> Vec<(log::Level, String)> {
        CAPTURED
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, line)| line.contains(needle))
            .cloned()
            .collect()
    }

    fn capture_logs() {
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(log::LevelFilter::Debug);
    }

    #[test]
    fn test_long_label_is_dropped_without_truncation() {
        capture_logs();
        let long = format!("dropped{}", "a".repeat(70));

        let records = endpoint_records(
            &event(&long, "apps", &["10.0.0.9"]),
            &RecordOptions::default(),
        );

        assert!(records.is_empty());
        assert_eq!(None, validated_label(&long, false, "A"));

        let warnings = captured(&long);
        assert!(!warnings.is_empty());
        assert!(warnings.iter().all(|(level, line)| {
            *level == log::Level::Warn && line.contains("will not be published")
        }));
    }

    #[test]
    fn test_validated_label() {
        assert_eq!(Some("web".to_string()), validated_label("web", false, "A"));

        let exact = "e".repeat(MAX_LABEL_LENGTH);
        assert_eq!(Some(exact.clone()), validated_label(&exact, false, "A"));

        let long = "t".repeat(MAX_LABEL_LENGTH + 1);
        assert_eq!(Some(truncate_label(&long)), validated_label(&long, true, "AAAA"));
    }

    #[test]
    fn test_truncate_label_counts_bytes() {
        let long = "é".repeat(40);

        let short = truncate_label(&long);

        assert!(short.len() <= MAX_LABEL_LENGTH);
        assert!(short.starts_with(&"é".repeat(25)));
        assert_eq!(25 * 2 + 1 + 8, short.len());
    }

    #[test]
    fn test_long_label_is_truncated() {
        let long = "a".repeat(70);
        let opts = RecordOptions {
            truncate_long_labels: true,
            ..RecordOptions::default()
        };

        let records = endpoint_records(&event(&long, "apps", &["10.0.0.9"]), &opts);
        assert_eq!(4, records.len());

        let label = records[0].split('.').next().unwrap();
        assert!(label.len() <= MAX_LABEL_LENGTH);
        assert!(label.starts_with(&"a".repeat(51)));

        let (_, suffix) = label.split_at(51);
        assert_eq!(9, suffix.len());
        assert!(suffix.starts_with('-'));
        assert!(suffix[1..]
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_truncate_label_is_stable() {
        let long = "b".repeat(64);

        assert_eq!(truncate_label(&long), truncate_label(&long));
        assert_ne!(truncate_label(&long), truncate_label(&"c".repeat(64)));
        assert_eq!(60, truncate_label(&long).len());
    }

    #[test]
    fn test_long_flat_label_only_drops_flat_form() {
        let name = "n".repeat(40);
        let namespace = "s".repeat(30);

        let records = endpoint_records(
            &event(&name, &namespace, &["10.0.0.9"]),
            &RecordOptions::default(),
        );

        assert_eq!(2, records.len());
        assert!(records[0].starts_with(&format!("{}.{}.local.", name, namespace)));
    }
}
