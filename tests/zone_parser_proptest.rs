//! Property-based tests of the record text parser

use std::net::{Ipv4Addr, Ipv6Addr};

use proptest::prelude::*;

use external_mdns::dns::protocol::RecordData;
use external_mdns::dns::zone_parser::{parse_record, ZoneParser};

fn domain_name_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-z][a-z0-9-]{0,20}[a-z0-9]", 1..4)
        .prop_map(|parts| format!("{}.local", parts.join(".")))
}

fn ipv4_strategy() -> impl Strategy<Value = Ipv4Addr> {
    any::<[u8; 4]>().prop_map(Ipv4Addr::from)
}

fn ipv6_strategy() -> impl Strategy<Value = Ipv6Addr> {
    any::<[u16; 8]>().prop_map(Ipv6Addr::from)
}

proptest! {
    #[test]
    fn test_a_record_fields(
        domain in domain_name_strategy(),
        addr in ipv4_strategy(),
        ttl in 0u32..=604_800
    ) {
        let rec = parse_record(&format!("{}. {} IN A {}", domain, ttl, addr)).unwrap();

        prop_assert_eq!(&domain, &rec.domain);
        prop_assert_eq!(ttl, rec.ttl);
        prop_assert_eq!(RecordData::A { addr }, rec.data);
    }

    #[test]
    fn test_class_and_ttl_in_either_order(
        domain in domain_name_strategy(),
        addr in ipv6_strategy(),
        ttl in 0u32..=604_800
    ) {
        let first = parse_record(&format!("{}. {} IN AAAA {}", domain, ttl, addr)).unwrap();
        let second = parse_record(&format!("{}. IN {} AAAA {}", domain, ttl, addr)).unwrap();

        prop_assert_eq!(first, second);
    }

    #[test]
    fn test_display_is_parseable(
        domain in domain_name_strategy(),
        target in domain_name_strategy(),
        ttl in 0u32..=604_800
    ) {
        let rec = parse_record(&format!("{}. {} IN PTR {}.", domain, ttl, target)).unwrap();
        let again = parse_record(&rec.to_string()).unwrap();

        prop_assert_eq!(rec, again);
    }

    #[test]
    fn test_arbitrary_text_never_panics(text in "\\PC{0,80}") {
        let _ = parse_record(&text);
        let _ = ZoneParser::new("local").parse_string(&text);
    }
}
