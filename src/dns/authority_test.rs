#[cfg(test)]
mod tests {
    use super::super::authority::{spawn, Operation, Zone, ZoneHandle};
    use super::super::protocol::{DnsQuestion, DnsRecord, QueryType, RecordData};
    use std::net::Ipv4Addr;
    use tokio::sync::broadcast;
    use tokio::task::JoinHandle;

    fn a_record(domain: &str, last: u8, ttl: u32) -> DnsRecord {
        DnsRecord::new(
            domain,
            ttl,
            RecordData::A {
                addr: Ipv4Addr::new(10, 0, 0, last),
            },
        )
    }

    fn ptr_record(domain: &str, host: &str) -> DnsRecord {
        DnsRecord::new(
            domain,
            120,
            RecordData::Ptr {
                host: host.to_string(),
            },
        )
    }

    fn question(name: &str, qtype: QueryType) -> DnsQuestion {
        DnsQuestion::new(name.to_string(), qtype)
    }

    fn start() -> (ZoneHandle, JoinHandle<()>, broadcast::Sender<()>) {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (handle, task) = spawn(shutdown_rx);
        (handle, task, shutdown_tx)
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut zone = Zone::new();
        let rec = a_record("web.local", 9, 120);

        assert!(zone.add_record(&rec));
        assert!(!zone.add_record(&rec));

        assert_eq!(1, zone.record_count());
    }

    #[test]
    fn test_ttl_is_part_of_record_identity() {
        let mut zone = Zone::new();

        assert!(zone.add_record(&a_record("web.local", 9, 120)));
        assert!(zone.add_record(&a_record("web.local", 9, 60)));

        assert_eq!(2, zone.record_count());
        assert_eq!(1, zone.name_count());
    }

    #[test]
    fn test_delete_last_record_removes_name() {
        let mut zone = Zone::new();
        let rec = a_record("web.local", 9, 120);

        zone.add_record(&rec);
        assert!(zone.delete_record(&rec));

        assert!(zone.is_empty());
        assert_eq!(0, zone.name_count());
    }

    #[test]
    fn test_delete_absent_record_is_noop() {
        let mut zone = Zone::new();
        zone.add_record(&a_record("web.local", 9, 120));

        assert!(!zone.delete_record(&a_record("web.local", 10, 120)));
        assert!(!zone.delete_record(&a_record("other.local", 9, 120)));

        assert_eq!(1, zone.record_count());
    }

    #[test]
    fn test_lookup_filters_by_type() {
        let mut zone = Zone::new();
        zone.add_record(&a_record("web.local", 9, 120));
        zone.add_record(&ptr_record("web.local", "other.local"));

        let a = zone.lookup(&question("web.local", QueryType::A));
        assert_eq!(vec![a_record("web.local", 9, 120)], a);

        let any = zone.lookup(&question("web.local", QueryType::Any));
        assert_eq!(2, any.len());

        let aaaa = zone.lookup(&question("web.local", QueryType::Aaaa));
        assert!(aaaa.is_empty());
    }

    #[test]
    fn test_lookup_ignores_case_and_trailing_dot() {
        let mut zone = Zone::new();
        zone.add_record(&a_record("Web.Default.local", 9, 120));

        let found = zone.lookup(&question("web.default.LOCAL.", QueryType::A));

        assert_eq!(1, found.len());
    }

    #[test]
    fn test_names_differing_in_case_are_one_record() {
        let mut zone = Zone::new();

        assert!(zone.add_record(&a_record("Web.local.", 9, 60)));
        assert!(!zone.add_record(&a_record("web.local", 9, 60)));
        assert!(zone.add_record(&ptr_record("9.0.0.10.in-addr.arpa", "Web.Local.")));
        assert!(!zone.add_record(&ptr_record("9.0.0.10.in-addr.arpa", "web.local")));

        assert_eq!(2, zone.record_count());
        let found = zone.lookup(&question("web.local", QueryType::A));
        assert_eq!(1, found.len());
        assert_eq!("web.local", found[0].domain);

        assert!(zone.delete_record(&a_record("WEB.LOCAL", 9, 60)));
        assert!(zone.delete_record(&ptr_record("9.0.0.10.in-addr.arpa", "WEB.local")));
        assert!(zone.is_empty());
    }

    #[tokio::test]
    async fn test_mixed_case_publish_answers_once() {
        let (handle, task, shutdown) = start();

        handle.add(a_record("Web.local", 9, 60)).await.unwrap();
        handle.add(a_record("web.local", 9, 60)).await.unwrap();

        let found = handle.query(question("web.local", QueryType::A)).await.unwrap();
        assert_eq!(1, found.len());

        shutdown.send(()).unwrap();
        task.await.unwrap();
    }

    #[test]
    fn test_clear_empties_zone() {
        let mut zone = Zone::new();
        zone.add_record(&a_record("a.local", 1, 120));
        zone.add_record(&a_record("b.local", 2, 120));

        zone.clear();

        assert!(zone.is_empty());
        assert!(zone
            .lookup(&question("a.local", QueryType::Any))
            .is_empty());
    }

    #[tokio::test]
    async fn test_store_reads_its_own_writes() {
        let (handle, _task, _shutdown) = start();

        handle.add(a_record("web.local", 9, 120)).await.unwrap();
        let found = handle
            .query(question("web.local", QueryType::A))
            .await
            .unwrap();
        assert_eq!(vec![a_record("web.local", 9, 120)], found);

        handle.delete(a_record("web.local", 9, 120)).await.unwrap();
        let found = handle
            .query(question("web.local", QueryType::A))
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_operations_apply_in_order() {
        let (handle, _task, _shutdown) = start();

        for i in 0..100u8 {
            handle.add(a_record("web.local", i, 120)).await.unwrap();
        }
        handle.clear().await.unwrap();
        handle.add(a_record("web.local", 200, 120)).await.unwrap();

        let found = handle
            .query(question("web.local", QueryType::Any))
            .await
            .unwrap();
        assert_eq!(vec![a_record("web.local", 200, 120)], found);
    }

    #[tokio::test]
    async fn test_operation_without_record_is_ignored() {
        let (handle, _task, _shutdown) = start();

        handle.add(a_record("web.local", 9, 120)).await.unwrap();
        handle
            .apply(Operation {
                kind: super::super::authority::OperationKind::Delete,
                record: None,
            })
            .await
            .unwrap();

        let found = handle
            .query(question("web.local", QueryType::A))
            .await
            .unwrap();
        assert_eq!(1, found.len());
    }

    #[tokio::test]
    async fn test_store_stops_on_shutdown() {
        let (handle, task, shutdown) = start();

        shutdown.send(()).unwrap();
        task.await.unwrap();

        assert!(handle.is_closed());
        assert!(handle.add(a_record("web.local", 9, 120)).await.is_err());
        assert!(handle
            .query(question("web.local", QueryType::A))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_concurrent_handles() {
        let (handle, _task, _shutdown) = start();

        let mut writers = Vec::new();
        for i in 0..8u8 {
            let handle = handle.clone();
            writers.push(tokio::spawn(async move {
                handle
                    .add(a_record(&format!("host{}.local", i), i, 120))
                    .await
                    .unwrap();
            }));
        }
        for writer in writers {
            writer.await.unwrap();
        }

        for i in 0..8u8 {
            let found = handle
                .query(question(&format!("host{}.local", i), QueryType::A))
                .await
                .unwrap();
            assert_eq!(1, found.len());
        }
    }
}
