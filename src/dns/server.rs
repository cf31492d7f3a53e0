//! mDNS interface connector
//!
//! One connector serves one multicast socket. A read loop decodes incoming
//! datagrams and hands them over a bounded queue to a processing loop, which
//! asks the zone store for answers and sends the response.

use std::collections::{HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use derive_more::{Display, Error, From};
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::dns::authority::{zone_key, AuthorityError, ZoneHandle};
use crate::dns::context::ServerContext;
use crate::dns::netutil::{bind_multicast, MDNS_PORT};
use crate::dns::protocol::{DnsPacket, DnsQuestion, DnsRecord, QueryType, CACHE_FLUSH_BIT};

#[derive(Debug, Display, From, Error)]
pub enum ServerError {
    Io(std::io::Error),
}

type Result<T> = std::result::Result<T, ServerError>;

/// TTL ceiling for responses to legacy unicast queriers (RFC 6762 §6.7)
pub const LEGACY_UNICAST_MAX_TTL: u32 = 10;

/// Follow-up questions for additional records, keyed by answer type. The
/// question name is the target named in the answer's rdata.
pub const EXTRA_RECORD_RULES: &[(QueryType, QueryType)] = &[
    (QueryType::Ptr, QueryType::Any),
    (QueryType::Srv, QueryType::A),
];

macro_rules! return_or_report {
    ( $x:expr, $message:expr ) => {
        match $x {
            Ok(res) => res,
            Err(e) => {
                log::warn!("{}: {}", $message, e);
                return;
            }
        }
    };
}

/// Queries sent from a port other than 5353 come from simple resolvers that
/// expect a conventional unicast DNS reply
pub fn is_legacy_unicast(src: &SocketAddr) -> bool {
    src.port() != MDNS_PORT
}

/// The follow-up question an answer calls for, if any
fn follow_up(record: &DnsRecord) -> Option<DnsQuestion> {
    let rtype = record.get_querytype();
    let target = record.get_target()?;

    EXTRA_RECORD_RULES
        .iter()
        .find(|(from, _)| *from == rtype)
        .map(|(_, qtype)| DnsQuestion::new(target.to_string(), *qtype))
}

/// Collect the additional records referenced from `answers`, transitively.
///
/// Every (name, type) follow-up is asked at most once, so records that point
/// at each other terminate. Records already present in `answers` are not
/// repeated.
async fn resolve_extras(
    zone: &ZoneHandle,
    answers: &[DnsRecord],
    mut visited: HashSet<(String, QueryType)>,
) -> std::result::Result<Vec<DnsRecord>, AuthorityError> {
    let mut seen: HashSet<DnsRecord> = answers.iter().cloned().collect();
    let mut pending: VecDeque<DnsQuestion> = answers.iter().filter_map(follow_up).collect();
    let mut extras = Vec::new();

    while let Some(question) = pending.pop_front() {
        if !visited.insert((zone_key(&question.name), question.qtype)) {
            continue;
        }

        for record in zone.query(question).await? {
            if !seen.insert(record.clone()) {
                continue;
            }
            if let Some(next) = follow_up(&record) {
                pending.push_back(next);
            }
            extras.push(record);
        }
    }

    Ok(extras)
}

/// Apply the per-destination TTL and cache-flush policy
fn apply_response_policy(record: &mut DnsRecord, legacy_unicast: bool) {
    if legacy_unicast {
        record.ttl = record.ttl.min(LEGACY_UNICAST_MAX_TTL);
    } else {
        record.class |= CACHE_FLUSH_BIT;
    }
}

/// Build the response to `request` received from `src` on a connector bound
/// to `group`.
///
/// Returns the response together with its destination, or `None` when
/// nothing should be sent.
pub async fn execute_query(
    zone: &ZoneHandle,
    request: &DnsPacket,
    src: SocketAddr,
    group: SocketAddr,
) -> Option<(DnsPacket, SocketAddr)> {
    if request.header.response || request.questions.is_empty() {
        return None;
    }

    let legacy_unicast = is_legacy_unicast(&src);

    let mut packet = DnsPacket::new();
    packet.header.id = request.header.id;
    packet.header.opcode = request.header.opcode;
    packet.header.response = true;
    packet.header.authoritative_answer = true;

    let mut visited = HashSet::new();
    for question in &request.questions {
        visited.insert((zone_key(&question.name), question.qtype));

        match zone.query(question.clone()).await {
            Ok(records) => packet.answers.extend(records),
            Err(e) => {
                log::warn!("Failed to query zone for {}: {}", question, e);
                return None;
            }
        }
    }

    if packet.answers.is_empty() {
        return None;
    }

    packet.resources = match resolve_extras(zone, &packet.answers, visited).await {
        Ok(extras) => extras,
        Err(e) => {
            log::warn!("Failed to resolve additional records: {}", e);
            return None;
        }
    };

    for record in packet.answers.iter_mut().chain(packet.resources.iter_mut()) {
        apply_response_policy(record, legacy_unicast);
    }

    let dest = if legacy_unicast || request.questions[0].unicast_response() {
        src
    } else {
        group
    };

    if legacy_unicast {
        packet.questions = request.questions.clone();
    }

    Some((packet, dest))
}

/// Serves mDNS queries arriving on one socket
pub struct MdnsConnector {
    socket: Arc<UdpSocket>,
    group: SocketAddr,
    zone: ZoneHandle,
    context: Arc<ServerContext>,
}

impl MdnsConnector {
    /// Bind the multicast socket for `group`
    pub fn bind(
        group: SocketAddr,
        zone: ZoneHandle,
        context: Arc<ServerContext>,
    ) -> Result<MdnsConnector> {
        let socket = bind_multicast(group)?;
        log::info!("Listening for mDNS queries on {}", group);

        Ok(MdnsConnector::from_socket(socket, group, zone, context))
    }

    /// Serve on an already bound socket; multicast responses go to `group`
    pub fn from_socket(
        socket: UdpSocket,
        group: SocketAddr,
        zone: ZoneHandle,
        context: Arc<ServerContext>,
    ) -> MdnsConnector {
        MdnsConnector {
            socket: Arc::new(socket),
            group,
            zone,
            context,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn group(&self) -> SocketAddr {
        self.group
    }

    /// Spawn the read and processing loops. Both stop when `shutdown` fires.
    pub fn run(self, shutdown: &broadcast::Sender<()>) -> Vec<JoinHandle<()>> {
        let (tx, rx) = mpsc::channel(self.context.packet_queue_size.max(1));

        let reader = tokio::spawn(read_loop(
            self.socket.clone(),
            self.context.clone(),
            tx,
            shutdown.subscribe(),
        ));
        let processor = tokio::spawn(process_loop(self, rx, shutdown.subscribe()));

        vec![reader, processor]
    }

    async fn process_request(&self, src: SocketAddr, request: DnsPacket) {
        let (mut packet, dest) =
            match execute_query(&self.zone, &request, src, self.group).await {
                Some(res) => res,
                None => return,
            };

        let data = return_or_report!(
            packet.to_bytes(self.context.max_packet_size),
            "Failed to encode response"
        );
        if packet.header.truncated_message {
            log::debug!("Response to {} truncated at {} bytes", src, data.len());
        }

        return_or_report!(
            self.socket.send_to(&data, dest).await,
            format!("Failed to send response to {}", dest)
        );

        self.context
            .statistics
            .sent_responses
            .fetch_add(1, Ordering::Release);
        log::debug!(
            "Answered {} from {} with {} answers and {} additionals",
            request.questions[0],
            src,
            packet.answers.len(),
            packet.resources.len()
        );
    }
}

async fn read_loop(
    socket: Arc<UdpSocket>,
    context: Arc<ServerContext>,
    queue: mpsc::Sender<(SocketAddr, DnsPacket)>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut buf = vec![0u8; context.max_packet_size.max(512)];

    loop {
        let (len, src) = tokio::select! {
            _ = shutdown.recv() => break,
            res = socket.recv_from(&mut buf) => match res {
                Ok(x) => x,
                Err(e) => {
                    log::warn!("Failed to read from UDP socket: {}", e);
                    continue;
                }
            },
        };

        context
            .statistics
            .received_packets
            .fetch_add(1, Ordering::Release);

        let request = match DnsPacket::from_bytes(&buf[..len]) {
            Ok(x) => x,
            Err(e) => {
                context
                    .statistics
                    .dropped_packets
                    .fetch_add(1, Ordering::Release);
                log::debug!("Failed to parse packet from {}: {}", src, e);
                continue;
            }
        };

        if queue.send((src, request)).await.is_err() {
            break;
        }
    }

    log::debug!("Read loop stopped");
}

async fn process_loop(
    connector: MdnsConnector,
    mut queue: mpsc::Receiver<(SocketAddr, DnsPacket)>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        let (src, request) = tokio::select! {
            _ = shutdown.recv() => break,
            item = queue.recv() => match item {
                Some(x) => x,
                None => break,
            },
        };

        connector.process_request(src, request).await;
    }

    log::debug!("Processing loop for {} stopped", connector.group);
}

#[cfg(test)]
mod tests {

    use std::net::Ipv4Addr;

    use tokio::sync::broadcast;

    use super::*;
    use crate::dns::authority::spawn;
    use crate::dns::protocol::{RecordData, CLASS_IN, UNICAST_RESPONSE_BIT};

    fn group() -> SocketAddr {
        "224.0.0.251:5353".parse().unwrap()
    }

    fn mdns_peer() -> SocketAddr {
        "192.168.1.20:5353".parse().unwrap()
    }

    fn legacy_peer() -> SocketAddr {
        "192.168.1.20:40000".parse().unwrap()
    }

    fn build_query(qname: &str, qtype: QueryType) -> DnsPacket {
        let mut query_packet = DnsPacket::new();
        query_packet.header.id = 4242;

        query_packet
            .questions
            .push(DnsQuestion::new(qname.into(), qtype));

        query_packet
    }

    fn a_record(domain: &str, addr: Ipv4Addr) -> DnsRecord {
        DnsRecord::new(domain, 120, RecordData::A { addr })
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

    async fn zone_with(records: Vec<DnsRecord>) -> (ZoneHandle, broadcast::Sender<()>) {
        let (shutdown, rx) = broadcast::channel(1);
        let (zone, _) = spawn(rx);
        for rec in records {
            zone.add(rec).await.unwrap();
        }
        (zone, shutdown)
    }

    #[tokio::test]
    async fn test_legacy_unicast_caps_ttl_and_keeps_question() {
        let (zone, _shutdown) =
            zone_with(vec![a_record("web.local", Ipv4Addr::new(10, 0, 0, 9))]).await;

        let request = build_query("web.local", QueryType::A);
        let (res, dest) = execute_query(&zone, &request, legacy_peer(), group())
            .await
            .unwrap();

        assert_eq!(legacy_peer(), dest);
        assert_eq!(4242, res.header.id);
        assert!(res.header.response);
        assert!(res.header.authoritative_answer);
        assert_eq!(request.questions, res.questions);
        assert_eq!(1, res.answers.len());
        assert_eq!(10, res.answers[0].ttl);
        assert_eq!(CLASS_IN, res.answers[0].class);
    }

    #[tokio::test]
    async fn test_multicast_sets_cache_flush_and_strips_question() {
        let (zone, _shutdown) =
            zone_with(vec![a_record("web.local", Ipv4Addr::new(10, 0, 0, 9))]).await;

        let (res, dest) = execute_query(
            &zone,
            &build_query("web.local", QueryType::A),
            mdns_peer(),
            group(),
        )
        .await
        .unwrap();

        assert_eq!(group(), dest);
        assert!(res.questions.is_empty());
        assert_eq!(120, res.answers[0].ttl);
        assert_eq!(CLASS_IN | CACHE_FLUSH_BIT, res.answers[0].class);
    }

    #[tokio::test]
    async fn test_unicast_response_bit_answers_querier() {
        let (zone, _shutdown) =
            zone_with(vec![a_record("web.local", Ipv4Addr::new(10, 0, 0, 9))]).await;

        let mut request = build_query("web.local", QueryType::A);
        request.questions[0].qclass |= UNICAST_RESPONSE_BIT;

        let (res, dest) = execute_query(&zone, &request, mdns_peer(), group())
            .await
            .unwrap();

        assert_eq!(mdns_peer(), dest);
        assert!(res.questions.is_empty());
        assert!(res.answers[0].has_cache_flush());
    }

    #[tokio::test]
    async fn test_nothing_sent_without_answers() {
        let (zone, _shutdown) =
            zone_with(vec![a_record("web.local", Ipv4Addr::new(10, 0, 0, 9))]).await;

        let res = execute_query(
            &zone,
            &build_query("web.local", QueryType::Aaaa),
            mdns_peer(),
            group(),
        )
        .await;
        assert!(res.is_none());

        let res = execute_query(&zone, &DnsPacket::new(), mdns_peer(), group()).await;
        assert!(res.is_none());
    }

    #[tokio::test]
    async fn test_responses_are_not_answered() {
        let (zone, _shutdown) =
            zone_with(vec![a_record("web.local", Ipv4Addr::new(10, 0, 0, 9))]).await;

        let mut request = build_query("web.local", QueryType::A);
        request.header.response = true;

        assert!(execute_query(&zone, &request, mdns_peer(), group())
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_reverse_lookup_adds_address_record() {
        let (zone, _shutdown) = zone_with(vec![
            a_record("web.default.local", Ipv4Addr::new(10, 0, 0, 9)),
            ptr_record("9.0.0.10.in-addr.arpa", "web.default.local"),
        ])
        .await;

        let (res, _) = execute_query(
            &zone,
            &build_query("9.0.0.10.in-addr.arpa", QueryType::Ptr),
            mdns_peer(),
            group(),
        )
        .await
        .unwrap();

        assert_eq!(1, res.answers.len());
        assert_eq!(1, res.resources.len());
        assert_eq!("web.default.local", res.resources[0].domain);
        assert_eq!(QueryType::A, res.resources[0].get_querytype());
        assert!(res.resources[0].has_cache_flush());
    }

    #[tokio::test]
    async fn test_any_query_on_reverse_name_chains_to_address() {
        let (zone, _shutdown) = zone_with(vec![
            a_record("web.default.local", Ipv4Addr::new(10, 0, 0, 9)),
            ptr_record("9.0.0.10.in-addr.arpa", "web.default.local"),
        ])
        .await;

        let (res, _) = execute_query(
            &zone,
            &build_query("9.0.0.10.in-addr.arpa", QueryType::Any),
            legacy_peer(),
            group(),
        )
        .await
        .unwrap();

        assert_eq!(1, res.answers.len());
        assert_eq!(QueryType::Ptr, res.answers[0].get_querytype());
        assert_eq!(1, res.resources.len());
        assert_eq!(
            RecordData::A {
                addr: Ipv4Addr::new(10, 0, 0, 9)
            },
            res.resources[0].data
        );
        assert_eq!(10, res.resources[0].ttl);
    }

    #[tokio::test]
    async fn test_names_differing_in_case_are_answered_once() {
        let (zone, _shutdown) = zone_with(vec![
            a_record("Web.local", Ipv4Addr::new(10, 0, 0, 9)),
            a_record("web.local", Ipv4Addr::new(10, 0, 0, 9)),
        ])
        .await;

        let (res, _) = execute_query(
            &zone,
            &build_query("web.local", QueryType::A),
            mdns_peer(),
            group(),
        )
        .await
        .unwrap();

        assert_eq!(1, res.answers.len());
    }

    #[tokio::test]
    async fn test_service_chain_resolves_transitively() {
        let (zone, _shutdown) = zone_with(vec![
            ptr_record("_http._tcp.local", "web._http._tcp.local"),
            DnsRecord::new(
                "web._http._tcp.local",
                120,
                RecordData::Srv {
                    priority: 0,
                    weight: 0,
                    port: 8080,
                    host: "web.local".to_string(),
                },
            ),
            a_record("web.local", Ipv4Addr::new(10, 0, 0, 9)),
        ])
        .await;

        let (res, _) = execute_query(
            &zone,
            &build_query("_http._tcp.local", QueryType::Ptr),
            legacy_peer(),
            group(),
        )
        .await
        .unwrap();

        assert_eq!(1, res.answers.len());
        let extra_types: Vec<QueryType> =
            res.resources.iter().map(|r| r.get_querytype()).collect();
        assert_eq!(vec![QueryType::Srv, QueryType::A], extra_types);
        assert!(res.resources.iter().all(|r| r.ttl == LEGACY_UNICAST_MAX_TTL));
    }

    #[tokio::test]
    async fn test_pointer_cycle_terminates() {
        let (zone, _shutdown) = zone_with(vec![
            ptr_record("a.local", "b.local"),
            ptr_record("b.local", "a.local"),
        ])
        .await;

        let (res, _) = execute_query(
            &zone,
            &build_query("a.local", QueryType::Ptr),
            mdns_peer(),
            group(),
        )
        .await
        .unwrap();

        assert_eq!(1, res.answers.len());
        assert_eq!(1, res.resources.len());
        assert_eq!("b.local", res.resources[0].domain);
    }

    #[tokio::test]
    async fn test_every_question_is_answered() {
        let (zone, _shutdown) = zone_with(vec![
            a_record("a.local", Ipv4Addr::new(10, 0, 0, 1)),
            a_record("b.local", Ipv4Addr::new(10, 0, 0, 2)),
        ])
        .await;

        let mut request = build_query("a.local", QueryType::A);
        request
            .questions
            .push(DnsQuestion::new("b.local".to_string(), QueryType::A));

        let (res, _) = execute_query(&zone, &request, mdns_peer(), group())
            .await
            .unwrap();

        assert_eq!(2, res.answers.len());
    }

    #[test]
    fn test_follow_up_rules() {
        let srv = DnsRecord::new(
            "web._http._tcp.local",
            120,
            RecordData::Srv {
                priority: 0,
                weight: 0,
                port: 80,
                host: "web.local".to_string(),
            },
        );
        assert_eq!(
            Some(DnsQuestion::new("web.local".to_string(), QueryType::A)),
            follow_up(&srv)
        );

        let ptr = ptr_record("_http._tcp.local", "web._http._tcp.local");
        assert_eq!(
            Some(DnsQuestion::new(
                "web._http._tcp.local".to_string(),
                QueryType::Any
            )),
            follow_up(&ptr)
        );

        let a = a_record("web.local", Ipv4Addr::new(10, 0, 0, 9));
        assert_eq!(None, follow_up(&a));
    }
}
