//! Contains the data store for published records
//!
//! The zone is owned by a single control loop (`ZoneStore::run`). Everything
//! else talks to it through a cloneable `ZoneHandle` which enqueues
//! mutations and queries on two bounded channels:
//!
//! - mutations (`Operation`) are applied in submission order
//! - queries (`Query`) are answered with copies of the matching records,
//!   delivered through a oneshot channel so the loop never waits on a reader
//!
//! Pending mutations are always drained before queries, so a query issued
//! after `ZoneHandle::apply` has returned observes that mutation.

use std::collections::{BTreeSet, HashMap};

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::dns::protocol::{DnsQuestion, DnsRecord};

/// Capacity of the mutation queue
pub const OPERATION_QUEUE_SIZE: usize = 64;

/// Capacity of the query queue
pub const QUERY_QUEUE_SIZE: usize = 16;

#[derive(Debug)]
pub enum AuthorityError {
    /// The store loop has exited
    Closed,
}

impl std::fmt::Display for AuthorityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthorityError::Closed => write!(f, "Zone store is not running"),
        }
    }
}

impl std::error::Error for AuthorityError {}

impl<T> From<mpsc::error::SendError<T>> for AuthorityError {
    fn from(_: mpsc::error::SendError<T>) -> Self {
        AuthorityError::Closed
    }
}

impl From<oneshot::error::RecvError> for AuthorityError {
    fn from(_: oneshot::error::RecvError) -> Self {
        AuthorityError::Closed
    }
}

type Result<T> = std::result::Result<T, AuthorityError>;

/// Map key for a domain name: lowercase, no trailing dot
pub fn zone_key(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

/// Records grouped by owner name
///
/// A name never holds two equal records, and a name without records has no
/// entry at all.
#[derive(Clone, Debug, Default)]
pub struct Zone {
    records: HashMap<String, BTreeSet<DnsRecord>>,
}

impl Zone {
    pub fn new() -> Zone {
        Zone::default()
    }

    /// Returns false if an equal record was already present. Records are
    /// stored in canonical form, so names compare case-insensitively.
    pub fn add_record(&mut self, rec: &DnsRecord) -> bool {
        let rec = rec.canonical();
        self.records
            .entry(rec.domain.clone())
            .or_default()
            .insert(rec)
    }

    /// Returns false if no equal record was present
    pub fn delete_record(&mut self, rec: &DnsRecord) -> bool {
        let rec = rec.canonical();
        let key = zone_key(&rec.domain);

        let (removed, now_empty) = match self.records.get_mut(&key) {
            Some(set) => (set.remove(&rec), set.is_empty()),
            None => return false,
        };

        if now_empty {
            self.records.remove(&key);
        }

        removed
    }

    pub fn clear(&mut self) {
        self.records = HashMap::new();
    }

    /// Copies of every record under the question name whose type matches
    pub fn lookup(&self, question: &DnsQuestion) -> Vec<DnsRecord> {
        self.records
            .get(&zone_key(&question.name))
            .map(|set| {
                set.iter()
                    .filter(|rec| question.qtype.matches(rec.get_querytype()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of names holding at least one record
    pub fn name_count(&self) -> usize {
        self.records.len()
    }

    pub fn record_count(&self) -> usize {
        self.records.values().map(|set| set.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationKind {
    Add,
    Delete,
    Clear,
}

/// A queued mutation of the zone
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Operation {
    pub kind: OperationKind,
    pub record: Option<DnsRecord>,
}

impl Operation {
    pub fn add(record: DnsRecord) -> Operation {
        Operation {
            kind: OperationKind::Add,
            record: Some(record),
        }
    }

    pub fn delete(record: DnsRecord) -> Operation {
        Operation {
            kind: OperationKind::Delete,
            record: Some(record),
        }
    }

    pub fn clear() -> Operation {
        Operation {
            kind: OperationKind::Clear,
            record: None,
        }
    }
}

/// A queued lookup; the matching records are sent back through `results`
#[derive(Debug)]
pub struct Query {
    pub question: DnsQuestion,
    pub results: oneshot::Sender<Vec<DnsRecord>>,
}

/// The control loop owning the zone
pub struct ZoneStore {
    zone: Zone,
    operations: mpsc::Receiver<Operation>,
    queries: mpsc::Receiver<Query>,
    shutdown: broadcast::Receiver<()>,
}

impl ZoneStore {
    /// Create a store and the handle used to reach it
    pub fn new(shutdown: broadcast::Receiver<()>) -> (ZoneStore, ZoneHandle) {
        let (op_tx, op_rx) = mpsc::channel(OPERATION_QUEUE_SIZE);
        let (query_tx, query_rx) = mpsc::channel(QUERY_QUEUE_SIZE);

        let store = ZoneStore {
            zone: Zone::new(),
            operations: op_rx,
            queries: query_rx,
            shutdown,
        };
        let handle = ZoneHandle {
            operations: op_tx,
            queries: query_tx,
        };

        (store, handle)
    }

    /// Serve mutations and queries until shutdown is signalled or every
    /// handle has been dropped
    pub async fn run(mut self) {
        log::debug!("Zone store started");

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.recv() => {
                    log::debug!("Zone store received shutdown signal");
                    break;
                }
                Some(op) = self.operations.recv() => {
                    self.execute(op);
                }
                Some(query) = self.queries.recv() => {
                    self.answer(query);
                }
                else => break,
            }
        }

        log::debug!(
            "Zone store stopped with {} records under {} names",
            self.zone.record_count(),
            self.zone.name_count()
        );
    }

    fn execute(&mut self, op: Operation) {
        match (op.kind, op.record) {
            (OperationKind::Add, Some(rec)) => {
                if self.zone.add_record(&rec) {
                    log::debug!("Added record {}", rec);
                }
            }
            (OperationKind::Delete, Some(rec)) => {
                if self.zone.delete_record(&rec) {
                    log::debug!("Removed record {}", rec);
                }
            }
            (OperationKind::Clear, _) => {
                self.zone.clear();
                log::debug!("Cleared zone");
            }
            (kind, None) => {
                log::warn!("Ignoring {:?} operation without a record", kind);
            }
        }
    }

    fn answer(&self, query: Query) {
        let records = self.zone.lookup(&query.question);

        // the asker may have gone away; nothing to do then
        let _ = query.results.send(records);
    }
}

/// Cloneable sender side of the zone store
#[derive(Clone, Debug)]
pub struct ZoneHandle {
    operations: mpsc::Sender<Operation>,
    queries: mpsc::Sender<Query>,
}

impl ZoneHandle {
    /// Enqueue a mutation. Returns once the operation is queued.
    pub async fn apply(&self, op: Operation) -> Result<()> {
        self.operations.send(op).await?;

        Ok(())
    }

    pub async fn add(&self, record: DnsRecord) -> Result<()> {
        self.apply(Operation::add(record)).await
    }

    pub async fn delete(&self, record: DnsRecord) -> Result<()> {
        self.apply(Operation::delete(record)).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.apply(Operation::clear()).await
    }

    /// Look up the records answering `question`
    pub async fn query(&self, question: DnsQuestion) -> Result<Vec<DnsRecord>> {
        let (tx, rx) = oneshot::channel();

        self.queries
            .send(Query {
                question,
                results: tx,
            })
            .await?;

        Ok(rx.await?)
    }

    pub fn is_closed(&self) -> bool {
        self.operations.is_closed()
    }
}

/// Spawn the store loop on the current runtime
pub fn spawn(shutdown: broadcast::Receiver<()>) -> (ZoneHandle, JoinHandle<()>) {
    let (store, handle) = ZoneStore::new(shutdown);
    let task = tokio::spawn(store.run());

    (handle, task)
}
