//! The responder facade
//!
//! `Responder` owns the lifecycle of the engine: the zone store task and one
//! connector per listening socket, all stopped together by a broadcast
//! shutdown signal. `Publisher` is the cloneable entry point producers use to
//! change the zone with textual records.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::dns::authority::{self, ZoneHandle};
use crate::dns::context::ServerContext;
use crate::dns::errors::ResponderError;
use crate::dns::protocol::DnsRecord;
use crate::dns::server::MdnsConnector;
use crate::dns::zone_parser::parse_record;

type Result<T> = std::result::Result<T, ResponderError>;

/// Publishes and withdraws records
#[derive(Clone, Debug)]
pub struct Publisher {
    zone: ZoneHandle,
}

impl Publisher {
    pub fn new(zone: ZoneHandle) -> Publisher {
        Publisher { zone }
    }

    /// Parse `text` and add the record to the zone
    pub async fn publish(&self, text: &str) -> Result<()> {
        let record = parse_record(text)?;
        self.publish_record(record).await
    }

    /// Parse `text` and remove the equal record from the zone
    pub async fn unpublish(&self, text: &str) -> Result<()> {
        let record = parse_record(text)?;
        self.unpublish_record(record).await
    }

    pub async fn publish_record(&self, record: DnsRecord) -> Result<()> {
        log::debug!("Publishing {}", record);
        self.zone.add(record).await?;

        Ok(())
    }

    pub async fn unpublish_record(&self, record: DnsRecord) -> Result<()> {
        log::debug!("Unpublishing {}", record);
        self.zone.delete(record).await?;

        Ok(())
    }

    /// Drop every published record
    pub async fn clear(&self) {
        if let Err(e) = self.zone.clear().await {
            log::warn!("Failed to clear zone: {}", e);
        }
    }
}

/// A running responder engine
pub struct Responder {
    zone: ZoneHandle,
    shutdown: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl Responder {
    /// Spawn the zone store. Must be called within a tokio runtime.
    pub fn start() -> Responder {
        let (shutdown, shutdown_rx) = broadcast::channel(1);
        let (zone, store_task) = authority::spawn(shutdown_rx);

        Responder {
            zone,
            shutdown,
            tasks: vec![store_task],
        }
    }

    /// Bind a connector for the multicast `group` and start serving it.
    /// Returns the bound local address.
    pub fn listen(
        &mut self,
        group: SocketAddr,
        context: Arc<ServerContext>,
    ) -> Result<SocketAddr> {
        let connector = MdnsConnector::bind(group, self.zone.clone(), context)?;
        self.serve(connector)
    }

    /// Start serving an already constructed connector
    pub fn serve(&mut self, connector: MdnsConnector) -> Result<SocketAddr> {
        let local_addr = connector.local_addr()?;
        self.tasks.extend(connector.run(&self.shutdown));

        Ok(local_addr)
    }

    pub fn publisher(&self) -> Publisher {
        Publisher::new(self.zone.clone())
    }

    pub fn zone(&self) -> ZoneHandle {
        self.zone.clone()
    }

    /// Receiver that fires when the responder stops
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown.subscribe()
    }

    /// Signal every task to stop and wait for them
    pub async fn stop(self) {
        log::info!("Stopping responder");

        let _ = self.shutdown.send(());
        for task in self.tasks {
            if let Err(e) = task.await {
                log::warn!("Responder task failed: {}", e);
            }
        }
    }
}
