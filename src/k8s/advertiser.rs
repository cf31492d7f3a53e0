//! Advertiser loop
//!
//! Drains the endpoint event queue and publishes or withdraws the records
//! synthesized for each event.

use tokio::sync::{broadcast, mpsc};

use crate::dns::responder::Publisher;
use crate::k8s::records::{endpoint_records, RecordOptions};
use crate::k8s::resource::{Action, EndpointEvent};

pub struct Advertiser {
    publisher: Publisher,
    options: RecordOptions,
    events: mpsc::Receiver<EndpointEvent>,
    shutdown: broadcast::Receiver<()>,
}

impl Advertiser {
    pub fn new(
        publisher: Publisher,
        options: RecordOptions,
        events: mpsc::Receiver<EndpointEvent>,
        shutdown: broadcast::Receiver<()>,
    ) -> Advertiser {
        Advertiser {
            publisher,
            options,
            events,
            shutdown,
        }
    }

    /// Handle events until shutdown is signalled or every sender is gone
    pub async fn run(mut self) {
        log::debug!("Advertiser started");

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.recv() => {
                    log::debug!("Advertiser received shutdown signal");
                    break;
                }
                event = self.events.recv() => match event {
                    Some(event) => self.handle(&event).await,
                    None => break,
                },
            }
        }

        log::debug!("Advertiser stopped");
    }

    /// Apply one event. Failures are logged and the remaining records of the
    /// event are still applied.
    pub async fn handle(&self, event: &EndpointEvent) {
        let records = endpoint_records(event, &self.options);

        match event.action {
            Action::Added | Action::Updated => {
                for text in &records {
                    if let Err(e) = self.publisher.publish(text).await {
                        log::error!("Failed to publish '{}': {}", text, e);
                    }
                }
            }
            Action::Deleted => {
                for text in &records {
                    if let Err(e) = self.publisher.unpublish(text).await {
                        log::error!("Failed to unpublish '{}': {}", text, e);
                    }
                }
            }
        }

        log::info!(
            "{} {} {}/{} ({} records)",
            event.action,
            event.source_kind,
            event.namespace,
            event.name,
            records.len()
        );
    }
}

/// Spawn an advertiser task
pub fn spawn(
    publisher: Publisher,
    options: RecordOptions,
    events: mpsc::Receiver<EndpointEvent>,
    shutdown: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    let advertiser = Advertiser::new(publisher, options, events, shutdown);
    tokio::spawn(advertiser.run())
}
