//! Endpoint sources
//!
//! Turns Service and Ingress objects into endpoint events on a bounded
//! queue. Objects come from multi-document YAML manifests; the add, delete
//! and update hooks are the same ones a live watch would drive.

use std::path::Path;

use derive_more::{Display, Error, From};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::k8s::resource::{Action, EndpointEvent, Manifest, SourceKind};

/// Capacity of the endpoint event queue
pub const EVENT_QUEUE_SIZE: usize = 64;

#[derive(Debug, Display, From, Error)]
pub enum SourceError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
}

type Result<T> = std::result::Result<T, SourceError>;

/// Which objects a source honors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    /// Only objects in this namespace; all namespaces when unset
    pub namespace: Option<String>,
    pub kinds: Vec<SourceKind>,
    /// Publish the cluster IP of ClusterIP services
    pub publish_internal: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            namespace: None,
            kinds: vec![SourceKind::Service, SourceKind::Ingress],
            publish_internal: false,
        }
    }
}

/// The endpoint of a Service object
///
/// `ClusterIP` services (the default type) carry their cluster IP only when
/// `publish_internal` is set; `LoadBalancer` services carry every
/// load balancer IP; other types carry none.
pub fn service_endpoint(obj: &Manifest, action: Action, publish_internal: bool) -> EndpointEvent {
    let ips = match obj.spec.service_type.as_deref().unwrap_or("ClusterIP") {
        "ClusterIP" if publish_internal => obj
            .spec
            .cluster_ip
            .iter()
            .filter(|ip| !ip.is_empty() && ip.as_str() != "None")
            .cloned()
            .collect(),
        "LoadBalancer" => obj.load_balancer_ips(),
        _ => Vec::new(),
    };

    EndpointEvent::new(
        action,
        SourceKind::Service,
        &obj.metadata.name,
        obj.namespace(),
        ips,
    )
}

/// The endpoints of an Ingress object, one per `.local` rule host.
///
/// All endpoints share the last load balancer IP; an ingress without one
/// has no endpoints.
pub fn ingress_endpoints(obj: &Manifest, action: Action) -> Vec<EndpointEvent> {
    let ip = match obj.load_balancer_ips().pop() {
        Some(ip) => ip,
        None => return Vec::new(),
    };

    obj.spec
        .rules
        .iter()
        .filter_map(|rule| rule.host.as_deref())
        .filter_map(|host| host.strip_suffix(".local"))
        .filter(|name| !name.is_empty())
        .map(|name| {
            EndpointEvent::new(
                action,
                SourceKind::Ingress,
                name,
                obj.namespace(),
                vec![ip.clone()],
            )
        })
        .collect()
}

/// Split a multi-document YAML stream into objects, skipping empty documents
pub fn parse_manifests(text: &str) -> Result<Vec<Manifest>> {
    let mut manifests = Vec::new();

    for document in serde_yaml::Deserializer::from_str(text) {
        let value = serde_yaml::Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }
        manifests.push(serde_yaml::from_value(value)?);
    }

    Ok(manifests)
}

/// Feeds endpoint events for Service and Ingress objects into a queue
#[derive(Clone, Debug)]
pub struct EndpointSource {
    config: SourceConfig,
    queue: mpsc::Sender<EndpointEvent>,
}

impl EndpointSource {
    pub fn new(config: SourceConfig, queue: mpsc::Sender<EndpointEvent>) -> EndpointSource {
        EndpointSource { config, queue }
    }

    /// Endpoints of `obj`, honoring the kind and namespace filters
    fn build(&self, obj: &Manifest, action: Action) -> Vec<EndpointEvent> {
        let kind = match obj.source_kind() {
            Some(kind) if self.config.kinds.contains(&kind) => kind,
            _ => return Vec::new(),
        };

        if let Some(namespace) = &self.config.namespace {
            if namespace != obj.namespace() {
                return Vec::new();
            }
        }

        match kind {
            SourceKind::Service => {
                vec![service_endpoint(obj, action, self.config.publish_internal)]
            }
            SourceKind::Ingress => ingress_endpoints(obj, action),
        }
    }

    /// Send events, returning how many were queued
    async fn notify(&self, events: Vec<EndpointEvent>) -> usize {
        let mut sent = 0;
        for event in events {
            if self.queue.send(event).await.is_err() {
                log::warn!("Endpoint queue closed, dropping events");
                break;
            }
            sent += 1;
        }
        sent
    }

    pub async fn on_add(&self, obj: &Manifest) -> usize {
        let events = self
            .build(obj, Action::Added)
            .into_iter()
            .filter(|e| !e.ips.is_empty())
            .collect();
        self.notify(events).await
    }

    pub async fn on_delete(&self, obj: &Manifest) -> usize {
        let events = self.build(obj, Action::Deleted);
        self.notify(events).await
    }

    /// An update withdraws the old endpoints and then adds the new ones
    pub async fn on_update(&self, old: &Manifest, new: &Manifest) -> usize {
        let mut events = self.build(old, Action::Deleted);
        events.extend(
            self.build(new, Action::Added)
                .into_iter()
                .filter(|e| !e.ips.is_empty()),
        );
        self.notify(events).await
    }

    /// Read a manifest file and add every object in it
    pub async fn load_manifest_file(&self, path: &Path) -> Result<usize> {
        let text = tokio::fs::read_to_string(path).await?;
        let manifests = parse_manifests(&text)?;

        let mut sent = 0;
        for obj in &manifests {
            sent += self.on_add(obj).await;
        }

        log::info!(
            "Loaded {} objects from {}, {} endpoints queued",
            manifests.len(),
            path.display(),
            sent
        );

        Ok(sent)
    }
}

/// Create the endpoint queue
pub fn event_queue() -> (mpsc::Sender<EndpointEvent>, mpsc::Receiver<EndpointEvent>) {
    mpsc::channel(EVENT_QUEUE_SIZE)
}
