//! Endpoint events and the Kubernetes object shapes they are derived from

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What happened to an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Added,
    Deleted,
    Updated,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Added => write!(f, "added"),
            Action::Deleted => write!(f, "deleted"),
            Action::Updated => write!(f, "updated"),
        }
    }
}

/// Kind of object an endpoint was derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Service,
    Ingress,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Service => write!(f, "service"),
            SourceKind::Ingress => write!(f, "ingress"),
        }
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "service" => Ok(SourceKind::Service),
            "ingress" => Ok(SourceKind::Ingress),
            other => Err(format!("unknown source kind: {}", other)),
        }
    }
}

/// A named endpoint that appeared, changed or went away
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointEvent {
    pub action: Action,
    pub source_kind: SourceKind,
    pub name: String,
    pub namespace: String,
    pub ips: Vec<String>,
}

impl EndpointEvent {
    pub fn new(
        action: Action,
        source_kind: SourceKind,
        name: &str,
        namespace: &str,
        ips: Vec<String>,
    ) -> EndpointEvent {
        EndpointEvent {
            action,
            source_kind,
            name: name.to_string(),
            namespace: namespace.to_string(),
            ips,
        }
    }
}

/// Namespace of objects that don't name one
pub const DEFAULT_OBJECT_NAMESPACE: &str = "default";

/// The subset of a Service or Ingress object the sources read
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ManifestSpec,
    #[serde(default)]
    pub status: ManifestStatus,
}

impl Manifest {
    pub fn namespace(&self) -> &str {
        self.metadata
            .namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
            .unwrap_or(DEFAULT_OBJECT_NAMESPACE)
    }

    pub fn source_kind(&self) -> Option<SourceKind> {
        self.kind.parse().ok()
    }

    /// Non-empty load balancer IPs in status order
    pub fn load_balancer_ips(&self) -> Vec<String> {
        self.status
            .load_balancer
            .ingress
            .iter()
            .filter_map(|lb| lb.ip.clone())
            .filter(|ip| !ip.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestSpec {
    /// Service type; Kubernetes treats a missing type as `ClusterIP`
    #[serde(default, rename = "type")]
    pub service_type: Option<String>,
    #[serde(default, rename = "clusterIP")]
    pub cluster_ip: Option<String>,
    #[serde(default)]
    pub rules: Vec<IngressRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngressRule {
    #[serde(default)]
    pub host: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestStatus {
    #[serde(default, rename = "loadBalancer")]
    pub load_balancer: LoadBalancerStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancerStatus {
    #[serde(default)]
    pub ingress: Vec<LoadBalancerIngress>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancerIngress {
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_kind_from_str() {
        assert_eq!(Ok(SourceKind::Service), "Service".parse());
        assert_eq!(Ok(SourceKind::Ingress), "ingress".parse());
        assert!("Deployment".parse::<SourceKind>().is_err());
    }

    #[test]
    fn test_manifest_defaults() {
        let manifest: Manifest =
            serde_yaml::from_str("kind: Service\nmetadata:\n  name: web\n").unwrap();

        assert_eq!("web", manifest.metadata.name);
        assert_eq!(DEFAULT_OBJECT_NAMESPACE, manifest.namespace());
        assert_eq!(Some(SourceKind::Service), manifest.source_kind());
        assert!(manifest.load_balancer_ips().is_empty());
    }

    #[test]
    fn test_load_balancer_ips_skip_empty() {
        let manifest: Manifest = serde_yaml::from_str(
            r#"
kind: Service
metadata:
  name: web
  namespace: apps
status:
  loadBalancer:
    ingress:
      - ip: 10.0.0.9
      - hostname: lb.example.com
      - ip: ""
      - ip: 10.0.0.10
"#,
        )
        .unwrap();

        assert_eq!("apps", manifest.namespace());
        assert_eq!(
            vec!["10.0.0.9".to_string(), "10.0.0.10".to_string()],
            manifest.load_balancer_ips()
        );
    }
}
