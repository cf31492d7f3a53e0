//! external-mdns
//!
//! Advertises Kubernetes services and ingresses on the local network over
//! multicast DNS.

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::Parser;

use external_mdns::dns::context::ServerContext;
use external_mdns::dns::logging::{init_logging, LogLevel, LoggerConfig};
use external_mdns::dns::responder::{Publisher, Responder};
use external_mdns::dns::zone_parser::ZoneParser;
use external_mdns::k8s::advertiser;
use external_mdns::k8s::records::RecordOptions;
use external_mdns::k8s::resource::SourceKind;
use external_mdns::k8s::source::{event_queue, EndpointSource, SourceConfig};

/// Records published by `--test`
const TEST_RECORDS: [&str; 2] = [
    "router.local. 60 IN A 192.168.1.254",
    "254.1.168.192.in-addr.arpa. 60 IN PTR router.local.",
];

#[derive(Parser, Debug)]
#[command(name = "external-mdns")]
#[command(version)]
#[command(about = "Advertise Kubernetes services and ingresses over multicast DNS")]
#[command(long_about = None)]
struct Config {
    /// Namespace whose endpoints are also published as <name>.local
    #[arg(long, env = "EXTERNAL_MDNS_DEFAULT_NAMESPACE", default_value = "default")]
    default_namespace: String,

    /// Only advertise objects in this namespace
    #[arg(long, env = "EXTERNAL_MDNS_NAMESPACE")]
    namespace: Option<String>,

    /// Object kinds to advertise
    #[arg(
        long = "source",
        env = "EXTERNAL_MDNS_SOURCE",
        value_enum,
        value_delimiter = ',',
        default_values_t = [SourceKind::Service, SourceKind::Ingress]
    )]
    sources: Vec<SourceKind>,

    /// TTL of published records, in seconds
    #[arg(long, env = "EXTERNAL_MDNS_RECORD_TTL", default_value_t = 120)]
    record_ttl: u32,

    /// Publish the cluster IP of ClusterIP services
    #[arg(long, env = "EXTERNAL_MDNS_PUBLISH_INTERNAL_SERVICES")]
    publish_internal_services: bool,

    /// Publish A records for IPv4 addresses
    #[arg(
        long,
        env = "EXTERNAL_MDNS_EXPOSE_IPV4",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    expose_ipv4: bool,

    /// Publish AAAA records for IPv6 addresses
    #[arg(long, env = "EXTERNAL_MDNS_EXPOSE_IPV6")]
    expose_ipv6: bool,

    /// Publish <name>.local for endpoints of every namespace
    #[arg(long, env = "EXTERNAL_MDNS_WITHOUT_NAMESPACE")]
    without_namespace: bool,

    /// Shorten labels longer than 63 characters instead of skipping them
    #[arg(long, env = "EXTERNAL_MDNS_TRUNCATE_LONG_LABELS")]
    truncate_long_labels: bool,

    /// YAML manifest of Service and Ingress objects to advertise
    #[arg(long = "manifest", env = "EXTERNAL_MDNS_MANIFEST", value_delimiter = ',')]
    manifests: Vec<PathBuf>,

    /// Zone-style file of static records to publish
    #[arg(long, env = "EXTERNAL_MDNS_RECORDS")]
    records: Option<PathBuf>,

    /// Publish a fixed router.local record and nothing from manifests
    #[arg(long, env = "EXTERNAL_MDNS_TEST")]
    test: bool,

    #[arg(long, env = "EXTERNAL_MDNS_LOG_LEVEL", value_enum, default_value = "info")]
    log_level: LogLevel,

    /// Log in JSON format
    #[arg(long, env = "EXTERNAL_MDNS_LOG_JSON")]
    log_json: bool,

    /// Do not listen on the IPv6 multicast group
    #[arg(long, env = "EXTERNAL_MDNS_DISABLE_IPV6")]
    disable_ipv6: bool,
}

impl Config {
    fn record_options(&self) -> RecordOptions {
        RecordOptions {
            default_namespace: self.default_namespace.clone(),
            ttl: self.record_ttl,
            expose_ipv4: self.expose_ipv4,
            expose_ipv6: self.expose_ipv6,
            truncate_long_labels: self.truncate_long_labels,
            without_namespace: self.without_namespace,
        }
    }

    fn source_config(&self) -> SourceConfig {
        SourceConfig {
            namespace: self.namespace.clone(),
            kinds: self.sources.clone(),
            publish_internal: self.publish_internal_services,
        }
    }
}

async fn publish_test_records(publisher: &Publisher) {
    for text in TEST_RECORDS.iter() {
        if let Err(e) = publisher.publish(text).await {
            log::error!("Failed to publish test record '{}': {}", text, e);
        }
    }
}

async fn publish_records_file(publisher: &Publisher, path: &Path) -> bool {
    let records = match ZoneParser::new("local").parse_file(path) {
        Ok(records) => records,
        Err(e) => {
            log::error!("Failed to load records from {}: {}", path.display(), e);
            return false;
        }
    };

    let count = records.len();
    for record in records {
        if let Err(e) = publisher.publish_record(record).await {
            log::error!("Failed to publish record: {}", e);
            return false;
        }
    }

    log::info!("Published {} records from {}", count, path.display());
    true
}

#[tokio::main]
async fn main() {
    let config = Config::parse();

    init_logging(&LoggerConfig {
        level: config.log_level,
        json_format: config.log_json,
    });

    if !config.test && config.records.is_none() && config.manifests.is_empty() {
        log::error!("Nothing to advertise: pass --test, --records or --manifest");
        process::exit(1);
    }

    let mut context = ServerContext::new();
    context.enable_ipv6 = !config.disable_ipv6;
    let context = Arc::new(context);

    let mut responder = Responder::start();

    match responder.listen(context.ipv4_group, context.clone()) {
        Ok(addr) => log::info!("Listening for IPv4 queries on {}", addr),
        Err(e) => {
            log::error!("Failed to listen on {}: {}", context.ipv4_group, e);
            responder.stop().await;
            process::exit(1);
        }
    }

    if context.enable_ipv6 {
        match responder.listen(context.ipv6_group, context.clone()) {
            Ok(addr) => log::info!("Listening for IPv6 queries on {}", addr),
            Err(e) => log::warn!("Failed to listen on {}: {}", context.ipv6_group, e),
        }
    }

    let publisher = responder.publisher();

    if config.test {
        publish_test_records(&publisher).await;
    }

    if let Some(path) = &config.records {
        if !publish_records_file(&publisher, path).await {
            responder.stop().await;
            process::exit(1);
        }
    }

    let advertiser_task = if !config.test && !config.manifests.is_empty() {
        let (events, queue) = event_queue();
        let task = advertiser::spawn(
            publisher.clone(),
            config.record_options(),
            queue,
            responder.subscribe_shutdown(),
        );

        let source = EndpointSource::new(config.source_config(), events);
        for path in &config.manifests {
            if let Err(e) = source.load_manifest_file(path).await {
                log::error!("Failed to load manifest {}: {}", path.display(), e);
            }
        }

        Some(task)
    } else {
        None
    };

    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to wait for shutdown signal: {}", e);
    }

    log::info!(
        "Shutting down after {} packets received, {} dropped, {} responses sent",
        context.statistics.get_received_packets(),
        context.statistics.get_dropped_packets(),
        context.statistics.get_sent_responses()
    );
    publisher.clear().await;
    responder.stop().await;

    if let Some(task) = advertiser_task {
        if let Err(e) = task.await {
            log::warn!("Advertiser task failed: {}", e);
        }
    }
}
