//! Process configuration read from the environment at start-up.

use crate::error::ControllerError;
use crate::reconciler::ReconcilerSettings;
use gcp_client::{parse_annotations, ClientConfig};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_REQUEUE_DELAY_SECS: u64 = 60;
const DEFAULT_RECONCILE_TIMEOUT_SECS: u64 = 300;
const DEFAULT_NODE_LOOKUP_CONCURRENCY: usize = 8;
const DEFAULT_HEALTH_ADDR: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8080);

/// Controller configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub gcp: ClientConfig,
    /// Static bearer token; the metadata server is used when unset
    pub access_token: Option<String>,
    /// Namespace to watch; all namespaces when unset
    pub namespace: Option<String>,
    pub requeue_delay: Duration,
    pub reconcile_timeout: Duration,
    pub node_lookup_concurrency: usize,
    pub health_addr: SocketAddr,
}

impl Config {
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| {
            get(key).ok_or_else(|| {
                ControllerError::InvalidConfig(format!("{} environment variable is required", key))
            })
        };

        let project = required("GCP_PROJECT")?;
        let region = required("GCP_REGION")?;
        let network = required("GCP_NETWORK")?;
        let subnet = required("GCP_SUBNET")?;

        let mut gcp = ClientConfig::new(project, region, &network, &subnet);
        if let Some(raw) = get("GCP_ANNOTATIONS") {
            let annotations = parse_annotations(&raw).map_err(|e| {
                ControllerError::InvalidConfig(format!("GCP_ANNOTATIONS: {}", e))
            })?;
            gcp = gcp.with_annotations(annotations);
        }
        if let Some(endpoint) = get("GCP_API_ENDPOINT") {
            gcp = gcp.with_api_endpoint(endpoint);
        }

        let requeue_delay = Duration::from_secs(parse_or(
            get("REQUEUE_DELAY_SECS"),
            "REQUEUE_DELAY_SECS",
            DEFAULT_REQUEUE_DELAY_SECS,
        )?);
        let reconcile_timeout = Duration::from_secs(parse_or(
            get("RECONCILE_TIMEOUT_SECS"),
            "RECONCILE_TIMEOUT_SECS",
            DEFAULT_RECONCILE_TIMEOUT_SECS,
        )?);
        let node_lookup_concurrency = parse_or(
            get("NODE_LOOKUP_CONCURRENCY"),
            "NODE_LOOKUP_CONCURRENCY",
            DEFAULT_NODE_LOOKUP_CONCURRENCY,
        )?;
        if node_lookup_concurrency == 0 {
            return Err(ControllerError::InvalidConfig(
                "NODE_LOOKUP_CONCURRENCY must be at least 1".to_string(),
            ));
        }
        let health_addr = parse_or(get("HEALTH_ADDR"), "HEALTH_ADDR", DEFAULT_HEALTH_ADDR)?;

        Ok(Self {
            gcp,
            access_token: get("GCP_ACCESS_TOKEN"),
            namespace: get("WATCH_NAMESPACE"),
            requeue_delay,
            reconcile_timeout,
            node_lookup_concurrency,
            health_addr,
        })
    }

    pub fn reconciler_settings(&self) -> ReconcilerSettings {
        ReconcilerSettings {
            requeue_delay: self.requeue_delay,
            timeout: self.reconcile_timeout,
            node_lookup_concurrency: self.node_lookup_concurrency,
        }
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> Result<T, ControllerError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => raw.trim().parse().map_err(|e| {
            ControllerError::InvalidConfig(format!("{}={:?}: {}", key, raw, e))
        }),
        None => Ok(default),
    }
}
