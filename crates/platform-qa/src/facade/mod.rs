//! Service facades: one memoized accessor per logical service
//!
//! [`CentralConfig`] serves platform-wide services, each in its own declared
//! namespace. [`RegistryConfig`] serves the services of one registry
//! namespace. Every accessor resolves at most once per facade; only the
//! identity attached to user-scoped services changes between calls.

mod central;
mod registry;

use std::sync::Arc;

use crate::cluster::ClusterClient;
use crate::config::ServiceConfiguration;
use crate::endpoint::resolve_endpoint;
use crate::model::Service;
use crate::shaping::{shape_declaration, shape_url};
use crate::tunnel::Tunnels;
use crate::Result;

pub use central::CentralConfig;
pub use registry::{Bucket, RegistryConfig};

/// Cluster access shared by the facades of one environment
#[derive(Clone)]
pub struct ClusterContext {
    /// Cluster client acting as the run's operator identity
    pub cluster: Arc<dyn ClusterClient>,
    /// Tunnels opened on the environment's behalf
    pub tunnels: Arc<Tunnels>,
    /// Whether route-capable services must not tunnel on this cluster
    pub port_forwarding_disabled: bool,
}

impl ClusterContext {
    /// Resolve the service declared under `key` in `namespace`, with its
    /// shaping rules applied
    pub(crate) async fn resolve(
        &self,
        key: &str,
        namespace: &str,
        config: &ServiceConfiguration,
    ) -> Result<Service> {
        let config = shape_declaration(key, config, self.port_forwarding_disabled);
        let url = resolve_endpoint(self.cluster.as_ref(), &self.tunnels, namespace, &config).await?;
        Ok(Service::new(shape_url(key, url)))
    }
}
