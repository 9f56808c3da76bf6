//! Route-versus-tunnel resolution of one service declaration

use std::collections::BTreeMap;

use tracing::debug;

use crate::cluster::ClusterClient;
use crate::config::ServiceConfiguration;
use crate::tunnel::Tunnels;
use crate::{Error, Result};

/// Outcome of matching a configured route substring against route names
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouteSelection {
    /// Exactly one route matched, or several did and one is named exactly
    Found(String),
    /// No route matched
    Absent,
    /// Several routes matched and none is named exactly
    Ambiguous(usize),
}

/// Match `route` against `routes` (name to URL)
pub fn select_route(routes: &BTreeMap<String, String>, route: &str) -> RouteSelection {
    let matched: Vec<&String> = routes
        .iter()
        .filter(|(name, _)| name.contains(route))
        .map(|(_, url)| url)
        .collect();

    match matched.as_slice() {
        [] => RouteSelection::Absent,
        [url] => RouteSelection::Found((*url).clone()),
        _ => match routes.get(route) {
            Some(url) => RouteSelection::Found(url.clone()),
            None => RouteSelection::Ambiguous(matched.len()),
        },
    }
}

/// Base URL for `config` in `namespace`.
///
/// Opens a tunnel when the declaration forces port-forwarding or no route
/// matches; tunnels are kept in `tunnels`.
pub async fn resolve_endpoint(
    cluster: &dyn ClusterClient,
    tunnels: &Tunnels,
    namespace: &str,
    config: &ServiceConfiguration,
) -> Result<String> {
    if !config.port_forwarding {
        let routes = cluster.list_routes(namespace).await?;
        match select_route(&routes, &config.route) {
            RouteSelection::Found(url) => {
                debug!(route = %config.route, url = %url, "Resolved service through route");
                return Ok(url);
            }
            RouteSelection::Ambiguous(matches) => {
                return Err(Error::route_unresolved(&config.route, matches))
            }
            RouteSelection::Absent => {
                debug!(route = %config.route, namespace, "No route found, tunnelling");
            }
        }
    }

    let tunnel = cluster
        .port_forward(namespace, &config.pod_label, config.default_port)
        .await?;
    Ok(tunnels.register(tunnel))
}
