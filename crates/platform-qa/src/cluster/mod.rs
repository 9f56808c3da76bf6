//! Orchestrator access
//!
//! The resolver only needs five things from the cluster: routes, secrets,
//! config maps, pods and port-forwards. [`ClusterClient`] is that surface;
//! [`KubeClusterClient`] implements it over kube-rs against OpenShift.

mod oauth;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Secret};
use kube::api::{Api, DynamicObject, ListParams};
use kube::Client;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

#[cfg(test)]
use mockall::automock;

use platform_qa_common::kube_utils::{build_api_resource, create_client, ClientTarget};

use crate::model::{CatalogSource, User};
use crate::tunnel::Tunnel;
use crate::{Error, Result};

pub use oauth::request_token;

/// API version of OpenShift routes
const ROUTE_API_VERSION: &str = "route.openshift.io/v1";

/// Pause after a failed accept before listening again
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// API version of OLM catalog sources
const CATALOG_SOURCE_API_VERSION: &str = "operators.coreos.com/v1alpha1";

/// Cluster operations the resolver depends on
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Routes in `namespace`, keyed by route name, valued by base URL
    async fn list_routes(&self, namespace: &str) -> Result<BTreeMap<String, String>>;

    /// Data of secret `name`, values base64-encoded as on the wire
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<BTreeMap<String, String>>;

    /// Data of config map `name`
    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<BTreeMap<String, String>>;

    /// Forward a local port to `remote_port` of the first pod (by name) whose
    /// name contains `pod_label`
    async fn port_forward(
        &self,
        namespace: &str,
        pod_label: &str,
        remote_port: u16,
    ) -> Result<Tunnel>;

    /// Names of the pods in `namespace`
    async fn list_pods(&self, namespace: &str) -> Result<Vec<String>>;

    /// OLM catalog sources across all namespaces
    async fn list_catalog_sources(&self) -> Result<Vec<CatalogSource>>;
}

/// Opens cluster sessions authenticated as a given identity
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterConnector: Send + Sync {
    /// A cluster client acting as `user`
    async fn connect_as(&self, user: &User) -> Result<Arc<dyn ClusterClient>>;
}

/// [`ClusterClient`] over a kube-rs client
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    /// Wrap an existing kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect to the cluster described by `target`
    pub async fn connect(target: &ClientTarget) -> Result<Self> {
        Ok(Self::new(create_client(target).await?))
    }

    /// Connect to `cluster_url` after an OAuth login as `user`
    pub async fn login(cluster_url: &str, user: &User) -> Result<Self> {
        let token = request_token(cluster_url, &user.login, &user.password).await?;
        Self::connect(&ClientTarget::Token {
            url: cluster_url.to_string(),
            token,
        })
        .await
        .map_err(|e| Error::cluster_login(&user.login, e.to_string()))
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn list_routes(&self, namespace: &str) -> Result<BTreeMap<String, String>> {
        let ar = build_api_resource(ROUTE_API_VERSION, "Route");
        let api: Api<DynamicObject> = Api::namespaced_with(self.client.clone(), namespace, &ar);
        let routes = api.list(&ListParams::default()).await?;

        Ok(routes
            .items
            .into_iter()
            .filter_map(|route| {
                let name = route.metadata.name?;
                let spec = route.data.get("spec")?;
                let host = spec.get("host")?.as_str()?;
                let path = spec.get("path").and_then(|p| p.as_str()).unwrap_or("");
                let tls = spec.get("tls").is_some_and(|t| !t.is_null());
                Some((name, route_url(host, path, tls)))
            })
            .collect())
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<BTreeMap<String, String>> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = api.get(name).await?;

        Ok(secret
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|(key, value)| (key, STANDARD.encode(value.0)))
            .collect())
    }

    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<BTreeMap<String, String>> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get(name).await?.data.unwrap_or_default())
    }

    #[instrument(skip(self))]
    async fn port_forward(
        &self,
        namespace: &str,
        pod_label: &str,
        remote_port: u16,
    ) -> Result<Tunnel> {
        let pods = self.list_pods(namespace).await?;
        let pod = select_pod(&pods, pod_label).ok_or_else(|| {
            Error::tunnel(
                format!("{}/{}:{}", namespace, pod_label, remote_port),
                "no pod matches the label",
            )
        })?;
        let target = format!("{}/{}:{}", namespace, pod, remote_port);

        // port 0: the OS picks a free port and we keep the listener
        let listener = TcpListener::bind(("127.0.0.1", 0))
            .await
            .map_err(|e| Error::tunnel(&target, format!("failed to bind local port: {}", e)))?;
        let local_port = listener
            .local_addr()
            .map_err(|e| Error::tunnel(&target, e.to_string()))?
            .port();

        let cancel = CancellationToken::new();
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let task = tokio::spawn(accept_loop(
            listener,
            api,
            pod,
            remote_port,
            cancel.clone(),
        ));

        debug!(local_port, target = %target, "Port-forward listening");
        Ok(Tunnel::new(local_port, target, cancel, Some(task)))
    }

    async fn list_pods(&self, namespace: &str) -> Result<Vec<String>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pods = api.list(&ListParams::default()).await?;
        Ok(pods
            .items
            .into_iter()
            .filter_map(|pod| pod.metadata.name)
            .collect())
    }

    async fn list_catalog_sources(&self) -> Result<Vec<CatalogSource>> {
        let ar = build_api_resource(CATALOG_SOURCE_API_VERSION, "CatalogSource");
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &ar);
        let sources = api.list(&ListParams::default()).await?;

        Ok(sources.items.into_iter().map(catalog_source).collect())
    }
}

/// Project a dynamic `CatalogSource` object onto its descriptor
fn catalog_source(object: DynamicObject) -> CatalogSource {
    let spec = object.data.get("spec");
    let field = |key: &str| {
        spec.and_then(|s| s.get(key))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };
    CatalogSource {
        display_name: field("displayName"),
        publisher: field("publisher"),
        source_type: field("sourceType"),
        image: field("image"),
        name: object.metadata.name.unwrap_or_default(),
        namespace: object.metadata.namespace.unwrap_or_default(),
    }
}

/// [`ClusterConnector`] that logs in to the cluster API with the user's
/// password
#[derive(Clone, Debug)]
pub struct KubeConnector {
    cluster_url: String,
}

impl KubeConnector {
    /// Connector for the API server at `cluster_url`
    pub fn new(cluster_url: impl Into<String>) -> Self {
        Self {
            cluster_url: cluster_url.into(),
        }
    }
}

#[async_trait]
impl ClusterConnector for KubeConnector {
    async fn connect_as(&self, user: &User) -> Result<Arc<dyn ClusterClient>> {
        let client = KubeClusterClient::login(&self.cluster_url, user).await?;
        Ok(Arc::new(client))
    }
}

/// First pod, in name order, whose name contains `pod_label`
pub fn select_pod(pods: &[String], pod_label: &str) -> Option<String> {
    pods.iter()
        .filter(|name| name.contains(pod_label))
        .min()
        .cloned()
}

/// Base URL of a route, always ending with exactly one `/`
pub fn route_url(host: &str, path: &str, tls: bool) -> String {
    let scheme = if tls { "https" } else { "http" };
    format!(
        "{}://{}{}/",
        scheme,
        host,
        path.trim_end_matches('/')
    )
}

async fn accept_loop(
    listener: TcpListener,
    api: Api<Pod>,
    pod: String,
    remote_port: u16,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((connection, peer)) => {
                    debug!(%peer, pod = %pod, remote_port, "Forwarding connection");
                    tokio::spawn(forward_connection(
                        api.clone(),
                        pod.clone(),
                        remote_port,
                        connection,
                        cancel.child_token(),
                    ));
                }
                Err(e) => {
                    warn!(pod = %pod, error = %e, "Failed to accept tunnel connection");
                    if !accept_backoff(&cancel).await {
                        break;
                    }
                }
            }
        }
    }
}

/// Wait out [`ACCEPT_BACKOFF`] so a persistent accept error (EMFILE) does not
/// spin; `false` when the tunnel was cancelled meanwhile
async fn accept_backoff(cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(ACCEPT_BACKOFF) => true,
    }
}

async fn forward_connection(
    api: Api<Pod>,
    pod: String,
    remote_port: u16,
    mut connection: TcpStream,
    cancel: CancellationToken,
) {
    let mut forwarder = match api.portforward(&pod, &[remote_port]).await {
        Ok(forwarder) => forwarder,
        Err(e) => {
            warn!(pod = %pod, remote_port, error = %e, "Port-forward failed");
            return;
        }
    };

    let Some(mut upstream) = forwarder.take_stream(remote_port) else {
        warn!(pod = %pod, remote_port, "Port-forward returned no stream");
        return;
    };

    tokio::select! {
        _ = cancel.cancelled() => {}
        copied = tokio::io::copy_bidirectional(&mut connection, &mut upstream) => {
            if let Err(e) = copied {
                debug!(pod = %pod, remote_port, error = %e, "Tunnel connection closed with error");
            }
        }
    }

    drop(upstream);
    if let Err(e) = forwarder.join().await {
        debug!(pod = %pod, remote_port, error = %e, "Port-forward ended with error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_matching_pod_in_name_order() {
        let pods = vec![
            "redis-sentinel-2".to_string(),
            "bpms-7d9f".to_string(),
            "redis-sentinel-0".to_string(),
        ];
        assert_eq!(select_pod(&pods, "redis").as_deref(), Some("redis-sentinel-0"));
        assert_eq!(select_pod(&pods, "kafka"), None);
    }

    #[test]
    fn route_urls_are_scheme_qualified_with_one_trailing_slash() {
        assert_eq!(
            route_url("wiremock.example.com", "", true),
            "https://wiremock.example.com/"
        );
        assert_eq!(route_url("bpms.apps", "/api/", false), "http://bpms.apps/api/");
    }

    #[tokio::test(start_paused = true)]
    async fn failed_accept_waits_before_retrying() {
        let started = tokio::time::Instant::now();
        assert!(accept_backoff(&CancellationToken::new()).await);
        assert!(started.elapsed() >= ACCEPT_BACKOFF);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_tunnel_stops_backing_off() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let started = tokio::time::Instant::now();
        assert!(!accept_backoff(&cancel).await);
        assert!(started.elapsed() < ACCEPT_BACKOFF);
    }

    #[test]
    fn catalog_source_fields_are_read_from_the_object() {
        let object: DynamicObject = serde_json::from_value(serde_json::json!({
            "apiVersion": "operators.coreos.com/v1alpha1",
            "kind": "CatalogSource",
            "metadata": { "name": "redhat-operators", "namespace": "openshift-marketplace" },
            "spec": {
                "displayName": "Red Hat Operators",
                "publisher": "Red Hat",
                "sourceType": "grpc",
                "image": "registry.redhat.io/redhat/redhat-operator-index:v4.14"
            }
        }))
        .unwrap();

        let source = catalog_source(object);
        assert_eq!(source.name, "redhat-operators");
        assert_eq!(source.namespace, "openshift-marketplace");
        assert_eq!(source.display_name.as_deref(), Some("Red Hat Operators"));
        assert_eq!(source.source_type.as_deref(), Some("grpc"));
    }

    #[test]
    fn catalog_source_without_spec_keeps_its_name() {
        let object: DynamicObject = serde_json::from_value(serde_json::json!({
            "apiVersion": "operators.coreos.com/v1alpha1",
            "kind": "CatalogSource",
            "metadata": { "name": "bare" }
        }))
        .unwrap();

        let source = catalog_source(object);
        assert_eq!(source.name, "bare");
        assert!(source.namespace.is_empty());
        assert_eq!(source.publisher, None);
    }
}
