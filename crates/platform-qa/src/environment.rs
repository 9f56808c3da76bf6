//! The test environment root
//!
//! An [`Environment`] is built once per test run and handed to whatever needs
//! services or identities. It owns the cluster session, the platform facade,
//! the platform identity provider, one registry facade per namespace and every
//! tunnel opened along the way.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, instrument};

use platform_qa_common::kube_utils::ClientTarget;

use crate::auth::{AuthClient, KeycloakClient};
use crate::cluster::{ClusterClient, ClusterConnector, KubeClusterClient, KubeConnector};
use crate::config::{
    load_configuration, load_properties, load_users, Configuration, Overrides, PlatformSettings,
    ResourceLayout,
};
use crate::facade::{CentralConfig, ClusterContext, RegistryConfig};
use crate::memo::Memo;
use crate::model::User;
use crate::readiness::ReadinessWaiter;
use crate::tunnel::Tunnels;
use crate::users::{PlatformUserProvider, RegistryUserProvider};
use crate::{Error, Result};

/// Collaborators an environment is assembled from
pub struct EnvironmentParts {
    /// Resolved run settings
    pub settings: PlatformSettings,
    /// Service declarations
    pub configuration: Configuration,
    /// Cluster session of the run's operator identity
    pub cluster: Arc<dyn ClusterClient>,
    /// Opens cluster sessions as test identities
    pub connector: Arc<dyn ClusterConnector>,
    /// Authorization system client
    pub auth: Arc<dyn AuthClient>,
    /// Raw platform identity records
    pub platform_users: BTreeMap<String, User>,
    /// Raw registry identity records
    pub registry_users: BTreeMap<String, User>,
}

/// Everything a test run resolves against
pub struct Environment {
    settings: PlatformSettings,
    configuration: Configuration,
    context: ClusterContext,
    central: CentralConfig,
    platform_users: PlatformUserProvider,
    auth: Arc<dyn AuthClient>,
    registry_users: BTreeMap<String, User>,
    namespaces: RwLock<BTreeSet<String>>,
    registries: Memo<Arc<RegistryConfig>>,
}

impl Environment {
    /// Load resources from `layout`, apply `overrides` and connect to the
    /// cluster and the authorization system
    #[instrument(skip_all)]
    pub async fn connect(layout: &ResourceLayout, overrides: &Overrides) -> Result<Self> {
        let properties = load_properties(&layout.properties());
        let settings = PlatformSettings::resolve(&properties, overrides)?;
        let configuration = load_configuration(&layout.configuration())?;

        let cluster = match &settings.credentials {
            Some(user) => KubeClusterClient::login(&settings.cluster_url, user).await?,
            None => KubeClusterClient::connect(&ClientTarget::Infer).await?,
        };
        info!(cluster = %settings.cluster_url, namespace = %settings.namespace, "Connected to cluster");

        let context = context_for(&settings, Arc::new(cluster));
        let central = CentralConfig::new(configuration.central_configuration.clone(), context.clone());
        let keycloak = central.keycloak().await?;
        let auth: Arc<dyn AuthClient> = Arc::new(KeycloakClient::from_service(&keycloak)?);

        let platform_users = load_users(&layout.platform_users())?;
        let registry_users = load_users(&layout.registry_users())?;
        let connector = Arc::new(KubeConnector::new(settings.cluster_url.clone()));

        Ok(Self::assemble(
            settings,
            configuration,
            context,
            central,
            connector,
            auth,
            platform_users,
            registry_users,
        ))
    }

    /// Environment over prebuilt collaborators
    pub fn from_parts(parts: EnvironmentParts) -> Self {
        let context = context_for(&parts.settings, parts.cluster);
        let central = CentralConfig::new(
            parts.configuration.central_configuration.clone(),
            context.clone(),
        );
        Self::assemble(
            parts.settings,
            parts.configuration,
            context,
            central,
            parts.connector,
            parts.auth,
            parts.platform_users,
            parts.registry_users,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        settings: PlatformSettings,
        configuration: Configuration,
        context: ClusterContext,
        central: CentralConfig,
        connector: Arc<dyn ClusterConnector>,
        auth: Arc<dyn AuthClient>,
        platform_users: BTreeMap<String, User>,
        registry_users: BTreeMap<String, User>,
    ) -> Self {
        let platform_users = PlatformUserProvider::new(
            platform_users,
            settings.namespace.clone(),
            auth.clone(),
            ReadinessWaiter::new(connector),
        );
        Self {
            settings,
            configuration,
            context,
            central,
            platform_users,
            auth,
            registry_users,
            namespaces: RwLock::new(BTreeSet::new()),
            registries: Memo::default(),
        }
    }

    /// Resolved run settings
    pub fn settings(&self) -> &PlatformSettings {
        &self.settings
    }

    /// Service declarations
    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Platform-wide services
    pub fn central(&self) -> &CentralConfig {
        &self.central
    }

    /// Platform identities
    pub fn platform_users(&self) -> &PlatformUserProvider {
        &self.platform_users
    }

    /// Tunnels opened so far
    pub fn tunnels(&self) -> &Tunnels {
        &self.context.tunnels
    }

    /// Register registry namespaces that [`Environment::registry_in`] may serve
    pub fn set_namespaces<I, S>(&self, namespaces: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut registered = self.namespaces.write();
        for namespace in namespaces {
            registered.insert(namespace.into());
        }
    }

    /// Registered registry namespaces
    pub fn namespaces(&self) -> Vec<String> {
        self.namespaces.read().iter().cloned().collect()
    }

    /// Facade of the default registry namespace, created on first use
    pub async fn registry(&self) -> Result<Arc<RegistryConfig>> {
        let namespace = self.settings.namespace.clone();
        self.set_namespaces([namespace.as_str()]);
        self.registry_for(&namespace).await
    }

    /// Facade of a registered registry namespace
    pub async fn registry_in(&self, namespace: &str) -> Result<Arc<RegistryConfig>> {
        if !self.namespaces.read().contains(namespace) {
            return Err(Error::missing_namespace(namespace));
        }
        self.registry_for(namespace).await
    }

    async fn registry_for(&self, namespace: &str) -> Result<Arc<RegistryConfig>> {
        self.registries
            .get_or_try_init(namespace, || async {
                let ceph_policy = self.central.ceph_host_policy().await?;
                let users = RegistryUserProvider::new(
                    self.registry_users.clone(),
                    namespace,
                    self.auth.clone(),
                );
                info!(namespace, "Created registry configuration");
                Ok(Arc::new(RegistryConfig::new(
                    namespace,
                    self.configuration.registry_configuration.clone(),
                    self.context.clone(),
                    ceph_policy,
                    users,
                )))
            })
            .await
    }

    /// Close every tunnel the environment opened
    pub async fn shutdown(&self) {
        self.context.tunnels.shutdown().await;
    }
}

fn context_for(settings: &PlatformSettings, cluster: Arc<dyn ClusterClient>) -> ClusterContext {
    ClusterContext {
        cluster,
        tunnels: Arc::new(Tunnels::default()),
        port_forwarding_disabled: settings.port_forwarding_disabled(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MockAuthClient;
    use crate::cluster::{MockClusterClient, MockClusterConnector};
    use crate::config::UiRunSettings;
    use crate::tunnel::Tunnel;
    use tokio_util::sync::CancellationToken;

    const CONFIG: &str = r#"{
        "centralConfiguration": {
            "ceph": { "namespace": "openshift-storage", "podLabel": "rook-ceph-rgw", "route": "s3", "defaultPort": 80, "portForwarding": true },
            "kibana": { "namespace": "openshift-logging", "podLabel": "kibana", "route": "kibana", "defaultPort": 5601 }
        },
        "registryConfiguration": {
            "officerPortal": { "podLabel": "officer-portal", "route": "officer-portal", "defaultPort": 8080 }
        }
    }"#;

    fn settings() -> PlatformSettings {
        PlatformSettings {
            namespace: "mdtuddm".into(),
            credentials: None,
            cluster: Some("cicd2".into()),
            base_domain: Some("example.com".into()),
            cluster_url: "https://api.cicd2.example.com:6443".into(),
            port_forwarding_disabled_clusters: vec![],
            ui: UiRunSettings::default(),
        }
    }

    fn environment(cluster: MockClusterClient) -> Environment {
        Environment::from_parts(EnvironmentParts {
            settings: settings(),
            configuration: serde_json::from_str(CONFIG).unwrap(),
            cluster: Arc::new(cluster),
            connector: Arc::new(MockClusterConnector::new()),
            auth: Arc::new(MockAuthClient::new()),
            platform_users: BTreeMap::new(),
            registry_users: BTreeMap::new(),
        })
    }

    fn tunnelling_cluster(expected_tunnels: usize) -> MockClusterClient {
        let mut cluster = MockClusterClient::new();
        cluster
            .expect_port_forward()
            .times(expected_tunnels)
            .returning(|ns, label, port| {
                Ok(Tunnel::new(41100, format!("{}/{}:{}", ns, label, port), CancellationToken::new(), None))
            });
        cluster
    }

    #[tokio::test]
    async fn unregistered_namespace_is_an_error() {
        let env = environment(MockClusterClient::new());
        let err = env.registry_in("unknown-ns").await.err().unwrap();
        assert!(matches!(err, Error::MissingNamespace { ref namespace } if namespace == "unknown-ns"));
    }

    #[tokio::test]
    async fn registries_are_created_once_per_namespace() {
        // one tunnel for the platform object storage, shared by every registry
        let env = environment(tunnelling_cluster(1));
        env.set_namespaces(["ns-a", "ns-b"]);

        let a1 = env.registry_in("ns-a").await.unwrap();
        let a2 = env.registry_in("ns-a").await.unwrap();
        let b = env.registry_in("ns-b").await.unwrap();

        assert!(Arc::ptr_eq(&a1, &a2));
        assert!(!Arc::ptr_eq(&a1, &b));
        assert_eq!(b.namespace(), "ns-b");
        assert_eq!(env.tunnels().len(), 1);
    }

    #[tokio::test]
    async fn default_registry_is_registered_on_demand() {
        let env = environment(tunnelling_cluster(1));
        let registry = env.registry().await.unwrap();
        assert_eq!(registry.namespace(), "mdtuddm");
        assert!(Arc::ptr_eq(&registry, &env.registry_in("mdtuddm").await.unwrap()));
        assert_eq!(env.namespaces(), vec!["mdtuddm".to_string()]);
    }

    #[tokio::test]
    async fn repeated_access_is_idempotent_and_shutdown_closes_tunnels() {
        let mut cluster = tunnelling_cluster(1);
        cluster.expect_list_routes().times(1).returning(|_| {
            let mut routes = BTreeMap::new();
            routes.insert("kibana".to_string(), "https://kibana.apps/".to_string());
            Ok(routes)
        });
        let env = environment(cluster);

        let first = env.central().kibana().await.unwrap();
        let second = env.central().kibana().await.unwrap();
        assert_eq!(first, second);

        env.central().ceph().await.unwrap();
        env.central().ceph().await.unwrap();
        assert_eq!(env.tunnels().len(), 1);

        env.shutdown().await;
        assert!(env.tunnels().is_empty());
    }
}
