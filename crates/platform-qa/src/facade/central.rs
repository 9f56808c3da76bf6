//! Platform-wide services

use tracing::instrument;

use super::ClusterContext;
use crate::config::CentralConfiguration;
use crate::materialize::CephHostPolicy;
use crate::memo::Memo;
use crate::model::{CatalogSource, Service};
use crate::secrets::SecretReader;
use crate::Result;

const CEPH: &str = "ceph";
const KIBANA: &str = "kibana";
const KIALI: &str = "kiali";
const JAEGER: &str = "jaeger";
const DEFAULT_GRAFANA: &str = "defaultGrafana";
const CUSTOM_GRAFANA: &str = "customGrafana";
const JENKINS: &str = "jenkins";
const GERRIT: &str = "gerrit";
const KEYCLOAK: &str = "keycloak";
const VAULT: &str = "vault";
const WIREMOCK: &str = "wiremock";
const CONTROL_PLANE: &str = "controlPlane";
const NEXUS: &str = "nexus";

/// Key of the vault root token in the vault secret
const VAULT_TOKEN_KEY: &str = "token";

/// Platform-wide services, each resolved in its declared namespace
pub struct CentralConfig {
    configuration: CentralConfiguration,
    context: ClusterContext,
    services: Memo<Service>,
}

impl CentralConfig {
    /// Facade over `configuration`
    pub fn new(configuration: CentralConfiguration, context: ClusterContext) -> Self {
        Self {
            configuration,
            context,
            services: Memo::default(),
        }
    }

    /// The central service declarations
    pub fn configuration(&self) -> &CentralConfiguration {
        &self.configuration
    }

    async fn plain(&self, key: &str) -> Result<Service> {
        self.services
            .get_or_try_init(key, || async {
                let config = self.configuration.service(key)?;
                self.context.resolve(key, &config.namespace, config).await
            })
            .await
    }

    async fn with_credentials(&self, key: &str) -> Result<Service> {
        self.services
            .get_or_try_init(key, || async {
                let config = self.configuration.service(key)?;
                let service = self.context.resolve(key, &config.namespace, config).await?;
                let user = SecretReader::new(self.context.cluster.as_ref(), &config.namespace)
                    .credentials(&config.secret)
                    .await?;
                Ok(service.with_user(user))
            })
            .await
    }

    /// Platform object storage
    pub async fn ceph(&self) -> Result<Service> {
        self.plain(CEPH).await
    }

    /// Log search
    pub async fn kibana(&self) -> Result<Service> {
        self.plain(KIBANA).await
    }

    /// Service mesh console
    pub async fn kiali(&self) -> Result<Service> {
        self.plain(KIALI).await
    }

    /// Tracing
    pub async fn jaeger(&self) -> Result<Service> {
        self.plain(JAEGER).await
    }

    /// Platform grafana
    pub async fn default_grafana(&self) -> Result<Service> {
        self.plain(DEFAULT_GRAFANA).await
    }

    /// Registry grafana
    pub async fn custom_grafana(&self) -> Result<Service> {
        self.plain(CUSTOM_GRAFANA).await
    }

    /// Platform jenkins, with its admin credentials
    pub async fn jenkins(&self) -> Result<Service> {
        self.with_credentials(JENKINS).await
    }

    /// Platform gerrit, with its admin credentials
    pub async fn gerrit(&self) -> Result<Service> {
        self.with_credentials(GERRIT).await
    }

    /// Keycloak, with its admin credentials
    pub async fn keycloak(&self) -> Result<Service> {
        self.with_credentials(KEYCLOAK).await
    }

    /// Vault, with its root token
    #[instrument(skip(self))]
    pub async fn vault(&self) -> Result<Service> {
        self.services
            .get_or_try_init(VAULT, || async {
                let config = self.configuration.service(VAULT)?;
                let service = self.context.resolve(VAULT, &config.namespace, config).await?;
                let token = SecretReader::new(self.context.cluster.as_ref(), &config.namespace)
                    .secret_value(&config.secret, VAULT_TOKEN_KEY)
                    .await?;
                Ok(service.with_token(token))
            })
            .await
    }

    /// Wiremock, as a bare `host[/path]`
    pub async fn wiremock(&self) -> Result<Service> {
        self.plain(WIREMOCK).await
    }

    /// Control plane console
    pub async fn control_plane(&self) -> Result<Service> {
        self.plain(CONTROL_PLANE).await
    }

    /// Artifact repository
    pub async fn nexus(&self) -> Result<Service> {
        self.plain(NEXUS).await
    }

    /// OLM catalog sources installed on the cluster, listed fresh each call
    #[instrument(skip(self))]
    pub async fn cluster_sources(&self) -> Result<Vec<CatalogSource>> {
        self.context.cluster.list_catalog_sources().await
    }

    /// Where registry buckets are reached: through the platform object
    /// storage tunnel when it is port-forwarded, else through their own host
    pub async fn ceph_host_policy(&self) -> Result<CephHostPolicy> {
        let central_port_forwarding = self
            .configuration
            .services
            .get(CEPH)
            .is_some_and(|ceph| ceph.port_forwarding);
        let fallback_host = if central_port_forwarding {
            Some(self.ceph().await?.url)
        } else {
            None
        };
        Ok(CephHostPolicy {
            central_port_forwarding,
            fallback_host,
        })
    }
}
