//! Services of one registry namespace

use tracing::instrument;

use super::ClusterContext;
use crate::config::RegistryConfiguration;
use crate::materialize::{self, CephHostPolicy};
use crate::memo::Memo;
use crate::model::{Ceph, Db, Redis, Service, User};
use crate::secrets::{CitusRole, SecretReader};
use crate::users::{IdentityProvider, RegistryUserProvider};
use crate::{Error, Result};

const CITUS_ROLES: &str = "citusRoles";
const CITUS_MASTER: &str = "citusMaster";
const CITUS_REPLICA: &str = "citusReplica";
const REDIS: &str = "redis";
const GERRIT: &str = "gerrit";
const JENKINS: &str = "jenkins";
const REDASH_VIEWER: &str = "redashViewer";
const REDASH_ADMIN: &str = "redashAdmin";

const REGISTRY_MANAGEMENT: &str = "registryManagement";
const DATA_FACTORY: &str = "dataFactory";
const DATA_FACTORY_EXTERNAL_PLATFORM: &str = "dataFactoryExternalPlatform";
const DATA_FACTORY_SOAP: &str = "dataFactorySoap";
const DIGITAL_SIGNATURE: &str = "digitalSignature";
const USER_SETTINGS: &str = "userSettings";
const BPMS: &str = "bpms";
const FORM_MANAGEMENT_MODELER: &str = "formManagementModeler";
const FORM_MANAGEMENT_PROVIDER: &str = "formManagementProvider";
const PROCESS_WEBSERVICE_GATEWAY: &str = "processWebserviceGateway";
const EXCERPT: &str = "excerpt";

const DATA_FACTORY_EXTERNAL_SYSTEM: &str = "dataFactoryExternalSystem";
const USER_TASK_MANAGEMENT: &str = "userTaskManagement";
const USER_PROCESS_MANAGEMENT: &str = "userProcessManagement";
const DIGITAL_DOCUMENT: &str = "digitalDocument";
const OFFICER_PORTAL: &str = "officerPortal";
const CITIZEN_PORTAL: &str = "citizenPortal";
const ADMIN_PORTAL: &str = "adminPortal";
const PROCESS_HISTORY: &str = "processHistory";

/// Bucket of a registry's object storage
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bucket {
    /// Digital signatures
    Signature,
    /// Uploaded data files
    DataFile,
    /// Low-code form files
    LowCodeFile,
    /// Excerpts
    Excerpt,
}

impl Bucket {
    fn key(self) -> &'static str {
        match self {
            Bucket::Signature => "signatureBucket",
            Bucket::DataFile => "dataFileBucket",
            Bucket::LowCodeFile => "lowCodeFileBucket",
            Bucket::Excerpt => "excerptBucket",
        }
    }
}

/// Services, databases, buckets and identities of one registry namespace
pub struct RegistryConfig {
    namespace: String,
    configuration: RegistryConfiguration,
    context: ClusterContext,
    ceph_policy: CephHostPolicy,
    users: RegistryUserProvider,
    services: Memo<Service>,
    roles: Memo<User>,
    dbs: Memo<Db>,
    buckets: Memo<Ceph>,
    redis: Memo<Redis>,
}

impl RegistryConfig {
    /// Facade for `namespace`
    pub fn new(
        namespace: impl Into<String>,
        configuration: RegistryConfiguration,
        context: ClusterContext,
        ceph_policy: CephHostPolicy,
        users: RegistryUserProvider,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            configuration,
            context,
            ceph_policy,
            users,
            services: Memo::default(),
            roles: Memo::default(),
            dbs: Memo::default(),
            buckets: Memo::default(),
            redis: Memo::default(),
        }
    }

    /// Registry namespace
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The registry's identity provider
    pub fn users(&self) -> &RegistryUserProvider {
        &self.users
    }

    fn secrets(&self) -> SecretReader<'_> {
        SecretReader::new(self.context.cluster.as_ref(), &self.namespace)
    }

    async fn endpoint(&self, key: &str) -> Result<Service> {
        self.services
            .get_or_try_init(key, || async {
                let config = self.configuration.service(key)?;
                self.context.resolve(key, &self.namespace, config).await
            })
            .await
    }

    async fn user_scoped(&self, key: &str, user_name: &str) -> Result<Service> {
        let service = self.endpoint(key).await?;
        let user = self.users.get(user_name).await?;
        Ok(service.with_user(user))
    }

    async fn with_credentials(&self, key: &str) -> Result<Service> {
        self.services
            .get_or_try_init(key, || async {
                let config = self.configuration.service(key)?;
                let service = self.context.resolve(key, &self.namespace, config).await?;
                let user = self.secrets().credentials(&config.secret).await?;
                Ok(service.with_user(user))
            })
            .await
    }

    async fn with_api_key(&self, key: &str, secret_key: &str) -> Result<Service> {
        self.services
            .get_or_try_init(key, || async {
                let config = self.configuration.service(key)?;
                let service = self.context.resolve(key, &self.namespace, config).await?;
                let token = self.secrets().secret_value(&config.secret, secret_key).await?;
                Ok(service.with_token(token))
            })
            .await
    }

    /// Credentials of a citus database role
    pub async fn citus_role(&self, role: CitusRole) -> Result<User> {
        self.roles
            .get_or_try_init(role.key_prefix(), || async {
                let config = self.configuration.service(CITUS_ROLES)?;
                self.secrets()
                    .role_credentials(&config.secret, role.key_prefix())
                    .await
            })
            .await
    }

    /// Citus administrator role
    pub async fn citus_admin_role(&self) -> Result<User> {
        self.citus_role(CitusRole::Admin).await
    }

    /// Citus application role
    pub async fn citus_application_role(&self) -> Result<User> {
        self.citus_role(CitusRole::Application).await
    }

    /// Citus registry owner role
    pub async fn citus_registry_owner_role(&self) -> Result<User> {
        self.citus_role(CitusRole::RegistryOwner).await
    }

    /// Citus settings role
    pub async fn citus_settings_role(&self) -> Result<User> {
        self.citus_role(CitusRole::Settings).await
    }

    /// Citus audit role
    pub async fn citus_audit_role(&self) -> Result<User> {
        self.citus_role(CitusRole::Audit).await
    }

    /// Citus analytics role
    pub async fn citus_analytics_role(&self) -> Result<User> {
        self.citus_role(CitusRole::Analytics).await
    }

    /// Citus excerpt exporter role
    pub async fn citus_excerpt_exporter_role(&self) -> Result<User> {
        self.citus_role(CitusRole::ExcerptExporter).await
    }

    /// Citus excerpt role
    pub async fn citus_excerpt_role(&self) -> Result<User> {
        self.citus_role(CitusRole::Excerpt).await
    }

    /// Citus excerpt worker role
    pub async fn citus_excerpt_worker_role(&self) -> Result<User> {
        self.citus_role(CitusRole::ExcerptWorker).await
    }

    async fn db(&self, key: &str) -> Result<Db> {
        self.dbs
            .get_or_try_init(key, || async {
                let config = self.configuration.service(key)?;
                materialize::db(
                    self.context.cluster.as_ref(),
                    &self.context.tunnels,
                    &self.namespace,
                    config,
                )
                .await
            })
            .await
    }

    /// Citus master database
    pub async fn citus_master(&self) -> Result<Db> {
        self.db(CITUS_MASTER).await
    }

    /// Citus read replica
    pub async fn citus_replica(&self) -> Result<Db> {
        self.db(CITUS_REPLICA).await
    }

    /// Object-storage access to `bucket`
    #[instrument(skip(self), fields(namespace = %self.namespace))]
    pub async fn bucket(&self, bucket: Bucket) -> Result<Ceph> {
        self.buckets
            .get_or_try_init(bucket.key(), || async {
                let buckets = &self.configuration.ceph;
                let name = match bucket {
                    Bucket::Signature => &buckets.signature_bucket,
                    Bucket::DataFile => &buckets.data_file_bucket,
                    Bucket::LowCodeFile => &buckets.low_code_file_bucket,
                    Bucket::Excerpt => &buckets.excerpt_bucket,
                };
                if name.is_empty() {
                    return Err(Error::service_not_configured(format!("ceph.{}", bucket.key())));
                }
                materialize::ceph(
                    self.context.cluster.as_ref(),
                    &self.namespace,
                    name,
                    &self.ceph_policy,
                )
                .await
            })
            .await
    }

    /// Digital signature bucket
    pub async fn signature_ceph(&self) -> Result<Ceph> {
        self.bucket(Bucket::Signature).await
    }

    /// Data file bucket
    pub async fn file_data_ceph(&self) -> Result<Ceph> {
        self.bucket(Bucket::DataFile).await
    }

    /// Low-code file bucket
    pub async fn file_lowcode_ceph(&self) -> Result<Ceph> {
        self.bucket(Bucket::LowCodeFile).await
    }

    /// Excerpt bucket
    pub async fn excerpt_ceph(&self) -> Result<Ceph> {
        self.bucket(Bucket::Excerpt).await
    }

    /// Registry redis
    pub async fn redis(&self) -> Result<Redis> {
        self.redis
            .get_or_try_init(REDIS, || async {
                let config = self.configuration.service(REDIS)?;
                materialize::redis(
                    self.context.cluster.as_ref(),
                    &self.context.tunnels,
                    &self.namespace,
                    config,
                )
                .await
            })
            .await
    }

    /// Registry gerrit, with its credentials
    pub async fn gerrit(&self) -> Result<Service> {
        self.with_credentials(GERRIT).await
    }

    /// Registry jenkins, with its credentials
    pub async fn jenkins(&self) -> Result<Service> {
        self.with_credentials(JENKINS).await
    }

    /// Redash API as a viewer
    pub async fn redash_viewer(&self) -> Result<Service> {
        self.with_api_key(REDASH_VIEWER, "viewer-api-key").await
    }

    /// Redash API as an administrator
    pub async fn redash_admin(&self) -> Result<Service> {
        self.with_api_key(REDASH_ADMIN, "admin-api-key").await
    }

    /// Registry management API acting as `user_name`
    pub async fn registry_management(&self, user_name: &str) -> Result<Service> {
        self.user_scoped(REGISTRY_MANAGEMENT, user_name).await
    }

    /// Data factory acting as `user_name`
    pub async fn data_factory(&self, user_name: &str) -> Result<Service> {
        self.user_scoped(DATA_FACTORY, user_name).await
    }

    /// Data factory platform API acting as `user_name`
    pub async fn data_factory_external_platform(&self, user_name: &str) -> Result<Service> {
        self.user_scoped(DATA_FACTORY_EXTERNAL_PLATFORM, user_name)
            .await
    }

    /// Data factory SOAP WSDL acting as `user_name`
    pub async fn data_factory_soap(&self, user_name: &str) -> Result<Service> {
        self.user_scoped(DATA_FACTORY_SOAP, user_name).await
    }

    /// Digital signature service acting as `user_name`
    pub async fn digital_signature_ops(&self, user_name: &str) -> Result<Service> {
        self.user_scoped(DIGITAL_SIGNATURE, user_name).await
    }

    /// User settings acting as `user_name`
    pub async fn user_settings(&self, user_name: &str) -> Result<Service> {
        self.user_scoped(USER_SETTINGS, user_name).await
    }

    /// Business process engine acting as `user_name`
    pub async fn bpms(&self, user_name: &str) -> Result<Service> {
        self.user_scoped(BPMS, user_name).await
    }

    /// Form modeler acting as `user_name`
    pub async fn form_management_modeler(&self, user_name: &str) -> Result<Service> {
        self.user_scoped(FORM_MANAGEMENT_MODELER, user_name).await
    }

    /// Form provider acting as `user_name`
    pub async fn form_management_provider(&self, user_name: &str) -> Result<Service> {
        self.user_scoped(FORM_MANAGEMENT_PROVIDER, user_name).await
    }

    /// Process webservice gateway acting as `user_name`
    pub async fn process_webservice_gateway(&self, user_name: &str) -> Result<Service> {
        self.user_scoped(PROCESS_WEBSERVICE_GATEWAY, user_name)
            .await
    }

    /// Excerpt service acting as `user_name`
    pub async fn excerpt(&self, user_name: &str) -> Result<Service> {
        self.user_scoped(EXCERPT, user_name).await
    }

    /// Data factory for external systems
    pub async fn data_factory_external_system(&self) -> Result<Service> {
        self.endpoint(DATA_FACTORY_EXTERNAL_SYSTEM).await
    }

    /// User task management
    pub async fn user_task_management(&self) -> Result<Service> {
        self.endpoint(USER_TASK_MANAGEMENT).await
    }

    /// User process management
    pub async fn user_process_management(&self) -> Result<Service> {
        self.endpoint(USER_PROCESS_MANAGEMENT).await
    }

    /// Digital documents
    pub async fn digital_document(&self) -> Result<Service> {
        self.endpoint(DIGITAL_DOCUMENT).await
    }

    /// Officer portal
    pub async fn officer_portal(&self) -> Result<Service> {
        self.endpoint(OFFICER_PORTAL).await
    }

    /// Citizen portal
    pub async fn citizen_portal(&self) -> Result<Service> {
        self.endpoint(CITIZEN_PORTAL).await
    }

    /// Admin portal
    pub async fn admin_portal(&self) -> Result<Service> {
        self.endpoint(ADMIN_PORTAL).await
    }

    /// Process history
    pub async fn process_history(&self) -> Result<Service> {
        self.endpoint(PROCESS_HISTORY).await
    }
}
