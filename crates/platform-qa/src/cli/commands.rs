//! Subcommand handlers

use clap::ValueEnum;
use serde_json::{json, Value};

use super::{CliError, CliResult, Commands};
use crate::environment::Environment;
use crate::model::{Ceph, Db, Redis, Service, User};
use crate::users::IdentityProvider;

/// Platform-wide services
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum CentralService {
    Ceph,
    Kibana,
    Kiali,
    Jaeger,
    DefaultGrafana,
    CustomGrafana,
    Jenkins,
    Gerrit,
    Keycloak,
    Vault,
    Wiremock,
    ControlPlane,
    Nexus,
    ClusterSources,
}

/// Registry services, databases and buckets
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum RegistryService {
    CitusMaster,
    CitusReplica,
    SignatureCeph,
    FileDataCeph,
    FileLowcodeCeph,
    ExcerptCeph,
    Redis,
    Gerrit,
    Jenkins,
    RedashViewer,
    RedashAdmin,
    RegistryManagement,
    DataFactory,
    DataFactoryExternalPlatform,
    DataFactorySoap,
    DigitalSignatureOps,
    UserSettings,
    Bpms,
    FormManagementModeler,
    FormManagementProvider,
    ProcessWebserviceGateway,
    Excerpt,
    DataFactoryExternalSystem,
    UserTaskManagement,
    UserProcessManagement,
    DigitalDocument,
    OfficerPortal,
    CitizenPortal,
    AdminPortal,
    ProcessHistory,
}

/// Citus database roles
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum DatabaseRole {
    Admin,
    Application,
    RegistryOwner,
    Settings,
    Audit,
    Analytics,
    ExcerptExporter,
    Excerpt,
    ExcerptWorker,
}

pub(super) async fn run(env: &Environment, command: Commands) -> CliResult<()> {
    let described = match command {
        Commands::Central { service } => central(env, service).await?,
        Commands::Registry {
            service,
            registry,
            user,
        } => registry_service(env, service, registry.as_deref(), user.as_deref()).await?,
        Commands::CitusRole { role, registry } => {
            let registry = match registry {
                Some(namespace) => {
                    env.set_namespaces([namespace.as_str()]);
                    env.registry_in(&namespace).await?
                }
                None => env.registry().await?,
            };
            let user = match role {
                DatabaseRole::Admin => registry.citus_admin_role().await?,
                DatabaseRole::Application => registry.citus_application_role().await?,
                DatabaseRole::RegistryOwner => registry.citus_registry_owner_role().await?,
                DatabaseRole::Settings => registry.citus_settings_role().await?,
                DatabaseRole::Audit => registry.citus_audit_role().await?,
                DatabaseRole::Analytics => registry.citus_analytics_role().await?,
                DatabaseRole::ExcerptExporter => registry.citus_excerpt_exporter_role().await?,
                DatabaseRole::Excerpt => registry.citus_excerpt_role().await?,
                DatabaseRole::ExcerptWorker => registry.citus_excerpt_worker_role().await?,
            };
            json!({ "role": user.login })
        }
        Commands::Users { registry } => {
            let names: Vec<String> = match registry {
                Some(namespace) => {
                    env.set_namespaces([namespace.as_str()]);
                    let registry = env.registry_in(&namespace).await?;
                    let names = registry.users().user_service().users().keys().cloned().collect();
                    names
                }
                None => env.platform_users().user_service().users().keys().cloned().collect(),
            };
            json!(names)
        }
        Commands::User { name, registry } => match registry {
            Some(namespace) => {
                env.set_namespaces([namespace.as_str()]);
                let registry = env.registry_in(&namespace).await?;
                describe_user(&registry.users().get(&name).await?)
            }
            None => describe_user(&env.platform_users().get(&name).await?),
        },
    };

    print(&described)
}

fn print(described: &Value) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(described)?);
    Ok(())
}

async fn central(env: &Environment, service: CentralService) -> CliResult<Value> {
    let central = env.central();
    let resolved = match service {
        CentralService::ClusterSources => {
            return Ok(serde_json::to_value(central.cluster_sources().await?)?);
        }
        CentralService::Ceph => central.ceph().await?,
        CentralService::Kibana => central.kibana().await?,
        CentralService::Kiali => central.kiali().await?,
        CentralService::Jaeger => central.jaeger().await?,
        CentralService::DefaultGrafana => central.default_grafana().await?,
        CentralService::CustomGrafana => central.custom_grafana().await?,
        CentralService::Jenkins => central.jenkins().await?,
        CentralService::Gerrit => central.gerrit().await?,
        CentralService::Keycloak => central.keycloak().await?,
        CentralService::Vault => central.vault().await?,
        CentralService::Wiremock => central.wiremock().await?,
        CentralService::ControlPlane => central.control_plane().await?,
        CentralService::Nexus => central.nexus().await?,
    };
    Ok(describe_service(&resolved))
}

async fn registry_service(
    env: &Environment,
    service: RegistryService,
    namespace: Option<&str>,
    user: Option<&str>,
) -> CliResult<Value> {
    let registry = match namespace {
        Some(namespace) => {
            env.set_namespaces([namespace]);
            env.registry_in(namespace).await?
        }
        None => env.registry().await?,
    };
    let user = || require_user(user, service);

    let described = match service {
        RegistryService::CitusMaster => describe_db(&registry.citus_master().await?),
        RegistryService::CitusReplica => describe_db(&registry.citus_replica().await?),
        RegistryService::SignatureCeph => describe_ceph(&registry.signature_ceph().await?),
        RegistryService::FileDataCeph => describe_ceph(&registry.file_data_ceph().await?),
        RegistryService::FileLowcodeCeph => describe_ceph(&registry.file_lowcode_ceph().await?),
        RegistryService::ExcerptCeph => describe_ceph(&registry.excerpt_ceph().await?),
        RegistryService::Redis => describe_redis(&registry.redis().await?),
        RegistryService::Gerrit => describe_service(&registry.gerrit().await?),
        RegistryService::Jenkins => describe_service(&registry.jenkins().await?),
        RegistryService::RedashViewer => describe_service(&registry.redash_viewer().await?),
        RegistryService::RedashAdmin => describe_service(&registry.redash_admin().await?),
        RegistryService::RegistryManagement => {
            describe_service(&registry.registry_management(user()?).await?)
        }
        RegistryService::DataFactory => describe_service(&registry.data_factory(user()?).await?),
        RegistryService::DataFactoryExternalPlatform => {
            describe_service(&registry.data_factory_external_platform(user()?).await?)
        }
        RegistryService::DataFactorySoap => {
            describe_service(&registry.data_factory_soap(user()?).await?)
        }
        RegistryService::DigitalSignatureOps => {
            describe_service(&registry.digital_signature_ops(user()?).await?)
        }
        RegistryService::UserSettings => describe_service(&registry.user_settings(user()?).await?),
        RegistryService::Bpms => describe_service(&registry.bpms(user()?).await?),
        RegistryService::FormManagementModeler => {
            describe_service(&registry.form_management_modeler(user()?).await?)
        }
        RegistryService::FormManagementProvider => {
            describe_service(&registry.form_management_provider(user()?).await?)
        }
        RegistryService::ProcessWebserviceGateway => {
            describe_service(&registry.process_webservice_gateway(user()?).await?)
        }
        RegistryService::Excerpt => describe_service(&registry.excerpt(user()?).await?),
        RegistryService::DataFactoryExternalSystem => {
            describe_service(&registry.data_factory_external_system().await?)
        }
        RegistryService::UserTaskManagement => {
            describe_service(&registry.user_task_management().await?)
        }
        RegistryService::UserProcessManagement => {
            describe_service(&registry.user_process_management().await?)
        }
        RegistryService::DigitalDocument => describe_service(&registry.digital_document().await?),
        RegistryService::OfficerPortal => describe_service(&registry.officer_portal().await?),
        RegistryService::CitizenPortal => describe_service(&registry.citizen_portal().await?),
        RegistryService::AdminPortal => describe_service(&registry.admin_portal().await?),
        RegistryService::ProcessHistory => describe_service(&registry.process_history().await?),
    };
    Ok(described)
}

fn require_user(user: Option<&str>, service: RegistryService) -> CliResult<&str> {
    user.ok_or_else(|| {
        let name = service
            .to_possible_value()
            .map_or_else(|| format!("{:?}", service), |v| v.get_name().to_string());
        CliError::missing_argument("--user", name)
    })
}

// Secrets (passwords, tokens, keys) are never printed; only their presence.

fn describe_user(user: &User) -> Value {
    json!({
        "login": user.login,
        "realm": user.realm,
        "clientId": user.client_id,
        "realmRoles": user.realm_roles,
        "hasToken": !user.token.is_empty(),
    })
}

fn describe_service(service: &Service) -> Value {
    json!({
        "url": service.url,
        "user": service.user.as_ref().map(describe_user),
        "hasToken": service.token.is_some(),
    })
}

fn describe_db(db: &Db) -> Value {
    json!({ "url": db.url, "user": db.user })
}

fn describe_ceph(ceph: &Ceph) -> Value {
    json!({ "bucketName": ceph.bucket_name, "host": ceph.host, "accessKey": ceph.access_key })
}

fn describe_redis(redis: &Redis) -> Value {
    json!({ "url": redis.url, "localPort": redis.local_port })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptions_never_contain_secrets() {
        let mut user = User::with_credentials("auto-officer", "auto-officer-pass");
        user.token = "eyJ.secret".into();
        let service = Service::new("https://bpms/").with_user(user).with_token("api-key");

        let text = describe_service(&service).to_string();
        assert!(text.contains("https://bpms/"));
        assert!(!text.contains("auto-officer-pass"));
        assert!(!text.contains("eyJ.secret"));
        assert!(!text.contains("api-key"));
    }

    #[test]
    fn user_scoped_service_without_user_names_the_flag() {
        let err = require_user(None, RegistryService::Bpms).unwrap_err();
        assert!(matches!(err, CliError::MissingArgument { flag: "--user", .. }));
        assert_eq!(err.to_string(), "--user is required for bpms");

        assert_eq!(
            require_user(Some("officer"), RegistryService::Bpms).unwrap(),
            "officer"
        );
    }

    #[test]
    fn service_names_are_kebab_case() {
        assert_eq!(
            RegistryService::from_str("data-factory-soap", false).unwrap(),
            RegistryService::DataFactorySoap
        );
        assert_eq!(
            CentralService::from_str("default-grafana", false).unwrap(),
            CentralService::DefaultGrafana
        );
        assert_eq!(
            DatabaseRole::from_str("excerpt-worker", false).unwrap(),
            DatabaseRole::ExcerptWorker
        );
    }
}
