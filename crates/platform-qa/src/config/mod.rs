//! Declarative environment configuration
//!
//! The root configuration is a JSON document with two sections: platform-wide
//! ("central") services and per-registry services. Each service is declared by
//! name with the same descriptor shape:
//!
//! ```json
//! {
//!   "centralConfiguration": {
//!     "keycloak": { "namespace": "user-management", "podLabel": "keycloak",
//!                   "route": "keycloak", "defaultPort": 8080,
//!                   "secret": "keycloak", "portForwarding": false }
//!   },
//!   "registryConfiguration": {
//!     "ceph": { "signatureBucket": "lowcode-signature-bucket" },
//!     "bpms": { "podLabel": "bpms", "route": "bpms", "defaultPort": 8080 }
//!   }
//! }
//! ```

mod loader;
mod settings;

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{Error, Result};

pub use loader::{load_configuration, load_properties, load_users, Properties, ResourceLayout};
pub use settings::{format_cluster_url, Overrides, PlatformSettings, UiRunSettings};

/// How to reach one logical service
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceConfiguration {
    /// Namespace the service runs in (central services only; registry
    /// services live in the registry namespace)
    pub namespace: String,
    /// Substring identifying the service's pods
    pub pod_label: String,
    /// Substring identifying the service's route; for redis, a URL template
    /// with one `%s` for the namespace
    pub route: String,
    /// Container port to tunnel to
    pub default_port: u16,
    /// Secret holding the service's credentials
    pub secret: String,
    /// Always tunnel instead of using the route
    pub port_forwarding: bool,
}

/// Root configuration document
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Configuration {
    /// Platform-wide services
    pub central_configuration: CentralConfiguration,
    /// Services every registry namespace carries
    pub registry_configuration: RegistryConfiguration,
}

/// Platform-wide services, keyed by logical name
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CentralConfiguration {
    /// Service declarations
    #[serde(flatten, deserialize_with = "service_entries")]
    pub services: BTreeMap<String, ServiceConfiguration>,
}

impl CentralConfiguration {
    /// Declaration of `name`
    pub fn service(&self, name: &str) -> Result<&ServiceConfiguration> {
        self.services
            .get(name)
            .ok_or_else(|| Error::service_not_configured(name))
    }
}

/// Per-registry services plus the registry's object-storage buckets
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RegistryConfiguration {
    /// Object-storage bucket names
    #[serde(default)]
    pub ceph: CephBuckets,
    /// Service declarations
    #[serde(flatten, deserialize_with = "service_entries")]
    pub services: BTreeMap<String, ServiceConfiguration>,
}

impl RegistryConfiguration {
    /// Declaration of `name`
    pub fn service(&self, name: &str) -> Result<&ServiceConfiguration> {
        self.services
            .get(name)
            .ok_or_else(|| Error::service_not_configured(name))
    }
}

/// Keep the object-valued keys of a section; scalars such as a comment or
/// version marker are not service declarations
fn service_entries<'de, D>(
    deserializer: D,
) -> std::result::Result<BTreeMap<String, ServiceConfiguration>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = BTreeMap::<String, Value>::deserialize(deserializer)?;
    let mut services = BTreeMap::new();
    for (name, value) in entries {
        if !value.is_object() {
            debug!(key = %name, "Skipping non-object configuration entry");
            continue;
        }
        let service = serde_json::from_value(value)
            .map_err(|e| serde::de::Error::custom(format!("service {}: {}", name, e)))?;
        services.insert(name, service);
    }
    Ok(services)
}

/// Names of a registry's buckets; each doubles as the name of the secret and
/// config map describing the bucket
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CephBuckets {
    /// Digital-signature bucket
    pub signature_bucket: String,
    /// Uploaded data files bucket
    pub data_file_bucket: String,
    /// Low-code form files bucket
    pub low_code_file_bucket: String,
    /// Excerpts bucket
    pub excerpt_bucket: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "centralConfiguration": {
            "wiremock": { "namespace": "mdtuddm", "podLabel": "wiremock", "route": "wiremock", "defaultPort": 8080 },
            "ceph": { "namespace": "openshift-storage", "route": "s3", "portForwarding": true, "defaultPort": 80 }
        },
        "registryConfiguration": {
            "ceph": { "signatureBucket": "lowcode-signature", "excerptBucket": "excerpt" },
            "bpms": { "podLabel": "bpms", "route": "bpms", "defaultPort": 8080, "secret": "bpms-secret" },
            "unusedLegacyField": {}
        }
    }"#;

    #[test]
    fn services_are_keyed_by_name() {
        let config: Configuration = serde_json::from_str(SAMPLE).unwrap();

        let wiremock = config.central_configuration.service("wiremock").unwrap();
        assert_eq!(wiremock.namespace, "mdtuddm");
        assert_eq!(wiremock.default_port, 8080);
        assert!(!wiremock.port_forwarding);

        assert!(config.central_configuration.service("ceph").unwrap().port_forwarding);

        let bpms = config.registry_configuration.service("bpms").unwrap();
        assert_eq!(bpms.secret, "bpms-secret");
        assert_eq!(config.registry_configuration.ceph.excerpt_bucket, "excerpt");
        assert!(config.registry_configuration.ceph.data_file_bucket.is_empty());
    }

    #[test]
    fn scalar_entries_are_not_services() {
        let config: Configuration = serde_json::from_str(
            r#"{
                "centralConfiguration": { "comment": "legacy", "kibana": { "route": "kibana" } },
                "registryConfiguration": { "version": 2, "enabled": true, "bpms": { "route": "bpms" } }
            }"#,
        )
        .unwrap();

        let central = &config.central_configuration;
        assert_eq!(central.services.len(), 1);
        assert_eq!(central.service("kibana").unwrap().route, "kibana");
        assert!(central.service("comment").is_err());

        let registry = &config.registry_configuration;
        assert_eq!(registry.services.keys().collect::<Vec<_>>(), vec!["bpms"]);
    }

    #[test]
    fn malformed_service_declaration_is_rejected() {
        let err = serde_json::from_str::<Configuration>(
            r#"{ "centralConfiguration": { "kibana": { "defaultPort": "http" } } }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("kibana"));
    }

    #[test]
    fn undeclared_service_is_named_in_error() {
        let config: Configuration = serde_json::from_str(SAMPLE).unwrap();
        let err = config.central_configuration.service("kiali").unwrap_err();
        assert!(matches!(err, Error::ServiceNotConfigured { ref service } if service == "kiali"));
    }
}
