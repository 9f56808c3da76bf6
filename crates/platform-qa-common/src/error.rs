//! Error types for environment resolution
//!
//! Errors carry the name of the service, secret, identity or resource they
//! refer to so that a failing test run points straight at the broken piece of
//! the environment. Nothing in this workspace retries on error except the
//! readiness poll; every other failure propagates to the test harness.

use thiserror::Error;

/// Main error type for environment resolution
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// A JSON configuration resource is absent or unreadable
    #[error("json configuration missing at {path}: {message}")]
    JsonConfigurationMissing {
        /// Path of the resource that failed to load
        path: String,
        /// What went wrong while loading it
        message: String,
    },

    /// A required setting is neither overridden nor present in the properties
    #[error("property configuration missing: {key}")]
    PropertyConfigurationMissing {
        /// Property key that has no value
        key: String,
    },

    /// A registry facade was requested for a namespace that was never registered
    #[error("namespace {namespace} is missing for registry configuration")]
    MissingNamespace {
        /// The unregistered namespace
        namespace: String,
    },

    /// The configuration has no declaration for the requested service
    #[error("service {service} is not declared in the configuration")]
    ServiceNotConfigured {
        /// Logical service name
        service: String,
    },

    /// Route lookup matched more than one route and none by exact name
    #[error("route {route} has not been resolved: {matches} routes match")]
    RouteUnresolved {
        /// Configured route substring
        route: String,
        /// Number of routes whose name contains the substring
        matches: usize,
    },

    /// A secret or config map value is missing or cannot be decoded
    #[error("secret {secret} key {key}: {message}")]
    Secret {
        /// Secret (or config map) name
        secret: String,
        /// Key within the secret
        key: String,
        /// What is wrong with the value
        message: String,
    },

    /// No static identity record exists for the requested login
    #[error("user {login} is not defined in the identity store")]
    UnknownUser {
        /// Requested login
        login: String,
    },

    /// Logging in to the cluster as a user failed
    #[error("cluster login as {login} failed: {message}")]
    ClusterLogin {
        /// Login used
        login: String,
        /// Description of the failure
        message: String,
    },

    /// Authorization system (Keycloak) call failed
    #[error("authorization error [{realm}]: {message}")]
    Auth {
        /// Realm the call was made against
        realm: String,
        /// Description of the failure
        message: String,
    },

    /// Port-forward tunnel could not be established
    #[error("tunnel to {target} failed: {message}")]
    Tunnel {
        /// `namespace/pod:port` the tunnel was meant to reach
        target: String,
        /// Description of the failure
        message: String,
    },

    /// An identity never became visible to the cluster
    #[error("user is not synced for openshift: {identity} (gave up after {attempts} attempts)")]
    ReadinessTimeout {
        /// Login of the identity that never synced
        identity: String,
        /// Number of poll attempts made
        attempts: u32,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Where the error occurred (e.g. "oauth", "create_client")
        context: String,
    },
}

impl Error {
    /// Create a json-configuration-missing error for `path`
    pub fn json_configuration_missing(path: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::JsonConfigurationMissing {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Create a property-configuration-missing error for `key`
    pub fn property_missing(key: impl Into<String>) -> Self {
        Self::PropertyConfigurationMissing { key: key.into() }
    }

    /// Create a missing-namespace error
    pub fn missing_namespace(namespace: impl Into<String>) -> Self {
        Self::MissingNamespace {
            namespace: namespace.into(),
        }
    }

    /// Create a service-not-configured error
    pub fn service_not_configured(service: impl Into<String>) -> Self {
        Self::ServiceNotConfigured {
            service: service.into(),
        }
    }

    /// Create an unresolved-route error
    pub fn route_unresolved(route: impl Into<String>, matches: usize) -> Self {
        Self::RouteUnresolved {
            route: route.into(),
            matches,
        }
    }

    /// Create a secret error for a key of a secret
    pub fn secret(
        secret: impl Into<String>,
        key: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Secret {
            secret: secret.into(),
            key: key.into(),
            message: msg.into(),
        }
    }

    /// Create an unknown-user error
    pub fn unknown_user(login: impl Into<String>) -> Self {
        Self::UnknownUser {
            login: login.into(),
        }
    }

    /// Create a cluster-login error
    pub fn cluster_login(login: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::ClusterLogin {
            login: login.into(),
            message: msg.into(),
        }
    }

    /// Create an authorization error scoped to a realm
    pub fn auth(realm: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Auth {
            realm: realm.into(),
            message: msg.into(),
        }
    }

    /// Create a tunnel error
    pub fn tunnel(target: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Tunnel {
            target: target.into(),
            message: msg.into(),
        }
    }

    /// Create a readiness-timeout error
    pub fn readiness_timeout(identity: impl Into<String>, attempts: u32) -> Self {
        Self::ReadinessTimeout {
            identity: identity.into(),
            attempts,
        }
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Whether the error comes from the cluster transport rather than from the
    /// environment's content.
    ///
    /// The readiness poll treats transient errors as "not yet" and keeps
    /// polling; everything else aborts the wait.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Kube { .. } | Error::Tunnel { .. } | Error::ClusterLogin { .. }
        )
    }
}
