//! Test identity lifecycle
//!
//! Each provider holds one "current identity" slot. Asking for an identity
//! other than the current one provisions it in the authorization system
//! (idempotently) and installs it; every request refreshes the token once it
//! is older than [`TOKEN_TTL_MS`]. Access to the slot is serialized so that a
//! switch, its provisioning and the refresh are one step.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::auth::AuthClient;
use crate::model::User;
use crate::readiness::ReadinessWaiter;
use crate::{Error, Result};

/// Age after which a token is refreshed before use
pub const TOKEN_TTL_MS: i64 = 240_000;

/// Client id whose registry-admin role is scoped per namespace
const ADMIN_PORTAL_CLIENT: &str = "admin-portal";
/// Registry-admin role that gets the namespace appended
const REGISTRY_ADMIN_ROLE: &str = "cp-registry-admin";

/// Whether `user`'s token must be refreshed at `now_ms`
pub fn is_token_stale(user: &User, now_ms: i64) -> bool {
    user.token_expire_time == 0 || now_ms - user.token_expire_time >= TOKEN_TTL_MS
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Platform identity records as used: each password equals its login
pub fn prepare_platform_users(records: BTreeMap<String, User>) -> BTreeMap<String, User> {
    records
        .into_iter()
        .map(|(name, mut user)| {
            user.password = user.login.clone();
            (name, user)
        })
        .collect()
}

/// Registry identity records as used in `namespace`.
///
/// Besides password := login, a realm starting with `-` is prefixed with the
/// namespace, and admin-portal identities get the namespaced registry-admin
/// role.
pub fn prepare_registry_users(
    records: BTreeMap<String, User>,
    namespace: &str,
) -> BTreeMap<String, User> {
    prepare_platform_users(records)
        .into_iter()
        .map(|(name, mut user)| {
            if user.realm.starts_with('-') {
                user.realm = format!("{}{}", namespace, user.realm);
            }
            if user.client_id == ADMIN_PORTAL_CLIENT {
                for role in user.realm_roles.iter_mut() {
                    if *role == REGISTRY_ADMIN_ROLE {
                        *role = format!("{}-{}", REGISTRY_ADMIN_ROLE, namespace);
                    }
                }
            }
            (name, user)
        })
        .collect()
}

/// Static identity records plus the authorization client that provisions
/// and authenticates them
pub struct UserService {
    users: BTreeMap<String, User>,
    auth: Arc<dyn AuthClient>,
}

impl UserService {
    /// Service over prepared identity records
    pub fn new(users: BTreeMap<String, User>, auth: Arc<dyn AuthClient>) -> Self {
        Self { users, auth }
    }

    /// The prepared identity records
    pub fn users(&self) -> &BTreeMap<String, User> {
        &self.users
    }

    /// Make `name` the current identity.
    ///
    /// Returns the identity to install and whether it was newly provisioned.
    /// The current identity is kept when it already is `name`'s record.
    pub async fn init_user(
        &self,
        current: Option<&User>,
        name: &str,
        namespace: &str,
    ) -> Result<(User, bool)> {
        let record = self
            .users
            .get(name)
            .ok_or_else(|| Error::unknown_user(name))?;

        match current {
            Some(user) if user.login == record.login => Ok((user.clone(), false)),
            _ => {
                self.auth.create_user(record, namespace).await?;
                info!(login = %record.login, namespace, "Switched test identity");
                Ok((record.clone(), true))
            }
        }
    }

    /// Refresh `user`'s token if it is stale
    pub async fn refresh_user_token(&self, user: &mut User) -> Result<()> {
        let now = now_millis();
        if !is_token_stale(user, now) {
            return Ok(());
        }
        user.token = self.auth.access_token(&user.realm, user).await?;
        user.token_expire_time = now;
        debug!(login = %user.login, "Refreshed access token");
        Ok(())
    }
}

/// Source of ready-to-use test identities
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Identity `name` with a fresh token
    async fn get(&self, name: &str) -> Result<User>;
}

/// Platform-level identities; a newly provisioned one is waited on until
/// the cluster recognises it
pub struct PlatformUserProvider {
    service: UserService,
    namespace: String,
    readiness: ReadinessWaiter,
    current: Mutex<Option<User>>,
}

impl PlatformUserProvider {
    /// Provider over raw platform records, provisioning for `namespace`
    pub fn new(
        records: BTreeMap<String, User>,
        namespace: impl Into<String>,
        auth: Arc<dyn AuthClient>,
        readiness: ReadinessWaiter,
    ) -> Self {
        Self {
            service: UserService::new(prepare_platform_users(records), auth),
            namespace: namespace.into(),
            readiness,
            current: Mutex::new(None),
        }
    }

    /// Identity records and authorization access
    pub fn user_service(&self) -> &UserService {
        &self.service
    }
}

#[async_trait]
impl IdentityProvider for PlatformUserProvider {
    #[instrument(skip(self))]
    async fn get(&self, name: &str) -> Result<User> {
        let mut current = self.current.lock().await;
        let (mut user, provisioned) = self
            .service
            .init_user(current.as_ref(), name, &self.namespace)
            .await?;
        self.service.refresh_user_token(&mut user).await?;
        if provisioned {
            self.readiness.wait_until_ready(&user).await?;
        }
        *current = Some(user.clone());
        Ok(user)
    }
}

/// Identities of one registry namespace
pub struct RegistryUserProvider {
    service: UserService,
    namespace: String,
    current: Mutex<Option<User>>,
}

impl RegistryUserProvider {
    /// Provider over raw registry records for `namespace`
    pub fn new(
        records: BTreeMap<String, User>,
        namespace: impl Into<String>,
        auth: Arc<dyn AuthClient>,
    ) -> Self {
        let namespace = namespace.into();
        Self {
            service: UserService::new(prepare_registry_users(records, &namespace), auth),
            namespace,
            current: Mutex::new(None),
        }
    }

    /// Identity records and authorization access
    pub fn user_service(&self) -> &UserService {
        &self.service
    }

    /// Identity `name`, provisioned against `namespace`
    #[instrument(skip(self))]
    pub async fn get_in(&self, name: &str, namespace: &str) -> Result<User> {
        let mut current = self.current.lock().await;
        let (mut user, _) = self
            .service
            .init_user(current.as_ref(), name, namespace)
            .await?;
        self.service.refresh_user_token(&mut user).await?;
        *current = Some(user.clone());
        Ok(user)
    }
}

#[async_trait]
impl IdentityProvider for RegistryUserProvider {
    async fn get(&self, name: &str) -> Result<User> {
        self.get_in(name, &self.namespace).await
    }
}
