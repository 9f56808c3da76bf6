//! Authorization system (Keycloak) client
//!
//! Only two calls are needed: provisioning a test identity with its realm
//! roles, and a password-grant token for an identity. Provisioning is
//! idempotent, so an identity that already exists counts as created.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

#[cfg(test)]
use mockall::automock;

use crate::model::{Service, User};
use crate::{Error, Result};

/// Realm holding the administrator account
const MASTER_REALM: &str = "master";
/// Client the administrator logs in through
const ADMIN_CLIENT: &str = "admin-cli";

/// Authorization operations on test identities
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AuthClient: Send + Sync {
    /// Make sure `user` exists in its realm with its realm roles.
    ///
    /// `namespace` is the registry the identity is provisioned for.
    async fn create_user(&self, user: &User, namespace: &str) -> Result<()>;

    /// Fresh access token for `user` in `realm`
    async fn access_token(&self, realm: &str, user: &User) -> Result<String>;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Credential<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    value: &'a str,
    temporary: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewUser<'a> {
    username: &'a str,
    enabled: bool,
    email_verified: bool,
    credentials: Vec<Credential<'a>>,
}

#[derive(Deserialize)]
struct UserRecord {
    id: String,
}

#[derive(Serialize, Deserialize)]
struct RoleRecord {
    id: String,
    name: String,
}

/// [`AuthClient`] over the Keycloak admin REST API
pub struct KeycloakClient {
    base_url: String,
    admin: User,
    http_client: reqwest::Client,
}

impl std::fmt::Debug for KeycloakClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeycloakClient")
            .field("base_url", &self.base_url)
            .field("admin", &self.admin.login)
            .finish()
    }
}

impl KeycloakClient {
    /// Client for the keycloak `service`, whose user is the administrator
    pub fn from_service(service: &Service) -> Result<Self> {
        let admin = service
            .user
            .clone()
            .ok_or_else(|| Error::auth(MASTER_REALM, "keycloak service has no admin credentials"))?;
        Self::new(&service.url, admin)
    }

    /// Client for the Keycloak at `base_url`, administered by `admin`
    pub fn new(base_url: &str, admin: User) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| Error::auth(MASTER_REALM, format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            admin,
            http_client,
        })
    }

    async fn password_grant(&self, realm: &str, client_id: &str, user: &User) -> Result<String> {
        let url = format!(
            "{}/realms/{}/protocol/openid-connect/token",
            self.base_url, realm
        );
        let response = self
            .http_client
            .post(&url)
            .form(&[
                ("grant_type", "password"),
                ("client_id", client_id),
                ("username", user.login.as_str()),
                ("password", user.password.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::auth(realm, format!("token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::auth(
                realm,
                format!("token request for {} returned {}", user.login, status),
            ));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::auth(realm, format!("invalid token response: {}", e)))?;
        Ok(token.access_token)
    }

    async fn admin_token(&self) -> Result<String> {
        self.password_grant(MASTER_REALM, ADMIN_CLIENT, &self.admin)
            .await
    }

    async fn user_id(&self, token: &str, realm: &str, login: &str) -> Result<String> {
        let url = format!("{}/admin/realms/{}/users", self.base_url, realm);
        let users: Vec<UserRecord> = self
            .http_client
            .get(&url)
            .bearer_auth(token)
            .query(&[("username", login), ("exact", "true")])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::auth(realm, format!("user lookup failed: {}", e)))?
            .json()
            .await
            .map_err(|e| Error::auth(realm, format!("invalid user lookup response: {}", e)))?;

        users
            .into_iter()
            .next()
            .map(|u| u.id)
            .ok_or_else(|| Error::auth(realm, format!("user {} not found after creation", login)))
    }

    async fn assign_realm_roles(
        &self,
        token: &str,
        realm: &str,
        user_id: &str,
        roles: &[String],
    ) -> Result<()> {
        let mut records = Vec::with_capacity(roles.len());
        for role in roles {
            let url = format!("{}/admin/realms/{}/roles/{}", self.base_url, realm, role);
            let record: RoleRecord = self
                .http_client
                .get(&url)
                .bearer_auth(token)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| Error::auth(realm, format!("role {} lookup failed: {}", role, e)))?
                .json()
                .await
                .map_err(|e| Error::auth(realm, format!("invalid role {}: {}", role, e)))?;
            records.push(record);
        }

        let url = format!(
            "{}/admin/realms/{}/users/{}/role-mappings/realm",
            self.base_url, realm, user_id
        );
        self.http_client
            .post(&url)
            .bearer_auth(token)
            .json(&records)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::auth(realm, format!("role mapping failed: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl AuthClient for KeycloakClient {
    #[instrument(skip(self, user), fields(login = %user.login, realm = %user.realm))]
    async fn create_user(&self, user: &User, namespace: &str) -> Result<()> {
        let realm = user.realm.as_str();
        let token = self.admin_token().await?;

        let url = format!("{}/admin/realms/{}/users", self.base_url, realm);
        let body = NewUser {
            username: &user.login,
            enabled: true,
            email_verified: true,
            credentials: vec![Credential {
                kind: "password",
                value: &user.password,
                temporary: false,
            }],
        };
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::auth(realm, format!("user creation failed: {}", e)))?;

        match response.status() {
            StatusCode::CREATED => info!(namespace, "Created test identity"),
            StatusCode::CONFLICT => debug!(namespace, "Test identity already exists"),
            status => {
                return Err(Error::auth(
                    realm,
                    format!("user creation for {} returned {}", user.login, status),
                ))
            }
        }

        if user.realm_roles.is_empty() {
            return Ok(());
        }
        let user_id = self.user_id(&token, realm, &user.login).await?;
        self.assign_realm_roles(&token, realm, &user_id, &user.realm_roles)
            .await
    }

    async fn access_token(&self, realm: &str, user: &User) -> Result<String> {
        let client_id = if user.client_id.is_empty() {
            ADMIN_CLIENT
        } else {
            user.client_id.as_str()
        };
        self.password_grant(realm, client_id, user).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keycloak_service_without_admin_is_rejected() {
        let err = KeycloakClient::from_service(&Service::new("https://keycloak/")).unwrap_err();
        assert!(matches!(err, Error::Auth { ref realm, .. } if realm == "master"));
    }

    #[test]
    fn base_url_is_normalized_and_debug_hides_password() {
        let service = Service::new("https://keycloak.apps/")
            .with_user(User::with_credentials("admin", "hunter2"));
        let client = KeycloakClient::from_service(&service).unwrap();
        assert_eq!(client.base_url, "https://keycloak.apps");
        assert!(!format!("{:?}", client).contains("hunter2"));
    }

    #[test]
    fn new_user_payload_uses_keycloak_field_names() {
        let body = NewUser {
            username: "auto-officer",
            enabled: true,
            email_verified: true,
            credentials: vec![Credential {
                kind: "password",
                value: "auto-officer",
                temporary: false,
            }],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["emailVerified"], true);
        assert_eq!(json["credentials"][0]["type"], "password");
    }
}
