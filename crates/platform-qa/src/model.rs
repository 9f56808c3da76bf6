//! Resolved descriptors handed to tests: services, identities, databases,
//! object-storage buckets and redis.

use serde::{Deserialize, Serialize};

/// A test identity
///
/// Loaded from the identity store, then mutated in place: the password is
/// derived from the login at load time and the token is overwritten on every
/// refresh.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct User {
    /// Login name
    pub login: String,
    /// Password
    pub password: String,
    /// Current access token, empty until the first refresh
    pub token: String,
    /// Epoch milliseconds of the last token refresh, `0` if never refreshed
    pub token_expire_time: i64,
    /// Authorization realm the identity lives in
    pub realm: String,
    /// Client the identity requests tokens for
    pub client_id: String,
    /// Realm roles granted on provisioning
    #[serde(deserialize_with = "one_or_many")]
    pub realm_roles: Vec<String>,
}

impl User {
    /// A login/password pair, as decoded from a secret
    pub fn with_credentials(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
            ..Default::default()
        }
    }
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Don't expose the password or token in debug output
        f.debug_struct("User")
            .field("login", &self.login)
            .field("realm", &self.realm)
            .field("client_id", &self.client_id)
            .field("realm_roles", &self.realm_roles)
            .field("has_token", &!self.token.is_empty())
            .field("token_expire_time", &self.token_expire_time)
            .finish()
    }
}

/// Accept both `"role"` and `["role", ...]` for list fields
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => vec![value],
        OneOrMany::Many(values) => values,
    })
}

/// A resolved service endpoint
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Service {
    /// Base URL, after endpoint shaping
    pub url: String,
    /// Identity attached to the service, if it needs one
    pub user: Option<User>,
    /// Opaque token (API key, vault token), if the service needs one
    pub token: Option<String>,
}

impl Service {
    /// A bare endpoint
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// The same endpoint with `user` attached
    pub fn with_user(mut self, user: User) -> Self {
        self.user = Some(user);
        self
    }

    /// The same endpoint with `token` attached
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// Relational database access
#[derive(Clone, PartialEq, Eq)]
pub struct Db {
    /// Database role
    pub user: String,
    /// Role password
    pub password: String,
    /// `jdbc:postgresql://...` connection string
    pub url: String,
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("user", &self.user)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

/// Object-storage bucket access
#[derive(Clone, PartialEq, Eq)]
pub struct Ceph {
    /// Bucket name
    pub bucket_name: String,
    /// S3 access key id
    pub access_key: String,
    /// S3 secret access key
    pub secret_key: String,
    /// Host serving the bucket
    pub host: String,
}

impl std::fmt::Debug for Ceph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ceph")
            .field("bucket_name", &self.bucket_name)
            .field("access_key", &self.access_key)
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

/// Redis access
#[derive(Clone, PartialEq, Eq)]
pub struct Redis {
    /// Redis URL from the configured template
    pub url: String,
    /// Redis password
    pub password: String,
    /// Local end of the tunnel, when one was opened
    pub local_port: Option<u16>,
}

impl std::fmt::Debug for Redis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Redis")
            .field("url", &self.url)
            .field("local_port", &self.local_port)
            .finish_non_exhaustive()
    }
}

/// An OLM catalog source installed on the cluster
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSource {
    /// Object name
    pub name: String,
    /// Namespace the source lives in
    pub namespace: String,
    /// Human readable name
    pub display_name: Option<String>,
    /// Publisher
    pub publisher: Option<String>,
    /// `grpc`, `internal` or `configmap`
    pub source_type: Option<String>,
    /// Index image, for `grpc` sources
    pub image: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_record_accepts_single_role() {
        let user: User = serde_json::from_str(
            r#"{"login":"officer","realm":"-officer-portal","clientId":"officer-portal","realmRoles":"officer"}"#,
        )
        .unwrap();
        assert_eq!(user.realm_roles, vec!["officer".to_string()]);
        assert_eq!(user.token_expire_time, 0);
        assert!(user.password.is_empty());
    }

    #[test]
    fn user_record_ignores_unknown_fields() {
        let user: User =
            serde_json::from_str(r#"{"login":"a","realmRoles":["x","y"],"fullName":"A B"}"#)
                .unwrap();
        assert_eq!(user.login, "a");
        assert_eq!(user.realm_roles.len(), 2);
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let mut user = User::with_credentials("admin", "hunter2");
        user.token = "eyJhbGciOi".to_string();
        let debug = format!("{:?}", user);
        assert!(debug.contains("admin"));
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("eyJhbGciOi"));

        let db = Db {
            user: "postgres".into(),
            password: "pg-pass".into(),
            url: "jdbc:postgresql://localhost:5432/".into(),
        };
        assert!(!format!("{:?}", db).contains("pg-pass"));
    }
}
