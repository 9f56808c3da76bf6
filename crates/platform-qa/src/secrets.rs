//! Decoding of secret values into credentials and tokens
//!
//! Secrets arrive from the cluster as key to base64 maps. A requested key
//! that is missing, not valid base64, or not UTF-8 fails the whole lookup;
//! callers never receive a partially decoded credential.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::cluster::ClusterClient;
use crate::model::User;
use crate::{Error, Result};

/// Key holding a login in credential secrets
pub const USERNAME_KEY: &str = "username";
/// Key holding a password in credential secrets
pub const PASSWORD_KEY: &str = "password";

/// Database roles whose credentials the citus roles secret carries
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CitusRole {
    /// Cluster administrator
    Admin,
    /// Registry application
    Application,
    /// Registry schema owner
    RegistryOwner,
    /// User settings service
    Settings,
    /// Audit log writer
    Audit,
    /// Analytics reader
    Analytics,
    /// Excerpt export service
    ExcerptExporter,
    /// Excerpt service
    Excerpt,
    /// Excerpt worker
    ExcerptWorker,
}

impl CitusRole {
    /// Every role, in declaration order
    pub const ALL: [CitusRole; 9] = [
        CitusRole::Admin,
        CitusRole::Application,
        CitusRole::RegistryOwner,
        CitusRole::Settings,
        CitusRole::Audit,
        CitusRole::Analytics,
        CitusRole::ExcerptExporter,
        CitusRole::Excerpt,
        CitusRole::ExcerptWorker,
    ];

    /// Prefix of the role's `<prefix>Name`/`<prefix>Pass` secret keys
    pub fn key_prefix(self) -> &'static str {
        match self {
            CitusRole::Admin => "admRole",
            CitusRole::Application => "appRole",
            CitusRole::RegistryOwner => "regOwnerRole",
            CitusRole::Settings => "settRole",
            CitusRole::Audit => "auditRole",
            CitusRole::Analytics => "anRole",
            CitusRole::ExcerptExporter => "excerptExporterRole",
            CitusRole::Excerpt => "excerptRole",
            CitusRole::ExcerptWorker => "excerptWorkerRole",
        }
    }
}

impl std::fmt::Display for CitusRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key_prefix())
    }
}

/// Decode one base64 value of `secret`
pub fn decode_value(data: &BTreeMap<String, String>, secret: &str, key: &str) -> Result<String> {
    let encoded = data
        .get(key)
        .ok_or_else(|| Error::secret(secret, key, "key is missing"))?;
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| Error::secret(secret, key, format!("invalid base64: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|e| Error::secret(secret, key, format!("value is not UTF-8: {}", e)))
}

/// Reads and decodes secrets of one namespace
pub struct SecretReader<'a> {
    cluster: &'a dyn ClusterClient,
    namespace: &'a str,
}

impl<'a> SecretReader<'a> {
    /// Reader for secrets in `namespace`
    pub fn new(cluster: &'a dyn ClusterClient, namespace: &'a str) -> Self {
        Self { cluster, namespace }
    }

    /// `username`/`password` pair of `secret`
    pub async fn credentials(&self, secret: &str) -> Result<User> {
        let data = self.cluster.get_secret(self.namespace, secret).await?;
        Ok(User::with_credentials(
            decode_value(&data, secret, USERNAME_KEY)?,
            decode_value(&data, secret, PASSWORD_KEY)?,
        ))
    }

    /// `<prefix>Name`/`<prefix>Pass` pair of `secret`
    pub async fn role_credentials(&self, secret: &str, prefix: &str) -> Result<User> {
        let data = self.cluster.get_secret(self.namespace, secret).await?;
        Ok(User::with_credentials(
            decode_value(&data, secret, &format!("{}Name", prefix))?,
            decode_value(&data, secret, &format!("{}Pass", prefix))?,
        ))
    }

    /// A single decoded value of `secret`
    pub async fn secret_value(&self, secret: &str, key: &str) -> Result<String> {
        let data = self.cluster.get_secret(self.namespace, secret).await?;
        decode_value(&data, secret, key)
    }
}
