//! Waiting for a new identity to become usable on the cluster
//!
//! A freshly provisioned identity is known to the authorization system before
//! the cluster's role bindings catch up. The identity counts as ready once it
//! can read the password of the well-known `keycloak` secret in
//! `user-management` with its own cluster credentials.

use std::sync::Arc;

use tracing::{info, instrument};

use platform_qa_common::poll::{poll_until, PollConfig, PollOutcome};

use crate::cluster::ClusterConnector;
use crate::model::User;
use crate::secrets::{decode_value, PASSWORD_KEY};
use crate::{Error, Result};

/// Namespace of the readiness secret
pub const READINESS_NAMESPACE: &str = "user-management";
/// Name of the readiness secret
pub const READINESS_SECRET: &str = "keycloak";

/// Polls the cluster until an identity can read the readiness secret
pub struct ReadinessWaiter {
    connector: Arc<dyn ClusterConnector>,
    poll: PollConfig,
}

impl ReadinessWaiter {
    /// Waiter with the default 30 s interval and 5 minute bound
    pub fn new(connector: Arc<dyn ClusterConnector>) -> Self {
        Self::with_poll(connector, PollConfig::default())
    }

    /// Waiter with an explicit poll bound
    pub fn with_poll(connector: Arc<dyn ClusterConnector>, poll: PollConfig) -> Self {
        Self { connector, poll }
    }

    /// Block until `user` can read the readiness secret.
    ///
    /// Cluster and login errors count as "not yet"; a readiness secret whose
    /// password cannot be decoded fails immediately.
    #[instrument(skip(self, user), fields(login = %user.login))]
    pub async fn wait_until_ready(&self, user: &User) -> Result<()> {
        let connector = &self.connector;
        let outcome = poll_until(&self.poll, "identity_synced", || async move {
            let cluster = connector.connect_as(user).await?;
            let data = cluster.get_secret(READINESS_NAMESPACE, READINESS_SECRET).await?;
            let password = decode_value(&data, READINESS_SECRET, PASSWORD_KEY)?;
            Ok(!password.is_empty())
        })
        .await?;

        match outcome {
            PollOutcome::Ready { attempt } => {
                info!(attempt, "Identity is visible to the cluster");
                Ok(())
            }
            PollOutcome::Exhausted { attempts } => {
                Err(Error::readiness_timeout(&user.login, attempts))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{MockClusterClient, MockClusterConnector};
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn secret_with_password(password: &str) -> BTreeMap<String, String> {
        let mut data = BTreeMap::new();
        data.insert("password".to_string(), STANDARD.encode(password));
        data
    }

    fn connector_returning(password: &'static str) -> MockClusterConnector {
        let mut connector = MockClusterConnector::new();
        connector.expect_connect_as().returning(move |_| {
            let mut cluster = MockClusterClient::new();
            cluster
                .expect_get_secret()
                .withf(|ns, name| ns == READINESS_NAMESPACE && name == READINESS_SECRET)
                .returning(move |_, _| Ok(secret_with_password(password)));
            Ok(Arc::new(cluster))
        });
        connector
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_ten_attempts() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let mut connector = MockClusterConnector::new();
        connector.expect_connect_as().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            let mut cluster = MockClusterClient::new();
            cluster
                .expect_get_secret()
                .returning(|_, _| Ok(secret_with_password("")));
            Ok(Arc::new(cluster))
        });

        let waiter = ReadinessWaiter::new(Arc::new(connector));
        let started = tokio::time::Instant::now();
        let err = waiter
            .wait_until_ready(&User::with_credentials("auto-user", "auto-user"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ReadinessTimeout { ref identity, attempts: 10 } if identity == "auto-user"));
        assert_eq!(attempts.load(Ordering::SeqCst), 10);
        assert_eq!(started.elapsed(), Duration::from_secs(270));
    }

    #[tokio::test(start_paused = true)]
    async fn login_failures_keep_polling() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let mut connector = MockClusterConnector::new();
        connector.expect_connect_as().returning(move |user| {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                return Err(Error::cluster_login(&user.login, "401 Unauthorized"));
            }
            let mut cluster = MockClusterClient::new();
            cluster
                .expect_get_secret()
                .returning(|_, _| Ok(secret_with_password("kc-pass")));
            Ok(Arc::new(cluster))
        });

        let waiter = ReadinessWaiter::new(Arc::new(connector));
        waiter
            .wait_until_ready(&User::with_credentials("auto-user", "auto-user"))
            .await
            .unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn ready_on_first_readable_password() {
        let waiter = ReadinessWaiter::new(Arc::new(connector_returning("kc-pass")));
        waiter
            .wait_until_ready(&User::with_credentials("auto-user", "auto-user"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn undecodable_readiness_secret_is_fatal() {
        let mut connector = MockClusterConnector::new();
        connector.expect_connect_as().times(1).returning(|_| {
            let mut cluster = MockClusterClient::new();
            cluster.expect_get_secret().returning(|_, _| {
                let mut data = BTreeMap::new();
                data.insert("password".to_string(), "%%%".to_string());
                Ok(data)
            });
            Ok(Arc::new(cluster))
        });

        let waiter = ReadinessWaiter::with_poll(
            Arc::new(connector),
            PollConfig {
                interval: Duration::from_millis(1),
                timeout: Duration::from_millis(10),
            },
        );
        let err = waiter
            .wait_until_ready(&User::with_credentials("auto-user", "auto-user"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Secret { .. }));
    }
}
