//! Database, object-storage and redis descriptors

use tracing::debug;

use crate::cluster::ClusterClient;
use crate::config::ServiceConfiguration;
use crate::endpoint::resolve_endpoint;
use crate::model::{Ceph, Db, Redis};
use crate::secrets::{decode_value, SecretReader};
use crate::shaping::format_route_template;
use crate::tunnel::Tunnels;
use crate::{Error, Result};

const ACCESS_KEY: &str = "AWS_ACCESS_KEY_ID";
const SECRET_KEY: &str = "AWS_SECRET_ACCESS_KEY";
const BUCKET_NAME: &str = "BUCKET_NAME";
const BUCKET_HOST: &str = "BUCKET_HOST";

/// Where a bucket's host comes from
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CephHostPolicy {
    /// Whether the platform object storage is reached through a tunnel
    pub central_port_forwarding: bool,
    /// Host to use when it is (the tunnel's URL)
    pub fallback_host: Option<String>,
}

impl CephHostPolicy {
    /// Pick the bucket host: the fallback when tunnelling, else the bucket's
    /// own host
    pub fn host(&self, bucket_host: Option<&str>) -> Option<String> {
        if self.central_port_forwarding {
            self.fallback_host.clone()
        } else {
            bucket_host.map(str::to_string)
        }
    }
}

/// Replace the leading `http`/`https` scheme of `url` with `jdbc:postgresql`
pub fn jdbc_url(url: &str) -> String {
    url.strip_prefix("https")
        .or_else(|| url.strip_prefix("http"))
        .map(|rest| format!("jdbc:postgresql{}", rest))
        .unwrap_or_else(|| url.to_string())
}

/// Database access for `config` in `namespace`
pub async fn db(
    cluster: &dyn ClusterClient,
    tunnels: &Tunnels,
    namespace: &str,
    config: &ServiceConfiguration,
) -> Result<Db> {
    let url = resolve_endpoint(cluster, tunnels, namespace, config).await?;
    let credentials = SecretReader::new(cluster, namespace)
        .credentials(&config.secret)
        .await?;
    Ok(Db {
        user: credentials.login,
        password: credentials.password,
        url: jdbc_url(&url),
    })
}

/// Access to `bucket`, whose secret and config map share its name
pub async fn ceph(
    cluster: &dyn ClusterClient,
    namespace: &str,
    bucket: &str,
    policy: &CephHostPolicy,
) -> Result<Ceph> {
    let secret = cluster.get_secret(namespace, bucket).await?;
    let config_map = cluster.get_config_map(namespace, bucket).await?;

    let bucket_name = config_map
        .get(BUCKET_NAME)
        .cloned()
        .ok_or_else(|| Error::secret(bucket, BUCKET_NAME, "key is missing from config map"))?;
    let host = policy
        .host(config_map.get(BUCKET_HOST).map(String::as_str))
        .ok_or_else(|| Error::secret(bucket, BUCKET_HOST, "no bucket host available"))?;

    debug!(bucket, host = %host, "Resolved bucket");
    Ok(Ceph {
        bucket_name,
        access_key: decode_value(&secret, bucket, ACCESS_KEY)?,
        secret_key: decode_value(&secret, bucket, SECRET_KEY)?,
        host,
    })
}

/// Redis access for `config` in `namespace`
///
/// The URL always comes from the declared route template; a tunnel is opened
/// alongside when the declaration asks for port-forwarding.
pub async fn redis(
    cluster: &dyn ClusterClient,
    tunnels: &Tunnels,
    namespace: &str,
    config: &ServiceConfiguration,
) -> Result<Redis> {
    let credentials = SecretReader::new(cluster, namespace)
        .credentials(&config.secret)
        .await?;

    let local_port = if config.port_forwarding {
        let tunnel = cluster
            .port_forward(namespace, &config.pod_label, config.default_port)
            .await?;
        let port = tunnel.local_port();
        tunnels.register(tunnel);
        Some(port)
    } else {
        None
    };

    Ok(Redis {
        url: format_route_template(&config.route, namespace),
        password: credentials.password,
        local_port,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MockClusterClient;
    use crate::tunnel::Tunnel;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use std::collections::BTreeMap;
    use tokio_util::sync::CancellationToken;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn bucket_cluster() -> MockClusterClient {
        let mut cluster = MockClusterClient::new();
        cluster.expect_get_secret().returning(|_, _| {
            Ok(map(&[
                (ACCESS_KEY, STANDARD.encode("AKIA").as_str()),
                (SECRET_KEY, STANDARD.encode("s3-secret").as_str()),
            ]))
        });
        cluster.expect_get_config_map().returning(|_, _| {
            Ok(map(&[
                (BUCKET_NAME, "file-excerpt-bucket-7c1"),
                (BUCKET_HOST, "rook-ceph-rgw.openshift-storage.svc"),
            ]))
        });
        cluster
    }

    #[test]
    fn jdbc_url_replaces_only_the_scheme() {
        assert_eq!(
            jdbc_url("http://localhost:41000/"),
            "jdbc:postgresql://localhost:41000/"
        );
        assert_eq!(
            jdbc_url("https://citus-master-http.apps/"),
            "jdbc:postgresql://citus-master-http.apps/"
        );
    }

    #[tokio::test]
    async fn ceph_host_follows_central_port_forwarding() {
        let cluster = bucket_cluster();

        let tunnelled = CephHostPolicy {
            central_port_forwarding: true,
            fallback_host: Some("http://localhost:41003/".into()),
        };
        let bucket = ceph(&cluster, "mdtuddm", "excerpt", &tunnelled).await.unwrap();
        assert_eq!(bucket.host, "http://localhost:41003/");
        assert_eq!(bucket.bucket_name, "file-excerpt-bucket-7c1");
        assert_eq!(bucket.access_key, "AKIA");
        assert_eq!(bucket.secret_key, "s3-secret");

        let routed = CephHostPolicy::default();
        let bucket = ceph(&cluster, "mdtuddm", "excerpt", &routed).await.unwrap();
        assert_eq!(bucket.host, "rook-ceph-rgw.openshift-storage.svc");
    }

    #[tokio::test]
    async fn db_combines_endpoint_and_credentials() {
        let mut cluster = MockClusterClient::new();
        cluster.expect_list_routes().returning(|_| Ok(BTreeMap::new()));
        cluster
            .expect_port_forward()
            .returning(|_, _, _| Ok(Tunnel::new(41004, "mdtuddm/citus-master-0:5432", CancellationToken::new(), None)));
        cluster.expect_get_secret().returning(|_, _| {
            Ok(map(&[
                ("username", STANDARD.encode("postgres").as_str()),
                ("password", STANDARD.encode("pg-pass").as_str()),
            ]))
        });

        let config = ServiceConfiguration {
            pod_label: "citus-master".into(),
            route: "citus-master".into(),
            default_port: 5432,
            secret: "citus-secrets".into(),
            ..Default::default()
        };
        let db = db(&cluster, &Tunnels::default(), "mdtuddm", &config).await.unwrap();
        assert_eq!(db.url, "jdbc:postgresql://localhost:41004/");
        assert_eq!(db.user, "postgres");
        assert_eq!(db.password, "pg-pass");
    }

    #[tokio::test]
    async fn redis_url_comes_from_template_with_tunnel_port() {
        let mut cluster = MockClusterClient::new();
        cluster.expect_get_secret().returning(|_, _| {
            Ok(map(&[
                ("username", STANDARD.encode("default").as_str()),
                ("password", STANDARD.encode("redis-pass").as_str()),
            ]))
        });
        cluster
            .expect_port_forward()
            .withf(|_, label, port| label == "rfs-redis-sentinel" && *port == 26379)
            .returning(|_, _, _| Ok(Tunnel::new(41005, "mdtuddm/rfs-redis-sentinel-0:26379", CancellationToken::new(), None)));

        let config = ServiceConfiguration {
            pod_label: "rfs-redis-sentinel".into(),
            route: "redis://rfs-redis-sentinel.%s.svc:26379".into(),
            default_port: 26379,
            secret: "redis-auth".into(),
            port_forwarding: true,
            ..Default::default()
        };
        let tunnels = Tunnels::default();
        let redis = redis(&cluster, &tunnels, "mdtuddm", &config).await.unwrap();
        assert_eq!(redis.url, "redis://rfs-redis-sentinel.mdtuddm.svc:26379");
        assert_eq!(redis.password, "redis-pass");
        assert_eq!(redis.local_port, Some(41005));
        assert_eq!(tunnels.len(), 1);
    }
}
