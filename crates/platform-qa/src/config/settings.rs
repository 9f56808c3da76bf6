//! Run settings: properties file values with process-level overrides on top
//!
//! Every setting can be overridden for a single run (CLI flag or
//! `PLATFORM_QA_*` environment variable). Overrides always win over the
//! properties file.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::Properties;
use crate::model::User;
use crate::{Error, Result};

const NAMESPACE: &str = "namespace";
const USERNAME: &str = "username";
const PASSWORD: &str = "password";
const CLUSTER: &str = "cluster";
const BASE_DOMAIN: &str = "baseDomain";
const URL: &str = "url";
const PORT_FORWARDING_DISABLED_CLUSTERS: &str = "portForwardingDisabledClusters";
const REMOTE_RUN: &str = "isRemoteMoonRun";
const DARK_THEME: &str = "isDarkTheme";
const PROXY_ENABLED: &str = "isProxyEnabled";

/// Per-run overrides; `None` falls through to the properties file
#[derive(Clone, Debug, Default, clap::Args)]
pub struct Overrides {
    /// Default registry namespace
    #[arg(long, env = "PLATFORM_QA_NAMESPACE")]
    pub namespace: Option<String>,
    /// Cluster login
    #[arg(long, env = "PLATFORM_QA_USERNAME")]
    pub username: Option<String>,
    /// Cluster password, in plain text
    #[arg(long, env = "PLATFORM_QA_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
    /// Cluster name substituted into the url template
    #[arg(long, env = "PLATFORM_QA_CLUSTER")]
    pub cluster: Option<String>,
    /// Base domain substituted into the url template
    #[arg(long, env = "PLATFORM_QA_BASE_DOMAIN")]
    pub base_domain: Option<String>,
    /// Cluster API url template with two `%s` (cluster, base domain)
    #[arg(long, env = "PLATFORM_QA_URL")]
    pub url: Option<String>,
    /// Comma-separated cluster url markers on which route-capable services
    /// must not port-forward
    #[arg(long, env = "PLATFORM_QA_PORT_FORWARDING_DISABLED_CLUSTERS")]
    pub port_forwarding_disabled_clusters: Option<String>,
    /// Run UI tests on a remote browser grid
    #[arg(long, env = "PLATFORM_QA_REMOTE_RUN")]
    pub remote_run: Option<bool>,
    /// Use the dark UI theme
    #[arg(long, env = "PLATFORM_QA_DARK_THEME")]
    pub dark_theme: Option<bool>,
    /// Route UI traffic through a proxy
    #[arg(long, env = "PLATFORM_QA_PROXY_ENABLED")]
    pub proxy_enabled: Option<bool>,
}

/// UI test run switches
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UiRunSettings {
    /// Run on a remote browser grid
    pub remote_run: bool,
    /// Dark UI theme
    pub dark_theme: bool,
    /// Proxy UI traffic
    pub proxy_enabled: bool,
}

/// Fully resolved run settings
#[derive(Clone, Debug)]
pub struct PlatformSettings {
    /// Default registry namespace
    pub namespace: String,
    /// Cluster login, when one is configured; otherwise the ambient kube
    /// configuration is used
    pub credentials: Option<User>,
    /// Cluster name
    pub cluster: Option<String>,
    /// Base domain
    pub base_domain: Option<String>,
    /// Cluster API url with the template filled in
    pub cluster_url: String,
    /// Cluster url markers on which route-capable services never tunnel
    pub port_forwarding_disabled_clusters: Vec<String>,
    /// UI run switches
    pub ui: UiRunSettings,
}

impl PlatformSettings {
    /// Resolve settings from `properties`, letting `overrides` win.
    ///
    /// The properties password is stored base64-encoded; an overriding
    /// password is taken as is.
    pub fn resolve(properties: &Properties, overrides: &Overrides) -> Result<Self> {
        let pick = |over: &Option<String>, key: &str| {
            over.clone()
                .or_else(|| properties.get(key).map(str::to_string))
        };
        let flag = |over: Option<bool>, key: &str| {
            over.unwrap_or_else(|| {
                properties
                    .get(key)
                    .is_some_and(|v| v.eq_ignore_ascii_case("true"))
            })
        };

        let namespace = pick(&overrides.namespace, NAMESPACE)
            .ok_or_else(|| Error::property_missing(NAMESPACE))?;

        let password = match &overrides.password {
            Some(password) => Some(password.clone()),
            None => properties.get(PASSWORD).map(decode_password).transpose()?,
        };
        let credentials = pick(&overrides.username, USERNAME)
            .zip(password)
            .map(|(login, password)| User::with_credentials(login, password));

        let cluster = pick(&overrides.cluster, CLUSTER);
        let base_domain = pick(&overrides.base_domain, BASE_DOMAIN);
        let template = pick(&overrides.url, URL).ok_or_else(|| Error::property_missing(URL))?;
        let cluster_url = format_cluster_url(&template, cluster.as_deref(), base_domain.as_deref())?;

        let port_forwarding_disabled_clusters = pick(
            &overrides.port_forwarding_disabled_clusters,
            PORT_FORWARDING_DISABLED_CLUSTERS,
        )
        .map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|marker| !marker.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

        Ok(Self {
            namespace,
            credentials,
            cluster,
            base_domain,
            cluster_url,
            port_forwarding_disabled_clusters,
            ui: UiRunSettings {
                remote_run: flag(overrides.remote_run, REMOTE_RUN),
                dark_theme: flag(overrides.dark_theme, DARK_THEME),
                proxy_enabled: flag(overrides.proxy_enabled, PROXY_ENABLED),
            },
        })
    }

    /// Whether this cluster is one where route-capable services must use
    /// their route even if their declaration asks for a tunnel
    pub fn port_forwarding_disabled(&self) -> bool {
        self.port_forwarding_disabled_clusters
            .iter()
            .any(|marker| self.cluster_url.contains(marker.as_str()))
    }
}

fn decode_password(encoded: &str) -> Result<String> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| Error::secret("platform.properties", PASSWORD, e.to_string()))?;
    String::from_utf8(bytes)
        .map_err(|e| Error::secret("platform.properties", PASSWORD, e.to_string()))
}

/// Fill the `%s` placeholders of `template` with the cluster name and base
/// domain, in that order.
pub fn format_cluster_url(
    template: &str,
    cluster: Option<&str>,
    base_domain: Option<&str>,
) -> Result<String> {
    let mut values = [(CLUSTER, cluster), (BASE_DOMAIN, base_domain)].into_iter();
    let mut parts = template.split("%s");
    let mut url = parts.next().unwrap_or_default().to_string();

    for part in parts {
        let (key, value) = values.next().unwrap_or((URL, None));
        url.push_str(value.ok_or_else(|| Error::property_missing(key))?);
        url.push_str(part);
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn properties() -> Properties {
        let mut props = Properties::default();
        props.insert("namespace", "mdtuddm");
        props.insert("username", "qa-admin");
        props.insert("password", STANDARD.encode("s3cret"));
        props.insert("cluster", "cicd2");
        props.insert("baseDomain", "example.com");
        props.insert("url", "https://api.%s.%s:6443");
        props
    }

    #[test]
    fn properties_supply_defaults() {
        let settings = PlatformSettings::resolve(&properties(), &Overrides::default()).unwrap();
        assert_eq!(settings.namespace, "mdtuddm");
        assert_eq!(settings.cluster_url, "https://api.cicd2.example.com:6443");
        let credentials = settings.credentials.unwrap();
        assert_eq!(credentials.login, "qa-admin");
        assert_eq!(credentials.password, "s3cret");
        assert_eq!(settings.ui, UiRunSettings::default());
    }

    #[test]
    fn overrides_win_and_password_is_taken_raw() {
        let overrides = Overrides {
            namespace: Some("other-ns".into()),
            password: Some("plain".into()),
            cluster: Some("dev".into()),
            dark_theme: Some(true),
            ..Default::default()
        };
        let settings = PlatformSettings::resolve(&properties(), &overrides).unwrap();
        assert_eq!(settings.namespace, "other-ns");
        assert_eq!(settings.credentials.unwrap().password, "plain");
        assert_eq!(settings.cluster_url, "https://api.dev.example.com:6443");
        assert!(settings.ui.dark_theme);
        assert!(!settings.ui.remote_run);
    }

    #[test]
    fn missing_namespace_is_a_named_failure() {
        let mut props = properties();
        props.insert("namespace", "");
        let err = PlatformSettings::resolve(&props, &Overrides::default()).unwrap_err();
        assert!(matches!(err, Error::PropertyConfigurationMissing { ref key } if key == "namespace"));
    }

    #[test]
    fn template_without_cluster_is_a_named_failure() {
        let err = format_cluster_url("https://api.%s.%s", None, Some("example.com")).unwrap_err();
        assert!(matches!(err, Error::PropertyConfigurationMissing { ref key } if key == "cluster"));
        assert_eq!(
            format_cluster_url("https://fixed", None, None).unwrap(),
            "https://fixed"
        );
    }

    #[test]
    fn port_forwarding_disabled_on_marked_clusters() {
        let mut props = properties();
        props.insert("portForwardingDisabledClusters", "cicd2, perf");
        let settings = PlatformSettings::resolve(&props, &Overrides::default()).unwrap();
        assert!(settings.port_forwarding_disabled());

        let settings = PlatformSettings::resolve(&properties(), &Overrides::default()).unwrap();
        assert!(!settings.port_forwarding_disabled());
    }
}
