//! Per-service endpoint shaping
//!
//! A few services need their resolved URL or their declaration adjusted
//! before use. The adjustments live in one table keyed by service name
//! instead of being scattered through the accessors.

use std::borrow::Cow;

use crate::config::ServiceConfiguration;

/// One adjustment applied to a service
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShapingRule {
    /// Drop the `https://` scheme and the trailing `/`, leaving `host[/path]`
    StripScheme,
    /// Append a suffix to the URL (after its trailing `/` is removed)
    AppendSuffix(&'static str),
    /// Never port-forward on clusters marked as port-forwarding disabled
    RouteOnMarkedClusters,
}

/// Services with shaping rules, by configuration key
const RULES: &[(&str, &[ShapingRule])] = &[
    ("wiremock", &[ShapingRule::StripScheme]),
    ("dataFactorySoap", &[ShapingRule::AppendSuffix("/ws?wsdl")]),
    (
        "processWebserviceGateway",
        &[ShapingRule::AppendSuffix(":443/ws")],
    ),
    ("redashViewer", &[ShapingRule::AppendSuffix("/api")]),
    ("redashAdmin", &[ShapingRule::AppendSuffix("/api")]),
    ("digitalSignature", &[ShapingRule::RouteOnMarkedClusters]),
    ("bpms", &[ShapingRule::RouteOnMarkedClusters]),
];

/// Rules for the service declared under `service`
pub fn rules_for(service: &str) -> &'static [ShapingRule] {
    RULES
        .iter()
        .find(|(name, _)| *name == service)
        .map(|(_, rules)| *rules)
        .unwrap_or(&[])
}

/// Apply the URL rules of `service` to a resolved base URL
pub fn shape_url(service: &str, url: String) -> String {
    rules_for(service).iter().fold(url, |url, rule| match rule {
        ShapingRule::StripScheme => {
            let stripped = url.strip_prefix("https://").unwrap_or(&url);
            drop_one_slash(stripped).to_string()
        }
        ShapingRule::AppendSuffix(suffix) => {
            format!("{}{}", drop_one_slash(&url), suffix)
        }
        ShapingRule::RouteOnMarkedClusters => url,
    })
}

fn drop_one_slash(url: &str) -> &str {
    url.strip_suffix('/').unwrap_or(url)
}

/// The declaration of `service` as it should be resolved on this cluster
pub fn shape_declaration<'a>(
    service: &str,
    config: &'a ServiceConfiguration,
    port_forwarding_disabled: bool,
) -> Cow<'a, ServiceConfiguration> {
    let route_only = rules_for(service).contains(&ShapingRule::RouteOnMarkedClusters);
    if route_only && port_forwarding_disabled && config.port_forwarding {
        let mut shaped = config.clone();
        shaped.port_forwarding = false;
        Cow::Owned(shaped)
    } else {
        Cow::Borrowed(config)
    }
}

/// Fill the `%s` of a route template (redis declares its URL this way)
/// with `namespace`
pub fn format_route_template(template: &str, namespace: &str) -> String {
    template.replacen("%s", namespace, 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wiremock_is_reduced_to_host() {
        assert_eq!(
            shape_url("wiremock", "https://wiremock-mdtuddm.apps.example.com/".into()),
            "wiremock-mdtuddm.apps.example.com"
        );
        assert_eq!(
            shape_url("wiremock", "http://localhost:41000/".into()),
            "http://localhost:41000"
        );
        // only the last slash goes
        assert_eq!(
            shape_url("wiremock", "https://wiremock.apps/mock//".into()),
            "wiremock.apps/mock/"
        );
    }

    #[test]
    fn suffixes_are_appended_after_one_slash_is_dropped() {
        assert_eq!(
            shape_url("dataFactorySoap", "https://soap.apps/".into()),
            "https://soap.apps/ws?wsdl"
        );
        assert_eq!(
            shape_url("processWebserviceGateway", "https://bp-gw.apps/".into()),
            "https://bp-gw.apps:443/ws"
        );
        assert_eq!(
            shape_url("redashAdmin", "http://localhost:41002/".into()),
            "http://localhost:41002/api"
        );
    }

    #[test]
    fn unlisted_services_are_untouched() {
        assert!(rules_for("kibana").is_empty());
        assert_eq!(shape_url("kibana", "https://kibana/".into()), "https://kibana/");
    }

    #[test]
    fn marked_clusters_force_routes_for_listed_services() {
        let config = ServiceConfiguration {
            port_forwarding: true,
            ..Default::default()
        };
        assert!(!shape_declaration("bpms", &config, true).port_forwarding);
        assert!(shape_declaration("bpms", &config, false).port_forwarding);
        assert!(!shape_declaration("digitalSignature", &config, true).port_forwarding);
        assert!(shape_declaration("digitalSignature", &config, false).port_forwarding);
        assert!(shape_declaration("excerpt", &config, true).port_forwarding);
    }

    #[test]
    fn route_template_takes_the_namespace() {
        assert_eq!(
            format_route_template("redis://rfs-redis-sentinel.%s.svc:26379", "mdtuddm"),
            "redis://rfs-redis-sentinel.mdtuddm.svc:26379"
        );
    }
}
