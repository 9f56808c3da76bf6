//! OpenShift OAuth login: username/password to bearer token

use std::time::Duration;

use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use serde::Deserialize;
use tracing::debug;

use crate::{Error, Result};

/// Client id OpenShift reserves for non-browser password logins
const CHALLENGING_CLIENT: &str = "openshift-challenging-client";

#[derive(Deserialize)]
struct OAuthMetadata {
    authorization_endpoint: String,
}

/// Log in to the cluster API at `cluster_url` and return a bearer token
pub async fn request_token(cluster_url: &str, login: &str, password: &str) -> Result<String> {
    let fail = |message: String| Error::cluster_login(login, message);

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .danger_accept_invalid_certs(true)
        .redirect(Policy::none())
        .build()
        .map_err(|e| fail(format!("failed to create HTTP client: {}", e)))?;

    let metadata_url = format!(
        "{}/.well-known/oauth-authorization-server",
        cluster_url.trim_end_matches('/')
    );
    let metadata: OAuthMetadata = http_client
        .get(&metadata_url)
        .send()
        .await
        .map_err(|e| fail(format!("failed to fetch oauth metadata: {}", e)))?
        .json()
        .await
        .map_err(|e| fail(format!("invalid oauth metadata: {}", e)))?;

    let response = http_client
        .get(&metadata.authorization_endpoint)
        .query(&[("response_type", "token"), ("client_id", CHALLENGING_CLIENT)])
        .basic_auth(login, Some(password))
        .header("X-CSRF-Token", "1")
        .send()
        .await
        .map_err(|e| fail(format!("authorization request failed: {}", e)))?;

    let status = response.status();
    let location = response
        .headers()
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| fail(format!("no redirect in authorization response ({})", status)))?;

    let token = token_from_location(location)
        .ok_or_else(|| fail("redirect carries no access token".to_string()))?;
    debug!(login, "Obtained cluster token");
    Ok(token)
}

/// `access_token` parameter of a redirect URL's fragment
fn token_from_location(location: &str) -> Option<String> {
    let (_, fragment) = location.split_once('#')?;
    fragment
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "access_token")
        .map(|(_, value)| value.to_string())
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_read_from_the_fragment() {
        let location = "https://oauth.apps.example.com/oauth/token/implicit#access_token=sha256~abc&expires_in=86400&token_type=Bearer";
        assert_eq!(token_from_location(location).as_deref(), Some("sha256~abc"));
    }

    #[test]
    fn redirect_without_token_yields_nothing() {
        assert_eq!(token_from_location("https://oauth/implicit?error=access_denied"), None);
        assert_eq!(token_from_location("https://oauth/implicit#access_token="), None);
    }
}
