#![forbid(unsafe_code)]

use std::time::Duration;

use reportr_kernel_contracts::identity::IdentityClaim;
use thiserror::Error;

pub const GOOGLE_AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";
pub const GOOGLE_SCOPE: &str = "openid email profile";

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("identity provider request failed: {0}")]
    Transport(String),
    #[error("identity provider response could not be decoded: {0}")]
    Decode(String),
    #[error("identity provider reports the email as unverified")]
    UnverifiedEmail,
    #[error("identity provider rejected the authorization code: {0}")]
    Rejected(String),
}

/// Upstream OAuth-style identity exchange. Blocking; callers run it off the
/// async executor.
pub trait IdentityProvider: Send + Sync + 'static {
    fn authorize_url(&self, state: &str, redirect_uri: &str) -> Result<String, ProviderError>;
    fn exchange(&self, code: &str, redirect_uri: &str) -> Result<IdentityClaim, ProviderError>;
}

#[derive(Debug, serde::Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, serde::Deserialize)]
struct UserInfo {
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    hd: Option<String>,
}

pub struct GoogleIdentityProvider {
    client_id: String,
    client_secret: String,
    hosted_domain: Option<String>,
    agent: ureq::Agent,
}

impl GoogleIdentityProvider {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        hosted_domain: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            hosted_domain,
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }
}

impl IdentityProvider for GoogleIdentityProvider {
    fn authorize_url(&self, state: &str, redirect_uri: &str) -> Result<String, ProviderError> {
        let mut params = vec![
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("scope", GOOGLE_SCOPE),
            ("state", state),
        ];
        if let Some(hd) = self.hosted_domain.as_deref() {
            params.push(("hd", hd));
        }
        url::Url::parse_with_params(GOOGLE_AUTHORIZE_URL, &params)
            .map(String::from)
            .map_err(|err| ProviderError::Transport(err.to_string()))
    }

    fn exchange(&self, code: &str, redirect_uri: &str) -> Result<IdentityClaim, ProviderError> {
        let token: TokenResponse = self
            .agent
            .post(GOOGLE_TOKEN_URL)
            .send_form(&[
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", redirect_uri),
                ("grant_type", "authorization_code"),
            ])
            .map_err(|err| match err {
                ureq::Error::Status(status, _) => {
                    ProviderError::Rejected(format!("token endpoint status {status}"))
                }
                other => ProviderError::Transport(other.to_string()),
            })?
            .into_json()
            .map_err(|err| ProviderError::Decode(err.to_string()))?;

        let info: UserInfo = self
            .agent
            .get(GOOGLE_USERINFO_URL)
            .set("Authorization", &format!("Bearer {}", token.access_token))
            .call()
            .map_err(|err| ProviderError::Transport(err.to_string()))?
            .into_json()
            .map_err(|err| ProviderError::Decode(err.to_string()))?;

        if !info.email_verified {
            return Err(ProviderError::UnverifiedEmail);
        }
        Ok(IdentityClaim::new(
            info.email.unwrap_or_default(),
            info.hd.unwrap_or_default(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(hd: Option<&str>) -> GoogleIdentityProvider {
        GoogleIdentityProvider::new(
            "cid.apps.googleusercontent.com",
            "secret",
            hd.map(str::to_string),
            Duration::from_millis(500),
        )
    }

    #[test]
    fn at_provider_01_authorize_url_carries_oauth_params() {
        let url = provider(Some("choate.edu"))
            .authorize_url("st4te", "http://localhost:8000/backend/auth")
            .unwrap();
        let parsed = url::Url::parse(&url).unwrap();
        assert_eq!(parsed.host_str(), Some("accounts.google.com"));
        let pairs: std::collections::BTreeMap<String, String> =
            parsed.query_pairs().into_owned().collect();
        assert_eq!(pairs["client_id"], "cid.apps.googleusercontent.com");
        assert_eq!(pairs["redirect_uri"], "http://localhost:8000/backend/auth");
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["scope"], "openid email profile");
        assert_eq!(pairs["state"], "st4te");
        assert_eq!(pairs["hd"], "choate.edu");
    }

    #[test]
    fn at_provider_02_hosted_domain_hint_is_optional() {
        let url = provider(None).authorize_url("s", "http://x/cb").unwrap();
        assert!(!url.contains("hd="));
    }

    #[test]
    fn at_provider_03_userinfo_without_hd_maps_to_empty_hint() {
        let info: UserInfo =
            serde_json::from_str(r#"{"email":"a@gmail.com","email_verified":true}"#).unwrap();
        assert!(info.email_verified);
        assert_eq!(info.hd, None);
        assert_eq!(info.email.as_deref(), Some("a@gmail.com"));
    }
}
