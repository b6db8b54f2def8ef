use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{Error, Result};

/// Async client for the Lark/Feishu open-platform REST API.
///
/// Every authenticated operation fetches a fresh tenant access token first;
/// tokens are never cached or shared between two requests. Concurrent callers
/// are safe but each pays its own token round-trip.
#[derive(Debug, Clone)]
pub struct LarkClient {
    pub(crate) config: Config,
    pub(crate) http: reqwest::Client,
}

impl LarkClient {
    pub fn new(config: Config) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self { config, http }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Exchanges the app id and secret for a tenant access token.
    ///
    /// Returns `Ok(None)` without touching the network when either credential
    /// is empty; callers abort the dependent call in that case. The token is
    /// returned verbatim, with no expiry or format validation.
    pub async fn tenant_access_token(&self) -> Result<Option<String>> {
        let (app_id, app_secret) = match self.config.credentials() {
            Some(pair) => pair,
            None => {
                warn!("app id or secret is not configured, skipping token fetch");
                return Ok(None);
            }
        };

        #[derive(Serialize)]
        struct TokenRequest<'a> {
            app_id: &'a str,
            app_secret: &'a str,
        }

        #[derive(Deserialize)]
        struct TokenResponse {
            code: i64,
            msg: String,
            tenant_access_token: Option<String>,
        }

        let url = format!(
            "{}/auth/v3/tenant_access_token/internal",
            self.config.base_url
        );

        let response = self
            .http
            .post(&url)
            .json(&TokenRequest { app_id, app_secret })
            .send()
            .await
            .map_err(|e| Error::Network(format!("token request failed: {e}")))?;

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Decode(format!("token response: {e}")))?;

        if body.code != 0 {
            return Err(Error::Auth(body.msg));
        }

        let token = body
            .tenant_access_token
            .ok_or_else(|| Error::Decode("token response missing tenant_access_token".into()))?;

        debug!("fetched tenant access token");
        Ok(Some(token))
    }

    /// Like [`tenant_access_token`](Self::tenant_access_token), but turns an
    /// absent token into [`Error::MissingCredentials`].
    pub(crate) async fn require_token(&self) -> Result<String> {
        self.tenant_access_token()
            .await?
            .ok_or(Error::MissingCredentials)
    }

    /// One authenticated POST against an API path, unwrapping the standard
    /// `{code, msg, data}` envelope.
    pub(crate) async fn post_api<T, B>(&self, token: &str, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        let url = format!("{}{}", self.config.base_url, path);

        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {token}"))
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Network(format!("request to {path} failed: {e}")))?;

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| Error::Decode(format!("response from {path}: {e}")))?;

        if envelope.code != 0 {
            return Err(Error::Api {
                code: envelope.code,
                msg: envelope.msg,
            });
        }

        envelope
            .data
            .ok_or_else(|| Error::Decode(format!("response from {path} carried no data")))
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    msg: String,
    data: Option<T>,
}
