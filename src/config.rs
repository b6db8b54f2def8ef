use serde::Deserialize;

const DEFAULT_BASE_URL: &str = "https://open.feishu.cn/open-apis";

/// Application credentials and endpoint configuration.
///
/// Constructed explicitly or from the `appId` / `appSecret` environment
/// variables. The secret must be kept out of logs and source control.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app_id: String,
    pub app_secret: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

impl Config {
    pub fn new(app_id: impl Into<String>, app_secret: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            app_secret: app_secret.into(),
            base_url: default_base_url(),
        }
    }

    /// Reads `appId` and `appSecret` from the process environment.
    /// Missing variables yield empty fields; authenticated calls then
    /// abort before touching the network.
    pub fn from_env() -> Self {
        Self {
            app_id: std::env::var("appId").unwrap_or_default(),
            app_secret: std::env::var("appSecret").unwrap_or_default(),
            base_url: default_base_url(),
        }
    }

    /// Points the client at a different API origin, e.g. a mock server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// The (id, secret) pair, or `None` when either field is empty.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        if self.app_id.is_empty() || self.app_secret.is_empty() {
            None
        } else {
            Some((&self.app_id, &self.app_secret))
        }
    }
}
