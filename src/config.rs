use crate::error::{Result, WeixinError};
use secrecy::SecretString;
use std::time::Duration;
use url::Url;

/// The public WeChat Work API root. Every endpoint hangs off of this.
pub const DEFAULT_API_BASE: &str = "https://qyapi.weixin.qq.com/cgi-bin/";

/// Applied to every HTTP request unless overridden.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const ENV_CORP_ID: &str = "WEIXIN_CORP_ID";
const ENV_CORP_SECRET: &str = "WEIXIN_CORP_SECRET";
const ENV_API_BASE: &str = "WEIXIN_API_BASE";
const ENV_TIMEOUT_SECS: &str = "WEIXIN_TIMEOUT_SECS";

/// Settings a [`Client`](crate::Client) is built from.
///
/// The corporate secret is kept behind [`SecretString`] so that it never
/// shows up in `Debug` output or logs.
#[derive(Debug)]
pub struct ClientConfig {
    /// Identifies the company ("My Company" -> "Company Info" in the admin console).
    pub corp_id: String,
    /// Per-application secret. Each application obtains its own tokens.
    pub corp_secret: SecretString,
    /// Root all API paths are resolved against.
    pub api_base: String,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(corp_id: impl Into<String>, corp_secret: impl Into<String>) -> Self {
        Self {
            corp_id: corp_id.into(),
            corp_secret: SecretString::from(corp_secret.into()),
            api_base: DEFAULT_API_BASE.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Points the client somewhere other than the public API, e.g. a mock server.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Loads configuration from `WEIXIN_CORP_ID`, `WEIXIN_CORP_SECRET`,
    /// and optionally `WEIXIN_API_BASE` and `WEIXIN_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| WeixinError::Config(format!("{key} must be set")))
        };

        let mut config = Self::new(required(ENV_CORP_ID)?, required(ENV_CORP_SECRET)?);
        if let Some(api_base) = lookup(ENV_API_BASE) {
            config = config.with_api_base(api_base);
        }
        if let Some(timeout) = lookup(ENV_TIMEOUT_SECS) {
            let secs = timeout.parse::<u64>().map_err(|_| {
                WeixinError::Config(format!("{ENV_TIMEOUT_SECS} must be a whole number of seconds"))
            })?;
            config = config.with_timeout(Duration::from_secs(secs));
        }
        Ok(config)
    }

    /// Parses the API base, making sure relative paths join beneath it.
    pub(crate) fn base_url(&self) -> Result<Url> {
        let mut base = self.api_base.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        Ok(Url::parse(&base)?)
    }
}
