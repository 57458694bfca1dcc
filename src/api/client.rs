use super::envelope::Envelope;
use super::message::{Message, SendMessageResponse};
use crate::auth::{AccessToken, Clock, CredentialManager, SystemClock};
use crate::config::ClientConfig;
use crate::error::{Result, WeixinError};
use reqwest::header;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::{fmt, str::FromStr, sync::Arc};
use tracing::{debug, instrument, warn};
use url::Url;

/// Path of the application message endpoint.
pub const MESSAGE_SEND_PATH: &str = "message/send";

/// The verbs the API accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMethod {
    Get,
    Post,
}

impl RequestMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestMethod {
    type Err = WeixinError;

    fn from_str(method: &str) -> Result<Self> {
        if method.eq_ignore_ascii_case("GET") {
            Ok(Self::Get)
        } else if method.eq_ignore_ascii_case("POST") {
            Ok(Self::Post)
        } else {
            Err(WeixinError::UnsupportedMethod(method.to_string()))
        }
    }
}

impl From<RequestMethod> for reqwest::Method {
    fn from(method: RequestMethod) -> Self {
        match method {
            RequestMethod::Get => reqwest::Method::GET,
            RequestMethod::Post => reqwest::Method::POST,
        }
    }
}

/// A WeChat Work API client.
///
/// Access tokens are obtained lazily and shared across requests until
/// they expire. The client can be shared between tasks behind an `Arc`.
pub struct Client {
    http: reqwest::Client,
    base_url: Url,
    credentials: CredentialManager,
}

impl Client {
    /// Creates a client against the public API with default settings.
    pub fn new(corp_id: impl Into<String>, corp_secret: impl Into<String>) -> Result<Self> {
        Self::with_config(ClientConfig::new(corp_id, corp_secret))
    }

    pub fn with_config(config: ClientConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Like [`Client::with_config`], but token expiry is judged by `clock`.
    pub fn with_clock(config: ClientConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let base_url = config.base_url()?;
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        let credentials = CredentialManager::new(
            http.clone(),
            &base_url,
            config.corp_id,
            config.corp_secret,
            clock,
        )?;

        Ok(Self {
            http,
            base_url,
            credentials,
        })
    }

    /// Returns a valid access token, refreshing it if necessary.
    pub async fn access_token(&self) -> Result<String> {
        self.credentials.access_token().await
    }

    /// Drops the cached access token so the next request obtains a new one.
    pub async fn invalidate_access_token(&self) {
        self.credentials.invalidate().await
    }

    /// The access token currently held, valid or not.
    pub async fn cached_access_token(&self) -> AccessToken {
        self.credentials.cached().await
    }

    /// Calls `path` (relative to the API base) with the current access token.
    ///
    /// A non-empty `body` is sent as the JSON payload. On success the full
    /// decoded response body is returned; a nonzero `errcode` becomes
    /// [`WeixinError::Api`].
    #[instrument(skip(self, body))]
    pub async fn send(
        &self,
        path: &str,
        method: RequestMethod,
        body: Option<&[u8]>,
    ) -> Result<Value> {
        let url = self.resolve(path)?;
        let access_token = self.credentials.access_token().await?;
        debug!(%url, "sending api request");

        let mut request = self
            .http
            .request(method.into(), url)
            .query(&[("access_token", access_token.as_str())])
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(body) = body.filter(|body| !body.is_empty()) {
            request = request.body(body.to_vec());
        }

        let response = request.send().await?;
        let text = response.text().await?;
        let body: Value = serde_json::from_str(&text)?;
        if let Err(err) = Envelope::<Value>::deserialize(&body)?.into_result() {
            warn!(%err, "api request failed");
            return Err(err);
        }

        Ok(body)
    }

    /// Joins `path` onto the API base. The token is only ever sent beneath
    /// that base, so absolute URLs and `..` escapes are refused.
    fn resolve(&self, path: &str) -> Result<Url> {
        let url = self.base_url.join(path.strip_prefix('/').unwrap_or(path))?;
        if url.origin() != self.base_url.origin() || !url.path().starts_with(self.base_url.path()) {
            warn!(path, "refusing request outside the api base");
            return Err(WeixinError::PathOutsideBase(path.to_string()));
        }
        Ok(url)
    }

    /// Serializes `body`, calls `path`, and decodes the successful response as `R`.
    pub async fn send_json<B, R>(
        &self,
        path: &str,
        method: RequestMethod,
        body: Option<&B>,
    ) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let encoded = body.map(|body| serde_json::to_vec(body)).transpose()?;
        let response = self.send(path, method, encoded.as_deref()).await?;
        Ok(serde_json::from_value(response)?)
    }

    /// Sends an application message.
    pub async fn send_message(&self, message: &Message) -> Result<SendMessageResponse> {
        let body = serde_json::to_vec(message)?;
        let payload = self
            .send(MESSAGE_SEND_PATH, RequestMethod::Post, Some(body.as_slice()))
            .await?;

        // The message is already delivered at this point; a reply we can't
        // read must not turn into an error a caller might retry on.
        let response = match serde_json::from_value::<SendMessageResponse>(payload) {
            Ok(response) => response,
            Err(err) => {
                warn!(%err, "message sent but its response could not be decoded");
                SendMessageResponse::default()
            }
        };
        if !response.all_delivered() {
            warn!(
                invalid_user = %response.invalid_user,
                invalid_party = %response.invalid_party,
                invalid_tag = %response.invalid_tag,
                "message accepted with undeliverable recipients"
            );
        }
        Ok(response)
    }
}
