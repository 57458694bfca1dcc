use super::clock::Clock;
use crate::api::Envelope;
use crate::error::{Result, WeixinError};
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::{fmt, sync::Arc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

/// The token endpoint, relative to the API base.
const TOKEN_PATH: &str = "gettoken";

/// Seconds shaved off the advertised lifetime so that a token is never
/// presented right at the edge of its expiry.
pub const EXPIRY_MARGIN_SECS: i64 = 5;

/// A cached access token and the moment it stops being usable.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    /// No token yet, expiring immediately.
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self::new(String::new(), now)
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_empty(&self) -> bool {
        self.token.is_empty()
    }

    /// A token may be used only if we have one and it expires strictly after `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_empty() && self.expires_at > now
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &if self.is_empty() { "" } else { "[REDACTED]" })
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// The token endpoint's payload. Both fields are absent on failure.
#[derive(Deserialize)]
struct TokenPayload {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    expires_in: i64,
}

/// Obtains access tokens with the corporate credentials and caches them
/// until they expire.
///
/// The cache is locked for the whole check-and-refresh, so concurrent
/// callers wait on a single in-flight refresh instead of racing it.
pub struct CredentialManager {
    http: reqwest::Client,
    token_url: Url,
    corp_id: String,
    corp_secret: SecretString,
    clock: Arc<dyn Clock>,
    cached: Mutex<AccessToken>,
}

impl CredentialManager {
    pub fn new(
        http: reqwest::Client,
        base_url: &Url,
        corp_id: String,
        corp_secret: SecretString,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let token_url = base_url.join(TOKEN_PATH)?;
        let cached = Mutex::new(AccessToken::empty(clock.now()));
        Ok(Self {
            http,
            token_url,
            corp_id,
            corp_secret,
            clock,
            cached,
        })
    }

    /// Returns a usable access token, requesting a new one only if the
    /// cached token is missing or expired.
    ///
    /// A failed refresh leaves the cache exactly as it was.
    pub async fn access_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        let now = self.clock.now();
        if cached.is_valid_at(now) {
            debug!(expires_at = %cached.expires_at, "using cached access token");
            return Ok(cached.token.clone());
        }

        let refreshed = self.request_token(now).await?;
        let token = refreshed.token.clone();
        *cached = refreshed;
        Ok(token)
    }

    /// Forgets the cached token; the next call will request a new one.
    pub async fn invalidate(&self) {
        debug!("discarding cached access token");
        *self.cached.lock().await = AccessToken::empty(self.clock.now());
    }

    /// A snapshot of what is currently cached.
    pub async fn cached(&self) -> AccessToken {
        self.cached.lock().await.clone()
    }

    async fn request_token(&self, now: DateTime<Utc>) -> Result<AccessToken> {
        debug!(corp_id = %self.corp_id, "requesting access token");
        let response = self
            .http
            .get(self.token_url.clone())
            .query(&[
                ("corpid", self.corp_id.as_str()),
                ("corpsecret", self.corp_secret.expose_secret()),
            ])
            .send()
            .await?;

        let body = response.text().await?;
        let envelope: Envelope<TokenPayload> = serde_json::from_str(&body)?;
        let payload = match envelope.into_result() {
            Ok(payload) => payload,
            Err(err) => {
                warn!(corp_id = %self.corp_id, %err, "access token request rejected");
                return Err(err);
            }
        };

        let expires_at = Duration::try_seconds(payload.expires_in.saturating_sub(EXPIRY_MARGIN_SECS))
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| {
                WeixinError::InvalidResponse(format!(
                    "access token lifetime out of range: expires_in = {}",
                    payload.expires_in
                ))
            })?;
        info!(expires_in = payload.expires_in, %expires_at, "obtained access token");
        Ok(AccessToken::new(payload.access_token, expires_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ManualClock;
    use chrono::TimeZone;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn manager_for(server: &MockServer, clock: Arc<ManualClock>) -> CredentialManager {
        let base = Url::parse(&format!("{}/cgi-bin/", server.uri())).unwrap();
        CredentialManager::new(
            reqwest::Client::new(),
            &base,
            "corp".to_string(),
            SecretString::from("secret".to_string()),
            clock,
        )
        .unwrap()
    }

    fn token_response(token: &str, expires_in: i64) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "errcode": 0,
            "errmsg": "ok",
            "access_token": token,
            "expires_in": expires_in
        }))
    }

    #[test]
    fn validity_is_strict_at_expiry() {
        let now = start();
        assert!(!AccessToken::empty(now).is_valid_at(now));
        assert!(!AccessToken::new("t", now).is_valid_at(now));
        assert!(!AccessToken::new("t", now - Duration::seconds(1)).is_valid_at(now));
        assert!(AccessToken::new("t", now + Duration::seconds(1)).is_valid_at(now));
        assert!(!AccessToken::new("", now + Duration::seconds(60)).is_valid_at(now));
    }

    #[test]
    fn debug_redacts_token() {
        let token = AccessToken::new("very-secret-token", start());
        assert!(!format!("{token:?}").contains("very-secret-token"));
    }

    #[tokio::test]
    async fn cached_token_skips_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cgi-bin/gettoken"))
            .respond_with(token_response("fresh", 7200))
            .expect(0)
            .mount(&server)
            .await;

        let clock = Arc::new(ManualClock::new(start()));
        let manager = manager_for(&server, clock);
        *manager.cached.lock().await = AccessToken::new("cached", start() + Duration::seconds(60));

        assert_eq!(manager.access_token().await.unwrap(), "cached");
    }

    #[tokio::test]
    async fn token_expiring_now_is_refreshed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cgi-bin/gettoken"))
            .respond_with(token_response("fresh", 7200))
            .expect(1)
            .mount(&server)
            .await;

        let clock = Arc::new(ManualClock::new(start()));
        let manager = manager_for(&server, clock);
        *manager.cached.lock().await = AccessToken::new("stale", start());

        assert_eq!(manager.access_token().await.unwrap(), "fresh");
    }

    #[tokio::test]
    async fn refresh_sends_corp_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cgi-bin/gettoken"))
            .and(query_param("corpid", "corp"))
            .and(query_param("corpsecret", "secret"))
            .respond_with(token_response("fresh", 7200))
            .expect(1)
            .mount(&server)
            .await;

        let manager = manager_for(&server, Arc::new(ManualClock::new(start())));
        assert_eq!(manager.access_token().await.unwrap(), "fresh");
    }

    #[tokio::test]
    async fn expiry_keeps_safety_margin() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cgi-bin/gettoken"))
            .respond_with(token_response("fresh", 300))
            .mount(&server)
            .await;

        let manager = manager_for(&server, Arc::new(ManualClock::new(start())));
        manager.access_token().await.unwrap();

        let cached = manager.cached().await;
        assert_eq!(cached.token(), "fresh");
        assert_eq!(cached.expires_at(), start() + Duration::seconds(295));
    }

    #[tokio::test]
    async fn out_of_range_lifetime_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cgi-bin/gettoken"))
            .respond_with(token_response("fresh", 9_000_000_000_000_000_000))
            .mount(&server)
            .await;

        let manager = manager_for(&server, Arc::new(ManualClock::new(start())));
        let stale = AccessToken::new("stale", start() - Duration::seconds(10));
        *manager.cached.lock().await = stale.clone();

        assert!(matches!(
            manager.access_token().await,
            Err(WeixinError::InvalidResponse(_))
        ));
        assert_eq!(manager.cached().await, stale);
    }

    #[tokio::test]
    async fn rejected_refresh_leaves_cache_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cgi-bin/gettoken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errcode": 40001,
                "errmsg": "invalid credential"
            })))
            .mount(&server)
            .await;

        let manager = manager_for(&server, Arc::new(ManualClock::new(start())));
        let stale = AccessToken::new("stale", start() - Duration::seconds(10));
        *manager.cached.lock().await = stale.clone();

        match manager.access_token().await {
            Err(WeixinError::Api { code, message }) => {
                assert_eq!(code, 40001);
                assert_eq!(message, "invalid credential");
            }
            other => panic!("expected api error, got {other:?}"),
        }
        assert_eq!(manager.cached().await, stale);
    }

    #[tokio::test]
    async fn unparseable_token_response_is_a_json_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cgi-bin/gettoken"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
            .mount(&server)
            .await;

        let manager = manager_for(&server, Arc::new(ManualClock::new(start())));
        assert!(matches!(
            manager.access_token().await,
            Err(WeixinError::Json(_))
        ));
        assert!(manager.cached().await.is_empty());
    }

    #[tokio::test]
    async fn invalidate_forces_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cgi-bin/gettoken"))
            .respond_with(token_response("fresh", 7200))
            .expect(2)
            .mount(&server)
            .await;

        let manager = manager_for(&server, Arc::new(ManualClock::new(start())));
        manager.access_token().await.unwrap();
        manager.access_token().await.unwrap();
        manager.invalidate().await;
        assert!(manager.cached().await.is_empty());
        manager.access_token().await.unwrap();
    }
}
