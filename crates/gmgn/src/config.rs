//! Client configuration.
//!
//! Everything the client sends during the upgrade handshake lives here.
//! Random identifiers are generated once, when the config is built, and
//! stay fixed for the client's lifetime so that reconnects present the
//! same device to the server.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use gmgn_dispatch::{DEFAULT_IDLE_TIMEOUT, UnexpectedFramePolicy};
use gmgn_transport::{ConnectRequest, TransportError};
use uuid::Uuid;

use crate::GmgnError;

/// Default feed endpoint.
pub const DEFAULT_ENDPOINT: &str = "wss://gmgn.ai/ws";

/// Browser user agent presented by default.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36 OPR/126.0.0.0";

/// Web app build the client identifies as.
pub const DEFAULT_APP_VERSION: &str = "20260202-10623-98faccb";

const ORIGIN: &str = "https://gmgn.ai";

/// Environment variable overriding [`ClientConfig::endpoint_url`].
pub const ENV_WS_URL: &str = "GMGN_WS_URL";
/// Environment variable overriding [`ClientConfig::user_agent`].
pub const ENV_USER_AGENT: &str = "GMGN_USER_AGENT";
/// Environment variable supplying [`ClientConfig::credential`].
pub const ENV_ACCESS_TOKEN: &str = "GMGN_ACCESS_TOKEN";

/// Configuration for a [`GmgnClient`](crate::GmgnClient).
#[derive(Clone)]
pub struct ClientConfig {
    /// Feed endpoint, `ws://` or `wss://`.
    pub endpoint_url: String,
    /// Device identifier (UUID v4).
    pub device_id: String,
    /// Fingerprint device identifier (32 hex chars).
    pub fp_did: String,
    /// Local client identifier, used in logs.
    pub client_id: String,
    /// Session identifier sent as the `uuid` query parameter (16 hex chars).
    pub user_uuid: String,
    /// `User-Agent` header value.
    pub user_agent: String,
    /// Access token for credential-gated channels.
    pub credential: Option<String>,
    /// Whether a dropped connection is re-opened automatically.
    pub auto_reconnect: bool,
    /// How many reconnect attempts to make before giving up.
    pub max_reconnect_attempts: u32,
    /// Delay before the first reconnect attempt; doubles per attempt.
    pub base_reconnect_delay: Duration,
    /// Cookies sent in the `Cookie` header, in key order.
    pub cookies: BTreeMap<String, String>,
    /// Web app version (`app_ver`, and part of the `client_id` param).
    pub app_version: String,
    /// `tz_name` query parameter.
    pub timezone_name: String,
    /// `tz_offset` query parameter, seconds east of UTC.
    pub timezone_offset: String,
    /// `app_lang` query parameter.
    pub app_lang: String,
    /// `Accept-Language` header value.
    pub accept_language: String,
    /// How often an idle listener re-checks whether the connection is
    /// still alive.
    pub listen_idle_timeout: Duration,
    /// What to do with non-object frames.
    pub unexpected_frame_policy: UnexpectedFramePolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let session = Uuid::new_v4().simple().to_string();
        Self {
            endpoint_url: DEFAULT_ENDPOINT.to_owned(),
            device_id: Uuid::new_v4().to_string(),
            fp_did: Uuid::new_v4().simple().to_string(),
            client_id: format!("gmgn_rust_{}", &session[..8]),
            user_uuid: session[..16].to_owned(),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            credential: None,
            auto_reconnect: true,
            max_reconnect_attempts: 5,
            base_reconnect_delay: Duration::from_secs(5),
            cookies: BTreeMap::new(),
            app_version: DEFAULT_APP_VERSION.to_owned(),
            timezone_name: "Europe/Paris".to_owned(),
            timezone_offset: "3600".to_owned(),
            app_lang: "en-US".to_owned(),
            accept_language: "fr-FR,fr;q=0.9,en-US;q=0.8,en;q=0.7".to_owned(),
            listen_idle_timeout: DEFAULT_IDLE_TIMEOUT,
            unexpected_frame_policy: UnexpectedFramePolicy::Drop,
        }
    }
}

impl ClientConfig {
    /// Defaults, overridden by `GMGN_WS_URL`, `GMGN_USER_AGENT` and
    /// `GMGN_ACCESS_TOKEN` when set and non-empty.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let mut config = Self::default();
        if let Some(url) = var(ENV_WS_URL) {
            config.endpoint_url = url;
        }
        if let Some(agent) = var(ENV_USER_AGENT) {
            config.user_agent = agent;
        }
        config.credential = var(ENV_ACCESS_TOKEN);
        config
    }

    /// Checks the settings the client cannot work without.
    ///
    /// # Errors
    /// Returns [`GmgnError::Config`] naming the offending setting.
    pub fn validate(&self) -> Result<(), GmgnError> {
        ConnectRequest::new(&self.endpoint_url)
            .map_err(|e| GmgnError::Config(format!("endpoint_url: {e}")))?;
        if self.listen_idle_timeout.is_zero() {
            return Err(GmgnError::Config("listen_idle_timeout must be non-zero".into()));
        }
        Ok(())
    }

    /// The `Cookie` header value, `k1=v1; k2=v2`, or `None` without
    /// cookies.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        let pairs: Vec<String> = self
            .cookies
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        Some(pairs.join("; "))
    }

    /// Builds the upgrade request for one connection attempt.
    ///
    /// `reconnect` is `true` when the reconnect procedure opens the
    /// connection; it sets the `reconnect` query parameter.
    ///
    /// # Errors
    /// Returns [`TransportError::InvalidRequest`] if the endpoint is not a
    /// WebSocket URL.
    pub fn connect_request(&self, reconnect: bool) -> Result<ConnectRequest, TransportError> {
        let client_id = format!("gmgn_web_{}", self.app_version);
        let mut request = ConnectRequest::new(&self.endpoint_url)?
            .query("device_id", &self.device_id)
            .query("fp_did", &self.fp_did)
            .query("client_id", &client_id)
            .query("from_app", "gmgn")
            .query("app_ver", &self.app_version)
            .query("tz_name", &self.timezone_name)
            .query("tz_offset", &self.timezone_offset)
            .query("app_lang", &self.app_lang)
            .query("os", "web")
            .query("worker", "0")
            .query("uuid", &self.user_uuid)
            .query("reconnect", if reconnect { "1" } else { "0" })
            .header("User-Agent", &self.user_agent)
            .header("Origin", ORIGIN)
            .header("Cache-Control", "no-cache")
            .header("Pragma", "no-cache")
            .header("Accept-Language", &self.accept_language);
        if let Some(cookie) = self.cookie_header() {
            request = request.header("Cookie", &cookie);
        }
        Ok(request)
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("endpoint_url", &self.endpoint_url)
            .field("device_id", &self.device_id)
            .field("client_id", &self.client_id)
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .field("auto_reconnect", &self.auto_reconnect)
            .field("max_reconnect_attempts", &self.max_reconnect_attempts)
            .field("base_reconnect_delay", &self.base_reconnect_delay)
            .field("cookies", &self.cookies.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
