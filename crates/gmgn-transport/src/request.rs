//! Connection request: where to connect and what to present.

use url::Url;

use crate::TransportError;

/// Everything a [`Connector`](crate::Connector) needs to open a
/// connection: the endpoint URL (query parameters included) and the
/// extra HTTP headers sent with the upgrade request.
///
/// Built with chained calls:
///
/// ```rust
/// use gmgn_transport::ConnectRequest;
///
/// let request = ConnectRequest::new("wss://gmgn.ai/ws")
///     .unwrap()
///     .query("device_id", "abc")
///     .query("os", "web")
///     .header("Origin", "https://gmgn.ai");
///
/// assert_eq!(request.url().as_str(), "wss://gmgn.ai/ws?device_id=abc&os=web");
/// assert_eq!(request.header_value("origin"), Some("https://gmgn.ai"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    url: Url,
    headers: Vec<(String, String)>,
}

impl ConnectRequest {
    /// Parses `endpoint` as a `ws://` or `wss://` URL.
    ///
    /// # Errors
    /// Returns [`TransportError::InvalidRequest`] if the URL does not
    /// parse or uses another scheme.
    pub fn new(endpoint: &str) -> Result<Self, TransportError> {
        let url = Url::parse(endpoint).map_err(|e| {
            TransportError::InvalidRequest(format!(
                "invalid endpoint {endpoint:?}: {e}"
            ))
        })?;

        match url.scheme() {
            "ws" | "wss" => Ok(Self {
                url,
                headers: Vec::new(),
            }),
            other => Err(TransportError::InvalidRequest(format!(
                "unsupported scheme {other:?} (expected ws or wss)"
            ))),
        }
    }

    /// Appends a form-encoded query parameter. Order is preserved.
    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.url.query_pairs_mut().append_pair(key, value);
        self
    }

    /// Adds a header. A later header with the same name replaces the
    /// earlier one (names compare case-insensitively).
    pub fn header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        let name = name.into();
        self.headers
            .retain(|(existing, _)| !existing.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
        self
    }

    /// The full endpoint URL including query parameters.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Headers in insertion order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Looks up a header value by case-insensitive name.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Looks up the first query parameter named `key`.
    pub fn query_value(&self, key: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }
}
