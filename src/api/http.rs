use super::{FeedApi, FeedError};
use crate::feed::{FullItem, ItemId, PreviewItem};
use async_trait::async_trait;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
pub const MAX_RESPONSE_SIZE: usize = 5 * 1024 * 1024; // 5MB

#[derive(Deserialize)]
struct ItemsEnvelope<T> {
    items: Vec<T>,
}

#[derive(Deserialize)]
struct ItemEnvelope {
    item: FullItem,
}

/// JSON-over-HTTP implementation of [`FeedApi`].
///
/// Endpoints, relative to the base URL:
///
/// - `GET feed?limit=&offset=&lightweight=true` → `{"items": [preview…]}`
/// - `GET feed?limit=&offset=` → `{"items": [full…]}`
/// - `GET feed/preload?offset=&batch_size=` → `{"items": [full…]}`
/// - `GET items/{id}` → `{"item": full}`
pub struct HttpFeedApi {
    client: reqwest::Client,
    base: Url,
    token: Option<SecretString>,
    timeout: Duration,
}

impl std::fmt::Debug for HttpFeedApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpFeedApi")
            .field("base", &self.base.as_str())
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl HttpFeedApi {
    /// Creates a client for the API rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// - [`FeedError::InvalidUrl`] if the URL does not parse or cannot carry a path
    /// - [`FeedError::InsecureBaseUrl`] for plain HTTP to anything but localhost
    pub fn new(client: reqwest::Client, base_url: &str) -> Result<Self, FeedError> {
        let base = validate_base_url(base_url)?;
        Ok(Self {
            client,
            base,
            token: None,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    pub fn with_token(mut self, token: Option<SecretString>) -> Self {
        self.token = token;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, FeedError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| FeedError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, FeedError> {
        let mut request = self.client.get(url.clone());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        tracing::trace!(url = %url, "GET");
        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| FeedError::Timeout)?
            .map_err(FeedError::Network)?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(url = %url, status = status.as_u16(), "API request failed");
            return Err(FeedError::Server(status.as_u16()));
        }

        let body = read_limited_body(response, MAX_RESPONSE_SIZE).await?;
        serde_json::from_slice(&body).map_err(|e| FeedError::Decode(e.to_string()))
    }

    async fn list<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<Vec<T>, FeedError> {
        let mut url = self.endpoint(segments)?;
        url.query_pairs_mut()
            .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        let envelope: ItemsEnvelope<T> = self.get_json(url).await?;
        Ok(envelope.items)
    }
}

#[async_trait]
impl FeedApi for HttpFeedApi {
    async fn lightweight_batch(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PreviewItem>, FeedError> {
        self.list(
            &["feed"],
            &[
                ("limit", limit.to_string()),
                ("offset", offset.to_string()),
                ("lightweight", "true".to_string()),
            ],
        )
        .await
    }

    async fn full_batch(&self, limit: usize, offset: usize) -> Result<Vec<FullItem>, FeedError> {
        self.list(
            &["feed"],
            &[
                ("limit", limit.to_string()),
                ("offset", offset.to_string()),
            ],
        )
        .await
    }

    async fn preload_batch(
        &self,
        offset: usize,
        batch_size: usize,
    ) -> Result<Vec<FullItem>, FeedError> {
        self.list(
            &["feed", "preload"],
            &[
                ("offset", offset.to_string()),
                ("batch_size", batch_size.to_string()),
            ],
        )
        .await
    }

    async fn item_detail(&self, id: &ItemId) -> Result<FullItem, FeedError> {
        let url = self.endpoint(&["items", id.as_str()])?;
        match self.get_json::<ItemEnvelope>(url).await {
            Ok(envelope) => Ok(envelope.item),
            Err(FeedError::Server(404)) => Err(FeedError::NotFound(id.clone())),
            Err(e) => Err(e),
        }
    }
}

/// Parses the API base URL, requiring HTTPS except for loopback hosts.
fn validate_base_url(base_url: &str) -> Result<Url, FeedError> {
    let url = Url::parse(base_url).map_err(|e| FeedError::InvalidUrl(e.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(FeedError::InvalidUrl(base_url.to_string()));
    }

    match url.scheme() {
        "https" => Ok(url),
        "http" => {
            let is_loopback = matches!(url.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"));
            if is_loopback {
                tracing::warn!(base_url = %url, "Using non-HTTPS API base URL (localhost only)");
                Ok(url)
            } else {
                tracing::error!(base_url = %url, "Rejecting non-HTTPS API base URL");
                Err(FeedError::InsecureBaseUrl)
            }
        }
        other => Err(FeedError::InvalidUrl(format!("unsupported scheme: {other}"))),
    }
}

async fn read_limited_body(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FeedError> {
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FeedError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FeedError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FeedError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}
