//! Authenticated POST primitive used by the RPC engine and the image upload.
//!
//! [`HttpFetch`] is the seam tests replace with a recording double;
//! [`ReqwestFetch`] is the production implementation.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One POST request, fully assembled by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub cookies: Vec<(String, String)>,
    pub params: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl FetchRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// A successful (2xx) reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait HttpFetch: Send + Sync {
    /// Send `request`. Non-2xx replies are reported as [`FetchError::Status`].
    async fn post(&self, request: FetchRequest) -> Result<FetchResponse, FetchError>;
}

/// [`reqwest`]-backed [`HttpFetch`].
#[derive(Debug, Clone)]
pub struct ReqwestFetch {
    inner: reqwest::Client,
}

impl ReqwestFetch {
    pub fn new(proxy: Option<&str>) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder().timeout(REQUEST_TIMEOUT);
        if let Some(proxy) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }
        Ok(Self {
            inner: builder.build()?,
        })
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetch {
    async fn post(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        let mut builder = self.inner.post(&request.url).query(&request.params);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.cookies.is_empty() {
            let cookie = request
                .cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; ");
            builder = builder.header(reqwest::header::COOKIE, cookie);
        }

        let resp = builder.body(request.body).send().await?;
        let status = resp.status();
        let body = resp.bytes().await?.to_vec();
        debug!(url = %request.url, status = status.as_u16(), bytes = body.len(), "fetch complete");

        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        Ok(FetchResponse {
            status: status.as_u16(),
            body,
        })
    }
}
