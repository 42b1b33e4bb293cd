//! RPC engine: header attachment, authenticated POST, decode and status check.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::codec::{self, StructuredList};
use crate::config::ClientConfig;
use crate::cookies::{self, Cookies};
use crate::error::{ClientError, NetworkError, STATUS_UNAVAILABLE};
use crate::http::{FetchRequest, FetchResponse, HttpFetch};
use crate::ids::{IdSource, RandomIds};
use crate::schema::ApiResponse;
use crate::session::{RequestHeader, SharedSession};

/// Content type of structured-list request bodies.
pub const PROTOBUF_JSON: &str = "application/json+protobuf";

/// Authenticated access to the chat API.
///
/// Cloning is cheap; clones share cookies, transport, id source and session.
#[derive(Clone)]
pub struct ChatApi {
    cookies: Arc<Cookies>,
    http: Arc<dyn HttpFetch>,
    ids: Arc<dyn IdSource>,
    session: SharedSession,
    api_base_url: String,
    origin_url: String,
    pub(crate) upload_url: String,
}

impl fmt::Debug for ChatApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatApi")
            .field("api_base_url", &self.api_base_url)
            .field("origin_url", &self.origin_url)
            .finish_non_exhaustive()
    }
}

impl ChatApi {
    pub fn new(
        cookies: Cookies,
        http: Arc<dyn HttpFetch>,
        session: SharedSession,
        config: &ClientConfig,
    ) -> Self {
        Self {
            cookies: Arc::new(cookies),
            http,
            ids: Arc::new(RandomIds),
            session,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            origin_url: config.origin_url.clone(),
            upload_url: config.upload_url.clone(),
        }
    }

    /// Replace the source of client-generated ids.
    pub fn with_id_source(mut self, ids: Arc<dyn IdSource>) -> Self {
        self.ids = ids;
        self
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    /// Header snapshot for a request being built now.
    pub async fn request_header(&self) -> RequestHeader {
        self.session.lock().await.request_header()
    }

    pub fn client_generated_id(&self) -> u64 {
        self.ids.next_id()
    }

    /// Send a structured-list request and decode its status-checked response.
    pub async fn request<Req, Resp>(
        &self,
        endpoint: &str,
        request: &Req,
    ) -> Result<Resp, ClientError>
    where
        Req: StructuredList + ?Sized,
        Resp: ApiResponse,
    {
        let url = format!("{}/{}", self.api_base_url, endpoint);
        let body = serde_json::to_vec(&request.encode()).map_err(|e| {
            NetworkError::transport(STATUS_UNAVAILABLE, format!("cannot encode {endpoint}"), e)
        })?;
        debug!(endpoint = %endpoint, bytes = body.len(), "sending request");

        let res = self.base_request(&url, PROTOBUF_JSON, "protojson", body).await?;

        let response = codec::parse_body(&res.body)
            .and_then(|value| Resp::decode_container(&value))
            .map_err(|e| NetworkError::malformed(endpoint, e))?;

        let header = response.response_header();
        if !header.is_ok() {
            let description = header.error_description.clone().unwrap_or_default();
            warn!(
                endpoint = %endpoint,
                status = header.status,
                description = %description,
                "request rejected"
            );
            return Err(NetworkError::status(header.status, description).into());
        }
        debug!(endpoint = %endpoint, "request succeeded");
        Ok(response)
    }

    /// Generic authenticated POST.
    ///
    /// `response_type` selects the reply representation (`json` or `protojson`).
    /// Missing cookies fail here, before anything reaches the transport.
    pub async fn base_request(
        &self,
        url: &str,
        content_type: &str,
        response_type: &str,
        body: Vec<u8>,
    ) -> Result<FetchResponse, ClientError> {
        let sapisid = self.cookies.get("SAPISID")?;
        let cookies = self.cookies.required()?;

        let now_ms = chrono::Utc::now().timestamp_millis();
        let mut headers = cookies::authorization_headers(sapisid, &self.origin_url, now_ms);
        headers.push(("content-type".to_string(), content_type.to_string()));

        let request = FetchRequest {
            url: url.to_string(),
            headers,
            cookies,
            params: vec![("alt".to_string(), response_type.to_string())],
            body,
        };
        self.http
            .post(request)
            .await
            .map_err(|e| ClientError::Network(e.into()))
    }
}
