//! Error types for the push channel, the RPC engine and the client lifecycle.

use std::fmt;

use crate::channel::ChannelError;
use crate::codec::DecodeError;
use crate::http::FetchError;

/// Boxed cause carried by a [`NetworkError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Status reported when a failure happened beneath the protocol layer
/// (connectivity, malformed body) and no server status is available.
pub const STATUS_UNAVAILABLE: i64 = 0;

/// Normalized failure of an authenticated request.
///
/// `status` is the protocol response status for rejected requests, the HTTP
/// status code for non-success HTTP replies, and [`STATUS_UNAVAILABLE`] when
/// the request never produced a usable reply.
#[derive(Debug)]
pub struct NetworkError {
    pub status: i64,
    pub description: String,
    cause: Option<BoxError>,
}

impl NetworkError {
    /// A request the server answered with a non-OK response status.
    pub fn status(status: i64, description: impl Into<String>) -> Self {
        Self {
            status,
            description: description.into(),
            cause: None,
        }
    }

    /// A failure below the protocol layer, keeping the underlying error as source.
    pub fn transport(
        status: i64,
        description: impl Into<String>,
        cause: impl Into<BoxError>,
    ) -> Self {
        Self {
            status,
            description: description.into(),
            cause: Some(cause.into()),
        }
    }

    /// A reply that arrived but could not be decoded.
    pub fn malformed(endpoint: &str, cause: DecodeError) -> Self {
        Self::transport(
            STATUS_UNAVAILABLE,
            format!("malformed response from {endpoint}"),
            cause,
        )
    }

    pub fn is_transport(&self) -> bool {
        self.cause.is_some()
    }
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "request failed with status {}: '{}'",
            self.status, self.description
        )
    }
}

impl std::error::Error for NetworkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

impl From<FetchError> for NetworkError {
    fn from(err: FetchError) -> Self {
        let status = match &err {
            FetchError::Status { status, .. } => i64::from(*status),
            _ => STATUS_UNAVAILABLE,
        };
        let description = err.to_string();
        Self::transport(status, description, err)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Required authentication material is absent. Raised before any I/O.
    #[error("cookie '{0}' is required")]
    MissingCookie(String),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("push channel failed: {0}")]
    Channel(#[from] ChannelError),

    #[error("push channel stopped delivering events")]
    ChannelClosed,

    /// The channel service subscription could not be sent; the connection is
    /// nominally alive but will never deliver events.
    #[error("channel subscription for client id {client_id} failed: {source}")]
    SubscriptionLost {
        client_id: String,
        #[source]
        source: ChannelError,
    },

    #[error("client is already connected")]
    AlreadyConnected,

    #[error("client is not connected")]
    NotConnected,
}

impl ClientError {
    pub fn error_code(&self) -> &str {
        match self {
            Self::MissingCookie(_) => "missing_cookie",
            Self::Network(_) => "network",
            Self::Channel(_) => "channel",
            Self::ChannelClosed => "channel_closed",
            Self::SubscriptionLost { .. } => "subscription_lost",
            Self::AlreadyConnected => "already_connected",
            Self::NotConnected => "not_connected",
        }
    }

    /// True for failures caused by missing local configuration rather than the network.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::MissingCookie(_))
    }

    /// The normalized network failure, if this is one.
    pub fn as_network(&self) -> Option<&NetworkError> {
        match self {
            Self::Network(err) => Some(err),
            _ => None,
        }
    }
}
