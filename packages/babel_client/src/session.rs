//! Per-connection session state shared by the dispatcher, heartbeat and RPC engine.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::codec::{FieldList, StructuredList};
use crate::config::ClientConfig;
use crate::schema::{
    ACTIVE_CLIENT_STATE_IS_ACTIVE, ACTIVE_CLIENT_STATE_NO_ACTIVE, ACTIVE_CLIENT_STATE_OTHER_ACTIVE,
};

/// Session handle shared between the receive loop and caller-issued requests.
pub type SharedSession = Arc<Mutex<Session>>;

/// Whether this client is the one the server routes notifications to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActiveState {
    #[default]
    Unknown,
    Active,
    Inactive,
}

impl ActiveState {
    /// Map the state reported in a state update header. An absent value is
    /// the wire default ("no active client"), so it counts as inactive, as
    /// does any value this client does not recognize.
    pub fn from_reported(value: Option<i64>) -> Self {
        match value {
            Some(ACTIVE_CLIENT_STATE_IS_ACTIVE) => Self::Active,
            None | Some(ACTIVE_CLIENT_STATE_NO_ACTIVE | ACTIVE_CLIENT_STATE_OTHER_ACTIVE) => {
                Self::Inactive
            }
            Some(unknown) => {
                debug!(
                    active_client_state = unknown,
                    "treating unknown active client state as inactive"
                );
                Self::Inactive
            }
        }
    }
}

/// Header attached to every request.
///
/// `resource` is omitted until the channel has assigned a client id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHeader {
    pub client_version: String,
    pub language_code: String,
    pub resource: Option<String>,
}

impl StructuredList for RequestHeader {
    fn to_fields(&self) -> FieldList {
        let client_version = FieldList::new().set(3, self.client_version.as_str());
        let client_identifier = self
            .resource
            .as_deref()
            .map(|resource| FieldList::new().set(1, resource));
        FieldList::new()
            .message(1, &client_version)
            .message_opt(2, client_identifier.as_ref())
            .set(4, self.language_code.as_str())
    }
}

#[derive(Debug)]
pub struct Session {
    client_id: Option<String>,
    email: Option<String>,
    active_state: ActiveState,
    last_active_at: Option<Instant>,
    header: RequestHeader,
}

impl Session {
    pub fn new(client_version: impl Into<String>, language_code: impl Into<String>) -> Self {
        Self {
            client_id: None,
            email: None,
            active_state: ActiveState::Unknown,
            last_active_at: None,
            header: RequestHeader {
                client_version: client_version.into(),
                language_code: language_code.into(),
                resource: None,
            },
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.client_version.clone(), config.language_code.clone())
    }

    pub fn shared(config: &ClientConfig) -> SharedSession {
        Arc::new(Mutex::new(Self::from_config(config)))
    }

    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    /// Replace the client id, returning the previous one.
    pub fn set_client_id(&mut self, client_id: String) -> Option<String> {
        self.client_id.replace(client_id)
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn set_email(&mut self, email: String) {
        self.email = Some(email);
    }

    pub fn active_state(&self) -> ActiveState {
        self.active_state
    }

    pub fn set_active_state(&mut self, state: ActiveState) {
        self.active_state = state;
    }

    pub fn last_active_at(&self) -> Option<Instant> {
        self.last_active_at
    }

    /// Snapshot of the header as of now.
    pub fn request_header(&self) -> RequestHeader {
        RequestHeader {
            resource: self.client_id.clone(),
            ..self.header.clone()
        }
    }

    /// `email/client_id`, once both are known.
    pub fn full_jid(&self) -> Option<String> {
        match (&self.email, &self.client_id) {
            (Some(email), Some(client_id)) => Some(format!("{email}/{client_id}")),
            _ => None,
        }
    }

    /// Check-then-act step of the heartbeat.
    ///
    /// Returns false when this client is already active and was asserted less
    /// than `min_interval` ago. Otherwise marks the session active as of `now`
    /// before any request is made, so overlapping callers collapse onto one
    /// assertion, and returns true.
    pub fn begin_assertion(&mut self, now: Instant, min_interval: Duration) -> bool {
        let timed_out = self
            .last_active_at
            .is_none_or(|at| now.saturating_duration_since(at) > min_interval);
        if self.active_state == ActiveState::Active && !timed_out {
            return false;
        }
        self.active_state = ActiveState::Active;
        self.last_active_at = Some(now);
        true
    }

    /// The channel this session belonged to has gone away. Identity and the
    /// static header fields survive; the next channel assigns a new client id.
    pub fn end_connection(&mut self) {
        self.client_id = None;
        self.active_state = ActiveState::Unknown;
    }
}
