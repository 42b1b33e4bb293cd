//! Decoding of push-channel frames into typed variants.
//!
//! A frame is either the literal keepalive `["noop"]` or an array whose first
//! element is `{"p": "<json>"}`. The inner JSON is a dictionary keyed by
//! decimal field tags:
//!
//! | tag | nested tag | meaning |
//! |-----|------------|---------|
//! | `"3"` | `"2"` | new client id (string) |
//! | `"2"` | `"2"` | JSON-encoded structured list led by a marker such as `"cbu"` |
//!
//! Any other tag is dropped. New server features must not break existing
//! clients, so the dispatcher ignores what it does not know.

use serde_json::{Map, Value};

use crate::channel::ControlMap;
use crate::codec::{DecodeError, FromStructuredList};
use crate::schema::{BatchUpdate, StateUpdate};

const KEEPALIVE: &str = "noop";

/// Marker leading a batch of state updates.
pub const BATCH_UPDATE_MARKER: &str = "cbu";

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("frame is not a non-empty array")]
    NotAnArray,

    #[error("frame has no \"p\" payload")]
    MissingPayload,

    #[error("malformed wrapper: {0}")]
    Wrapper(#[source] serde_json::Error),

    #[error("event payload is not a list with a string marker")]
    MissingMarker,

    #[error("malformed event payload: {0}")]
    Payload(#[from] DecodeError),
}

/// A wrapper tag that is present but not shaped `{"2": "<string>"}`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("wrapper tag \"{tag}\" has no string \"2\" field")]
pub struct MalformedFacet {
    pub tag: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IncomingFrame {
    Keepalive,
    Push(Wrapper),
}

impl IncomingFrame {
    pub fn parse(array: &Value) -> Result<Self, EnvelopeError> {
        let first = array
            .as_array()
            .and_then(|items| items.first())
            .ok_or(EnvelopeError::NotAnArray)?;
        if first.as_str() == Some(KEEPALIVE) {
            return Ok(Self::Keepalive);
        }
        match first.get("p") {
            Some(Value::String(payload)) => Wrapper::parse(payload).map(Self::Push),
            Some(Value::Object(map)) => Ok(Self::Push(Wrapper::from_map(map))),
            _ => Err(EnvelopeError::MissingPayload),
        }
    }
}

/// The two independent facets a pushed wrapper may carry.
///
/// Each facet is extracted on its own, so a malformed event payload never
/// hides a new client id sent in the same frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wrapper {
    pub new_client_id: Result<Option<String>, MalformedFacet>,
    /// Still-encoded event payload; see [`EventPayload::parse`].
    pub event_payload: Result<Option<String>, MalformedFacet>,
}

impl Wrapper {
    pub fn parse(payload: &str) -> Result<Self, EnvelopeError> {
        let map: Map<String, Value> =
            serde_json::from_str(payload).map_err(EnvelopeError::Wrapper)?;
        Ok(Self::from_map(&map))
    }

    pub fn from_map(map: &Map<String, Value>) -> Self {
        Self {
            new_client_id: facet(map, "3"),
            event_payload: facet(map, "2"),
        }
    }
}

fn facet(map: &Map<String, Value>, tag: &'static str) -> Result<Option<String>, MalformedFacet> {
    let Some(tagged) = map.get(tag) else {
        return Ok(None);
    };
    match tagged.get("2") {
        Some(Value::String(value)) => Ok(Some(value.clone())),
        _ => Err(MalformedFacet { tag }),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    /// State updates in delivery order.
    BatchUpdate(Vec<StateUpdate>),
    /// A payload under a marker this client does not handle.
    Other { marker: String },
}

impl EventPayload {
    pub fn parse(payload: &str) -> Result<Self, EnvelopeError> {
        let value: Value =
            serde_json::from_str(payload).map_err(|e| EnvelopeError::Payload(e.into()))?;
        let marker = value
            .as_array()
            .and_then(|items| items.first())
            .and_then(Value::as_str)
            .ok_or(EnvelopeError::MissingMarker)?;
        if marker != BATCH_UPDATE_MARKER {
            return Ok(Self::Other {
                marker: marker.to_string(),
            });
        }
        let batch = BatchUpdate::decode_container(&value)?;
        Ok(Self::BatchUpdate(batch.state_updates))
    }
}

/// Control map subscribing a fresh channel session to `service`.
///
/// Produces `{"p": "{\"3\":{\"1\":{\"1\":\"<service>\"}}}"}`.
pub fn service_subscription(service: &str) -> ControlMap {
    let request = serde_json::json!({"3": {"1": {"1": service}}});
    let mut map = ControlMap::new();
    map.insert("p".to_string(), Value::String(request.to_string()));
    map
}
