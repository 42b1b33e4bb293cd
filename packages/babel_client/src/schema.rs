//! Typed records exchanged with the chat service.
//!
//! Field numbers follow the service's message definitions; only the fields
//! this client reads or writes are modelled; everything else is carried
//! through opaquely.

use serde_json::Value;

use crate::codec::{DecodeError, FieldList, Fields, FromStructuredList, StructuredList};

/// `ResponseHeader.status` value of a successful request.
pub const RESPONSE_STATUS_OK: i64 = 1;

/// `StateUpdateHeader.active_client_state` value meaning this client is active.
pub const ACTIVE_CLIENT_STATE_IS_ACTIVE: i64 = 1;

/// No client is active.
pub const ACTIVE_CLIENT_STATE_NO_ACTIVE: i64 = 0;

/// Another client is active.
pub const ACTIVE_CLIENT_STATE_OTHER_ACTIVE: i64 = 2;

macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $value:expr),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant = $value),+
        }

        impl From<$name> for Value {
            fn from(value: $name) -> Self {
                Value::from(value as i64)
            }
        }
    };
}

wire_enum!(OffTheRecordStatus {
    OffTheRecord = 1,
    OnTheRecord = 2,
});

wire_enum!(DeliveryMediumType {
    Babel = 1,
    GoogleVoice = 2,
    LocalSms = 3,
});

wire_enum!(EventType {
    RegularChatMessage = 1,
});

wire_enum!(SegmentType {
    Text = 0,
    LineBreak = 1,
    Link = 2,
});

wire_enum!(TypingType {
    Started = 1,
    Paused = 2,
    Stopped = 3,
});

wire_enum!(FocusType {
    Focused = 1,
    Unfocused = 2,
});

wire_enum!(ClientPresenceState {
    DesktopIdle = 30,
    DesktopActive = 40,
});

wire_enum!(FieldMask {
    Reachable = 1,
    Available = 2,
    Device = 7,
});

wire_enum!(SyncFilter {
    Inbox = 1,
    Archived = 2,
});

wire_enum!(
    /// Per-conversation notification level; `Quiet` disables notifications.
    NotificationLevel {
        Quiet = 10,
        Ring = 30,
    }
);

wire_enum!(ConversationType {
    OneToOne = 1,
    Group = 2,
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationId {
    pub id: String,
}

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl StructuredList for ConversationId {
    fn to_fields(&self) -> FieldList {
        FieldList::new().set(1, self.id.as_str())
    }
}

impl FromStructuredList for ConversationId {
    fn from_fields(fields: &Fields<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            id: fields.string(1)?.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParticipantId {
    pub gaia_id: Option<String>,
    pub chat_id: Option<String>,
}

impl ParticipantId {
    pub fn gaia(gaia_id: impl Into<String>) -> Self {
        Self {
            gaia_id: Some(gaia_id.into()),
            chat_id: None,
        }
    }
}

impl StructuredList for ParticipantId {
    fn to_fields(&self) -> FieldList {
        FieldList::new()
            .set_opt(1, self.gaia_id.as_deref())
            .set_opt(2, self.chat_id.as_deref())
    }
}

impl FromStructuredList for ParticipantId {
    fn from_fields(fields: &Fields<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            gaia_id: fields.string(1)?,
            chat_id: fields.string(2)?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Formatting {
    pub bold: bool,
    pub italic: bool,
    pub strikethrough: bool,
    pub underline: bool,
}

impl StructuredList for Formatting {
    fn to_fields(&self) -> FieldList {
        FieldList::new()
            .set(1, self.bold)
            .set(2, self.italic)
            .set(3, self.strikethrough)
            .set(4, self.underline)
    }
}

/// One piece of a chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub segment_type: SegmentType,
    pub text: Option<String>,
    pub formatting: Option<Formatting>,
    pub link_target: Option<String>,
}

impl Segment {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            segment_type: SegmentType::Text,
            text: Some(text.into()),
            formatting: None,
            link_target: None,
        }
    }

    pub fn line_break() -> Self {
        Self {
            segment_type: SegmentType::LineBreak,
            text: Some("\n".to_string()),
            formatting: None,
            link_target: None,
        }
    }

    pub fn link(text: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            segment_type: SegmentType::Link,
            text: Some(text.into()),
            formatting: None,
            link_target: Some(target.into()),
        }
    }

    pub fn with_formatting(mut self, formatting: Formatting) -> Self {
        self.formatting = Some(formatting);
        self
    }

    /// Split plain text into text and line-break segments.
    pub fn from_plain_text(text: &str) -> Vec<Self> {
        let mut segments = Vec::new();
        for (i, line) in text.split('\n').enumerate() {
            if i > 0 {
                segments.push(Self::line_break());
            }
            if !line.is_empty() {
                segments.push(Self::text(line));
            }
        }
        segments
    }
}

impl StructuredList for Segment {
    fn to_fields(&self) -> FieldList {
        let link = self
            .link_target
            .as_deref()
            .map(|target| FieldList::new().set(1, target));
        FieldList::new()
            .set(1, self.segment_type)
            .set_opt(2, self.text.as_deref())
            .message_opt(3, self.formatting.as_ref())
            .message_opt(4, link.as_ref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryMedium {
    pub medium_type: DeliveryMediumType,
}

impl Default for DeliveryMedium {
    fn default() -> Self {
        Self {
            medium_type: DeliveryMediumType::Babel,
        }
    }
}

impl StructuredList for DeliveryMedium {
    fn to_fields(&self) -> FieldList {
        FieldList::new().set(1, self.medium_type)
    }
}

/// Shared header of requests that create a conversation event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRequestHeader {
    pub conversation_id: ConversationId,
    pub client_generated_id: u64,
    pub expected_otr: OffTheRecordStatus,
    pub delivery_medium: Option<DeliveryMedium>,
    pub event_type: Option<EventType>,
}

impl EventRequestHeader {
    pub fn new(
        conversation_id: impl Into<String>,
        client_generated_id: u64,
        expected_otr: OffTheRecordStatus,
    ) -> Self {
        Self {
            conversation_id: ConversationId::new(conversation_id),
            client_generated_id,
            expected_otr,
            delivery_medium: None,
            event_type: None,
        }
    }
}

impl StructuredList for EventRequestHeader {
    fn to_fields(&self) -> FieldList {
        FieldList::new()
            .message(1, &self.conversation_id)
            .set(2, self.client_generated_id)
            .set(3, self.expected_otr)
            .message_opt(4, self.delivery_medium.as_ref())
            .set_opt(5, self.event_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteeId {
    pub gaia_id: String,
    pub fallback_name: Option<String>,
}

impl InviteeId {
    pub fn new(gaia_id: impl Into<String>) -> Self {
        Self {
            gaia_id: gaia_id.into(),
            fallback_name: None,
        }
    }
}

impl StructuredList for InviteeId {
    fn to_fields(&self) -> FieldList {
        FieldList::new()
            .set(1, self.gaia_id.as_str())
            .set_opt(4, self.fallback_name.as_deref())
    }
}

// -----------------------------------------------------------------------------
// Responses
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHeader {
    pub status: i64,
    pub error_description: Option<String>,
    pub debug_url: Option<String>,
    pub request_trace_id: Option<String>,
    pub current_server_time: Option<i64>,
}

impl ResponseHeader {
    pub fn is_ok(&self) -> bool {
        self.status == RESPONSE_STATUS_OK
    }
}

impl FromStructuredList for ResponseHeader {
    fn from_fields(fields: &Fields<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            status: fields.int(1)?.unwrap_or_default(),
            error_description: fields.string(2)?,
            debug_url: fields.string(3)?,
            request_trace_id: fields.string(4)?,
            current_server_time: fields.int(5)?,
        })
    }
}

/// A decoded response whose status the RPC engine checks.
pub trait ApiResponse: FromStructuredList {
    fn response_header(&self) -> &ResponseHeader;
}

/// Response whose body is passed through to the caller as raw fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    pub header: ResponseHeader,
    fields: Vec<Value>,
}

impl Response {
    /// Raw value of a response field by field number.
    pub fn field(&self, number: usize) -> Option<&Value> {
        number
            .checked_sub(1)
            .and_then(|index| self.fields.get(index))
            .filter(|value| !value.is_null())
    }

    pub fn fields(&self) -> &[Value] {
        &self.fields
    }
}

impl FromStructuredList for Response {
    fn from_fields(fields: &Fields<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            header: fields.message(1)?.unwrap_or_default(),
            fields: fields.to_vec(),
        })
    }
}

impl ApiResponse for Response {
    fn response_header(&self) -> &ResponseHeader {
        &self.header
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityProperties {
    pub display_name: Option<String>,
    pub first_name: Option<String>,
    pub photo_url: Option<String>,
    pub emails: Vec<String>,
}

impl FromStructuredList for EntityProperties {
    fn from_fields(fields: &Fields<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            display_name: fields.string(2)?,
            first_name: fields.string(3)?,
            photo_url: fields.string(4)?,
            emails: fields.strings(5)?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entity {
    pub id: Option<ParticipantId>,
    pub properties: Option<EntityProperties>,
}

impl FromStructuredList for Entity {
    fn from_fields(fields: &Fields<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            id: fields.message(9)?,
            properties: fields.message(10)?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetSelfInfoResponse {
    pub header: ResponseHeader,
    pub self_entity: Option<Entity>,
}

impl GetSelfInfoResponse {
    /// The account's primary email address.
    pub fn email(&self) -> Option<&str> {
        self.self_entity
            .as_ref()?
            .properties
            .as_ref()?
            .emails
            .first()
            .map(String::as_str)
    }
}

impl FromStructuredList for GetSelfInfoResponse {
    fn from_fields(fields: &Fields<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            header: fields.message(1)?.unwrap_or_default(),
            self_entity: fields.message(2)?,
        })
    }
}

impl ApiResponse for GetSelfInfoResponse {
    fn response_header(&self) -> &ResponseHeader {
        &self.header
    }
}

// -----------------------------------------------------------------------------
// Pushed state updates
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateUpdateHeader {
    pub active_client_state: Option<i64>,
    pub request_trace_id: Option<String>,
    pub current_server_time: Option<i64>,
}

impl FromStructuredList for StateUpdateHeader {
    fn from_fields(fields: &Fields<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            active_client_state: fields.int(1)?,
            request_trace_id: fields.string(3)?,
            current_server_time: fields.int(5)?,
        })
    }
}

/// One server-pushed state change. Only the header is interpreted; the
/// event-specific payload is handed to subscribers untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    pub header: StateUpdateHeader,
    fields: Vec<Value>,
}

impl StateUpdate {
    /// Raw value of an event field by field number.
    pub fn field(&self, number: usize) -> Option<&Value> {
        number
            .checked_sub(1)
            .and_then(|index| self.fields.get(index))
            .filter(|value| !value.is_null())
    }

    pub fn fields(&self) -> &[Value] {
        &self.fields
    }
}

impl FromStructuredList for StateUpdate {
    fn from_fields(fields: &Fields<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            header: fields.message(1)?.unwrap_or_default(),
            fields: fields.to_vec(),
        })
    }
}

/// Batch of state updates pushed under the `cbu` marker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchUpdate {
    pub state_updates: Vec<StateUpdate>,
}

impl FromStructuredList for BatchUpdate {
    fn from_fields(fields: &Fields<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            state_updates: fields.repeated(1)?,
        })
    }
}
