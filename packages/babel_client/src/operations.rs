//! Chat API operations.
//!
//! Each operation builds its request around the current header snapshot and
//! goes through [`ChatApi::request`]. Responses the client does not interpret
//! are returned as [`Response`], status-checked, with their fields intact.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, info};

use crate::codec::FieldList;
use crate::error::{ClientError, NetworkError, STATUS_UNAVAILABLE};
use crate::rpc::ChatApi;
use crate::schema::{
    ClientPresenceState, ConversationId, ConversationType, DeliveryMedium, EventRequestHeader,
    EventType, FieldMask, FocusType, GetSelfInfoResponse, InviteeId, NotificationLevel,
    OffTheRecordStatus, ParticipantId, Response, Segment, SegmentType, SyncFilter, TypingType,
};

const MAX_RESPONSE_SIZE_BYTES: u64 = 1_048_576;
const FOCUS_TIMEOUT_SECS: u64 = 20;
const PRESENCE_TIMEOUT_SECS: u64 = 720;

/// Events fetched per `get_conversation` call unless the caller asks otherwise.
pub const DEFAULT_CONVERSATION_EVENTS: u32 = 50;
pub const DEFAULT_RECENT_CONVERSATIONS: u32 = 100;
pub const DEFAULT_RECENT_EVENTS_PER_CONVERSATION: u32 = 1;

const UPLOAD_FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded;charset=UTF-8";
const UPLOAD_DATA_CONTENT_TYPE: &str = "application/octet-stream";

/// Outgoing chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendChatMessage {
    pub conversation_id: String,
    pub segments: Vec<Segment>,
    /// Photo id from [`ChatApi::upload_image`].
    pub image_id: Option<String>,
    pub otr_status: OffTheRecordStatus,
    pub delivery_medium: DeliveryMedium,
    /// Nonce for this send; drawn from the id source when unset.
    pub client_generated_id: Option<u64>,
}

impl SendChatMessage {
    pub fn new(conversation_id: impl Into<String>, segments: Vec<Segment>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            segments,
            image_id: None,
            otr_status: OffTheRecordStatus::OnTheRecord,
            delivery_medium: DeliveryMedium::default(),
            client_generated_id: None,
        }
    }

    /// A message of plain text, with newlines turned into line breaks.
    pub fn text(conversation_id: impl Into<String>, text: &str) -> Self {
        Self::new(conversation_id, Segment::from_plain_text(text))
    }

    pub fn with_image(mut self, image_id: impl Into<String>) -> Self {
        self.image_id = Some(image_id.into());
        self
    }

    pub fn with_otr_status(mut self, otr_status: OffTheRecordStatus) -> Self {
        self.otr_status = otr_status;
        self
    }

    pub fn with_client_generated_id(mut self, id: u64) -> Self {
        self.client_generated_id = Some(id);
        self
    }
}

fn micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

fn conversation(conversation_id: &str) -> ConversationId {
    ConversationId::new(conversation_id)
}

impl ChatApi {
    /// Header for requests that create a conversation event.
    fn event_request_header(
        &self,
        conversation_id: &str,
        otr_status: OffTheRecordStatus,
    ) -> EventRequestHeader {
        EventRequestHeader::new(conversation_id, self.client_generated_id(), otr_status)
    }

    async fn header_fields(&self) -> FieldList {
        FieldList::new().message(1, &self.request_header().await)
    }

    /// All events at or after `since`.
    pub async fn sync_all_new_events(&self, since: DateTime<Utc>) -> Result<Response, ClientError> {
        let request = self
            .header_fields()
            .await
            .set(2, micros(since))
            .set(8, MAX_RESPONSE_SIZE_BYTES);
        self.request("conversations/syncallnewevents", &request).await
    }

    pub async fn send_chat_message(
        &self,
        message: &SendChatMessage,
    ) -> Result<Response, ClientError> {
        let mut event_header = EventRequestHeader::new(
            message.conversation_id.as_str(),
            message
                .client_generated_id
                .unwrap_or_else(|| self.client_generated_id()),
            message.otr_status,
        );
        event_header.delivery_medium = Some(message.delivery_medium);
        event_header.event_type = Some(EventType::RegularChatMessage);

        let content = FieldList::new().repeated(1, &message.segments);
        let media = message.image_id.as_deref().map(|photo_id| {
            FieldList::new().message(1, &FieldList::new().set(1, photo_id))
        });
        let request = self
            .header_fields()
            .await
            .message(6, &content)
            .message_opt(7, media.as_ref())
            .message(8, &event_header);
        self.request("conversations/sendchatmessage", &request).await
    }

    /// Ask the server to treat `full_jid` as the active client for `timeout_secs`.
    pub async fn set_active_client(
        &self,
        is_active: bool,
        timeout_secs: u64,
        full_jid: &str,
    ) -> Result<Response, ClientError> {
        let request = self
            .header_fields()
            .await
            .set(2, is_active)
            .set(3, full_jid)
            .set(4, timeout_secs);
        self.request("clients/setactiveclient", &request).await
    }

    /// Mark a conversation read up to `read_at`.
    pub async fn update_watermark(
        &self,
        conversation_id: &str,
        read_at: DateTime<Utc>,
    ) -> Result<Response, ClientError> {
        let request = self
            .header_fields()
            .await
            .message(2, &conversation(conversation_id))
            .set(3, micros(read_at));
        self.request("conversations/updatewatermark", &request).await
    }

    pub async fn get_entity_by_id(&self, gaia_ids: &[&str]) -> Result<Response, ClientError> {
        let specs: Vec<FieldList> = gaia_ids
            .iter()
            .map(|gaia_id| FieldList::new().set(1, *gaia_id))
            .collect();
        let request = self.header_fields().await.repeated(3, &specs);
        self.request("contacts/getentitybyid", &request).await
    }

    pub async fn rename_conversation(
        &self,
        conversation_id: &str,
        name: &str,
        otr_status: OffTheRecordStatus,
    ) -> Result<Response, ClientError> {
        let event_header = self.event_request_header(conversation_id, otr_status);
        let request = self
            .header_fields()
            .await
            .set(3, name)
            .message(5, &event_header);
        self.request("conversations/renameconversation", &request).await
    }

    /// Up to `max_events` events before `before`, oldest first.
    pub async fn get_conversation(
        &self,
        conversation_id: &str,
        before: DateTime<Utc>,
        max_events: u32,
    ) -> Result<Response, ClientError> {
        let spec = FieldList::new().message(1, &conversation(conversation_id));
        let continuation = FieldList::new().set(3, micros(before));
        let request = self
            .header_fields()
            .await
            .message(2, &spec)
            .set(4, true)
            .set(6, max_events)
            .message(7, &continuation);
        self.request("conversations/getconversation", &request).await
    }

    /// Leave a group conversation.
    pub async fn remove_user(
        &self,
        conversation_id: &str,
        otr_status: OffTheRecordStatus,
    ) -> Result<Response, ClientError> {
        let event_header = self.event_request_header(conversation_id, otr_status);
        let request = self.header_fields().await.message(5, &event_header);
        self.request("conversations/removeuser", &request).await
    }

    /// Clear a one-to-one conversation's history up to now.
    pub async fn delete_conversation(&self, conversation_id: &str) -> Result<Response, ClientError> {
        let request = self
            .header_fields()
            .await
            .message(2, &conversation(conversation_id))
            .set(3, micros(Utc::now()));
        self.request("conversations/deleteconversation", &request).await
    }

    pub async fn set_typing(
        &self,
        conversation_id: &str,
        typing: TypingType,
    ) -> Result<Response, ClientError> {
        let request = self
            .header_fields()
            .await
            .message(2, &conversation(conversation_id))
            .set(3, typing);
        self.request("conversations/settyping", &request).await
    }

    pub async fn get_self_info(&self) -> Result<GetSelfInfoResponse, ClientError> {
        let request = self.header_fields().await;
        self.request("contacts/getselfinfo", &request).await
    }

    pub async fn set_focus(&self, conversation_id: &str) -> Result<Response, ClientError> {
        let request = self
            .header_fields()
            .await
            .message(2, &conversation(conversation_id))
            .set(3, FocusType::Focused)
            .set(4, FOCUS_TIMEOUT_SECS);
        self.request("conversations/setfocus", &request).await
    }

    pub async fn search_entities(
        &self,
        query: &str,
        max_results: u32,
    ) -> Result<Response, ClientError> {
        let request = self
            .header_fields()
            .await
            .set(3, query)
            .set(4, max_results);
        self.request("contacts/searchentities", &request).await
    }

    /// Set presence, and optionally the mood text shown next to it.
    pub async fn set_presence(
        &self,
        online: bool,
        mood: Option<&str>,
    ) -> Result<Response, ClientError> {
        let state = if online {
            ClientPresenceState::DesktopActive
        } else {
            ClientPresenceState::DesktopIdle
        };
        let setting = FieldList::new()
            .set(1, PRESENCE_TIMEOUT_SECS)
            .set(2, state);
        let mood_setting = mood.map(|mood| {
            let segment = FieldList::new().set(1, SegmentType::Text).set(2, mood);
            let content = FieldList::new().repeated(1, [&segment]);
            let message = FieldList::new().message(1, &content);
            FieldList::new().message(1, &message)
        });
        let request = self
            .header_fields()
            .await
            .message(2, &setting)
            .message_opt(8, mood_setting.as_ref());
        self.request("presence/setpresence", &request).await
    }

    pub async fn query_presence(&self, gaia_id: &str) -> Result<Response, ClientError> {
        let request = self
            .header_fields()
            .await
            .repeated(2, [&ParticipantId::gaia(gaia_id)])
            .set(
                3,
                vec![FieldMask::Reachable, FieldMask::Available, FieldMask::Device],
            );
        self.request("presence/querypresence", &request).await
    }

    /// Recent inbox conversations with their latest events.
    pub async fn sync_recent_conversations(
        &self,
        max_conversations: u32,
        max_events_per_conversation: u32,
    ) -> Result<Response, ClientError> {
        let request = self
            .header_fields()
            .await
            .set(3, max_conversations)
            .set(4, max_events_per_conversation)
            .set(5, vec![SyncFilter::Inbox]);
        self.request("conversations/syncrecentconversations", &request).await
    }

    pub async fn set_conversation_notification_level(
        &self,
        conversation_id: &str,
        level: NotificationLevel,
    ) -> Result<Response, ClientError> {
        let request = self
            .header_fields()
            .await
            .message(2, &conversation(conversation_id))
            .set(3, level);
        self.request("conversations/setconversationnotificationlevel", &request).await
    }

    /// `message` must not be empty.
    pub async fn easter_egg(
        &self,
        conversation_id: &str,
        message: &str,
    ) -> Result<Response, ClientError> {
        let request = self
            .header_fields()
            .await
            .message(2, &conversation(conversation_id))
            .message(3, &FieldList::new().set(1, message));
        self.request("conversations/easteregg", &request).await
    }

    /// Create a conversation with `gaia_ids`. More than one invitee, or
    /// `force_group`, makes it a group conversation.
    pub async fn create_conversation(
        &self,
        gaia_ids: &[&str],
        force_group: bool,
    ) -> Result<Response, ClientError> {
        let conversation_type = if gaia_ids.len() > 1 || force_group {
            ConversationType::Group
        } else {
            ConversationType::OneToOne
        };
        let invitees: Vec<InviteeId> = gaia_ids.iter().map(|id| InviteeId::new(*id)).collect();
        let request = self
            .header_fields()
            .await
            .set(2, conversation_type)
            .set(3, self.client_generated_id())
            .repeated(5, &invitees);
        self.request("conversations/createconversation", &request).await
    }

    pub async fn add_user(
        &self,
        conversation_id: &str,
        gaia_ids: &[&str],
        otr_status: OffTheRecordStatus,
    ) -> Result<Response, ClientError> {
        let invitees: Vec<InviteeId> = gaia_ids.iter().map(|id| InviteeId::new(*id)).collect();
        let event_header = self.event_request_header(conversation_id, otr_status);
        let request = self
            .header_fields()
            .await
            .repeated(3, &invitees)
            .message(5, &event_header);
        self.request("conversations/adduser", &request).await
    }

    /// Upload an image for a later [`SendChatMessage::with_image`]. Returns the photo id.
    pub async fn upload_image(&self, data: Vec<u8>, filename: &str) -> Result<String, ClientError> {
        let session_request = json!({
            "protocolVersion": "0.8",
            "createSessionRequest": {
                "fields": [{
                    "external": {
                        "name": "file",
                        "filename": filename,
                        "put": {},
                        "size": data.len(),
                    }
                }]
            }
        });
        let res = self
            .base_request(
                &self.upload_url,
                UPLOAD_FORM_CONTENT_TYPE,
                "json",
                session_request.to_string().into_bytes(),
            )
            .await?;
        let put_url = parse_upload_reply::<CreateSessionReply>(&res.body)?
            .session_status
            .external_field_transfers
            .into_iter()
            .next()
            .map(|transfer| transfer.put_info.url)
            .ok_or_else(|| {
                NetworkError::status(STATUS_UNAVAILABLE, "upload session has no transfer url")
            })?;
        debug!(filename = %filename, bytes = data.len(), "uploading image data");

        let res = self
            .base_request(&put_url, UPLOAD_DATA_CONTENT_TYPE, "json", data)
            .await?;
        let photo_id = parse_upload_reply::<UploadCompleteReply>(&res.body)?
            .session_status
            .additional_info
            .rupio
            .completion_info
            .customer_specific_info
            .photoid;
        info!(filename = %filename, photo_id = %photo_id, "image uploaded");
        Ok(photo_id)
    }

    /// Upload an image file, named after its file name.
    pub async fn upload_image_file(&self, path: &Path) -> Result<String, ClientError> {
        let data = tokio::fs::read(path).await.map_err(|e| {
            NetworkError::transport(
                STATUS_UNAVAILABLE,
                format!("cannot read {}", path.display()),
                e,
            )
        })?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        self.upload_image(data, &filename).await
    }
}

fn parse_upload_reply<T: DeserializeOwned>(body: &[u8]) -> Result<T, NetworkError> {
    serde_json::from_slice(body)
        .map_err(|e| NetworkError::transport(STATUS_UNAVAILABLE, "malformed upload reply", e))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionReply {
    session_status: CreateSessionStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionStatus {
    #[serde(default)]
    external_field_transfers: Vec<ExternalFieldTransfer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExternalFieldTransfer {
    put_info: PutInfo,
}

#[derive(Debug, Deserialize)]
struct PutInfo {
    url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadCompleteReply {
    session_status: UploadCompleteStatus,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadCompleteStatus {
    additional_info: AdditionalInfo,
}

#[derive(Deserialize)]
struct AdditionalInfo {
    #[serde(rename = "uploader_service.GoogleRupioAdditionalInfo")]
    rupio: RupioInfo,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RupioInfo {
    completion_info: CompletionInfo,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompletionInfo {
    customer_specific_info: CustomerSpecificInfo,
}

#[derive(Deserialize)]
struct CustomerSpecificInfo {
    photoid: String,
}
