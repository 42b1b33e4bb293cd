//! Push-channel seam.
//!
//! The long-poll transport (connection, reconnection, frame splitting) lives
//! outside this crate. The client only needs an ordered stream of
//! [`ChannelEvent`]s and a way to push control maps back.

use async_trait::async_trait;
use serde_json::Value;

/// An outbound control map, e.g. the service subscription request.
pub type ControlMap = serde_json::Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Connected,
    Reconnected,
    Disconnected,
    /// One parsed data array received from the channel.
    Array(Value),
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("channel transport failed: {0}")]
    Transport(String),

    #[error("failed to send control maps: {0}")]
    SendFailed(String),
}

#[async_trait]
pub trait PushChannel: Send + Sync {
    /// Wait for the next event. `Ok(None)` means the channel ended for good.
    ///
    /// Must be cancel-safe: dropping the future before it resolves must not
    /// lose an event.
    async fn next_event(&self) -> Result<Option<ChannelEvent>, ChannelError>;

    async fn send_maps(&self, maps: Vec<ControlMap>) -> Result<(), ChannelError>;

    /// Release transport resources once the receive loop has stopped.
    async fn close(&self) {}
}
