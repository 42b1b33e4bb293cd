//! # Babel Client
//!
//! A client for the push-channel chat protocol: connection lifecycle, frame
//! dispatch, session bootstrap, the active-client heartbeat and the
//! authenticated RPC surface.
//!
//! ## Overview
//!
//! The long-poll transport is not part of this crate. Callers provide a
//! [`PushChannel`] that yields [`ChannelEvent`]s and accepts control maps;
//! the [`Client`] turns those into:
//! - a new session (client id) stored on the [`Session`], followed by the
//!   service subscription the server needs before it delivers anything
//! - [`StateUpdate`] records published in order on
//!   [`ClientEvents::on_state_update`]
//!
//! Requests go through [`ChatApi`], which attaches the session header, signs
//! the request with the caller's cookies and normalizes every failure into
//! [`NetworkError`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use babel_client::{Client, ClientConfig, Cookies, PushChannel, SendChatMessage};
//!
//! # async fn run(channel: Arc<dyn PushChannel>) -> Result<(), babel_client::ClientError> {
//! let cookies: Cookies = [("SAPISID", "..."), ("HSID", "..."), ("SSID", "..."),
//!                         ("APISID", "..."), ("SID", "...")].into_iter().collect();
//! let client = Client::new(cookies, channel, ClientConfig::default())?;
//!
//! client.events().on_state_update.add_observer(|update| async move {
//!     println!("state update: {:?}", update.header);
//! });
//!
//! // In another task: client.set_active().await on user activity, and
//! let message = SendChatMessage::text("conversation-id", "hello");
//! client.api().send_chat_message(&message).await?;
//!
//! // Runs until client.disconnect() is called.
//! client.connect().await?;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod client;
pub mod codec;
pub mod config;
pub mod cookies;
pub mod envelope;
pub mod error;
pub mod event;
pub mod http;
pub mod ids;
pub mod operations;
pub mod rpc;
pub mod schema;
pub mod session;

pub use channel::{ChannelError, ChannelEvent, ControlMap, PushChannel};
pub use client::{Client, ClientEvents};
pub use config::{ChannelConfig, ClientConfig, HeartbeatConfig, load_config};
pub use cookies::{Cookies, REQUIRED_COOKIES};
pub use error::{ClientError, NetworkError};
pub use event::{Event, ObserverId};
pub use http::{FetchError, FetchRequest, FetchResponse, HttpFetch, ReqwestFetch};
pub use ids::{IdSource, RandomIds};
pub use operations::SendChatMessage;
pub use rpc::ChatApi;
pub use schema::{Segment, StateUpdate};
pub use session::{ActiveState, Session, SharedSession};
