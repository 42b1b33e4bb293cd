use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// =============================================================================
// Client config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
//   config.toml:     [heartbeat]
//                    hold_secs = 120
//
//   env var:         BABEL_HEARTBEAT__HOLD_SECS=120   (double underscore = nesting)

/// Tunable client configuration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Origin hashed into the authorization header.
    #[serde(default = "default_origin_url")]
    pub origin_url: String,
    #[serde(default = "default_upload_url")]
    pub upload_url: String,
    #[serde(default = "default_language_code")]
    pub language_code: String,
    #[serde(default = "default_client_version")]
    pub client_version: String,
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            origin_url: default_origin_url(),
            upload_url: default_upload_url(),
            language_code: default_language_code(),
            client_version: default_client_version(),
            proxy: None,
            heartbeat: HeartbeatConfig::default(),
            channel: ChannelConfig::default(),
        }
    }
}

/// Active-client heartbeat tunables (lives under `[heartbeat]`).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// How long the server should treat this client as active after an assertion.
    #[serde(default = "default_hold_secs")]
    pub hold_secs: u64,
    /// Minimum spacing between assertions while already active.
    #[serde(default = "default_min_interval_secs")]
    pub min_interval_secs: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            hold_secs: default_hold_secs(),
            min_interval_secs: default_min_interval_secs(),
        }
    }
}

impl HeartbeatConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_secs(self.min_interval_secs)
    }
}

/// Push channel tunables (lives under `[channel]`).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Application service subscribed to whenever a new client id arrives.
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// End the receive loop when the service subscription cannot be sent.
    #[serde(default)]
    pub escalate_bootstrap_failure: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            escalate_bootstrap_failure: false,
        }
    }
}

fn default_api_base_url() -> String {
    "https://clients6.google.com/chat/v1".to_string()
}
fn default_origin_url() -> String {
    "https://talkgadget.google.com".to_string()
}
fn default_upload_url() -> String {
    "http://docs.google.com/upload/photos/resumable".to_string()
}
fn default_language_code() -> String {
    "en".to_string()
}
fn default_client_version() -> String {
    concat!("babel-client-", env!("CARGO_PKG_VERSION")).to_string()
}
fn default_hold_secs() -> u64 {
    120
}
fn default_min_interval_secs() -> u64 {
    60
}
fn default_service_name() -> String {
    "babel".to_string()
}

/// Build a figment that layers: defaults → config file → BABEL_* env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `BABEL_HEARTBEAT__HOLD_SECS=90`  →  `heartbeat.hold_secs = 90`
///   `BABEL_CHANNEL__SERVICE_NAME=x`  →  `channel.service_name = "x"`
pub fn load_config(path: Option<&Path>) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    let mut figment = Figment::from(Serialized::defaults(ClientConfig::default()));
    if let Some(path) = path {
        figment = figment.merge(Toml::file(path));
    }
    figment.merge(Env::prefixed("BABEL_").split("__"))
}

impl ClientConfig {
    pub fn load(path: Option<&Path>) -> Result<Self, figment::Error> {
        load_config(path).extract()
    }
}
