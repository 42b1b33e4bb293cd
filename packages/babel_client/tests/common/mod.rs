#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use babel_client::{
    ChannelError, ChannelEvent, ClientConfig, ControlMap, Cookies, FetchError, FetchRequest,
    FetchResponse, HttpFetch, IdSource, PushChannel, REQUIRED_COOKIES,
};

pub type Log = Arc<Mutex<Vec<String>>>;

pub fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

pub fn cookies() -> Cookies {
    REQUIRED_COOKIES
        .iter()
        .map(|name| (*name, format!("{}-value", name.to_lowercase())))
        .collect()
}

pub fn config() -> ClientConfig {
    ClientConfig {
        api_base_url: "https://chat.test/chat/v1".to_string(),
        ..ClientConfig::default()
    }
}

// --- frames -----------------------------------------------------------------

pub fn push_frame(wrapper: Value) -> ChannelEvent {
    ChannelEvent::Array(json!([{ "p": wrapper.to_string() }]))
}

pub fn client_id_frame(client_id: &str) -> ChannelEvent {
    push_frame(json!({"3": {"2": client_id}}))
}

/// A state update whose header reports `state` and whose field 2 carries `tag`.
pub fn state_update(state: i64, tag: &str) -> Value {
    json!([[state], tag])
}

pub fn batch_payload(updates: &[Value]) -> String {
    json!(["cbu", updates]).to_string()
}

pub fn batch_frame(updates: &[Value]) -> ChannelEvent {
    push_frame(json!({"2": {"2": batch_payload(updates)}}))
}

// --- push channel -----------------------------------------------------------

/// Channel fed from a test-held sender. Dropping the sender ends the stream.
pub struct ScriptedChannel {
    events: tokio::sync::Mutex<mpsc::UnboundedReceiver<Result<ChannelEvent, ChannelError>>>,
    sent: Mutex<Vec<Vec<ControlMap>>>,
    log: Log,
    fail_sends: AtomicBool,
    closed: AtomicBool,
}

pub type ChannelFeed = mpsc::UnboundedSender<Result<ChannelEvent, ChannelError>>;

impl ScriptedChannel {
    pub fn new(log: Log) -> (Arc<Self>, ChannelFeed) {
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = Arc::new(Self {
            events: tokio::sync::Mutex::new(rx),
            sent: Mutex::new(Vec::new()),
            log,
            fail_sends: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });
        (channel, tx)
    }

    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Vec<ControlMap>> {
        self.sent.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PushChannel for ScriptedChannel {
    async fn next_event(&self) -> Result<Option<ChannelEvent>, ChannelError> {
        match self.events.lock().await.recv().await {
            Some(Ok(event)) => Ok(Some(event)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    async fn send_maps(&self, maps: Vec<ControlMap>) -> Result<(), ChannelError> {
        self.log.lock().unwrap().push("send_maps".to_string());
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ChannelError::SendFailed("scripted failure".into()));
        }
        self.sent.lock().unwrap().push(maps);
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// --- http -------------------------------------------------------------------

type Responder = Box<dyn Fn(&FetchRequest) -> Result<FetchResponse, FetchError> + Send + Sync>;

/// Records every request and answers through a replaceable responder.
pub struct RecordingHttp {
    requests: Mutex<Vec<FetchRequest>>,
    responder: Mutex<Responder>,
}

impl RecordingHttp {
    /// Answers `getselfinfo` with `ada@example.com` and everything else with OK.
    pub fn ok() -> Arc<Self> {
        Self::with(|request| Ok(default_reply(request)))
    }

    pub fn with<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&FetchRequest) -> Result<FetchResponse, FetchError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            responder: Mutex::new(Box::new(responder)),
        })
    }

    pub fn respond_with<F>(&self, responder: F)
    where
        F: Fn(&FetchRequest) -> Result<FetchResponse, FetchError> + Send + Sync + 'static,
    {
        *self.responder.lock().unwrap() = Box::new(responder);
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Endpoint paths requested so far, e.g. `clients/setactiveclient`.
    pub fn endpoints(&self) -> Vec<String> {
        self.requests()
            .iter()
            .map(|request| endpoint_of(&request.url).to_string())
            .collect()
    }

    pub fn bodies(&self, endpoint: &str) -> Vec<Value> {
        self.requests()
            .iter()
            .filter(|request| endpoint_of(&request.url) == endpoint)
            .map(|request| serde_json::from_slice(&request.body).unwrap())
            .collect()
    }
}

#[async_trait]
impl HttpFetch for RecordingHttp {
    async fn post(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        self.requests.lock().unwrap().push(request.clone());
        let responder = self.responder.lock().unwrap();
        responder(&request)
    }
}

pub fn endpoint_of(url: &str) -> &str {
    url.split_once("/chat/v1/").map_or(url, |(_, endpoint)| endpoint)
}

pub fn reply(body: Value) -> FetchResponse {
    FetchResponse {
        status: 200,
        body: format!(")]}}'\n{body}").into_bytes(),
    }
}

pub fn self_info_body(email: &str) -> Value {
    let mut entity = vec![Value::Null; 9];
    entity.push(json!([null, "Ada", null, null, [email]]));
    json!(["cgsirp", [1], entity])
}

pub fn default_reply(request: &FetchRequest) -> FetchResponse {
    if endpoint_of(&request.url) == "contacts/getselfinfo" {
        reply(self_info_body("ada@example.com"))
    } else {
        reply(json!(["tag", [1]]))
    }
}

// --- ids --------------------------------------------------------------------

/// Ids counting up from `start`.
pub struct SequentialIds(AtomicU64);

impl SequentialIds {
    pub fn starting_at(start: u64) -> Arc<Self> {
        Arc::new(Self(AtomicU64::new(start)))
    }
}

impl IdSource for SequentialIds {
    fn next_id(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }
}
