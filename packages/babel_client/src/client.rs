//! Connection lifecycle, frame dispatch, session bootstrap and the active-client heartbeat.

use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::channel::{ChannelEvent, PushChannel};
use crate::config::ClientConfig;
use crate::cookies::Cookies;
use crate::envelope::{self, EventPayload, IncomingFrame};
use crate::error::{ClientError, NetworkError};
use crate::event::Event;
use crate::http::{HttpFetch, ReqwestFetch};
use crate::ids::IdSource;
use crate::rpc::ChatApi;
use crate::schema::StateUpdate;
use crate::session::{ActiveState, Session, SharedSession};

/// Events a [`Client`] publishes. Each `fire` waits for every observer.
#[derive(Debug)]
pub struct ClientEvents {
    pub on_connect: Event<()>,
    pub on_reconnect: Event<()>,
    pub on_disconnect: Event<()>,
    pub on_state_update: Event<Arc<StateUpdate>>,
}

impl Default for ClientEvents {
    fn default() -> Self {
        Self {
            on_connect: Event::new("on_connect"),
            on_reconnect: Event::new("on_reconnect"),
            on_disconnect: Event::new("on_disconnect"),
            on_state_update: Event::new("on_state_update"),
        }
    }
}

/// Handle on a running receive loop.
struct Listener {
    cancel: CancellationToken,
    finished: watch::Receiver<bool>,
}

impl Listener {
    /// False once the `connect` call owning this listener has gone away.
    fn is_live(&self) -> bool {
        self.finished.has_changed().is_ok() && !*self.finished.borrow()
    }
}

pub struct Client {
    api: ChatApi,
    channel: Arc<dyn PushChannel>,
    session: SharedSession,
    config: ClientConfig,
    events: ClientEvents,
    listener: Mutex<Option<Listener>>,
}

impl Client {
    /// Client speaking to the real service through a reqwest-backed fetcher.
    pub fn new(
        cookies: Cookies,
        channel: Arc<dyn PushChannel>,
        config: ClientConfig,
    ) -> Result<Self, ClientError> {
        let http = ReqwestFetch::new(config.proxy.as_deref()).map_err(NetworkError::from)?;
        Ok(Self::with_http(cookies, channel, Arc::new(http), config))
    }

    pub fn with_http(
        cookies: Cookies,
        channel: Arc<dyn PushChannel>,
        http: Arc<dyn HttpFetch>,
        config: ClientConfig,
    ) -> Self {
        let session = Session::shared(&config);
        let api = ChatApi::new(cookies, http, session.clone(), &config);
        Self {
            api,
            channel,
            session,
            config,
            events: ClientEvents::default(),
            listener: Mutex::new(None),
        }
    }

    pub fn with_id_source(mut self, ids: Arc<dyn IdSource>) -> Self {
        self.api = self.api.with_id_source(ids);
        self
    }

    /// The RPC surface, sharing this client's session.
    pub fn api(&self) -> &ChatApi {
        &self.api
    }

    pub fn events(&self) -> &ClientEvents {
        &self.events
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub async fn is_connected(&self) -> bool {
        self.listener
            .lock()
            .await
            .as_ref()
            .is_some_and(Listener::is_live)
    }

    /// Run the receive loop until [`Client::disconnect`] or a channel failure.
    ///
    /// Returns `Ok(())` after a graceful disconnect. A channel that ends on its
    /// own is reported as [`ClientError::ChannelClosed`].
    pub async fn connect(&self) -> Result<(), ClientError> {
        let cancel = CancellationToken::new();
        let (finished_tx, finished_rx) = watch::channel(false);
        {
            let mut slot = self.listener.lock().await;
            if slot.as_ref().is_some_and(Listener::is_live) {
                return Err(ClientError::AlreadyConnected);
            }
            *slot = Some(Listener {
                cancel: cancel.clone(),
                finished: finished_rx,
            });
        }

        let result = self.listen(&cancel).await;

        self.channel.close().await;
        self.session.lock().await.end_connection();
        self.listener.lock().await.take();
        finished_tx.send_replace(true);

        match &result {
            Ok(()) => info!("connect returning after disconnect"),
            Err(e) => warn!(error = %e, code = e.error_code(), "connect returning after failure"),
        }
        result
    }

    /// Stop the receive loop and wait until `connect` has observed it.
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        let (cancel, mut finished) = {
            let slot = self.listener.lock().await;
            let listener = slot.as_ref().ok_or(ClientError::NotConnected)?;
            (listener.cancel.clone(), listener.finished.clone())
        };
        info!("disconnecting gracefully");
        cancel.cancel();
        if finished.wait_for(|done| *done).await.is_err() {
            debug!("receive loop dropped before signalling completion");
        }
        info!("disconnected gracefully");
        Ok(())
    }

    async fn listen(&self, cancel: &CancellationToken) -> Result<(), ClientError> {
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                event = self.channel.next_event() => event?,
            };
            let Some(event) = event else {
                return Err(ClientError::ChannelClosed);
            };
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                handled = self.handle_event(event) => handled?,
            }
        }
    }

    async fn handle_event(&self, event: ChannelEvent) -> Result<(), ClientError> {
        match event {
            ChannelEvent::Connected => self.events.on_connect.fire(()).await,
            ChannelEvent::Reconnected => self.events.on_reconnect.fire(()).await,
            ChannelEvent::Disconnected => self.events.on_disconnect.fire(()).await,
            ChannelEvent::Array(array) => self.on_receive_array(&array).await?,
        }
        Ok(())
    }

    /// Dispatch one data array. Only an escalated bootstrap failure is an error;
    /// anything malformed or unknown is logged and skipped.
    pub async fn on_receive_array(&self, array: &serde_json::Value) -> Result<(), ClientError> {
        let wrapper = match IncomingFrame::parse(array) {
            Ok(IncomingFrame::Keepalive) => return Ok(()),
            Ok(IncomingFrame::Push(wrapper)) => wrapper,
            Err(e) => {
                warn!(error = %e, "ignoring malformed frame");
                return Ok(());
            }
        };

        match wrapper.new_client_id {
            Ok(Some(client_id)) => {
                let previous = self.session.lock().await.set_client_id(client_id.clone());
                info!(client_id = %client_id, previous = ?previous, "received new client_id");
                self.add_channel_services(&client_id).await?;
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "ignoring malformed client_id"),
        }

        let payload = match wrapper.event_payload {
            Ok(Some(payload)) => payload,
            Ok(None) => return Ok(()),
            Err(e) => {
                warn!(error = %e, "ignoring malformed event payload");
                return Ok(());
            }
        };
        match EventPayload::parse(&payload) {
            Ok(EventPayload::BatchUpdate(updates)) => {
                for update in updates {
                    let state = ActiveState::from_reported(update.header.active_client_state);
                    self.session.lock().await.set_active_state(state);
                    debug!(active_state = ?state, "received state update");
                    self.events.on_state_update.fire(Arc::new(update)).await;
                }
            }
            Ok(EventPayload::Other { marker }) => info!(marker = %marker, "ignoring message"),
            Err(e) => warn!(error = %e, "ignoring malformed event payload"),
        }
        Ok(())
    }

    /// Subscribe the freshly assigned channel session to application events.
    /// Without this the channel stays open but never delivers anything.
    async fn add_channel_services(&self, client_id: &str) -> Result<(), ClientError> {
        let service = &self.config.channel.service_name;
        info!(service = %service, "adding channel services");
        match self
            .channel
            .send_maps(vec![envelope::service_subscription(service)])
            .await
        {
            Ok(()) => {
                info!(service = %service, "channel services added");
                Ok(())
            }
            Err(e) if self.config.channel.escalate_bootstrap_failure => {
                error!(client_id = %client_id, error = %e, "failed to add channel services");
                Err(ClientError::SubscriptionLost {
                    client_id: client_id.to_string(),
                    source: e,
                })
            }
            Err(e) => {
                error!(client_id = %client_id, error = %e, "failed to add channel services");
                Ok(())
            }
        }
    }

    /// Mark this client as the active one.
    ///
    /// Cheap to call on every sign of user interaction: while already active
    /// it makes at most one request per heartbeat interval. Failures are
    /// logged and never returned.
    pub async fn set_active(&self) {
        let min_interval = self.config.heartbeat.min_interval();
        {
            let mut session = self.session.lock().await;
            if session.client_id().is_none() {
                debug!("cannot set active client until client_id is received");
                return;
            }
            if !session.begin_assertion(Instant::now(), min_interval) {
                return;
            }
        }

        let email_known = self.session.lock().await.email().is_some();
        if !email_known {
            match self.api.get_self_info().await {
                Ok(info) => match info.email() {
                    Some(email) => self.session.lock().await.set_email(email.to_string()),
                    None => {
                        warn!("failed to find email address: self info has none");
                        return;
                    }
                },
                Err(e) => {
                    warn!(error = %e, "failed to find email address");
                    return;
                }
            }
        }

        let full_jid = self.session.lock().await.full_jid();
        let Some(full_jid) = full_jid else {
            info!("cannot set active client until client_id is received");
            return;
        };

        let hold_secs = self.config.heartbeat.hold_secs;
        match self.api.set_active_client(true, hold_secs, &full_jid).await {
            Ok(_) => info!(hold_secs, "set active client"),
            Err(e) => warn!(error = %e, "failed to set active client"),
        }
    }
}
