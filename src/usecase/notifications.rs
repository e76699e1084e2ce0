use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::domain::{
    appointment::{Appointment, AppointmentId},
    envelope::IncomingEnvelope,
    notification::{NewNotification, NotificationData, NotificationEvent, NotificationKind},
};
use crate::usecase::{
    cache::AppointmentCache,
    contracts::{AppointmentRepository, Clock, ConnectionHandle, TokenProvider, Transport, TransportEvent, TransportSink},
    error::ClientError,
    feed_address::{feed_url, DEFAULT_NOTIFICATIONS_PATH},
    messages::resolve_message,
    notification_log::{NotificationLog, DEFAULT_MAX_NOTIFICATIONS},
};

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(5000);

const NOTIFICATION_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: Option<String>,
    pub notifications_path: String,
    pub reconnect_delay: Duration,
    pub max_notifications: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            notifications_path: DEFAULT_NOTIFICATIONS_PATH.to_string(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_notifications: DEFAULT_MAX_NOTIFICATIONS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closed,
    Errored,
    ReconnectScheduled,
    Shutdown,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Errored => "errored",
            Self::ReconnectScheduled => "reconnect_scheduled",
            Self::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

struct ActiveConnection {
    id: u64,
    handle: ConnectionHandle,
}

struct PendingReconnect {
    generation: u64,
    cancel: CancellationToken,
}

struct ClientState {
    connection: ConnectionState,
    socket: Option<ActiveConnection>,
    next_connection_id: u64,
    pending_reconnect: Option<PendingReconnect>,
    next_timer_generation: u64,
    started: bool,
    shutting_down: bool,
    cache: AppointmentCache,
    log: NotificationLog,
    view_open: bool,
    refetch_in_flight: bool,
    listings_started: u64,
    listing_applied: u64,
}

impl ClientState {
    /// Orders full listings by when they were requested.
    fn begin_listing(&mut self) -> u64 {
        self.listings_started += 1;
        self.listings_started
    }

    /// Replaces the cache unless a later-requested listing already landed.
    fn apply_listing(&mut self, ticket: u64, appointments: Vec<Appointment>) -> bool {
        if ticket < self.listing_applied {
            return false;
        }
        self.listing_applied = ticket;
        self.cache.replace_all(appointments);
        true
    }
}

struct Receivers {
    transport: mpsc::UnboundedReceiver<(u64, TransportEvent)>,
    timers: mpsc::UnboundedReceiver<u64>,
}

struct Inner<R, T> {
    settings: ClientSettings,
    repository: R,
    transport: T,
    tokens: Arc<dyn TokenProvider>,
    clock: Arc<dyn Clock>,
    state: Mutex<ClientState>,
    receivers: Mutex<Option<Receivers>>,
    transport_tx: mpsc::UnboundedSender<(u64, TransportEvent)>,
    timer_tx: mpsc::UnboundedSender<u64>,
    notifications_tx: broadcast::Sender<NotificationEvent>,
    stop: CancellationToken,
}

/// Live subscription to the appointment feed.
///
/// Keeps the connection up (reconnecting after a fixed delay until shut
/// down), reconciles a local appointment cache from incoming events and
/// records a capped notification log that consumers can read or subscribe to.
/// Dropping the client shuts it down.
pub struct NotificationClient<R, T>
where
    R: AppointmentRepository + 'static,
    T: Transport + 'static,
{
    inner: Arc<Inner<R, T>>,
}

impl<R, T> NotificationClient<R, T>
where
    R: AppointmentRepository + 'static,
    T: Transport + 'static,
{
    pub fn new(
        settings: ClientSettings,
        repository: R,
        transport: T,
        tokens: Arc<dyn TokenProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (notifications_tx, _) = broadcast::channel(NOTIFICATION_CHANNEL_CAPACITY);

        let state = ClientState {
            connection: ConnectionState::Disconnected,
            socket: None,
            next_connection_id: 0,
            pending_reconnect: None,
            next_timer_generation: 0,
            started: false,
            shutting_down: false,
            cache: AppointmentCache::default(),
            log: NotificationLog::with_capacity(settings.max_notifications),
            view_open: false,
            refetch_in_flight: false,
            listings_started: 0,
            listing_applied: 0,
        };

        Self {
            inner: Arc::new(Inner {
                settings,
                repository,
                transport,
                tokens,
                clock,
                state: Mutex::new(state),
                receivers: Mutex::new(Some(Receivers {
                    transport: transport_rx,
                    timers: timer_rx,
                })),
                transport_tx,
                timer_tx,
                notifications_tx,
                stop: CancellationToken::new(),
            }),
        }
    }

    /// Starts the event loop and the first connection attempt. Must be called
    /// from within a Tokio runtime. Calling it again is a no-op.
    pub fn start(&self) {
        {
            let mut state = self.inner.state();
            if state.started || state.shutting_down {
                tracing::debug!(state = %state.connection, "start ignored");
                return;
            }
            state.started = true;
        }

        let receivers = match self.inner.receivers.lock() {
            Ok(mut r) => r.take(),
            Err(p) => p.into_inner().take(),
        };
        if let Some(receivers) = receivers {
            tokio::spawn(Arc::clone(&self.inner).run(receivers));
        }

        tracing::info!("starting appointment notifications");
        self.inner.connect();
    }

    /// Stops reconnecting and closes the live connection. Idempotent.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.inner.notifications_tx.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.state().connection
    }

    pub fn cached_appointments(&self) -> Vec<Appointment> {
        self.inner.state().cache.snapshot()
    }

    pub fn notifications(&self) -> Vec<NotificationEvent> {
        self.inner.state().log.snapshot()
    }

    pub fn unread_count(&self) -> usize {
        self.inner.state().log.unread_count()
    }

    pub fn mark_all_read(&self) -> usize {
        let changed = self.inner.state().log.mark_all_read();
        tracing::debug!(changed, "notifications marked as read");
        changed
    }

    /// Records a notification from another part of the till. Returns the
    /// stored record, or `None` when the message is blank.
    pub fn add_notification(&self, notification: NewNotification) -> Option<NotificationEvent> {
        self.inner.record(notification)
    }

    /// Marks the appointments view as open and reloads the full listing.
    #[tracing::instrument(skip(self))]
    pub async fn open_appointments_view(&self) -> Result<Vec<Appointment>, ClientError> {
        self.inner.state().view_open = true;
        self.refresh_appointments().await
    }

    pub fn close_appointments_view(&self) {
        self.inner.state().view_open = false;
        tracing::debug!("appointments view closed");
    }

    /// Replaces the cache with the server's full listing.
    #[tracing::instrument(skip(self))]
    pub async fn refresh_appointments(&self) -> Result<Vec<Appointment>, ClientError> {
        let ticket = self.inner.state().begin_listing();
        tracing::debug!(ticket, "refreshing appointments");

        let appointments = self.inner.repository.list().await?;

        let mut state = self.inner.state();
        if state.shutting_down {
            return Err(ClientError::ShutDown);
        }
        if state.apply_listing(ticket, appointments.clone()) {
            tracing::info!(count = appointments.len(), "appointments refreshed");
        } else {
            tracing::debug!(ticket, "newer appointment listing already applied, keeping it");
        }

        Ok(appointments)
    }

    #[tracing::instrument(skip(self), fields(appointment_id = %id))]
    pub async fn fetch_appointment(&self, id: &AppointmentId) -> Result<Appointment, ClientError> {
        let appointment = self.inner.repository.find_by_id(id).await?;
        tracing::debug!("appointment details fetched");
        Ok(appointment)
    }
}

impl<R, T> Drop for NotificationClient<R, T>
where
    R: AppointmentRepository + 'static,
    T: Transport + 'static,
{
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}

impl<R, T> Inner<R, T>
where
    R: AppointmentRepository + 'static,
    T: Transport + 'static,
{
    fn state(&self) -> MutexGuard<'_, ClientState> {
        match self.state.lock() {
            Ok(s) => s,
            Err(p) => p.into_inner(),
        }
    }

    async fn run(self: Arc<Self>, mut receivers: Receivers) {
        loop {
            tokio::select! {
                biased;
                _ = self.stop.cancelled() => break,
                Some((connection_id, event)) = receivers.transport.recv() => {
                    self.on_transport_event(connection_id, event);
                }
                Some(generation) = receivers.timers.recv() => {
                    self.on_reconnect_due(generation);
                }
                else => break,
            }
        }
        tracing::debug!("appointment notification loop stopped");
    }

    fn connect(&self) {
        let mut state = self.state();
        if state.shutting_down {
            return;
        }
        if let Some(pending) = state.pending_reconnect.take() {
            pending.cancel.cancel();
        }

        let token = self.tokens.access_token();
        let url = match feed_url(
            self.settings.base_url.as_deref(),
            &self.settings.notifications_path,
            token.as_deref(),
        ) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(error = %e, "cannot build appointment feed address, live updates disabled");
                state.connection = ConnectionState::Disconnected;
                return;
            }
        };

        if let Some(previous) = state.socket.take() {
            previous.handle.close();
        }

        state.next_connection_id += 1;
        let connection_id = state.next_connection_id;
        tracing::info!(
            connection_id,
            host = url.host_str().unwrap_or_default(),
            path = url.path(),
            authenticated = token.is_some(),
            "connecting to appointment feed"
        );

        let handle = self
            .transport
            .open(url, TransportSink::new(connection_id, self.transport_tx.clone()));
        state.socket = Some(ActiveConnection {
            id: connection_id,
            handle,
        });
        state.connection = ConnectionState::Connecting;
    }

    fn on_transport_event(self: &Arc<Self>, connection_id: u64, event: TransportEvent) {
        let current = self.state().socket.as_ref().map(|s| s.id);
        if current != Some(connection_id) {
            tracing::debug!(connection_id, ?current, ?event, "ignoring event from stale connection");
            return;
        }

        match event {
            TransportEvent::Opened => {
                self.state().connection = ConnectionState::Open;
                tracing::info!(connection_id, "connected to appointment notifications");
            }
            TransportEvent::Frame(frame) => self.handle_frame(&frame),
            TransportEvent::Error(e) => {
                self.state().connection = ConnectionState::Errored;
                let error = ClientError::Transport(e);
                tracing::error!(connection_id, error = %error, "appointment notification socket error");
            }
            TransportEvent::Closed => {
                let mut state = self.state();
                state.socket = None;
                if state.shutting_down {
                    state.connection = ConnectionState::Shutdown;
                    return;
                }
                state.connection = ConnectionState::Closed;
                tracing::warn!(connection_id, "appointment feed closed");
                self.schedule_reconnect(&mut state);
            }
        }
    }

    fn schedule_reconnect(&self, state: &mut ClientState) {
        if state.shutting_down {
            return;
        }
        if let Some(previous) = state.pending_reconnect.take() {
            previous.cancel.cancel();
        }

        state.next_timer_generation += 1;
        let generation = state.next_timer_generation;
        let cancel = self.stop.child_token();
        let delay = self.settings.reconnect_delay;
        let timer_tx = self.timer_tx.clone();

        tokio::spawn({
            let cancel = cancel.clone();
            async move {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {
                        let _ = timer_tx.send(generation);
                    }
                }
            }
        });

        state.pending_reconnect = Some(PendingReconnect { generation, cancel });
        state.connection = ConnectionState::ReconnectScheduled;
        tracing::info!(delay_ms = delay.as_millis() as u64, generation, "reconnect scheduled");
    }

    fn on_reconnect_due(&self, generation: u64) {
        {
            let mut state = self.state();
            if state.shutting_down {
                tracing::debug!(generation, "reconnect timer fired after shutdown, ignoring");
                return;
            }
            match &state.pending_reconnect {
                Some(pending) if pending.generation == generation => {
                    state.pending_reconnect = None;
                }
                _ => {
                    tracing::debug!(generation, "ignoring superseded reconnect timer");
                    return;
                }
            }
        }

        metrics::counter!("appointment_feed_reconnects_total").increment(1);
        self.connect();
    }

    fn handle_frame(self: &Arc<Self>, frame: &str) {
        if frame.is_empty() {
            tracing::debug!("ignoring zero-length frame");
            return;
        }
        metrics::counter!("appointment_notifications_received_total").increment(1);

        let envelope = IncomingEnvelope::parse(frame);
        let kind = NotificationKind::normalize(envelope.type_tag().as_deref());
        let appointment = envelope.appointment();
        let message = resolve_message(&envelope, &kind, appointment.as_ref());

        let refetch = match &appointment {
            Some(appointment) => {
                let mut state = self.state();
                let change = state.cache.reconcile(&kind, appointment.clone());
                tracing::debug!(
                    %kind,
                    appointment_id = ?appointment.id(),
                    ?change,
                    cached = state.cache.len(),
                    "appointment cache reconciled"
                );

                if !state.view_open || state.shutting_down {
                    None
                } else if state.refetch_in_flight {
                    tracing::debug!("appointments refetch already in flight, skipping");
                    None
                } else {
                    state.refetch_in_flight = true;
                    Some(state.begin_listing())
                }
            }
            None => None,
        };

        let data = NotificationData {
            appointment,
            raw: envelope.raw(),
        };
        self.record(NewNotification::new(message, kind, data));

        if let Some(ticket) = refetch {
            self.spawn_refetch(ticket);
        }
    }

    fn record(&self, notification: NewNotification) -> Option<NotificationEvent> {
        let now = self.clock.now();
        let event = self.state().log.push(notification, now)?;

        tracing::info!(notification_id = event.id, kind = %event.kind, message = %event.message, "appointment notification");
        // No subscribers is fine; the log still has it.
        let _ = self.notifications_tx.send(event.clone());
        Some(event)
    }

    fn spawn_refetch(self: &Arc<Self>, ticket: u64) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let result = inner.repository.list().await;

            let mut state = inner.state();
            state.refetch_in_flight = false;
            if state.shutting_down {
                tracing::debug!("appointments refetch finished after shutdown, ignoring result");
                return;
            }

            match result {
                Ok(appointments) => {
                    let count = appointments.len();
                    if state.apply_listing(ticket, appointments) {
                        tracing::debug!(count, "appointments refetched after notification");
                    } else {
                        tracing::debug!(ticket, "newer appointment listing already applied, dropping refetch");
                    }
                }
                Err(e) => {
                    metrics::counter!("appointment_refetch_failures_total").increment(1);
                    tracing::warn!(error = %e, "error refreshing appointments after notification");
                }
            }
        });
    }

    fn shutdown(&self) {
        let mut state = self.state();
        if state.shutting_down {
            return;
        }
        state.shutting_down = true;

        if let Some(pending) = state.pending_reconnect.take() {
            pending.cancel.cancel();
        }
        if let Some(socket) = state.socket.take() {
            socket.handle.close();
        }
        state.connection = ConnectionState::Shutdown;
        drop(state);

        self.stop.cancel();
        tracing::info!("appointment notifications shut down");
    }
}
