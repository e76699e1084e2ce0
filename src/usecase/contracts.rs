use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Url;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    domain::appointment::{Appointment, AppointmentId},
    repository::errors::RepositoryError,
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AppointmentRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<Appointment>, RepositoryError>;
    async fn find_by_id(&self, id: &AppointmentId) -> Result<Appointment, RepositoryError>;
}

/// Source of the bearer token for the current till session.
#[cfg_attr(test, mockall::automock)]
pub trait TokenProvider: Send + Sync {
    fn access_token(&self) -> Option<String>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Opened,
    Frame(String),
    Error(String),
    Closed,
}

/// Where a transport reports what happens on one connection. Every event is
/// tagged with the connection it belongs to.
#[derive(Debug, Clone)]
pub struct TransportSink {
    connection_id: u64,
    tx: mpsc::UnboundedSender<(u64, TransportEvent)>,
}

impl TransportSink {
    pub fn new(connection_id: u64, tx: mpsc::UnboundedSender<(u64, TransportEvent)>) -> Self {
        Self { connection_id, tx }
    }

    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    /// Returns `false` once the client is gone.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx.send((self.connection_id, event)).is_ok()
    }
}

/// Owner's side of a live connection. Closing is fire-and-forget; the
/// transport still reports `Closed` through its sink.
#[derive(Debug)]
pub struct ConnectionHandle {
    cancel: CancellationToken,
}

impl ConnectionHandle {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    pub fn close(&self) {
        self.cancel.cancel();
    }
}

/// Opens receive-only realtime connections.
pub trait Transport: Send + Sync {
    fn open(&self, url: Url, sink: TransportSink) -> ConnectionHandle;
}
