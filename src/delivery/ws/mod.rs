use futures::{SinkExt, StreamExt};
use reqwest::Url;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

use crate::usecase::contracts::{ConnectionHandle, Transport, TransportEvent, TransportSink};

/// Receive-only websocket transport for the appointment feed.
///
/// Each `open` spawns one task that owns the socket. The task always ends by
/// emitting `Closed`, whether the handshake failed, the server hung up or the
/// owner closed the handle.
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for WebSocketTransport {
    fn open(&self, url: Url, sink: TransportSink) -> ConnectionHandle {
        let cancel = CancellationToken::new();
        tokio::spawn(run_connection(url, sink, cancel.clone()));
        ConnectionHandle::new(cancel)
    }
}

#[tracing::instrument(skip_all, fields(connection_id = sink.connection_id()))]
async fn run_connection(url: Url, sink: TransportSink, cancel: CancellationToken) {
    let connected = tokio::select! {
        _ = cancel.cancelled() => {
            tracing::debug!("connection closed before handshake finished");
            sink.emit(TransportEvent::Closed);
            return;
        }
        result = connect_async(url.as_str()) => result,
    };

    let (ws_stream, _) = match connected {
        Ok(connected) => connected,
        Err(e) => {
            sink.emit(TransportEvent::Error(format!("connect: {e}")));
            sink.emit(TransportEvent::Closed);
            return;
        }
    };

    let (mut write, mut read) = ws_stream.split();
    sink.emit(TransportEvent::Opened);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                if let Err(e) = write.send(Message::Close(None)).await {
                    tracing::debug!(error = %e, "failed to send close frame");
                }
                break;
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        sink.emit(TransportEvent::Frame(text));
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        sink.emit(TransportEvent::Frame(String::from_utf8_lossy(&bytes).into_owned()));
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::debug!(?frame, "server closed the feed");
                        break;
                    }
                    None => break,
                    Some(Err(e)) => {
                        sink.emit(TransportEvent::Error(format!("read error: {e}")));
                        break;
                    }
                    _ => {} // Ping/Pong handled by tungstenite.
                }
            }
        }
    }

    sink.emit(TransportEvent::Closed);
}
