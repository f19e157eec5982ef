//! The WebSocket transport behind the connection manager.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMessage};
use tracing::{debug, info, warn};

/// Events that drive the connection manager.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// Something happened on the transport opened as `generation`.
    Transport {
        generation: u64,
        event: TransportEvent,
    },
    /// The connect timeout armed for `generation` expired.
    ConnectTimeout { generation: u64 },
    ReconnectDue,
    Heartbeat,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Opened,
    Message(String),
    Closed { code: Option<u16> },
    Error(String),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport is not open")]
    NotOpen,
    #[error("transport closed")]
    Closed,
}

/// A bidirectional text channel to the tutor service.
///
/// `open` returns immediately; progress is reported through `events`, each
/// event stamped with `generation`. After `close` the transport must report
/// nothing further for that generation.
#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send {
    fn open(&mut self, url: &str, generation: u64, events: UnboundedSender<LinkEvent>);
    fn send_text(&mut self, text: String) -> Result<(), TransportError>;
    fn close(&mut self);
}

/// [`Transport`] over `tokio-tungstenite`.
#[derive(Default)]
pub struct WsTransport {
    outbound: Option<UnboundedSender<WsMessage>>,
    task: Option<JoinHandle<()>>,
}

impl WsTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for WsTransport {
    fn open(&mut self, url: &str, generation: u64, events: UnboundedSender<LinkEvent>) {
        self.close();
        let (tx, rx) = mpsc::unbounded_channel();
        self.outbound = Some(tx);
        self.task = Some(tokio::spawn(run_socket(
            url.to_string(),
            generation,
            rx,
            events,
        )));
    }

    fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        let outbound = self.outbound.as_ref().ok_or(TransportError::NotOpen)?;
        outbound
            .send(WsMessage::Text(text.into()))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&mut self) {
        self.outbound = None;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_socket(
    url: String,
    generation: u64,
    mut outbound: UnboundedReceiver<WsMessage>,
    events: UnboundedSender<LinkEvent>,
) {
    let emit = |event: TransportEvent| {
        // A closed channel means the session is gone; nothing left to notify.
        let _ = events.send(LinkEvent::Transport { generation, event });
    };

    let ws_stream = match connect_async(url.as_str()).await {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            warn!(generation, error = %e, "WebSocket connect failed");
            emit(TransportEvent::Error(e.to_string()));
            return;
        }
    };
    info!(generation, %url, "WebSocket connected");
    emit(TransportEvent::Opened);

    let (mut sink, mut stream) = ws_stream.split();
    loop {
        tokio::select! {
            outgoing = outbound.recv() => match outgoing {
                Some(message) => {
                    if let Err(e) = sink.send(message).await {
                        warn!(generation, error = %e, "WebSocket send failed");
                        emit(TransportEvent::Error(e.to_string()));
                        emit(TransportEvent::Closed { code: None });
                        return;
                    }
                }
                None => {
                    let _ = sink.close().await;
                    return;
                }
            },
            incoming = stream.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => emit(TransportEvent::Message(text.to_string())),
                Some(Ok(WsMessage::Close(frame))) => {
                    let code = frame.map(|f| u16::from(f.code));
                    info!(generation, ?code, "WebSocket closed by peer");
                    emit(TransportEvent::Closed { code });
                    return;
                }
                Some(Ok(other)) => debug!(generation, ?other, "Ignoring non-text frame"),
                Some(Err(e)) => {
                    warn!(generation, error = %e, "WebSocket read failed");
                    emit(TransportEvent::Error(e.to_string()));
                    emit(TransportEvent::Closed { code: None });
                    return;
                }
                None => {
                    emit(TransportEvent::Closed { code: None });
                    return;
                }
            },
        }
    }
}
