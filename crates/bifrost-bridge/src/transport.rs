//! WebSocket session plumbing.
//!
//! A [`WsSession`] owns one background task that holds the socket: outbound
//! frames go in through an unbounded channel, lifecycle and inbound frames
//! come out as [`SessionEvent`]s. The task connects, pumps both directions
//! with a `select`, and ends with exactly one `Closed` event. Dropping the
//! session aborts the task.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// One lifecycle or data event from a session task.
#[derive(Debug)]
pub enum SessionEvent {
    /// The socket finished connecting.
    Open,
    /// An inbound text frame.
    Text(String),
    /// An inbound binary frame.
    Binary(Vec<u8>),
    /// A transport fault; a `Closed` follows.
    Error(String),
    /// The session ended. Always the last event.
    Closed {
        /// Whether the close was orderly.
        clean: bool,
    },
}

/// One outbound frame for a session task.
#[derive(Debug)]
pub enum OutFrame {
    /// Text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
}

/// Handle to one WebSocket session task.
pub struct WsSession {
    out_tx: mpsc::UnboundedSender<OutFrame>,
    task: tokio::task::JoinHandle<()>,
}

impl WsSession {
    /// Start a session task connecting to `url`.
    ///
    /// Connection happens inside the task, so this never blocks; failures
    /// arrive as `Error` + `Closed` events on the returned receiver.
    pub fn open(url: String) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_session(url, out_rx, event_tx));
        (Self { out_tx, task }, event_rx)
    }

    /// Queue a frame for sending.
    ///
    /// Sending on a finished session is a logged no-op.
    pub fn send(&self, frame: OutFrame) {
        if self.out_tx.send(frame).is_err() {
            tracing::debug!("send on a finished session; dropping frame");
        }
    }
}

impl Drop for WsSession {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_session(
    url: String,
    mut out_rx: mpsc::UnboundedReceiver<OutFrame>,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
) {
    let ws = match connect_async(&url).await {
        Ok((ws, _)) => ws,
        Err(error) => {
            tracing::warn!(%url, %error, "connection failed");
            let _ = event_tx.send(SessionEvent::Error(error.to_string()));
            let _ = event_tx.send(SessionEvent::Closed { clean: false });
            return;
        },
    };

    tracing::debug!(%url, "session open");
    let _ = event_tx.send(SessionEvent::Open);
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            frame = out_rx.recv() => {
                let message = match frame {
                    Some(OutFrame::Text(text)) => Message::Text(text),
                    Some(OutFrame::Binary(data)) => Message::Binary(data),
                    None => {
                        // Sender side dropped: orderly close.
                        let _ = sink.send(Message::Close(None)).await;
                        let _ = event_tx.send(SessionEvent::Closed { clean: true });
                        return;
                    },
                };
                if let Err(error) = sink.send(message).await {
                    let _ = event_tx.send(SessionEvent::Error(error.to_string()));
                    let _ = event_tx.send(SessionEvent::Closed { clean: false });
                    return;
                }
            },
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    let _ = event_tx.send(SessionEvent::Text(text));
                },
                Some(Ok(Message::Binary(data))) => {
                    let _ = event_tx.send(SessionEvent::Binary(data));
                },
                Some(Ok(Message::Close(_))) => {
                    let _ = event_tx.send(SessionEvent::Closed { clean: true });
                    return;
                },
                // Ping/pong are answered by the library on the next flush.
                Some(Ok(_)) => {},
                Some(Err(error)) => {
                    let _ = event_tx.send(SessionEvent::Error(error.to_string()));
                    let _ = event_tx.send(SessionEvent::Closed { clean: false });
                    return;
                },
                None => {
                    let _ = event_tx.send(SessionEvent::Closed { clean: false });
                    return;
                },
            },
        }
    }
}
