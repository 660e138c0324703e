//! Transport channel manager
//!
//! One websocket per track. Opening is fire-and-forget: the connection runs
//! in its own task and reports back through engine events tagged with the
//! session id. Closing cancels that task; it is idempotent and safe before
//! the connection finished opening.

use super::events::{CloseReason, EngineEvent, EngineEventKind, EngineEventTx};
use super::protocol::{self, ServerFrame};
use super::session::{SessionId, TrackId};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use thiserror::Error;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use url::Url;

#[derive(Error, Debug)]
pub enum ChannelError {
  #[error("websocket error: {0}")]
  WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
  #[error("invalid stream endpoint: {0}")]
  Endpoint(String),
}

/// Owning handle to an open (or opening) channel
#[derive(Debug)]
pub struct ChannelHandle {
  session: SessionId,
  track_id: TrackId,
  cancel: CancellationToken,
}

impl ChannelHandle {
  pub fn new(session: SessionId, track_id: TrackId, cancel: CancellationToken) -> Self {
    Self {
      session,
      track_id,
      cancel,
    }
  }

  pub fn session(&self) -> SessionId {
    self.session
  }

  pub fn track_id(&self) -> TrackId {
    self.track_id
  }

  /// Stop the connection task; further calls are no-ops
  pub fn close(&self) {
    if !self.cancel.is_cancelled() {
      debug!("session {}: channel close requested", self.session);
      self.cancel.cancel();
    }
  }

  pub fn is_closed(&self) -> bool {
    self.cancel.is_cancelled()
  }
}

impl Drop for ChannelHandle {
  fn drop(&mut self) {
    self.cancel.cancel();
  }
}

/// Close the channel in `slot` (if any) and leave the slot empty
pub fn close(slot: &mut Option<ChannelHandle>) {
  if let Some(channel) = slot.take() {
    channel.close();
  }
}

/// Opens one duplex connection per call
pub trait Connector {
  fn open(&mut self, session: SessionId, track_id: TrackId, events: EngineEventTx) -> ChannelHandle;
}

/// Connector for the service's websocket endpoint
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
  endpoint: Url,
}

impl WebSocketConnector {
  pub fn new(endpoint: Url) -> Result<Self, ChannelError> {
    match endpoint.scheme() {
      "ws" | "wss" => Ok(Self { endpoint }),
      other => Err(ChannelError::Endpoint(format!(
        "unsupported scheme '{}' in {}",
        other, endpoint
      ))),
    }
  }
}

impl Connector for WebSocketConnector {
  /// Must be called from within a tokio runtime
  fn open(
    &mut self,
    session: SessionId,
    track_id: TrackId,
    events: EngineEventTx,
  ) -> ChannelHandle {
    let cancel = CancellationToken::new();
    let task = ChannelTask {
      endpoint: self.endpoint.clone(),
      session,
      track_id,
      events,
      cancel: cancel.clone(),
    };
    tokio::spawn(task.run());
    ChannelHandle::new(session, track_id, cancel)
  }
}

struct ChannelTask {
  endpoint: Url,
  session: SessionId,
  track_id: TrackId,
  events: EngineEventTx,
  cancel: CancellationToken,
}

impl ChannelTask {
  async fn run(self) {
    debug!(
      "session {}: connecting to {} for track {}",
      self.session, self.endpoint, self.track_id
    );

    let connected = tokio::select! {
      _ = self.cancel.cancelled() => {
        debug!("session {}: cancelled before connect finished", self.session);
        return;
      }
      result = tokio_tungstenite::connect_async(self.endpoint.as_str()) => result,
    };

    let ws_stream = match connected {
      Ok((ws_stream, _)) => ws_stream,
      Err(e) => {
        warn!("session {}: connect failed: {}", self.session, e);
        self.post(EngineEventKind::ChannelClosed(CloseReason::Error(
          ChannelError::from(e).to_string(),
        )));
        return;
      }
    };
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    if let Err(e) = ws_tx.send(protocol::handshake(self.track_id)).await {
      warn!("session {}: handshake failed: {}", self.session, e);
      self.post(EngineEventKind::ChannelClosed(CloseReason::Error(
        ChannelError::from(e).to_string(),
      )));
      return;
    }
    info!("session {}: streaming track {}", self.session, self.track_id);
    self.post(EngineEventKind::ChannelOpened);

    loop {
      tokio::select! {
        _ = self.cancel.cancelled() => {
          debug!("session {}: closing websocket", self.session);
          let _ = ws_tx.send(Message::Close(None)).await;
          let _ = ws_tx.close().await;
          return;
        }
        message = ws_rx.next() => match message {
          Some(Ok(Message::Close(frame))) => {
            debug!("session {}: server closed the stream: {:?}", self.session, frame);
            self.post(EngineEventKind::ChannelClosed(CloseReason::Remote));
            return;
          }
          Some(Ok(message)) => self.forward(message),
          Some(Err(e)) => {
            warn!("session {}: receive failed: {}", self.session, e);
            self.post(EngineEventKind::ChannelClosed(CloseReason::Error(
              ChannelError::from(e).to_string(),
            )));
            return;
          }
          None => {
            self.post(EngineEventKind::ChannelClosed(CloseReason::Remote));
            return;
          }
        }
      }
    }
  }

  fn forward(&self, message: Message) {
    match ServerFrame::from_message(message) {
      ServerFrame::Duration(seconds) => self.post(EngineEventKind::Duration(seconds)),
      ServerFrame::MalformedDuration(raw) => self.post(EngineEventKind::MalformedDuration(raw)),
      ServerFrame::Media(chunk) => self.post(EngineEventKind::Media(chunk)),
      ServerFrame::Ignored => debug!("session {}: ignoring frame", self.session),
    }
  }

  fn post(&self, kind: EngineEventKind) {
    // A cancelled channel belongs to a torn-down session; stay quiet.
    if self.cancel.is_cancelled() {
      return;
    }
    let event = EngineEvent {
      session: self.session,
      kind,
    };
    if self.events.send(event).is_err() {
      self.cancel.cancel();
    }
  }
}
