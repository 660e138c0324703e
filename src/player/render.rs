//! Render element and decode sink seams
//!
//! The render element is a singleton owned by the controller. Each session
//! attaches a fresh decode sink to it and feeds encoded chunks through that
//! sink. A sink reports that it finished an append through its
//! [`SinkNotifier`], which posts an engine event instead of calling back
//! into the feeder directly.

use super::events::{EngineEvent, EngineEventKind, EngineEventTx};
use super::session::SessionId;
use log::debug;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
  /// No audio output could be opened
  #[error("audio output unavailable: {0}")]
  OutputUnavailable(String),
  /// The operation needs an attached source but none exists
  #[error("no source attached to the render element")]
  NoSource,
  /// The render element refused to start playback
  #[error("playback rejected: {0}")]
  PlayRejected(String),
  #[error("seek failed: {0}")]
  Seek(String),
  #[error("decode sink error: {0}")]
  Sink(String),
}

/// Append target for encoded audio
///
/// Exactly one append may be in flight; the sink signals completion through
/// the notifier it was created with.
pub trait DecodeSink {
  fn append(&mut self, chunk: Vec<u8>) -> Result<(), RenderError>;
}

/// The playback element the UI talks to
pub trait Renderer {
  /// Replace the current source with a fresh decode sink
  fn attach_source(&mut self, notifier: SinkNotifier) -> Result<Box<dyn DecodeSink>, RenderError>;
  /// Drop the current source, if any
  fn detach_source(&mut self);
  fn play(&mut self) -> Result<(), RenderError>;
  fn pause(&mut self);
  fn seek(&mut self, seconds: f64) -> Result<(), RenderError>;
  fn set_volume(&mut self, volume: f32);
  fn volume(&self) -> f32;
  /// Current playback position in seconds
  fn position(&self) -> f64;
}

/// Callback handle given to a decode sink
#[derive(Debug, Clone)]
pub struct SinkNotifier {
  session: SessionId,
  events: EngineEventTx,
}

impl SinkNotifier {
  pub fn new(session: SessionId, events: EngineEventTx) -> Self {
    Self { session, events }
  }

  pub fn session(&self) -> SessionId {
    self.session
  }

  /// The previous append finished; the sink accepts more data
  pub fn append_complete(&self) {
    self.post(EngineEventKind::AppendComplete);
  }

  /// The sink hit an unrecoverable error
  pub fn failed(&self, message: impl Into<String>) {
    self.post(EngineEventKind::SinkFailed(message.into()));
  }

  fn post(&self, kind: EngineEventKind) {
    if self
      .events
      .send(EngineEvent {
        session: self.session,
        kind,
      })
      .is_err()
    {
      debug!("session {}: engine gone, sink event dropped", self.session);
    }
  }
}

/// Render element that acknowledges every append and discards the audio
///
/// Used when the crate is built without an audio backend.
#[derive(Debug)]
pub struct NullRenderer {
  volume: f32,
  playing: bool,
  attached: bool,
  position: f64,
}

impl Default for NullRenderer {
  fn default() -> Self {
    Self {
      volume: 1.0,
      playing: false,
      attached: false,
      position: 0.0,
    }
  }
}

struct NullSink {
  notifier: SinkNotifier,
}

impl DecodeSink for NullSink {
  fn append(&mut self, _chunk: Vec<u8>) -> Result<(), RenderError> {
    self.notifier.append_complete();
    Ok(())
  }
}

impl Renderer for NullRenderer {
  fn attach_source(&mut self, notifier: SinkNotifier) -> Result<Box<dyn DecodeSink>, RenderError> {
    self.attached = true;
    self.position = 0.0;
    Ok(Box::new(NullSink { notifier }))
  }

  fn detach_source(&mut self) {
    self.attached = false;
    self.playing = false;
    self.position = 0.0;
  }

  fn play(&mut self) -> Result<(), RenderError> {
    if !self.attached {
      return Err(RenderError::NoSource);
    }
    self.playing = true;
    Ok(())
  }

  fn pause(&mut self) {
    self.playing = false;
  }

  fn seek(&mut self, seconds: f64) -> Result<(), RenderError> {
    if !self.attached {
      return Err(RenderError::NoSource);
    }
    self.position = seconds.max(0.0);
    Ok(())
  }

  fn set_volume(&mut self, volume: f32) {
    self.volume = volume;
  }

  fn volume(&self) -> f32 {
    self.volume
  }

  fn position(&self) -> f64 {
    self.position
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tokio::sync::mpsc;

  #[test]
  fn null_sink_acknowledges_each_append() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut renderer = NullRenderer::default();
    let mut sink = renderer
      .attach_source(SinkNotifier::new(SessionId(3), tx))
      .unwrap();

    sink.append(vec![1, 2, 3]).unwrap();

    let event = rx.try_recv().unwrap();
    assert_eq!(event.session, SessionId(3));
    assert!(matches!(event.kind, EngineEventKind::AppendComplete));
    assert!(rx.try_recv().is_err());
  }

  #[test]
  fn null_renderer_needs_a_source_to_play() {
    let mut renderer = NullRenderer::default();
    assert_eq!(renderer.play(), Err(RenderError::NoSource));
  }
}
