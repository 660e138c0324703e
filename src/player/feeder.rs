//! Buffered media feeder
//!
//! Network chunks arrive faster (or slower) than the decode sink consumes
//! them. The feeder keeps them in a FIFO and hands exactly one chunk at a
//! time to the sink, waiting for the sink's completion signal before the
//! next append.

use super::render::{DecodeSink, RenderError};
use std::collections::VecDeque;

#[derive(Default)]
pub struct MediaFeeder {
  pending: VecDeque<Vec<u8>>,
  sink: Option<Box<dyn DecodeSink>>,
  /// An append was issued and its completion has not been signalled yet
  updating: bool,
  appended: u64,
}

impl MediaFeeder {
  pub fn new() -> Self {
    Self::default()
  }

  /// Bind a freshly created decode sink and flush whatever queued up
  pub fn attach(&mut self, sink: Box<dyn DecodeSink>) -> Result<(), RenderError> {
    self.sink = Some(sink);
    self.updating = false;
    self.drain_once()
  }

  /// Queue `chunk` behind everything received so far, then try to drain
  pub fn enqueue(&mut self, chunk: Vec<u8>) -> Result<(), RenderError> {
    self.pending.push_back(chunk);
    self.drain_once()
  }

  /// Hand the head of the queue to the sink if it is idle
  pub fn drain_once(&mut self) -> Result<(), RenderError> {
    if self.updating {
      return Ok(());
    }
    let Some(sink) = self.sink.as_mut() else {
      return Ok(());
    };
    let Some(chunk) = self.pending.pop_front() else {
      return Ok(());
    };

    self.updating = true;
    match sink.append(chunk) {
      Ok(()) => {
        self.appended += 1;
        Ok(())
      }
      Err(e) => {
        self.updating = false;
        Err(e)
      }
    }
  }

  /// The sink finished the previous append
  pub fn on_append_complete(&mut self) -> Result<(), RenderError> {
    self.updating = false;
    self.drain_once()
  }

  /// Drop queued chunks and detach from the sink
  pub fn reset(&mut self) {
    self.pending.clear();
    self.sink = None;
    self.updating = false;
  }

  pub fn has_sink(&self) -> bool {
    self.sink.is_some()
  }

  pub fn is_updating(&self) -> bool {
    self.updating
  }

  pub fn pending_len(&self) -> usize {
    self.pending.len()
  }

  /// Number of chunks handed to the sink so far
  pub fn appended(&self) -> u64 {
    self.appended
  }
}
