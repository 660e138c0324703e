//! Render element backed by rodio
//!
//! Appended chunks land in a growable byte buffer. A decoder thread reads
//! that buffer through a blocking reader, so symphonia sees one continuous
//! MPEG stream while the network is still delivering it.

use super::render::{DecodeSink, RenderError, Renderer, SinkNotifier};
use log::{debug, info};
use parking_lot::{Condvar, Mutex};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Default)]
struct BufferState {
  data: Vec<u8>,
  /// Set on detach; readers see end-of-stream right away
  aborted: bool,
}

#[derive(Default)]
struct Shared {
  state: Mutex<BufferState>,
  ready: Condvar,
}

/// Append side of the stream buffer
#[derive(Clone, Default)]
pub struct StreamBuffer {
  shared: Arc<Shared>,
}

impl StreamBuffer {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&self, chunk: &[u8]) {
    let mut state = self.shared.state.lock();
    if state.aborted {
      return;
    }
    state.data.extend_from_slice(chunk);
    self.shared.ready.notify_all();
  }

  pub fn abort(&self) {
    self.shared.state.lock().aborted = true;
    self.shared.ready.notify_all();
  }

  pub fn is_aborted(&self) -> bool {
    self.shared.state.lock().aborted
  }

  pub fn len(&self) -> usize {
    self.shared.state.lock().data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn reader(&self) -> StreamReader {
    StreamReader {
      shared: self.shared.clone(),
      pos: 0,
    }
  }
}

/// Blocking `Read + Seek` view over a [`StreamBuffer`]
pub struct StreamReader {
  shared: Arc<Shared>,
  pos: u64,
}

impl Read for StreamReader {
  fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
    if buf.is_empty() {
      return Ok(0);
    }
    let mut state = self.shared.state.lock();
    loop {
      if state.aborted {
        return Ok(0);
      }
      let available = state.data.len() as u64;
      if self.pos < available {
        let start = self.pos as usize;
        let n = buf.len().min(state.data.len() - start);
        buf[..n].copy_from_slice(&state.data[start..start + n]);
        self.pos += n as u64;
        return Ok(n);
      }
      self.shared.ready.wait(&mut state);
    }
  }
}

impl Seek for StreamReader {
  fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
    let target = match pos {
      SeekFrom::Start(offset) => i128::from(offset),
      SeekFrom::Current(delta) => i128::from(self.pos) + i128::from(delta),
      SeekFrom::End(_) => {
        return Err(io::Error::new(
          io::ErrorKind::Unsupported,
          "stream length is not known while streaming",
        ))
      }
    };
    if target < 0 {
      return Err(io::Error::new(
        io::ErrorKind::InvalidInput,
        "seek before start of stream",
      ));
    }
    self.pos = target as u64;
    Ok(self.pos)
  }
}

struct RodioSink {
  buffer: StreamBuffer,
  notifier: SinkNotifier,
}

impl DecodeSink for RodioSink {
  fn append(&mut self, chunk: Vec<u8>) -> Result<(), RenderError> {
    if self.buffer.is_aborted() {
      return Err(RenderError::NoSource);
    }
    self.buffer.push(&chunk);
    self.notifier.append_complete();
    Ok(())
  }
}

struct AttachedSource {
  sink: Arc<Sink>,
  buffer: StreamBuffer,
}

impl Drop for AttachedSource {
  fn drop(&mut self) {
    self.buffer.abort();
    self.sink.stop();
  }
}

/// Plays through the default output device
pub struct RodioRenderer {
  output: Option<(OutputStream, OutputStreamHandle)>,
  source: Option<AttachedSource>,
  volume: f32,
}

impl Default for RodioRenderer {
  fn default() -> Self {
    Self::new()
  }
}

impl RodioRenderer {
  pub fn new() -> Self {
    Self {
      output: None,
      source: None,
      volume: 1.0,
    }
  }

  /// Opened on first use so that a missing device only fails playback
  fn output_handle(&mut self) -> Result<&OutputStreamHandle, RenderError> {
    let output = match self.output.take() {
      Some(output) => output,
      None => {
        let output = OutputStream::try_default()
          .map_err(|e| RenderError::OutputUnavailable(e.to_string()))?;
        info!("audio output opened");
        output
      }
    };
    let (_, handle) = self.output.insert(output);
    Ok(handle)
  }
}

fn spawn_decoder(
  buffer: StreamBuffer,
  sink: Arc<Sink>,
  notifier: SinkNotifier,
) -> Result<(), RenderError> {
  let name = format!("decoder-{}", notifier.session().0);
  thread::Builder::new()
    .name(name)
    .spawn(move || match Decoder::new(buffer.reader()) {
      Ok(decoder) => {
        if !buffer.is_aborted() {
          debug!("session {}: decoder ready", notifier.session());
          sink.append(decoder);
        }
      }
      Err(e) => {
        if !buffer.is_aborted() {
          notifier.failed(e.to_string());
        }
      }
    })
    .map(|_| ())
    .map_err(|e| RenderError::Sink(format!("could not start decoder: {}", e)))
}

impl Renderer for RodioRenderer {
  fn attach_source(&mut self, notifier: SinkNotifier) -> Result<Box<dyn DecodeSink>, RenderError> {
    self.detach_source();
    let volume = self.volume;
    let handle = self.output_handle()?;
    let sink = Sink::try_new(handle).map_err(|e| RenderError::OutputUnavailable(e.to_string()))?;
    sink.pause();
    sink.set_volume(volume);
    let sink = Arc::new(sink);

    let buffer = StreamBuffer::new();
    spawn_decoder(buffer.clone(), sink.clone(), notifier.clone())?;
    self.source = Some(AttachedSource {
      sink,
      buffer: buffer.clone(),
    });
    Ok(Box::new(RodioSink { buffer, notifier }))
  }

  fn detach_source(&mut self) {
    if self.source.take().is_some() {
      debug!("audio source detached");
    }
  }

  fn play(&mut self) -> Result<(), RenderError> {
    let source = self.source.as_ref().ok_or(RenderError::NoSource)?;
    source.sink.play();
    Ok(())
  }

  fn pause(&mut self) {
    if let Some(source) = &self.source {
      source.sink.pause();
    }
  }

  fn seek(&mut self, seconds: f64) -> Result<(), RenderError> {
    let source = self.source.as_ref().ok_or(RenderError::NoSource)?;
    source
      .sink
      .try_seek(Duration::from_secs_f64(seconds.max(0.0)))
      .map_err(|e| RenderError::Seek(format!("{:?}", e)))
  }

  fn set_volume(&mut self, volume: f32) {
    self.volume = volume;
    if let Some(source) = &self.source {
      source.sink.set_volume(volume);
    }
  }

  fn volume(&self) -> f32 {
    self.volume
  }

  fn position(&self) -> f64 {
    self
      .source
      .as_ref()
      .map_or(0.0, |source| source.sink.get_pos().as_secs_f64())
  }
}
