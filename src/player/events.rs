//! Events emitted by the player
//!
//! [`PlayerEvent`]s travel from the player worker thread to the UI thread.
//! [`EngineEvent`]s are internal: the transport channel and the decode sink
//! post them back to the controller running on the worker thread.

use super::session::{SessionId, TrackId};
use std::fmt;
use tokio::sync::mpsc;

/// Severity of a user-facing notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
  Success,
  Error,
  Warning,
  Info,
}

impl fmt::Display for NotificationKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let label = match self {
      NotificationKind::Success => "success",
      NotificationKind::Error => "error",
      NotificationKind::Warning => "warning",
      NotificationKind::Info => "info",
    };
    f.write_str(label)
  }
}

/// Events emitted by the player worker
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
  /// A session was opened for a track and is waiting for the stream
  Loading {
    track_id: TrackId,
    title: Option<String>,
  },

  /// Playback has started or resumed
  Playing {
    track_id: TrackId,
    /// Current position in seconds
    position_secs: f64,
    /// Track duration in seconds (0 when unknown)
    duration_secs: u32,
  },

  /// Playback has been paused
  Paused {
    track_id: TrackId,
    position_secs: f64,
  },

  /// The session ended (track change, stop, channel closed or failed)
  Stopped { track_id: Option<TrackId> },

  /// The metadata frame announced the track length
  DurationChanged { duration_secs: u32 },

  /// Position update (sent periodically during playback)
  Position {
    position_secs: f64,
    duration_secs: u32,
  },

  /// Volume has changed (0.0 - 1.0)
  VolumeChanged { volume: f32 },

  /// The like flag of the current song changed
  LikeChanged { track_id: TrackId, is_liked: bool },

  /// Something the user should see
  Notification {
    kind: NotificationKind,
    message: String,
  },

  /// Player worker has shut down
  Shutdown,
}

impl PlayerEvent {
  pub fn error(message: impl Into<String>) -> Self {
    PlayerEvent::Notification {
      kind: NotificationKind::Error,
      message: message.into(),
    }
  }

  pub fn warning(message: impl Into<String>) -> Self {
    PlayerEvent::Notification {
      kind: NotificationKind::Warning,
      message: message.into(),
    }
  }

  pub fn success(message: impl Into<String>) -> Self {
    PlayerEvent::Notification {
      kind: NotificationKind::Success,
      message: message.into(),
    }
  }

  /// Returns true if this is an error notification
  pub fn is_error(&self) -> bool {
    matches!(
      self,
      PlayerEvent::Notification {
        kind: NotificationKind::Error,
        ..
      }
    )
  }

  /// Returns true if this is a playing event
  pub fn is_playing(&self) -> bool {
    matches!(self, PlayerEvent::Playing { .. })
  }

  /// Returns true if this is a paused event
  pub fn is_paused(&self) -> bool {
    matches!(self, PlayerEvent::Paused { .. })
  }

  /// The externally observable `is_playing` flag this event implies, if any
  pub fn playing_flag(&self) -> Option<bool> {
    match self {
      PlayerEvent::Playing { .. } => Some(true),
      PlayerEvent::Paused { .. } | PlayerEvent::Stopped { .. } | PlayerEvent::Loading { .. } => {
        Some(false)
      }
      _ => None,
    }
  }
}

/// Why a channel stopped delivering frames
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
  /// The server closed the connection
  Remote,
  /// Connecting, sending or receiving failed
  Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEventKind {
  /// Connection established and handshake sent
  ChannelOpened,
  /// The server announced the track length
  Duration(u32),
  /// A `duration:` frame that did not parse
  MalformedDuration(String),
  /// Encoded audio, in arrival order
  Media(Vec<u8>),
  ChannelClosed(CloseReason),
  /// The decode sink finished the previous append
  AppendComplete,
  SinkFailed(String),
}

/// Internal event tagged with the session that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct EngineEvent {
  pub session: SessionId,
  pub kind: EngineEventKind,
}

pub type EngineEventTx = mpsc::UnboundedSender<EngineEvent>;
pub type EngineEventRx = mpsc::UnboundedReceiver<EngineEvent>;
