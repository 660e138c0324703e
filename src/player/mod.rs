//! Streaming playback engine
//!
//! Streams one track at a time from the service's audio-stream websocket,
//! feeds the encoded chunks into a decode sink and exposes transport
//! controls. The engine runs on its own worker thread; the UI holds a
//! [`PlayerHandle`] and talks to it through commands and events.

mod channel;
mod commands;
mod controller;
mod events;
mod feeder;
mod protocol;
mod render;
#[cfg(feature = "rodio-backend")]
mod rodio_backend;
mod session;
mod state;
mod worker;

pub use channel::{ChannelError, ChannelHandle, Connector, WebSocketConnector};
pub use commands::{clamp_volume, PlayerCommand};
pub use controller::{ControllerConfig, PlaybackController};
pub use events::{CloseReason, EngineEvent, EngineEventKind, NotificationKind, PlayerEvent};
pub use feeder::MediaFeeder;
pub use protocol::ServerFrame;
pub use render::{DecodeSink, NullRenderer, RenderError, Renderer, SinkNotifier};
#[cfg(feature = "rodio-backend")]
pub use rodio_backend::{RodioRenderer, StreamBuffer};
pub use session::{PlaybackSession, SessionId, TrackId};
pub use state::{PlaybackState, ToggleAction};
pub use worker::{spawn_player_worker, PlayerWorker, PlayerWorkerConfig};

use std::sync::mpsc;

/// Render element used by [`spawn_player_worker`]
#[cfg(feature = "rodio-backend")]
pub type DefaultRenderer = RodioRenderer;
#[cfg(not(feature = "rodio-backend"))]
pub type DefaultRenderer = NullRenderer;

/// The one capability a parent view needs from the player
pub trait PlayPauseToggle {
  fn toggle_play_pause(&self);
}

/// Handle for controlling the player from the main application
pub struct PlayerHandle {
  /// Sender to send commands to the player worker thread
  pub command_tx: mpsc::Sender<PlayerCommand>,
  /// Receiver to receive events from the player worker thread
  pub event_rx: mpsc::Receiver<PlayerEvent>,
  /// Current playback state, as reported by the worker
  pub state: PlayerState,
}

impl PlayerHandle {
  /// Create a new player handle
  pub fn new(
    command_tx: mpsc::Sender<PlayerCommand>,
    event_rx: mpsc::Receiver<PlayerEvent>,
  ) -> Self {
    Self {
      command_tx,
      event_rx,
      state: PlayerState::default(),
    }
  }

  /// Send a command to the player worker
  pub fn send_command(&self, cmd: PlayerCommand) -> Result<(), mpsc::SendError<PlayerCommand>> {
    self.command_tx.send(cmd)
  }

  /// Try to receive an event from the player worker (non-blocking),
  /// folding it into [`PlayerHandle::state`]
  pub fn try_recv_event(&mut self) -> Option<PlayerEvent> {
    let event = self.event_rx.try_recv().ok()?;
    self.state.apply(&event);
    Some(event)
  }

  /// Selecting the track that already has a session toggles it instead of
  /// restarting it
  pub fn select_or_toggle(&self, track_id: TrackId) -> Result<(), mpsc::SendError<PlayerCommand>> {
    if self.state.current_track == Some(track_id) && self.state.has_session {
      self.send_command(PlayerCommand::TogglePlayPause)
    } else {
      self.send_command(PlayerCommand::SelectTrack(track_id))
    }
  }
}

impl PlayPauseToggle for PlayerHandle {
  fn toggle_play_pause(&self) {
    if self.send_command(PlayerCommand::TogglePlayPause).is_err() {
      log::warn!("player worker is gone; toggle dropped");
    }
  }
}

/// Player state as seen from the UI thread
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerState {
  /// Whether playback is currently active
  pub is_playing: bool,
  /// Whether a session exists for `current_track`
  pub has_session: bool,
  /// Track of the current (or last) session
  pub current_track: Option<TrackId>,
  pub title: Option<String>,
  /// Current position in seconds
  pub position_secs: f64,
  /// Duration of current track in seconds
  pub duration_secs: u32,
  /// Current volume (0.0 - 1.0)
  pub volume: f32,
  pub is_liked: bool,
  /// Most recent notification
  pub last_notification: Option<(NotificationKind, String)>,
}

impl Default for PlayerState {
  fn default() -> Self {
    Self {
      is_playing: false,
      has_session: false,
      current_track: None,
      title: None,
      position_secs: 0.0,
      duration_secs: 0,
      volume: 1.0,
      is_liked: false,
      last_notification: None,
    }
  }
}

impl PlayerState {
  pub fn apply(&mut self, event: &PlayerEvent) {
    if let Some(is_playing) = event.playing_flag() {
      self.is_playing = is_playing;
    }
    match event {
      PlayerEvent::Loading { track_id, title } => {
        self.has_session = true;
        self.current_track = Some(*track_id);
        self.title = title.clone();
        self.position_secs = 0.0;
        self.duration_secs = 0;
      }
      PlayerEvent::Playing {
        track_id,
        position_secs,
        duration_secs,
      } => {
        self.current_track = Some(*track_id);
        self.position_secs = *position_secs;
        self.duration_secs = *duration_secs;
      }
      PlayerEvent::Paused { position_secs, .. } => self.position_secs = *position_secs,
      PlayerEvent::Stopped { .. } => self.has_session = false,
      PlayerEvent::DurationChanged { duration_secs } => self.duration_secs = *duration_secs,
      PlayerEvent::Position {
        position_secs,
        duration_secs,
      } => {
        self.position_secs = *position_secs;
        self.duration_secs = *duration_secs;
      }
      PlayerEvent::VolumeChanged { volume } => self.volume = *volume,
      PlayerEvent::LikeChanged { is_liked, .. } => self.is_liked = *is_liked,
      PlayerEvent::Notification { kind, message } => {
        self.last_notification = Some((*kind, message.clone()))
      }
      PlayerEvent::Shutdown => {
        self.is_playing = false;
        self.has_session = false;
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn handle() -> (PlayerHandle, mpsc::Receiver<PlayerCommand>, mpsc::Sender<PlayerEvent>) {
    let (cmd_tx, cmd_rx) = mpsc::channel();
    let (event_tx, event_rx) = mpsc::channel();
    (PlayerHandle::new(cmd_tx, event_rx), cmd_rx, event_tx)
  }

  #[test]
  fn state_follows_events() {
    let (mut player, _cmds, events) = handle();
    events
      .send(PlayerEvent::Loading {
        track_id: TrackId(42),
        title: Some("Sample Song".to_string()),
      })
      .unwrap();
    events
      .send(PlayerEvent::Playing {
        track_id: TrackId(42),
        position_secs: 0.0,
        duration_secs: 213,
      })
      .unwrap();
    events.send(PlayerEvent::VolumeChanged { volume: 0.3 }).unwrap();

    while player.try_recv_event().is_some() {}

    assert!(player.state.is_playing);
    assert!(player.state.has_session);
    assert_eq!(player.state.current_track, Some(TrackId(42)));
    assert_eq!(player.state.duration_secs, 213);
    assert_eq!(player.state.volume, 0.3);

    events
      .send(PlayerEvent::Stopped {
        track_id: Some(TrackId(42)),
      })
      .unwrap();
    player.try_recv_event();
    assert!(!player.state.is_playing);
    assert!(!player.state.has_session);
    assert_eq!(player.state.volume, 0.3);
  }

  #[test]
  fn reselecting_the_live_track_toggles() {
    let (mut player, cmds, events) = handle();
    player.select_or_toggle(TrackId(42)).unwrap();
    assert_eq!(cmds.try_recv().unwrap(), PlayerCommand::SelectTrack(TrackId(42)));

    events
      .send(PlayerEvent::Loading {
        track_id: TrackId(42),
        title: None,
      })
      .unwrap();
    player.try_recv_event();

    player.select_or_toggle(TrackId(42)).unwrap();
    assert_eq!(cmds.try_recv().unwrap(), PlayerCommand::TogglePlayPause);
    player.select_or_toggle(TrackId(7)).unwrap();
    assert_eq!(cmds.try_recv().unwrap(), PlayerCommand::SelectTrack(TrackId(7)));
  }

  #[test]
  fn toggle_handle_sends_a_single_command() {
    let (player, cmds, _events) = handle();
    let toggle: &dyn PlayPauseToggle = &player;
    toggle.toggle_play_pause();
    assert_eq!(cmds.try_recv().unwrap(), PlayerCommand::TogglePlayPause);
    assert!(cmds.try_recv().is_err());
  }
}
