//! Transport state machine
//!
//! Pure transition rules, free of any I/O. The controller feeds triggers in
//! and performs the side effects that go with each transition.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
  /// No track was ever selected
  #[default]
  Idle,
  /// A session exists; waiting for the stream to start playing
  Connecting,
  Playing,
  Paused,
  /// The session ended normally (stop request, server close)
  Stopped,
  /// The session ended because something failed
  Errored,
}

/// Inputs to the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
  /// A new session was opened (after tearing down the previous one)
  SelectTrack,
  ChannelOpened,
  /// The render element accepted `play`
  PlaybackStarted,
  /// The render element refused `play`
  PlayRejected,
  Pause,
  /// The channel closed; `error` distinguishes failures from a normal close
  ChannelClosed { error: bool },
  /// Connect timeout or decode sink failure
  Failed,
  Stop,
}

/// What a play/pause toggle should do in a given state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleAction {
  Pause,
  Resume,
  /// No live session, but a track is remembered: open a new session for it
  Reopen,
  /// Still connecting: flip whether playback starts once the channel opens
  FlipAutoplay,
  /// Nothing selected yet
  Ignore,
}

impl PlaybackState {
  pub fn on(self, trigger: Trigger) -> PlaybackState {
    use PlaybackState::*;
    match (self, trigger) {
      (_, Trigger::SelectTrack) => Connecting,
      (Connecting, Trigger::ChannelOpened) => Connecting,
      (Connecting | Paused, Trigger::PlaybackStarted) => Playing,
      (Connecting | Playing | Paused, Trigger::PlayRejected) => Paused,
      (Connecting | Playing, Trigger::Pause) => Paused,
      (Connecting | Playing | Paused, Trigger::ChannelClosed { error: false }) => Stopped,
      (Connecting | Playing | Paused, Trigger::ChannelClosed { error: true }) => Errored,
      (Connecting | Playing | Paused, Trigger::Failed) => Errored,
      (Connecting | Playing | Paused, Trigger::Stop) => Stopped,
      (state, _) => state,
    }
  }

  /// True while a session (channel + sink) is alive
  pub fn has_session(self) -> bool {
    matches!(
      self,
      PlaybackState::Connecting | PlaybackState::Playing | PlaybackState::Paused
    )
  }

  pub fn is_playing(self) -> bool {
    self == PlaybackState::Playing
  }

  pub fn toggle_action(self, has_track: bool) -> ToggleAction {
    match self {
      PlaybackState::Playing => ToggleAction::Pause,
      PlaybackState::Paused => ToggleAction::Resume,
      PlaybackState::Connecting => ToggleAction::FlipAutoplay,
      PlaybackState::Idle | PlaybackState::Stopped | PlaybackState::Errored if has_track => {
        ToggleAction::Reopen
      }
      _ => ToggleAction::Ignore,
    }
  }
}
