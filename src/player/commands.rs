//! Commands for controlling the player
//!
//! These commands are sent from the UI thread to the player worker thread.

use super::session::TrackId;
use crate::api::SongDetails;

/// Commands that can be sent to the player worker
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCommand {
  /// Tear down the current session and stream a new track
  SelectTrack(TrackId),

  /// Pause when playing, resume (or re-open the remembered track) otherwise
  TogglePlayPause,

  /// Start/resume playback
  Play,

  /// Pause playback
  Pause,

  /// Stop playback and release the session
  Stop,

  /// Seek to a position (in seconds)
  Seek(f64),

  /// Set volume (0.0 - 1.0)
  SetVolume(f32),

  /// Metadata of the selected track, supplied by the surrounding UI
  SetCurrentSong(Option<SongDetails>),

  /// Whether the user is logged in
  SetAuthenticated(bool),

  /// Like or unlike the current song
  ToggleLike,

  /// Save the current song to the download directory
  Download,

  /// Shutdown the player worker
  Shutdown,
}

impl PlayerCommand {
  /// Create a select command from a raw id
  pub fn select(track_id: u64) -> Self {
    Self::SelectTrack(TrackId(track_id))
  }

  /// Create a volume command, clamping into 0.0 - 1.0
  pub fn volume(volume: f32) -> Self {
    Self::SetVolume(clamp_volume(volume))
  }
}

pub fn clamp_volume(volume: f32) -> f32 {
  if volume.is_nan() {
    return 0.0;
  }
  volume.clamp(0.0, 1.0)
}
