//! One "now playing" attempt and the resources it owns

use super::channel::{self, ChannelHandle};
use super::feeder::MediaFeeder;
use log::debug;
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

/// Server-side identifier of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl FromStr for TrackId {
  type Err = std::num::ParseIntError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    s.trim().parse().map(TrackId)
  }
}

/// Monotonic tag carried by every engine event so that late callbacks from a
/// torn-down session can be recognised and dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "#{}", self.0)
  }
}

/// Resources bound to one selected track
///
/// The session exclusively owns its channel and decode sink. Both are
/// released by [`PlaybackSession::teardown`], which is safe to call any
/// number of times.
pub struct PlaybackSession {
  pub id: SessionId,
  pub track_id: TrackId,
  channel: Option<ChannelHandle>,
  pub(crate) feeder: MediaFeeder,
  /// Known once the metadata frame arrives, 0 before
  pub duration_seconds: u32,
  pub position_seconds: f64,
  pub started_at: Instant,
  /// Whether at least one media chunk arrived on the channel
  pub media_received: bool,
}

impl PlaybackSession {
  pub fn new(id: SessionId, track_id: TrackId, feeder: MediaFeeder, started_at: Instant) -> Self {
    Self {
      id,
      track_id,
      channel: None,
      feeder,
      duration_seconds: 0,
      position_seconds: 0.0,
      started_at,
      media_received: false,
    }
  }

  pub fn attach_channel(&mut self, channel: ChannelHandle) {
    if let Some(previous) = self.channel.replace(channel) {
      previous.close();
    }
  }

  pub fn channel(&self) -> Option<&ChannelHandle> {
    self.channel.as_ref()
  }

  /// Close the channel, detach the sink and drop queued chunks
  pub fn teardown(&mut self) {
    if self.channel.is_some() {
      debug!("session {}: closing channel for track {}", self.id, self.track_id);
    }
    channel::close(&mut self.channel);
    self.feeder.reset();
  }

  pub fn is_torn_down(&self) -> bool {
    self.channel.is_none() && !self.feeder.has_sink()
  }
}

impl Drop for PlaybackSession {
  fn drop(&mut self) {
    self.teardown();
  }
}
