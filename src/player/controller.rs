//! Playback controller
//!
//! Owns the render element, the current [`PlaybackSession`] and the user's
//! volume preference. Every input (user command, channel frame, sink
//! callback, timer tick) is handled synchronously on the worker thread, so
//! there is never more than one session's resources alive.

use super::channel::Connector;
use super::commands::{clamp_volume, PlayerCommand};
use super::events::{
  CloseReason, EngineEvent, EngineEventKind, EngineEventTx, NotificationKind, PlayerEvent,
};
use super::feeder::MediaFeeder;
use super::render::{RenderError, Renderer, SinkNotifier};
use super::session::{PlaybackSession, SessionId, TrackId};
use super::state::{PlaybackState, ToggleAction, Trigger};
use crate::api::SongDetails;
use log::{debug, info, warn};
use std::sync::mpsc;
use std::time::{Duration, Instant};

/// Smallest position change worth reporting
const POSITION_EPSILON: f64 = 0.05;

#[derive(Debug, Clone)]
pub struct ControllerConfig {
  pub initial_volume: f32,
  /// `None` waits for the stream forever
  pub connect_timeout: Option<Duration>,
}

impl Default for ControllerConfig {
  fn default() -> Self {
    Self {
      initial_volume: 1.0,
      connect_timeout: Some(Duration::from_secs(10)),
    }
  }
}

pub struct PlaybackController<R: Renderer, C: Connector> {
  renderer: R,
  connector: C,
  engine_tx: EngineEventTx,
  updates: mpsc::Sender<PlayerEvent>,
  state: PlaybackState,
  session: Option<PlaybackSession>,
  /// Last track the user asked for; survives session teardown
  selected_track: Option<TrackId>,
  current_song: Option<SongDetails>,
  is_authenticated: bool,
  volume: f32,
  /// Whether the session starts playing as soon as its channel opens
  play_on_open: bool,
  next_session: u64,
  connect_timeout: Option<Duration>,
}

impl<R: Renderer, C: Connector> PlaybackController<R, C> {
  pub fn new(
    mut renderer: R,
    connector: C,
    engine_tx: EngineEventTx,
    updates: mpsc::Sender<PlayerEvent>,
    config: ControllerConfig,
  ) -> Self {
    let volume = clamp_volume(config.initial_volume);
    renderer.set_volume(volume);
    Self {
      renderer,
      connector,
      engine_tx,
      updates,
      state: PlaybackState::Idle,
      session: None,
      selected_track: None,
      current_song: None,
      is_authenticated: false,
      volume,
      play_on_open: true,
      next_session: 1,
      connect_timeout: config.connect_timeout,
    }
  }

  /// Apply a command; returns true when the worker should shut down
  pub fn handle_command(&mut self, cmd: PlayerCommand) -> bool {
    match cmd {
      PlayerCommand::SelectTrack(track_id) => self.select_track(track_id),
      PlayerCommand::TogglePlayPause => self.toggle_play_pause(),
      PlayerCommand::Play => self.play(),
      PlayerCommand::Pause => self.pause(),
      PlayerCommand::Stop => self.stop(),
      PlayerCommand::Seek(seconds) => self.seek(seconds),
      PlayerCommand::SetVolume(volume) => self.set_volume(volume),
      PlayerCommand::SetCurrentSong(song) => self.current_song = song,
      PlayerCommand::SetAuthenticated(authenticated) => self.is_authenticated = authenticated,
      PlayerCommand::ToggleLike | PlayerCommand::Download => {
        debug!("like/download need the REST client; ignored by the controller");
      }
      PlayerCommand::Shutdown => {
        self.teardown();
        return true;
      }
    }
    false
  }

  /// Apply an event posted by a channel or a decode sink
  pub fn handle_engine_event(&mut self, event: EngineEvent) {
    let Some(session) = self.session.as_ref() else {
      debug!("dropping {:?} for session {}: no live session", event.kind, event.session);
      return;
    };
    if session.id != event.session {
      debug!(
        "dropping {:?} for stale session {} (live: {})",
        event.kind, event.session, session.id
      );
      return;
    }

    match event.kind {
      EngineEventKind::ChannelOpened => self.on_channel_opened(),
      EngineEventKind::Duration(seconds) => {
        if let Some(session) = self.session.as_mut() {
          session.duration_seconds = seconds;
        }
        self.emit(PlayerEvent::DurationChanged {
          duration_secs: seconds,
        });
      }
      EngineEventKind::MalformedDuration(raw) => {
        self.emit(PlayerEvent::warning(format!(
          "Ignoring malformed track duration '{}'",
          raw
        )));
      }
      EngineEventKind::Media(chunk) => {
        let result = match self.session.as_mut() {
          Some(session) => {
            session.media_received = true;
            session.feeder.enqueue(chunk)
          }
          None => Ok(()),
        };
        if let Err(e) = result {
          self.fail(format!("Audio buffer error: {}", e));
        }
      }
      EngineEventKind::AppendComplete => {
        let result = match self.session.as_mut() {
          Some(session) => session.feeder.on_append_complete(),
          None => Ok(()),
        };
        if let Err(e) = result {
          self.fail(format!("Audio buffer error: {}", e));
        }
      }
      EngineEventKind::SinkFailed(message) => {
        self.fail(format!("Audio decode error: {}", message));
      }
      EngineEventKind::ChannelClosed(reason) => self.on_channel_closed(reason),
    }
  }

  /// Periodic housekeeping: connect timeout and position reporting
  pub fn tick(&mut self, now: Instant) {
    let Some(session) = self.session.as_ref() else {
      return;
    };

    if let Some(timeout) = self.connect_timeout {
      if !session.media_received && now.saturating_duration_since(session.started_at) >= timeout {
        let track_id = session.track_id;
        self.fail(format!(
          "Timed out after {}s waiting for the stream of track {}",
          timeout.as_secs(),
          track_id
        ));
        return;
      }
    }

    if !self.state.is_playing() {
      return;
    }
    let position = self.renderer.position();
    let Some(session) = self.session.as_mut() else {
      return;
    };
    if (position - session.position_seconds).abs() >= POSITION_EPSILON {
      session.position_seconds = position;
      let duration_secs = session.duration_seconds;
      self.emit(PlayerEvent::Position {
        position_secs: position,
        duration_secs,
      });
    }
  }

  pub fn select_track(&mut self, track_id: TrackId) {
    self.teardown();
    self.selected_track = Some(track_id);
    self.state = self.state.on(Trigger::SelectTrack);
    self.play_on_open = true;

    let session_id = SessionId(self.next_session);
    self.next_session += 1;

    let notifier = SinkNotifier::new(session_id, self.engine_tx.clone());
    let sink = match self.renderer.attach_source(notifier) {
      Ok(sink) => sink,
      Err(e) => {
        self.fail(format!("Could not prepare audio output: {}", e));
        return;
      }
    };
    self.renderer.set_volume(self.volume);

    let mut feeder = MediaFeeder::new();
    if let Err(e) = feeder.attach(sink) {
      self.renderer.detach_source();
      self.fail(format!("Could not prepare audio output: {}", e));
      return;
    }

    let mut session = PlaybackSession::new(session_id, track_id, feeder, Instant::now());
    let channel = self
      .connector
      .open(session_id, track_id, self.engine_tx.clone());
    session.attach_channel(channel);
    self.session = Some(session);

    info!("session {}: loading track {}", session_id, track_id);
    let title = self
      .current_song
      .as_ref()
      .filter(|song| song.track_id() == track_id)
      .map(|song| song.title.clone());
    self.emit(PlayerEvent::Loading { track_id, title });
  }

  pub fn toggle_play_pause(&mut self) {
    match self.state.toggle_action(self.selected_track.is_some()) {
      ToggleAction::Pause => self.pause(),
      ToggleAction::Resume => self.start_playback(),
      ToggleAction::Reopen => {
        if let Some(track_id) = self.selected_track {
          self.select_track(track_id);
        }
      }
      ToggleAction::FlipAutoplay => {
        self.play_on_open = !self.play_on_open;
        debug!("play on open is now {}", self.play_on_open);
      }
      ToggleAction::Ignore => debug!("toggle ignored: no track selected"),
    }
  }

  pub fn play(&mut self) {
    match self.state {
      PlaybackState::Playing => {}
      PlaybackState::Connecting => self.play_on_open = true,
      _ => {
        if self.state.toggle_action(self.selected_track.is_some()) != ToggleAction::Pause {
          self.toggle_play_pause();
        }
      }
    }
  }

  pub fn pause(&mut self) {
    match self.state {
      PlaybackState::Playing => {
        self.renderer.pause();
        self.state = self.state.on(Trigger::Pause);
        let position_secs = self.position_seconds();
        if let Some(track_id) = self.session_track() {
          self.emit(PlayerEvent::Paused {
            track_id,
            position_secs,
          });
        }
      }
      PlaybackState::Connecting => self.play_on_open = false,
      _ => {}
    }
  }

  pub fn stop(&mut self) {
    if self.teardown() {
      self.state = self.state.on(Trigger::Stop);
    }
  }

  pub fn seek(&mut self, seconds: f64) {
    let Some(session) = self.session.as_ref() else {
      self.emit(PlayerEvent::warning("Nothing is playing; seek skipped"));
      return;
    };
    let mut target = if seconds.is_finite() {
      seconds.max(0.0)
    } else {
      0.0
    };
    if session.duration_seconds > 0 {
      target = target.min(f64::from(session.duration_seconds));
    }
    let duration_secs = session.duration_seconds;

    match self.renderer.seek(target) {
      Ok(()) => {
        if let Some(session) = self.session.as_mut() {
          session.position_seconds = target;
        }
        self.emit(PlayerEvent::Position {
          position_secs: target,
          duration_secs,
        });
      }
      Err(RenderError::NoSource) => {
        self.emit(PlayerEvent::warning("No audio source attached; seek skipped"));
      }
      Err(e) => self.emit(PlayerEvent::warning(format!(
        "Could not seek to {:.1}s: {}",
        target, e
      ))),
    }
  }

  pub fn set_volume(&mut self, volume: f32) {
    let volume = clamp_volume(volume);
    self.volume = volume;
    self.renderer.set_volume(volume);
    self.emit(PlayerEvent::VolumeChanged { volume });
  }

  /// Record the outcome of a like toggle for the current song
  pub fn set_liked(&mut self, track_id: TrackId, is_liked: bool) {
    match self.current_song.as_mut() {
      Some(song) if song.track_id() == track_id => {
        song.is_liked = is_liked;
        self.emit(PlayerEvent::LikeChanged { track_id, is_liked });
      }
      _ => debug!("like result for track {} no longer current", track_id),
    }
  }

  /// Surface a message to the UI
  pub fn notify(&self, event: PlayerEvent) {
    self.emit(event);
  }

  pub fn state(&self) -> PlaybackState {
    self.state
  }

  pub fn is_playing(&self) -> bool {
    self.state.is_playing()
  }

  pub fn volume(&self) -> f32 {
    self.volume
  }

  pub fn selected_track(&self) -> Option<TrackId> {
    self.selected_track
  }

  pub fn current_song(&self) -> Option<&SongDetails> {
    self.current_song.as_ref()
  }

  pub fn is_authenticated(&self) -> bool {
    self.is_authenticated
  }

  pub fn session(&self) -> Option<&PlaybackSession> {
    self.session.as_ref()
  }

  pub fn position_seconds(&self) -> f64 {
    self
      .session
      .as_ref()
      .map_or(0.0, |session| session.position_seconds)
  }

  pub fn duration_seconds(&self) -> u32 {
    self
      .session
      .as_ref()
      .map_or(0, |session| session.duration_seconds)
  }

  pub fn renderer(&self) -> &R {
    &self.renderer
  }

  pub fn connector(&self) -> &C {
    &self.connector
  }

  fn on_channel_opened(&mut self) {
    self.state = self.state.on(Trigger::ChannelOpened);
    if self.play_on_open {
      self.start_playback();
    } else {
      self.state = self.state.on(Trigger::Pause);
      if let Some(track_id) = self.session_track() {
        self.emit(PlayerEvent::Paused {
          track_id,
          position_secs: 0.0,
        });
      }
    }
  }

  fn on_channel_closed(&mut self, reason: CloseReason) {
    let track_id = self.session_track();
    self.teardown();
    match reason {
      CloseReason::Remote => {
        info!("stream for track {:?} closed by server", track_id);
        self.state = self.state.on(Trigger::ChannelClosed { error: false });
      }
      CloseReason::Error(message) => {
        self.state = self.state.on(Trigger::ChannelClosed { error: true });
        self.emit(PlayerEvent::error(format!("Connection lost: {}", message)));
      }
    }
  }

  fn start_playback(&mut self) {
    match self.renderer.play() {
      Ok(()) => {
        self.state = self.state.on(Trigger::PlaybackStarted);
        if let Some(session) = self.session.as_ref() {
          let event = PlayerEvent::Playing {
            track_id: session.track_id,
            position_secs: session.position_seconds,
            duration_secs: session.duration_seconds,
          };
          self.emit(event);
        }
      }
      Err(e) => {
        self.state = self.state.on(Trigger::PlayRejected);
        self.emit(PlayerEvent::error(format!("Playback error: {}", e)));
        if let Some(track_id) = self.session_track() {
          let position_secs = self.position_seconds();
          self.emit(PlayerEvent::Paused {
            track_id,
            position_secs,
          });
        }
      }
    }
  }

  /// Tear down the live session and move to `Errored`
  fn fail(&mut self, message: String) {
    self.teardown();
    self.state = self.state.on(Trigger::Failed);
    self.emit(PlayerEvent::error(message));
  }

  /// Release the live session, if any; returns whether one existed
  fn teardown(&mut self) -> bool {
    let Some(mut session) = self.session.take() else {
      return false;
    };
    debug!("session {}: teardown", session.id);
    session.teardown();
    self.renderer.pause();
    self.renderer.detach_source();
    self.emit(PlayerEvent::Stopped {
      track_id: Some(session.track_id),
    });
    true
  }

  fn session_track(&self) -> Option<TrackId> {
    self.session.as_ref().map(|session| session.track_id)
  }

  fn emit(&self, event: PlayerEvent) {
    if let PlayerEvent::Notification { kind, message } = &event {
      match kind {
        NotificationKind::Error | NotificationKind::Warning => {
          warn!("{}: {}", kind, message)
        }
        _ => info!("{}: {}", kind, message),
      }
    }
    if self.updates.send(event).is_err() {
      debug!("player event dropped: receiver gone");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::player::channel::ChannelHandle;
  use crate::player::render::DecodeSink;
  use std::cell::RefCell;
  use std::rc::Rc;
  use tokio::sync::mpsc as tokio_mpsc;
  use tokio_util::sync::CancellationToken;

  #[derive(Debug, Clone, PartialEq)]
  enum Call {
    /// Track opened, and whether every earlier channel was already closed
    Open(TrackId, bool),
    Attach,
    Detach,
    Append(Vec<u8>),
    Play,
    Pause,
    Seek(f64),
    Volume(f32),
  }

  #[derive(Default)]
  struct Shared {
    calls: Vec<Call>,
    in_flight: bool,
    overlaps: usize,
    /// No output device: `attach_source` fails
    no_output: bool,
    reject_seek: bool,
  }

  type Log = Rc<RefCell<Shared>>;

  struct ScriptedConnector {
    log: Log,
    channels: Vec<CancellationToken>,
  }

  impl ScriptedConnector {
    fn alive(&self) -> usize {
      self.channels.iter().filter(|t| !t.is_cancelled()).count()
    }
  }

  impl Connector for ScriptedConnector {
    fn open(
      &mut self,
      session: SessionId,
      track_id: TrackId,
      _events: EngineEventTx,
    ) -> ChannelHandle {
      let prior_closed = self.channels.iter().all(|t| t.is_cancelled());
      self
        .log
        .borrow_mut()
        .calls
        .push(Call::Open(track_id, prior_closed));
      let token = CancellationToken::new();
      self.channels.push(token.clone());
      ChannelHandle::new(session, track_id, token)
    }
  }

  struct ScriptedSink {
    log: Log,
  }

  impl DecodeSink for ScriptedSink {
    fn append(&mut self, chunk: Vec<u8>) -> Result<(), RenderError> {
      let mut shared = self.log.borrow_mut();
      if shared.in_flight {
        shared.overlaps += 1;
      }
      shared.in_flight = true;
      shared.calls.push(Call::Append(chunk));
      Ok(())
    }
  }

  struct ScriptedRenderer {
    log: Log,
    volume: f32,
    position: f64,
    reject_play: bool,
  }

  impl Renderer for ScriptedRenderer {
    fn attach_source(
      &mut self,
      _notifier: SinkNotifier,
    ) -> Result<Box<dyn DecodeSink>, RenderError> {
      if self.log.borrow().no_output {
        return Err(RenderError::OutputUnavailable("no default device".to_string()));
      }
      self.log.borrow_mut().calls.push(Call::Attach);
      self.position = 0.0;
      Ok(Box::new(ScriptedSink {
        log: self.log.clone(),
      }))
    }

    fn detach_source(&mut self) {
      let mut shared = self.log.borrow_mut();
      shared.in_flight = false;
      shared.calls.push(Call::Detach);
    }

    fn play(&mut self) -> Result<(), RenderError> {
      self.log.borrow_mut().calls.push(Call::Play);
      if self.reject_play {
        Err(RenderError::PlayRejected("autoplay blocked".to_string()))
      } else {
        Ok(())
      }
    }

    fn pause(&mut self) {
      self.log.borrow_mut().calls.push(Call::Pause);
    }

    fn seek(&mut self, seconds: f64) -> Result<(), RenderError> {
      self.log.borrow_mut().calls.push(Call::Seek(seconds));
      if self.log.borrow().reject_seek {
        return Err(RenderError::Seek("not seekable".to_string()));
      }
      self.position = seconds;
      Ok(())
    }

    fn set_volume(&mut self, volume: f32) {
      self.log.borrow_mut().calls.push(Call::Volume(volume));
      self.volume = volume;
    }

    fn volume(&self) -> f32 {
      self.volume
    }

    fn position(&self) -> f64 {
      self.position
    }
  }

  struct Harness {
    controller: PlaybackController<ScriptedRenderer, ScriptedConnector>,
    log: Log,
    updates: mpsc::Receiver<PlayerEvent>,
    _engine_rx: tokio_mpsc::UnboundedReceiver<EngineEvent>,
  }

  impl Harness {
    fn new() -> Self {
      Self::with_config(ControllerConfig::default())
    }

    fn with_config(config: ControllerConfig) -> Self {
      let log: Log = Rc::default();
      let renderer = ScriptedRenderer {
        log: log.clone(),
        volume: 1.0,
        position: 0.0,
        reject_play: false,
      };
      let connector = ScriptedConnector {
        log: log.clone(),
        channels: Vec::new(),
      };
      let (engine_tx, engine_rx) = tokio_mpsc::unbounded_channel();
      let (tx, updates) = mpsc::channel();
      let controller = PlaybackController::new(renderer, connector, engine_tx, tx, config);
      log.borrow_mut().calls.clear();
      Self {
        controller,
        log,
        updates,
        _engine_rx: engine_rx,
      }
    }

    fn session_id(&self) -> SessionId {
      self.controller.session().expect("live session").id
    }

    fn deliver(&mut self, kind: EngineEventKind) {
      let session = self.session_id();
      self
        .controller
        .handle_engine_event(EngineEvent { session, kind });
    }

    /// The sink finished its append
    fn complete_append(&mut self) {
      self.log.borrow_mut().in_flight = false;
      self.deliver(EngineEventKind::AppendComplete);
    }

    fn calls(&self) -> Vec<Call> {
      self.log.borrow().calls.clone()
    }

    fn clear_calls(&self) {
      self.log.borrow_mut().calls.clear();
    }

    fn drain_updates(&self) -> Vec<PlayerEvent> {
      self.updates.try_iter().collect()
    }

    fn start(&mut self, track: u64) {
      self.controller.select_track(TrackId(track));
      self.deliver(EngineEventKind::ChannelOpened);
      assert!(self.controller.is_playing());
    }
  }

  fn appends(calls: &[Call]) -> Vec<Vec<u8>> {
    calls
      .iter()
      .filter_map(|call| match call {
        Call::Append(chunk) => Some(chunk.clone()),
        _ => None,
      })
      .collect()
  }

  fn notifications(events: &[PlayerEvent], wanted: NotificationKind) -> Vec<String> {
    events
      .iter()
      .filter_map(|event| match event {
        PlayerEvent::Notification { kind, message } if *kind == wanted => Some(message.clone()),
        _ => None,
      })
      .collect()
  }

  #[test]
  fn streams_a_track_from_open_to_playing() {
    let mut h = Harness::new();
    h.controller.select_track(TrackId(42));

    assert_eq!(h.controller.state(), PlaybackState::Connecting);
    assert!(!h.controller.is_playing());
    assert_eq!(
      h.calls(),
      vec![Call::Attach, Call::Volume(1.0), Call::Open(TrackId(42), true)]
    );

    h.deliver(EngineEventKind::ChannelOpened);
    assert!(h.controller.is_playing());

    h.deliver(EngineEventKind::Duration(213));
    assert_eq!(h.controller.duration_seconds(), 213);

    for i in 0..5u8 {
      h.deliver(EngineEventKind::Media(vec![i; 4]));
    }
    assert_eq!(appends(&h.calls()).len(), 1);
    for _ in 0..5 {
      h.complete_append();
    }

    let expected: Vec<Vec<u8>> = (0..5u8).map(|i| vec![i; 4]).collect();
    assert_eq!(appends(&h.calls()), expected);
    assert_eq!(h.log.borrow().overlaps, 0);

    let events = h.drain_updates();
    assert!(events.contains(&PlayerEvent::DurationChanged { duration_secs: 213 }));
    assert!(events.iter().any(PlayerEvent::is_playing));
  }

  #[test]
  fn switching_tracks_closes_the_old_channel_first() {
    let mut h = Harness::new();
    h.start(42);
    h.deliver(EngineEventKind::Media(vec![1]));
    h.deliver(EngineEventKind::Media(vec![2]));
    h.controller.tick(Instant::now());
    h.controller.renderer.position = 12.5;
    h.controller.tick(Instant::now());
    assert_eq!(h.controller.position_seconds(), 12.5);
    let old_session = h.session_id();
    h.drain_updates();
    h.clear_calls();

    h.controller.select_track(TrackId(7));

    assert_eq!(
      h.calls(),
      vec![
        Call::Pause,
        Call::Detach,
        Call::Attach,
        Call::Volume(1.0),
        Call::Open(TrackId(7), true),
      ]
    );
    assert_eq!(h.controller.connector().alive(), 1);
    assert_eq!(h.controller.position_seconds(), 0.0);
    assert_eq!(h.controller.session().unwrap().feeder.pending_len(), 0);

    let events = h.drain_updates();
    assert_eq!(
      events[0],
      PlayerEvent::Stopped {
        track_id: Some(TrackId(42))
      }
    );
    assert_eq!(events[0].playing_flag(), Some(false));

    // Late traffic from the old session is ignored.
    h.clear_calls();
    h.controller.handle_engine_event(EngineEvent {
      session: old_session,
      kind: EngineEventKind::Media(vec![9]),
    });
    h.controller.handle_engine_event(EngineEvent {
      session: old_session,
      kind: EngineEventKind::ChannelClosed(CloseReason::Remote),
    });
    assert!(h.calls().is_empty());
    assert_eq!(h.controller.state(), PlaybackState::Connecting);

    h.deliver(EngineEventKind::ChannelOpened);
    assert!(h.controller.is_playing());
    assert_eq!(h.controller.session().unwrap().track_id, TrackId(7));
  }

  #[test]
  fn rapid_switches_leave_exactly_one_channel() {
    let mut h = Harness::new();
    h.controller.select_track(TrackId(1));
    h.controller.select_track(TrackId(2));
    h.controller.select_track(TrackId(3));
    assert_eq!(h.controller.connector().alive(), 1);
    assert!(h
      .calls()
      .iter()
      .all(|call| !matches!(call, Call::Open(_, false))));

    h.controller.stop();
    h.controller.stop();
    assert_eq!(h.controller.connector().alive(), 0);
    assert_eq!(h.controller.state(), PlaybackState::Stopped);
  }

  #[test]
  fn volume_survives_track_changes() {
    let mut h = Harness::new();
    h.start(42);
    h.controller.set_volume(0.3);
    assert_eq!(h.controller.renderer().volume(), 0.3);

    h.controller.select_track(TrackId(7));
    assert_eq!(h.controller.renderer().volume(), 0.3);
    assert_eq!(h.controller.volume(), 0.3);

    h.controller.set_volume(4.0);
    assert_eq!(h.controller.renderer().volume(), 1.0);
  }

  #[test]
  fn toggle_pauses_and_resumes() {
    let mut h = Harness::new();
    h.start(42);
    h.clear_calls();

    h.controller.toggle_play_pause();
    assert!(!h.controller.is_playing());
    assert_eq!(h.calls(), vec![Call::Pause]);

    h.controller.toggle_play_pause();
    assert!(h.controller.is_playing());
    assert_eq!(h.calls(), vec![Call::Pause, Call::Play]);

    let flags: Vec<bool> = h
      .drain_updates()
      .iter()
      .filter_map(PlayerEvent::playing_flag)
      .collect();
    assert_eq!(flags.last(), Some(&true));
  }

  #[test]
  fn toggle_after_close_reopens_the_remembered_track() {
    let mut h = Harness::new();
    h.start(42);
    h.deliver(EngineEventKind::ChannelClosed(CloseReason::Remote));
    assert_eq!(h.controller.state(), PlaybackState::Stopped);
    assert!(h.controller.session().is_none());
    h.clear_calls();

    h.controller.toggle_play_pause();
    assert_eq!(
      h.calls(),
      vec![Call::Attach, Call::Volume(1.0), Call::Open(TrackId(42), true)]
    );
    h.deliver(EngineEventKind::ChannelOpened);
    assert!(h.controller.is_playing());
  }

  #[test]
  fn toggle_without_a_track_does_nothing() {
    let mut h = Harness::new();
    h.controller.toggle_play_pause();
    assert!(h.calls().is_empty());
    assert_eq!(h.controller.state(), PlaybackState::Idle);
  }

  #[test]
  fn toggle_while_connecting_defers_to_open() {
    let mut h = Harness::new();
    h.controller.select_track(TrackId(5));
    h.controller.toggle_play_pause();
    h.clear_calls();

    h.deliver(EngineEventKind::ChannelOpened);
    assert_eq!(h.controller.state(), PlaybackState::Paused);
    assert!(!h.calls().contains(&Call::Play));
  }

  #[test]
  fn rejected_play_is_reported_not_raised() {
    let mut h = Harness::new();
    h.controller.renderer.reject_play = true;
    h.controller.select_track(TrackId(42));
    h.deliver(EngineEventKind::ChannelOpened);

    assert!(!h.controller.is_playing());
    assert_eq!(h.controller.state(), PlaybackState::Paused);
    assert_eq!(h.controller.connector().alive(), 1);
    let events = h.drain_updates();
    let errors = notifications(&events, NotificationKind::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("autoplay blocked"));

    // A later toggle retries once the element accepts playback.
    h.controller.renderer.reject_play = false;
    h.controller.toggle_play_pause();
    assert!(h.controller.is_playing());
  }

  #[test]
  fn channel_error_stops_without_reconnecting() {
    let mut h = Harness::new();
    h.start(42);
    h.clear_calls();

    h.deliver(EngineEventKind::ChannelClosed(CloseReason::Error(
      "reset by peer".to_string(),
    )));

    assert_eq!(h.controller.state(), PlaybackState::Errored);
    assert!(!h.controller.is_playing());
    assert_eq!(h.calls(), vec![Call::Pause, Call::Detach]);
    assert_eq!(h.controller.connector().alive(), 0);
    let errors = notifications(&h.drain_updates(), NotificationKind::Error);
    assert_eq!(errors, vec!["Connection lost: reset by peer".to_string()]);
  }

  #[test]
  fn malformed_duration_is_a_warning() {
    let mut h = Harness::new();
    h.start(42);
    h.deliver(EngineEventKind::MalformedDuration("abc".to_string()));

    assert!(h.controller.is_playing());
    assert_eq!(h.controller.duration_seconds(), 0);
    let warnings = notifications(&h.drain_updates(), NotificationKind::Warning);
    assert_eq!(warnings.len(), 1);
  }

  #[test]
  fn stalled_connection_times_out() {
    let mut h = Harness::with_config(ControllerConfig {
      initial_volume: 1.0,
      connect_timeout: Some(Duration::from_secs(10)),
    });
    h.controller.select_track(TrackId(42));
    let started = h.controller.session().unwrap().started_at;

    h.controller.tick(started + Duration::from_secs(5));
    assert_eq!(h.controller.state(), PlaybackState::Connecting);

    h.controller.tick(started + Duration::from_secs(10));
    assert_eq!(h.controller.state(), PlaybackState::Errored);
    assert_eq!(h.controller.connector().alive(), 0);
    assert_eq!(
      notifications(&h.drain_updates(), NotificationKind::Error).len(),
      1
    );
  }

  #[test]
  fn media_arrival_disarms_the_timeout() {
    let mut h = Harness::new();
    h.start(42);
    h.deliver(EngineEventKind::Media(vec![1]));
    let started = h.controller.session().unwrap().started_at;
    h.controller.tick(started + Duration::from_secs(60));
    assert!(h.controller.is_playing());
  }

  #[test]
  fn seek_is_clamped_to_duration() {
    let mut h = Harness::new();
    h.start(42);
    h.deliver(EngineEventKind::Duration(213));
    h.clear_calls();

    h.controller.seek(500.0);
    h.controller.seek(-3.0);
    assert_eq!(h.calls(), vec![Call::Seek(213.0), Call::Seek(0.0)]);
    assert!(h.controller.is_playing());
  }

  #[test]
  fn seek_without_session_is_skipped() {
    let mut h = Harness::new();
    h.controller.seek(10.0);
    assert!(h.calls().is_empty());
    assert_eq!(
      notifications(&h.drain_updates(), NotificationKind::Warning).len(),
      1
    );
  }

  #[test]
  fn failed_seek_is_reported() {
    let mut h = Harness::new();
    h.start(42);
    h.deliver(EngineEventKind::Duration(213));
    h.drain_updates();
    h.log.borrow_mut().reject_seek = true;

    h.controller.seek(30.0);
    let events = h.drain_updates();
    assert_eq!(
      notifications(&events, NotificationKind::Warning),
      vec!["Could not seek to 30.0s: seek failed: not seekable".to_string()]
    );
    assert!(!events
      .iter()
      .any(|e| matches!(e, PlayerEvent::Position { .. })));
    assert!(h.controller.is_playing());
    assert!(h.controller.session().is_some());
  }

  #[test]
  fn missing_output_device_fails_the_selection() {
    let mut h = Harness::new();
    h.log.borrow_mut().no_output = true;

    h.controller.select_track(TrackId(42));
    assert_eq!(h.controller.state(), PlaybackState::Errored);
    assert!(h.controller.session().is_none());
    assert_eq!(h.controller.connector().alive(), 0);
    assert!(!h.calls().iter().any(|c| matches!(c, Call::Open(..))));
    assert_eq!(h.controller.selected_track(), Some(TrackId(42)));
    assert_eq!(
      notifications(&h.drain_updates(), NotificationKind::Error).len(),
      1
    );

    h.log.borrow_mut().no_output = false;
    h.controller.select_track(TrackId(42));
    assert_eq!(h.controller.state(), PlaybackState::Connecting);
    assert_eq!(h.controller.connector().alive(), 1);
    h.deliver(EngineEventKind::ChannelOpened);
    assert!(h.controller.is_playing());
  }

  #[test]
  fn sink_failure_tears_the_session_down() {
    let mut h = Harness::new();
    h.start(42);
    h.deliver(EngineEventKind::SinkFailed("bad frame".to_string()));
    assert_eq!(h.controller.state(), PlaybackState::Errored);
    assert!(h.controller.session().is_none());
    assert_eq!(h.controller.connector().alive(), 0);
  }

  #[test]
  fn like_result_updates_current_song() {
    let mut h = Harness::new();
    let song: SongDetails = serde_json::from_str(
      r#"{"id": 42, "title": "T", "artist": {"id": 1, "name": "A"}, "isLiked": false}"#,
    )
    .unwrap();
    h.controller
      .handle_command(PlayerCommand::SetCurrentSong(Some(song)));
    h.controller.set_liked(TrackId(42), true);
    assert!(h.controller.current_song().unwrap().is_liked);
    assert!(h.drain_updates().contains(&PlayerEvent::LikeChanged {
      track_id: TrackId(42),
      is_liked: true
    }));

    h.controller.set_liked(TrackId(7), false);
    assert!(h.controller.current_song().unwrap().is_liked);
  }

  #[test]
  fn shutdown_releases_the_session() {
    let mut h = Harness::new();
    h.start(42);
    assert!(h.controller.handle_command(PlayerCommand::Shutdown));
    assert_eq!(h.controller.connector().alive(), 0);
  }
}
