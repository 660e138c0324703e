//! Player worker that runs the playback controller in a background thread
//!
//! The worker owns the controller and serializes everything that can touch
//! it: commands from the UI, frames from the transport channel, decode sink
//! callbacks and the position timer.

use super::channel::{Connector, WebSocketConnector};
use super::commands::PlayerCommand;
use super::controller::{ControllerConfig, PlaybackController};
use super::events::{EngineEventRx, PlayerEvent};
use super::render::Renderer;
use super::DefaultRenderer;
use crate::api::{ApiClient, ApiError};
use anyhow::{anyhow, Context, Result};
use log::{debug, error, info};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc as tokio_mpsc;
use url::Url;

/// Configuration for the player worker
#[derive(Debug, Clone)]
pub struct PlayerWorkerConfig {
  /// Full websocket URL of the audio-stream endpoint
  pub stream_endpoint: Url,
  pub controller: ControllerConfig,
  /// How often the playback position is sampled
  pub position_poll: Duration,
  /// REST client for like/download; `None` disables both
  pub api: Option<ApiClient>,
  pub download_dir: PathBuf,
}

/// The player worker that drives the playback controller
pub struct PlayerWorker<R: Renderer, C: Connector> {
  /// Channel to receive commands from the main thread
  command_rx: mpsc::Receiver<PlayerCommand>,
  /// Frames and sink callbacks posted by the current session
  engine_rx: EngineEventRx,
  controller: PlaybackController<R, C>,
  api: Option<ApiClient>,
  download_dir: PathBuf,
  position_poll: Duration,
}

impl<R: Renderer, C: Connector> PlayerWorker<R, C> {
  /// Create a new player worker
  pub fn new(
    command_rx: mpsc::Receiver<PlayerCommand>,
    event_tx: mpsc::Sender<PlayerEvent>,
    renderer: R,
    connector: C,
    config: PlayerWorkerConfig,
  ) -> Self {
    let (engine_tx, engine_rx) = tokio_mpsc::unbounded_channel();
    let mut controller =
      PlaybackController::new(renderer, connector, engine_tx, event_tx, config.controller);
    let authenticated = config.api.as_ref().is_some_and(ApiClient::is_authenticated);
    controller.handle_command(PlayerCommand::SetAuthenticated(authenticated));

    Self {
      command_rx,
      engine_rx,
      controller,
      api: config.api,
      download_dir: config.download_dir,
      position_poll: config.position_poll,
    }
  }

  pub fn controller(&self) -> &PlaybackController<R, C> {
    &self.controller
  }

  /// Run the player worker event loop
  pub async fn run(&mut self) -> Result<()> {
    debug!("player worker run loop started");
    let mut last_tick = Instant::now();

    'outer: loop {
      // Check for commands from main thread (non-blocking)
      loop {
        match self.command_rx.try_recv() {
          Ok(cmd) => {
            debug!("received command: {:?}", cmd);
            if self.handle_command(cmd).await? {
              break 'outer; // Shutdown requested
            }
          }
          Err(mpsc::TryRecvError::Empty) => break,
          Err(mpsc::TryRecvError::Disconnected) => {
            debug!("command channel disconnected, exiting");
            self.controller.handle_command(PlayerCommand::Shutdown);
            break 'outer;
          }
        }
      }

      while let Ok(event) = self.engine_rx.try_recv() {
        self.controller.handle_engine_event(event);
      }

      if last_tick.elapsed() >= self.position_poll {
        last_tick = Instant::now();
        self.controller.tick(last_tick);
      }

      // Small sleep to prevent busy-waiting
      tokio::time::sleep(Duration::from_millis(10)).await;
    }

    self.controller.notify(PlayerEvent::Shutdown);
    Ok(())
  }

  /// Returns true when the worker should stop
  pub async fn handle_command(&mut self, cmd: PlayerCommand) -> Result<bool> {
    match cmd {
      PlayerCommand::ToggleLike => self.toggle_like().await,
      PlayerCommand::Download => self.download().await,
      other => return Ok(self.controller.handle_command(other)),
    }
    Ok(false)
  }

  fn api_if_authenticated(&self) -> Option<&ApiClient> {
    if !self.controller.is_authenticated() {
      return None;
    }
    self.api.as_ref()
  }

  async fn toggle_like(&mut self) {
    let Some(song) = self.controller.current_song().cloned() else {
      self
        .controller
        .notify(PlayerEvent::warning("No song selected"));
      return;
    };
    let Some(api) = self.api_if_authenticated() else {
      self
        .controller
        .notify(PlayerEvent::warning(ApiError::Unauthenticated.to_string()));
      return;
    };

    let result = api.like_song(song.track_id()).await;
    match result {
      Ok(()) => self.controller.set_liked(song.track_id(), !song.is_liked),
      Err(e) => {
        error!("like for track {} failed: {}", song.id, e);
        self
          .controller
          .notify(PlayerEvent::error(format!("Could not update like: {}", e)));
      }
    }
  }

  async fn download(&mut self) {
    let Some(song) = self.controller.current_song().cloned() else {
      self
        .controller
        .notify(PlayerEvent::warning("No song selected"));
      return;
    };
    let Some(api) = self.api_if_authenticated() else {
      self
        .controller
        .notify(PlayerEvent::warning(ApiError::Unauthenticated.to_string()));
      return;
    };

    let target = self.download_dir.join(song.file_name());
    let result = match api.download_song(song.track_id()).await {
      Ok(body) => save_download(&target, &body).await,
      Err(e) => Err(anyhow!(e)),
    };
    match result {
      Ok(()) => {
        info!("saved track {} to {}", song.id, target.display());
        self
          .controller
          .notify(PlayerEvent::success(format!("Saved {}", target.display())));
      }
      Err(e) => self
        .controller
        .notify(PlayerEvent::error(format!("Download failed: {:#}", e))),
    }
  }
}

async fn save_download(target: &Path, body: &[u8]) -> Result<()> {
  if let Some(dir) = target.parent() {
    tokio::fs::create_dir_all(dir)
      .await
      .with_context(|| format!("creating {}", dir.display()))?;
  }
  tokio::fs::write(target, body)
    .await
    .with_context(|| format!("writing {}", target.display()))?;
  Ok(())
}

/// Spawn the player worker in a new thread
/// Returns channels for communication with the worker
pub fn spawn_player_worker(
  config: PlayerWorkerConfig,
) -> Result<(mpsc::Sender<PlayerCommand>, mpsc::Receiver<PlayerEvent>)> {
  let connector = WebSocketConnector::new(config.stream_endpoint.clone())?;
  let (cmd_tx, cmd_rx) = mpsc::channel();
  let (event_tx, event_rx) = mpsc::channel();

  std::thread::Builder::new()
    .name("player-worker".to_string())
    .spawn(move || {
      let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to create tokio runtime for player worker");

      rt.block_on(async move {
        // The render element is created on this thread: audio output
        // streams cannot move between threads.
        let renderer = DefaultRenderer::default();
        let mut worker = PlayerWorker::new(cmd_rx, event_tx, renderer, connector, config);
        if let Err(e) = worker.run().await {
          error!("player worker error: {:#}", e);
        }
      });
    })
    .context("spawning player worker thread")?;

  Ok((cmd_tx, event_rx))
}
