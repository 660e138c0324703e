use anyhow::{anyhow, Context, Result};
use clap::{crate_version, Arg, ArgAction, Command};
use log::{debug, info, warn};
use songstream::api::SongDetails;
use songstream::cli::{self, ReplCommand};
use songstream::config::ClientConfig;
use songstream::player::{
  spawn_player_worker, NotificationKind, PlayerCommand, PlayerEvent, PlayerHandle, TrackId,
};
use std::collections::HashMap;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::{Duration, Instant};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

fn build_cli() -> Command {
  Command::new(env!("CARGO_PKG_NAME"))
    .version(crate_version!())
    .about(env!("CARGO_PKG_DESCRIPTION"))
    .arg(
      Arg::new("config")
        .short('c')
        .long("config")
        .help("Path to a config.yml (defaults to the platform config dir)")
        .value_parser(clap::value_parser!(PathBuf)),
    )
    .arg(
      Arg::new("stream-url")
        .long("stream-url")
        .help("Base websocket url of the streaming service, e.g. ws://localhost:8080"),
    )
    .arg(
      Arg::new("api-url")
        .long("api-url")
        .help("Base url of the REST api"),
    )
    .arg(
      Arg::new("token")
        .long("token")
        .help("Bearer token used for like/download"),
    )
    .arg(
      Arg::new("volume")
        .long("volume")
        .help("Initial volume between 0 and 1")
        .value_parser(clap::value_parser!(f32)),
    )
    .arg(
      Arg::new("verbose")
        .short('v')
        .long("verbose")
        .help("Log debug output to stderr")
        .action(ArgAction::SetTrue),
    )
    .arg(
      Arg::new("track")
        .value_name("TRACK_ID")
        .help("Start streaming this track right away")
        .value_parser(clap::value_parser!(u64)),
    )
}

fn init_logger(verbose: bool) {
  let level = if verbose { "debug" } else { "warn" };
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
    .format_timestamp_millis()
    .init();
}

fn load_config(matches: &clap::ArgMatches) -> Result<ClientConfig> {
  let path = matches.get_one::<PathBuf>("config");
  let mut config = ClientConfig::load(path.map(PathBuf::as_path))?;
  if let Some(url) = matches.get_one::<String>("stream-url") {
    config.stream_api_url = url.clone();
  }
  if let Some(url) = matches.get_one::<String>("api-url") {
    config.api_url = url.clone();
  }
  if let Some(token) = matches.get_one::<String>("token") {
    config.auth_token = Some(token.clone());
  }
  if let Some(volume) = matches.get_one::<f32>("volume") {
    config.default_volume = *volume;
  }
  Ok(config)
}

/// Best effort: without the catalog, like/download just report that no song
/// is selected
fn fetch_catalog(config: &ClientConfig) -> HashMap<u64, SongDetails> {
  let client = match config.api_client() {
    Ok(client) => client,
    Err(e) => {
      warn!("catalog unavailable: {}", e);
      return HashMap::new();
    }
  };
  let runtime = match tokio::runtime::Builder::new_current_thread()
    .enable_all()
    .build()
  {
    Ok(runtime) => runtime,
    Err(e) => {
      warn!("catalog unavailable: {}", e);
      return HashMap::new();
    }
  };
  match runtime.block_on(client.list_songs()) {
    Ok(songs) => {
      info!("catalog has {} songs", songs.len());
      songs.into_iter().map(|song| (song.id, song)).collect()
    }
    Err(e) => {
      warn!("could not load catalog: {}", e);
      HashMap::new()
    }
  }
}

fn spawn_stdin_reader() -> mpsc::Receiver<String> {
  let (tx, rx) = mpsc::channel();
  let spawned = std::thread::Builder::new()
    .name("stdin".to_string())
    .spawn(move || {
      for line in std::io::stdin().lock().lines() {
        let Ok(line) = line else { break };
        if tx.send(line).is_err() {
          break;
        }
      }
    });
  if let Err(e) = spawned {
    warn!("could not read stdin: {}", e);
  }
  rx
}

fn print_event(event: &PlayerEvent) {
  match event {
    PlayerEvent::Loading { track_id, title } => match title {
      Some(title) => println!("loading {} ({})", title, track_id),
      None => println!("loading track {}", track_id),
    },
    PlayerEvent::Playing {
      position_secs,
      duration_secs,
      ..
    } => println!(
      "playing {} / {}",
      format_time(*position_secs),
      format_time(f64::from(*duration_secs))
    ),
    PlayerEvent::Paused { position_secs, .. } => {
      println!("paused at {}", format_time(*position_secs))
    }
    PlayerEvent::Stopped { .. } => println!("stopped"),
    PlayerEvent::DurationChanged { duration_secs } => {
      println!("length {}", format_time(f64::from(*duration_secs)))
    }
    PlayerEvent::VolumeChanged { volume } => println!("volume {:.0}%", volume * 100.0),
    PlayerEvent::LikeChanged { is_liked, .. } => {
      println!("{}", if *is_liked { "liked" } else { "unliked" })
    }
    PlayerEvent::Notification { kind, message } => match kind {
      NotificationKind::Error | NotificationKind::Warning => eprintln!("{}: {}", kind, message),
      _ => println!("{}", message),
    },
    PlayerEvent::Position { .. } | PlayerEvent::Shutdown => {}
  }
}

fn print_status(player: &PlayerHandle) {
  let state = &player.state;
  let track = match (&state.title, state.current_track) {
    (Some(title), Some(id)) => format!("{} ({})", title, id),
    (None, Some(id)) => format!("track {}", id),
    _ => "nothing selected".to_string(),
  };
  let transport = if state.is_playing {
    "playing"
  } else if state.has_session {
    "paused"
  } else {
    "stopped"
  };
  println!(
    "{} - {} {} / {} - volume {:.0}%{}",
    track,
    transport,
    format_time(state.position_secs),
    format_time(f64::from(state.duration_secs)),
    state.volume * 100.0,
    if state.is_liked { " - liked" } else { "" }
  );
}

fn format_time(seconds: f64) -> String {
  let total = seconds.max(0.0) as u64;
  format!("{}:{:02}", total / 60, total % 60)
}

fn select(
  player: &PlayerHandle,
  catalog: &HashMap<u64, SongDetails>,
  track_id: TrackId,
) -> Result<()> {
  let reselecting = player.state.current_track == Some(track_id) && player.state.has_session;
  if !reselecting {
    let song = catalog.get(&track_id.0).cloned();
    if song.is_none() {
      debug!("track {} is not in the catalog", track_id);
    }
    player.send_command(PlayerCommand::SetCurrentSong(song))?;
  }
  player.select_or_toggle(track_id)?;
  Ok(())
}

fn main() -> Result<()> {
  let matches = build_cli().get_matches();
  init_logger(matches.get_flag("verbose"));

  let config = load_config(&matches)?;
  let worker_config = config
    .worker_config()
    .context("invalid configuration")?;
  info!("streaming from {}", worker_config.stream_endpoint);
  let catalog = fetch_catalog(&config);

  let (command_tx, event_rx) = spawn_player_worker(worker_config)?;
  let mut player = PlayerHandle::new(command_tx, event_rx);

  if let Some(id) = matches.get_one::<u64>("track") {
    select(&player, &catalog, TrackId(*id))?;
  }

  let lines = spawn_stdin_reader();
  println!("type `help` for commands");

  'main: loop {
    while let Some(event) = player.try_recv_event() {
      if event == PlayerEvent::Shutdown {
        return Err(anyhow!("player worker stopped unexpectedly"));
      }
      print_event(&event);
    }

    loop {
      let line = match lines.try_recv() {
        Ok(line) => line,
        Err(mpsc::TryRecvError::Empty) => break,
        Err(mpsc::TryRecvError::Disconnected) => break 'main,
      };
      match cli::parse_line(&line) {
        Ok(None) => {}
        Ok(Some(ReplCommand::Play(track_id))) => select(&player, &catalog, track_id)?,
        Ok(Some(ReplCommand::Player(cmd))) => player.send_command(cmd)?,
        Ok(Some(ReplCommand::Status)) => print_status(&player),
        Ok(Some(ReplCommand::Help)) => println!("{}", cli::HELP),
        Ok(Some(ReplCommand::Quit)) => break 'main,
        Err(e) => eprintln!("{}", e),
      }
    }

    std::thread::sleep(Duration::from_millis(10));
  }

  player.send_command(PlayerCommand::Shutdown)?;
  let deadline = Instant::now() + SHUTDOWN_GRACE;
  while Instant::now() < deadline {
    match player.event_rx.recv_timeout(Duration::from_millis(50)) {
      Ok(PlayerEvent::Shutdown) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
      Ok(_) | Err(mpsc::RecvTimeoutError::Timeout) => {}
    }
  }
  Ok(())
}
