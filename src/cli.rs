//! Interactive command line
//!
//! One command per line on stdin, e.g. `play 42`, `vol 0.5`, `toggle`.

use crate::player::{PlayerCommand, TrackId};
use thiserror::Error;

pub const HELP: &str = "\
commands:
  play <id>      stream a track (toggles if it is already loaded)
  toggle         play/pause
  pause          pause
  resume         resume
  stop           stop and close the stream
  seek <secs>    jump to a position
  vol <0..1>     set the volume
  like           like/unlike the current song
  download       save the current song
  status         show the player state
  help           show this text
  quit           exit";

#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
  /// Select-or-toggle for a track id
  Play(TrackId),
  Player(PlayerCommand),
  Status,
  Help,
  Quit,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
  #[error("unknown command {0:?}, try `help`")]
  Unknown(String),
  #[error("`{0}` needs an argument")]
  MissingArgument(&'static str),
  #[error("invalid argument {0:?}")]
  InvalidArgument(String),
}

/// Parse one input line; blank lines yield `None`
pub fn parse_line(line: &str) -> Result<Option<ReplCommand>, ParseError> {
  let mut words = line.split_whitespace();
  let Some(word) = words.next() else {
    return Ok(None);
  };
  let arg = words.next();

  let command = match word.to_ascii_lowercase().as_str() {
    "play" | "p" => {
      let raw = arg.ok_or(ParseError::MissingArgument("play"))?;
      let id = raw
        .parse::<TrackId>()
        .map_err(|_| ParseError::InvalidArgument(raw.to_string()))?;
      ReplCommand::Play(id)
    }
    "toggle" | "t" => ReplCommand::Player(PlayerCommand::TogglePlayPause),
    "pause" => ReplCommand::Player(PlayerCommand::Pause),
    "resume" => ReplCommand::Player(PlayerCommand::Play),
    "stop" => ReplCommand::Player(PlayerCommand::Stop),
    "seek" => {
      let secs = number(arg, "seek")?;
      ReplCommand::Player(PlayerCommand::Seek(secs))
    }
    "vol" | "volume" => {
      let volume = number(arg, "vol")? as f32;
      ReplCommand::Player(PlayerCommand::volume(volume))
    }
    "like" => ReplCommand::Player(PlayerCommand::ToggleLike),
    "download" => ReplCommand::Player(PlayerCommand::Download),
    "status" | "s" => ReplCommand::Status,
    "help" | "?" => ReplCommand::Help,
    "quit" | "exit" | "q" => ReplCommand::Quit,
    other => return Err(ParseError::Unknown(other.to_string())),
  };
  Ok(Some(command))
}

fn number(arg: Option<&str>, command: &'static str) -> Result<f64, ParseError> {
  let raw = arg.ok_or(ParseError::MissingArgument(command))?;
  raw
    .parse::<f64>()
    .ok()
    .filter(|n| n.is_finite())
    .ok_or_else(|| ParseError::InvalidArgument(raw.to_string()))
}
