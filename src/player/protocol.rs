//! Wire protocol of the audio-stream endpoint
//!
//! The client sends a single text handshake naming the track. The server
//! answers with at most one `duration:<secs>` text frame and any number of
//! binary frames carrying the MPEG elementary stream.

use super::session::TrackId;
use tokio_tungstenite::tungstenite::Message;

const HANDSHAKE_PREFIX: &str = "songId:";
const DURATION_PREFIX: &str = "duration:";

/// Frames the server can push to the client, after demultiplexing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFrame {
  /// Total track length in seconds
  Duration(u32),
  /// A chunk of encoded audio
  Media(Vec<u8>),
  /// A `duration:` frame whose value could not be parsed
  MalformedDuration(String),
  /// Anything else (unknown text, control frames)
  Ignored,
}

/// Build the handshake text frame for `track_id`
pub fn handshake(track_id: TrackId) -> Message {
  Message::Text(handshake_text(track_id))
}

pub fn handshake_text(track_id: TrackId) -> String {
  format!("{}{}", HANDSHAKE_PREFIX, track_id)
}

/// Parse the payload of a text frame
pub fn parse_text(text: &str) -> ServerFrame {
  match text.strip_prefix(DURATION_PREFIX) {
    Some(value) => match value.trim().parse::<u32>() {
      Ok(seconds) => ServerFrame::Duration(seconds),
      Err(_) => ServerFrame::MalformedDuration(value.to_string()),
    },
    None => ServerFrame::Ignored,
  }
}

impl ServerFrame {
  /// Demultiplex a websocket message into metadata or media
  pub fn from_message(message: Message) -> Self {
    match message {
      Message::Text(text) => parse_text(&text),
      Message::Binary(data) => ServerFrame::Media(data),
      _ => ServerFrame::Ignored,
    }
  }
}
