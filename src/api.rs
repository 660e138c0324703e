//! REST collaborator client
//!
//! The catalog listing plus the two calls the player itself makes (like
//! and download). Authentication lives elsewhere;
//! the bearer token is handed in through the config.

use crate::player::TrackId;
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ApiError {
  #[error("login required")]
  Unauthenticated,
  #[error("invalid api url: {0}")]
  Url(#[from] url::ParseError),
  #[error("request failed: {0}")]
  Http(#[from] reqwest::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistDto {
  pub id: u64,
  pub name: String,
}

/// Track metadata as the service returns it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongDetails {
  pub id: u64,
  pub title: String,
  pub artist: ArtistDto,
  #[serde(default)]
  pub creation_date: Option<String>,
  /// Length in seconds
  #[serde(default)]
  pub length: u32,
  #[serde(default)]
  pub likes: u64,
  #[serde(default)]
  pub image_url: Option<String>,
  #[serde(default)]
  pub is_liked: bool,
}

impl SongDetails {
  pub fn track_id(&self) -> TrackId {
    TrackId(self.id)
  }

  /// File name used when saving a download
  pub fn file_name(&self) -> String {
    let stem: String = self
      .title
      .chars()
      .map(|c| match c {
        '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
        c => c,
      })
      .collect();
    let stem = stem.trim();
    if stem.is_empty() {
      format!("song-{}.mp3", self.id)
    } else {
      format!("{}.mp3", stem)
    }
  }
}

#[derive(Debug, Clone)]
pub struct ApiClient {
  http: reqwest::Client,
  base: Url,
  token: Option<String>,
}

impl ApiClient {
  pub fn new(base: Url, token: Option<String>) -> Self {
    Self {
      http: reqwest::Client::new(),
      base,
      token,
    }
  }

  pub fn is_authenticated(&self) -> bool {
    self.token.is_some()
  }

  /// `GET /songs/load/listAll`; the token is sent when there is one so
  /// that `isLiked` reflects the user
  pub async fn list_songs(&self) -> Result<Vec<SongDetails>, ApiError> {
    let url = join_path(&self.base, "songs/load/listAll")?;
    debug!("GET {}", url);
    let mut request = self.http.get(url);
    if let Some(token) = &self.token {
      request = request.bearer_auth(token);
    }
    let songs = request.send().await?.error_for_status()?.json().await?;
    Ok(songs)
  }

  /// `PUT /songs/likeSong?songId=<id>`
  pub async fn like_song(&self, track_id: TrackId) -> Result<(), ApiError> {
    let url = self.song_url("songs/likeSong", track_id)?;
    debug!("PUT {}", url);
    self
      .authorized(self.http.put(url))?
      .send()
      .await?
      .error_for_status()?;
    Ok(())
  }

  /// `GET /songs/downloadSong?songId=<id>`, returning the file body
  pub async fn download_song(&self, track_id: TrackId) -> Result<Vec<u8>, ApiError> {
    let url = self.song_url("songs/downloadSong", track_id)?;
    debug!("GET {}", url);
    let response = self
      .authorized(self.http.get(url))?
      .send()
      .await?
      .error_for_status()?;
    Ok(response.bytes().await?.to_vec())
  }

  fn song_url(&self, path: &str, track_id: TrackId) -> Result<Url, ApiError> {
    let mut url = join_path(&self.base, path)?;
    url
      .query_pairs_mut()
      .append_pair("songId", &track_id.to_string());
    Ok(url)
  }

  fn authorized(
    &self,
    request: reqwest::RequestBuilder,
  ) -> Result<reqwest::RequestBuilder, ApiError> {
    match &self.token {
      Some(token) => Ok(request.bearer_auth(token)),
      None => Err(ApiError::Unauthenticated),
    }
  }
}

/// Append `path` to `base`, keeping any path prefix `base` already has
pub fn join_path(base: &Url, path: &str) -> Result<Url, url::ParseError> {
  let mut base = base.clone();
  if !base.path().ends_with('/') {
    let with_slash = format!("{}/", base.path());
    base.set_path(&with_slash);
  }
  base.join(path.trim_start_matches('/'))
}
