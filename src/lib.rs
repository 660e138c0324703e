//! Terminal client for a music-streaming service
//!
//! Tracks are streamed over a websocket and played while they download.
//! See [`player`] for the playback engine.

pub mod api;
pub mod cli;
pub mod config;
pub mod player;
