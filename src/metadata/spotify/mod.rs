//! Spotify Web API integration
//!
//! Resolves track, album and playlist references into [`crate::model::TrackRef`]s
//! using the client-credentials flow. No user login is involved.
//!
//! API docs: https://developer.spotify.com/documentation/web-api

pub mod dto;
mod adapter;
mod client;

pub use adapter::to_track_ref;
pub use client::SpotifyClient;
