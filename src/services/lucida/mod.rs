//! Lucida retrieval service integration
//!
//! Lucida converts a Spotify track URL into a track on the requested
//! backend and serves the FLAC after preparing it server-side. The exchange
//! is four steps: page load (token + backend URL), load request (handoff),
//! status polling, and the download itself.
//!
//! Two deployments exist; which one a call goes to is chosen by the caller
//! through [`crate::model::EndpointMode`].

pub mod dto;
mod client;
mod page;

pub use client::LucidaClient;
