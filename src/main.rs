//! SpotiFLAC - download Spotify tracks, albums and playlists as FLAC.
//!
//! Resolves a Spotify reference into tracks, sources each one from a
//! lossless streaming catalog through the Lucida retrieval service, falls
//! back across services and endpoints, retries failed tracks within a time
//! budget and can audit the results for lossy sources.

pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod metadata;
pub mod model;
pub mod organizer;
pub mod services;
#[cfg(test)]
pub mod test_utils;
pub mod verify;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> ExitCode {
    let args = cli::Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("spotiflac=info".parse().expect("valid directive")))
        .init();

    match cli::run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}
