//! Command-line interface for spotiflac.
//!
//! A single command: resolve a Spotify reference and download every track
//! as FLAC into an output directory.

mod commands;
mod summary;

pub use commands::{Cli, run};
