//! Argument definitions and the download command.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::summary;
use crate::config::{self, Config};
use crate::download::{self, EndpointState, FallbackCoordinator, RetryLoopController};
use crate::error::Error;
use crate::metadata::cover::CoverArtClient;
use crate::metadata::{self, SpotifyClient, SpotifyKind};
use crate::model::{ServiceCandidate, dedup_services};
use crate::organizer::{FilenameFormat, LayoutOptions};
use crate::services::{self, lucida::LucidaClient};
use crate::verify;

/// Download Spotify tracks, albums and playlists as FLAC
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Spotify track, album or playlist URL (or URI)
    #[arg(required_unless_present = "init_config")]
    pub url: Option<String>,

    /// Directory the files are written to
    #[arg(required_unless_present = "init_config")]
    pub output_dir: Option<PathBuf>,

    /// Services to try, in order (repeatable or space separated)
    #[arg(
        long = "service",
        value_enum,
        num_args = 1..,
        value_delimiter = ' ',
        default_values_t = [ServiceCandidate::Tidal]
    )]
    pub services: Vec<ServiceCandidate>,

    /// How filenames are composed
    #[arg(long, value_enum, default_value_t = FilenameFormat::TitleArtist)]
    pub filename_format: FilenameFormat,

    /// Prefix filenames with the track number
    #[arg(long)]
    pub use_track_numbers: bool,

    /// Put files in a folder per artist
    #[arg(long)]
    pub use_artist_subfolders: bool,

    /// Put files in a folder per album
    #[arg(long)]
    pub use_album_subfolders: bool,

    /// Keep retrying failed tracks for this many minutes (0 = single pass)
    #[arg(long = "loop", value_name = "MINUTES", default_value_t = 0)]
    pub loop_minutes: u64,

    /// Switch to the backup retrieval endpoint when the primary fails
    #[arg(long)]
    pub fallback: bool,

    /// Tracks downloaded at the same time
    #[arg(long)]
    pub workers: Option<usize>,

    /// Check each new file for a lossy source and write a verdict sidecar
    #[arg(long)]
    pub verify: bool,

    /// Don't write Spotify metadata into the files
    #[arg(long)]
    pub no_tags: bool,

    /// Don't embed the album cover with the tags
    #[arg(long)]
    pub no_cover: bool,

    /// Config file to use instead of the default location
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Spotify application client ID
    #[arg(long, env = "SPOTIFY_CLIENT_ID")]
    pub spotify_client_id: Option<String>,

    /// Spotify application client secret
    #[arg(long, env = "SPOTIFY_CLIENT_SECRET", hide_env_values = true)]
    pub spotify_client_secret: Option<String>,

    /// Write the default configuration file and exit
    #[arg(long)]
    pub init_config: bool,
}

impl Cli {
    fn layout(&self) -> LayoutOptions {
        LayoutOptions {
            format: self.filename_format,
            use_track_number: self.use_track_numbers,
            use_artist_folder: self.use_artist_subfolders,
            use_album_folder: self.use_album_subfolders,
        }
    }

    /// Apply flag values on top of the loaded file.
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(workers) = self.workers {
            config.retry.workers = workers;
        }
        if let Some(id) = &self.spotify_client_id {
            config.spotify.client_id = Some(id.clone());
        }
        if let Some(secret) = &self.spotify_client_secret {
            config.spotify.client_secret = Some(secret.clone());
        }
    }
}

/// Everything a download run needs, checked before any network call.
#[derive(Debug)]
struct RunPlan {
    url: String,
    output_dir: PathBuf,
    services: Vec<ServiceCandidate>,
    layout: LayoutOptions,
    client_id: String,
    client_secret: String,
    config: Config,
}

fn plan(cli: &Cli, mut config: Config) -> Result<RunPlan, Error> {
    cli.apply_overrides(&mut config);
    config.validate()?;

    let url = cli
        .url
        .clone()
        .ok_or_else(|| Error::config("a Spotify URL is required"))?;
    let output_dir = cli
        .output_dir
        .clone()
        .ok_or_else(|| Error::config("an output directory is required"))?;
    if output_dir.exists() && !output_dir.is_dir() {
        return Err(Error::config(format!("{} is not a directory", output_dir.display())));
    }

    // Fails fast on a malformed reference, before credentials matter
    let reference = metadata::parse_reference(&url)?;

    let mut layout = cli.layout();
    if reference.kind == SpotifyKind::Track && layout.use_track_number {
        debug!("Track numbers only prefix album and playlist downloads");
        layout.use_track_number = false;
    }

    let (Some(client_id), Some(client_secret)) = (
        config.spotify.client_id.clone().filter(|s| !s.is_empty()),
        config.spotify.client_secret.clone().filter(|s| !s.is_empty()),
    ) else {
        return Err(Error::config(
            "Spotify credentials missing: set --spotify-client-id/--spotify-client-secret, \
             SPOTIFY_CLIENT_ID/SPOTIFY_CLIENT_SECRET or [spotify] in the config file",
        ));
    };

    if cli.fallback && config.endpoints.backup.trim().is_empty() {
        return Err(Error::config("--fallback needs endpoints.backup to be set"));
    }

    Ok(RunPlan {
        url,
        output_dir,
        services: dedup_services(&cli.services),
        layout,
        client_id,
        client_secret,
        config,
    })
}

/// A file named with `--config` must load. Only the default location falls
/// back to built-in defaults.
fn load_config(path: Option<&Path>) -> Result<Config, Error> {
    match path {
        Some(p) => config::try_load_from(p).map_err(|e| Error::config(e.to_string())),
        None => Ok(config::load()),
    }
}

fn init_config(path: Option<&Path>) -> anyhow::Result<ExitCode> {
    let defaults = Config::default();
    let written = match path {
        Some(p) => {
            config::save_to(&defaults, p)?;
            p.to_path_buf()
        }
        None => config::save(&defaults)?,
    };
    println!("Wrote default configuration to {}", written.display());
    Ok(ExitCode::SUCCESS)
}

/// Run the command described by `cli`.
///
/// `Ok` carries 0 when every track is on disk and 1 when some are still
/// pending. Errors are fatal and abort the run before or during resolution.
pub fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    if cli.init_config {
        return init_config(cli.config.as_deref());
    }

    let config = load_config(cli.config.as_deref())?;
    let plan = plan(&cli, config)?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    rt.block_on(execute(plan, &cli))
}

async fn execute(plan: RunPlan, cli: &Cli) -> anyhow::Result<ExitCode> {
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping after in-flight writes are cleaned up");
                cancel.cancel();
            }
        });
    }

    let cfg = &plan.config;
    let spotify = SpotifyClient::new(
        plan.client_id.clone(),
        plan.client_secret.clone(),
        Duration::from_secs(cfg.network.request_timeout_secs),
    )?;

    let tracks = tokio::select! {
        _ = cancel.cancelled() => return Ok(ExitCode::from(1)),
        tracks = metadata::resolve(&spotify, &plan.url) => tracks?,
    };
    info!("Resolved {} track(s) from {}", tracks.len(), plan.url);

    let jobs = download::plan_jobs(&tracks, &plan.output_dir, &plan.layout);

    let transport = Arc::new(LucidaClient::new(&cfg.endpoints, &cfg.network)?);
    let adapters = services::build_adapters(&plan.services, transport, cfg.matching.similarity_threshold);
    let endpoint = Arc::new(EndpointState::new(cli.fallback));

    let mut coordinator = FallbackCoordinator::new(adapters, Arc::clone(&endpoint), cancel.clone())
        .with_timeout_promotion_after(cfg.retry.timeout_promotion_after)
        .with_tags(!cli.no_tags);
    if !cli.no_tags && !cli.no_cover {
        let covers = CoverArtClient::new(Duration::from_secs(cfg.network.request_timeout_secs))
            .context("Failed to build cover client")?;
        coordinator = coordinator.with_covers(Arc::new(covers));
    }
    let controller = RetryLoopController::new(Arc::new(coordinator), cli.loop_minutes, cancel.clone())
        .with_backoff(cfg.retry.backoff())
        .with_workers(cfg.retry.workers);

    info!(
        services = %plan.services.iter().map(|s| s.display_name()).collect::<Vec<_>>().join(", "),
        workers = cfg.retry.workers,
        "Downloading {} track(s) to {}",
        jobs.len(),
        plan.output_dir.display()
    );
    let state = controller.run(jobs).await;

    let verdicts = if cli.verify && !state.succeeded.is_empty() {
        let files: Vec<_> = state
            .succeeded
            .iter()
            .map(|job| (job.dest.clone(), job.track.spotify_id.clone()))
            .collect();
        let verifier = cfg.verifier.clone();
        let verdicts = tokio::task::spawn_blocking(move || verify::verify_all(&files, &verifier))
            .await
            .context("Verifier task failed")?;

        for (job, verdict) in state.succeeded.iter().zip(&verdicts) {
            if let Err(e) = verify::write_sidecar(&job.dest, verdict) {
                warn!("Failed to write verdict for {:?}: {}", job.dest, e);
            }
        }
        verdicts
    } else {
        Vec::new()
    };

    print!("{}", summary::render(&state, &verdicts, endpoint.promotions() > 0));

    Ok(if state.is_complete() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}
