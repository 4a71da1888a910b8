//! Spotify Web API HTTP client
//!
//! Client-credentials auth, track/album/playlist lookups and paging.
//! Album listings carry no ISRCs, so album tracks are re-fetched in
//! batches through `/v1/tracks?ids=` to fill them in.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{adapter, dto};
use crate::error::{Error, Result};
use crate::metadata::{MetadataSource, SpotifyKind, SpotifyRef};
use crate::model::TrackRef;

const API_BASE: &str = "https://api.spotify.com/v1";
const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Maximum IDs accepted by the batch tracks endpoint
const TRACK_BATCH: usize = 50;

/// Refresh the token this long before Spotify says it expires
const TOKEN_SLACK: Duration = Duration::from_secs(60);

const USER_AGENT: &str = concat!("spotiflac/", env!("CARGO_PKG_VERSION"));

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Spotify Web API client
pub struct SpotifyClient {
    http_client: reqwest::Client,
    api_base: String,
    token_url: String,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<CachedToken>>,
}

impl SpotifyClient {
    /// Create a new client with the given application credentials
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::unavailable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            api_base: API_BASE.to_string(),
            token_url: TOKEN_URL.to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token: Mutex::new(None),
        })
    }

    /// Create a client for testing with custom base URLs
    #[cfg(test)]
    pub fn with_base_urls(api_base: impl Into<String>, token_url: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::builder()
                .no_proxy()
                .build()
                .expect("test HTTP client builds"),
            api_base: api_base.into(),
            token_url: token_url.into(),
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            token: Mutex::new(None),
        }
    }

    /// Get a bearer token, requesting a new one when the cached one is stale
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref()
            && token.expires_at > Instant::now()
        {
            return Ok(token.value.clone());
        }

        tracing::debug!("Requesting Spotify access token");
        let response = self
            .http_client
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| Error::unavailable(format!("token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::unavailable(format!(
                "Spotify rejected the client credentials (HTTP {})",
                status
            )));
        }

        let body: dto::TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::unavailable(format!("malformed token response: {}", e)))?;

        let lifetime = Duration::from_secs(body.expires_in).saturating_sub(TOKEN_SLACK);
        *cached = Some(CachedToken {
            value: body.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(body.access_token)
    }

    /// GET a Web API URL and decode the JSON body
    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let token = self.access_token().await?;

        let response = self
            .http_client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| Error::unavailable(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::BAD_REQUEST {
            let message = match response.json::<dto::ApiError>().await {
                Ok(err) => err.error.message,
                Err(_) => status.to_string(),
            };
            return Err(Error::invalid_reference(message));
        }

        if !status.is_success() {
            return Err(Error::unavailable(format!(
                "HTTP {}: {}",
                status,
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| Error::unavailable(format!("unexpected response from {}: {}", url, e)))
    }

    async fn track(&self, id: &str) -> Result<Vec<TrackRef>> {
        let track: dto::Track = self.get_json(&format!("{}/tracks/{}", self.api_base, id)).await?;
        Ok(adapter::to_track_ref(track).into_iter().collect())
    }

    async fn album(&self, id: &str) -> Result<Vec<TrackRef>> {
        let album: dto::Album = self.get_json(&format!("{}/albums/{}", self.api_base, id)).await?;
        tracing::debug!("Album '{}' has {} tracks", album.info.name, album.tracks.total);

        let mut listing = Vec::with_capacity(album.tracks.total as usize);
        let mut page = album.tracks;
        loop {
            listing.extend(
                page.items
                    .into_iter()
                    .filter_map(|t| adapter::simplified_to_track_ref(t, &album.info)),
            );
            let Some(next) = page.next else { break };
            page = self.get_json::<dto::Paging<dto::SimplifiedTrack>>(&next).await?;
        }

        self.fill_isrcs(&mut listing).await;
        Ok(listing)
    }

    async fn playlist(&self, id: &str) -> Result<Vec<TrackRef>> {
        let mut url = Some(format!("{}/playlists/{}/tracks?limit=100", self.api_base, id));
        let mut tracks = Vec::new();
        let mut skipped = 0usize;

        while let Some(current) = url {
            let page: dto::Paging<dto::PlaylistItem> = self.get_json(&current).await?;
            for item in page.items {
                match item.track.and_then(adapter::to_track_ref) {
                    Some(track) => tracks.push(track),
                    None => skipped += 1,
                }
            }
            url = page.next;
        }

        if skipped > 0 {
            tracing::info!("Skipped {} playlist item(s) that are not catalog tracks", skipped);
        }
        Ok(tracks)
    }

    /// Best-effort ISRC lookup for tracks that lack one
    async fn fill_isrcs(&self, tracks: &mut [TrackRef]) {
        for chunk in tracks.chunks_mut(TRACK_BATCH) {
            let ids: Vec<&str> = chunk.iter().map(|t| t.spotify_id.as_str()).collect();
            let url = format!("{}/tracks?ids={}", self.api_base, ids.join(","));

            #[derive(serde::Deserialize)]
            struct Batch {
                tracks: Vec<Option<dto::Track>>,
            }

            match self.get_json::<Batch>(&url).await {
                Ok(batch) => {
                    for (track, full) in chunk.iter_mut().zip(batch.tracks) {
                        if let Some(full) = full.and_then(adapter::to_track_ref)
                            && full.spotify_id == track.spotify_id
                        {
                            track.isrc = full.isrc;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("ISRC lookup failed, matching will rely on titles: {}", e);
                }
            }
        }
    }
}

#[async_trait]
impl MetadataSource for SpotifyClient {
    async fn resolve(&self, reference: &SpotifyRef) -> Result<Vec<TrackRef>> {
        let id = &reference.id;
        let tracks = match reference.kind {
            SpotifyKind::Track => self.track(id).await,
            SpotifyKind::Album => self.album(id).await,
            SpotifyKind::Playlist => self.playlist(id).await,
        }
        .map_err(|e| e.context(format!("resolving {}", reference)))?;

        if tracks.is_empty() {
            return Err(Error::unavailable(format!("{} contains no downloadable tracks", reference)));
        }
        Ok(tracks)
    }
}
