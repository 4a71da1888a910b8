//! Test utilities and fixtures for spotiflac tests.
//!
//! This module provides track factories, synthetic audio, and file helpers
//! to reduce boilerplate in tests.
//!
//! # Example
//!
//! ```ignore
//! use spotiflac::test_utils::{mock_track, sine_sum};
//!
//! #[test]
//! fn test_something() {
//!     let track = mock_track("Song", &["Artist"]);
//!     let samples = sine_sum(44_100, 2.0, 200.0, 21_800.0, 200.0);
//!     // ... test logic
//! }
//! ```

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::model::TrackRef;

/// Bytes every FLAC stream starts with
pub const FLAC_MAGIC: &[u8; 4] = b"fLaC";

/// JPEG SOI/APP0 header followed by filler; enough for MIME sniffing
pub const FAKE_JPEG: &[u8] = &[
    0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0x01, 0x01, 0x00, 0x00, 0x01,
    0x00, 0x01, 0x00, 0x00, 0xFF, 0xD9,
];

/// Creates a track with sensible defaults.
///
/// Album is "Test Album", track 1 of disc 1, three minutes long, no ISRC,
/// release date or cover.
/// The Spotify ID is derived from the title so distinct titles give distinct IDs.
pub fn mock_track(title: &str, artists: &[&str]) -> TrackRef {
    TrackRef {
        spotify_id: mock_id(title),
        title: title.to_string(),
        artists: artists.iter().map(|a| a.to_string()).collect(),
        album: "Test Album".to_string(),
        track_number: 1,
        disc_number: 1,
        duration_ms: 180_000,
        isrc: None,
        release_date: None,
        cover_url: None,
    }
}

/// Creates `count` distinct tracks titled "Track 1", "Track 2", ...
pub fn mock_tracks(count: usize) -> Vec<TrackRef> {
    (1..=count)
        .map(|n| {
            let mut track = mock_track(&format!("Track {}", n), &["Test Artist"]);
            track.track_number = n as u32;
            track
        })
        .collect()
}

/// 22-character base-62 ID that is stable for a given seed string
fn mock_id(seed: &str) -> String {
    const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
    let mut state: u64 = 0xcbf2_9ce4_8422_2325;
    for b in seed.bytes() {
        state ^= b as u64;
        state = state.wrapping_mul(0x0100_0000_01b3);
    }
    (0..22)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            ALPHABET[(state % ALPHABET.len() as u64) as usize] as char
        })
        .collect()
}

/// Fake FLAC payload: the magic followed by `len` filler bytes.
pub fn fake_flac_bytes(len: usize) -> Vec<u8> {
    let mut bytes = FLAC_MAGIC.to_vec();
    bytes.extend((0..len).map(|i| (i % 251) as u8));
    bytes
}

/// Smallest FLAC file tag writers accept: STREAMINFO (44.1 kHz, stereo,
/// 16-bit), a trailing PADDING block, then a few bytes standing in for frames.
pub fn minimal_flac() -> Vec<u8> {
    let mut bytes = FLAC_MAGIC.to_vec();

    // STREAMINFO, not last, 34 bytes
    bytes.extend_from_slice(&[0x00, 0x00, 0x00, 34]);
    bytes.extend_from_slice(&[0x10, 0x00, 0x10, 0x00]); // block size 4096..4096
    bytes.extend_from_slice(&[0x00; 6]); // frame sizes unknown
    // 44100 Hz << 12 | (2 - 1) << 9 | (16 - 1) << 4, no sample count
    bytes.extend_from_slice(&[0x0A, 0xC4, 0x42, 0xF0]);
    bytes.extend_from_slice(&[0x00; 4]);
    bytes.extend_from_slice(&[0x00; 16]); // MD5

    // PADDING, last, 16 bytes
    bytes.extend_from_slice(&[0x81, 0x00, 0x00, 16]);
    bytes.extend_from_slice(&[0x00; 16]);

    bytes.extend_from_slice(&[0xFF, 0xF8, 0x69, 0x08, 0x00, 0x00, 0x8B, 0xAD]);
    bytes
}

/// Mono signal made of equal-amplitude sines from `start_hz` to `stop_hz`
/// (inclusive) every `step_hz`, normalised to a peak below 1.0.
pub fn sine_sum(sample_rate: u32, seconds: f32, start_hz: f32, stop_hz: f32, step_hz: f32) -> Vec<f32> {
    let len = (sample_rate as f32 * seconds) as usize;
    let mut freqs = Vec::new();
    let mut f = start_hz;
    while f <= stop_hz {
        freqs.push(f);
        f += step_hz;
    }
    if freqs.is_empty() {
        return vec![0.0; len];
    }

    // f64 phase keeps rounding noise far below any level the verifier looks at
    let amplitude = 0.9 / freqs.len() as f64;
    let rate = sample_rate as f64;
    (0..len)
        .map(|n| {
            let t = n as f64 / rate;
            let sum = freqs
                .iter()
                .enumerate()
                // Spread the phases so the peaks don't all line up at t = 0
                .map(|(i, &f)| (std::f64::consts::TAU * f as f64 * t + i as f64 * 0.7).sin())
                .sum::<f64>();
            (sum * amplitude) as f32
        })
        .collect()
}

/// Write mono 16-bit PCM as a WAV file, for exercising the decoder.
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) {
    let data_len = (samples.len() * 2) as u32;
    let mut bytes = Vec::with_capacity(44 + data_len as usize);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVEfmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
    bytes.extend_from_slice(&1u16.to_le_bytes()); // mono
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&(sample_rate * 2).to_le_bytes());
    bytes.extend_from_slice(&2u16.to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    for s in samples {
        let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    std::fs::write(path, bytes).expect("Failed to write WAV fixture");
}

// ============================================================================
// Canned HTTP server
// ============================================================================

/// One request received by a [`serve`] server
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    /// Path and query, as sent
    pub target: String,
    /// Header names lowercased
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Recorded {
    pub fn path(&self) -> &str {
        self.target.split('?').next().unwrap_or_default()
    }

    pub fn query(&self) -> &str {
        self.target.split_once('?').map(|(_, q)| q).unwrap_or_default()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// `http://{Host}`, for building absolute URLs back to the same server
    pub fn origin(&self) -> String {
        format!("http://{}", self.header("host").unwrap_or_default())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("request body is JSON")
    }
}

/// Response a [`serve`] handler returns
#[derive(Debug, Clone)]
pub struct Canned {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Canned {
    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn json(status: u16, value: serde_json::Value) -> Self {
        Self::status(status)
            .with_header("Content-Type", "application/json")
            .with_body(value.to_string().into_bytes())
    }

    pub fn html(body: &str) -> Self {
        Self::status(200)
            .with_header("Content-Type", "text/html; charset=utf-8")
            .with_body(body.as_bytes().to_vec())
    }

    pub fn bytes(content_type: &str, body: Vec<u8>) -> Self {
        Self::status(200).with_header("Content-Type", content_type).with_body(body)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut head = format!("HTTP/1.1 {} Canned\r\n", self.status);
        for (name, value) in &self.headers {
            head.push_str(&format!("{}: {}\r\n", name, value));
        }
        head.push_str(&format!("Content-Length: {}\r\nConnection: close\r\n\r\n", self.body.len()));
        let mut bytes = head.into_bytes();
        bytes.extend_from_slice(&self.body);
        bytes
    }
}

/// Handle to a running [`serve`] server
pub struct TestServer {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl TestServer {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Requests answered so far, in arrival order
    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().clone()
    }
}

/// Serve HTTP/1.1 on a loopback port, answering every request with `handler`.
///
/// Each connection carries one request and is closed after the response.
/// The server lives as long as the test's runtime.
pub async fn serve<F>(handler: F) -> TestServer
where
    F: Fn(&Recorded) -> Canned + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");
    let requests = Arc::new(Mutex::new(Vec::new()));
    let handler = Arc::new(handler);

    let log = Arc::clone(&requests);
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let handler = Arc::clone(&handler);
            let log = Arc::clone(&log);
            tokio::spawn(async move {
                let Some(request) = read_request(&mut socket).await else {
                    return;
                };
                let response = handler(&request);
                log.lock().push(request);
                let _ = socket.write_all(&response.to_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    TestServer { addr, requests }
}

async fn read_request(socket: &mut TcpStream) -> Option<Recorded> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split(' ');
    let method = request_line.next()?.to_string();
    let target = request_line.next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buf[head_end..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Some(Recorded {
        method,
        target,
        headers,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_track_ids_are_stable_and_valid() {
        let a = mock_track("Song", &["Artist"]);
        let b = mock_track("Song", &["Other"]);
        let c = mock_track("Other Song", &["Artist"]);
        assert_eq!(a.spotify_id, b.spotify_id);
        assert_ne!(a.spotify_id, c.spotify_id);
        assert_eq!(a.spotify_id.len(), 22);
        assert!(a.spotify_id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_mock_tracks_are_distinct() {
        let tracks = mock_tracks(5);
        let ids: std::collections::HashSet<_> = tracks.iter().map(|t| &t.spotify_id).collect();
        assert_eq!(ids.len(), 5);
        assert_eq!(tracks[4].track_number, 5);
    }

    #[test]
    fn test_sine_sum_is_bounded() {
        let samples = sine_sum(8_000, 0.5, 100.0, 3_000.0, 100.0);
        assert_eq!(samples.len(), 4_000);
        assert!(samples.iter().all(|s| s.abs() <= 0.9 + 1e-4));
    }

    #[test]
    fn test_fake_flac_has_magic() {
        assert!(fake_flac_bytes(10).starts_with(FLAC_MAGIC));
        assert!(minimal_flac().starts_with(FLAC_MAGIC));
    }

    #[tokio::test]
    async fn test_serve_records_requests() {
        let server = serve(|request| match request.path() {
            "/echo" => Canned::json(201, serde_json::json!({"method": request.method})),
            _ => Canned::status(404),
        })
        .await;

        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        let response = client
            .post(format!("{}/echo?x=1", server.url()))
            .header("X-Test", "yes")
            .body("payload")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 201);
        assert_eq!(response.json::<serde_json::Value>().await.unwrap()["method"], "POST");

        let missing = client.get(format!("{}/nope", server.url())).send().await.unwrap();
        assert_eq!(missing.status().as_u16(), 404);

        let requests = server.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].query(), "x=1");
        assert_eq!(requests[0].header("x-test"), Some("yes"));
        assert_eq!(requests[0].body, b"payload");
        assert_eq!(requests[0].origin(), server.url());
    }
}
