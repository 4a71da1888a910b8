//! Mono PCM decoding for spectral analysis, built on symphonia.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{CODEC_TYPE_NULL, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Failed to open {0}")]
    Open(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Decode error: {0}")]
    Decode(String),
}

/// Sequential decoder that yields one mono sample stream.
pub struct MonoDecoder {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    n_frames: Option<u64>,
}

impl MonoDecoder {
    pub fn open(path: &Path) -> Result<Self, DecodeError> {
        let file = File::open(path).map_err(|e| DecodeError::Open(format!("{}: {}", path.display(), e)))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension() {
            hint.with_extension(&ext.to_string_lossy());
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| DecodeError::UnsupportedFormat(e.to_string()))?;
        let reader = probed.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| DecodeError::UnsupportedFormat("No audio track found".to_string()))?;

        let track_id = track.id;
        let params = track.codec_params.clone();
        let sample_rate = params
            .sample_rate
            .ok_or_else(|| DecodeError::Decode("Unknown sample rate".to_string()))?;

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| DecodeError::Decode(e.to_string()))?;

        Ok(Self {
            reader,
            decoder,
            track_id,
            sample_rate,
            n_frames: params.n_frames,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Total frames, when the container announces it.
    pub fn n_frames(&self) -> Option<u64> {
        self.n_frames
    }

    /// Decode the next packet, mixed down to mono.
    ///
    /// Returns `Ok(None)` at end of stream. Corrupt frames are skipped.
    pub fn next_block(&mut self) -> Result<Option<Vec<f32>>, DecodeError> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(DecodeError::Decode(e.to_string())),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(d) => d,
                Err(SymphoniaError::DecodeError(_)) => continue,
                Err(e) => return Err(DecodeError::Decode(e.to_string())),
            };

            return Ok(Some(mix_to_mono(&decoded)));
        }
    }
}

/// Average all channels of a buffer into one normalised f32 channel.
fn mix_to_mono(buffer: &AudioBufferRef) -> Vec<f32> {
    match buffer {
        AudioBufferRef::F32(buf) => average_planes(buf.planes().planes(), |s| s),
        AudioBufferRef::S16(buf) => average_planes(buf.planes().planes(), |s| s as f32 / 32768.0),
        AudioBufferRef::S24(buf) => average_planes(buf.planes().planes(), |s| s.0 as f32 / 8388608.0),
        AudioBufferRef::S32(buf) => average_planes(buf.planes().planes(), |s| s as f32 / 2147483648.0),
        AudioBufferRef::U8(buf) => average_planes(buf.planes().planes(), |s| (s as f32 - 128.0) / 128.0),
        _ => Vec::new(),
    }
}

fn average_planes<T: Copy>(planes: &[&[T]], to_f32: impl Fn(T) -> f32) -> Vec<f32> {
    let Some(first) = planes.first() else {
        return Vec::new();
    };
    let scale = 1.0 / planes.len() as f32;
    (0..first.len())
        .map(|frame| planes.iter().map(|p| to_f32(p[frame])).sum::<f32>() * scale)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::write_wav;

    #[test]
    fn test_open_nonexistent_file() {
        let result = MonoDecoder::open(Path::new("/nonexistent/file.flac"));
        assert!(matches!(result, Err(DecodeError::Open(_))));
    }

    #[test]
    fn test_open_non_audio_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.flac");
        std::fs::write(&path, b"<html>not audio</html>").unwrap();
        assert!(MonoDecoder::open(&path).is_err());
    }

    #[test]
    fn test_decode_wav_to_mono() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let samples: Vec<f32> = (0..8000).map(|n| if n % 2 == 0 { 0.5 } else { -0.5 }).collect();
        write_wav(&path, &samples, 8000);

        let mut decoder = MonoDecoder::open(&path).unwrap();
        assert_eq!(decoder.sample_rate(), 8000);

        let mut decoded = Vec::new();
        while let Some(block) = decoder.next_block().unwrap() {
            decoded.extend(block);
        }
        assert_eq!(decoded.len(), samples.len());
        assert!((decoded[0] - 0.5).abs() < 1e-3);
        assert!((decoded[1] + 0.5).abs() < 1e-3);
    }
}
