//! Media payload types carried by stream elements.
//!
//! Audio, video, and image payloads keep their bodies in [`Bytes`] so that
//! cloning an element stays shallow: copies share the underlying buffer and
//! downstream stages treat payloads as immutable.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

/// Encoding of an audio payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioFormat {
    /// 16-bit signed little-endian PCM.
    Pcm16,
    /// 32-bit float PCM.
    Float32,
    /// Opus frames.
    Opus,
    /// MPEG-1 Layer III.
    Mp3,
    /// AAC frames.
    Aac,
}

impl AudioFormat {
    /// Stable string tag for logging and metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Pcm16 => "pcm16",
            AudioFormat::Float32 => "float32",
            AudioFormat::Opus => "opus",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Aac => "aac",
        }
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chunk of audio samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioData {
    /// Raw encoded bytes.
    pub data: Bytes,
    /// Samples per second (e.g. 16000, 48000).
    pub sample_rate: u32,
    /// Channel count (1 = mono, 2 = stereo).
    pub channels: u16,
    /// Sample encoding.
    pub format: AudioFormat,
    /// Optional container/transport encoding tag (e.g. `"base64"`).
    pub encoding: Option<String>,
    /// Optional reference into external storage instead of inline bytes.
    pub storage_ref: Option<String>,
}

impl AudioData {
    /// Create a PCM16 chunk, the common capture format.
    pub fn pcm16(data: impl Into<Bytes>, sample_rate: u32, channels: u16) -> Self {
        Self {
            data: data.into(),
            sample_rate,
            channels,
            format: AudioFormat::Pcm16,
            encoding: None,
            storage_ref: None,
        }
    }

    /// Create a chunk with an explicit format.
    pub fn new(data: impl Into<Bytes>, sample_rate: u32, channels: u16, format: AudioFormat) -> Self {
        Self {
            data: data.into(),
            sample_rate,
            channels,
            format,
            encoding: None,
            storage_ref: None,
        }
    }

    /// Duration of this chunk, when the format has a fixed sample size.
    ///
    /// Returns `None` for compressed formats where duration is not derivable
    /// from the byte length alone.
    pub fn duration(&self) -> Option<Duration> {
        let bytes_per_sample = match self.format {
            AudioFormat::Pcm16 => 2,
            AudioFormat::Float32 => 4,
            _ => return None,
        };
        let denom = self.sample_rate as u64 * self.channels as u64 * bytes_per_sample;
        if denom == 0 {
            return None;
        }
        let nanos = (self.data.len() as u64).saturating_mul(1_000_000_000) / denom;
        Some(Duration::from_nanos(nanos))
    }
}

/// A single video frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoFrame {
    /// Encoded frame bytes.
    pub data: Bytes,
    /// MIME type of the encoding (e.g. `"video/h264"`, `"image/jpeg"`).
    pub mime_type: String,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Source frame rate, frames per second.
    pub frame_rate: f64,
    /// Duration the frame covers, when known.
    pub duration: Option<Duration>,
    /// Optional reference into external storage instead of inline bytes.
    pub storage_ref: Option<String>,
    /// Capture timestamp.
    pub timestamp: SystemTime,
}

impl VideoFrame {
    pub fn new(data: impl Into<Bytes>, mime_type: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
            width,
            height,
            frame_rate: 0.0,
            duration: None,
            storage_ref: None,
            timestamp: SystemTime::now(),
        }
    }

    /// Set the source frame rate.
    pub fn with_frame_rate(mut self, fps: f64) -> Self {
        self.frame_rate = fps;
        self
    }
}

/// A still image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageData {
    /// Encoded image bytes.
    pub data: Bytes,
    /// MIME type of the encoding (e.g. `"image/png"`).
    pub mime_type: String,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Optional format tag when it differs from the MIME subtype.
    pub format: Option<String>,
    /// Optional reference into external storage instead of inline bytes.
    pub storage_ref: Option<String>,
}

impl ImageData {
    pub fn new(data: impl Into<Bytes>, mime_type: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
            width,
            height,
            format: None,
            storage_ref: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_format_tags() {
        assert_eq!(AudioFormat::Pcm16.as_str(), "pcm16");
        assert_eq!(AudioFormat::Aac.to_string(), "aac");
    }

    #[test]
    fn test_pcm16_duration() {
        // 16 kHz mono PCM16: 320 bytes = 160 samples = 10 ms.
        let chunk = AudioData::pcm16(vec![0u8; 320], 16_000, 1);
        assert_eq!(chunk.duration(), Some(Duration::from_millis(10)));
    }

    #[test]
    fn test_compressed_duration_unknown() {
        let chunk = AudioData::new(vec![0u8; 100], 48_000, 2, AudioFormat::Opus);
        assert_eq!(chunk.duration(), None);
    }

    #[test]
    fn test_clone_is_shallow() {
        let chunk = AudioData::pcm16(vec![1u8; 1024], 16_000, 1);
        let copy = chunk.clone();
        // Bytes clones share the same backing buffer.
        assert_eq!(copy.data.as_ptr(), chunk.data.as_ptr());
    }

    #[test]
    fn test_video_frame_builder() {
        let frame = VideoFrame::new(vec![0u8; 16], "image/jpeg", 640, 480).with_frame_rate(30.0);
        assert_eq!(frame.width, 640);
        assert_eq!(frame.frame_rate, 30.0);
    }
}
