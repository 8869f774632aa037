//! Optional per-stage capability descriptors.
//!
//! A stage may declare what content types and audio parameters it accepts and
//! produces. The builder checks each edge whose two endpoints both declare
//! capabilities and logs a warning for incompatible pairs. Validation is
//! advisory: a warned pipeline still builds, since capability descriptors
//! routinely under-describe what a stage really forwards.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::media::AudioFormat;

/// A content-type tag for capability matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// Matches every content type.
    Any,
    Text,
    Message,
    Audio,
    Video,
    Image,
    ToolCall,
}

/// Audio sub-descriptor. An empty list on either side of a comparison means
/// "any value".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioSpec {
    /// Allowed sample encodings.
    #[serde(default)]
    pub formats: Vec<AudioFormat>,
    /// Allowed sample rates.
    #[serde(default)]
    pub sample_rates: Vec<u32>,
    /// Allowed channel counts.
    #[serde(default)]
    pub channels: Vec<u16>,
}

impl AudioSpec {
    pub fn new(formats: Vec<AudioFormat>, sample_rates: Vec<u32>, channels: Vec<u16>) -> Self {
        Self {
            formats,
            sample_rates,
            channels,
        }
    }
}

/// What one side of a stage accepts or produces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortSpec {
    /// Accepted/produced content types; empty means "anything".
    #[serde(default)]
    pub content_types: Vec<ContentType>,
    /// Audio constraints, when the port carries audio.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioSpec>,
}

impl PortSpec {
    /// A port that accepts anything.
    pub fn any() -> Self {
        Self {
            content_types: vec![ContentType::Any],
            audio: None,
        }
    }

    /// A port constrained to the given content types.
    pub fn of(content_types: Vec<ContentType>) -> Self {
        Self {
            content_types,
            audio: None,
        }
    }

    /// Attach an audio sub-descriptor.
    pub fn with_audio(mut self, audio: AudioSpec) -> Self {
        self.audio = Some(audio);
        self
    }

    fn accepts_anything(&self) -> bool {
        self.content_types.is_empty() || self.content_types.contains(&ContentType::Any)
    }
}

/// Declared input/output capabilities of a stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageCapabilities {
    /// What the stage accepts.
    pub input: PortSpec,
    /// What the stage produces.
    pub output: PortSpec,
}

impl StageCapabilities {
    pub fn new(input: PortSpec, output: PortSpec) -> Self {
        Self { input, output }
    }
}

/// Whether `upstream`'s output is compatible with `downstream`'s input.
///
/// Compatible iff some produced content type is accepted (or either side is
/// `Any`/empty), and -- when both sides carry an audio sub-descriptor -- the
/// format, sample-rate, and channel sets pairwise intersect, with an empty
/// set meaning "any".
pub fn compatible(upstream: &PortSpec, downstream: &PortSpec) -> bool {
    let types_ok = upstream.accepts_anything()
        || downstream.accepts_anything()
        || upstream
            .content_types
            .iter()
            .any(|t| downstream.content_types.contains(t));
    if !types_ok {
        return false;
    }

    match (&upstream.audio, &downstream.audio) {
        (Some(a), Some(b)) => {
            sets_intersect(&a.formats, &b.formats)
                && sets_intersect(&a.sample_rates, &b.sample_rates)
                && sets_intersect(&a.channels, &b.channels)
        }
        _ => true,
    }
}

fn sets_intersect<T: PartialEq>(a: &[T], b: &[T]) -> bool {
    a.is_empty() || b.is_empty() || a.iter().any(|x| b.contains(x))
}

/// Check one edge and log a warning when the endpoints disagree. Never fails.
pub(crate) fn validate_edge(
    from: &str,
    to: &str,
    upstream: &StageCapabilities,
    downstream: &StageCapabilities,
) {
    if !compatible(&upstream.output, &downstream.input) {
        warn!(
            from,
            to,
            produces = ?upstream.output.content_types,
            accepts = ?downstream.input.content_types,
            "edge endpoints declare incompatible capabilities"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_matches_everything() {
        let any = PortSpec::any();
        let audio_only = PortSpec::of(vec![ContentType::Audio]);
        assert!(compatible(&any, &audio_only));
        assert!(compatible(&audio_only, &any));
    }

    #[test]
    fn test_empty_type_set_matches_everything() {
        let empty = PortSpec::default();
        let text_only = PortSpec::of(vec![ContentType::Text]);
        assert!(compatible(&empty, &text_only));
        assert!(compatible(&text_only, &empty));
    }

    #[test]
    fn test_disjoint_types_incompatible() {
        let video = PortSpec::of(vec![ContentType::Video]);
        let text = PortSpec::of(vec![ContentType::Text]);
        assert!(!compatible(&video, &text));
    }

    #[test]
    fn test_overlapping_types_compatible() {
        let out = PortSpec::of(vec![ContentType::Text, ContentType::Message]);
        let input = PortSpec::of(vec![ContentType::Message]);
        assert!(compatible(&out, &input));
    }

    #[test]
    fn test_audio_specs_must_intersect() {
        let out = PortSpec::of(vec![ContentType::Audio]).with_audio(AudioSpec::new(
            vec![AudioFormat::Pcm16],
            vec![16_000],
            vec![1],
        ));
        let matching = PortSpec::of(vec![ContentType::Audio]).with_audio(AudioSpec::new(
            vec![AudioFormat::Pcm16, AudioFormat::Opus],
            vec![16_000, 48_000],
            vec![1, 2],
        ));
        let wrong_rate = PortSpec::of(vec![ContentType::Audio]).with_audio(AudioSpec::new(
            vec![AudioFormat::Pcm16],
            vec![8_000],
            vec![1],
        ));
        assert!(compatible(&out, &matching));
        assert!(!compatible(&out, &wrong_rate));
    }

    #[test]
    fn test_empty_audio_dimension_means_any() {
        let out = PortSpec::of(vec![ContentType::Audio]).with_audio(AudioSpec::new(
            vec![AudioFormat::Float32],
            vec![],
            vec![],
        ));
        let input = PortSpec::of(vec![ContentType::Audio]).with_audio(AudioSpec::new(
            vec![AudioFormat::Float32],
            vec![44_100],
            vec![2],
        ));
        assert!(compatible(&out, &input));
    }

    #[test]
    fn test_one_sided_audio_spec_is_ignored() {
        let out = PortSpec::of(vec![ContentType::Audio]).with_audio(AudioSpec::new(
            vec![AudioFormat::Pcm16],
            vec![16_000],
            vec![1],
        ));
        let no_audio_spec = PortSpec::of(vec![ContentType::Audio]);
        assert!(compatible(&out, &no_audio_spec));
    }
}
