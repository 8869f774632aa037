//! Built-in processing stages: rate limiting, VAD turn accumulation,
//! context-window truncation, the speech transforms, and the structural
//! helpers (merge, source, sink).

mod context_window;
mod merge;
mod rate_limit;
mod sink;
mod source;
mod transcribe;
mod tts;
mod vad;

pub use context_window::{
    ContextWindowStage, QuerySource, RelevanceConfig, TruncationStrategy,
};
pub use merge::MergeStage;
pub use rate_limit::{DropStrategy, RateLimitStage};
pub use sink::LogSink;
pub use source::SourceStage;
pub use transcribe::TranscriptionStage;
pub use tts::TtsStage;
pub use vad::{VadAccumulatorStage, VadConfig};
