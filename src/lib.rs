//! # streamweave
//!
//! A reactive streaming pipeline runtime: a DAG of processing **stages**
//! connected by typed element channels, executed as cooperative tasks.
//!
//! Stages consume a lazy sequence of [`StreamElement`]s (text, messages,
//! audio chunks, video frames, images, tool calls, errors, end-of-stream
//! markers) and produce another. The runtime wires one bounded channel per
//! stage, launches every driver concurrently, collects leaf output, enforces
//! timeouts and cancellation, aggregates failures, and shuts down
//! gracefully.
//!
//! ## Core Concepts
//!
//! - **[`StreamElement`]** — tagged payload plus a metadata/priority/sequence
//!   envelope; the unit of traffic on every channel.
//! - **[`Stage`]** — object-safe driver trait: drain the input, feed the
//!   output, close it on every exit path.
//! - **[`PipelineBuilder`]** — accumulates stages and edges, rejects cycles
//!   and duplicate names, warns on capability mismatches.
//! - **[`Pipeline`]** — immutable after build; execute any number of times
//!   until shutdown.
//! - **[`router`]** — content / round-robin / weighted / hash / random /
//!   broadcast multiplexers.
//! - **[`stages`]** — frame-rate limiting, VAD turn accumulation,
//!   context-window truncation, speech transforms.
//! - **[`provider`]** — collaborator traits (transcription, synthesis, VAD,
//!   embeddings) with deterministic mocks for tests.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use streamweave::{Message, Passthrough, PipelineBuilder, StreamElement};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = PipelineBuilder::new()
//!         .chain(vec![
//!             Arc::new(Passthrough::new("ingest")) as Arc<dyn streamweave::Stage>,
//!             Arc::new(Passthrough::new("deliver")),
//!         ])
//!         .build()?;
//!
//!     let result = pipeline
//!         .execute_sync(
//!             CancellationToken::new(),
//!             vec![StreamElement::message(Message::user("Hello, world!"))],
//!         )
//!         .await?;
//!     println!("{} elements out", result.elements.len());
//!
//!     pipeline.shutdown(CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod capability;
pub mod config;
pub mod element;
pub mod error;
pub mod events;
mod executor;
pub mod media;
pub mod message;
pub mod pipeline;
pub mod provider;
pub mod router;
pub mod stage;
pub mod stages;
pub mod tokens;
pub mod types;

pub use builder::PipelineBuilder;
pub use capability::{AudioSpec, ContentType, PortSpec, StageCapabilities};
pub use config::PipelineConfig;
pub use element::{ElementPayload, Priority, StreamElement};
pub use error::{PipelineError, Result, StageError};
pub use events::{EventEmitter, FnEventEmitter, PipelineEvent};
pub use media::{AudioData, AudioFormat, ImageData, VideoFrame};
pub use message::{Message, MessagePart, Role, ToolCall, ValidationRecord};
pub use pipeline::Pipeline;
pub use router::{
    BroadcastRouter, ContentRouter, HashRouter, RandomRouter, RoundRobinRouter, Router,
    WeightedRouter,
};
pub use stage::{
    forward, next_element, ElementReceiver, ElementSender, FilterStage, FnStage, MapStage,
    Passthrough, Stage, StageKind,
};
pub use stages::{
    ContextWindowStage, DropStrategy, LogSink, MergeStage, QuerySource, RateLimitStage,
    RelevanceConfig, SourceStage, TranscriptionStage, TruncationStrategy, TtsStage,
    VadAccumulatorStage, VadConfig,
};
pub use tokens::{HeuristicTokenCounter, TokenCounter};
pub use types::ExecutionResult;
