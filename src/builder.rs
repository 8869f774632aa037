//! Fluent construction and validation of pipeline DAGs.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::events::EventEmitter;
use crate::pipeline::Pipeline;
use crate::stage::Stage;
use crate::capability;

/// Accumulates stages and edges, then validates the graph and produces an
/// executable [`Pipeline`].
///
/// # Example
///
/// ```
/// use streamweave::{Passthrough, PipelineBuilder, Stage};
/// use std::sync::Arc;
///
/// let pipeline = PipelineBuilder::new()
///     .chain(vec![
///         Arc::new(Passthrough::new("in")) as Arc<dyn Stage>,
///         Arc::new(Passthrough::new("out")),
///     ])
///     .build()
///     .unwrap();
/// assert_eq!(pipeline.stage_count(), 2);
/// ```
pub struct PipelineBuilder {
    stages: Vec<Arc<dyn Stage>>,
    edges: Vec<(String, String)>,
    config: PipelineConfig,
    emitter: Option<Arc<dyn EventEmitter>>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            edges: Vec::new(),
            config: PipelineConfig::default(),
            emitter: None,
        }
    }

    /// Add a stage with no edges.
    pub fn add_stage<S: Stage + 'static>(self, stage: S) -> Self {
        self.add_shared(Arc::new(stage))
    }

    /// Add an already-shared stage with no edges.
    pub fn add_shared(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Add stages connected linearly: an edge from each stage to the next.
    pub fn chain<I>(mut self, stages: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Stage>>,
    {
        let mut previous: Option<String> = None;
        for stage in stages {
            let name = stage.name().to_string();
            if let Some(prev) = previous.take() {
                self.edges.push((prev, name.clone()));
            }
            previous = Some(name);
            self.stages.push(stage);
        }
        self
    }

    /// Add fan-out edges from `from` to every stage in `tos`. The stages
    /// themselves must be added separately.
    pub fn branch(mut self, from: &str, tos: &[&str]) -> Self {
        for to in tos {
            self.edges.push((from.to_string(), (*to).to_string()));
        }
        self
    }

    /// Bind a configuration.
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Attach an event emitter for lifecycle notifications.
    pub fn with_event_emitter(mut self, emitter: Arc<dyn EventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Validate the graph and produce an immutable pipeline.
    ///
    /// Checks, in order: at least one stage; unique stage names; edge
    /// endpoints exist; the graph is acyclic (self-loops are cycles); the
    /// configuration is valid. Capability mismatches on edges are logged as
    /// warnings and never fail the build.
    pub fn build(self) -> Result<Pipeline> {
        if self.stages.is_empty() {
            return Err(PipelineError::NoStages);
        }

        let mut seen = HashSet::new();
        for stage in &self.stages {
            if !seen.insert(stage.name().to_string()) {
                return Err(PipelineError::DuplicateStage(stage.name().to_string()));
            }
        }

        for (from, to) in &self.edges {
            if !seen.contains(from) {
                return Err(PipelineError::UnknownStage(from.clone()));
            }
            if !seen.contains(to) {
                return Err(PipelineError::UnknownStage(to.clone()));
            }
        }

        self.check_acyclic()?;
        self.config.validate()?;
        self.check_capabilities();

        Ok(Pipeline::new(
            self.stages,
            self.edges,
            self.config,
            self.emitter,
        ))
    }

    fn check_acyclic(&self) -> Result<()> {
        let mut graph: DiGraph<String, ()> = DiGraph::new();
        let mut indices = HashMap::new();
        for stage in &self.stages {
            let name = stage.name().to_string();
            let idx = graph.add_node(name.clone());
            indices.insert(name, idx);
        }
        for (from, to) in &self.edges {
            graph.add_edge(indices[from], indices[to], ());
        }
        match toposort(&graph, None) {
            Ok(_) => Ok(()),
            Err(cycle) => Err(PipelineError::CyclicGraph(
                graph[cycle.node_id()].clone(),
            )),
        }
    }

    fn check_capabilities(&self) {
        let by_name: HashMap<&str, &Arc<dyn Stage>> = self
            .stages
            .iter()
            .map(|s| (s.name(), s))
            .collect();
        for (from, to) in &self.edges {
            let (Some(upstream), Some(downstream)) =
                (by_name.get(from.as_str()), by_name.get(to.as_str()))
            else {
                continue;
            };
            if let (Some(up), Some(down)) = (upstream.capabilities(), downstream.capabilities()) {
                capability::validate_edge(from, to, up, down);
            }
        }
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for PipelineBuilder {
    fn clone(&self) -> Self {
        Self {
            stages: self.stages.clone(),
            edges: self.edges.clone(),
            config: self.config.clone(),
            emitter: self.emitter.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{ContentType, PortSpec, StageCapabilities};
    use crate::stage::{ElementReceiver, ElementSender, Passthrough, StageKind};
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    #[test]
    fn test_empty_pipeline_fails() {
        let result = PipelineBuilder::new().build();
        assert!(matches!(result, Err(PipelineError::NoStages)));
    }

    #[test]
    fn test_duplicate_stage_fails() {
        let result = PipelineBuilder::new()
            .add_stage(Passthrough::new("dup"))
            .add_stage(Passthrough::new("dup"))
            .build();
        match result {
            Err(PipelineError::DuplicateStage(name)) => assert_eq!(name, "dup"),
            other => panic!("expected DuplicateStage, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_unknown_edge_endpoint_fails() {
        let result = PipelineBuilder::new()
            .add_stage(Passthrough::new("a"))
            .branch("a", &["ghost"])
            .build();
        match result {
            Err(PipelineError::UnknownStage(name)) => assert_eq!(name, "ghost"),
            other => panic!("expected UnknownStage, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_cycle_rejected() {
        let result = PipelineBuilder::new()
            .add_stage(Passthrough::new("a"))
            .add_stage(Passthrough::new("b"))
            .add_stage(Passthrough::new("c"))
            .branch("a", &["b"])
            .branch("b", &["c"])
            .branch("c", &["a"])
            .build();
        let err = result.err().expect("cycle must be rejected");
        assert!(matches!(err, PipelineError::CyclicGraph(_)));
        assert!(err.to_string().contains("cyclic"));
    }

    #[test]
    fn test_self_loop_rejected() {
        let result = PipelineBuilder::new()
            .add_stage(Passthrough::new("a"))
            .branch("a", &["a"])
            .build();
        assert!(matches!(result, Err(PipelineError::CyclicGraph(_))));
    }

    #[test]
    fn test_chain_builds_linear_edges() {
        let pipeline = PipelineBuilder::new()
            .chain(vec![
                Arc::new(Passthrough::new("in")) as Arc<dyn Stage>,
                Arc::new(Passthrough::new("proc")),
                Arc::new(Passthrough::new("out")),
            ])
            .build()
            .unwrap();
        assert_eq!(pipeline.stage_count(), 3);
        assert_eq!(pipeline.leaf_names(), ["out"]);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = PipelineBuilder::new()
            .add_stage(Passthrough::new("a"))
            .with_config(PipelineConfig::default().with_channel_buffer_size(0))
            .build();
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    struct TypedStage {
        name: String,
        caps: StageCapabilities,
    }

    #[async_trait]
    impl Stage for TypedStage {
        fn name(&self) -> &str {
            &self.name
        }
        fn kind(&self) -> StageKind {
            StageKind::Transform
        }
        fn capabilities(&self) -> Option<&StageCapabilities> {
            Some(&self.caps)
        }
        async fn process(
            &self,
            _cancel: CancellationToken,
            _input: ElementReceiver,
            _output: ElementSender,
        ) -> crate::error::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_capability_mismatch_warns_but_builds() {
        // Route the advisory warning through a real subscriber.
        let _ = tracing_subscriber::fmt()
            .with_env_filter("streamweave=warn")
            .with_test_writer()
            .try_init();

        // video producer feeding a text-only consumer: advisory warning only
        let producer = TypedStage {
            name: "camera".to_string(),
            caps: StageCapabilities::new(
                PortSpec::any(),
                PortSpec::of(vec![ContentType::Video]),
            ),
        };
        let consumer = TypedStage {
            name: "llm".to_string(),
            caps: StageCapabilities::new(
                PortSpec::of(vec![ContentType::Text]),
                PortSpec::any(),
            ),
        };
        let result = PipelineBuilder::new()
            .add_stage(producer)
            .add_stage(consumer)
            .branch("camera", &["llm"])
            .build();
        assert!(result.is_ok(), "capability violations are advisory");
    }

    #[test]
    fn test_clone_is_independent() {
        let base = PipelineBuilder::new().add_stage(Passthrough::new("a"));
        let extended = base.clone().add_stage(Passthrough::new("b"));
        assert!(base.build().is_ok());
        assert_eq!(extended.build().unwrap().stage_count(), 2);
    }
}
