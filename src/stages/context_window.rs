//! Context-window truncation under a token budget.
//!
//! Accumulates the message elements of one execution, and on input close
//! emits a window whose token total fits the effective budget
//! (`token_budget - reserve_for_output`), truncated by the configured
//! strategy. Non-message elements pass through immediately.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::element::StreamElement;
use crate::error::{PipelineError, Result};
use crate::message::{Message, Role};
use crate::provider::EmbeddingProvider;
use crate::stage::{forward, next_element, ElementReceiver, ElementSender, Stage, StageKind};
use crate::tokens::{HeuristicTokenCounter, TokenCounter};

/// How to shed messages once the window exceeds the effective budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TruncationStrategy {
    /// Drop from the head until under budget.
    #[default]
    Oldest,
    /// Drop from the tail until under budget.
    Newest,
    /// Refuse: fail the stage with a budget error.
    Fail,
    /// Keep the most relevant messages by embedding similarity, protecting
    /// recent (and optionally system) messages. Falls back to `Oldest`
    /// without a usable embedding provider.
    LeastRelevant,
    /// Replace older messages with a summary. The summarizer lives with the
    /// conversation store, so the core rejects this strategy.
    Summarize,
}

/// Where the relevance query text comes from.
#[derive(Debug, Clone)]
pub enum QuerySource {
    /// Content of the last user message.
    LastUser,
    /// Concatenated content of the last `n` messages.
    LastN(usize),
    /// A fixed query string.
    Custom(String),
}

/// Configuration for [`TruncationStrategy::LeastRelevant`].
pub struct RelevanceConfig {
    /// Embedding provider used for scoring.
    pub provider: Arc<dyn EmbeddingProvider>,
    /// The trailing messages that are always kept.
    pub min_recent_messages: usize,
    /// Also protect every system message.
    pub always_keep_system: bool,
    /// Query construction.
    pub query_source: QuerySource,
    /// Minimum cosine similarity for an unprotected message to survive.
    pub min_score: f32,
}

impl RelevanceConfig {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider,
            min_recent_messages: 2,
            always_keep_system: true,
            query_source: QuerySource::LastUser,
            min_score: 0.0,
        }
    }

    pub fn with_min_recent_messages(mut self, count: usize) -> Self {
        self.min_recent_messages = count;
        self
    }

    pub fn with_always_keep_system(mut self, keep: bool) -> Self {
        self.always_keep_system = keep;
        self
    }

    pub fn with_query_source(mut self, source: QuerySource) -> Self {
        self.query_source = source;
        self
    }

    pub fn with_min_score(mut self, score: f32) -> Self {
        self.min_score = score;
        self
    }
}

/// Maintains a message window under a token budget.
pub struct ContextWindowStage {
    name: String,
    token_budget: usize,
    reserve_for_output: usize,
    strategy: TruncationStrategy,
    counter: Arc<dyn TokenCounter>,
    relevance: Option<RelevanceConfig>,
}

impl ContextWindowStage {
    /// Create a stage with the default heuristic token counter. A zero
    /// `token_budget` disables limiting entirely.
    pub fn new(name: impl Into<String>, token_budget: usize) -> Self {
        Self {
            name: name.into(),
            token_budget,
            reserve_for_output: 0,
            strategy: TruncationStrategy::default(),
            counter: Arc::new(HeuristicTokenCounter),
            relevance: None,
        }
    }

    /// Tokens held back for the model's reply.
    pub fn with_reserve_for_output(mut self, reserve: usize) -> Self {
        self.reserve_for_output = reserve;
        self
    }

    /// Select the truncation strategy.
    pub fn with_strategy(mut self, strategy: TruncationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Replace the token counter.
    pub fn with_token_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.counter = counter;
        self
    }

    /// Configure relevance scoring for [`TruncationStrategy::LeastRelevant`].
    pub fn with_relevance(mut self, relevance: RelevanceConfig) -> Self {
        self.relevance = Some(relevance);
        self
    }

    fn effective_budget(&self) -> usize {
        self.token_budget.saturating_sub(self.reserve_for_output)
    }

    /// Indices of the retained messages, in original order.
    async fn select(
        &self,
        cancel: &CancellationToken,
        messages: &[Message],
        tokens: &[usize],
        total: usize,
        budget: usize,
    ) -> Result<Vec<usize>> {
        match self.strategy {
            TruncationStrategy::Oldest => Ok(drop_from_head(tokens, total, budget)),
            TruncationStrategy::Newest => Ok(drop_from_tail(tokens, total, budget)),
            TruncationStrategy::Fail => Err(PipelineError::TokenBudgetExceeded { total, budget }),
            TruncationStrategy::Summarize => Err(PipelineError::InvalidConfig(
                "summarize truncation requires a summarizer collaborator".to_string(),
            )),
            TruncationStrategy::LeastRelevant => {
                match self.select_relevant(cancel, messages, tokens, budget).await {
                    Ok(kept) => Ok(kept),
                    Err(err) => {
                        warn!(
                            stage = %self.name,
                            error = %err,
                            "relevance scoring unavailable; falling back to oldest-first truncation"
                        );
                        Ok(drop_from_head(tokens, total, budget))
                    }
                }
            }
        }
    }

    async fn select_relevant(
        &self,
        cancel: &CancellationToken,
        messages: &[Message],
        tokens: &[usize],
        budget: usize,
    ) -> Result<Vec<usize>> {
        let relevance = self.relevance.as_ref().ok_or_else(|| {
            PipelineError::InvalidConfig("no embedding provider configured".to_string())
        })?;

        let query = build_query(&relevance.query_source, messages);
        if query.is_empty() {
            return Err(PipelineError::Other("empty relevance query".to_string()));
        }

        let mut texts: Vec<String> = Vec::with_capacity(messages.len() + 1);
        texts.push(query);
        texts.extend(messages.iter().map(|m| m.content.clone()));
        let vectors = embed_batched(cancel, relevance.provider.as_ref(), &texts).await?;
        let (query_vec, message_vecs) = vectors.split_first().ok_or_else(|| {
            PipelineError::Other("embedding provider returned no vectors".to_string())
        })?;

        let protected_from = messages.len().saturating_sub(relevance.min_recent_messages);
        let scored: Vec<(usize, f32, bool)> = messages
            .iter()
            .enumerate()
            .map(|(i, m)| {
                let protected = i >= protected_from
                    || (relevance.always_keep_system && m.role == Role::System);
                (i, cosine_similarity(query_vec, &message_vecs[i]), protected)
            })
            .collect();

        let mut kept: Vec<usize> = Vec::new();
        let mut used = 0usize;
        for (i, _, protected) in &scored {
            if *protected {
                kept.push(*i);
                used += tokens[*i];
            }
        }
        let mut candidates: Vec<&(usize, f32, bool)> =
            scored.iter().filter(|(_, _, p)| !p).collect();
        candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        for (i, score, _) in candidates {
            if *score < relevance.min_score {
                break;
            }
            if used + tokens[*i] > budget {
                continue;
            }
            kept.push(*i);
            used += tokens[*i];
        }

        kept.sort_unstable();
        Ok(kept)
    }
}

fn drop_from_head(tokens: &[usize], total: usize, budget: usize) -> Vec<usize> {
    let mut total = total;
    let mut start = 0;
    while total > budget && start < tokens.len() - 1 {
        total -= tokens[start];
        start += 1;
    }
    (start..tokens.len()).collect()
}

fn drop_from_tail(tokens: &[usize], total: usize, budget: usize) -> Vec<usize> {
    let mut total = total;
    let mut end = tokens.len();
    while total > budget && end > 1 {
        end -= 1;
        total -= tokens[end];
    }
    (0..end).collect()
}

fn build_query(source: &QuerySource, messages: &[Message]) -> String {
    match source {
        QuerySource::LastUser => messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default(),
        QuerySource::LastN(n) => {
            let start = messages.len().saturating_sub(*n);
            messages[start..]
                .iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n")
        }
        QuerySource::Custom(query) => query.clone(),
    }
}

async fn embed_batched(
    cancel: &CancellationToken,
    provider: &dyn EmbeddingProvider,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    let batch = provider.max_batch_size().max(1);
    let mut vectors = Vec::with_capacity(texts.len());
    for window in texts.chunks(batch) {
        vectors.extend(provider.embed(cancel, window).await?);
    }
    if vectors.len() != texts.len() {
        return Err(PipelineError::Other(format!(
            "embedding provider returned {} vectors for {} texts",
            vectors.len(),
            texts.len()
        )));
    }
    Ok(vectors)
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl Stage for ContextWindowStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StageKind {
        StageKind::Accumulate
    }

    async fn process(
        &self,
        cancel: CancellationToken,
        input: ElementReceiver,
        output: ElementSender,
    ) -> Result<()> {
        let mut window: Vec<StreamElement> = Vec::new();
        while let Some(element) = next_element(&cancel, &input).await? {
            if element.as_message().is_some() {
                window.push(element);
            } else if !forward(&cancel, &output, element).await? {
                return Ok(());
            }
        }

        let messages: Vec<Message> = window
            .iter()
            .map(|e| e.as_message().cloned().expect("window holds messages"))
            .collect();
        let tokens: Vec<usize> = messages
            .iter()
            .map(|m| self.counter.count_message(m))
            .collect();
        let total: usize = tokens.iter().sum();
        let budget = self.effective_budget();

        if self.token_budget == 0 || total <= budget {
            for element in window {
                if !forward(&cancel, &output, element).await? {
                    break;
                }
            }
            return Ok(());
        }

        let kept = self.select(&cancel, &messages, &tokens, total, budget).await?;
        debug!(
            stage = %self.name,
            total,
            budget,
            kept = kept.len(),
            of = messages.len(),
            "window truncated"
        );
        for index in kept {
            let mut element = window[index].clone();
            element.set_metadata("context_truncated", true);
            if !forward(&cancel, &output, element).await? {
                break;
            }
        }
        Ok(())
    }
}
