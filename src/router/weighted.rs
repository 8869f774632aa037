//! Weighted routing over a cumulative distribution.

use async_trait::async_trait;
use rand::Rng;
use tokio_util::sync::CancellationToken;

use super::{send_to_all, DropCounter, Router, RouterOutputs};
use crate::error::Result;
use crate::stage::{forward, next_element, ElementReceiver, ElementSender, Stage, StageKind};

/// Routes each data element to a named output drawn from a weighted
/// distribution.
///
/// Weights are normalized to a cumulative distribution at construction; each
/// element draws a uniform value in `[0, 1)` from the thread's CSPRNG and
/// picks the first bucket whose threshold covers the draw.
pub struct WeightedRouter {
    name: String,
    /// `(output name, cumulative threshold)` with the last threshold at 1.0.
    buckets: Vec<(String, f64)>,
    outputs: RouterOutputs,
    drops: DropCounter,
}

impl WeightedRouter {
    /// Create a router from `(output name, weight)` pairs. Non-positive
    /// weights contribute nothing.
    pub fn new(name: impl Into<String>, weights: Vec<(String, f64)>) -> Self {
        let total: f64 = weights.iter().map(|(_, w)| w.max(0.0)).sum();
        let mut buckets = Vec::with_capacity(weights.len());
        let mut cumulative = 0.0;
        for (output, weight) in weights {
            cumulative += weight.max(0.0);
            let threshold = if total > 0.0 { cumulative / total } else { 0.0 };
            buckets.push((output, threshold));
        }
        if let Some(last) = buckets.last_mut() {
            // Guard against floating-point undershoot on the final bucket.
            last.1 = 1.0;
        }
        Self {
            name: name.into(),
            buckets,
            outputs: RouterOutputs::new(),
            drops: DropCounter::new(),
        }
    }

    /// Number of elements that could not be delivered (no channel registered
    /// for the drawn bucket).
    pub fn dropped(&self) -> u64 {
        self.drops.count()
    }

    fn draw(&self) -> Option<&str> {
        if self.buckets.is_empty() {
            return None;
        }
        let roll: f64 = rand::rng().random();
        self.buckets
            .iter()
            .find(|(_, threshold)| *threshold >= roll)
            .map(|(output, _)| output.as_str())
    }
}

impl Router for WeightedRouter {
    fn register_output(&self, name: impl Into<String>, sender: ElementSender) {
        self.outputs.register(name.into(), sender);
    }
}

#[async_trait]
impl Stage for WeightedRouter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StageKind {
        StageKind::Transform
    }

    async fn process(
        &self,
        cancel: CancellationToken,
        input: ElementReceiver,
        output: ElementSender,
    ) -> Result<()> {
        drop(output);
        while let Some(element) = next_element(&cancel, &input).await? {
            if element.is_control() {
                send_to_all(&cancel, &self.outputs, &element).await?;
                continue;
            }
            let picked = self.draw().and_then(|name| self.outputs.named(name));
            match picked {
                Some(tx) => {
                    let _ = forward(&cancel, &tx, element).await?;
                }
                None => self.drops.record(&self.name, &element),
            }
        }
        Ok(())
    }
}
