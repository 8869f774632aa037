//! Round-robin routing: atomic counter modulo output count.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{send_to_all, Router, RouterOutputs};
use crate::error::Result;
use crate::stage::{forward, next_element, ElementReceiver, ElementSender, Stage, StageKind};

/// Distributes data elements across outputs in registration order.
pub struct RoundRobinRouter {
    name: String,
    outputs: RouterOutputs,
    counter: AtomicUsize,
}

impl RoundRobinRouter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outputs: RouterOutputs::new(),
            counter: AtomicUsize::new(0),
        }
    }
}

impl Router for RoundRobinRouter {
    fn register_output(&self, name: impl Into<String>, sender: ElementSender) {
        self.outputs.register(name.into(), sender);
    }
}

#[async_trait]
impl Stage for RoundRobinRouter {
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
            let count = self.outputs.len();
            if count == 0 {
                continue;
            }
            let index = self.counter.fetch_add(1, Ordering::Relaxed) % count;
            if let Some(tx) = self.outputs.at(index) {
                let _ = forward(&cancel, &tx, element).await?;
            }
        }
        Ok(())
    }
}
