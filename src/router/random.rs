//! Random routing: uniform output choice per element.

use async_trait::async_trait;
use rand::Rng;
use tokio_util::sync::CancellationToken;

use super::{send_to_all, Router, RouterOutputs};
use crate::error::Result;
use crate::stage::{forward, next_element, ElementReceiver, ElementSender, Stage, StageKind};

/// Routes each data element to a uniformly random output, drawn from the
/// thread's CSPRNG.
pub struct RandomRouter {
    name: String,
    outputs: RouterOutputs,
}

impl RandomRouter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outputs: RouterOutputs::new(),
        }
    }
}

impl Router for RandomRouter {
    fn register_output(&self, name: impl Into<String>, sender: ElementSender) {
        self.outputs.register(name.into(), sender);
    }
}

#[async_trait]
impl Stage for RandomRouter {
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
            let index = rand::rng().random_range(0..count);
            if let Some(tx) = self.outputs.at(index) {
                let _ = forward(&cancel, &tx, element).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::StreamElement;
    use crate::router::test_support::run_router;

    #[tokio::test]
    async fn test_every_element_delivered_exactly_once() {
        let router = RandomRouter::new("rand");
        let outputs = run_router(
            router,
            |r| {
                let (a_tx, a_rx) = flume::bounded(256);
                let (b_tx, b_rx) = flume::bounded(256);
                let (c_tx, c_rx) = flume::bounded(256);
                r.register_output("a", a_tx);
                r.register_output("b", b_tx);
                r.register_output("c", c_tx);
                vec![
                    ("a".to_string(), a_rx),
                    ("b".to_string(), b_rx),
                    ("c".to_string(), c_rx),
                ]
            },
            (0..200).map(|i| StreamElement::text(format!("{i}"))).collect(),
        )
        .await;
        let total: usize = outputs.iter().map(|(_, r)| r.len()).sum();
        assert_eq!(total, 200);
    }

    #[tokio::test]
    async fn test_error_elements_broadcast() {
        let router = RandomRouter::new("rand");
        let outputs = run_router(
            router,
            |r| {
                let (a_tx, a_rx) = flume::bounded(8);
                let (b_tx, b_rx) = flume::bounded(8);
                r.register_output("a", a_tx);
                r.register_output("b", b_tx);
                vec![("a".to_string(), a_rx), ("b".to_string(), b_rx)]
            },
            vec![StreamElement::error(
                crate::error::PipelineError::Other("x".to_string()),
            )],
        )
        .await;
        for (_, received) in outputs {
            assert_eq!(received.len(), 1);
            assert!(received[0].is_error());
        }
    }
}
