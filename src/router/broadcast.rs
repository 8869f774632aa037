//! Broadcast routing: every element to every output.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{send_to_all, Router, RouterOutputs};
use crate::error::Result;
use crate::stage::{next_element, ElementReceiver, ElementSender, Stage, StageKind};

/// Sends every element, data and control alike, to all registered outputs.
/// Each send blocks cooperatively and honors cancellation.
pub struct BroadcastRouter {
    name: String,
    outputs: RouterOutputs,
}

impl BroadcastRouter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outputs: RouterOutputs::new(),
        }
    }
}

impl Router for BroadcastRouter {
    fn register_output(&self, name: impl Into<String>, sender: ElementSender) {
        self.outputs.register(name.into(), sender);
    }
}

#[async_trait]
impl Stage for BroadcastRouter {
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
            send_to_all(&cancel, &self.outputs, &element).await?;
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
    async fn test_every_output_sees_every_element() {
        let router = BroadcastRouter::new("fanout");
        let outputs = run_router(
            router,
            |r| {
                let (a_tx, a_rx) = flume::bounded(16);
                let (b_tx, b_rx) = flume::bounded(16);
                let (c_tx, c_rx) = flume::bounded(16);
                r.register_output("a", a_tx);
                r.register_output("b", b_tx);
                r.register_output("c", c_tx);
                vec![
                    ("a".to_string(), a_rx),
                    ("b".to_string(), b_rx),
                    ("c".to_string(), c_rx),
                ]
            },
            vec![
                StreamElement::text("one"),
                StreamElement::text("two"),
                StreamElement::end_of_stream(),
            ],
        )
        .await;
        for (_, received) in outputs {
            assert_eq!(received.len(), 3);
            assert_eq!(received[0].as_text(), Some("one"));
            assert_eq!(received[1].as_text(), Some("two"));
            assert!(received[2].is_end_of_stream());
        }
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_blocked_send() {
        let router = BroadcastRouter::new("fanout");
        // Rendezvous-sized channel with no reader: the send must park.
        let (full_tx, _held_rx) = flume::bounded(1);
        full_tx.send(StreamElement::text("filler")).unwrap();
        router.register_output("stuck", full_tx);

        let (in_tx, in_rx) = flume::bounded(1);
        in_tx.send(StreamElement::text("parked")).unwrap();
        drop(in_tx);
        let (out_tx, _out_rx) = flume::bounded(1);

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let result = router.process(cancel, in_rx, out_tx).await;
        assert!(matches!(result, Err(crate::error::PipelineError::Cancelled)));
    }
}
