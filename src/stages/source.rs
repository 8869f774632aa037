//! A generator stage emitting a configured element sequence.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::element::StreamElement;
use crate::error::Result;
use crate::stage::{forward, ElementReceiver, ElementSender, Stage, StageKind};

/// Emits a fixed sequence of elements, ignoring its input.
///
/// Useful for seeding pipelines in tests and demos, and as the template for
/// real generators (capture devices, simulated sensors). Each execution
/// replays the same sequence; an end-of-stream marker can be appended with
/// [`with_end_of_stream`](Self::with_end_of_stream).
pub struct SourceStage {
    name: String,
    elements: Vec<StreamElement>,
    emit_eos: bool,
}

impl SourceStage {
    pub fn new(name: impl Into<String>, elements: Vec<StreamElement>) -> Self {
        Self {
            name: name.into(),
            elements,
            emit_eos: false,
        }
    }

    /// Append an `EndOfStream` marker after the sequence.
    pub fn with_end_of_stream(mut self) -> Self {
        self.emit_eos = true;
        self
    }
}

#[async_trait]
impl Stage for SourceStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StageKind {
        StageKind::Generate
    }

    async fn process(
        &self,
        cancel: CancellationToken,
        input: ElementReceiver,
        output: ElementSender,
    ) -> Result<()> {
        // A generator does not consume upstream traffic.
        drop(input);
        for element in &self.elements {
            let stamped = element.clone().with_source(self.name.clone());
            if !forward(&cancel, &output, stamped).await? {
                return Ok(());
            }
        }
        if self.emit_eos {
            let eos = StreamElement::end_of_stream().with_source(self.name.clone());
            let _ = forward(&cancel, &output, eos).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emits_sequence_then_eos() {
        let source = SourceStage::new(
            "seed",
            vec![StreamElement::text("a"), StreamElement::text("b")],
        )
        .with_end_of_stream();

        let (in_tx, in_rx) = flume::bounded::<StreamElement>(1);
        drop(in_tx);
        let (out_tx, out_rx) = flume::bounded(8);
        source
            .process(CancellationToken::new(), in_rx, out_tx)
            .await
            .unwrap();

        let out: Vec<StreamElement> = out_rx.into_iter().collect();
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].as_text(), Some("a"));
        assert_eq!(out[0].source, "seed");
        assert!(out[2].is_end_of_stream());
    }

    #[tokio::test]
    async fn test_replays_on_every_execution() {
        let source = SourceStage::new("seed", vec![StreamElement::text("x")]);
        for _ in 0..2 {
            let (in_tx, in_rx) = flume::bounded::<StreamElement>(1);
            drop(in_tx);
            let (out_tx, out_rx) = flume::bounded(4);
            source
                .process(CancellationToken::new(), in_rx, out_tx)
                .await
                .unwrap();
            assert_eq!(out_rx.into_iter().count(), 1);
        }
    }
}
