//! N-to-1 fan-in.
//!
//! The scheduler wires a single upstream per stage; joining several branches
//! is expressed with an explicit merge stage. The merge preserves each
//! source's FIFO order but makes no promise about interleaving across
//! sources.

use std::sync::RwLock;

use async_trait::async_trait;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::error::{PipelineError, Result};
use crate::stage::{forward, ElementReceiver, ElementSender, Stage, StageKind};

/// Merges the stage's own input with any number of registered side inputs
/// into one output stream.
///
/// Register the output channels of the branches to join before execution;
/// every element from every source is forwarded, including each source's
/// control elements.
///
/// # Example
///
/// ```
/// use streamweave::stages::MergeStage;
///
/// let merge = MergeStage::new("join");
/// let (branch_tx, branch_rx) = flume::bounded(16);
/// merge.register_input("left-branch", branch_rx);
/// # drop(branch_tx);
/// ```
pub struct MergeStage {
    name: String,
    inputs: RwLock<Vec<(String, ElementReceiver)>>,
}

impl MergeStage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: RwLock::new(Vec::new()),
        }
    }

    /// Register a side input to merge. Registration happens before execution.
    pub fn register_input(&self, name: impl Into<String>, receiver: ElementReceiver) {
        self.inputs.write().unwrap().push((name.into(), receiver));
    }
}

#[async_trait]
impl Stage for MergeStage {
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
        let mut streams = vec![input.into_stream()];
        for (_, receiver) in self.inputs.read().unwrap().iter() {
            streams.push(receiver.clone().into_stream());
        }
        let mut merged = futures::stream::select_all(streams);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
                next = merged.next() => match next {
                    Some(element) => {
                        if !forward(&cancel, &output, element).await? {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::StreamElement;

    #[tokio::test]
    async fn test_merges_all_sources() {
        let merge = MergeStage::new("join");
        let (side_tx, side_rx) = flume::bounded(8);
        merge.register_input("side", side_rx);

        let (in_tx, in_rx) = flume::bounded(8);
        let (out_tx, out_rx) = flume::bounded(16);

        in_tx.send(StreamElement::text("main-1")).unwrap();
        in_tx.send(StreamElement::text("main-2")).unwrap();
        side_tx.send(StreamElement::text("side-1")).unwrap();
        drop(in_tx);
        drop(side_tx);

        merge
            .process(CancellationToken::new(), in_rx, out_tx)
            .await
            .unwrap();

        let texts: Vec<String> = out_rx
            .into_iter()
            .filter_map(|e| e.as_text().map(str::to_string))
            .collect();
        assert_eq!(texts.len(), 3);
        // Per-source FIFO: main-1 before main-2, wherever they interleave.
        let main1 = texts.iter().position(|t| t == "main-1").unwrap();
        let main2 = texts.iter().position(|t| t == "main-2").unwrap();
        assert!(main1 < main2);
        assert!(texts.contains(&"side-1".to_string()));
    }

    #[tokio::test]
    async fn test_finishes_when_every_source_closes() {
        let merge = MergeStage::new("join");
        let (side_tx, side_rx) = flume::bounded::<StreamElement>(8);
        merge.register_input("side", side_rx);

        let (in_tx, in_rx) = flume::bounded(8);
        let (out_tx, out_rx) = flume::bounded(8);
        drop(in_tx);

        let handle = tokio::spawn(async move {
            merge.process(CancellationToken::new(), in_rx, out_tx).await
        });
        // The main input is closed, but the side input keeps the merge alive.
        side_tx.send_async(StreamElement::text("late")).await.unwrap();
        drop(side_tx);

        assert!(handle.await.unwrap().is_ok());
        let received: Vec<StreamElement> = out_rx.into_iter().collect();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].as_text(), Some("late"));
    }

    #[tokio::test]
    async fn test_cancellation_stops_merge() {
        let merge = MergeStage::new("join");
        let (_held_tx, in_rx) = flume::bounded::<StreamElement>(1);
        let (out_tx, _out_rx) = flume::bounded(1);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = merge.process(cancel, in_rx, out_tx).await;
        assert!(matches!(result, Err(PipelineError::Cancelled)));
    }
}
