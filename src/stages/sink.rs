//! A terminal stage that logs and counts what reaches it.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::Result;
use crate::stage::{next_element, ElementReceiver, ElementSender, Stage, StageKind};

/// Consumes every element, logging a one-line summary per element and
/// keeping a running count. Emits nothing.
pub struct LogSink {
    name: String,
    received: AtomicU64,
}

impl LogSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            received: AtomicU64::new(0),
        }
    }

    /// Elements consumed so far, across executions.
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Stage for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StageKind {
        StageKind::Sink
    }

    async fn process(
        &self,
        cancel: CancellationToken,
        input: ElementReceiver,
        output: ElementSender,
    ) -> Result<()> {
        drop(output);
        while let Some(element) = next_element(&cancel, &input).await? {
            self.received.fetch_add(1, Ordering::Relaxed);
            info!(
                sink = %self.name,
                source = %element.source,
                sequence = element.sequence,
                payload = payload_tag(&element),
                "element consumed"
            );
        }
        Ok(())
    }
}

fn payload_tag(element: &crate::element::StreamElement) -> &'static str {
    use crate::element::ElementPayload::*;
    match &element.payload {
        Text(_) => "text",
        Message(_) => "message",
        Audio(_) => "audio",
        Video(_) => "video",
        Image(_) => "image",
        ToolCall(_) => "tool_call",
        Error(_) => "error",
        EndOfStream => "end_of_stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::StreamElement;

    #[tokio::test]
    async fn test_counts_and_emits_nothing() {
        let sink = LogSink::new("drain");
        let (in_tx, in_rx) = flume::bounded(8);
        for i in 0..4 {
            in_tx.send(StreamElement::text(format!("{i}"))).unwrap();
        }
        in_tx.send(StreamElement::end_of_stream()).unwrap();
        drop(in_tx);

        let (out_tx, out_rx) = flume::bounded(4);
        sink.process(CancellationToken::new(), in_rx, out_tx)
            .await
            .unwrap();
        assert_eq!(sink.received(), 5);
        assert!(out_rx.into_iter().next().is_none());
    }
}
