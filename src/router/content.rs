//! Content-based routing: first matching predicate wins.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{send_to_all, DropCounter, Router, RouterOutputs};
use crate::element::StreamElement;
use crate::error::Result;
use crate::stage::{forward, next_element, ElementReceiver, ElementSender, Stage, StageKind};

type RoutePredicate = Box<dyn Fn(&StreamElement) -> bool + Send + Sync>;

/// Routes each element to the first route whose predicate matches.
///
/// An element that matches no predicate is dropped, counted, and logged on
/// the first drop and every 100th thereafter. Control elements bypass the
/// predicates and go to every output.
///
/// # Example
///
/// ```
/// use streamweave::router::ContentRouter;
///
/// let router = ContentRouter::new("modality")
///     .route("audio", |e| e.is_audio())
///     .route("visual", |e| e.is_visual_media());
/// ```
pub struct ContentRouter {
    name: String,
    routes: Vec<(String, RoutePredicate)>,
    outputs: RouterOutputs,
    drops: DropCounter,
}

impl ContentRouter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            routes: Vec::new(),
            outputs: RouterOutputs::new(),
            drops: DropCounter::new(),
        }
    }

    /// Append a route; earlier routes win.
    pub fn route<F>(mut self, output: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&StreamElement) -> bool + Send + Sync + 'static,
    {
        self.routes.push((output.into(), Box::new(predicate)));
        self
    }

    /// Number of elements dropped for want of a matching route.
    pub fn dropped(&self) -> u64 {
        self.drops.count()
    }

    fn pick(&self, element: &StreamElement) -> Option<ElementSender> {
        self.routes
            .iter()
            .find(|(_, predicate)| predicate(element))
            .and_then(|(output, _)| self.outputs.named(output))
    }
}

impl Router for ContentRouter {
    fn register_output(&self, name: impl Into<String>, sender: ElementSender) {
        self.outputs.register(name.into(), sender);
    }
}

#[async_trait]
impl Stage for ContentRouter {
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
        // Traffic leaves through the registered outputs.
        drop(output);
        while let Some(element) = next_element(&cancel, &input).await? {
            if element.is_control() {
                send_to_all(&cancel, &self.outputs, &element).await?;
                continue;
            }
            match self.pick(&element) {
                Some(tx) => {
                    let _ = forward(&cancel, &tx, element).await?;
                }
                None => self.drops.record(&self.name, &element),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::StreamElement;
    use crate::error::PipelineError;
    use crate::media::AudioData;
    use crate::router::test_support::run_router;

    fn audio_elem() -> StreamElement {
        StreamElement::audio(AudioData::pcm16(vec![0u8; 4], 16_000, 1))
    }

    #[tokio::test]
    async fn test_first_matching_route_wins() {
        let router = ContentRouter::new("split")
            .route("audio", |e| e.is_audio())
            .route("rest", |_| true);
        let outputs = run_router(
            router,
            |r| {
                let (a_tx, a_rx) = flume::bounded(8);
                let (b_tx, b_rx) = flume::bounded(8);
                r.register_output("audio", a_tx);
                r.register_output("rest", b_tx);
                vec![("audio".to_string(), a_rx), ("rest".to_string(), b_rx)]
            },
            vec![audio_elem(), StreamElement::text("t")],
        )
        .await;
        assert_eq!(outputs[0].1.len(), 1);
        assert!(outputs[0].1[0].is_audio());
        assert_eq!(outputs[1].1.len(), 1);
        assert_eq!(outputs[1].1[0].as_text(), Some("t"));
    }

    #[tokio::test]
    async fn test_unmatched_elements_counted_and_dropped() {
        // The sampled drop warnings go through a real subscriber here.
        let _ = tracing_subscriber::fmt()
            .with_env_filter("streamweave=warn")
            .with_test_writer()
            .try_init();

        let router = ContentRouter::new("narrow").route("audio", |e| e.is_audio());
        let (a_tx, a_rx) = flume::bounded(8);
        router.register_output("audio", a_tx);
        let dropped_before = router.dropped();

        let (in_tx, in_rx) = flume::bounded(4);
        in_tx.send(StreamElement::text("no home")).unwrap();
        in_tx.send(StreamElement::text("also dropped")).unwrap();
        drop(in_tx);
        let (out_tx, _out_rx) = flume::bounded(1);
        router
            .process(CancellationToken::new(), in_rx, out_tx)
            .await
            .unwrap();

        assert_eq!(router.dropped() - dropped_before, 2);
        assert!(a_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_control_elements_reach_every_output() {
        let router = ContentRouter::new("split").route("audio", |e| e.is_audio());
        let outputs = run_router(
            router,
            |r| {
                let (a_tx, a_rx) = flume::bounded(8);
                let (b_tx, b_rx) = flume::bounded(8);
                r.register_output("audio", a_tx);
                r.register_output("other", b_tx);
                vec![("audio".to_string(), a_rx), ("other".to_string(), b_rx)]
            },
            vec![
                StreamElement::error(PipelineError::Other("upstream".to_string())),
                StreamElement::end_of_stream(),
            ],
        )
        .await;
        for (_, received) in outputs {
            assert_eq!(received.len(), 2);
            assert!(received[0].is_error());
            assert!(received[1].is_end_of_stream());
        }
    }
}
