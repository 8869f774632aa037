//! Stages that multiplex one input across many named outputs.
//!
//! Every router implements [`Stage`] plus [`Router::register_output`]. The
//! output map is read on the hot path and written only at registration, so it
//! sits behind a reader-writer lock; sender clones are taken under the read
//! guard and awaited after it is released.
//!
//! Control elements (`Error`, `EndOfStream`) are never dropped or policy
//! routed: every router forwards them to all registered outputs, since a
//! policy-routed end-of-stream would starve every branch but one.

mod broadcast;
mod content;
mod hashed;
mod random;
mod round_robin;
mod weighted;

pub use broadcast::BroadcastRouter;
pub use content::ContentRouter;
pub use hashed::HashRouter;
pub use random::RandomRouter;
pub use round_robin::RoundRobinRouter;
pub use weighted::WeightedRouter;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::element::StreamElement;
use crate::error::Result;
use crate::stage::{forward, ElementSender, Stage};

/// A stage that multiplexes its input across named outputs.
pub trait Router: Stage {
    /// Register (or replace) a named output channel. Registration happens
    /// before execution; the hot path only reads the map.
    fn register_output(&self, name: impl Into<String>, sender: ElementSender)
    where
        Self: Sized;
}

/// The shared name -> channel map all routers carry.
pub(crate) struct RouterOutputs {
    outputs: RwLock<Vec<(String, ElementSender)>>,
}

impl RouterOutputs {
    pub(crate) fn new() -> Self {
        Self {
            outputs: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn register(&self, name: String, sender: ElementSender) {
        let mut outputs = self.outputs.write().unwrap();
        if let Some(slot) = outputs.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = sender;
        } else {
            outputs.push((name, sender));
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.outputs.read().unwrap().len()
    }

    /// Clone every sender, releasing the lock before any await.
    pub(crate) fn all(&self) -> Vec<ElementSender> {
        self.outputs
            .read()
            .unwrap()
            .iter()
            .map(|(_, tx)| tx.clone())
            .collect()
    }

    /// Clone the sender at a registration-order index.
    pub(crate) fn at(&self, index: usize) -> Option<ElementSender> {
        self.outputs
            .read()
            .unwrap()
            .get(index)
            .map(|(_, tx)| tx.clone())
    }

    /// Clone the sender registered under `name`.
    pub(crate) fn named(&self, name: &str) -> Option<ElementSender> {
        self.outputs
            .read()
            .unwrap()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, tx)| tx.clone())
    }
}

/// Forward an element to every registered output.
pub(crate) async fn send_to_all(
    cancel: &CancellationToken,
    outputs: &RouterOutputs,
    element: &StreamElement,
) -> Result<()> {
    let senders = outputs.all();
    let sends = senders
        .iter()
        .map(|tx| forward(cancel, tx, element.clone()));
    for sent in futures::future::join_all(sends).await {
        sent?;
    }
    Ok(())
}

/// Shared unmatched/unroutable accounting: count the drop and log loudly but
/// sampled (first drop, then every 100th).
pub(crate) struct DropCounter {
    dropped: AtomicU64,
}

impl DropCounter {
    pub(crate) fn new() -> Self {
        Self {
            dropped: AtomicU64::new(0),
        }
    }

    pub(crate) fn count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub(crate) fn record(&self, router: &str, element: &StreamElement) {
        let n = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        if n == 1 || n % 100 == 0 {
            warn!(
                router,
                dropped = n,
                source = %element.source,
                sequence = element.sequence,
                "element matched no route"
            );
        }
    }
}
