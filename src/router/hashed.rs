//! Hash routing: deterministic output per key.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{send_to_all, Router, RouterOutputs};
use crate::element::StreamElement;
use crate::error::Result;
use crate::stage::{forward, next_element, ElementReceiver, ElementSender, Stage, StageKind};

type KeyFn = Box<dyn Fn(&StreamElement) -> String + Send + Sync>;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a, matching the source's hashing so keys land on the same
/// bucket index across ports.
fn fnv32a(data: &[u8]) -> u32 {
    data.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u32::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Routes each data element to `fnv32a(key(element)) mod N` in registration
/// order: the same key always lands on the same output.
///
/// # Example
///
/// ```
/// use streamweave::router::HashRouter;
///
/// // Stick sessions by source stage.
/// let router = HashRouter::new("sessions", |e| e.source.clone());
/// ```
pub struct HashRouter {
    name: String,
    key_fn: KeyFn,
    outputs: RouterOutputs,
}

impl HashRouter {
    pub fn new<F>(name: impl Into<String>, key_fn: F) -> Self
    where
        F: Fn(&StreamElement) -> String + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            key_fn: Box::new(key_fn),
            outputs: RouterOutputs::new(),
        }
    }
}

impl Router for HashRouter {
    fn register_output(&self, name: impl Into<String>, sender: ElementSender) {
        self.outputs.register(name.into(), sender);
    }
}

#[async_trait]
impl Stage for HashRouter {
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
            let key = (self.key_fn)(&element);
            let index = fnv32a(key.as_bytes()) as usize % count;
            if let Some(tx) = self.outputs.at(index) {
                let _ = forward(&cancel, &tx, element).await?;
            }
        }
        Ok(())
    }
}
