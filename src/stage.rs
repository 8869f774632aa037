//! The stage contract and composite stage helpers.
//!
//! A stage is a named processing unit with a driver that consumes a lazy
//! sequence of [`StreamElement`]s and produces another. Drivers run as
//! cooperative tasks: every receive and every send must select on the
//! execution's cancellation token, and the output channel closes on every
//! exit path. In this implementation the sender is moved into `process`, so
//! closing on return is a property of ownership rather than of discipline.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::capability::StageCapabilities;
use crate::element::{ElementPayload, StreamElement};
use crate::error::{PipelineError, Result};

/// Receiving half of an inter-stage element channel.
pub type ElementReceiver = flume::Receiver<StreamElement>;
/// Sending half of an inter-stage element channel.
pub type ElementSender = flume::Sender<StreamElement>;

/// A boxed, pinned, Send future -- the return type of [`FnStage`] drivers.
pub type BoxFut<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Declared role of a stage. Purely declarative: the scheduler treats all
/// kinds identically and relies on the driver to obey the contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    /// One element in, zero or more elements out.
    Transform,
    /// Buffers input before emitting (e.g. turn accumulation).
    Accumulate,
    /// Produces elements without consuming input.
    Generate,
    /// Consumes input without producing elements.
    Sink,
    /// Both directions at once (e.g. a realtime session).
    Bidirectional,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Transform => "transform",
            StageKind::Accumulate => "accumulate",
            StageKind::Generate => "generate",
            StageKind::Sink => "sink",
            StageKind::Bidirectional => "bidirectional",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A processing unit in the pipeline DAG.
///
/// # Driver contract
///
/// `process` must:
/// 1. Drain `input` until it closes, the token is cancelled, or the stage
///    decides to terminate early.
/// 2. Forward produced elements via `output`, honoring cancellation on every
///    blocked send (use [`forward`]).
/// 3. Close `output` on every exit path. The sender is moved in, so simply
///    returning satisfies this unless the driver leaked a clone.
/// 4. Return `Ok(())` on success or the error that stopped processing.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Unique name within a pipeline.
    fn name(&self) -> &str;

    /// Declared kind.
    fn kind(&self) -> StageKind;

    /// Optional capability declaration, validated advisorially at build time.
    fn capabilities(&self) -> Option<&StageCapabilities> {
        None
    }

    /// Run the stage driver over one execution's channels.
    async fn process(
        &self,
        cancel: CancellationToken,
        input: ElementReceiver,
        output: ElementSender,
    ) -> Result<()>;
}

/// Receive the next element, honoring cancellation.
///
/// Returns `Ok(None)` once the channel is closed and drained.
pub async fn next_element(
    cancel: &CancellationToken,
    input: &ElementReceiver,
) -> Result<Option<StreamElement>> {
    tokio::select! {
        _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        received = input.recv_async() => Ok(received.ok()),
    }
}

/// Send an element downstream, honoring cancellation.
///
/// Returns `Ok(false)` when every downstream receiver is gone, which a driver
/// should treat as a clean early termination: the blocked-forever send of the
/// source model has no non-blocking equivalent other than stopping.
pub async fn forward(
    cancel: &CancellationToken,
    output: &ElementSender,
    element: StreamElement,
) -> Result<bool> {
    tokio::select! {
        _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        sent = output.send_async(element) => Ok(sent.is_ok()),
    }
}

/// A stage that forwards every element unchanged.
pub struct Passthrough {
    name: String,
}

impl Passthrough {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Stage for Passthrough {
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
        while let Some(element) = next_element(&cancel, &input).await? {
            if !forward(&cancel, &output, element).await? {
                break;
            }
        }
        Ok(())
    }
}

/// A stage that forwards only elements matching a predicate.
///
/// Control elements (`Error`, `EndOfStream`) bypass the predicate so a
/// filter can never starve downstream stages of stream termination.
pub struct FilterStage {
    name: String,
    predicate: Box<dyn Fn(&StreamElement) -> bool + Send + Sync>,
}

impl FilterStage {
    pub fn new<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&StreamElement) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Box::new(predicate),
        }
    }
}

#[async_trait]
impl Stage for FilterStage {
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
        while let Some(element) = next_element(&cancel, &input).await? {
            if !element.is_control() && !(self.predicate)(&element) {
                continue;
            }
            if !forward(&cancel, &output, element).await? {
                break;
            }
        }
        Ok(())
    }
}

/// A stage that applies a total transform to every data element.
///
/// Control elements pass through unchanged. When the transform fails, the
/// stage emits an `Error` element downstream and terminates with the error.
pub struct MapStage {
    name: String,
    transform: Box<dyn Fn(StreamElement) -> Result<StreamElement> + Send + Sync>,
}

impl MapStage {
    pub fn new<F>(name: impl Into<String>, transform: F) -> Self
    where
        F: Fn(StreamElement) -> Result<StreamElement> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            transform: Box::new(transform),
        }
    }
}

#[async_trait]
impl Stage for MapStage {
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
        while let Some(element) = next_element(&cancel, &input).await? {
            if element.is_control() {
                if !forward(&cancel, &output, element).await? {
                    break;
                }
                continue;
            }
            match (self.transform)(element) {
                Ok(mapped) => {
                    if !forward(&cancel, &output, mapped.with_source(self.name.clone())).await? {
                        break;
                    }
                }
                Err(err) => {
                    let shared = Arc::new(err);
                    let error_elem =
                        StreamElement::new(ElementPayload::Error(shared.clone()))
                            .with_source(self.name.clone());
                    let _ = forward(&cancel, &output, error_elem).await?;
                    return Err(PipelineError::Stream(shared));
                }
            }
        }
        Ok(())
    }
}

/// Lifts a plain driver function into a stage value.
///
/// # Example
///
/// ```
/// use streamweave::stage::{forward, next_element, FnStage, StageKind};
///
/// let doubler = FnStage::new("doubler", StageKind::Transform, |cancel, input, output| async move {
///     while let Some(elem) = next_element(&cancel, &input).await? {
///         if !forward(&cancel, &output, elem.clone()).await?
///             || !forward(&cancel, &output, elem).await?
///         {
///             break;
///         }
///     }
///     Ok(())
/// });
/// ```
pub struct FnStage {
    name: String,
    kind: StageKind,
    #[allow(clippy::type_complexity)]
    driver: Box<
        dyn Fn(CancellationToken, ElementReceiver, ElementSender) -> BoxFut<'static, Result<()>>
            + Send
            + Sync,
    >,
}

impl FnStage {
    pub fn new<F, Fut>(name: impl Into<String>, kind: StageKind, driver: F) -> Self
    where
        F: Fn(CancellationToken, ElementReceiver, ElementSender) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            kind,
            driver: Box::new(move |cancel, input, output| {
                Box::pin(driver(cancel, input, output))
            }),
        }
    }
}

#[async_trait]
impl Stage for FnStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StageKind {
        self.kind
    }

    async fn process(
        &self,
        cancel: CancellationToken,
        input: ElementReceiver,
        output: ElementSender,
    ) -> Result<()> {
        (self.driver)(cancel, input, output).await
    }
}
