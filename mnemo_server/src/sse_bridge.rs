//! Bridges `StepLoop::run`'s synchronous `on_event` callback to an async SSE
//! writer with genuine bounded back-pressure (§4.8, §9 "streaming
//! back-pressure: use a bounded channel between producer and SSE writer; do
//! not drop events silently").
//!
//! `StepLoop::run`'s callback is `FnMut(StepEvent)`, not `async`, so a
//! `tokio::sync::mpsc::Sender::send(..).await` can't sit behind it without a
//! runtime to poll mid-callback, and `Sender::blocking_send` panics if called
//! from a thread that is itself driving a tokio runtime (which the task
//! running `run` is, if spawned normally). Instead the whole loop runs on a
//! blocking-pool thread via `spawn_blocking`, where a synchronous
//! `std::sync::mpsc::sync_channel` can block its producer exactly as the
//! contract requires; the consumer side drains it one `spawn_blocking` recv
//! at a time so the async stream consuming it never busy-polls.

use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use mnemo_core::error::{EngineError, EngineResult};
use mnemo_core::provider::LlmMessage;
use mnemo_core::step::{StepDeps, StepEvent, StepLoop, SuspendedStep};
use mnemo_core::tools::{OtidCache, ToolContext};

const EVENT_QUEUE_DEPTH: usize = 64;

type StepOutcome = EngineResult<Option<(SuspendedStep, Vec<StepEvent>)>>;

/// A running step loop, exposed as an async event source plus its eventual
/// return value.
pub struct StepBridge {
    rx: Receiver<StepEvent>,
    outcome: oneshot::Receiver<StepOutcome>,
}

#[allow(clippy::too_many_arguments)]
#[must_use]
pub fn spawn(
    step_loop: StepLoop,
    deps: Arc<StepDeps>,
    ctx: ToolContext,
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<LlmMessage>,
    otids: Arc<OtidCache>,
    cancel: CancellationToken,
) -> StepBridge {
    let (tx, rx): (SyncSender<StepEvent>, Receiver<StepEvent>) = sync_channel(EVENT_QUEUE_DEPTH);
    let (outcome_tx, outcome_rx) = oneshot::channel();

    tokio::task::spawn_blocking(move || {
        let handle = tokio::runtime::Handle::current();
        let result = handle.block_on(step_loop.run(
            &deps,
            ctx,
            &model,
            max_tokens,
            temperature,
            messages,
            &otids,
            &cancel,
            move |ev: StepEvent| {
                // A full queue means the SSE client is slow; block rather
                // than drop, per the back-pressure contract.
                let _ = tx.send(ev);
            },
        ));
        let _ = outcome_tx.send(result);
    });

    StepBridge { rx, outcome: outcome_rx }
}

impl StepBridge {
    /// Pulls the next event off the bridge, or `None` once the producer has
    /// sent everything it will send. `std::sync::mpsc::Receiver::recv` has no
    /// async form and needs `&mut self`, so each poll hands the receiver to a
    /// fresh blocking-pool task and recovers it afterward.
    pub async fn next_event(&mut self) -> Option<StepEvent> {
        let rx = std::mem::replace(&mut self.rx, sync_channel(0).1);
        let (rx, item) = tokio::task::spawn_blocking(move || {
            let item = rx.recv().ok();
            (rx, item)
        })
        .await
        .unwrap_or_else(|_| (sync_channel(0).1, None));
        self.rx = rx;
        item
    }

    pub async fn outcome(self) -> StepOutcome {
        self.outcome
            .await
            .unwrap_or_else(|_| Err(EngineError::Transient("step loop task ended without a result".to_string())))
    }
}
