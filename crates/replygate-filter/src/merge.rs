//! Per-conversation message merge: coalesce a burst of consecutive messages
//! into one judgment call.
//!
//! State machine per conversation key: Idle → Collecting → flush → Idle.
//! The first message of a burst opens a batch and starts the wait timer;
//! later messages append. Reaching the configured maximum cancels the timer
//! cooperatively — cancellation is a flush trigger, not a failure.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use replygate_core::config::GateConfig;
use replygate_core::types::{ConversationKey, InboundMessage};
use replygate_judge::engine::JudgmentEngine;

use crate::sink::SystemContextSink;

/// Messages collected for one conversation since its batch opened.
///
/// Exists if and only if a flush task is outstanding for the key: batch and
/// timer are created together, and the flush task is the only place a batch
/// is taken out of its slot.
struct PendingBatch {
    messages: Vec<InboundMessage>,
    opened_at: Instant,
    /// Cancelling this wakes the wait timer into an early flush.
    cancel: CancellationToken,
}

/// One conversation's merge state. The mutex serialises every batch
/// mutation for the key; distinct keys never contend.
#[derive(Default)]
struct Slot {
    batch: Option<PendingBatch>,
}

/// Registry of per-conversation merge slots.
///
/// Slots and their locks are created lazily on first use and never removed —
/// the map grows with the number of distinct conversations seen, which is
/// acceptable for a process-lifetime registry.
type SlotMap = Arc<DashMap<String, Arc<Mutex<Slot>>>>;

/// Debounce/batch window over the judgment engine.
pub struct MergeCoordinator {
    config: Arc<GateConfig>,
    engine: Arc<JudgmentEngine>,
    sink: Arc<dyn SystemContextSink>,
    slots: SlotMap,
}

impl MergeCoordinator {
    pub fn new(
        config: Arc<GateConfig>,
        engine: Arc<JudgmentEngine>,
        sink: Arc<dyn SystemContextSink>,
    ) -> Self {
        Self {
            config,
            engine,
            sink,
            slots: Arc::new(DashMap::new()),
        }
    }

    /// Absorb one message into the conversation's pending batch, opening a
    /// new batch (and its flush timer) when none is collecting.
    ///
    /// Always succeeds from the caller's point of view — the actual
    /// judgment and any triggered reply happen later, on the flush path.
    pub async fn offer(&self, message: InboundMessage) {
        let key = message.conversation.clone();
        let slot = self.slot(&key);
        let mut guard = slot.lock().await;

        match &mut guard.batch {
            Some(batch) => {
                batch.messages.push(message);
                let size = batch.messages.len();
                debug!(key = %key, size, "message joined pending batch");

                let max = self.config.merge.max_count;
                if max > 0 && size >= max as usize {
                    info!(key = %key, size, "batch reached max count, flushing early");
                    batch.cancel.cancel();
                }
            }
            None => {
                let cancel = CancellationToken::new();
                guard.batch = Some(PendingBatch {
                    messages: vec![message],
                    opened_at: Instant::now(),
                    cancel: cancel.clone(),
                });
                debug!(
                    key = %key,
                    wait_secs = self.config.merge.wait_secs,
                    "batch opened, timer started"
                );
                self.spawn_flush_timer(key, cancel);
            }
        }
    }

    /// Cancel every outstanding wait timer so pending batches flush
    /// promptly. Intended for host shutdown.
    pub async fn shutdown(&self) {
        let slots: Vec<Arc<Mutex<Slot>>> = self
            .slots
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for slot in slots {
            let guard = slot.lock().await;
            if let Some(batch) = &guard.batch {
                batch.cancel.cancel();
            }
        }
    }

    fn slot(&self, key: &ConversationKey) -> Arc<Mutex<Slot>> {
        self.slots
            .entry(key.as_str().to_string())
            .or_default()
            .value()
            .clone()
    }

    /// Wait out the merge window (or its cancellation), then flush.
    ///
    /// Both triggers land in the same single flush call, so cancellation can
    /// never drop a batch or flush it twice.
    fn spawn_flush_timer(&self, key: ConversationKey, cancel: CancellationToken) {
        let wait = Duration::from_secs_f64(self.config.merge.wait_secs);
        let slots = Arc::clone(&self.slots);
        let engine = Arc::clone(&self.engine);
        let sink = Arc::clone(&self.sink);

        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    debug!(key = %key, "merge window elapsed");
                }
                _ = cancel.cancelled() => {
                    debug!(key = %key, "merge window cancelled for early flush");
                }
            }
            flush(&slots, &engine, sink.as_ref(), &key).await;
        });
    }
}

/// Detach and judge the conversation's pending batch.
///
/// The batch is taken out of its slot under the per-key lock, so offers
/// arriving after the detach open a fresh batch instead of joining the
/// flushed one, and a second trigger finds the slot empty (idempotent).
/// The judgment call itself runs outside the lock.
async fn flush(
    slots: &SlotMap,
    engine: &JudgmentEngine,
    sink: &dyn SystemContextSink,
    key: &ConversationKey,
) {
    let Some(slot) = slots.get(key.as_str()).map(|e| Arc::clone(e.value())) else {
        return;
    };
    let batch = {
        let mut guard = slot.lock().await;
        guard.batch.take()
    };
    let Some(batch) = batch else {
        return;
    };

    let count = batch.messages.len();
    let transcript = render_batch(&batch.messages);
    info!(
        key = %key,
        count,
        collected_ms = batch.opened_at.elapsed().as_millis() as u64,
        "flushing merged batch"
    );

    if engine.should_reply(&transcript, key).await {
        let note = format!("{count} consecutive messages were merged:\n{transcript}");
        sink.push_system_context(key, &note, true).await;
        info!(key = %key, "merged batch judged reply-worthy, agent triggered");
    } else {
        info!(key = %key, "merged batch judged not reply-worthy, dropped");
    }
}

/// Render a batch into the merged transcript judged as one unit: one line
/// per message, sender-tagged, in arrival order.
fn render_batch(messages: &[InboundMessage]) -> String {
    messages
        .iter()
        .map(|msg| {
            format!(
                "[{}({})] {}",
                msg.sender.label(),
                msg.sender.id,
                msg.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
