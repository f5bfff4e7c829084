use std::sync::Arc;

use tracing::{debug, error, info};

use replygate_core::config::GateConfig;
use replygate_core::types::{ConversationKind, GateSignal, InboundMessage};
use replygate_judge::engine::JudgmentEngine;

use crate::merge::MergeCoordinator;
use crate::scope;
use crate::sink::SystemContextSink;

/// Entry point of the gating layer: one call per inbound message, one
/// [`GateSignal`] out.
///
/// Every layer below the gate fails open — the judgment engine resolves
/// internal errors to "reply", context lookups degrade to empty, cache
/// failures read as misses — so the gate can only ever err toward
/// `ForceTrigger`, never toward accidental silence.
pub struct Gate {
    config: Arc<GateConfig>,
    engine: Arc<JudgmentEngine>,
    merge: MergeCoordinator,
}

impl Gate {
    /// Wire up the gate, logging the effective configuration.
    ///
    /// A missing model-group definition is reported here as an error but
    /// does not fail construction — later judgment calls fail open instead,
    /// so a misconfigured gate degrades to always-reply rather than
    /// blocking startup.
    pub fn new(
        config: Arc<GateConfig>,
        engine: Arc<JudgmentEngine>,
        sink: Arc<dyn SystemContextSink>,
    ) -> Self {
        if config.judge_model_group().is_none() {
            error!(
                model_group = %config.judge.model_group,
                "configured model group has no definition; judgment calls will fail open"
            );
        }

        info!(
            private = config.filter.private_enabled,
            group = config.filter.group_enabled,
            takeover = config.filter.complete_takeover,
            group_mode = ?config.filter.group_filter_mode,
            groups = config.filter.group_ids.len(),
            persona = config.judge.auto_use_persona,
            context = config.judge.context_message_count,
            merge = config.merge.enabled,
            "reply gate initialised"
        );
        if config.merge.enabled {
            info!(
                wait_secs = config.merge.wait_secs,
                max_count = config.merge.max_count,
                "message merge enabled"
            );
        }

        let merge = MergeCoordinator::new(
            Arc::clone(&config),
            Arc::clone(&engine),
            sink,
        );

        Self {
            config,
            engine,
            merge,
        }
    }

    /// Gate one inbound message.
    ///
    /// - out of scope → [`GateSignal::Allow`] (nothing else runs)
    /// - merge enabled → absorbed into the conversation's batch,
    ///   [`GateSignal::BlockTrigger`]; the batch flush triggers any reply later
    /// - otherwise → immediate judgment: reply-worthy →
    ///   [`GateSignal::ForceTrigger`]; not reply-worthy → [`GateSignal::BlockAll`]
    ///   under complete takeover, else [`GateSignal::BlockTrigger`]
    pub async fn handle(&self, message: InboundMessage, kind: ConversationKind) -> GateSignal {
        let key = message.conversation.clone();

        if !scope::is_in_scope(&self.config.filter, kind, &key) {
            debug!(key = %key, %kind, "out of gating scope, passing through");
            return GateSignal::Allow;
        }

        if self.config.merge.enabled {
            self.merge.offer(message).await;
            return GateSignal::BlockTrigger;
        }

        if self.engine.should_reply(&message.content, &key).await {
            info!(key = %key, "judged reply-worthy, forcing trigger");
            GateSignal::ForceTrigger
        } else if self.config.filter.complete_takeover {
            info!(key = %key, "judged not reply-worthy, takeover active, blocking all");
            GateSignal::BlockAll
        } else {
            info!(key = %key, "judged not reply-worthy, blocking trigger only");
            GateSignal::BlockTrigger
        }
    }

    /// Flush pending merge batches early; call on host shutdown.
    pub async fn shutdown(&self) {
        self.merge.shutdown().await;
    }
}
