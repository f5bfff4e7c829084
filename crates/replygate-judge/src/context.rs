use std::sync::Arc;

use tracing::{debug, warn};

use replygate_core::types::ConversationKey;
use replygate_store::traits::{ChannelStore, HistoryStore};
use replygate_store::types::HistoryMessage;

/// Prompt ingredients assembled fresh for one judgment call.
///
/// Both fields are independently optional; the engine renders whatever is
/// present and says so in the trailing instruction.
#[derive(Debug, Default, Clone)]
pub struct JudgmentContext {
    /// Persona description configured for the conversation's channel.
    pub persona: Option<String>,
    /// Recent history, oldest first, one `sender: content` line per message.
    pub transcript: Option<String>,
}

/// Fetches recent history and the channel persona for judgment prompts.
///
/// Lookup failures never propagate — an unreachable store degrades to an
/// absent persona or empty transcript, and the judgment proceeds on
/// whatever context remains.
pub struct ContextAssembler {
    history: Arc<dyn HistoryStore>,
    channels: Arc<dyn ChannelStore>,
}

impl ContextAssembler {
    pub fn new(history: Arc<dyn HistoryStore>, channels: Arc<dyn ChannelStore>) -> Self {
        Self { history, channels }
    }

    /// Assemble context for one judgment. `context_count == 0` skips the
    /// history fetch entirely; `use_persona == false` skips the persona.
    pub async fn build(
        &self,
        key: &ConversationKey,
        context_count: u32,
        use_persona: bool,
    ) -> JudgmentContext {
        let persona = if use_persona {
            self.fetch_persona(key).await
        } else {
            None
        };

        let transcript = if context_count > 0 {
            self.fetch_transcript(key, context_count).await
        } else {
            None
        };

        JudgmentContext {
            persona,
            transcript,
        }
    }

    async fn fetch_transcript(&self, key: &ConversationKey, limit: u32) -> Option<String> {
        let messages = match self.history.query_recent(key, limit).await {
            Ok(m) => m,
            Err(e) => {
                warn!(key = %key, error = %e, "history fetch failed, judging without context");
                return None;
            }
        };
        debug!(key = %key, count = messages.len(), "history context fetched");
        render_transcript(&messages)
    }

    async fn fetch_persona(&self, key: &ConversationKey) -> Option<String> {
        let channel = match self.channels.get_channel(key).await {
            Ok(Some(c)) => c,
            Ok(None) => {
                debug!(key = %key, "conversation has no channel record");
                return None;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "channel lookup failed, judging without persona");
                return None;
            }
        };

        let persona_id = match channel.persona_id {
            Some(id) => id,
            None => {
                debug!(key = %key, "channel has no persona configured");
                return None;
            }
        };

        match self.channels.get_persona(persona_id).await {
            Ok(Some(persona)) => {
                debug!(key = %key, persona = %persona.name, "using channel persona");
                Some(persona.content)
            }
            Ok(None) => {
                warn!(key = %key, persona_id, "channel references a missing persona");
                None
            }
            Err(e) => {
                warn!(key = %key, error = %e, "persona lookup failed, judging without persona");
                None
            }
        }
    }
}

/// Render history rows (newest first, as queried) into an oldest-first
/// transcript. Blank-content rows are skipped; `None` when nothing remains.
fn render_transcript(messages: &[HistoryMessage]) -> Option<String> {
    let lines: Vec<String> = messages
        .iter()
        .rev()
        .filter_map(|msg| {
            let content = msg.content.trim();
            if content.is_empty() {
                return None;
            }
            Some(format!("{}: {}", msg.sender_label(), content))
        })
        .collect();

    if lines.is_empty() {
        return None;
    }
    Some(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use replygate_store::error::StoreError;
    use replygate_store::types::{ChannelRecord, Persona};

    use super::*;

    fn msg(sender_id: &str, sender_name: Option<&str>, content: &str) -> HistoryMessage {
        HistoryMessage {
            sender_id: sender_id.to_string(),
            sender_name: sender_name.map(str::to_string),
            content: content.to_string(),
        }
    }

    struct FixedHistory(Vec<HistoryMessage>);

    #[async_trait]
    impl HistoryStore for FixedHistory {
        async fn query_recent(
            &self,
            _key: &ConversationKey,
            limit: u32,
        ) -> Result<Vec<HistoryMessage>, StoreError> {
            Ok(self.0.iter().take(limit as usize).cloned().collect())
        }
    }

    struct NoChannels;

    #[async_trait]
    impl ChannelStore for NoChannels {
        async fn get_channel(
            &self,
            _key: &ConversationKey,
        ) -> Result<Option<ChannelRecord>, StoreError> {
            Ok(None)
        }

        async fn get_persona(&self, _id: i64) -> Result<Option<Persona>, StoreError> {
            Ok(None)
        }
    }

    /// Channel pointing at a persona id that does not resolve.
    struct DanglingPersona;

    #[async_trait]
    impl ChannelStore for DanglingPersona {
        async fn get_channel(
            &self,
            key: &ConversationKey,
        ) -> Result<Option<ChannelRecord>, StoreError> {
            Ok(Some(ChannelRecord {
                conversation_key: key.to_string(),
                persona_id: Some(99),
            }))
        }

        async fn get_persona(&self, _id: i64) -> Result<Option<Persona>, StoreError> {
            Ok(None)
        }
    }

    struct FailingHistory;

    #[async_trait]
    impl HistoryStore for FailingHistory {
        async fn query_recent(
            &self,
            _key: &ConversationKey,
            _limit: u32,
        ) -> Result<Vec<HistoryMessage>, StoreError> {
            Err(StoreError::Serialization("db gone".into()))
        }
    }

    #[tokio::test]
    async fn transcript_is_reversed_to_oldest_first() {
        // query order is newest first
        let history = FixedHistory(vec![
            msg("u2", Some("bob"), "and second"),
            msg("u1", Some("alice"), "first"),
        ]);
        let assembler = ContextAssembler::new(Arc::new(history), Arc::new(NoChannels));
        let ctx = assembler
            .build(&ConversationKey::from("group_1"), 5, false)
            .await;
        assert_eq!(ctx.transcript.as_deref(), Some("alice: first\nbob: and second"));
        assert!(ctx.persona.is_none());
    }

    #[tokio::test]
    async fn blank_messages_are_skipped_and_id_fallback_applies() {
        let history = FixedHistory(vec![
            msg("u1", None, "   "),
            msg("u2", None, "real content"),
        ]);
        let assembler = ContextAssembler::new(Arc::new(history), Arc::new(NoChannels));
        let ctx = assembler
            .build(&ConversationKey::from("group_1"), 5, false)
            .await;
        assert_eq!(ctx.transcript.as_deref(), Some("u2: real content"));
    }

    #[tokio::test]
    async fn zero_context_count_skips_the_fetch() {
        let assembler =
            ContextAssembler::new(Arc::new(FailingHistory), Arc::new(NoChannels));
        let ctx = assembler
            .build(&ConversationKey::from("group_1"), 0, false)
            .await;
        // a failing store is never touched when count is 0
        assert!(ctx.transcript.is_none());
    }

    #[tokio::test]
    async fn lookup_failures_degrade_to_empty_context() {
        let assembler =
            ContextAssembler::new(Arc::new(FailingHistory), Arc::new(DanglingPersona));
        let ctx = assembler
            .build(&ConversationKey::from("group_1"), 5, true)
            .await;
        assert!(ctx.transcript.is_none());
        assert!(ctx.persona.is_none());
    }
}
