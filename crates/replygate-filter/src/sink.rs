use async_trait::async_trait;

use replygate_core::types::ConversationKey;

/// One-way surface for handing merged-burst context to the agent runtime.
///
/// Used only by the merge flush path: when a coalesced burst is judged
/// reply-worthy, the rendered transcript is pushed here with
/// `trigger_agent = true` so the agent responds to the whole burst instead
/// of any single message.
#[async_trait]
pub trait SystemContextSink: Send + Sync {
    async fn push_system_context(&self, key: &ConversationKey, text: &str, trigger_agent: bool);
}
