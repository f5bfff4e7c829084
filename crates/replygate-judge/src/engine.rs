use std::sync::Arc;

use tracing::{debug, error, info, warn};

use replygate_core::config::GateConfig;
use replygate_core::types::ConversationKey;
use replygate_store::traits::{ChannelStore, HistoryStore, KvStore};

use crate::cache::DecisionCache;
use crate::context::{ContextAssembler, JudgmentContext};
use crate::extract::extract_decision;
use crate::provider::{ChatProvider, ChatRequest, ProviderError};

/// Sampling temperature for judgment calls — biased toward determinism.
const JUDGE_TEMPERATURE: f32 = 0.3;
/// Output ceiling. Generous on purpose: reasoning models pad their answers.
const JUDGE_MAX_TOKENS: u32 = 32_000;
/// Boolean field the classifier is instructed to return.
const DECISION_FIELD: &str = "should_reply";

/// Wraps cache, context assembly, and the classifier call into one
/// fail-open `should_reply` operation.
///
/// `should_reply` never errors: any internal failure — provider down,
/// storage broken, garbage output — resolves to `true` so that a bug in
/// the gating layer can only ever cause an extra reply, never silence.
pub struct JudgmentEngine {
    config: Arc<GateConfig>,
    provider: Arc<dyn ChatProvider>,
    cache: DecisionCache,
    assembler: ContextAssembler,
}

impl JudgmentEngine {
    pub fn new(
        config: Arc<GateConfig>,
        provider: Arc<dyn ChatProvider>,
        history: Arc<dyn HistoryStore>,
        channels: Arc<dyn ChannelStore>,
        kv: Arc<dyn KvStore>,
    ) -> Self {
        let cache = DecisionCache::new(kv, config.judge.cache_expiry_secs);
        let assembler = ContextAssembler::new(history, channels);
        Self {
            config,
            provider,
            cache,
            assembler,
        }
    }

    /// Decide whether `text` warrants a reply in the given conversation.
    pub async fn should_reply(&self, text: &str, key: &ConversationKey) -> bool {
        let fingerprint = DecisionCache::fingerprint(text);

        if let Some(cached) = self.cache.get(&fingerprint).await {
            return cached;
        }

        match self.judge(text, key, &fingerprint).await {
            Ok(decision) => decision,
            Err(e) => {
                error!(key = %key, error = %e, "judgment failed, failing open");
                true
            }
        }
    }

    async fn judge(
        &self,
        text: &str,
        key: &ConversationKey,
        fingerprint: &str,
    ) -> Result<bool, ProviderError> {
        let group = self.config.judge_model_group().ok_or_else(|| {
            ProviderError::Unavailable(format!(
                "model group '{}' is not configured",
                self.config.judge.model_group
            ))
        })?;

        let ctx = self
            .assembler
            .build(
                key,
                self.config.judge.context_message_count,
                self.config.judge.auto_use_persona,
            )
            .await;

        let req = ChatRequest {
            model: group.model.clone(),
            system: self.config.judge.system_prompt.clone(),
            user: compose_prompt(&ctx, text),
            temperature: JUDGE_TEMPERATURE,
            max_tokens: JUDGE_MAX_TOKENS,
        };

        info!(key = %key, model = %req.model, "judging message");
        let resp = self.provider.send(&req).await?;
        debug!(key = %key, raw = %resp.content, "classifier raw output");

        let decision = match extract_decision(&resp.content, DECISION_FIELD) {
            Some(d) => d,
            None => {
                // distinguishes "couldn't parse" from "model said no"
                warn!(key = %key, "no parsable decision in classifier output, defaulting to reply");
                true
            }
        };

        self.cache.put(fingerprint, decision).await;
        info!(key = %key, decision, "judgment complete");
        Ok(decision)
    }
}

/// Compose the judgment user prompt: persona block, transcript block, the
/// subject text, then a trailing instruction naming which context blocks
/// were supplied so the classifier weighs them.
fn compose_prompt(ctx: &JudgmentContext, text: &str) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(4);

    if let Some(persona) = &ctx.persona {
        parts.push(format!("Assistant persona:\n{persona}"));
    }
    if let Some(transcript) = &ctx.transcript {
        parts.push(format!("Recent conversation:\n{transcript}"));
    }
    parts.push(format!("Current message: {text}"));

    let mut supplied: Vec<&str> = Vec::with_capacity(2);
    if ctx.persona.is_some() {
        supplied.push("the persona description");
    }
    if ctx.transcript.is_some() {
        supplied.push("the conversation context");
    }
    if !supplied.is_empty() {
        parts.push(format!(
            "\nConsidering {} above, decide whether the current message needs a reply.",
            supplied.join(" and ")
        ));
    }

    parts.join("\n\n")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use replygate_core::config::ModelGroup;
    use replygate_store::error::StoreError;
    use replygate_store::types::{ChannelRecord, HistoryMessage, Persona};

    use crate::provider::ChatResponse;

    use super::*;

    /// Scripted provider: returns a fixed payload (or error) and counts calls.
    struct ScriptedProvider {
        reply: Result<String, ()>,
        calls: AtomicUsize,
        last_user_prompt: Mutex<Option<String>>,
    }

    impl ScriptedProvider {
        fn returning(content: &str) -> Self {
            Self {
                reply: Ok(content.to_string()),
                calls: AtomicUsize::new(0),
                last_user_prompt: Mutex::new(None),
            }
        }

        fn failing() -> Self {
            Self {
                reply: Err(()),
                calls: AtomicUsize::new(0),
                last_user_prompt: Mutex::new(None),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChatProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_user_prompt.lock().unwrap() = Some(req.user.clone());
            match &self.reply {
                Ok(content) => Ok(ChatResponse {
                    content: content.clone(),
                    model: req.model.clone(),
                    tokens_in: 10,
                    tokens_out: 5,
                    stop_reason: "stop".to_string(),
                }),
                Err(()) => Err(ProviderError::Unavailable("scripted outage".to_string())),
            }
        }
    }

    #[derive(Default)]
    struct MemoryKv {
        entries: Mutex<HashMap<String, String>>,
    }

    impl MemoryKv {
        fn len(&self) -> usize {
            self.entries.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl KvStore for MemoryKv {
        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            Ok(self.entries.lock().unwrap().get(key).cloned())
        }

        async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }
    }

    struct EmptyStores;

    #[async_trait]
    impl HistoryStore for EmptyStores {
        async fn query_recent(
            &self,
            _key: &ConversationKey,
            _limit: u32,
        ) -> Result<Vec<HistoryMessage>, StoreError> {
            Ok(Vec::new())
        }
    }

    #[async_trait]
    impl ChannelStore for EmptyStores {
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

    fn test_config() -> Arc<GateConfig> {
        let mut cfg = GateConfig::default();
        cfg.model_groups.insert(
            "default".to_string(),
            ModelGroup {
                model: "judge-model".to_string(),
                base_url: "http://localhost".to_string(),
                api_key: "test".to_string(),
                timeout_secs: 10,
            },
        );
        Arc::new(cfg)
    }

    fn engine_with(
        config: Arc<GateConfig>,
        provider: Arc<ScriptedProvider>,
        kv: Arc<MemoryKv>,
    ) -> JudgmentEngine {
        JudgmentEngine::new(
            config,
            provider,
            Arc::new(EmptyStores),
            Arc::new(EmptyStores),
            kv,
        )
    }

    #[tokio::test]
    async fn positive_judgment_is_cached() {
        let provider = Arc::new(ScriptedProvider::returning(r#"{"should_reply": true}"#));
        let kv = Arc::new(MemoryKv::default());
        let engine = engine_with(test_config(), Arc::clone(&provider), Arc::clone(&kv));

        let key = ConversationKey::from("private_1");
        assert!(engine.should_reply("How do I configure X?", &key).await);
        assert_eq!(kv.len(), 1);

        let prompt = provider.last_user_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.contains("Current message: How do I configure X?"));

        // second call hits the cache — no extra provider round-trip
        assert!(engine.should_reply("How do I configure X?", &key).await);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn negative_judgment_passes_through() {
        let provider = Arc::new(ScriptedProvider::returning(r#"{"should_reply": false}"#));
        let kv = Arc::new(MemoryKv::default());
        let engine = engine_with(test_config(), Arc::clone(&provider), kv);

        let key = ConversationKey::from("private_1");
        assert!(!engine.should_reply("ok", &key).await);
    }

    #[tokio::test]
    async fn provider_failure_fails_open_and_leaves_cache_unwritten() {
        let provider = Arc::new(ScriptedProvider::failing());
        let kv = Arc::new(MemoryKv::default());
        let engine = engine_with(test_config(), Arc::clone(&provider), Arc::clone(&kv));

        let key = ConversationKey::from("private_1");
        assert!(engine.should_reply("anything", &key).await);
        assert_eq!(kv.len(), 0);

        // no cache entry was written, so the next call tries again
        assert!(engine.should_reply("anything", &key).await);
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn malformed_output_defaults_to_reply_and_is_cached() {
        let provider = Arc::new(ScriptedProvider::returning("I think probably yes?"));
        let kv = Arc::new(MemoryKv::default());
        let engine = engine_with(test_config(), Arc::clone(&provider), Arc::clone(&kv));

        let key = ConversationKey::from("group_9");
        assert!(engine.should_reply("hm", &key).await);
        // the defaulted decision is still a completed round-trip, so it caches
        assert_eq!(kv.len(), 1);
    }

    #[tokio::test]
    async fn missing_model_group_fails_open() {
        // config with no model_groups entry at all
        let cfg = Arc::new(GateConfig::default());
        let provider = Arc::new(ScriptedProvider::returning(r#"{"should_reply": false}"#));
        let kv = Arc::new(MemoryKv::default());
        let engine = engine_with(cfg, Arc::clone(&provider), Arc::clone(&kv));

        let key = ConversationKey::from("private_1");
        assert!(engine.should_reply("ok", &key).await);
        assert_eq!(provider.call_count(), 0);
        assert_eq!(kv.len(), 0);
    }

    #[test]
    fn prompt_names_supplied_blocks() {
        let ctx = JudgmentContext {
            persona: Some("Helpful coder.".to_string()),
            transcript: Some("alice: hi".to_string()),
        };
        let prompt = compose_prompt(&ctx, "what about tests?");
        assert!(prompt.contains("Assistant persona:\nHelpful coder."));
        assert!(prompt.contains("Recent conversation:\nalice: hi"));
        assert!(prompt.contains("Current message: what about tests?"));
        assert!(prompt.contains("the persona description and the conversation context"));
    }

    #[test]
    fn bare_prompt_has_no_trailing_instruction() {
        let prompt = compose_prompt(&JudgmentContext::default(), "hello");
        assert_eq!(prompt, "Current message: hello");
    }
}
