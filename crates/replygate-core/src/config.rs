use std::collections::HashMap;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Cached judgments expire after this many seconds unless overridden.
pub const DEFAULT_CACHE_EXPIRY_SECS: u64 = 300;
/// Upper bound for `context_message_count` — larger values are clamped.
pub const MAX_CONTEXT_MESSAGES: u32 = 20;
/// Per-request classifier timeout unless the model group overrides it.
pub const DEFAULT_CLASSIFIER_TIMEOUT_SECS: u64 = 10;

/// Default judging rubric sent as the classifier system prompt.
///
/// The classifier is asked for a single JSON object with one boolean field;
/// everything else in its output is ignored.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
Decide whether the incoming chat message needs a reply from the assistant.

Rules: questions and requests -> true; bare greetings and acknowledgements -> false; \
messages addressing the assistant directly -> true.

Return a JSON object: {\"should_reply\": true} or {\"should_reply\": false}";

/// Top-level config (replygate.toml + REPLYGATE_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GateConfig {
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub judge: JudgeConfig,
    #[serde(default)]
    pub merge: MergeConfig,
    /// Named classifier endpoints; `judge.model_group` selects one.
    #[serde(default)]
    pub model_groups: HashMap<String, ModelGroup>,
}

/// Scope filtering: which conversations are gated at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Gate private (1:1) conversations.
    #[serde(default = "bool_true")]
    pub private_enabled: bool,
    /// Gate group conversations.
    #[serde(default = "bool_true")]
    pub group_enabled: bool,
    /// When true, a negative judgment suppresses every reply path,
    /// including fallback/random-reply heuristics.
    #[serde(default)]
    pub complete_takeover: bool,
    /// How `group_ids` is interpreted for group conversations.
    #[serde(default)]
    pub group_filter_mode: GroupFilterMode,
    /// Group ids for the allow/deny list. Entries may carry a
    /// `group_`/`private_` prefix; matching strips it.
    #[serde(default)]
    pub group_ids: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            private_enabled: true,
            group_enabled: true,
            complete_takeover: false,
            group_filter_mode: GroupFilterMode::default(),
            group_ids: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum GroupFilterMode {
    /// All groups are gated.
    #[default]
    Disabled,
    /// Only listed groups are gated.
    AllowList,
    /// Listed groups are exempt, everything else is gated.
    DenyList,
}

/// Judgment step configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeConfig {
    /// Name of the model group used for judgment calls.
    #[serde(default = "default_model_group")]
    pub model_group: String,
    /// Read the conversation's configured persona into the judgment prompt.
    #[serde(default = "bool_true")]
    pub auto_use_persona: bool,
    /// System prompt steering the classifier.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Recent history messages included as context. 0 disables context.
    #[serde(default = "default_context_count")]
    pub context_message_count: u32,
    /// Seconds a cached judgment stays valid.
    #[serde(default = "default_cache_expiry")]
    pub cache_expiry_secs: u64,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            model_group: default_model_group(),
            auto_use_persona: true,
            system_prompt: default_system_prompt(),
            context_message_count: default_context_count(),
            cache_expiry_secs: default_cache_expiry(),
        }
    }
}

/// Message-merge (debounce) window configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Collect consecutive messages before judging instead of judging each
    /// message on arrival.
    #[serde(default)]
    pub enabled: bool,
    /// Seconds to wait for further messages after a burst opens.
    #[serde(default = "default_merge_wait")]
    pub wait_secs: f64,
    /// Flush early once a batch reaches this many messages. 0 = unlimited.
    #[serde(default = "default_merge_max")]
    pub max_count: u32,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            wait_secs: default_merge_wait(),
            max_count: default_merge_max(),
        }
    }
}

/// One named classifier endpoint (OpenAI-compatible chat completions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelGroup {
    /// Model id sent in the request body.
    pub model: String,
    /// Base URL without trailing slash.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer token for the endpoint.
    pub api_key: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn bool_true() -> bool {
    true
}
fn default_model_group() -> String {
    "default".to_string()
}
fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}
fn default_context_count() -> u32 {
    5
}
fn default_cache_expiry() -> u64 {
    DEFAULT_CACHE_EXPIRY_SECS
}
fn default_merge_wait() -> f64 {
    10.0
}
fn default_merge_max() -> u32 {
    5
}
fn default_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_timeout_secs() -> u64 {
    DEFAULT_CLASSIFIER_TIMEOUT_SECS
}

impl GateConfig {
    /// Load config from a TOML file with REPLYGATE_* env var overrides.
    ///
    /// Checks the explicit path argument first, then
    /// `~/.replygate/replygate.toml`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let mut config: GateConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("REPLYGATE_").split("_"))
            .extract()
            .map_err(|e| crate::error::ReplygateError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Enforce value ranges and cross-field rules.
    ///
    /// Clamps the context count (the range is a recommendation, not a hard
    /// contract), rejects an unusable merge window, and warns — without
    /// failing — when the configured model group has no definition, since
    /// judgment calls fail open at runtime anyway.
    pub fn validate(&mut self) -> crate::error::Result<()> {
        if self.judge.context_message_count > MAX_CONTEXT_MESSAGES {
            warn!(
                configured = self.judge.context_message_count,
                max = MAX_CONTEXT_MESSAGES,
                "context_message_count clamped"
            );
            self.judge.context_message_count = MAX_CONTEXT_MESSAGES;
        }

        if self.merge.enabled && self.merge.wait_secs <= 0.0 {
            return Err(crate::error::ReplygateError::Config(format!(
                "merge.wait_secs must be positive when merge is enabled (got {})",
                self.merge.wait_secs
            )));
        }

        if !self.model_groups.contains_key(&self.judge.model_group) {
            warn!(
                model_group = %self.judge.model_group,
                "configured model group has no definition; judgments will fail open"
            );
        }

        Ok(())
    }

    /// Resolve the configured judgment model group, if defined.
    pub fn judge_model_group(&self) -> Option<&ModelGroup> {
        self.model_groups.get(&self.judge.model_group)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.replygate/replygate.toml", home)
}
