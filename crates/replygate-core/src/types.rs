use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder sender label when neither a display name nor a user id is known.
const UNKNOWN_SENDER: &str = "unknown";

/// Opaque key naming one chat conversation (private or group).
///
/// Used as the sharding key for decision caches, merge batches, and
/// per-conversation locks. Hosts usually pass platform keys such as
/// `"group_1067597714"` or `"private_42"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey(pub String);

impl ConversationKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The key with any `group_`/`private_` kind prefix stripped.
    ///
    /// Group allow/deny lists match on this form so that configured ids work
    /// with or without the platform prefix.
    pub fn bare_id(&self) -> &str {
        strip_kind_prefix(&self.0)
    }
}

/// Strip a leading `group_`/`private_` kind prefix from a conversation or
/// group id. Applied to both sides of every group-list comparison.
pub fn strip_kind_prefix(id: &str) -> &str {
    id.strip_prefix("group_")
        .or_else(|| id.strip_prefix("private_"))
        .unwrap_or(id)
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ConversationKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConversationKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Coarse conversation classification as reported by the host platform.
///
/// Anything that is not recognisably private or group falls into `Other`
/// and is never gated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    Private,
    Group,
    Other,
}

impl ConversationKind {
    /// Parse a platform label ("private", "group", case-insensitive).
    /// Unrecognised labels map to `Other`.
    pub fn from_label(label: &str) -> Self {
        match label.to_ascii_lowercase().as_str() {
            "private" => Self::Private,
            "group" => Self::Group,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for ConversationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Private => write!(f, "private"),
            Self::Group => write!(f, "group"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Message author, with the display-name fallback resolved up front.
///
/// Fallback precedence for the human-readable label:
/// display name → platform user id → `"unknown"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    /// Platform-native user id. May be empty when the platform gives none.
    pub id: String,
    /// Display name, `None` when unset or blank.
    pub display_name: Option<String>,
}

impl Sender {
    /// Build a sender, normalising blank names/ids to the absent state.
    pub fn new(id: impl Into<String>, display_name: Option<String>) -> Self {
        let display_name = display_name.filter(|n| !n.trim().is_empty());
        Self {
            id: id.into(),
            display_name,
        }
    }

    /// Human-readable label: display name, else user id, else `"unknown"`.
    pub fn label(&self) -> &str {
        match &self.display_name {
            Some(name) => name,
            None if !self.id.is_empty() => &self.id,
            None => UNKNOWN_SENDER,
        }
    }
}

/// One inbound chat message as handed to the gate by the host runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub sender: Sender,
    /// Plain text content.
    pub content: String,
    /// Conversation the message arrived in.
    pub conversation: ConversationKey,
}

impl InboundMessage {
    pub fn new(
        sender: Sender,
        content: impl Into<String>,
        conversation: impl Into<ConversationKey>,
    ) -> Self {
        Self {
            sender,
            content: content.into(),
            conversation: conversation.into(),
        }
    }
}

/// Outcome of one gate invocation, translated for the host runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateSignal {
    /// Out of gating scope — pass the message through untouched.
    Allow,
    /// Suppress the triggered reply path; the message stays recorded and
    /// independent fallback heuristics may still fire.
    BlockTrigger,
    /// Suppress entirely — no reply paths, no fallback heuristics.
    BlockAll,
    /// The agent must respond now, overriding other silence heuristics.
    ForceTrigger,
}

impl fmt::Display for GateSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => write!(f, "allow"),
            Self::BlockTrigger => write!(f, "block-trigger"),
            Self::BlockAll => write!(f, "block-all"),
            Self::ForceTrigger => write!(f, "force-trigger"),
        }
    }
}
