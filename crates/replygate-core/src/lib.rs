pub mod config;
pub mod error;
pub mod types;

pub use config::{FilterConfig, GateConfig, GroupFilterMode, JudgeConfig, MergeConfig, ModelGroup};
pub use error::{ReplygateError, Result};
pub use types::{
    strip_kind_prefix, ConversationKey, ConversationKind, GateSignal, InboundMessage, Sender,
};
