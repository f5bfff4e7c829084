pub mod cache;
pub mod context;
pub mod engine;
pub mod extract;
pub mod openai;
pub mod provider;

pub use cache::DecisionCache;
pub use context::{ContextAssembler, JudgmentContext};
pub use engine::JudgmentEngine;
pub use openai::OpenAiCompatProvider;
pub use provider::{ChatProvider, ChatRequest, ChatResponse, ProviderError};
