//! Concrete [`LlmProvider`](super::provider::LlmProvider) backends.

mod anthropic;
mod openai;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;
