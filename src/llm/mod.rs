mod client;
mod sse;
mod types;

pub use client::{ChatModel, LlmError, OpenAiClient, TokenStream};
