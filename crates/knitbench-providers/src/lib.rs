//! knitbench-providers: Inference provider integrations.
//!
//! Implements the `LlmProvider` trait for Google Gemini and for any
//! OpenAI-compatible chat endpoint, plus a scripted mock for offline runs.

pub mod config;
pub mod error;
pub mod gemini;
pub mod mock;
pub mod openai;

pub use config::{create_provider, load_config, KnitbenchConfig, ProviderConfig};
pub use error::ProviderError;
