#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]

//! # llm
//!
//! Text-generation providers behind a single trait.
//!
//! This crate provides:
//! - [`AIProvider`] abstraction over chat-completion style APIs
//! - OpenAI and Anthropic implementations
//! - [`ProviderChain`] for ordered primary/fallback generation
//! - [`extract_json`] for pulling structured output out of model text

pub mod anthropic;
pub mod chain;
pub mod error;
pub mod extract;
pub mod openai;
pub mod provider;

pub use anthropic::AnthropicProvider;
pub use chain::{ChainOutput, ProviderChain};
pub use error::{LlmError, LlmResult};
pub use extract::extract_json;
pub use openai::OpenAIProvider;
pub use provider::{AIMessage, AIProvider, AIResponse, AIRole, GenerateOptions, TokenUsage};
