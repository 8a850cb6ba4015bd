//! # llama-cli
//!
//! Interactive completion driver for llama.rs.
//!
//! Wires: tokenizer → evaluator → sampler → stdout, with optional user
//! splices triggered by a reverse prompt or by Ctrl+C.
//!
//! - [`Generation`] is the loop state machine
//! - [`InteractionGate`] is the flag shared with the SIGINT handler
//! - [`Params`] is the command-line surface

pub mod console;
pub mod gate;
pub mod generation;
pub mod input;
pub mod params;
pub mod reverse_prompt;

use llama_engine::EngineError;
use llama_tokenizer::TokenizerError;

pub use gate::{InteractionGate, Interrupt};
pub use generation::{Generation, GenerationConfig, GenerationSummary, StopReason};
pub use params::Params;
pub use reverse_prompt::ReversePrompt;

/// Errors from the generation pipeline.
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("evaluator error: {0}")]
    Engine(#[from] EngineError),
    #[error("tokenizer error: {0}")]
    Tokenizer(#[from] TokenizerError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, GenerateError>;
