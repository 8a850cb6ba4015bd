//! # llama-runtime
//!
//! Runtime pieces that sit underneath the generation loop:
//! - [`TinyModel`]: a small deterministic transformer implementing
//!   [`llama_engine::Evaluator`], with a position-addressed KV cache
//! - [`Timings`]: load/sample/predict accounting and the summary report

mod ops;
pub mod telemetry;
pub mod tiny_model;

pub use telemetry::{Phase, Timings};
pub use tiny_model::{TinyModel, TinyModelConfig};
