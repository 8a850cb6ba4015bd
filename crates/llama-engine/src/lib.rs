//! # llama-engine
//!
//! The "narrow waist" of the llama.rs stack. Defines the token types and the
//! [`Evaluator`] trait that every other crate depends on. The generation loop
//! only ever talks to a model through this trait, so a CPU reference model, an
//! FFI backend or a scripted test double can be swapped without touching it.
//!
//! ## Design Notes
//!
//! ### Token Type
//! `TokenId` is aliased as `i32` for FFI compatibility, though token IDs are
//! logically non-negative.
//!
//! ### Stateful evaluation
//! An evaluator owns its attention state. Callers address that state with
//! `n_past`, the number of tokens already absorbed; evaluating at a position
//! below the current length overwrites everything from that position on.

pub type Result<T> = std::result::Result<T, EngineError>;

/// Token ID type (i32 for FFI compat; logically non-negative).
pub type TokenId = i32;

/// Beginning-of-sequence marker prepended to the initial prompt.
pub const BOS_TOKEN_ID: TokenId = 1;

/// End-of-stream marker.
pub const EOS_TOKEN_ID: TokenId = 2;

/// Errors reported by a model evaluator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("context overflow: {n_past} + {n_tokens} tokens exceeds n_ctx = {n_ctx}")]
    ContextOverflow {
        n_past: usize,
        n_tokens: usize,
        n_ctx: usize,
    },

    #[error("token id {id} outside vocabulary of {n_vocab}")]
    TokenOutOfRange { id: TokenId, n_vocab: usize },

    #[error("Inference failed: {0}")]
    Inference(String),
}

/// A stateful causal language model.
///
/// `eval` appends `tokens` at position `n_past` and writes logits into
/// `logits`. The buffer is row-major with `n_vocab` columns; whatever the
/// batch width, its *last* `n_vocab` entries score the token that follows the
/// final element of `tokens`.
///
/// `mem_per_token` is a reservation hint. A caller passes `0` once with a small
/// priming batch and the evaluator stores its measured per-token working-set
/// size there; every later call passes the measured value back unchanged.
pub trait Evaluator {
    /// Number of vocabulary entries scored per position.
    fn n_vocab(&self) -> usize;

    /// Maximum number of tokens the evaluator can hold.
    fn n_ctx(&self) -> usize;

    fn eval(
        &mut self,
        n_threads: usize,
        n_past: usize,
        tokens: &[TokenId],
        logits: &mut Vec<f32>,
        mem_per_token: &mut usize,
    ) -> Result<()>;
}

impl<E: Evaluator + ?Sized> Evaluator for &mut E {
    fn n_vocab(&self) -> usize {
        (**self).n_vocab()
    }

    fn n_ctx(&self) -> usize {
        (**self).n_ctx()
    }

    fn eval(
        &mut self,
        n_threads: usize,
        n_past: usize,
        tokens: &[TokenId],
        logits: &mut Vec<f32>,
        mem_per_token: &mut usize,
    ) -> Result<()> {
        (**self).eval(n_threads, n_past, tokens, logits, mem_per_token)
    }
}

impl<E: Evaluator + ?Sized> Evaluator for Box<E> {
    fn n_vocab(&self) -> usize {
        (**self).n_vocab()
    }

    fn n_ctx(&self) -> usize {
        (**self).n_ctx()
    }

    fn eval(
        &mut self,
        n_threads: usize,
        n_past: usize,
        tokens: &[TokenId],
        logits: &mut Vec<f32>,
        mem_per_token: &mut usize,
    ) -> Result<()> {
        (**self).eval(n_threads, n_past, tokens, logits, mem_per_token)
    }
}
