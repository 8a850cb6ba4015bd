//! # llama-sampling
//!
//! Next-token selection for llama.rs.
//!
//! Supports:
//! - Repetition penalty over a [`HistoryWindow`] of recent tokens
//! - Temperature scaling (collapsing to argmax as temperature approaches zero)
//! - Top-k filtering
//! - Top-p (nucleus) filtering
//! - Suppressing end-of-stream (`ignore_eos`)
//!
//! The caller owns the random number generator, so a fixed seed reproduces a
//! generation byte-for-byte.

mod history;

use std::cmp::Ordering;

use llama_engine::{TokenId, EOS_TOKEN_ID};
use rand::Rng;

pub use history::{HistoryWindow, FILLER_TOKEN_ID};

/// Temperatures at or below this collapse to argmax.
pub const MIN_TEMPERATURE: f32 = f32::EPSILON;

/// Sampling configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingConfig {
    /// Number of highest-probability candidates retained. `0` keeps all.
    pub top_k: usize,

    /// Nucleus threshold in `[0, 1]`. `1.0` disables the filter.
    pub top_p: f32,

    /// Divisor applied to logits. > 1.0 = more random, < 1.0 = more deterministic.
    pub temperature: f32,

    /// Multiplicative penalty (>= 1) on tokens present in the history window.
    pub repeat_penalty: f32,

    /// Never sample the end-of-stream token.
    pub ignore_eos: bool,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            top_k: 40,
            top_p: 0.95,
            temperature: 0.80,
            repeat_penalty: 1.30,
            ignore_eos: false,
        }
    }
}

/// Draws one token id from a logit vector.
///
/// Sampling is pure given its inputs and the RNG state; it never fails.
#[derive(Debug, Clone, Default)]
pub struct Sampler {
    config: SamplingConfig,
}

impl Sampler {
    pub fn new(config: SamplingConfig) -> Self {
        Self { config }
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.config.temperature = temp;
        self
    }

    pub fn with_top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    pub fn with_top_p(mut self, p: f32) -> Self {
        self.config.top_p = p;
        self
    }

    pub fn with_repeat_penalty(mut self, penalty: f32) -> Self {
        self.config.repeat_penalty = penalty;
        self
    }

    pub fn with_ignore_eos(mut self, ignore: bool) -> Self {
        self.config.ignore_eos = ignore;
        self
    }

    pub fn config(&self) -> &SamplingConfig {
        &self.config
    }

    /// Sample a token id in `[0, logits.len())`.
    ///
    /// `logits` must be the row for the most recent position. A malformed row
    /// (NaN, all -inf) yields an unspecified id.
    pub fn sample<R: Rng>(
        &self,
        logits: &[f32],
        history: &HistoryWindow,
        rng: &mut R,
    ) -> TokenId {
        let eos = EOS_TOKEN_ID as usize;
        let suppress_eos = self.config.ignore_eos && eos < logits.len();

        let mut work = logits.to_vec();
        if suppress_eos {
            work[eos] = 0.0;
        }

        self.apply_repeat_penalty(&mut work, history);

        let mut candidates: Vec<(TokenId, f32)> = work
            .iter()
            .enumerate()
            .filter(|&(id, _)| !(suppress_eos && id == eos))
            .map(|(id, &logit)| (id as TokenId, logit))
            .collect();

        if candidates.is_empty() {
            return 0;
        }

        if self.config.temperature <= MIN_TEMPERATURE {
            return Self::argmax(&candidates);
        }

        let inv_temp = 1.0 / self.config.temperature;
        for (_, logit) in &mut candidates {
            *logit *= inv_temp;
        }

        Self::softmax(&mut candidates);
        Self::apply_top_k(&mut candidates, self.config.top_k);
        Self::apply_top_p(&mut candidates, self.config.top_p);

        Self::sample_from_distribution(&candidates, rng)
    }

    /// Divide positive logits and multiply non-positive ones by the penalty,
    /// once per distinct id in the window.
    fn apply_repeat_penalty(&self, logits: &mut [f32], history: &HistoryWindow) {
        let penalty = self.config.repeat_penalty;
        if penalty == 1.0 || history.is_empty() {
            return;
        }

        let mut seen: Vec<TokenId> = history.iter().copied().collect();
        seen.sort_unstable();
        seen.dedup();

        for id in seen {
            let Some(logit) = usize::try_from(id).ok().and_then(|i| logits.get_mut(i)) else {
                continue;
            };
            if *logit > 0.0 {
                *logit /= penalty;
            } else {
                *logit *= penalty;
            }
        }
    }

    /// Descending probability, ties broken by lower id.
    fn by_probability(a: &(TokenId, f32), b: &(TokenId, f32)) -> Ordering {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then(a.0.cmp(&b.0))
    }

    fn argmax(candidates: &[(TokenId, f32)]) -> TokenId {
        candidates
            .iter()
            .min_by(|a, b| Self::by_probability(a, b))
            .map(|&(id, _)| id)
            .unwrap_or(0)
    }

    fn softmax(candidates: &mut [(TokenId, f32)]) {
        let max_logit = candidates
            .iter()
            .map(|&(_, l)| l)
            .fold(f32::NEG_INFINITY, f32::max);
        for (_, l) in candidates.iter_mut() {
            *l = (*l - max_logit).exp();
        }
        Self::normalize(candidates);
    }

    fn normalize(candidates: &mut [(TokenId, f32)]) {
        let sum: f32 = candidates.iter().map(|&(_, p)| p).sum();
        if sum > 0.0 {
            for (_, p) in candidates.iter_mut() {
                *p /= sum;
            }
        }
    }

    /// Keep the `k` most probable candidates, sorted descending.
    fn apply_top_k(candidates: &mut Vec<(TokenId, f32)>, k: usize) {
        if k > 0 && k < candidates.len() {
            candidates.select_nth_unstable_by(k - 1, Self::by_probability);
            candidates.truncate(k);
            candidates.sort_by(Self::by_probability);
            Self::normalize(candidates);
        } else {
            candidates.sort_by(Self::by_probability);
        }
    }

    /// Keep the smallest sorted prefix whose mass reaches `p`.
    fn apply_top_p(candidates: &mut Vec<(TokenId, f32)>, p: f32) {
        if p >= 1.0 {
            return;
        }

        let mut cumsum = 0.0;
        let mut keep = candidates.len();
        for (idx, &(_, prob)) in candidates.iter().enumerate() {
            cumsum += prob;
            if cumsum >= p {
                keep = idx + 1;
                break;
            }
        }

        candidates.truncate(keep);
        Self::normalize(candidates);
    }

    fn sample_from_distribution<R: Rng>(
        candidates: &[(TokenId, f32)],
        rng: &mut R,
    ) -> TokenId {
        let total: f32 = candidates.iter().map(|&(_, p)| p).sum();
        let r = rng.random::<f32>() * total;

        let mut cumsum = 0.0;
        for &(id, prob) in candidates {
            cumsum += prob;
            if r < cumsum {
                return id;
            }
        }

        // Rounding can leave r just past the final cumulative sum.
        candidates
            .iter()
            .rev()
            .find(|&&(_, prob)| prob > 0.0)
            .or(candidates.first())
            .map(|&(id, _)| id)
            .unwrap_or(0)
    }
}
