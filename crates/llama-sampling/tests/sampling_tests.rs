//! Integration tests for llama-sampling.
//!
//! Validates:
//! - Sampling distribution correctness
//! - Temperature scaling effects and the argmax collapse
//! - Top-k and top-p boundary behavior
//! - Repetition penalty against the history window
//! - ignore_eos suppression
//! - Determinism (seeded RNG reproducibility)
//! - History window invariants (property tests)

use std::collections::HashMap;

use llama_engine::{TokenId, EOS_TOKEN_ID};
use llama_sampling::*;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn plain() -> Sampler {
    Sampler::new(SamplingConfig {
        top_k: 0,
        top_p: 1.0,
        temperature: 1.0,
        repeat_penalty: 1.0,
        ignore_eos: false,
    })
}

fn empty_history() -> HistoryWindow {
    HistoryWindow::new(0)
}

fn histogram(sampler: &Sampler, logits: &[f32], history: &HistoryWindow, n: usize) -> HashMap<TokenId, usize> {
    let mut rng = StdRng::seed_from_u64(7);
    let mut counts = HashMap::new();
    for _ in 0..n {
        *counts.entry(sampler.sample(logits, history, &mut rng)).or_insert(0) += 1;
    }
    counts
}

// ===========================================================================
// Distribution
// ===========================================================================

#[test]
fn two_equal_logits_split_roughly_evenly() {
    let counts = histogram(&plain(), &[1.0, 1.0], &empty_history(), 4000);
    let zeros = counts.get(&0).copied().unwrap_or(0) as f64;
    let ratio = zeros / 4000.0;
    assert!((0.45..0.55).contains(&ratio), "ratio = {}", ratio);
}

#[test]
fn dominant_logit_dominates() {
    let counts = histogram(&plain(), &[0.0, 8.0, 0.0], &empty_history(), 1000);
    assert!(counts.get(&1).copied().unwrap_or(0) > 990);
}

#[test]
fn single_logit_always_returns_zero() {
    let mut rng = StdRng::seed_from_u64(1);
    for _ in 0..20 {
        assert_eq!(plain().sample(&[0.3], &empty_history(), &mut rng), 0);
    }
}

// ===========================================================================
// Temperature
// ===========================================================================

#[test]
fn zero_temperature_is_argmax() {
    let sampler = plain().with_temperature(0.0);
    let mut rng = StdRng::seed_from_u64(3);
    for _ in 0..20 {
        assert_eq!(sampler.sample(&[0.1, 0.2, 0.9, 0.3], &empty_history(), &mut rng), 2);
    }
}

#[test]
fn low_temperature_concentrates_probability() {
    let logits = [1.0, 1.5, 1.2];
    let hot = histogram(&plain().with_temperature(5.0), &logits, &empty_history(), 2000);
    let cold = histogram(&plain().with_temperature(0.05), &logits, &empty_history(), 2000);
    assert!(cold.get(&1).copied().unwrap_or(0) > hot.get(&1).copied().unwrap_or(0));
    assert!(cold.get(&1).copied().unwrap_or(0) > 1970);
}

// ===========================================================================
// Top-k / Top-p
// ===========================================================================

#[test]
fn top_k_1_is_greedy_after_penalty() {
    // Token 3 has the highest raw logit but sits in the history window.
    let mut history = HistoryWindow::new(2);
    history.push(3);
    let sampler = plain().with_top_k(1).with_repeat_penalty(4.0);
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..10 {
        assert_eq!(sampler.sample(&[0.0, 2.0, 1.0, 4.0], &history, &mut rng), 1);
    }
}

#[test]
fn top_k_restricts_support() {
    let logits = [1.0, 5.0, 2.0, 4.0, 3.0];
    let counts = histogram(&plain().with_top_k(2), &logits, &empty_history(), 500);
    assert!(counts.keys().all(|&id| id == 1 || id == 3));
}

#[test]
fn top_k_at_least_vocab_is_no_op() {
    let logits = [1.0, 1.0, 1.0];
    let counts = histogram(&plain().with_top_k(10), &logits, &empty_history(), 600);
    assert_eq!(counts.len(), 3);
}

#[test]
fn top_p_zero_has_single_candidate() {
    let logits = [0.5, 0.4, 0.6, 0.1];
    let counts = histogram(&plain().with_top_p(0.0), &logits, &empty_history(), 200);
    assert_eq!(counts.len(), 1);
    assert!(counts.contains_key(&2));
}

#[test]
fn top_p_one_includes_all_tokens() {
    let logits = [1.0, 1.0, 1.0, 1.0];
    let counts = histogram(&plain().with_top_p(1.0), &logits, &empty_history(), 800);
    assert_eq!(counts.len(), 4);
}

// ===========================================================================
// Repetition penalty
// ===========================================================================

#[test]
fn repetition_penalty_reduces_repeated_token_frequency() {
    let logits = [2.0, 2.0];
    let mut history = HistoryWindow::new(1);
    history.push(0);

    let counts = histogram(&plain().with_repeat_penalty(2.0), &logits, &history, 2000);
    assert!(counts.get(&0).copied().unwrap_or(0) < counts.get(&1).copied().unwrap_or(0));
}

#[test]
fn repetition_penalty_pushes_negative_logits_down() {
    let logits = [-1.0, -1.5];
    let mut history = HistoryWindow::new(1);
    history.push(0);
    // -1.0 * 3.0 = -3.0 < -1.5, so token 1 becomes the argmax.
    let sampler = plain().with_repeat_penalty(3.0).with_top_k(1);
    let mut rng = StdRng::seed_from_u64(5);
    assert_eq!(sampler.sample(&logits, &history, &mut rng), 1);
}

#[test]
fn filler_zeros_count_as_history() {
    // A fresh window is full of token 0, which is therefore penalized.
    let history = HistoryWindow::new(4);
    let sampler = plain().with_repeat_penalty(10.0).with_top_k(1);
    let mut rng = StdRng::seed_from_u64(5);
    assert_eq!(sampler.sample(&[5.0, 1.0], &history, &mut rng), 1);
}

#[test]
fn out_of_range_history_ids_are_ignored() {
    let mut history = HistoryWindow::new(2);
    history.push(1000);
    let sampler = plain().with_repeat_penalty(2.0).with_top_k(1);
    let mut rng = StdRng::seed_from_u64(5);
    assert_eq!(sampler.sample(&[0.0, 1.0], &history, &mut rng), 1);
}

// ===========================================================================
// ignore_eos
// ===========================================================================

#[test]
fn ignore_eos_with_only_negative_alternatives() {
    let mut logits = vec![-3.0; 6];
    logits[EOS_TOKEN_ID as usize] = 50.0;
    let sampler = plain().with_ignore_eos(true);
    let counts = histogram(&sampler, &logits, &empty_history(), 500);
    assert!(!counts.contains_key(&EOS_TOKEN_ID));
}

#[test]
fn eos_is_sampled_when_not_ignored() {
    let mut logits = vec![-3.0; 6];
    logits[EOS_TOKEN_ID as usize] = 50.0;
    let sampler = plain().with_top_k(1);
    let mut rng = StdRng::seed_from_u64(5);
    assert_eq!(sampler.sample(&logits, &empty_history(), &mut rng), EOS_TOKEN_ID);
}

// ===========================================================================
// Determinism
// ===========================================================================

#[test]
fn same_seed_same_sequence() {
    let logits: Vec<f32> = (0..64).map(|i| ((i * 37) % 11) as f32 * 0.3).collect();
    let sampler = Sampler::default();
    let history = HistoryWindow::new(8);

    let mut a = StdRng::seed_from_u64(42);
    let mut b = StdRng::seed_from_u64(42);
    for _ in 0..500 {
        assert_eq!(
            sampler.sample(&logits, &history, &mut a),
            sampler.sample(&logits, &history, &mut b)
        );
    }
}

#[test]
fn different_seeds_diverge() {
    let logits = vec![1.0; 32];
    let sampler = plain();
    let mut a = StdRng::seed_from_u64(1);
    let mut b = StdRng::seed_from_u64(2);
    let seq_a: Vec<_> = (0..50).map(|_| sampler.sample(&logits, &empty_history(), &mut a)).collect();
    let seq_b: Vec<_> = (0..50).map(|_| sampler.sample(&logits, &empty_history(), &mut b)).collect();
    assert_ne!(seq_a, seq_b);
}

// ===========================================================================
// Properties
// ===========================================================================

proptest! {
    #[test]
    fn window_length_is_invariant(capacity in 0usize..32, pushes in prop::collection::vec(0i32..100, 0..200)) {
        let mut window = HistoryWindow::new(capacity);
        for id in pushes {
            window.push(id);
            prop_assert_eq!(window.len(), capacity);
        }
    }

    #[test]
    fn sampled_id_is_in_range(
        logits in prop::collection::vec(-20.0f32..20.0, 1..64),
        top_k in 0usize..10,
        top_p in 0.0f32..=1.0,
        temperature in 0.0f32..3.0,
        seed in any::<u64>(),
    ) {
        let sampler = Sampler::default()
            .with_top_k(top_k)
            .with_top_p(top_p)
            .with_temperature(temperature);
        let mut rng = StdRng::seed_from_u64(seed);
        let id = sampler.sample(&logits, &HistoryWindow::new(4), &mut rng);
        prop_assert!(id >= 0 && (id as usize) < logits.len());
    }
}
