//! Tiny deterministic transformer used as the default evaluator.
//!
//! Single block: embed → norm → attention → residual → norm → MLP → residual
//! → norm → vocabulary projection. Weights come from a fixed seed, so two
//! models built from the same config score every input identically.

use llama_engine::{EngineError, Evaluator, Result, TokenId};
use rayon::prelude::*;

use crate::ops::{apply_rope, attention_decode, dot, matvec, mlp_swiglu, rms_norm};

const WEIGHT_SEED: u64 = 12345;

/// Configuration for the tiny model.
#[derive(Debug, Clone, PartialEq)]
pub struct TinyModelConfig {
    pub n_vocab: usize,
    pub n_ctx: usize,
    pub d_model: usize,
    pub d_ff: usize,
    pub n_heads: usize,
    pub rope_base: f32,
    pub norm_eps: f32,
}

impl TinyModelConfig {
    /// Default dimensions for the given vocabulary and context sizes.
    pub fn new(n_vocab: usize, n_ctx: usize) -> Self {
        Self {
            n_vocab,
            n_ctx,
            d_model: 32,
            d_ff: 64,
            n_heads: 4,
            rope_base: 10_000.0,
            norm_eps: 1e-5,
        }
    }

    pub fn head_dim(&self) -> usize {
        self.d_model / self.n_heads
    }

    fn validate(&self) -> Result<()> {
        if self.n_vocab == 0 || self.n_ctx == 0 {
            return Err(EngineError::ModelLoad(format!(
                "n_vocab ({}) and n_ctx ({}) must be positive",
                self.n_vocab, self.n_ctx
            )));
        }
        if self.n_heads == 0 || self.d_model % self.n_heads != 0 || self.head_dim() % 2 != 0 {
            return Err(EngineError::ModelLoad(format!(
                "d_model {} must split into {} heads of even width",
                self.d_model, self.n_heads
            )));
        }
        Ok(())
    }
}

/// Simple seeded RNG for weight initialization (xorshift64).
struct WeightRng {
    state: u64,
}

impl WeightRng {
    fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { 1 } else { seed },
        }
    }

    fn next_f32(&mut self) -> f32 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        ((self.state >> 40) as f32 / (1u64 << 24) as f32 - 0.5) * 0.5
    }

    fn fill(&mut self, n: usize) -> Vec<f32> {
        (0..n).map(|_| self.next_f32()).collect()
    }
}

pub struct TinyModel {
    config: TinyModelConfig,
    // [n_vocab, d_model]
    embeddings: Vec<f32>,
    norm1_weight: Vec<f32>,
    w_q: Vec<f32>,
    w_k: Vec<f32>,
    w_v: Vec<f32>,
    w_o: Vec<f32>,
    norm2_weight: Vec<f32>,
    w_gate: Vec<f32>,
    w_up: Vec<f32>,
    w_down: Vec<f32>,
    final_norm_weight: Vec<f32>,
    // [n_vocab, d_model], one contiguous row per output logit
    lm_head: Vec<f32>,

    // [n_ctx, d_model]
    k_cache: Vec<f32>,
    v_cache: Vec<f32>,
    /// Positions currently held in the cache.
    cache_len: usize,

    /// Attention scratch, sized from the mem_per_token hint.
    work: Vec<f32>,
    pool: Option<(usize, rayon::ThreadPool)>,
}

impl TinyModel {
    pub fn new(config: TinyModelConfig) -> Result<Self> {
        config.validate()?;

        let mut rng = WeightRng::new(WEIGHT_SEED);
        let d = config.d_model;
        let ff = config.d_ff;
        let v = config.n_vocab;

        Ok(Self {
            embeddings: rng.fill(v * d),
            norm1_weight: vec![1.0; d],
            w_q: rng.fill(d * d),
            w_k: rng.fill(d * d),
            w_v: rng.fill(d * d),
            w_o: rng.fill(d * d),
            norm2_weight: vec![1.0; d],
            w_gate: rng.fill(d * ff),
            w_up: rng.fill(d * ff),
            w_down: rng.fill(ff * d),
            final_norm_weight: vec![1.0; d],
            lm_head: rng.fill(v * d),
            k_cache: vec![0.0; config.n_ctx * d],
            v_cache: vec![0.0; config.n_ctx * d],
            cache_len: 0,
            work: Vec::new(),
            pool: None,
            config,
        })
    }

    pub fn config(&self) -> &TinyModelConfig {
        &self.config
    }

    /// Positions currently held in the KV cache.
    pub fn cache_len(&self) -> usize {
        self.cache_len
    }

    /// Bytes of working state one token needs: its KV entries plus the
    /// activations of a forward pass.
    pub fn bytes_per_token(&self) -> usize {
        let c = &self.config;
        let kv = 2 * c.d_model;
        let activations = 8 * c.d_model + 3 * c.d_ff + c.n_vocab + c.n_ctx;
        (kv + activations) * std::mem::size_of::<f32>()
    }

    fn embed(&self, token: usize) -> &[f32] {
        let d = self.config.d_model;
        &self.embeddings[token * d..(token + 1) * d]
    }

    fn ensure_pool(&mut self, n_threads: usize) -> Result<()> {
        let n_threads = n_threads.max(1);
        if matches!(&self.pool, Some((n, _)) if *n == n_threads) {
            return Ok(());
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .build()
            .map_err(|e| EngineError::Inference(format!("thread pool: {}", e)))?;
        self.pool = Some((n_threads, pool));
        Ok(())
    }

    /// Write K/V for `token` at `position`; return its query and normalized input.
    fn absorb(&mut self, token: usize, position: usize) -> (Vec<f32>, Vec<f32>) {
        let c = &self.config;
        let d = c.d_model;
        let head_dim = c.head_dim();

        let x = self.embed(token).to_vec();
        let x_norm = rms_norm(&x, &self.norm1_weight, c.norm_eps);

        let mut q = matvec(&x_norm, &self.w_q, d);
        let mut k = matvec(&x_norm, &self.w_k, d);
        let v = matvec(&x_norm, &self.w_v, d);
        apply_rope(&mut q, position, head_dim, c.rope_base);
        apply_rope(&mut k, position, head_dim, c.rope_base);

        self.k_cache[position * d..(position + 1) * d].copy_from_slice(&k);
        self.v_cache[position * d..(position + 1) * d].copy_from_slice(&v);
        self.cache_len = position + 1;

        (q, x)
    }

    /// Attention + MLP for the token at the end of the cache.
    fn hidden_state(&mut self, q: &[f32], x: &[f32]) -> Vec<f32> {
        let c = &self.config;
        let d = c.d_model;
        let seq_len = self.cache_len;

        let attn = attention_decode(
            q,
            &self.k_cache[..seq_len * d],
            &self.v_cache[..seq_len * d],
            seq_len,
            c.head_dim(),
            &mut self.work,
        );
        let attn_proj = matvec(&attn, &self.w_o, d);
        let after_attn: Vec<f32> = x.iter().zip(&attn_proj).map(|(a, b)| a + b).collect();

        let x_norm2 = rms_norm(&after_attn, &self.norm2_weight, c.norm_eps);
        let mlp = mlp_swiglu(&x_norm2, &self.w_gate, &self.w_up, &self.w_down, d, c.d_ff);
        let hidden: Vec<f32> = after_attn.iter().zip(&mlp).map(|(a, b)| a + b).collect();

        rms_norm(&hidden, &self.final_norm_weight, c.norm_eps)
    }

    fn check_tokens(&self, tokens: &[TokenId]) -> Result<()> {
        let n_vocab = self.config.n_vocab;
        match tokens
            .iter()
            .find(|&&id| usize::try_from(id).map_or(true, |i| i >= n_vocab))
        {
            Some(&id) => Err(EngineError::TokenOutOfRange { id, n_vocab }),
            None => Ok(()),
        }
    }
}

impl Evaluator for TinyModel {
    fn n_vocab(&self) -> usize {
        self.config.n_vocab
    }

    fn n_ctx(&self) -> usize {
        self.config.n_ctx
    }

    fn eval(
        &mut self,
        n_threads: usize,
        n_past: usize,
        tokens: &[TokenId],
        logits: &mut Vec<f32>,
        mem_per_token: &mut usize,
    ) -> Result<()> {
        let n_ctx = self.config.n_ctx;
        if n_past + tokens.len() > n_ctx {
            return Err(EngineError::ContextOverflow {
                n_past,
                n_tokens: tokens.len(),
                n_ctx,
            });
        }
        if n_past > self.cache_len {
            return Err(EngineError::Inference(format!(
                "n_past {} skips past {} cached positions",
                n_past, self.cache_len
            )));
        }
        self.check_tokens(tokens)?;

        if *mem_per_token == 0 {
            *mem_per_token = self.bytes_per_token();
        } else {
            let needed = *mem_per_token * tokens.len() / std::mem::size_of::<f32>();
            if self.work.capacity() < needed {
                tracing::debug!(needed, "growing evaluator work buffer");
                self.work.reserve(needed - self.work.len());
            }
        }

        // Anything past n_past is stale.
        self.cache_len = n_past;

        let Some((&last, prefix)) = tokens.split_last() else {
            return Ok(());
        };
        for (i, &token) in prefix.iter().enumerate() {
            self.absorb(token as usize, n_past + i);
        }
        let (q, x) = self.absorb(last as usize, n_past + prefix.len());
        let hidden = self.hidden_state(&q, &x);

        let d = self.config.d_model;
        let n_vocab = self.config.n_vocab;
        logits.clear();
        logits.resize(n_vocab, 0.0);

        self.ensure_pool(n_threads)?;
        let Some((_, pool)) = &self.pool else {
            return Err(EngineError::Inference("thread pool unavailable".into()));
        };
        let lm_head = &self.lm_head;
        pool.install(|| {
            logits
                .par_iter_mut()
                .zip(lm_head.par_chunks(d))
                .for_each(|(out, row)| *out = dot(row, &hidden));
        });

        Ok(())
    }
}
