//! Command-line parameters.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;
use llama_sampling::SamplingConfig;
use rand::Rng;

use crate::generation::GenerationConfig;
use crate::{GenerateError, Result};

/// Openers used when no prompt is given.
pub const RANDOM_PROMPTS: [&str; 10] = [
    "So",
    "Once upon a time",
    "When",
    "The",
    "After",
    "If",
    "import",
    "He",
    "She",
    "They",
];

/// Smallest context that fits the evaluator's priming batch.
pub const MIN_CTX: usize = 4;

fn default_threads() -> usize {
    num_cpus::get().min(4)
}

/// llama.rs: interactive text completion
#[derive(Debug, Clone, Parser)]
#[command(name = "llama-cli", version)]
pub struct Params {
    /// RNG seed (negative: use the current time)
    #[arg(short, long, default_value_t = -1, allow_negative_numbers = true)]
    pub seed: i64,

    /// Number of threads used during computation
    #[arg(short = 't', long, default_value_t = default_threads())]
    pub threads: usize,

    /// Prompt to start generation with (empty: pick a random opener)
    #[arg(short, long, default_value = "")]
    pub prompt: String,

    /// Read the prompt from a file
    #[arg(short = 'f', long = "file")]
    pub file: Option<PathBuf>,

    /// Run in interactive mode
    #[arg(short, long)]
    pub interactive: bool,

    /// Ask for input right after the prompt has been read
    #[arg(long = "interactive-start")]
    pub interactive_start: bool,

    /// Hand control back to the user when this text is generated
    #[arg(short = 'r', long = "reverse-prompt", default_value = "")]
    pub reverse_prompt: String,

    /// Colorise prompt, generated text and user input
    #[arg(long)]
    pub color: bool,

    /// Number of tokens to predict
    #[arg(short = 'n', long = "n_predict", default_value_t = 128, allow_negative_numbers = true)]
    pub n_predict: i32,

    #[arg(long = "top_k", default_value_t = 40)]
    pub top_k: usize,

    #[arg(long = "top_p", default_value_t = 0.95)]
    pub top_p: f32,

    /// Last n tokens to consider for the repeat penalty
    #[arg(long = "repeat_last_n", default_value_t = 64)]
    pub repeat_last_n: usize,

    /// Penalize repeat sequences of tokens
    #[arg(long = "repeat_penalty", default_value_t = 1.30)]
    pub repeat_penalty: f32,

    /// Size of the prompt context
    #[arg(short = 'c', long = "ctx_size", default_value_t = 512)]
    pub ctx_size: usize,

    /// Never generate the end-of-text token
    #[arg(long = "ignore-eos")]
    pub ignore_eos: bool,

    #[arg(long, default_value_t = 0.80)]
    pub temp: f32,

    /// Batch size for prompt processing
    #[arg(short = 'b', long = "batch_size", default_value_t = 8)]
    pub batch_size: usize,

    /// Vocabulary file (JSON); the byte-level vocabulary is used when absent
    #[arg(short = 'm', long)]
    pub model: Option<PathBuf>,
}

impl Params {
    /// Reject values the loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.temp <= 0.0 {
            return Err(config_error(format!(
                "temperature must be positive (got {})",
                self.temp
            )));
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(config_error(format!(
                "top_p must be in [0, 1] (got {})",
                self.top_p
            )));
        }
        if self.repeat_penalty < 1.0 {
            return Err(config_error(format!(
                "repeat_penalty must be >= 1 (got {})",
                self.repeat_penalty
            )));
        }
        if self.ctx_size < MIN_CTX {
            return Err(config_error(format!(
                "ctx_size must be at least {} (got {})",
                MIN_CTX, self.ctx_size
            )));
        }
        if self.threads == 0 {
            return Err(config_error("threads must be at least 1".to_string()));
        }
        Ok(())
    }

    /// The seed to use; negative means the current UNIX time in seconds.
    pub fn resolve_seed(&self) -> u64 {
        if self.seed < 0 {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0)
        } else {
            self.seed as u64
        }
    }

    /// Load `--file` into the prompt, or pick a random opener if the prompt is empty.
    pub fn resolve_prompt<R: Rng>(&mut self, rng: &mut R) -> Result<()> {
        if let Some(path) = &self.file {
            self.prompt = std::fs::read_to_string(path).map_err(|e| {
                config_error(format!("failed to read prompt file {}: {}", path.display(), e))
            })?;
        }
        if self.prompt.is_empty() {
            self.prompt = RANDOM_PROMPTS[rng.random_range(0..RANDOM_PROMPTS.len())].to_string();
        }
        Ok(())
    }

    pub fn sampling_config(&self) -> SamplingConfig {
        SamplingConfig {
            top_k: self.top_k,
            top_p: self.top_p,
            temperature: self.temp,
            repeat_penalty: self.repeat_penalty,
            ignore_eos: self.ignore_eos,
        }
    }

    pub fn generation_config(&self) -> GenerationConfig {
        GenerationConfig {
            prompt: self.prompt.clone(),
            antiprompt: self.reverse_prompt.clone(),
            n_predict: self.n_predict,
            n_threads: self.threads,
            n_batch: self.batch_size,
            repeat_last_n: self.repeat_last_n,
            interactive: self.interactive || self.interactive_start,
            interactive_start: self.interactive_start,
            use_color: self.color,
            sampling: self.sampling_config(),
        }
    }
}

fn config_error(msg: String) -> GenerateError {
    GenerateError::Config(msg)
}
