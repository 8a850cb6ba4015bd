//! The generation loop.
//!
//! [`Generation`] is an explicit state machine over the pending batch
//! `embd`, the input queue, and the interaction gate. Each [`Generation::step`]
//! is one iteration:
//!
//! 1. feed `embd` to the evaluator and advance `n_past`
//! 2. drain queued input into `embd`, or
//! 3. sample one token when the queue is exhausted
//! 4. echo `embd` to stdout unless it is user input
//! 5. in interactive mode, read a splice on reverse prompt or interrupt
//! 6. stop on end of text, noting it on the diagnostic stream
//!
//! The loop stops when the token budget runs out or EOS is produced.

use std::io::{BufRead, Write};

use llama_engine::{Evaluator, TokenId, EOS_TOKEN_ID};
use llama_runtime::{Phase, Timings};
use llama_sampling::{HistoryWindow, Sampler, SamplingConfig};
use llama_tokenizer::Tokenizer;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::gate::InteractionGate;
use crate::reverse_prompt::ReversePrompt;
use crate::{console, input, GenerateError, Result};

/// Batch used once at startup to measure the evaluator's per-token memory.
const PRIMING_BATCH: [TokenId; 4] = [0, 1, 2, 3];

/// Written to the diagnostic stream when the model ends the text.
pub const END_OF_TEXT_MARKER: &str = " [end of text]";

/// Everything the loop needs to know besides its collaborators.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub prompt: String,
    /// Reverse prompt text; empty disables match-triggered splices.
    pub antiprompt: String,
    pub n_predict: i32,
    pub n_threads: usize,
    pub n_batch: usize,
    pub repeat_last_n: usize,
    pub interactive: bool,
    pub interactive_start: bool,
    pub use_color: bool,
    pub sampling: SamplingConfig,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            antiprompt: String::new(),
            n_predict: 128,
            n_threads: 4,
            n_batch: 8,
            repeat_last_n: 64,
            interactive: false,
            interactive_start: false,
            use_color: false,
            sampling: SamplingConfig::default(),
        }
    }
}

/// Why the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `remaining_tokens` reached zero.
    BudgetExhausted,
    /// The last token added was EOS.
    EndOfText,
}

/// Outcome of [`Generation::run`].
#[derive(Debug, Clone)]
pub struct GenerationSummary {
    pub stop: StopReason,
    pub n_past: usize,
    /// Tokens produced by the sampler.
    pub sampled: usize,
    pub mem_per_token: usize,
    pub timings: Timings,
}

/// One generation session over an evaluator and a tokenizer.
pub struct Generation<'t, E, T: ?Sized> {
    evaluator: E,
    tokenizer: &'t T,
    config: GenerationConfig,
    gate: InteractionGate,
    sampler: Sampler,
    rng: StdRng,
    reverse_prompt: ReversePrompt,

    // Pending input: the prompt, then every splice. Only ever appended to.
    queue: Vec<TokenId>,
    n_prompt: usize,
    input_consumed: usize,

    embd: Vec<TokenId>,
    n_past: usize,
    remaining_tokens: i64,
    input_noecho: bool,
    history: HistoryWindow,
    logits: Vec<f32>,
    mem_per_token: usize,

    sampled: usize,
    finished: Option<StopReason>,
    timings: Timings,
}

impl<'t, E, T> Generation<'t, E, T>
where
    E: Evaluator,
    T: Tokenizer + ?Sized,
{
    /// Tokenize the prompts, clamp the budget to the context, and prime the
    /// evaluator.
    pub fn new(
        mut evaluator: E,
        tokenizer: &'t T,
        config: GenerationConfig,
        seed: u64,
        gate: InteractionGate,
    ) -> Result<Self> {
        if tokenizer.vocab_size() < PRIMING_BATCH.len() {
            return Err(GenerateError::Config(format!(
                "vocabulary needs at least {} entries (got {})",
                PRIMING_BATCH.len(),
                tokenizer.vocab_size()
            )));
        }

        let queue = tokenizer.tokenize(&config.prompt, true)?;
        let reverse_prompt = ReversePrompt::new(tokenizer.tokenize(&config.antiprompt, false)?);

        let n_ctx = evaluator.n_ctx() as i64;
        let remaining_tokens = i64::from(config.n_predict).min(n_ctx - queue.len() as i64);

        let mut logits = Vec::new();
        let mut mem_per_token = 0;
        evaluator.eval(
            config.n_threads,
            0,
            &PRIMING_BATCH,
            &mut logits,
            &mut mem_per_token,
        )?;
        tracing::debug!(mem_per_token, "evaluator primed");

        if config.interactive_start {
            gate.open();
        }

        Ok(Self {
            evaluator,
            tokenizer,
            gate,
            sampler: Sampler::new(config.sampling.clone()),
            rng: StdRng::seed_from_u64(seed),
            reverse_prompt,
            n_prompt: queue.len(),
            queue,
            input_consumed: 0,
            embd: Vec::new(),
            n_past: 0,
            remaining_tokens,
            input_noecho: false,
            history: HistoryWindow::new(config.repeat_last_n),
            logits,
            mem_per_token,
            sampled: 0,
            finished: None,
            timings: Timings::new(),
            config,
        })
    }

    /// Carry over timings started by the caller, e.g. to include load time.
    pub fn with_timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    /// Write the parameter and token dump.
    pub fn write_info<W: Write>(&self, err: &mut W) -> Result<()> {
        writeln!(err)?;
        writeln!(err, "main: n_predict = {}", self.remaining_tokens)?;
        writeln!(err, "main: prompt: '{}'", self.config.prompt)?;
        writeln!(err, "main: number of tokens in prompt = {}", self.n_prompt)?;
        self.write_tokens(err, self.prompt_tokens())?;
        writeln!(err)?;

        if self.config.interactive {
            writeln!(err, "main: interactive mode on.")?;
            if !self.reverse_prompt.is_empty() {
                writeln!(err, "main: reverse prompt: '{}'", self.config.antiprompt)?;
                writeln!(
                    err,
                    "main: number of tokens in reverse prompt = {}",
                    self.reverse_prompt.tokens().len()
                )?;
                self.write_tokens(err, self.reverse_prompt.tokens())?;
                writeln!(err)?;
            }
        }

        let s = self.sampler.config();
        writeln!(
            err,
            "sampling parameters: temp = {:.6}, top_k = {}, top_p = {:.6}, repeat_last_n = {}, repeat_penalty = {:.6}",
            s.temperature, s.top_k, s.top_p, self.config.repeat_last_n, s.repeat_penalty
        )?;

        if self.config.interactive {
            writeln!(err, "== Running in interactive mode. ==")?;
            if cfg!(unix) {
                writeln!(err, " - Press Ctrl+C to interject at any time.")?;
            }
            writeln!(err, " - Press Return to return control to LLaMa.")?;
            writeln!(
                err,
                " - If you want to submit another line, end your input in '\\'."
            )?;
        }
        write!(err, "\n\n")?;
        Ok(())
    }

    fn write_tokens<W: Write>(&self, err: &mut W, tokens: &[TokenId]) -> Result<()> {
        for &id in tokens {
            let piece = self.tokenizer.piece(id)?;
            writeln!(err, "{:6} -> '{}'", id, String::from_utf8_lossy(piece))?;
        }
        Ok(())
    }

    /// Run one iteration. Returns the stop reason once the loop is over.
    ///
    /// Generated text goes to `out`; `err` only receives the end-of-text marker.
    pub fn step<R: BufRead, W: Write, D: Write>(
        &mut self,
        input: &mut R,
        out: &mut W,
        err: &mut D,
    ) -> Result<Option<StopReason>> {
        if let Some(stop) = self.finished {
            return Ok(Some(stop));
        }
        if self.remaining_tokens <= 0 {
            self.finished = Some(StopReason::BudgetExhausted);
            return Ok(self.finished);
        }

        self.predict()?;

        if self.input_consumed >= self.queue.len() {
            self.sample_next();
        } else {
            self.drain_queue();
            if !self.input_noecho
                && self.config.use_color
                && self.input_consumed == self.queue.len()
            {
                write!(out, "{}", console::ANSI_COLOR_RESET)?;
            }
        }

        if !self.input_noecho {
            for &id in &self.embd {
                out.write_all(self.tokenizer.piece(id)?)?;
            }
            out.flush()?;
        }

        if self.config.interactive
            && self.input_consumed >= self.queue.len()
            && (self.reverse_prompt.matches(&self.history) || self.gate.is_interacting())
        {
            self.splice(input, out)?;
        }

        if self.embd.last() == Some(&EOS_TOKEN_ID) {
            writeln!(err, "{}", END_OF_TEXT_MARKER)?;
            self.finished = Some(StopReason::EndOfText);
        }

        Ok(self.finished)
    }

    /// Step until the loop stops, then finalize the timings.
    pub fn run<R: BufRead, W: Write, D: Write>(
        &mut self,
        input: &mut R,
        out: &mut W,
        err: &mut D,
    ) -> Result<GenerationSummary> {
        if self.config.use_color {
            write!(out, "{}", console::PROMPT)?;
        }

        let stop = loop {
            if let Some(stop) = self.step(input, out, err)? {
                break stop;
            }
        };

        if self.config.use_color {
            write!(out, "{}", console::ANSI_COLOR_RESET)?;
        }
        out.flush()?;

        self.timings.finish(self.n_past, self.mem_per_token);
        Ok(GenerationSummary {
            stop,
            n_past: self.n_past,
            sampled: self.sampled,
            mem_per_token: self.mem_per_token,
            timings: self.timings.clone(),
        })
    }

    fn predict(&mut self) -> Result<()> {
        if !self.embd.is_empty() {
            self.timings.time(Phase::Predict, || {
                self.evaluator.eval(
                    self.config.n_threads,
                    self.n_past,
                    &self.embd,
                    &mut self.logits,
                    &mut self.mem_per_token,
                )
            })?;
            tracing::debug!(n_past = self.n_past, batch = self.embd.len(), "evaluated batch");
        }
        self.n_past += self.embd.len();
        self.embd.clear();
        Ok(())
    }

    fn sample_next(&mut self) {
        let id = self.timings.time(Phase::Sample, || {
            let n_vocab = self.evaluator.n_vocab();
            let row = &self.logits[self.logits.len().saturating_sub(n_vocab)..];
            let id = self.sampler.sample(row, &self.history, &mut self.rng);
            self.history.push(id);
            id
        });

        self.embd.push(id);
        self.input_noecho = false;
        self.remaining_tokens -= 1;
        self.sampled += 1;
    }

    /// Move queued tokens into `embd`. The bound is checked after each push,
    /// so a batch may hold `n_batch + 1` tokens.
    fn drain_queue(&mut self) {
        while self.input_consumed < self.queue.len() {
            let id = self.queue[self.input_consumed];
            self.embd.push(id);
            self.history.push(id);
            self.input_consumed += 1;
            if self.embd.len() > self.config.n_batch {
                break;
            }
        }
    }

    fn splice<R: BufRead, W: Write>(&mut self, input: &mut R, out: &mut W) -> Result<()> {
        let n_read = input::read_user_input(
            input,
            out,
            self.tokenizer,
            self.config.use_color,
            &mut self.queue,
        )?;
        self.remaining_tokens -= n_read as i64;
        self.gate.close();
        self.input_noecho = true;
        tracing::debug!(
            tokens = n_read,
            remaining = self.remaining_tokens,
            "spliced user input"
        );
        Ok(())
    }

    pub fn remaining_tokens(&self) -> i64 {
        self.remaining_tokens
    }

    pub fn n_past(&self) -> usize {
        self.n_past
    }

    pub fn input_consumed(&self) -> usize {
        self.input_consumed
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// The tokenized prompt, BOS included.
    pub fn prompt_tokens(&self) -> &[TokenId] {
        &self.queue[..self.n_prompt]
    }

    /// Tokens waiting to be evaluated at the start of the next step.
    pub fn pending(&self) -> &[TokenId] {
        &self.embd
    }

    pub fn history(&self) -> &HistoryWindow {
        &self.history
    }

    pub fn reverse_prompt(&self) -> &ReversePrompt {
        &self.reverse_prompt
    }

    pub fn mem_per_token(&self) -> usize {
        self.mem_per_token
    }

    pub fn sampled(&self) -> usize {
        self.sampled
    }

    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }
}
