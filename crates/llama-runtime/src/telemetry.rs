//! Wall-clock accounting for a generation run.
//!
//! [`Timings`] accumulates load, sample and predict durations and renders the
//! end-of-run summary printed to stderr.

use std::fmt;
use std::time::{Duration, Instant};

/// The phases a run spends time in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Load,
    Sample,
    Predict,
}

/// Accumulated timings for one run.
#[derive(Debug, Clone)]
pub struct Timings {
    start: Instant,
    load: Duration,
    sample: Duration,
    predict: Duration,
    n_past: usize,
    mem_per_token: usize,
}

impl Default for Timings {
    fn default() -> Self {
        Self::new()
    }
}

impl Timings {
    /// Start accounting. Total time is measured from here.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            load: Duration::ZERO,
            sample: Duration::ZERO,
            predict: Duration::ZERO,
            n_past: 0,
            mem_per_token: 0,
        }
    }

    pub fn record(&mut self, phase: Phase, elapsed: Duration) {
        match phase {
            Phase::Load => self.load += elapsed,
            Phase::Sample => self.sample += elapsed,
            Phase::Predict => self.predict += elapsed,
        }
    }

    /// Run `f` and charge its wall-clock time to `phase`.
    pub fn time<T>(&mut self, phase: Phase, f: impl FnOnce() -> T) -> T {
        let started = Instant::now();
        let out = f();
        self.record(phase, started.elapsed());
        out
    }

    /// Record the final context position and evaluator memory hint.
    pub fn finish(&mut self, n_past: usize, mem_per_token: usize) {
        self.n_past = n_past;
        self.mem_per_token = mem_per_token;
    }

    pub fn load_ms(&self) -> f64 {
        as_ms(self.load)
    }

    pub fn sample_ms(&self) -> f64 {
        as_ms(self.sample)
    }

    pub fn predict_ms(&self) -> f64 {
        as_ms(self.predict)
    }

    pub fn total_ms(&self) -> f64 {
        as_ms(self.start.elapsed())
    }

    /// Average predict time per evaluated position; 0 before anything was evaluated.
    pub fn predict_ms_per_token(&self) -> f64 {
        if self.n_past == 0 {
            0.0
        } else {
            self.predict_ms() / self.n_past as f64
        }
    }

    /// The one-line load report printed once the model is ready.
    pub fn load_line(&self) -> String {
        format!("main:     load time = {:8.2} ms", self.load_ms())
    }
}

fn as_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

impl fmt::Display for Timings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "main: mem per token = {:8} bytes", self.mem_per_token)?;
        writeln!(f, "main:   sample time = {:8.2} ms", self.sample_ms())?;
        writeln!(
            f,
            "main:  predict time = {:8.2} ms / {:.2} ms per token",
            self.predict_ms(),
            self.predict_ms_per_token()
        )?;
        write!(f, "main:    total time = {:8.2} ms", self.total_ms())
    }
}
