use std::io::{self, Write};
use std::process::ExitCode;

use clap::Parser;
use llama_cli::gate::{install_sigint_handler, InteractionGate};
use llama_cli::{Generation, Params, Result};
use llama_engine::Evaluator;
use llama_runtime::{Phase, TinyModel, TinyModelConfig, Timings};
use llama_tokenizer::{Tokenizer, Vocab};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(io::stderr)
        .init();

    let params = match Params::try_parse() {
        Ok(params) => params,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    match run(params) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(mut params: Params) -> Result<()> {
    let mut timings = Timings::new();

    params.validate()?;
    let seed = params.resolve_seed();
    eprintln!("main: seed = {}", seed);
    params.resolve_prompt(&mut StdRng::seed_from_u64(seed))?;

    let (vocab, model) = timings.time(Phase::Load, || -> Result<_> {
        let vocab = match &params.model {
            Some(path) => Vocab::from_json_file(path)?,
            None => Vocab::byte_level(),
        };
        let model = TinyModel::new(TinyModelConfig::new(vocab.vocab_size(), params.ctx_size))?;
        Ok((vocab, model))
    })?;
    eprintln!("{}", timings.load_line());
    tracing::debug!(
        n_vocab = model.n_vocab(),
        n_ctx = model.n_ctx(),
        "model ready"
    );

    let config = params.generation_config();
    if config.interactive {
        install_sigint_handler()?;
    }

    let mut generation = Generation::new(
        model,
        &vocab,
        config,
        seed,
        InteractionGate::global(),
    )?
    .with_timings(timings);

    let stderr = io::stderr();
    generation.write_info(&mut stderr.lock())?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    let summary = generation.run(&mut stdin.lock(), &mut stdout.lock(), &mut io::stderr())?;

    let mut err = stderr.lock();
    write!(err, "\n\n")?;
    writeln!(err, "{}", summary.timings)?;
    writeln!(
        err,
        "system_info: n_threads = {} / {}",
        params.threads,
        num_cpus::get()
    )?;
    Ok(())
}
