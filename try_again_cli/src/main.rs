use anyhow::{Error, bail};
use clap::Parser;
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use try_again::{AbortController, ExecutionLog, wrap};

mod command;
mod settings;

use command::{CommandError, CommandSpec};
use settings::Settings;

#[derive(Parser)]
#[clap(about, version, author)]
struct Args {
    /// Path to the config file
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Maximum number of retries, overrides the config file
    #[clap(short, long)]
    retries: Option<u32>,

    /// Time budget in milliseconds, overrides the config file
    #[clap(long)]
    total_timeout: Option<u64>,

    /// Command to run, followed by its arguments
    #[clap(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();

    let args = Args::parse();
    let mut settings = match &args.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(retries) = args.retries {
        settings.retry.retries = retries;
    }
    if let Some(timeout) = args.total_timeout {
        settings.retry.total_timeout = timeout;
    }

    let Some(spec) = CommandSpec::new(&args.command, settings.success_codes()) else {
        bail!("No command given");
    };

    // stop retrying on ctrl-c
    let interrupt = AbortController::new();
    settings.retry.signal = Some(Arc::new(interrupt.clone()));
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, not retrying any more");
            interrupt.abort("interrupted");
        }
    });

    let retryable = wrap(|spec: CommandSpec| spec.attempt()).with_options(settings.retry);
    let result = retryable.call(spec).await;
    report(&retryable.executions());

    match result {
        Ok(code) => {
            info!("Command succeeded with code {}", code);
            Ok(())
        }
        Err(e) => {
            error!("Giving up: {}", e);
            Err(e.into())
        }
    }
}

fn report(log: &ExecutionLog<CommandSpec, i32, CommandError>) {
    log.with_records(|records| {
        for (i, r) in records.iter().enumerate() {
            let outcome = match &r.outcome {
                Ok(code) => format!("exit code {}", code),
                Err(e) => e.to_string(),
            };
            let next = match r.decision.as_ref().and_then(|d| d.delay()) {
                Some(delay) => format!(", retrying in {:?}", delay),
                None => String::new(),
            };
            info!(
                "Attempt {}: {} after {:?}{}",
                i + 1,
                outcome,
                r.duration(),
                next
            );
        }
    });
}
