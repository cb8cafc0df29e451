use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use invoker::cli::{Cli, Command};
use invoker::config::InvokerConfig;
use invoker::driver::{InvocationDriver, RunOptions};
use invoker::{JobState, logging};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = InvokerConfig::load(cli.config.as_deref())?;
    logging::init(&config.log_level, cli.verbose);

    match cli.command {
        Command::Run {
            outcome,
            duration_ms,
            cancel_after_ms,
            fail_cancel,
        } => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(config.worker_threads)
                .enable_all()
                .build()?;

            let options = RunOptions {
                outcome: outcome.into(),
                duration: Duration::from_millis(
                    duration_ms.unwrap_or(config.simulated_duration_ms),
                ),
                cancel_after: cancel_after_ms.map(Duration::from_millis),
                fail_cancel,
            };

            let driver = InvocationDriver::new(runtime.handle().clone(), true);
            runtime.block_on(driver.run(options))?;
        }
        Command::States => {
            for state in JobState::ALL {
                let kind = if state.is_terminated() {
                    "terminal"
                } else {
                    "non-terminal"
                };
                println!("{:<12} {kind}", state.to_string());
            }
        }
    }

    Ok(())
}
