pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod jetstream;
pub mod lifecycle;
pub mod logging;
pub mod options;
pub mod reporter;
pub mod tls;

use std::future::Future;

use clap::Parser;
use tracing::{info, warn};

use crate::config::Config;
use crate::dispatch::{CommitPolicy, Dispatcher};
use crate::error::Result;
use crate::jetstream::{read_loop, JetStream};
use crate::lifecycle::{enter, Phase, Session, SessionOutcome};
use crate::logging::setup_logger;
use crate::options::Options;
use crate::reporter::{spawn_rate_reporter, ConsoleReporter, MessageCounter};

// -----------------------------------------------------------------------------
// Entry point: connect, stream until interrupted or closed, exit
// -----------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let options = Options::parse();
    run(&options, interrupt()).await?;
    Ok(())
}

/// Startup errors are returned, not logged; `main` reports them once on exit.
async fn run<F>(options: &Options, shutdown: F) -> Result<SessionOutcome>
where
    F: Future<Output = ()>,
{
    let config = Config::load(options)?;
    setup_logger(&config.logging.level);
    info!("Starting with {}", config);

    enter(Phase::Connecting);
    let url = config.endpoint_url()?;
    let connection = JetStream::connect(&url, &config.tls).await?;
    info!("Connected to {}", connection.url());

    let counter = MessageCounter::new();
    let ticker = config
        .reporter
        .rate_enabled
        .then(|| spawn_rate_reporter(counter.clone(), config.rate_interval(), std::io::stdout()));

    let policy = CommitPolicy::from_include_updates(config.policy.include_updates);
    let dispatcher = Dispatcher::new(policy, ConsoleReporter::stdout());
    info!("Commit policy: {:?}", dispatcher.policy());

    let (sink, stream) = connection.split();
    let reader = tokio::spawn(read_loop(stream, dispatcher, counter));

    let outcome = Session::new(sink, reader, config.close_timeout())
        .run_until(shutdown)
        .await;
    info!(
        "Stopped after {:?} (reader drained: {})",
        outcome.trigger, outcome.drained
    );

    if let Some(ticker) = ticker {
        ticker.abort();
    }
    Ok(outcome)
}

/// Resolves on Ctrl-C. If the handler cannot be installed, never resolves.
async fn interrupt() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Unable to listen for interrupt signal: {}", e);
        std::future::pending::<()>().await;
    }
}
