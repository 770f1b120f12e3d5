//! Process lifecycle:
//! `Connecting -> Streaming -> (ShutdownRequested | ConnectionLost) -> Draining -> Terminated`.
//!
//! Both exits from `Streaming` funnel into the same bounded drain, so a stuck
//! read can never hold the process open for longer than the close timeout.

use std::fmt::{self, Display};
use std::future::Future;
use std::time::Duration;

use futures::{Sink, SinkExt};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::jetstream::{send_close, StreamEnd};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connecting,
    Streaming,
    ShutdownRequested,
    ConnectionLost,
    Draining,
    Terminated,
}

impl Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Connecting => "connecting",
            Phase::Streaming => "streaming",
            Phase::ShutdownRequested => "shutdown-requested",
            Phase::ConnectionLost => "connection-lost",
            Phase::Draining => "draining",
            Phase::Terminated => "terminated",
        };
        write!(f, "{}", name)
    }
}

pub fn enter(phase: Phase) {
    debug!(%phase, "lifecycle");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Interrupted,
    ConnectionLost,
}

#[derive(Debug)]
pub struct SessionOutcome {
    pub trigger: Trigger,
    /// The read loop finished on its own rather than being cut off by the timeout.
    pub drained: bool,
    pub end: Option<StreamEnd>,
}

/// The streaming part of the lifecycle: a running read loop plus the write half
/// used to close it.
pub struct Session<Si> {
    sink: Si,
    reader: JoinHandle<StreamEnd>,
    close_timeout: Duration,
}

impl<Si> Session<Si>
where
    Si: Sink<Message> + Unpin,
    Si::Error: Display,
{
    pub fn new(sink: Si, reader: JoinHandle<StreamEnd>, close_timeout: Duration) -> Self {
        enter(Phase::Streaming);
        Self {
            sink,
            reader,
            close_timeout,
        }
    }

    /// Runs until the read loop ends or `shutdown` resolves, whichever is first.
    pub async fn run_until<F>(mut self, shutdown: F) -> SessionOutcome
    where
        F: Future<Output = ()>,
    {
        let trigger = tokio::select! {
            joined = &mut self.reader => {
                enter(Phase::ConnectionLost);
                let end = joined.map_err(|e| warn!("read loop task failed: {}", e)).ok();
                enter(Phase::Draining);
                // Pushes out the close reply queued when the peer's close frame was read.
                match tokio::time::timeout(self.close_timeout, self.sink.flush()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => debug!("flush after remote close: {}", e),
                    Err(_) => warn!("close reply not flushed within {:?}", self.close_timeout),
                }
                enter(Phase::Terminated);
                return SessionOutcome { trigger: Trigger::ConnectionLost, drained: true, end };
            }
            _ = shutdown => Trigger::Interrupted,
        };

        // The close handshake and the drain share one deadline.
        let deadline = Instant::now() + self.close_timeout;

        enter(Phase::ShutdownRequested);
        info!("Received interrupt signal, closing connection...");
        if tokio::time::timeout_at(deadline, send_close(&mut self.sink, "")).await.is_err() {
            warn!("close frame not sent within {:?}", self.close_timeout);
        }

        enter(Phase::Draining);
        let (drained, end) = match tokio::time::timeout_at(deadline, &mut self.reader).await {
            Ok(joined) => (true, joined.map_err(|e| warn!("read loop task failed: {}", e)).ok()),
            Err(_) => {
                warn!("read loop did not finish within {:?}; abandoning it", self.close_timeout);
                self.reader.abort();
                (false, None)
            }
        };

        enter(Phase::Terminated);
        SessionOutcome { trigger, drained, end }
    }
}
