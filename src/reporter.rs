use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::event::Operation;

// -----------------------------------------------------------------------------
// Reports: the fields extracted from one event
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    Post {
        did: String,
        time_us: i64,
        operation: Operation,
        collection: String,
        record_key: String,
        text: String,
        created_at: OffsetDateTime,
    },
    Identity {
        did: String,
        time_us: i64,
        handle: String,
        display_name: String,
        description: String,
        sequence: i64,
        time: String,
    },
    Account {
        did: String,
        time_us: i64,
        active: bool,
        sequence: i64,
        time: String,
    },
}

impl Report {
    pub fn did(&self) -> &str {
        match self {
            Report::Post { did, .. } | Report::Identity { did, .. } | Report::Account { did, .. } => did,
        }
    }
}

/// Renders a microsecond timestamp as RFC 3339, falling back to the raw number.
pub fn format_time_us(time_us: i64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(time_us) * 1_000)
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_else(|| format!("{time_us}us"))
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Report::Post {
                did,
                time_us,
                operation,
                collection,
                record_key,
                text,
                created_at,
            } => {
                let verb = match operation {
                    Operation::Update => "Updated",
                    _ => "Created",
                };
                let created = created_at
                    .format(&Rfc3339)
                    .unwrap_or_else(|_| created_at.to_string());
                writeln!(f, "\n--- Post {verb} ---")?;
                writeln!(f, "DID: {did}")?;
                writeln!(f, "Event Time: {}", format_time_us(*time_us))?;
                writeln!(f, "Collection: {collection}")?;
                writeln!(f, "Record Key: {record_key}")?;
                writeln!(f, "Post Text: {text}")?;
                writeln!(f, "Post Created At: {created}")
            }
            Report::Identity {
                did,
                time_us,
                handle,
                display_name,
                description,
                sequence,
                time,
            } => {
                writeln!(f, "\n--- Identity Update ---")?;
                writeln!(f, "DID: {did}")?;
                writeln!(f, "Event Time: {}", format_time_us(*time_us))?;
                writeln!(f, "Handle: {handle}")?;
                writeln!(f, "Display Name: {display_name}")?;
                writeln!(f, "Description: {description}")?;
                writeln!(f, "Sequence: {sequence}")?;
                writeln!(f, "Time: {time}")
            }
            Report::Account {
                did,
                time_us,
                active,
                sequence,
                time,
            } => {
                writeln!(f, "\n--- Account Update ---")?;
                writeln!(f, "DID: {did}")?;
                writeln!(f, "Event Time: {}", format_time_us(*time_us))?;
                writeln!(f, "Active: {active}")?;
                writeln!(f, "Sequence: {sequence}")?;
                writeln!(f, "Time: {time}")
            }
        }
    }
}

// -----------------------------------------------------------------------------
// Reporter sinks
// -----------------------------------------------------------------------------

/// Receives reports in arrival order.
pub trait Reporter: Send {
    fn report(&mut self, report: &Report);
}

/// Collecting reporter, handy when the caller wants the reports back.
impl Reporter for Vec<Report> {
    fn report(&mut self, report: &Report) {
        self.push(report.clone());
    }
}

pub struct ConsoleReporter<W: Write + Send = io::Stdout> {
    out: W,
}

impl ConsoleReporter {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> ConsoleReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> Reporter for ConsoleReporter<W> {
    fn report(&mut self, report: &Report) {
        if let Err(e) = write!(self.out, "{report}").and_then(|_| self.out.flush()) {
            warn!("Failed to write report for {}: {}", report.did(), e);
        }
    }
}

// -----------------------------------------------------------------------------
// Message rate
// -----------------------------------------------------------------------------

/// Count of successfully decoded messages, shared between the read loop and the ticker.
#[derive(Debug, Clone, Default)]
pub struct MessageCounter(Arc<AtomicU64>);

impl MessageCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn load(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

pub struct RateMeter {
    counter: MessageCounter,
    last: u64,
}

impl RateMeter {
    pub fn new(counter: MessageCounter) -> Self {
        let last = counter.load();
        Self { counter, last }
    }

    /// Messages counted since the previous sample.
    pub fn sample(&mut self) -> u64 {
        let current = self.counter.load();
        let delta = current.saturating_sub(self.last);
        self.last = current;
        delta
    }
}

/// Scales a per-interval delta to a per-second figure.
pub fn per_second(delta: u64, interval: Duration) -> u64 {
    let millis = interval.as_millis().max(1);
    ((u128::from(delta) * 1_000) / millis) as u64
}

/// Writes `Messages per second: N` to `out` once per interval until aborted.
///
/// Write failures (a closed stdout, say) are logged; the ticker keeps sampling.
pub fn spawn_rate_reporter<W>(counter: MessageCounter, interval: Duration, mut out: W) -> JoinHandle<()>
where
    W: Write + Send + 'static,
{
    tokio::spawn(async move {
        let mut meter = RateMeter::new(counter);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let rate = per_second(meter.sample(), interval);
            debug!(rate, "rate sample");
            if let Err(e) = writeln!(out, "Messages per second: {}", rate).and_then(|_| out.flush()) {
                warn!("Failed to write message rate: {}", e);
            }
        }
    })
}
