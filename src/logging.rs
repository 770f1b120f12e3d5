use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace, Info, Debug, Warn, Error
}
impl LogLevel {
    pub fn to_log_level(&self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "error" => LogLevel::Error,
            "warn" => LogLevel::Warn,
            "info" => LogLevel::Info,
            "debug" => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

pub struct Logger;

impl Logger {
    /// Install the global subscriber. Logs go to stderr so stdout carries only reports.
    /// Returns false when a subscriber is already installed.
    pub fn init(level: LogLevel) -> bool {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level.to_log_level())
            .with_writer(std::io::stderr)
            .with_target(false)
            .finish();

        tracing::subscriber::set_global_default(subscriber).is_ok()
    }
}

pub fn setup_logger(level: &str) -> bool {
    Logger::init(LogLevel::from_str(level))
}
