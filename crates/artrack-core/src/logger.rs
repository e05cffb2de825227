//! Stderr logger for the tracking crates.
//!
//! Records from `artrack*` targets pass at the installed level; everything
//! else is capped at `warn`. Lines read `[elapsed LEVEL module] message`;
//! warnings and errors also carry their source location. With the `tracing`
//! feature, [`init_tracing`] installs a `tracing-subscriber` instead.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{Level, LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

const CRATE_PREFIX: &str = "artrack";

fn level_for_target(target: &str, level: LevelFilter) -> LevelFilter {
    if target.starts_with(CRATE_PREFIX) {
        level
    } else {
        level.min(LevelFilter::Warn)
    }
}

/// Last path segment of a module target, `artrack_tracking::events` -> `events`.
fn short_target(target: &str) -> &str {
    target.rsplit("::").next().unwrap_or(target)
}

struct TrackingLogger {
    level: LevelFilter,
    started: Instant,
}

impl Log for TrackingLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= level_for_target(metadata.target(), self.level)
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let elapsed = self.started.elapsed().as_secs_f64();
        let mut stderr = std::io::stderr().lock();
        let _ = match record.level() {
            Level::Error | Level::Warn => writeln!(
                stderr,
                "[{:8.3}s {:>5} {}] {} ({}:{})",
                elapsed,
                record.level(),
                short_target(record.target()),
                record.args(),
                record.file().unwrap_or("?"),
                record.line().unwrap_or(0)
            ),
            _ => writeln!(
                stderr,
                "[{:8.3}s {:>5} {}] {}",
                elapsed,
                record.level(),
                short_target(record.target()),
                record.args()
            ),
        };
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<TrackingLogger> = OnceLock::new();

/// Install the stderr logger; `level` applies to the tracking crates.
///
/// Only the first call installs a logger; later calls return `Ok(())`.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_none() {
        let logger = LOGGER.get_or_init(|| TrackingLogger {
            level,
            started: Instant::now(),
        });
        log::set_logger(logger)?;
        log::set_max_level(level);
    }
    Ok(())
}

#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,{CRATE_PREFIX}=info")));
    if json {
        let _ = fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .with_writer(std::io::stderr)
            .json()
            .flatten_event(true)
            .finish()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .with_writer(std::io::stderr)
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracking_targets_use_installed_level() {
        let level = LevelFilter::Debug;
        assert_eq!(level_for_target("artrack_tracking::controller", level), level);
        assert_eq!(level_for_target("artrack", level), level);
        assert_eq!(level_for_target("serde_json::de", level), LevelFilter::Warn);
        assert_eq!(
            level_for_target("serde_json::de", LevelFilter::Error),
            LevelFilter::Error
        );
    }

    #[test]
    fn short_target_keeps_last_segment() {
        assert_eq!(short_target("artrack_tracking::controller::pipeline"), "pipeline");
        assert_eq!(short_target("artrack"), "artrack");
    }
}
