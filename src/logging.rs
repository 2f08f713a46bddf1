use std::path::Path;

use chrono::{
    DateTime,
    Local,
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt,
    prelude::*,
    EnvFilter,
};

/// `mapvote-20240101-1200.log`; one file per process start
pub fn log_file_name(started: DateTime<Local>) -> String {
    format!("mapvote-{}.log", started.format("%Y%m%d-%H%M"))
}

/// Logs to stdout, filtered by `RUST_LOG` (default `info`). With `log_dir` the same events are also
/// written to a timestamped file in that directory; keep the returned guard alive or the tail of
/// the file is lost.
pub fn init_logging(log_dir: Option<&Path>) -> color_eyre::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::never(dir, log_file_name(Local::now()));
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init()?;
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn file_name_carries_the_start_minute() {
        let started = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 59).unwrap();
        assert_eq!(log_file_name(started), "mapvote-20240309-0705.log");
    }
}
