use cfgimport_core::{io, paths};
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Events on this target go to the log file only.
pub const FILE_ONLY: &str = "cfgimport::file_only";

/// Console layer on stderr plus, when `to_file` is set, a plain-text layer
/// appending to `logs/log-{date}.txt` under `dir`. `RUST_LOG` overrides the
/// console level.
pub fn init(dir: &Path, console_level: tracing::Level, to_file: bool) {
    let console_filter = EnvFilter::from_default_env()
        .add_directive(console_level.into())
        .add_directive(
            format!("{FILE_ONLY}=off")
                .parse()
                .unwrap_or_else(|_| console_level.into()),
        );
    let console = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .with_filter(console_filter);

    let (file, file_error) = match to_file.then(|| open_log_file(dir)) {
        None => (None, None),
        Some(Ok(f)) => (Some(f), None),
        Some(Err(e)) => (None, Some(e)),
    };
    let file_layer = file.map(|f| {
        tracing_subscriber::fmt::layer()
            .with_writer(Mutex::new(f))
            .with_ansi(false)
            .with_target(false)
            .with_filter(LevelFilter::INFO)
    });

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .init();

    if let Some(e) = file_error {
        tracing::warn!("logging to console only: {e}");
    }
}

fn open_log_file(dir: &Path) -> anyhow::Result<File> {
    let date = chrono::Local::now().format("%Y-%m-%d").to_string();
    io::ensure_dir(&paths::logs_dir(dir))?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(paths::log_file(dir, &date))?;
    Ok(file)
}
