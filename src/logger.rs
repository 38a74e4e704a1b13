use indicatif::MultiProgress;
use indicatif_log_bridge::LogWrapper;
use log::{LevelFilter, Metadata, Record, SetLoggerError};

struct PlayerLogger {
    level: LevelFilter,
}

impl log::Log for PlayerLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!(
                "{} {} - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            );
        }
    }

    fn flush(&self) {}
}

/// Installs the logger behind a progress-bar aware bridge and returns the
/// `MultiProgress` that bars must be added to.
pub fn init(level: LevelFilter) -> Result<MultiProgress, SetLoggerError> {
    let multi = MultiProgress::new();
    LogWrapper::new(multi.clone(), PlayerLogger { level }).try_init()?;
    log::set_max_level(level);
    Ok(multi)
}
