use chrono::prelude::*;
use log::{Level, Metadata, Record, SetLoggerError};

const TARGET: &str = "songdata";

pub struct Logger {
    level: Level,
}

/// Strips the crate prefix off a module path, `None` for foreign targets.
fn short_target(target: &str) -> Option<&str> {
    if !target.starts_with(TARGET) {
        return None;
    }

    let rest = &target[TARGET.len()..];
    if rest.is_empty() {
        Some(TARGET)
    } else if let Some(module) = rest.strip_prefix("::") {
        Some(module)
    } else {
        None
    }
}

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level && short_target(metadata.target()).is_some()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let target = match short_target(record.target()) {
            Some(t) => t,
            None => return,
        };

        eprintln!(
            "{} {:<5} [{}] {}",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            target,
            record.args()
        );
    }

    fn flush(&self) {}
}

pub fn init(level: Level) -> Result<(), SetLoggerError> {
    log::set_boxed_logger(Box::new(Logger { level }))?;
    log::set_max_level(level.to_level_filter());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Log;

    #[test]
    fn filters_foreign_targets() {
        assert_eq!(short_target("songdata"), Some("songdata"));
        assert_eq!(short_target("songdata::tree"), Some("tree"));
        assert_eq!(short_target("songdata_extra::x"), None);
        assert_eq!(short_target("rusqlite"), None);
    }

    #[test]
    fn respects_level() {
        let logger = Logger { level: Level::Info };
        let info = Metadata::builder().level(Level::Info).target("songdata::tree").build();
        let debug = Metadata::builder().level(Level::Debug).target("songdata::tree").build();

        assert!(logger.enabled(&info));
        assert!(!logger.enabled(&debug));
    }
}
