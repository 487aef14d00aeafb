use std::path::PathBuf;

use simplelog::{ColorChoice, ConfigBuilder, LevelFilter, TermLogger, TerminalMode};

/// Install the stderr logger. Records from crates other than this library
/// and the `prefs-export` binary are dropped.
///
/// Best-effort: a second call (or a logger installed by a test harness)
/// leaves the existing logger in place.
pub fn init(debug: bool) {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let config = ConfigBuilder::new()
        .add_filter_allow_str("macprefs")
        .add_filter_allow_str("prefs_export")
        .set_target_level(LevelFilter::Off)
        .set_thread_level(LevelFilter::Off)
        .build();
    let _ = TermLogger::init(level, config, TerminalMode::Stderr, ColorChoice::Auto);
}

/// Log file the scheduled job redirects its output to:
/// ~/Library/Logs/macprefs/macprefs.log.
pub fn log_path() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join("Library/Logs")
            .join("macprefs")
            .join("macprefs.log"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_path_under_library_logs() {
        let Some(path) = log_path() else {
            return;
        };
        assert!(path.ends_with("Library/Logs/macprefs/macprefs.log"));
    }

    #[test]
    fn init_twice_is_harmless() {
        init(false);
        init(true);
    }
}
