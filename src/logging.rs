// Logging - turn the context's log flags into an env_logger sink
//
// The core only ever talks to the `log` facade. This is the one place that
// decides where records end up.

use env_logger::{Builder, Target};
use log::LevelFilter;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

/// Log flags that cross the context boundary.
#[derive(Debug, Clone)]
pub struct LogSettings {
    pub verbose: bool,
    pub quiet: bool,
    pub to_file: bool,
    pub file: PathBuf,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            verbose: false,
            quiet: false,
            to_file: false,
            file: PathBuf::from(concat!(env!("CARGO_PKG_NAME"), ".log")),
        }
    }
}

impl LogSettings {
    /// quiet wins over verbose.
    pub fn level(&self) -> LevelFilter {
        if self.quiet {
            LevelFilter::Off
        } else if self.verbose {
            LevelFilter::Trace
        } else {
            LevelFilter::Info
        }
    }
}

/// Writes every record to the log file and mirrors it to stderr.
struct Tee {
    file: File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write_all(buf)?;
        let _ = io::stderr().write_all(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()?;
        io::stderr().flush()
    }
}

/// Install the global logger.
///
/// Returns `Ok(false)` when some logger is already installed; that one is left
/// in place. `RUST_LOG` still overrides the level chosen from the flags.
pub fn try_init(settings: &LogSettings) -> io::Result<bool> {
    let mut builder = Builder::new();
    builder.filter_level(settings.level());
    builder.parse_default_env();

    if settings.to_file && !settings.quiet {
        let file = OpenOptions::new().create(true).append(true).open(&settings.file)?;
        builder.target(Target::Pipe(Box::new(Tee { file })));
    }

    let installed = builder.try_init().is_ok();
    if installed {
        log::debug!(
            "Initialized logging (verbose: {}, quiet: {}, log-to-file: {})",
            settings.verbose,
            settings.quiet,
            settings.to_file
        );
    }
    Ok(installed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_follows_flags() {
        let mut settings = LogSettings::default();
        assert_eq!(settings.level(), LevelFilter::Info);

        settings.verbose = true;
        assert_eq!(settings.level(), LevelFilter::Trace);

        settings.quiet = true;
        assert_eq!(settings.level(), LevelFilter::Off);
    }

    #[test]
    fn default_log_file_is_named_after_the_crate() {
        assert_eq!(LogSettings::default().file, PathBuf::from("swaploop.log"));
    }
}
