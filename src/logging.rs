//! Logger setup.
//!
//! Records go to stderr and are appended to `<log dir>/projects.log`. The
//! default level is `error`, or `debug` with `--debug`; `RUST_LOG` overrides
//! both.

use log::LevelFilter;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Log file name inside the log directory
pub const LOG_FILE: &str = "projects.log";

/// Writes every buffer to two sinks.
pub struct Tee<A, B> {
    first: A,
    second: B,
}

impl<A: Write, B: Write> Tee<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<A: Write, B: Write> Write for Tee<A, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.first.write_all(buf)?;
        self.second.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.first.flush()?;
        self.second.flush()
    }
}

pub fn level_filter(debug: bool) -> LevelFilter {
    if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Error
    }
}

/// Open `<log_dir>/projects.log` for appending, creating the directory.
pub fn open_log_file(log_dir: &Path) -> io::Result<File> {
    fs::create_dir_all(log_dir)?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(LOG_FILE))
}

/// Install the global logger. Falls back to stderr alone when the log file
/// cannot be opened.
pub fn init(debug: bool, log_dir: &Path) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level_filter(debug)).parse_default_env();

    let file_error = match open_log_file(log_dir) {
        Ok(file) => {
            builder.target(env_logger::Target::Pipe(Box::new(Tee::new(io::stderr(), file))));
            None
        }
        Err(e) => Some(e),
    };

    // A logger may already be installed when running inside tests
    if builder.try_init().is_err() {
        return;
    }
    if let Some(e) = file_error {
        log::warn!(
            "Cannot open log file in {}, logging to stderr only: {}",
            log_dir.display(),
            e
        );
    }
}
