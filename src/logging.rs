use std::path::Path;

use log::LevelFilter;
use log4rs::{
    append::console::ConsoleAppender,
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
    Config,
};

use crate::error::{Error, Result};

/// Pattern used when no logging config file is available.
const FALLBACK_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} {h({l:<5})} {t} - {m}{n}";

/// Set up logging from a log4rs YAML file, falling back to the console at
/// `Info` if the file cannot be used.
pub fn init(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    match log4rs::init_file(path, Default::default()) {
        Ok(()) => {
            info!("Initialised logging from {}", path.display());
            Ok(())
        }
        Err(file_err) => {
            init_console(LevelFilter::Info)?;
            warn!("Could not use {}: {file_err}", path.display());
            info!("Initialised console logging");
            Ok(())
        }
    }
}

/// Log to stderr at `level`.
pub fn init_console(level: LevelFilter) -> Result<()> {
    let stderr = ConsoleAppender::builder()
        .target(log4rs::append::console::Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(FALLBACK_PATTERN)))
        .build();
    let config = Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(Root::builder().appender("stderr").build(level))
        .map_err(|e| Error::Logging(e.to_string()))?;
    log4rs::init_config(config).map_err(|e| Error::Logging(e.to_string()))?;
    Ok(())
}
