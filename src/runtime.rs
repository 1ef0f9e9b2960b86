use evlog::{LogEventConsolePrinter, Logger};
use once_cell::sync::OnceCell;

static LOGGER: OnceCell<Logger> = OnceCell::new();

fn default_logger() -> Logger {
    let mut logger = Logger::default();
    logger.register(LogEventConsolePrinter::default());
    logger
}

/// Installs the process logger. Only the first call has any effect.
pub fn set_logger(logger: Logger) {
    let _ = LOGGER.set(logger);
}

pub fn get_logger() -> &'static Logger {
    LOGGER.get_or_init(default_logger)
}
