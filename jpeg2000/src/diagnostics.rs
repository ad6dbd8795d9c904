use crate::error::Error;
use log::{debug, info, warn};

/// Receives the messages a codec engine emits during a single call.
pub trait DiagnosticSink {
    fn info(&mut self, message: &str);
    fn warning(&mut self, message: &str);
    fn error(&mut self, message: &str);
}

/// Routes engine messages to the `log` facade. Errors are kept so that they
/// end up in the failure reported to the caller.
#[derive(Debug, Default)]
pub struct LogSink {
    verbose: bool,
    errors: Vec<String>,
}

impl LogSink {
    pub fn new(verbose: bool) -> Self {
        LogSink {
            verbose,
            errors: vec![],
        }
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Engine error carrying `failure` followed by the collected messages.
    pub fn into_error(self, failure: &str) -> Error {
        if self.errors.is_empty() {
            return Error::Engine(failure.to_owned());
        }
        Error::Engine(format!("{}: {}", failure, self.errors.join("; ")))
    }
}

impl DiagnosticSink for LogSink {
    fn info(&mut self, message: &str) {
        if self.verbose {
            info!("{}", message.trim_end());
        }
    }

    fn warning(&mut self, message: &str) {
        warn!("{}", message.trim_end());
    }

    fn error(&mut self, message: &str) {
        debug!("engine error: {}", message.trim_end());
        self.errors.push(message.trim_end().to_owned());
    }
}
