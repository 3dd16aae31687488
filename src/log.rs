//! Injectable tracing, replacing the "global tracing switch" the decoders
//! this crate is modeled on historically reached for.

/// A sink for decoder trace messages. Implementors typically forward to the
/// `log` crate's global logger; the default implementation is a no-op so
/// decoding never pays for tracing it has no use for.
pub trait Logger {
    /// A fine-grained trace, emitted at block/marker/chunk boundaries.
    fn trace(&self, msg: &str) {
        let _ = msg;
    }

    /// A condition worth a second look but not a decode failure.
    fn warn(&self, msg: &str) {
        let _ = msg;
    }
}

/// The default logger: discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogger;

impl Logger for NoopLogger {}

/// Forwards to the `log` crate's global logger at [`log::Level::Trace`] and
/// [`log::Level::Warn`] respectively.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdLogger;

impl Logger for StdLogger {
    fn trace(&self, msg: &str) {
        log::trace!("{msg}");
    }

    fn warn(&self, msg: &str) {
        log::warn!("{msg}");
    }
}
