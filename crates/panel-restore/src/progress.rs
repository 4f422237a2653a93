/// Push channel the UI watches during a restore.
///
/// Contract for one session: percents are monotonically non-decreasing,
/// exactly one terminal call (`emit_completed` or `emit_error`) happens, and
/// nothing is emitted after it. [`RestoreSession::run`](crate::RestoreSession::run)
/// upholds this; sinks only need to forward.
pub trait ProgressSink: Send + Sync {
    fn emit_progress(&self, percent: u8, message: &str);
    fn emit_completed(&self);
    fn emit_error(&self, message: &str);
}

/// Sink for callers that do not stream progress anywhere.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit_progress(&self, _percent: u8, _message: &str) {}
    fn emit_completed(&self) {}
    fn emit_error(&self, _message: &str) {}
}
