use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{Instant, sleep};
use tracing::info;

use crate::errors::RestoreError;
use crate::progress::ProgressSink;

pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(30);
pub const STOP_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Handle to the external server process. Injected so the restore path never
/// touches process state directly and tests can substitute a fake.
#[async_trait]
pub trait ServerControl: Send + Sync {
    async fn is_running(&self) -> bool;

    /// Ask the server to shut down gracefully. Must be harmless when nothing
    /// is running.
    async fn request_stop(&self);
}

/// Request a stop and poll until the process is gone or the deadline passes.
/// Extraction must never start while the server may still hold handles on the
/// world directory, so a timeout here is fatal to the whole restore.
pub(crate) async fn stop_and_wait(
    control: &dyn ServerControl,
    timeout: Duration,
    poll_interval: Duration,
    progress: &dyn ProgressSink,
) -> Result<(), RestoreError> {
    if !control.is_running().await {
        return Ok(());
    }

    progress.emit_progress(0, "stopping server");
    control.request_stop().await;

    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        sleep(poll_interval).await;
        if !control.is_running().await {
            info!("server stopped, world directory released");
            return Ok(());
        }
    }

    Err(RestoreError::ServerWouldNotStop {
        timeout_secs: timeout.as_secs(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeControl {
        running: AtomicBool,
        stops_on_request: bool,
    }

    #[async_trait]
    impl ServerControl for FakeControl {
        async fn is_running(&self) -> bool {
            self.running.load(Ordering::SeqCst)
        }

        async fn request_stop(&self) {
            if self.stops_on_request {
                self.running.store(false, Ordering::SeqCst);
            }
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        messages: Mutex<Vec<String>>,
    }

    impl ProgressSink for RecordingSink {
        fn emit_progress(&self, _percent: u8, message: &str) {
            self.messages.lock().unwrap().push(message.to_string());
        }
        fn emit_completed(&self) {}
        fn emit_error(&self, _message: &str) {}
    }

    #[tokio::test]
    async fn returns_immediately_when_nothing_runs() {
        let control = FakeControl {
            running: AtomicBool::new(false),
            stops_on_request: true,
        };
        let sink = RecordingSink::default();
        stop_and_wait(
            &control,
            Duration::from_millis(50),
            Duration::from_millis(5),
            &sink,
        )
        .await
        .expect("no-op stop");
        assert!(sink.messages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn graceful_stop_is_observed_by_polling() {
        let control = FakeControl {
            running: AtomicBool::new(true),
            stops_on_request: true,
        };
        let sink = RecordingSink::default();
        stop_and_wait(
            &control,
            Duration::from_millis(200),
            Duration::from_millis(5),
            &sink,
        )
        .await
        .expect("stop observed");
        assert_eq!(sink.messages.lock().unwrap().as_slice(), ["stopping server"]);
    }

    #[tokio::test]
    async fn deadline_produces_timeout_error() {
        let control = FakeControl {
            running: AtomicBool::new(true),
            stops_on_request: false,
        };
        let sink = RecordingSink::default();
        let err = stop_and_wait(
            &control,
            Duration::from_millis(40),
            Duration::from_millis(5),
            &sink,
        )
        .await
        .expect_err("must time out");
        assert!(matches!(err, RestoreError::ServerWouldNotStop { .. }));
    }
}
