use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::fs;
use tracing::{info, warn};

use crate::errors::RestoreError;
use crate::guard::{self, DEFAULT_STOP_TIMEOUT, STOP_POLL_INTERVAL, ServerControl};
use crate::plan::RestorePlan;
use crate::progress::ProgressSink;
use crate::unzip;

/// Where a restore session currently stands. Transitions are one-directional;
/// a failed session stays failed and a new request starts a fresh session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestorePhase {
    Idle,
    StoppingServer,
    QuarantiningWorld,
    Extracting { applied: usize, total: usize },
    Completed,
    Failed,
}

/// One end-to-end restore of a single target archive.
///
/// The session owns the world directory for its whole lifetime: the caller
/// must not accept another restore, or restart the server, until [`run`]
/// returns. There is no cancellation once quarantining has begun — an
/// interrupted world swap is worse than a slow one.
///
/// [`run`]: RestoreSession::run
pub struct RestoreSession<'a> {
    control: &'a dyn ServerControl,
    progress: &'a dyn ProgressSink,
    world_dir: PathBuf,
    stop_timeout: Duration,
    poll_interval: Duration,
    phase: RestorePhase,
}

impl<'a> RestoreSession<'a> {
    pub fn new(
        world_dir: PathBuf,
        control: &'a dyn ServerControl,
        progress: &'a dyn ProgressSink,
    ) -> Self {
        Self {
            control,
            progress,
            world_dir,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            poll_interval: STOP_POLL_INTERVAL,
            phase: RestorePhase::Idle,
        }
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn phase(&self) -> &RestorePhase {
        &self.phase
    }

    /// Drive the session to a terminal state. Exactly one terminal sink event
    /// is emitted — `completed` on success, `error` on failure — and no
    /// progress follows it.
    pub async fn run(&mut self, plan: &RestorePlan) -> Result<(), RestoreError> {
        match self.execute(plan).await {
            Ok(()) => {
                self.phase = RestorePhase::Completed;
                self.progress.emit_completed();
                Ok(())
            }
            Err(err) => {
                self.phase = RestorePhase::Failed;
                warn!("restore of {} failed: {err}", plan.target.name);
                self.progress.emit_error(&err.to_string());
                Err(err)
            }
        }
    }

    async fn execute(&mut self, plan: &RestorePlan) -> Result<(), RestoreError> {
        self.phase = RestorePhase::StoppingServer;
        guard::stop_and_wait(
            self.control,
            self.stop_timeout,
            self.poll_interval,
            self.progress,
        )
        .await?;
        self.progress.emit_progress(10, "server is down");

        self.phase = RestorePhase::QuarantiningWorld;
        if fs::try_exists(&self.world_dir).await? {
            let quarantine = quarantine_path(&self.world_dir);
            // Atomic rename: either the whole directory moves or nothing does.
            fs::rename(&self.world_dir, &quarantine)
                .await
                .map_err(RestoreError::QuarantineFailed)?;
            let kept = quarantine
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            info!("previous world kept as {kept}");
            self.progress
                .emit_progress(20, &format!("previous world kept as {kept}"));
        }
        fs::create_dir_all(&self.world_dir).await?;
        self.progress.emit_progress(30, "created empty world directory");

        let total = plan.apply_sequence.len();
        for (idx, archive) in plan.apply_sequence.iter().enumerate() {
            self.phase = RestorePhase::Extracting { applied: idx, total };
            info!("extracting ({}/{}): {}", idx + 1, total, archive.name);
            unzip::extract_into(&archive.path, &self.world_dir)
                .await
                .map_err(|reason| RestoreError::ExtractionFailed {
                    archive: archive.name.clone(),
                    reason,
                })?;
            let percent = 30 + (60 * (idx + 1) / total) as u8;
            self.progress.emit_progress(
                percent,
                &format!("extracted ({}/{}): {}", idx + 1, total, archive.name),
            );
        }

        self.progress
            .emit_progress(100, "restore complete, server can be started");
        info!("restore of {} complete", plan.target.name);
        Ok(())
    }
}

/// Sibling of the world directory, e.g. `world_bak_1761400000000`. Never
/// deleted by the daemon; the operator cleans quarantines up manually.
fn quarantine_path(world_dir: &Path) -> PathBuf {
    let base = world_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "world".to_string());
    world_dir.with_file_name(format!("{base}_bak_{}", now_millis()))
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
