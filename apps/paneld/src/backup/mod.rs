use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use tracing::error;

use panel_core::proto::{BackupEntry, ErrorCode, Event, Response, RpcError};
use panel_restore::{
    ArchiveStore, ArchiveTier, BackupArchive, ProgressSink, RestoreSession, ServerControl, plan,
};

use crate::config::PanelConfig;
use crate::supervisor::{self, EventBus, LogStore, SharedState};

pub async fn list_backups(config: &PanelConfig) -> Result<Response, RpcError> {
    let store = ArchiveStore::new(&config.backup_root());
    let archives = store
        .list()
        .await
        .map_err(|err| io_error(format!("backup scan failed: {err}")))?;

    Ok(Response::Backups {
        archives: archives.iter().map(to_entry).collect(),
    })
}

fn to_entry(archive: &BackupArchive) -> BackupEntry {
    BackupEntry {
        name: archive.name.clone(),
        tier: archive.tier.dir_name().to_string(),
        kind: archive.kind.label().to_string(),
        size_bytes: archive.size_bytes,
        modified_at_ms: archive.modified_at_ms,
    }
}

/// Ask the backup mod on the running server to take a backup. The mod owns
/// archive production; the panel only triggers it.
pub async fn create_backup(state: &SharedState) -> Result<Response, RpcError> {
    supervisor::send_line(state, "backup start").await?;
    let logs = {
        let guard = state.lock().await;
        guard.logs.clone()
    };
    logs.push_system("> backup start".to_string());
    Ok(Response::BackupStarted {})
}

/// Accept a restore request: resolve and plan up front, then run the session
/// in the background. The response goes out before any destructive work;
/// progress and the terminal outcome arrive on the event stream.
pub async fn start_restore(
    config: &PanelConfig,
    state: &SharedState,
    name: &str,
    tier: &str,
) -> Result<Response, RpcError> {
    let Some(tier) = ArchiveTier::parse(tier) else {
        return Err(RpcError {
            code: ErrorCode::BadRequest,
            message: format!("unknown backup tier: {tier}"),
            details: Default::default(),
        });
    };

    let (restore_active, logs, events) = {
        let guard = state.lock().await;
        (
            guard.restore_active.clone(),
            guard.logs.clone(),
            guard.events.clone(),
        )
    };

    // One session at a time; a second request is rejected, never queued.
    if restore_active
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Err(RpcError {
            code: ErrorCode::RestoreInProgress,
            message: "a restore is already running".into(),
            details: Default::default(),
        });
    }

    // Pre-flight while the server is still up: a planning failure must never
    // stop the server, let alone touch the world directory.
    let plan = match preflight(config, name, tier).await {
        Ok(plan) => plan,
        Err(err) => {
            restore_active.store(false, Ordering::SeqCst);
            return Err(err);
        }
    };

    logs.push_system(format!("restoring backup {}", plan.target.name));

    let world_dir = config.world_dir();
    let stop_timeout = Duration::from_secs(config.stop_timeout_secs);
    let control = SupervisorControl {
        state: state.clone(),
    };
    let sink = EventSink { events, logs };
    tokio::spawn(async move {
        let mut session = RestoreSession::new(world_dir, &control, &sink)
            .with_stop_timeout(stop_timeout);
        if let Err(err) = session.run(&plan).await {
            error!("restore failed: {err}");
        }
        restore_active.store(false, Ordering::SeqCst);
    });

    Ok(Response::RestoreStarted {})
}

async fn preflight(
    config: &PanelConfig,
    name: &str,
    tier: ArchiveTier,
) -> Result<panel_restore::RestorePlan, RpcError> {
    let store = ArchiveStore::new(&config.backup_root());
    let all = store
        .list()
        .await
        .map_err(|err| io_error(format!("backup scan failed: {err}")))?;

    let target = all
        .iter()
        .find(|a| a.name == name && a.tier == tier)
        .cloned()
        .ok_or_else(|| RpcError {
            code: ErrorCode::BackupNotFound,
            message: format!("backup {name} not found"),
            details: Default::default(),
        })?;

    plan(&target, &all).map_err(|err| RpcError {
        code: ErrorCode::NoBaseFullBackup,
        message: err.to_string(),
        details: Default::default(),
    })
}

/// The restore core's view of the supervised java process.
struct SupervisorControl {
    state: SharedState,
}

#[async_trait]
impl ServerControl for SupervisorControl {
    async fn is_running(&self) -> bool {
        let mut guard = self.state.lock().await;
        supervisor::refresh_child_status(&mut guard);
        guard.is_running()
    }

    async fn request_stop(&self) {
        // Already-stopped is fine; the guard re-checks liveness either way.
        let _ = supervisor::send_line(&self.state, "stop").await;
    }
}

/// Fans restore progress out to subscribed clients and mirrors it into the
/// operator console.
struct EventSink {
    events: EventBus,
    logs: LogStore,
}

impl ProgressSink for EventSink {
    fn emit_progress(&self, percent: u8, message: &str) {
        self.events.publish(Event::RestoreProgress {
            percent,
            message: message.to_string(),
        });
        self.logs.push_system(format!("[restore] {message}"));
    }

    fn emit_completed(&self) {
        self.events.publish(Event::RestoreCompleted {});
        self.logs
            .push_system("[restore] done, start the server when ready".to_string());
    }

    fn emit_error(&self, message: &str) {
        self.events.publish(Event::RestoreError {
            message: message.to_string(),
        });
        self.logs.push_system(format!("[restore] failed: {message}"));
    }
}

fn io_error(message: impl Into<String>) -> RpcError {
    RpcError {
        code: ErrorCode::IoError,
        message: message.into(),
        details: Default::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::ServerState;
    use std::sync::Arc;
    use std::time::{SystemTime, UNIX_EPOCH};
    use tokio::sync::Mutex;

    fn test_state() -> SharedState {
        let logs = LogStore::new(100);
        let events = EventBus::new();
        Arc::new(Mutex::new(ServerState::new(logs, events)))
    }

    fn test_config(prefix: &str) -> PanelConfig {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        PanelConfig {
            mc_dir: std::env::temp_dir().join(format!("paneld-{prefix}-{nanos}")),
            ..PanelConfig::default()
        }
    }

    #[tokio::test]
    async fn second_restore_request_is_rejected() {
        let state = test_state();
        {
            let guard = state.lock().await;
            guard.restore_active.store(true, Ordering::SeqCst);
        }
        let config = test_config("busy");

        let err = start_restore(&config, &state, "x-full.zip", "snapshots")
            .await
            .expect_err("must reject while active");
        assert_eq!(err.code, ErrorCode::RestoreInProgress);
    }

    #[tokio::test]
    async fn unknown_tier_is_a_bad_request() {
        let state = test_state();
        let config = test_config("tier");

        let err = start_restore(&config, &state, "x-full.zip", "weekly")
            .await
            .expect_err("must reject unknown tier");
        assert_eq!(err.code, ErrorCode::BadRequest);
    }

    #[tokio::test]
    async fn unknown_archive_fails_preflight_and_releases_the_session() {
        let state = test_state();
        let config = test_config("missing");

        let err = start_restore(&config, &state, "nope-full.zip", "snapshots")
            .await
            .expect_err("must reject unknown archive");
        assert_eq!(err.code, ErrorCode::BackupNotFound);

        // Pre-flight failure must release the session slot.
        let active = {
            let guard = state.lock().await;
            guard.restore_active.load(Ordering::SeqCst)
        };
        assert!(!active);
    }

    #[tokio::test]
    async fn partial_without_base_is_rejected_before_any_work() {
        let config = test_config("no-base");
        let diff_dir = config.backup_root().join("world").join("differential");
        std::fs::create_dir_all(&diff_dir).expect("create differential dir");
        std::fs::write(
            diff_dir.join("backup_2025-10-25_15-00-00-partial.zip"),
            b"zip bytes",
        )
        .expect("write partial");

        let state = test_state();
        let err = start_restore(
            &config,
            &state,
            "backup_2025-10-25_15-00-00-partial.zip",
            "differential",
        )
        .await
        .expect_err("partial with no base must fail pre-flight");
        assert_eq!(err.code, ErrorCode::NoBaseFullBackup);

        // Nothing was quarantined or created.
        assert!(!config.world_dir().exists());

        let _ = std::fs::remove_dir_all(&config.mc_dir);
    }
}
