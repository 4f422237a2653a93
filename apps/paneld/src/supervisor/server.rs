use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::time::{Duration, sleep, timeout};
use tracing::info;

use panel_core::proto::{
    DaemonStatus, ErrorCode, Event, ExitInfo, LogStream, Response, RpcError, ServerStatus,
};

use crate::config::PanelConfig;
use super::logs::LogStore;
use super::monitor::ensure_monitor;
use super::state::{ServerState, SharedState};
use super::util::now_millis;

pub async fn build_status(daemon_start_ms: u64, state: &SharedState) -> (DaemonStatus, ServerStatus) {
    let mut guard = state.lock().await;
    refresh_child_status(&mut guard);

    let daemon = DaemonStatus {
        daemon_version: env!("CARGO_PKG_VERSION").to_string(),
        protocol_version: panel_core::PROTOCOL_VERSION,
        pid: std::process::id() as i32,
        uptime_ms: now_millis().saturating_sub(daemon_start_ms),
    };

    (daemon, guard.status.clone())
}

pub async fn start_server(config: &PanelConfig, state: SharedState) -> Result<Response, RpcError> {
    {
        let mut guard = state.lock().await;
        refresh_child_status(&mut guard);
        if guard.is_running() {
            return Err(RpcError {
                code: ErrorCode::ServerAlreadyRunning,
                message: "server already running".into(),
                details: Default::default(),
            });
        }
    }

    // Hold the lifecycle lock so start and stop never interleave.
    let lifecycle_lock = {
        let guard = state.lock().await;
        guard.lifecycle_lock.clone()
    };
    let Ok(_held) = timeout(Duration::from_secs(5), lifecycle_lock.lock()).await else {
        return Err(internal("another lifecycle operation in progress"));
    };

    ensure_eula(&config.mc_dir)
        .await
        .map_err(|err| io_error(format!("failed to accept eula: {err}")))?;

    let (logs, events) = {
        let guard = state.lock().await;
        (guard.logs.clone(), guard.events.clone())
    };
    logs.push_system("--- starting server ---".to_string());

    let mut child = spawn_server(config, logs.clone())
        .await
        .map_err(|err| internal(format!("failed to start server: {err}")))?;

    let stdin = child.stdin.take();
    let pid = child.id().unwrap_or_default() as i32;
    let started_at_ms = now_millis();
    let status = ServerStatus::Running { pid, started_at_ms };

    {
        let mut guard = state.lock().await;
        guard.child = Some(child);
        guard.stdin = stdin;
        guard.last_start_ms = Some(started_at_ms);
        guard.status = status.clone();
    }

    events.publish(Event::Status(status));
    logs.push_system(format!(
        "server started: pid={pid} dir={}",
        config.mc_dir.display()
    ));

    ensure_monitor(state.clone()).await;

    Ok(Response::Started { pid, started_at_ms })
}

pub async fn stop_server(force: bool, state: SharedState) -> Result<Response, RpcError> {
    let lifecycle_lock = {
        let guard = state.lock().await;
        guard.lifecycle_lock.clone()
    };
    let Ok(_held) = timeout(Duration::from_secs(5), lifecycle_lock.lock()).await else {
        return Err(internal("another lifecycle operation in progress"));
    };

    {
        let mut guard = state.lock().await;
        refresh_child_status(&mut guard);
        if guard.child.is_none() {
            return Err(RpcError {
                code: ErrorCode::ServerNotRunning,
                message: "server not running".into(),
                details: Default::default(),
            });
        }
    }

    // Graceful first: the `stop` console command saves the world on the way out.
    let _ = send_line(&state, "stop").await;

    let (child, logs, events) = {
        let mut guard = state.lock().await;
        guard.stdin = None;
        (guard.child.take(), guard.logs.clone(), guard.events.clone())
    };

    let mut exit_info = ExitInfo { code: None, signal: None };
    if let Some(mut child) = child {
        let mut exited = false;
        if !force {
            info!("waiting up to 30 seconds for the server to exit");
            for _ in 0..60 {
                if let Ok(Some(status)) = child.try_wait() {
                    exit_info.code = status.code();
                    exited = true;
                    break;
                }
                sleep(Duration::from_millis(500)).await;
            }
        }
        if !exited {
            child
                .kill()
                .await
                .map_err(|err| io_error(format!("failed to kill server: {err}")))?;
            if let Ok(status) = child.wait().await {
                exit_info.code = status.code();
            }
        }
    }

    let stopped_at_ms = now_millis();
    let status = ServerStatus::Exited {
        exit: exit_info.clone(),
        at_ms: stopped_at_ms,
    };
    {
        let mut guard = state.lock().await;
        guard.status = status.clone();
    }

    events.publish(Event::Status(status));
    logs.push_system("--- server stopped ---".to_string());

    Ok(Response::Stopped {
        exit: Some(exit_info),
        stopped_at_ms,
    })
}

pub async fn send_command(state: &SharedState, line: &str) -> Result<Response, RpcError> {
    send_line(state, line).await?;
    let logs = {
        let guard = state.lock().await;
        guard.logs.clone()
    };
    logs.push_system(format!("> {line}"));
    Ok(Response::CommandSent {})
}

/// Write one line to the server's console stdin.
pub(crate) async fn send_line(state: &SharedState, line: &str) -> Result<(), RpcError> {
    let mut guard = state.lock().await;
    let Some(stdin) = guard.stdin.as_mut() else {
        return Err(RpcError {
            code: ErrorCode::ServerNotRunning,
            message: "server not running".into(),
            details: Default::default(),
        });
    };

    stdin
        .write_all(format!("{line}\n").as_bytes())
        .await
        .map_err(|err| io_error(format!("console write failed: {err}")))?;
    stdin
        .flush()
        .await
        .map_err(|err| io_error(format!("console flush failed: {err}")))?;
    Ok(())
}

/// Reap the child if it exited since the last look; keeps the shared status
/// honest for pollers between monitor ticks.
pub(crate) fn refresh_child_status(state: &mut ServerState) {
    let Some(child) = state.child.as_mut() else {
        return;
    };

    if let Ok(Some(status)) = child.try_wait() {
        let exit = ExitInfo {
            code: status.code(),
            signal: None,
        };
        state.child = None;
        state.stdin = None;
        state.status = ServerStatus::Exited {
            exit,
            at_ms: now_millis(),
        };
    }
}

async fn ensure_eula(mc_dir: &Path) -> std::io::Result<()> {
    let eula = mc_dir.join("eula.txt");
    match tokio::fs::read_to_string(&eula).await {
        Ok(content) if content.contains("eula=true") => Ok(()),
        _ => {
            tokio::fs::create_dir_all(mc_dir).await?;
            tokio::fs::write(&eula, "eula=true\n").await
        }
    }
}

pub(crate) async fn spawn_server(
    config: &PanelConfig,
    logs: LogStore,
) -> Result<Child, std::io::Error> {
    tokio::fs::create_dir_all(&config.mc_dir).await?;

    let mut cmd = Command::new("java");
    cmd.args(&config.java_args);
    cmd.arg("-jar").arg(&config.jar_name).arg("nogui");
    cmd.current_dir(&config.mc_dir);
    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let mut child = cmd.spawn()?;

    if let Some(stdout) = child.stdout.take() {
        let stdout_logs = logs.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                stdout_logs.push(LogStream::Stdout, line);
            }
        });
    }

    if let Some(stderr) = child.stderr.take() {
        let stderr_logs = logs.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                stderr_logs.push(LogStream::Stderr, line);
            }
        });
    }

    Ok(child)
}

fn internal(message: impl Into<String>) -> RpcError {
    RpcError {
        code: ErrorCode::Internal,
        message: message.into(),
        details: Default::default(),
    }
}

fn io_error(message: impl Into<String>) -> RpcError {
    RpcError {
        code: ErrorCode::IoError,
        message: message.into(),
        details: Default::default(),
    }
}
