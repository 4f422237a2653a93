use tokio::time::{Duration, sleep};

use panel_core::proto::{Event, ExitInfo, ServerStatus};

use super::state::SharedState;
use super::util::now_millis;

/// Watch the child once per second; when it exits on its own (crash, or a
/// `stop` typed into the console) flip the shared status so pollers and
/// subscribers see it without asking. The restore path's process guard relies
/// on this flip to observe the stop it requested.
pub async fn ensure_monitor(state: SharedState) {
    let start_monitor = {
        let mut guard = state.lock().await;
        if guard.monitor_started {
            false
        } else {
            guard.monitor_started = true;
            true
        }
    };

    if !start_monitor {
        return;
    }

    tokio::spawn(async move {
        loop {
            sleep(Duration::from_secs(1)).await;

            let exited = {
                let mut guard = state.lock().await;
                let Some(child) = guard.child.as_mut() else {
                    continue;
                };
                match child.try_wait() {
                    Ok(Some(status)) => {
                        let exit = ExitInfo {
                            code: status.code(),
                            signal: None,
                        };
                        guard.child = None;
                        guard.stdin = None;
                        let new_status = ServerStatus::Exited {
                            exit: exit.clone(),
                            at_ms: now_millis(),
                        };
                        guard.status = new_status.clone();
                        Some((exit, new_status, guard.logs.clone(), guard.events.clone()))
                    }
                    _ => None,
                }
            };

            if let Some((exit, status, logs, events)) = exited {
                logs.push_system(format!("--- server exited (code {:?}) ---", exit.code));
                events.publish(Event::Status(status));
            }
        }
    });
}
