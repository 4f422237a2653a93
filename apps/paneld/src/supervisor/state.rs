use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tokio::process::{Child, ChildStdin};
use tokio::sync::Mutex;

use panel_core::proto::ServerStatus;

use super::events::EventBus;
use super::logs::LogStore;

pub type SharedState = Arc<Mutex<ServerState>>;

pub struct ServerState {
    pub(crate) status: ServerStatus,
    pub(crate) child: Option<Child>,
    // Kept out of Child so console commands can be written while the
    // monitor holds try_wait access to the handle.
    pub(crate) stdin: Option<ChildStdin>,
    pub(crate) monitor_started: bool,
    pub(crate) last_start_ms: Option<u64>,
    pub(crate) logs: LogStore,
    pub(crate) events: EventBus,
    // Set while a restore session runs; a second restore request is rejected
    // until the active session reaches a terminal state.
    pub(crate) restore_active: Arc<AtomicBool>,
    // Serialize start/stop so two lifecycle operations never interleave.
    pub(crate) lifecycle_lock: Arc<Mutex<()>>,
}

impl ServerState {
    pub fn new(logs: LogStore, events: EventBus) -> Self {
        Self {
            status: ServerStatus::Idle {},
            child: None,
            stdin: None,
            monitor_started: false,
            last_start_ms: None,
            logs,
            events,
            restore_active: Arc::new(AtomicBool::new(false)),
            lifecycle_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.status, ServerStatus::Running { .. })
    }
}
