use serde::{Deserialize, Serialize};

use super::{LogLine, RequestId, RpcError, UnixMillis};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    Log(LogLine),
    Status(ServerStatus),
    RestoreProgress { percent: u8, message: String },
    RestoreCompleted {},
    RestoreError { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum Outbound {
    Response(Envelope<Response>),
    Event(Event),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub id: RequestId,
    pub payload: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Request {
    Ping { client_version: String, protocol_version: u32 },

    Status {},

    Start {},

    Stop { force: bool },

    Command { line: String },

    Shutdown {},

    LogsTail { lines: usize },

    Subscribe {
        topics: Vec<Topic>,
        send_initial_status: bool,
    },

    Unsubscribe {},

    BackupsList {},
    BackupCreate {},
    BackupRestore { name: String, tier: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Topic {
    Logs,
    Status,
    Restore,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Response {
    Pong { daemon_version: String, protocol_version: u32 },

    Status { daemon: DaemonStatus, server: ServerStatus },

    Started { pid: i32, started_at_ms: UnixMillis },
    Stopped { exit: Option<ExitInfo>, stopped_at_ms: UnixMillis },

    CommandSent {},

    LogsTail { lines: Vec<LogLine>, truncated: bool },

    Subscribed { topics: Vec<Topic> },
    Unsubscribed {},

    ShutdownAck {},

    Backups { archives: Vec<BackupEntry> },
    BackupStarted {},
    RestoreStarted {},

    Error(RpcError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub daemon_version: String,
    pub protocol_version: u32,
    pub pid: i32,
    pub uptime_ms: u64,
}

/// One backup archive as reported to clients. `tier` and `kind` carry the
/// archive store's classification (`differential`/`snapshots`, `full`/`partial`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupEntry {
    pub name: String,
    pub tier: String,
    pub kind: String,
    pub size_bytes: u64,
    pub modified_at_ms: UnixMillis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "state", content = "data")]
pub enum ServerStatus {
    Idle {},

    Running {
        pid: i32,
        started_at_ms: UnixMillis,
    },

    Exited { exit: ExitInfo, at_ms: UnixMillis },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitInfo {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}
