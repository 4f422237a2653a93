mod error;
mod rpc;
mod types;

pub use error::{ErrorCode, RpcError};
pub use rpc::{
    BackupEntry, DaemonStatus, Envelope, Event, ExitInfo, Outbound, Request, Response,
    ServerStatus, Topic,
};
pub use types::{LogLine, LogStream, RequestId, UnixMillis};
