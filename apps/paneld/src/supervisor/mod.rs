mod events;
mod logs;
mod monitor;
mod server;
mod state;
mod util;

pub use events::EventBus;
pub use logs::LogStore;
pub use server::{build_status, send_command, start_server, stop_server};
pub use state::{ServerState, SharedState};
pub use util::now_millis;

pub(crate) use server::{refresh_child_status, send_line};
