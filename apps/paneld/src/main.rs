use tracing::{info, warn};

mod backup;
mod config;
mod daemon;
mod lock;
mod paths;
mod supervisor;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let panel_config = config::load()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;

    let logs = supervisor::LogStore::new(1000).with_file(&config::panel_log_path());
    tracing_subscriber::fmt().with_writer(logs.writer()).init();

    let paths = paths::runtime_paths();
    paths::ensure_dir(&paths.runtime_dir)?;

    // single-instance lock
    let _guard = match lock::acquire_lock(&paths.lock_path) {
        Ok(guard) => guard,
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
            warn!("daemon already running (lock held), exiting");
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    // if a socket file exists, see if a daemon is alive
    if paths.socket_path.exists() {
        if panel_ipc::socket::socket_alive(&paths.socket_path).await {
            warn!("daemon already running (socket alive), exiting");
            return Ok(());
        }
        // stale socket file
        panel_ipc::socket::remove_stale_socket(&paths.socket_path)?;
    }

    let listener = panel_ipc::socket::bind(&paths.socket_path).await?;
    info!("mc-paneld listening at {:?}", paths.socket_path);

    daemon::serve(listener, panel_config, logs).await
}
