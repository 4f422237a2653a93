use std::io;
use std::path::Path;
use tokio::net::{UnixListener, UnixStream};

pub async fn connect(path: &Path) -> io::Result<UnixStream> {
    UnixStream::connect(path).await
}

pub async fn bind(path: &Path) -> io::Result<UnixListener> {
    UnixListener::bind(path)
}

/// Probe whether a daemon is still answering on `path`.
pub async fn socket_alive(path: &Path) -> bool {
    UnixStream::connect(path).await.is_ok()
}

/// Clear a socket file left behind by a daemon that died without cleanup.
pub fn remove_stale_socket(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}
