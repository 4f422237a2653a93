use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Held for the daemon's lifetime; the advisory lock releases when dropped.
pub struct LockGuard {
    _file: File,
}

pub fn acquire_lock(path: &Path) -> std::io::Result<LockGuard> {
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(path)?;

    file.try_lock_exclusive()?;

    file.set_len(0)?;
    writeln!(file, "{}", std::process::id())?;

    Ok(LockGuard { _file: file })
}
