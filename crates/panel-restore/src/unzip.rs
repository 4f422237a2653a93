use std::fs::File;
use std::path::Path;

use tokio::task;
use zip::ZipArchive;

/// Extract every entry of the archive into `dest`, overwriting files that are
/// already there. Later archives in a restore plan rely on this overwrite to
/// supersede the base full backup. Runs on the blocking pool.
pub async fn extract_into(archive_path: &Path, dest: &Path) -> Result<(), String> {
    let archive_path = archive_path.to_path_buf();
    let dest = dest.to_path_buf();
    task::spawn_blocking(move || extract_blocking(&archive_path, &dest))
        .await
        .map_err(|e| format!("join error: {e}"))?
}

fn extract_blocking(archive_path: &Path, dest: &Path) -> Result<(), String> {
    let file = File::open(archive_path).map_err(|e| format!("open archive failed: {e}"))?;
    let mut archive = ZipArchive::new(file).map_err(|e| format!("read archive failed: {e}"))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| format!("archive entry failed: {e}"))?;

        // Reject entries that would land outside the world directory.
        let Some(rel) = entry.enclosed_name() else {
            return Err(format!("entry escapes destination: {}", entry.name()));
        };
        let out_path = dest.join(rel);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)
                .map_err(|e| format!("create dir failed: {e}"))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("create parent dir failed: {e}"))?;
        }
        let mut out =
            File::create(&out_path).map_err(|e| format!("create file failed: {e}"))?;
        std::io::copy(&mut entry, &mut out).map_err(|e| format!("write file failed: {e}"))?;
    }

    Ok(())
}
