use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::warn;

/// Substring the backup producer puts into the file name of a differential
/// archive. Classification is name-based for compatibility with existing
/// producers; keep it behind [`ArchiveKind::classify`] so a manifest-based
/// scheme can replace it without touching the planner or executor.
const PARTIAL_MARKER: &str = "partial";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveTier {
    Differential,
    Snapshot,
}

impl ArchiveTier {
    /// Directory name under `<backup-root>/world/` this tier is stored in.
    pub fn dir_name(&self) -> &'static str {
        match self {
            ArchiveTier::Differential => "differential",
            ArchiveTier::Snapshot => "snapshots",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "differential" => Some(ArchiveTier::Differential),
            "snapshots" => Some(ArchiveTier::Snapshot),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveKind {
    /// Self-contained archive of the whole world directory.
    Full,
    /// Meaningful only on top of the preceding full archive of its tier.
    Partial,
}

impl ArchiveKind {
    pub fn classify(name: &str) -> Self {
        if name.contains(PARTIAL_MARKER) {
            ArchiveKind::Partial
        } else {
            ArchiveKind::Full
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ArchiveKind::Full => "full",
            ArchiveKind::Partial => "partial",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupArchive {
    pub name: String,
    pub path: PathBuf,
    pub tier: ArchiveTier,
    pub kind: ArchiveKind,
    pub size_bytes: u64,
    pub modified_at_ms: u64,
}

/// Read-only view over the backup artifacts on disk. The store never mutates
/// or deletes them; the producer writes into these directories concurrently.
pub struct ArchiveStore {
    differential_dir: PathBuf,
    snapshot_dir: PathBuf,
}

impl ArchiveStore {
    pub fn new(backup_root: &Path) -> Self {
        let world = backup_root.join("world");
        Self {
            differential_dir: world.join(ArchiveTier::Differential.dir_name()),
            snapshot_dir: world.join(ArchiveTier::Snapshot.dir_name()),
        }
    }

    /// All `.zip` archives across both tiers, newest first. A tier directory
    /// that does not exist contributes nothing; a file whose metadata cannot
    /// be read is skipped rather than failing the whole scan.
    pub async fn list(&self) -> std::io::Result<Vec<BackupArchive>> {
        let mut archives = Vec::new();
        self.scan_tier(&self.differential_dir, ArchiveTier::Differential, &mut archives)
            .await?;
        self.scan_tier(&self.snapshot_dir, ArchiveTier::Snapshot, &mut archives)
            .await?;
        sort_newest_first(&mut archives);
        Ok(archives)
    }

    async fn scan_tier(
        &self,
        dir: &Path,
        tier: ArchiveTier,
        out: &mut Vec<BackupArchive>,
    ) -> std::io::Result<()> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err),
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.ends_with(".zip") {
                continue;
            }

            let meta = match entry.metadata().await {
                Ok(meta) => meta,
                Err(err) => {
                    warn!("skipping {name}: stat failed: {err}");
                    continue;
                }
            };
            if !meta.is_file() {
                continue;
            }

            let modified_at_ms = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0);

            out.push(BackupArchive {
                kind: ArchiveKind::classify(&name),
                name,
                path: entry.path(),
                tier,
                size_bytes: meta.len(),
                modified_at_ms,
            });
        }

        Ok(())
    }
}

/// Modified-time descending; name descending on ties so the order is stable
/// across rescans.
pub fn sort_newest_first(archives: &mut [BackupArchive]) {
    archives.sort_by(|a, b| {
        b.modified_at_ms
            .cmp(&a.modified_at_ms)
            .then_with(|| b.name.cmp(&a.name))
    });
}
