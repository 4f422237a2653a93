use crate::archive::{ArchiveKind, BackupArchive};
use crate::errors::PlanError;

/// The ordered list of archives a restore must apply. The base full backup,
/// when one is required, comes first; the target is always last so its
/// contents win on any path present in both.
#[derive(Debug, Clone)]
pub struct RestorePlan {
    pub target: BackupArchive,
    pub apply_sequence: Vec<BackupArchive>,
}

/// Compute the apply order for `target`.
///
/// A full archive restores on its own. A partial archive needs the most
/// recent full archive of the same tier taken before it; the producer names
/// archives with a fixed-width timestamp (`backup_2025-10-25_14-06-05-full.zip`),
/// so lexicographic comparison of names doubles as chronological order. That
/// naming scheme is a precondition of this function.
///
/// Two levels only: partials are always taken against the latest full, never
/// chained against each other.
pub fn plan(target: &BackupArchive, all: &[BackupArchive]) -> Result<RestorePlan, PlanError> {
    match target.kind {
        ArchiveKind::Full => Ok(RestorePlan {
            target: target.clone(),
            apply_sequence: vec![target.clone()],
        }),
        ArchiveKind::Partial => {
            let base = all
                .iter()
                .filter(|a| a.tier == target.tier && a.kind == ArchiveKind::Full)
                .filter(|a| a.name.as_str() < target.name.as_str())
                .max_by(|a, b| a.name.cmp(&b.name));

            match base {
                Some(base) => Ok(RestorePlan {
                    target: target.clone(),
                    apply_sequence: vec![base.clone(), target.clone()],
                }),
                None => Err(PlanError::NoBaseFullBackup {
                    target: target.name.clone(),
                }),
            }
        }
    }
}
