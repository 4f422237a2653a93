//! Backup enumeration and world-restore orchestration for the panel daemon.
//!
//! The flow is: scan the backup tiers ([`ArchiveStore`]), compute which
//! archives must be applied and in what order ([`plan`]), then run a
//! [`RestoreSession`] that stops the server, quarantines the live world
//! directory and extracts the planned archives into a fresh one, streaming
//! progress through a [`ProgressSink`].

pub mod archive;
pub mod errors;
pub mod executor;
pub mod guard;
pub mod plan;
pub mod progress;
pub mod unzip;

pub use archive::{ArchiveKind, ArchiveStore, ArchiveTier, BackupArchive};
pub use errors::{PlanError, RestoreError};
pub use executor::{RestorePhase, RestoreSession};
pub use guard::ServerControl;
pub use plan::{RestorePlan, plan};
pub use progress::ProgressSink;
