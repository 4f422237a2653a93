use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("no full backup precedes {target} in its tier")]
    NoBaseFullBackup { target: String },
}

#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("server did not stop within {timeout_secs}s")]
    ServerWouldNotStop { timeout_secs: u64 },

    #[error("failed to quarantine world directory: {0}")]
    QuarantineFailed(#[source] std::io::Error),

    #[error("extraction failed for {archive}: {reason}")]
    ExtractionFailed { archive: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
