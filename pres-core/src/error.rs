//! Error and warning taxonomy shared by the create, verify and restore workflows.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PresError>;

/// Fatal conditions. Any of these aborts the running workflow.
#[derive(Error, Debug)]
pub enum PresError {
    #[error("input is {len} bytes; at least {min} bytes are needed for a shard layout")]
    InputTooSmall { len: u64, min: u64 },

    #[error("no intact configuration block found in archive metadata")]
    MetadataUnreadable,

    #[error("only {intact} shards are intact, {required} are needed to restore")]
    TooManyDamagedShards { intact: usize, required: usize },

    #[error("restored shards failed verification: {reason}")]
    ReconstructionVerificationFailed { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("erasure coder error: {0}")]
    Codec(#[from] reed_solomon_erasure::Error),

    #[error("archive {0:?} already exists")]
    ArchiveExists(PathBuf),

    #[error("output {0:?} already exists")]
    OutputExists(PathBuf),

    #[error("{0:?} does not carry the archive suffix")]
    NotAnArchive(PathBuf),

    #[error("invalid options: {0}")]
    InvalidOptions(String),
}

/// Coarse categories callers map onto exit statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InputTooSmall,
    MetadataUnreadable,
    TooManyDamagedShards,
    ReconstructionVerificationFailed,
    Io,
    Codec,
    Usage,
}

impl PresError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PresError::InputTooSmall { .. } => ErrorKind::InputTooSmall,
            PresError::MetadataUnreadable => ErrorKind::MetadataUnreadable,
            PresError::TooManyDamagedShards { .. } => ErrorKind::TooManyDamagedShards,
            PresError::ReconstructionVerificationFailed { .. } => {
                ErrorKind::ReconstructionVerificationFailed
            }
            PresError::Io(_) => ErrorKind::Io,
            PresError::Codec(reed_solomon_erasure::Error::TooFewShardsPresent) => {
                ErrorKind::TooManyDamagedShards
            }
            PresError::Codec(_) => ErrorKind::Codec,
            PresError::ArchiveExists(_)
            | PresError::OutputExists(_)
            | PresError::NotAnArchive(_)
            | PresError::InvalidOptions(_) => ErrorKind::Usage,
        }
    }
}

/// Non-fatal conditions surfaced to the user while processing continues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// Fewer than three configuration copies agree with a peer.
    MetadataPartiallyDamaged { trusted: usize },
    /// Some shards mismatch their checksum but enough remain to rebuild them.
    SomeShardsDamaged { damaged: usize },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::MetadataPartiallyDamaged { trusted } => {
                write!(f, "metadata partially damaged: {trusted} of 3 configuration blocks intact")
            }
            Warning::SomeShardsDamaged { damaged } => {
                write!(f, "{damaged} shard(s) damaged but repairable")
            }
        }
    }
}
