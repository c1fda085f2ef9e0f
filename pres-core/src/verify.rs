use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::checksum::checksum_file_range;
use crate::conf::read_confs;
use crate::error::{PresError, Result, Warning};
use crate::layout::ShardLayout;
use crate::options::ArchiveOptions;
use crate::quorum::{authoritative, Quorum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardState {
    Intact,
    Damaged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    /// Every shard matches its checksum.
    Healthy,
    /// Some shards are damaged, at most as many as there are parity shards.
    Repairable,
    /// Fewer intact shards than data shards.
    Unrecoverable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub trusted_copies: usize,
    pub data_len: u64,
    pub shard_size: u64,
    pub data_shards: usize,
    pub parity_shards: usize,
    pub intact_shards: usize,
    /// Zero-based indices of shards whose checksum does not match.
    pub damaged_shards: Vec<usize>,
    pub health: Health,
    pub warnings: Vec<Warning>,
}

impl VerifyReport {
    pub fn total_shards(&self) -> usize {
        self.data_shards + self.parity_shards
    }

    pub fn ensure_recoverable(&self) -> Result<()> {
        if self.health == Health::Unrecoverable {
            return Err(PresError::TooManyDamagedShards {
                intact: self.intact_shards,
                required: self.data_shards,
            });
        }
        Ok(())
    }
}

/// Authoritative configuration plus the freshly computed state of each shard.
pub(crate) struct Inspection {
    pub quorum: Quorum,
    pub layout: ShardLayout,
    pub states: Vec<ShardState>,
}

impl Inspection {
    pub fn intact(&self) -> usize {
        self.states.iter().filter(|s| **s == ShardState::Intact).count()
    }

    pub fn damaged(&self) -> Vec<usize> {
        (0..self.states.len()).filter(|&i| self.states[i] == ShardState::Damaged).collect()
    }

    pub fn health(&self) -> Health {
        let intact = self.intact();
        if intact == self.states.len() {
            Health::Healthy
        } else if intact >= self.layout.data_shards {
            Health::Repairable
        } else {
            Health::Unrecoverable
        }
    }

    pub fn report(&self) -> VerifyReport {
        let damaged = self.damaged();
        let health = self.health();
        let mut warnings: Vec<Warning> = self.quorum.warning().into_iter().collect();
        if health == Health::Repairable {
            warnings.push(Warning::SomeShardsDamaged { damaged: damaged.len() });
        }
        VerifyReport {
            trusted_copies: self.quorum.trusted.len(),
            data_len: self.layout.data_len,
            shard_size: self.layout.shard_size,
            data_shards: self.layout.data_shards,
            parity_shards: self.layout.parity_shards,
            intact_shards: self.intact(),
            damaged_shards: damaged,
            health,
            warnings,
        }
    }
}

/// Reads metadata, recovers the authoritative copy and classifies every shard.
pub(crate) fn inspect(archive: &Path, opts: &ArchiveOptions) -> Result<Inspection> {
    opts.progress.set_stage("Reading metadata");
    let confs = read_confs(archive)?;
    let quorum = authoritative(&confs)?;
    if let Some(w) = quorum.warning() {
        warn!(archive = %archive.display(), trusted = ?quorum.trusted, "{w}");
    }
    let conf = &quorum.authoritative;
    let layout = ShardLayout::new(conf.data_len, conf.data_shard_cnt, conf.parity_shard_cnt);
    let archive_len = fs::metadata(archive)?.len();
    if layout.parity_end() > archive_len {
        warn!(
            archive = %archive.display(),
            data_len = conf.data_len,
            archive_len,
            "configuration describes more shard bytes than the archive holds"
        );
        return Err(PresError::MetadataUnreadable);
    }

    opts.progress.set_stage("Checking shards");
    let states = classify(archive, &layout, &conf.shard_crc32cs, opts.buffer_size)?;
    Ok(Inspection { quorum, layout, states })
}

/// Recomputes each shard's checksum and compares it to `expected`. Shards are
/// independent byte ranges, so they are hashed in parallel.
pub fn classify(
    archive: &Path,
    layout: &ShardLayout,
    expected: &[String],
    buf_size: usize,
) -> Result<Vec<ShardState>> {
    (0..layout.total_shards())
        .into_par_iter()
        .map(|i| -> Result<ShardState> {
            let got =
                checksum_file_range(archive, layout.offset(i), layout.stored_len(i), buf_size)?;
            let ok = expected.get(i).is_some_and(|e| *e == got);
            Ok(if ok { ShardState::Intact } else { ShardState::Damaged })
        })
        .collect()
}

/// Read-only health check of an archive.
///
/// Fails only when no configuration copy can be trusted or the archive cannot
/// be read; an unrecoverable archive is reported through
/// [`VerifyReport::health`] (see [`VerifyReport::ensure_recoverable`]).
pub fn verify_archive(archive: &Path, opts: &ArchiveOptions) -> Result<VerifyReport> {
    opts.validate()?;
    let _ticker = opts.progress.scoped();
    let inspection = inspect(archive, opts)?;
    let report = inspection.report();
    match report.health {
        Health::Healthy => info!(archive = %archive.display(), "all {} shards intact", report.total_shards()),
        Health::Repairable => warn!(
            archive = %archive.display(),
            damaged = ?report.damaged_shards,
            "{} of {} shards intact, archive is repairable",
            report.intact_shards,
            report.total_shards()
        ),
        Health::Unrecoverable => warn!(
            archive = %archive.display(),
            "{} of {} shards intact, {} needed",
            report.intact_shards,
            report.total_shards(),
            report.data_shards
        ),
    }
    Ok(report)
}
