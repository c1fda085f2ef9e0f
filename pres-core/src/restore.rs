use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::checksum::checksum_reader;
use crate::coder::StreamCoder;
use crate::error::{PresError, Result, Warning};
use crate::layout::ShardLayout;
use crate::options::ArchiveOptions;
use crate::paths::{restored_path, sibling_dir};
use crate::stream::{open_shard, padded, ShardReader};
use crate::verify::{inspect, Health, Inspection, ShardState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    /// Where the restored file was written; `None` when streamed to a writer.
    pub output: Option<PathBuf>,
    pub data_len: u64,
    /// Zero-based indices of the shards that had to be rebuilt.
    pub repaired: Vec<usize>,
    pub warnings: Vec<Warning>,
}

/// Restores `archive` next to itself under the name without the suffix.
pub fn restore_archive(archive: &Path, opts: &ArchiveOptions) -> Result<RestoreReport> {
    let output = restored_path(archive, &opts.suffix)?;
    restore_archive_to_path(archive, &output, opts)
}

/// Restores into `output`. The file appears under that name only once every
/// byte has been written; on failure no output file is left behind.
pub fn restore_archive_to_path(
    archive: &Path,
    output: &Path,
    opts: &ArchiveOptions,
) -> Result<RestoreReport> {
    opts.validate()?;
    if output.exists() {
        return Err(PresError::OutputExists(output.to_path_buf()));
    }
    let tmp = tempfile::Builder::new().prefix(".pres-restore-").tempfile_in(sibling_dir(output))?;
    let mut w = BufWriter::new(tmp);
    let mut report = restore_archive_into(archive, &mut w, opts)?;
    let tmp = w.into_inner().map_err(io::IntoInnerError::into_error)?;
    tmp.as_file().sync_all()?;
    tmp.persist_noclobber(output).map_err(|e| PresError::Io(e.error))?;
    info!(output = %output.display(), "restored file written");
    report.output = Some(output.to_path_buf());
    Ok(report)
}

/// Rebuilds damaged shards, checks the result and writes the original bytes to `out`.
pub fn restore_archive_into<W: Write>(
    archive: &Path,
    out: &mut W,
    opts: &ArchiveOptions,
) -> Result<RestoreReport> {
    opts.validate()?;
    let _ticker = opts.progress.scoped();
    let inspection = inspect(archive, opts)?;
    let report = inspection.report();
    report.ensure_recoverable()?;
    let layout = inspection.layout;
    let coder = StreamCoder::new(layout.data_shards, layout.parity_shards, opts.buffer_size)?
        .with_progress(opts.progress.clone());

    let repaired = inspection.damaged();
    let rebuilt = if report.health == Health::Healthy {
        info!(archive = %archive.display(), "no damaged shards");
        vec_of_none(layout.total_shards())
    } else {
        opts.progress.set_stage("Restoring damaged shards");
        info!(archive = %archive.display(), shards = ?repaired, "rebuilding damaged shards");
        rebuild(archive, &inspection, &coder, sibling_dir(archive))?
    };

    opts.progress.set_stage("Verifying restored data");
    check_rebuilt(&inspection, &rebuilt, opts.buffer_size)?;
    let mut all = shard_readers(archive, &layout, &rebuilt, layout.total_shards())?;
    if !coder.verify(&mut all, layout.shard_size)? {
        return Err(PresError::ReconstructionVerificationFailed {
            reason: "parity shards do not match the data shards".into(),
        });
    }

    opts.progress.set_stage("Writing output");
    let mut data = shard_readers(archive, &layout, &rebuilt, layout.data_shards)?;
    coder.join(&mut data, out, layout.data_len)?;

    for tmp in rebuilt.into_iter().flatten() {
        tmp.close()?;
    }
    Ok(RestoreReport { output: None, data_len: layout.data_len, repaired, warnings: report.warnings })
}

fn vec_of_none(n: usize) -> Vec<Option<NamedTempFile>> {
    (0..n).map(|_| None).collect()
}

/// Reconstructs every damaged shard into its own temporary file.
fn rebuild(
    archive: &Path,
    inspection: &Inspection,
    coder: &StreamCoder,
    dir: &Path,
) -> Result<Vec<Option<NamedTempFile>>> {
    let layout = &inspection.layout;
    let mut readers: Vec<Option<ShardReader>> = Vec::with_capacity(layout.total_shards());
    let mut temps = vec_of_none(layout.total_shards());
    for (i, state) in inspection.states.iter().enumerate() {
        match state {
            ShardState::Intact => readers.push(Some(open_shard(archive, layout, i)?)),
            ShardState::Damaged => {
                readers.push(None);
                temps[i] = Some(tempfile::Builder::new().prefix(".pres-shard-").tempfile_in(dir)?);
            }
        }
    }
    let mut outputs: Vec<Option<&mut NamedTempFile>> = temps.iter_mut().map(Option::as_mut).collect();
    coder.reconstruct(&mut readers, &mut outputs, layout.shard_size)?;
    Ok(temps)
}

/// Rebuilt shards must reproduce the checksums recorded at create time.
fn check_rebuilt(
    inspection: &Inspection,
    rebuilt: &[Option<NamedTempFile>],
    buf_size: usize,
) -> Result<()> {
    let layout = &inspection.layout;
    let expected = &inspection.quorum.authoritative.shard_crc32cs;
    for (i, tmp) in rebuilt.iter().enumerate() {
        let Some(tmp) = tmp else {
            continue;
        };
        let got = checksum_reader(tmp.reopen()?.take(layout.stored_len(i)), buf_size)?;
        if got != expected[i] {
            return Err(PresError::ReconstructionVerificationFailed {
                reason: format!("rebuilt shard {} does not match its recorded checksum", i + 1),
            });
        }
        debug!(shard = i + 1, "rebuilt shard checksum ok");
    }
    Ok(())
}

/// Readers for the first `count` shards, taking rebuilt shards from their
/// temporaries and everything else from the archive.
fn shard_readers(
    archive: &Path,
    layout: &ShardLayout,
    rebuilt: &[Option<NamedTempFile>],
    count: usize,
) -> Result<Vec<ShardReader>> {
    (0..count)
        .map(|i| -> Result<ShardReader> {
            Ok(match &rebuilt[i] {
                Some(tmp) => {
                    let f: File = tmp.reopen()?;
                    padded(f.take(layout.shard_size), 0)
                }
                None => open_shard(archive, layout, i)?,
            })
        })
        .collect()
}
