use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::checksum::{HashingReader, HashingWriter};
use crate::coder::StreamCoder;
use crate::conf::{max_tail_len, Conf, TAIL_WINDOW};
use crate::error::{PresError, Result};
use crate::layout::ShardLayout;
use crate::options::ArchiveOptions;
use crate::paths::{archive_path, sibling_dir};
use crate::stream::{padded, PaddedReader};

type TappedShard = PaddedReader<HashingReader<io::Take<File>>>;

/// Turns `input` into `<input><suffix>`: original bytes, then parity shards,
/// then three copies of the configuration.
///
/// The input file is extended in place and renamed last; until the rename
/// succeeds the archive does not exist under its final name. A failure after
/// parity has been appended leaves the input with trailing bytes and possibly
/// temporary parity files next to it.
pub fn create_archive(input: &Path, opts: &ArchiveOptions) -> Result<PathBuf> {
    opts.validate()?;
    let archive = archive_path(input, &opts.suffix);
    if archive.exists() {
        return Err(PresError::ArchiveExists(archive));
    }
    let data_len = fs::metadata(input)?.len();
    let min = opts.min_input_len();
    if data_len < min {
        return Err(PresError::InputTooSmall { len: data_len, min });
    }

    let layout = ShardLayout::new(data_len, opts.data_shards, opts.parity_shards);
    info!(
        input = %input.display(),
        data_len,
        shard_size = layout.shard_size,
        data_shards = layout.data_shards,
        parity_shards = layout.parity_shards,
        "creating archive"
    );
    let _ticker = opts.progress.scoped();

    opts.progress.set_stage("Calculating parity");
    let (parity_files, checksums) = encode_parity(input, &layout, opts)?;

    let conf = Conf::new(&opts.version, data_len, opts.data_shards, opts.parity_shards, checksums);
    let tail = conf.tail_bytes();
    let bound = max_tail_len(opts.data_shards, opts.parity_shards).min(TAIL_WINDOW);
    if tail.len() as u64 > bound {
        return Err(PresError::InvalidOptions(format!(
            "metadata tail of {} bytes exceeds the {} byte search window",
            tail.len(),
            bound
        )));
    }

    opts.progress.set_stage("Appending parity");
    let mut out = OpenOptions::new().append(true).open(input)?;
    for tmp in &parity_files {
        let mut f = tmp.reopen()?;
        io::copy(&mut f, &mut out)?;
    }

    opts.progress.set_stage("Appending metadata");
    out.write_all(&tail)?;
    out.sync_all()?;
    drop(out);

    fs::rename(input, &archive)?;
    debug!(archive = %archive.display(), "renamed");

    for tmp in parity_files {
        tmp.close()?;
    }
    info!(archive = %archive.display(), "archive created");
    Ok(archive)
}

/// One pass over the input: parity streams into temporaries while every data
/// and parity byte also feeds its shard's checksum.
fn encode_parity(
    input: &Path,
    layout: &ShardLayout,
    opts: &ArchiveOptions,
) -> Result<(Vec<NamedTempFile>, Vec<String>)> {
    let mut data: Vec<TappedShard> = Vec::with_capacity(layout.data_shards);
    for i in 0..layout.data_shards {
        let mut f = File::open(input)?;
        f.seek(SeekFrom::Start(layout.offset(i)))?;
        let tapped = HashingReader::new(f.take(layout.stored_len(i)));
        data.push(padded(tapped, layout.padding(i)));
    }

    let dir = sibling_dir(input);
    let mut parity: Vec<HashingWriter<NamedTempFile>> = Vec::with_capacity(layout.parity_shards);
    for _ in 0..layout.parity_shards {
        let tmp = tempfile::Builder::new().prefix(".pres-parity-").tempfile_in(dir)?;
        parity.push(HashingWriter::new(tmp));
    }

    let coder = StreamCoder::new(layout.data_shards, layout.parity_shards, opts.buffer_size)?
        .with_progress(opts.progress.clone());
    coder.encode(&mut data, &mut parity, layout.shard_size)?;

    let mut checksums: Vec<String> = data.iter().map(|r| r.get_ref().0.hasher().render()).collect();
    checksums.extend(parity.iter().map(|w| w.hasher().render()));
    debug!(shards = checksums.len(), "shard checksums computed");
    Ok((parity.into_iter().map(HashingWriter::into_inner).collect(), checksums))
}
