//! Bounded shard streams with a virtual zero-filled tail.
//!
//! Every path that feeds the coder (encode, verify, reconstruct, join) opens
//! shards through [`open_shard`], so the padding rule lives in one place.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use crate::layout::ShardLayout;

/// Everything from the inner reader, then a run of zero bytes.
pub type PaddedReader<R> = io::Chain<R, io::Take<io::Repeat>>;

pub fn padded<R: Read>(inner: R, pad: u64) -> PaddedReader<R> {
    inner.chain(io::repeat(0).take(pad))
}

/// A shard opened at its archive offset, bounded to its stored length and
/// padded up to the shard size.
pub type ShardReader = PaddedReader<io::Take<File>>;

/// Opens `path` positioned at `offset`, yielding `stored` real bytes followed
/// by `pad` zeros.
pub fn open_range(path: &Path, offset: u64, stored: u64, pad: u64) -> io::Result<ShardReader> {
    let mut f = File::open(path)?;
    f.seek(SeekFrom::Start(offset))?;
    Ok(padded(f.take(stored), pad))
}

/// Shard `i` of `archive` as the coder sees it: exactly `shard_size` bytes.
pub fn open_shard(archive: &Path, layout: &ShardLayout, i: usize) -> io::Result<ShardReader> {
    open_range(archive, layout.offset(i), layout.stored_len(i), layout.padding(i))
}
