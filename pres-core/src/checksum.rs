//! Per-shard CRC-32C fingerprints, rendered as decimal strings for the metadata tail.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Incremental CRC-32C (Castagnoli) accumulator.
#[derive(Clone, Copy, Debug, Default)]
pub struct ShardHasher {
    crc: u32,
}

impl ShardHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, buf: &[u8]) {
        self.crc = crc32c::crc32c_append(self.crc, buf);
    }

    /// Canonical metadata form of the current value.
    pub fn render(&self) -> String {
        render(self.crc)
    }
}

pub fn render(crc: u32) -> String {
    crc.to_string()
}

/// Checksum of an in-memory byte range.
pub fn checksum(buf: &[u8]) -> String {
    render(crc32c::crc32c(buf))
}

/// Checksum of everything `r` yields, streamed through `buf_size` chunks.
pub fn checksum_reader<R: Read>(mut r: R, buf_size: usize) -> io::Result<String> {
    let mut h = ShardHasher::new();
    let mut buf = vec![0u8; buf_size.max(1)];
    loop {
        let n = match r.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        h.update(&buf[..n]);
    }
    Ok(h.render())
}

/// Checksum of `len` bytes at `offset` in `path`. A file that ends early is
/// hashed over whatever is present, which then simply fails to match.
pub fn checksum_file_range(path: &Path, offset: u64, len: u64, buf_size: usize) -> io::Result<String> {
    let mut f = File::open(path)?;
    f.seek(SeekFrom::Start(offset))?;
    checksum_reader(f.take(len), buf_size)
}

/// Reader that feeds every byte it yields into a [`ShardHasher`].
pub struct HashingReader<R> {
    inner: R,
    hasher: ShardHasher,
}

impl<R: Read> HashingReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, hasher: ShardHasher::new() }
    }

    pub fn hasher(&self) -> &ShardHasher {
        &self.hasher
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}

/// Writer that hashes every byte accepted by the inner writer.
pub struct HashingWriter<W> {
    inner: W,
    hasher: ShardHasher,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, hasher: ShardHasher::new() }
    }

    pub fn hasher(&self) -> &ShardHasher {
        &self.hasher
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
