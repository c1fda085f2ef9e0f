//! Byte positions of data and parity shards inside an archive.
//!
//! ```text
//! [data shard 0 .. data shard k-1 | parity 0 .. parity m-1 | metadata tail]
//!  0                        data_len
//! ```
//!
//! Data shards are views onto the original bytes; only the parity shards are
//! physically padded to the full shard size.

/// `ceil(data_len / data_shards)`.
pub fn shard_size(data_len: u64, data_shards: u8) -> u64 {
    data_len.div_ceil(data_shards as u64)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShardLayout {
    pub data_len: u64,
    pub data_shards: usize,
    pub parity_shards: usize,
    pub shard_size: u64,
}

impl ShardLayout {
    pub fn new(data_len: u64, data_shards: u8, parity_shards: u8) -> Self {
        Self {
            data_len,
            data_shards: data_shards as usize,
            parity_shards: parity_shards as usize,
            shard_size: shard_size(data_len, data_shards),
        }
    }

    pub fn total_shards(&self) -> usize {
        self.data_shards + self.parity_shards
    }

    pub fn is_data(&self, i: usize) -> bool {
        i < self.data_shards
    }

    /// Start of shard `i` (data or parity) within the archive.
    pub fn offset(&self, i: usize) -> u64 {
        debug_assert!(i < self.total_shards());
        if self.is_data(i) {
            (i as u64).saturating_mul(self.shard_size)
        } else {
            let k = (i - self.data_shards) as u64;
            self.data_len.saturating_add(k.saturating_mul(self.shard_size))
        }
    }

    /// Bytes physically stored for shard `i`. Only trailing data shards can be short.
    pub fn stored_len(&self, i: usize) -> u64 {
        if self.is_data(i) {
            let start = (i as u64).saturating_mul(self.shard_size);
            self.data_len.saturating_sub(start).min(self.shard_size)
        } else {
            self.shard_size
        }
    }

    /// Virtual zero bytes appended to shard `i` so it reaches `shard_size`.
    pub fn padding(&self, i: usize) -> u64 {
        self.shard_size - self.stored_len(i)
    }

    /// Total virtual padding across the data region.
    pub fn total_padding(&self) -> u64 {
        self.shard_size.saturating_mul(self.data_shards as u64) - self.data_len
    }

    /// End of the parity region; the metadata tail starts here.
    pub fn parity_end(&self) -> u64 {
        self.data_len
            .saturating_add((self.parity_shards as u64).saturating_mul(self.shard_size))
    }
}
