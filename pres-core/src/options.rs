use crate::error::{PresError, Result};
use crate::progress::Progress;

pub const DEFAULT_DATA_SHARDS: u8 = 100;
pub const DEFAULT_PARITY_SHARDS: u8 = 3;
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;
pub const DEFAULT_SUFFIX: &str = ".pres";
pub const FORMAT_VERSION: &str = "1";

/// Longest version string the metadata tail is sized for.
pub const MAX_VERSION_LEN: usize = 32;

/// GF(2^8) Reed-Solomon cannot address more shards than this.
pub const MAX_TOTAL_SHARDS: usize = 256;

/// Parameters threaded through every workflow.
#[derive(Clone, Debug)]
pub struct ArchiveOptions {
    pub data_shards: u8,
    pub parity_shards: u8,
    /// Bytes read per shard per lockstep iteration.
    pub buffer_size: usize,
    pub suffix: String,
    pub version: String,
    pub progress: Progress,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            data_shards: DEFAULT_DATA_SHARDS,
            parity_shards: DEFAULT_PARITY_SHARDS,
            buffer_size: DEFAULT_BUFFER_SIZE,
            suffix: DEFAULT_SUFFIX.to_string(),
            version: FORMAT_VERSION.to_string(),
            progress: Progress::default(),
        }
    }
}

impl ArchiveOptions {
    pub fn total_shards(&self) -> usize {
        self.data_shards as usize + self.parity_shards as usize
    }

    /// Smallest input `create` accepts.
    pub fn min_input_len(&self) -> u64 {
        self.data_shards as u64 * self.data_shards as u64
    }

    pub fn validate(&self) -> Result<()> {
        if self.data_shards == 0 || self.parity_shards == 0 {
            return Err(PresError::InvalidOptions("shard counts must be positive".into()));
        }
        if self.total_shards() > MAX_TOTAL_SHARDS {
            return Err(PresError::InvalidOptions(format!(
                "{} shards exceed the coder limit of {}",
                self.total_shards(),
                MAX_TOTAL_SHARDS
            )));
        }
        if self.buffer_size == 0 {
            return Err(PresError::InvalidOptions("buffer size must be positive".into()));
        }
        if self.suffix.is_empty() {
            return Err(PresError::InvalidOptions("archive suffix must not be empty".into()));
        }
        if self.version.is_empty()
            || self.version.len() > MAX_VERSION_LEN
            || self.version.chars().any(|c| c.is_control() || c.is_whitespace())
        {
            return Err(PresError::InvalidOptions(format!(
                "version {:?} must be 1..={} printable characters",
                self.version, MAX_VERSION_LEN
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let o = ArchiveOptions::default();
        o.validate().unwrap();
        assert_eq!(o.total_shards(), 103);
        assert_eq!(o.min_input_len(), 10_000);
    }

    #[test]
    fn rejects_shard_counts_beyond_field_size() {
        let o = ArchiveOptions { data_shards: 250, parity_shards: 10, ..Default::default() };
        assert!(matches!(o.validate(), Err(PresError::InvalidOptions(_))));
        let o = ArchiveOptions { parity_shards: 0, ..Default::default() };
        assert!(o.validate().is_err());
    }

    #[test]
    fn rejects_versions_that_break_line_format() {
        let o = ArchiveOptions { version: "1\nx".into(), ..Default::default() };
        assert!(o.validate().is_err());
        let o = ArchiveOptions { version: "v".repeat(MAX_VERSION_LEN + 1), ..Default::default() };
        assert!(o.validate().is_err());
    }
}
