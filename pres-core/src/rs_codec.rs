use crate::error::Result;
use reed_solomon_erasure::galois_8::ReedSolomon;

/// Systematic Reed-Solomon over GF(2^8): any `k` of `k + m` equal-length shards
/// recover the rest.
pub struct RsCodec {
    pub k: usize,
    pub m: usize,
    inner: ReedSolomon,
}

impl RsCodec {
    pub fn new(k: usize, m: usize) -> Result<Self> {
        let inner = ReedSolomon::new(k, m)?;
        Ok(Self { k, m, inner })
    }

    /// Fills `parity` from `data`; data shards are only borrowed.
    pub fn encode_sep(&self, data: &[&[u8]], parity: &mut [&mut [u8]]) -> Result<()> {
        self.inner.encode_sep(data, parity)?;
        Ok(())
    }

    /// True when the parity shards match the data shards.
    pub fn verify(&self, shards: &[&[u8]]) -> Result<bool> {
        Ok(self.inner.verify(shards)?)
    }

    // Note: reconstruct expects Option<Vec<u8>> buffers; None marks an absent shard
    pub fn reconstruct(&self, shards: &mut [Option<Vec<u8>>]) -> Result<()> {
        self.inner.reconstruct(shards)?;
        Ok(())
    }
}
