//! Streaming front-end for [`RsCodec`].
//!
//! Shards are processed in lockstep: iteration `j` reads the same byte range
//! `[j * chunk, (j + 1) * chunk)` from every shard stream, because the coding
//! matrix combines the bytes at one position across all shards. Shard streams
//! must therefore each yield exactly `shard_size` bytes.

use std::io::{Read, Write};

use crate::error::{PresError, Result};
use crate::progress::Progress;
use crate::rs_codec::RsCodec;

pub struct StreamCoder {
    codec: RsCodec,
    chunk_size: usize,
    progress: Progress,
}

impl StreamCoder {
    pub fn new(data_shards: usize, parity_shards: usize, chunk_size: usize) -> Result<Self> {
        Ok(Self {
            codec: RsCodec::new(data_shards, parity_shards)?,
            chunk_size: chunk_size.max(1),
            progress: Progress::default(),
        })
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    pub fn parity_shards(&self) -> usize {
        self.codec.m
    }

    fn chunks(&self, shard_size: u64) -> impl Iterator<Item = usize> {
        let chunk = self.chunk_size as u64;
        let mut left = shard_size;
        std::iter::from_fn(move || {
            if left == 0 {
                return None;
            }
            let n = left.min(chunk);
            left -= n;
            Some(n as usize)
        })
    }

    fn check_counts(&self, data: usize, parity: usize) -> Result<()> {
        if data != self.codec.k || parity != self.codec.m {
            return Err(reed_solomon_erasure::Error::IncorrectShardSize.into());
        }
        Ok(())
    }

    /// Streams parity for `data` into `parity`.
    pub fn encode<R: Read, W: Write>(
        &self,
        data: &mut [R],
        parity: &mut [W],
        shard_size: u64,
    ) -> Result<()> {
        self.check_counts(data.len(), parity.len())?;
        self.progress.reset_bytes(shard_size);
        let mut dbufs = vec![vec![0u8; self.chunk_size]; self.codec.k];
        let mut pbufs = vec![vec![0u8; self.chunk_size]; self.codec.m];
        for n in self.chunks(shard_size) {
            for (r, buf) in data.iter_mut().zip(dbufs.iter_mut()) {
                r.read_exact(&mut buf[..n])?;
            }
            let drefs: Vec<&[u8]> = dbufs.iter().map(|b| &b[..n]).collect();
            let mut prefs: Vec<&mut [u8]> = pbufs.iter_mut().map(|b| &mut b[..n]).collect();
            self.codec.encode_sep(&drefs, &mut prefs)?;
            for (w, buf) in parity.iter_mut().zip(pbufs.iter()) {
                w.write_all(&buf[..n])?;
            }
            self.progress.add_bytes(n as u64);
        }
        for w in parity.iter_mut() {
            w.flush()?;
        }
        Ok(())
    }

    /// Recomputes parity from the data streams and compares it with the
    /// supplied parity streams. `shards` holds data shards first.
    pub fn verify<R: Read>(&self, shards: &mut [R], shard_size: u64) -> Result<bool> {
        self.check_counts(
            shards.len().min(self.codec.k),
            shards.len().saturating_sub(self.codec.k),
        )?;
        self.progress.reset_bytes(shard_size);
        let mut bufs = vec![vec![0u8; self.chunk_size]; shards.len()];
        let mut ok = true;
        for n in self.chunks(shard_size) {
            for (r, buf) in shards.iter_mut().zip(bufs.iter_mut()) {
                r.read_exact(&mut buf[..n])?;
            }
            let refs: Vec<&[u8]> = bufs.iter().map(|b| &b[..n]).collect();
            if !self.codec.verify(&refs)? {
                ok = false;
                break;
            }
            self.progress.add_bytes(n as u64);
        }
        Ok(ok)
    }

    /// Rebuilds every shard whose reader is `None`, writing its full content to
    /// the matching writer. Fails when more than `parity_shards` are absent.
    pub fn reconstruct<R: Read, W: Write>(
        &self,
        shards: &mut [Option<R>],
        outputs: &mut [Option<W>],
        shard_size: u64,
    ) -> Result<()> {
        let total = self.codec.k + self.codec.m;
        if shards.len() != total || outputs.len() != total {
            return Err(reed_solomon_erasure::Error::IncorrectShardSize.into());
        }
        let missing: Vec<usize> = (0..total).filter(|&i| shards[i].is_none()).collect();
        if missing.len() > self.codec.m {
            return Err(PresError::TooManyDamagedShards {
                intact: total - missing.len(),
                required: self.codec.k,
            });
        }
        if missing.iter().any(|&i| outputs[i].is_none()) {
            return Err(PresError::InvalidOptions("absent shard without an output slot".into()));
        }
        if missing.is_empty() {
            return Ok(());
        }
        self.progress.reset_bytes(shard_size);
        let mut bufs: Vec<Vec<u8>> = vec![vec![0u8; self.chunk_size]; total];
        for n in self.chunks(shard_size) {
            let mut slots: Vec<Option<Vec<u8>>> = Vec::with_capacity(total);
            for (i, reader) in shards.iter_mut().enumerate() {
                match reader {
                    Some(r) => {
                        let mut buf = std::mem::take(&mut bufs[i]);
                        buf.resize(n, 0);
                        r.read_exact(&mut buf)?;
                        slots.push(Some(buf));
                    }
                    None => slots.push(None),
                }
            }
            self.codec.reconstruct(&mut slots)?;
            for &i in &missing {
                if let (Some(w), Some(buf)) = (outputs[i].as_mut(), slots[i].as_ref()) {
                    w.write_all(buf)?;
                }
            }
            for (i, slot) in slots.into_iter().enumerate() {
                if let Some(buf) = slot {
                    bufs[i] = buf;
                }
            }
            self.progress.add_bytes(n as u64);
        }
        for &i in &missing {
            if let Some(w) = outputs[i].as_mut() {
                w.flush()?;
            }
        }
        Ok(())
    }

    /// Concatenates the data shards and stops after `data_len` bytes, so the
    /// padding of the last shard never reaches `out`.
    pub fn join<R: Read, W: Write>(&self, data: &mut [R], out: &mut W, data_len: u64) -> Result<()> {
        self.check_counts(data.len(), self.codec.m)?;
        self.progress.reset_bytes(data_len);
        let shard_size = data_len.div_ceil(self.codec.k as u64);
        let mut remaining = data_len;
        let mut buf = vec![0u8; self.chunk_size];
        for r in data.iter_mut() {
            if remaining == 0 {
                break;
            }
            let mut left = remaining.min(shard_size);
            while left > 0 {
                let n = left.min(self.chunk_size as u64) as usize;
                r.read_exact(&mut buf[..n])?;
                out.write_all(&buf[..n])?;
                left -= n as u64;
                remaining -= n as u64;
                self.progress.add_bytes(n as u64);
            }
        }
        out.flush()?;
        Ok(())
    }
}
