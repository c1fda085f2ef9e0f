//! Self-describing configuration blocks stored three times at the end of an archive.
//!
//! ```text
//! [conf]
//! version=1
//! data_len=10000
//! data_shard_cnt=100
//! parity_shard_cnt=3
//! shard_1_crc32c=123456789
//! ...
//!
//! [conf_copy_1]
//! ...
//!
//! [conf_copy_2]
//! ...
//! ```
//!
//! Parsing is a line-oriented state machine keyed on the last marker seen.
//! Anything it does not recognize is skipped, so a damaged copy degrades into
//! an incomplete record instead of aborting the scan.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::options::{MAX_TOTAL_SHARDS, MAX_VERSION_LEN};

pub const COPIES: usize = 3;
pub const MARKERS: [&str; COPIES] = ["[conf]", "[conf_copy_1]", "[conf_copy_2]"];

/// Bytes read from the end of an archive when looking for the tail.
pub const TAIL_WINDOW: u64 = 64 * 1024;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Conf {
    pub version: String,
    pub data_len: u64,
    pub data_shard_cnt: u8,
    pub parity_shard_cnt: u8,
    /// Data shards first, then parity shards. Empty string = entry missing.
    pub shard_crc32cs: Vec<String>,
}

impl Conf {
    pub fn new(
        version: &str,
        data_len: u64,
        data_shard_cnt: u8,
        parity_shard_cnt: u8,
        shard_crc32cs: Vec<String>,
    ) -> Self {
        Self {
            version: version.to_string(),
            data_len,
            data_shard_cnt,
            parity_shard_cnt,
            shard_crc32cs,
        }
    }

    pub fn total_shards(&self) -> usize {
        self.data_shard_cnt as usize + self.parity_shard_cnt as usize
    }

    pub fn is_well_formed(&self) -> bool {
        let present = self.shard_crc32cs.iter().filter(|c| !c.is_empty()).count();
        !self.version.is_empty()
            && self.data_len > 0
            && self.data_shard_cnt > 0
            && self.parity_shard_cnt > 0
            && self.shard_crc32cs.len() == self.total_shards()
            && present >= 2
    }

    /// One copy's body, without its marker.
    pub fn write_body<W: Write>(&self, w: &mut W) -> io::Result<()> {
        writeln!(w, "version={}", self.version)?;
        writeln!(w, "data_len={}", self.data_len)?;
        writeln!(w, "data_shard_cnt={}", self.data_shard_cnt)?;
        writeln!(w, "parity_shard_cnt={}", self.parity_shard_cnt)?;
        for (i, crc) in self.shard_crc32cs.iter().enumerate() {
            writeln!(w, "shard_{}_crc32c={}", i + 1, crc)?;
        }
        Ok(())
    }

    /// The full metadata tail: a separating newline, then all three marked copies.
    pub fn write_tail<W: Write>(&self, w: &mut W) -> io::Result<()> {
        // parity bytes precede the tail; start the first marker on a fresh line
        writeln!(w)?;
        for (i, marker) in MARKERS.iter().enumerate() {
            if i > 0 {
                writeln!(w)?;
            }
            writeln!(w, "{marker}")?;
            self.write_body(w)?;
        }
        Ok(())
    }

    pub fn tail_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        // writing into a Vec cannot fail
        let _ = self.write_tail(&mut buf);
        buf
    }
}

/// Largest tail `write_tail` can produce for the given counts.
pub fn max_tail_len(data_shard_cnt: u8, parity_shard_cnt: u8) -> u64 {
    let shards = data_shard_cnt as u64 + parity_shard_cnt as u64;
    let idx_digits = shards.max(1).to_string().len() as u64;
    let crc_line = "shard__crc32c=".len() as u64 + idx_digits + u32::MAX.to_string().len() as u64 + 1;
    let body = "version=".len() as u64
        + MAX_VERSION_LEN as u64
        + 1
        + "data_len=".len() as u64
        + u64::MAX.to_string().len() as u64
        + 1
        + "data_shard_cnt=255\n".len() as u64
        + "parity_shard_cnt=255\n".len() as u64
        + shards * crc_line;
    let markers: u64 = MARKERS.iter().map(|m| m.len() as u64 + 1).sum();
    // leading separator plus the blank line between copies
    1 + (COPIES as u64 - 1) + markers + COPIES as u64 * body
}

#[derive(Default)]
struct PartialConf {
    version: Option<String>,
    data_len: Option<u64>,
    data_shard_cnt: Option<u8>,
    parity_shard_cnt: Option<u8>,
    crcs: BTreeMap<usize, String>,
}

impl PartialConf {
    fn assign(&mut self, key: &str, value: &str) {
        match key {
            "version" => self.version = Some(value.to_string()),
            "data_len" => {
                if let Ok(v) = value.parse() {
                    self.data_len = Some(v);
                }
            }
            "data_shard_cnt" => {
                if let Ok(v) = value.parse() {
                    self.data_shard_cnt = Some(v);
                }
            }
            "parity_shard_cnt" => {
                if let Ok(v) = value.parse() {
                    self.parity_shard_cnt = Some(v);
                }
            }
            _ => {
                let idx = key
                    .strip_prefix("shard_")
                    .and_then(|k| k.strip_suffix("_crc32c"))
                    .and_then(|n| n.parse::<usize>().ok());
                match idx {
                    Some(n) if (1..=MAX_TOTAL_SHARDS).contains(&n) && value.parse::<u32>().is_ok() => {
                        self.crcs.insert(n, value.to_string());
                    }
                    _ => {}
                }
            }
        }
    }

    fn finish(self) -> Conf {
        let data_shard_cnt = self.data_shard_cnt.unwrap_or(0);
        let parity_shard_cnt = self.parity_shard_cnt.unwrap_or(0);
        let total = data_shard_cnt as usize + parity_shard_cnt as usize;
        let mut crcs = self.crcs;
        let shard_crc32cs = (1..=total).map(|n| crcs.remove(&n).unwrap_or_default()).collect();
        Conf {
            version: self.version.unwrap_or_default(),
            data_len: self.data_len.unwrap_or(0),
            data_shard_cnt,
            parity_shard_cnt,
            shard_crc32cs,
        }
    }
}

/// Parses whatever copies can be found in `text`. Missing or damaged fields
/// come back as defaults, which [`Conf::is_well_formed`] rejects.
pub fn parse(text: &[u8]) -> [Conf; COPIES] {
    let mut partial: [PartialConf; COPIES] = Default::default();
    let mut current: Option<usize> = None;
    for raw in text.split(|&b| b == b'\n') {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim();
        if let Some(i) = MARKERS.iter().position(|m| *m == line) {
            // a marker starts the copy afresh
            partial[i] = PartialConf::default();
            current = Some(i);
            continue;
        }
        let Some(i) = current else {
            continue;
        };
        if let Some((key, value)) = line.split_once('=') {
            partial[i].assign(key.trim(), value.trim());
        }
    }
    partial.map(PartialConf::finish)
}

/// Reads the last [`TAIL_WINDOW`] bytes of `path` and parses them.
pub fn read_confs(path: &Path) -> io::Result<[Conf; COPIES]> {
    let mut f = File::open(path)?;
    let len = f.metadata()?.len();
    let start = len.saturating_sub(TAIL_WINDOW);
    f.seek(SeekFrom::Start(start))?;
    let mut buf = Vec::with_capacity((len - start) as usize);
    f.read_to_end(&mut buf)?;
    Ok(parse(&buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Conf {
        Conf::new("1", 10_000, 4, 2, (0..6).map(|i| (1000 + i).to_string()).collect())
    }

    #[test]
    fn tail_layout_is_stable() {
        let c = Conf::new("1", 42, 1, 1, vec!["7".into(), "8".into()]);
        let text = String::from_utf8(c.tail_bytes()).unwrap();
        let body = "version=1\ndata_len=42\ndata_shard_cnt=1\nparity_shard_cnt=1\nshard_1_crc32c=7\nshard_2_crc32c=8\n";
        let expected = format!("\n[conf]\n{body}\n[conf_copy_1]\n{body}\n[conf_copy_2]\n{body}");
        assert_eq!(text, expected);
    }

    #[test]
    fn parse_recovers_all_copies() {
        let c = sample();
        let confs = parse(&c.tail_bytes());
        for copy in &confs {
            assert_eq!(copy, &c);
            assert!(copy.is_well_formed());
        }
    }

    #[test]
    fn binary_prefix_is_ignored() {
        let c = sample();
        let mut bytes = vec![0xFFu8, 0x00, b'=', b'\n', 0x80, b'v', b'=', b'1'];
        bytes.extend_from_slice(&c.tail_bytes());
        assert_eq!(parse(&bytes)[0], c);
    }

    #[test]
    fn garbage_lines_inside_a_copy_are_skipped() {
        let c = sample();
        let text = String::from_utf8(c.tail_bytes()).unwrap();
        let text = text.replacen("data_len=10000\n", "data_len=10000\n\u{1}junk line\nnot=a=key\n", 1);
        let confs = parse(text.as_bytes());
        assert_eq!(confs[0], c);
    }

    #[test]
    fn damaged_field_makes_copy_malformed() {
        let c = sample();
        let text = String::from_utf8(c.tail_bytes()).unwrap();
        let text = text.replacen("data_len=10000", "data_len=1x000", 1);
        let confs = parse(text.as_bytes());
        assert_eq!(confs[0].data_len, 0);
        assert!(!confs[0].is_well_formed());
        assert_eq!(confs[1], c);
    }

    #[test]
    fn lost_marker_folds_copy_into_previous_scope() {
        let c = sample();
        let text = String::from_utf8(c.tail_bytes()).unwrap();
        let text = text.replacen("[conf_copy_1]", "[conf_cXpy_1]", 1);
        let confs = parse(text.as_bytes());
        assert_eq!(confs[0], c);
        assert_eq!(confs[1], Conf::default());
        assert_eq!(confs[2], c);
    }

    #[test]
    fn marker_resets_stale_lines_from_earlier_text() {
        let inner = Conf::new("9", 5, 1, 1, vec!["1".into(), "2".into()]);
        let ours = sample();
        let mut bytes = inner.tail_bytes();
        bytes.extend_from_slice(&ours.tail_bytes());
        let confs = parse(&bytes);
        assert!(confs.iter().all(|x| *x == ours));
    }

    #[test]
    fn out_of_range_shard_lines_are_dropped() {
        let text = "[conf]\nversion=1\ndata_len=9\ndata_shard_cnt=1\nparity_shard_cnt=1\nshard_1_crc32c=5\nshard_2_crc32c=6\nshard_3_crc32c=7\nshard_0_crc32c=1\n";
        let c = &parse(text.as_bytes())[0];
        assert_eq!(c.shard_crc32cs, vec!["5".to_string(), "6".to_string()]);
    }

    #[test]
    fn missing_checksums_become_empty_entries() {
        let text = "[conf]\nversion=1\ndata_len=9\ndata_shard_cnt=2\nparity_shard_cnt=1\nshard_1_crc32c=5\nshard_3_crc32c=7\n";
        let c = &parse(text.as_bytes())[0];
        assert_eq!(c.shard_crc32cs, vec!["5".to_string(), String::new(), "7".to_string()]);
        assert!(c.is_well_formed());
    }

    #[test]
    fn well_formedness_rules() {
        assert!(sample().is_well_formed());
        let mut c = sample();
        c.version.clear();
        assert!(!c.is_well_formed());
        let mut c = sample();
        c.data_len = 0;
        assert!(!c.is_well_formed());
        let mut c = sample();
        for crc in c.shard_crc32cs.iter_mut().skip(1) {
            crc.clear();
        }
        assert!(!c.is_well_formed());
    }

    #[test]
    fn window_covers_the_largest_possible_tail() {
        let biggest = Conf::new(
            &"v".repeat(MAX_VERSION_LEN),
            u64::MAX,
            255,
            1,
            vec![u32::MAX.to_string(); 256],
        );
        assert!(biggest.tail_bytes().len() as u64 <= max_tail_len(255, 1));
        assert!(max_tail_len(255, 255) <= TAIL_WINDOW);
        assert!(sample().tail_bytes().len() as u64 <= max_tail_len(4, 2));
    }

    #[test]
    fn read_confs_uses_only_the_tail() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("a.pres");
        let mut bytes = vec![0xABu8; (TAIL_WINDOW as usize) * 2];
        // a full copy far from the end must not be seen
        bytes[..sample().tail_bytes().len()].copy_from_slice(&sample().tail_bytes());
        let ours = Conf::new("1", 77, 1, 1, vec!["3".into(), "4".into()]);
        bytes.extend_from_slice(&ours.tail_bytes());
        std::fs::write(&p, &bytes).unwrap();
        let confs = read_confs(&p).unwrap();
        assert!(confs.iter().all(|c| *c == ours));
    }
}
