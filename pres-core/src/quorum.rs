//! Picks the authoritative configuration among the three stored copies.
//!
//! A copy is trusted when it is well formed and identical to at least one of
//! the other two copies. The first trusted copy wins.

use crate::conf::{Conf, COPIES};
use crate::error::{PresError, Result, Warning};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Quorum {
    pub authoritative: Conf,
    /// Indices (0..3) of the trusted copies, ascending.
    pub trusted: Vec<usize>,
}

impl Quorum {
    pub fn warning(&self) -> Option<Warning> {
        (self.trusted.len() < COPIES)
            .then_some(Warning::MetadataPartiallyDamaged { trusted: self.trusted.len() })
    }
}

pub fn trusted_copies(confs: &[Conf; COPIES]) -> Vec<usize> {
    (0..COPIES)
        .filter(|&i| {
            confs[i].is_well_formed()
                && (0..COPIES).any(|j| j != i && confs[j] == confs[i])
        })
        .collect()
}

pub fn authoritative(confs: &[Conf; COPIES]) -> Result<Quorum> {
    let trusted = trusted_copies(confs);
    let first = *trusted.first().ok_or(PresError::MetadataUnreadable)?;
    Ok(Quorum { authoritative: confs[first].clone(), trusted })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn good() -> Conf {
        Conf::new("1", 400, 4, 2, (0..6).map(|i| (i * 11).to_string()).collect())
    }

    fn bent(n: u64) -> Conf {
        Conf { data_len: n, ..good() }
    }

    #[test]
    fn all_three_agree() {
        let q = authoritative(&[good(), good(), good()]).unwrap();
        assert_eq!(q.trusted, vec![0, 1, 2]);
        assert_eq!(q.authoritative, good());
        assert_eq!(q.warning(), None);
    }

    #[test]
    fn one_damaged_copy_is_outvoted() {
        let q = authoritative(&[bent(401), good(), good()]).unwrap();
        assert_eq!(q.trusted, vec![1, 2]);
        assert_eq!(q.authoritative, good());
        assert_eq!(q.warning(), Some(Warning::MetadataPartiallyDamaged { trusted: 2 }));
    }

    #[test]
    fn two_disagreeing_damaged_copies_are_fatal() {
        let err = authoritative(&[bent(401), bent(402), good()]).unwrap_err();
        assert!(matches!(err, PresError::MetadataUnreadable));
    }

    #[test]
    fn agreeing_but_malformed_copies_are_not_trusted() {
        let err = authoritative(&[Conf::default(), Conf::default(), good()]).unwrap_err();
        assert!(matches!(err, PresError::MetadataUnreadable));
    }

    #[test]
    fn checksum_order_matters() {
        let mut swapped = good();
        swapped.shard_crc32cs.swap(0, 1);
        let q = authoritative(&[swapped, good(), good()]).unwrap();
        assert_eq!(q.trusted, vec![1, 2]);
    }

    #[test]
    fn two_identically_damaged_copies_win_over_the_odd_one() {
        // agreement is all the quorum can observe
        let q = authoritative(&[good(), bent(7), bent(7)]).unwrap();
        assert_eq!(q.trusted, vec![1, 2]);
        assert_eq!(q.authoritative.data_len, 7);
    }
}
