// Copyright (c) 2024 10x Genomics, Inc. All rights reserved.

// Reads as seen by the layout code: bases, qualities and an aligned position.
//
// The aligned position is the index within the read of the base that sits on the shared
// frame point of its gene type, e.g. the last base of a V anchor or the first base of a J
// anchor.  It may lie outside the read.  Two reads with aligned positions p and q place their
// base i and base i + p - q on the same frame coordinate.

use crate::error::{JunctionError, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Identity of a read: its name plus which mate it is.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReadKey {
    pub name: Arc<str>,
    pub first_of_pair: bool,
}

impl fmt::Display for ReadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, if self.first_of_pair { 1 } else { 2 })
    }
}

// Cloning is cheap, the bases and qualities are shared.

#[derive(Clone, Debug)]
pub struct Read {
    pub key: ReadKey,
    pub seq: Arc<[u8]>,
    pub qual: Arc<[u8]>,
    pub aligned_pos: i32,
}

impl Read {
    /// A read from its bases and qualities, which must have the same length.
    pub fn new(
        name: &str,
        first_of_pair: bool,
        seq: &[u8],
        qual: &[u8],
        aligned_pos: i32,
    ) -> Result<Read> {
        if seq.len() != qual.len() {
            return Err(JunctionError::ReadLengthMismatch {
                name: name.to_string(),
                bases: seq.len(),
                quals: qual.len(),
            });
        }
        Ok(Read {
            key: ReadKey {
                name: Arc::from(name),
                first_of_pair,
            },
            seq: Arc::from(seq.to_ascii_uppercase()),
            qual: Arc::from(qual),
            aligned_pos,
        })
    }

    pub fn len(&self) -> usize {
        self.seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    /// The same read placed at a different aligned position.
    pub fn with_aligned_pos(&self, aligned_pos: i32) -> Read {
        Read {
            aligned_pos,
            ..self.clone()
        }
    }

    pub fn shifted(&self, shift: i32) -> Read {
        self.with_aligned_pos(self.aligned_pos + shift)
    }
}

/// Read name to every read carrying that name, both mates included.
pub type MateReads = HashMap<Arc<str>, Vec<Read>>;

pub fn make_mate_reads(reads: &[Read]) -> MateReads {
    let mut mates = MateReads::new();
    for r in reads {
        let v = mates.entry(r.key.name.clone()).or_default();
        if !v.iter().any(|x| x.key == r.key) {
            v.push(r.clone());
        }
    }
    mates
}

pub fn base_index(b: u8) -> Option<usize> {
    match b {
        b'A' => Some(0),
        b'C' => Some(1),
        b'G' => Some(2),
        b'T' => Some(3),
        _ => None,
    }
}

pub fn is_resolved(b: u8) -> bool {
    base_index(b).is_some()
}

pub const BASES: &[u8; 4] = b"ACGT";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shift_keeps_identity() {
        let r = Read::new("r1", true, b"acgt", &[30; 4], 2).unwrap();
        assert_eq!(&*r.seq, b"ACGT");
        let s = r.shifted(-3);
        assert_eq!(s.aligned_pos, -1);
        assert_eq!(s.key, r.key);
        assert_eq!(r.key.to_string(), "r1/1");
    }

    #[test]
    fn test_quality_length_must_match() {
        let r = Read::new("r1", false, b"ACGT", &[30; 3], 0);
        assert!(matches!(
            r,
            Err(JunctionError::ReadLengthMismatch {
                bases: 4,
                quals: 3,
                ..
            })
        ));
    }

    #[test]
    fn test_mate_reads() {
        let reads = vec![
            Read::new("a", true, b"AC", &[30; 2], 0).unwrap(),
            Read::new("a", false, b"GT", &[30; 2], 0).unwrap(),
            Read::new("a", false, b"GT", &[30; 2], 0).unwrap(),
            Read::new("b", true, b"TT", &[30; 2], 0).unwrap(),
        ];
        let mates = make_mate_reads(&reads);
        assert_eq!(mates.len(), 2);
        assert_eq!(mates["a"].len(), 2);
    }
}
