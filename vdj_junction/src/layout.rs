// Copyright (c) 2024 10x Genomics, Inc. All rights reserved.

// ConsensusLayout: per-position base counts over a set of member reads.
//
// A layout has one aligned position, the largest aligned position of any member read.  Base i
// of a member read r sits at index aligned_pos - r.aligned_pos + i of the layout.  Two count
// tables are kept, one over all bases and one over high quality bases only.  Bases other than
// A, C, G, T are not counted.

use crate::heuristics::Heuristics;
use crate::read::{base_index, Read, ReadKey, BASES};
use std::collections::HashSet;

#[derive(Clone, Debug)]
pub struct ConsensusLayout {
    aligned_pos: i32,
    all: Vec<[u32; 4]>,
    hq: Vec<[u32; 4]>,
    keys: HashSet<ReadKey>,
    reads: Vec<Read>,
    min_base_quality: u8,
}

// Most frequent base, ties to the first of ACGT; None if nothing was counted.

fn call(counts: &[u32; 4]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for j in 0..4 {
        if counts[j] > 0 && best.map_or(true, |b| counts[j] > counts[b]) {
            best = Some(j);
        }
    }
    best
}

impl ConsensusLayout {
    pub fn new(heur: &Heuristics) -> ConsensusLayout {
        ConsensusLayout {
            aligned_pos: 0,
            all: Vec::new(),
            hq: Vec::new(),
            keys: HashSet::new(),
            reads: Vec::new(),
            min_base_quality: heur.min_base_quality,
        }
    }

    pub fn from_reads(reads: &[Read], heur: &Heuristics) -> ConsensusLayout {
        let mut layout = ConsensusLayout::new(heur);
        for r in reads {
            layout.add_read(r);
        }
        layout
    }

    // Add a read.  Returns false and changes nothing if a read with the same identity is
    // already a member, or if the read is empty.

    pub fn add_read(&mut self, read: &Read) -> bool {
        if read.is_empty() || self.keys.contains(&read.key) {
            return false;
        }
        if self.reads.is_empty() {
            self.aligned_pos = read.aligned_pos;
        } else if read.aligned_pos > self.aligned_pos {
            let d = (read.aligned_pos - self.aligned_pos) as usize;
            self.all.splice(0..0, std::iter::repeat([0; 4]).take(d));
            self.hq.splice(0..0, std::iter::repeat([0; 4]).take(d));
            self.aligned_pos = read.aligned_pos;
        }
        let start = (self.aligned_pos - read.aligned_pos) as usize;
        let stop = start + read.len();
        if self.all.len() < stop {
            self.all.resize(stop, [0; 4]);
            self.hq.resize(stop, [0; 4]);
        }
        for i in 0..read.len() {
            if let Some(j) = base_index(read.seq[i]) {
                self.all[start + i][j] += 1;
                if read.qual[i] >= self.min_base_quality {
                    self.hq[start + i][j] += 1;
                }
            }
        }
        self.keys.insert(read.key.clone());
        self.reads.push(read.clone());
        true
    }

    // Merge two layouts into a new one: A's reads as they are, then B's reads with their
    // aligned positions moved by b_shift.  Reads present in both are counted once.

    pub fn merge(a: &ConsensusLayout, b: &ConsensusLayout, b_shift: i32) -> ConsensusLayout {
        let mut m = a.empty_like();
        for r in a.reads.iter() {
            m.add_read(r);
        }
        for r in b.reads.iter() {
            m.add_read(&r.shifted(b_shift));
        }
        m
    }

    fn empty_like(&self) -> ConsensusLayout {
        ConsensusLayout {
            aligned_pos: 0,
            all: Vec::new(),
            hq: Vec::new(),
            keys: HashSet::new(),
            reads: Vec::new(),
            min_base_quality: self.min_base_quality,
        }
    }

    pub fn aligned_pos(&self) -> i32 {
        self.aligned_pos
    }

    pub fn len(&self) -> usize {
        self.all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    pub fn read_count(&self) -> usize {
        self.reads.len()
    }

    pub fn reads(&self) -> &[Read] {
        &self.reads
    }

    pub fn contains(&self, key: &ReadKey) -> bool {
        self.keys.contains(key)
    }

    /// Layout index of base 0 of a read with the given aligned position.
    pub fn read_start(&self, read_aligned_pos: i32) -> i32 {
        self.aligned_pos - read_aligned_pos
    }

    /// The high quality call at a position, if any high quality base was seen there.
    pub fn hq_base_at(&self, i: usize) -> Option<u8> {
        call(&self.hq[i]).map(|j| BASES[j])
    }

    pub fn base_at(&self, i: usize) -> u8 {
        match call(&self.hq[i]).or_else(|| call(&self.all[i])) {
            Some(j) => BASES[j],
            None => b'N',
        }
    }

    /// Consensus: the high quality call where there is one, else the call over all bases,
    /// else N.
    pub fn sequence(&self) -> Vec<u8> {
        (0..self.len()).map(|i| self.base_at(i)).collect()
    }

    pub fn high_quality_sequence(&self) -> Vec<u8> {
        (0..self.len())
            .map(|i| self.hq_base_at(i).unwrap_or(b'N'))
            .collect()
    }

    /// Number of reads agreeing with the consensus base at a position.
    pub fn support_at(&self, i: usize) -> u32 {
        match base_index(self.base_at(i)) {
            Some(j) => self.all[i][j],
            None => 0,
        }
    }

    pub fn support(&self) -> Vec<u32> {
        (0..self.len()).map(|i| self.support_at(i)).collect()
    }

    /// Number of counted bases at a position.
    pub fn coverage(&self, i: usize) -> u32 {
        self.all[i].iter().sum()
    }

    pub fn counts_at(&self, i: usize) -> &[u32; 4] {
        &self.all[i]
    }

    pub fn hq_counts_at(&self, i: usize) -> &[u32; 4] {
        &self.hq[i]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(name: &str, seq: &[u8], ap: i32) -> Read {
        Read::new(name, true, seq, &vec![30; seq.len()], ap).unwrap()
    }

    #[test]
    fn test_duplicate_read_is_noop() {
        let heur = Heuristics::default();
        let mut layout = ConsensusLayout::new(&heur);
        let r = read("r1", b"ACGT", 0);
        assert!(layout.add_read(&r));
        let before = (layout.sequence(), layout.support());
        assert!(!layout.add_read(&r));
        // Same identity at another position is still a duplicate.
        assert!(!layout.add_read(&r.shifted(3)));
        assert_eq!((layout.sequence(), layout.support()), before);
        assert_eq!(layout.read_count(), 1);
    }

    #[test]
    fn test_shift_right_on_larger_aligned_pos() {
        let heur = Heuristics::default();
        let mut layout = ConsensusLayout::new(&heur);
        layout.add_read(&read("r1", b"GTAA", 0));
        layout.add_read(&read("r2", b"ACGT", 2));
        assert_eq!(layout.aligned_pos(), 2);
        assert_eq!(layout.sequence(), b"ACGTAA".to_vec());
        assert_eq!(layout.support(), vec![1, 1, 2, 2, 1, 1]);
        assert_eq!(layout.read_start(0), 2);
    }

    #[test]
    fn test_consensus_prefers_high_quality() {
        let heur = Heuristics::default();
        let mut layout = ConsensusLayout::new(&heur);
        layout.add_read(&Read::new("a", true, b"A", &[5], 0).unwrap());
        layout.add_read(&Read::new("b", true, b"A", &[5], 0).unwrap());
        layout.add_read(&Read::new("c", true, b"C", &[40], 0).unwrap());
        assert_eq!(layout.sequence(), b"C".to_vec());
        assert_eq!(layout.support_at(0), 1);
        assert_eq!(layout.coverage(0), 3);

        // Ties go to the first of ACGT; low quality only gives no high quality call.
        let mut layout = ConsensusLayout::new(&heur);
        layout.add_read(&Read::new("a", true, b"GN", &[5, 5], 0).unwrap());
        layout.add_read(&Read::new("b", true, b"CN", &[5, 5], 0).unwrap());
        assert_eq!(layout.sequence(), b"CN".to_vec());
        assert_eq!(layout.high_quality_sequence(), b"NN".to_vec());
    }

    #[test]
    fn test_merge_sums_and_commutes() {
        let heur = Heuristics::default();
        let a = ConsensusLayout::from_reads(
            &[read("a1", b"ACGT", 0), read("a2", b"ACG", 0)],
            &heur,
        );
        let b = ConsensusLayout::from_reads(&[read("b1", b"GTAA", 0)], &heur);
        // B's index 0 lands on A's index 2.
        let ab = ConsensusLayout::merge(&a, &b, -2);
        assert_eq!(ab.sequence(), b"ACGTAA".to_vec());
        assert_eq!(ab.support(), vec![2, 2, 3, 2, 1, 1]);
        let ba = ConsensusLayout::merge(&b, &a, 2);
        assert_eq!(ba.sequence(), ab.sequence());
        assert_eq!(ba.support(), ab.support());
        assert_eq!(ba.aligned_pos() - ab.aligned_pos(), 2);
        assert_eq!(ab.read_count(), 3);
    }
}
