// Copyright (c) 2024 10x Genomics, Inc. All rights reserved.

// Anchors and junction candidates.
//
// All positions held by a candidate, its slice bounds and its anchor boundaries alike, are
// coordinates on its consensus layout.  An anchor boundary is the junction side edge of the
// anchor: for V, one past the last anchor base, for J, the first anchor base.  So a V anchor
// of length n covers [boundary - n, boundary) and a J anchor covers [boundary, boundary + n).

use crate::anchor::AnchorMatch;
use crate::error::Result;
use crate::layout::ConsensusLayout;
use crate::refx::GeneRecord;
use amino::have_stop;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::Arc;
use string_utils::stringme;
use vdj_types::{VdjChain, VdjRegion, VjAnchorSide, VjGenePair, VjGeneType};

#[derive(Clone, Debug, PartialEq)]
pub enum Anchor {
    // Placed because the layout's reads carry the anchor: read_count reads support it.
    ByReadMatch {
        boundary: usize,
        len: usize,
        gene_type: VjGeneType,
        read_count: usize,
    },
    // Found by similarity search against germline anchors.
    ByBlosum {
        boundary: usize,
        len: usize,
        gene_type: VjGeneType,
        template: Vec<u8>,
        similarity_score: i32,
        genes: Vec<GeneRecord>,
    },
}

impl Anchor {
    /// Anchor from a search hit on a sequence whose index 0 is layout position `offset`.
    pub fn from_match(m: &AnchorMatch, offset: usize) -> Result<Anchor> {
        Ok(Anchor::ByBlosum {
            boundary: m.anchor_boundary()? + offset,
            len: m.len(),
            gene_type: m.gene_type()?,
            template: m.template_anchor.clone(),
            similarity_score: m.similarity_score,
            genes: m.template_genes.clone(),
        })
    }

    pub fn boundary(&self) -> usize {
        match self {
            Anchor::ByReadMatch { boundary, .. } | Anchor::ByBlosum { boundary, .. } => *boundary,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Anchor::ByReadMatch { len, .. } | Anchor::ByBlosum { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn gene_type(&self) -> VjGeneType {
        match self {
            Anchor::ByReadMatch { gene_type, .. } | Anchor::ByBlosum { gene_type, .. } => {
                *gene_type
            }
        }
    }

    pub fn side(&self) -> VjAnchorSide {
        self.gene_type().side()
    }

    pub fn is_read_match(&self) -> bool {
        matches!(self, Anchor::ByReadMatch { .. })
    }

    /// Positions covered, clipped to [0, seq_len).
    pub fn range(&self, seq_len: usize) -> Range<usize> {
        let b = self.boundary();
        let r = match self.side() {
            VjAnchorSide::V => b.saturating_sub(self.len())..b,
            VjAnchorSide::J => b..b + self.len(),
        };
        r.start.min(seq_len)..r.end.min(seq_len)
    }

    /// The same anchor with its boundary moved by delta, or None if it would go negative.
    pub fn shifted(&self, delta: i32) -> Option<Anchor> {
        let b = self.boundary() as i64 + delta as i64;
        if b < 0 {
            return None;
        }
        let mut a = self.clone();
        match &mut a {
            Anchor::ByReadMatch { boundary, .. } | Anchor::ByBlosum { boundary, .. } => {
                *boundary = b as usize
            }
        }
        Some(a)
    }
}

// A V anchor must end before a J anchor starts.

pub fn anchors_ordered(v: &Anchor, j: &Anchor) -> bool {
    v.boundary() <= j.boundary()
}

#[derive(Clone, Debug)]
pub struct JunctionCandidate {
    pub layout: Arc<ConsensusLayout>,
    pub start: usize,
    pub end: usize,
    pub v_anchor: Option<Anchor>,
    pub j_anchor: Option<Anchor>,
}

impl JunctionCandidate {
    // Build a candidate, dropping the V anchor if it runs into the J anchor.

    pub fn new(
        layout: Arc<ConsensusLayout>,
        start: usize,
        end: usize,
        v_anchor: Option<Anchor>,
        j_anchor: Option<Anchor>,
    ) -> JunctionCandidate {
        let end = end.min(layout.len());
        let start = start.min(end);
        let v_anchor = match (&v_anchor, &j_anchor) {
            (Some(v), Some(j)) if !anchors_ordered(v, j) => None,
            _ => v_anchor,
        };
        JunctionCandidate {
            layout,
            start,
            end,
            v_anchor,
            j_anchor,
        }
    }

    pub fn sequence(&self) -> Vec<u8> {
        self.layout.sequence()[self.start..self.end].to_vec()
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    /// Per-position support over the candidate slice.
    pub fn support(&self) -> Vec<u32> {
        (self.start..self.end)
            .map(|i| self.layout.support_at(i))
            .collect()
    }

    pub fn read_count(&self) -> usize {
        self.layout.read_count()
    }

    pub fn v_anchor_range(&self) -> Option<Range<usize>> {
        self.v_anchor.as_ref().map(|a| a.range(self.layout.len()))
    }

    pub fn j_anchor_range(&self) -> Option<Range<usize>> {
        self.j_anchor.as_ref().map(|a| a.range(self.layout.len()))
    }

    pub fn is_one_sided(&self) -> bool {
        self.v_anchor.is_none() || self.j_anchor.is_none()
    }

    pub fn gene_pair(&self) -> VjGenePair {
        VjGenePair {
            v: self.v_anchor.as_ref().map(|a| a.gene_type()),
            j: self.j_anchor.as_ref().map(|a| a.gene_type()),
        }
    }

    pub fn chain(&self) -> Option<VdjChain> {
        self.v_anchor
            .as_ref()
            .or(self.j_anchor.as_ref())
            .map(|a| a.gene_type().chain())
    }

    // Is there a stop codon in the sequence, read in the frame of the V anchor?  None without
    // a V anchor.

    pub fn has_stop_in_v_frame(&self) -> Option<bool> {
        let v = self.v_anchor.as_ref()?;
        let seq = self.sequence();
        let frame = (v.boundary() as i64 - self.start as i64).rem_euclid(3) as usize;
        Some((frame..seq.len()).step_by(3).any(|j| have_stop(&seq, j)))
    }

    /// Flat description of the candidate, with positions relative to `sequence()`.
    pub fn summary(&self) -> CandidateSummary {
        let anchor_summary = |a: &Anchor| {
            let r = a.range(self.layout.len());
            let clip = |x: usize| x.clamp(self.start, self.end) - self.start;
            let (method, similarity_score, genes) = match a {
                Anchor::ByReadMatch { .. } => ("read_match".to_string(), None, Vec::new()),
                Anchor::ByBlosum {
                    similarity_score,
                    genes,
                    ..
                } => (
                    "blosum".to_string(),
                    Some(*similarity_score),
                    genes.iter().map(|g| g.name.clone()).collect(),
                ),
            };
            AnchorSummary {
                method,
                gene_type: a.gene_type(),
                region: a.gene_type().region(),
                start: clip(r.start),
                end: clip(r.end),
                similarity_score,
                genes,
            }
        };
        CandidateSummary {
            gene_pair: self.gene_pair().to_string(),
            chain: self.chain(),
            in_frame_stop: self.has_stop_in_v_frame(),
            sequence: stringme(&self.sequence()),
            support: self.support(),
            read_count: self.read_count(),
            v_anchor: self.v_anchor.as_ref().map(anchor_summary),
            j_anchor: self.j_anchor.as_ref().map(anchor_summary),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnchorSummary {
    pub method: String,
    pub gene_type: VjGeneType,
    pub region: VdjRegion,
    pub start: usize,
    pub end: usize,
    pub similarity_score: Option<i32>,
    pub genes: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CandidateSummary {
    pub gene_pair: String,
    pub chain: Option<VdjChain>,
    pub in_frame_stop: Option<bool>,
    pub sequence: String,
    pub support: Vec<u32>,
    pub read_count: usize,
    pub v_anchor: Option<AnchorSummary>,
    pub j_anchor: Option<AnchorSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heuristics::Heuristics;
    use crate::read::Read;

    fn layout(seq: &[u8]) -> Arc<ConsensusLayout> {
        let heur = Heuristics::default();
        let r = Read::new("r", true, seq, &vec![40; seq.len()], 0).unwrap();
        Arc::new(ConsensusLayout::from_reads(&[r], &heur))
    }

    fn read_match(gene_type: VjGeneType, boundary: usize, len: usize) -> Anchor {
        Anchor::ByReadMatch {
            boundary,
            len,
            gene_type,
            read_count: 1,
        }
    }

    #[test]
    fn test_anchor_ranges() {
        let v = read_match(VjGeneType::TRBV, 5, 4);
        let j = read_match(VjGeneType::TRBJ, 5, 4);
        assert_eq!(v.range(20), 1..5);
        assert_eq!(j.range(20), 5..9);
        assert_eq!(j.range(7), 5..7);
        assert_eq!(read_match(VjGeneType::TRBV, 2, 4).range(20), 0..2);
        assert!(anchors_ordered(&v, &j));
        assert_eq!(v.shifted(-5).map(|a| a.boundary()), Some(0));
        assert!(v.shifted(-6).is_none());
    }

    #[test]
    fn test_overlapping_v_anchor_is_dropped() {
        let l = layout(b"AAAACCCCGGGGTTTT");
        let c = JunctionCandidate::new(
            l.clone(),
            0,
            16,
            Some(read_match(VjGeneType::TRBV, 9, 4)),
            Some(read_match(VjGeneType::TRBJ, 8, 4)),
        );
        assert!(c.v_anchor.is_none());
        assert!(c.is_one_sided());
        let c = JunctionCandidate::new(
            l,
            2,
            12,
            Some(read_match(VjGeneType::TRBV, 6, 4)),
            Some(read_match(VjGeneType::TRBJ, 8, 4)),
        );
        assert!(!c.is_one_sided());
        assert_eq!(c.sequence(), b"AACCCCGGGG".to_vec());
        assert_eq!(c.support(), vec![1; 10]);
        assert_eq!(c.gene_pair().to_string(), "TRBV/TRBJ");
    }

    #[test]
    fn test_stop_in_v_frame() {
        // V anchor ends at 3, so codons start at 0, 3, 6.
        let l = layout(b"TGTTAGCCC");
        let v = read_match(VjGeneType::TRBV, 3, 3);
        let c = JunctionCandidate::new(l.clone(), 0, 9, Some(v.clone()), None);
        assert_eq!(c.has_stop_in_v_frame(), Some(true));
        // The frame follows the anchor, not the slice start.
        let c = JunctionCandidate::new(l.clone(), 1, 9, Some(v), None);
        assert_eq!(c.has_stop_in_v_frame(), Some(true));
        // Anchor ends at 4: GTT AGC, then a partial codon.
        let v = read_match(VjGeneType::TRBV, 4, 3);
        let c = JunctionCandidate::new(l.clone(), 0, 9, Some(v), None);
        assert_eq!(c.has_stop_in_v_frame(), Some(false));
        let c = JunctionCandidate::new(l, 0, 9, None, None);
        assert_eq!(c.has_stop_in_v_frame(), None);
    }

    #[test]
    fn test_summary_json() {
        let l = layout(b"AAAACCCCGGGGTTTT");
        let c = JunctionCandidate::new(
            l,
            2,
            12,
            Some(read_match(VjGeneType::TRBV, 6, 4)),
            None,
        );
        let s = c.summary();
        assert_eq!(s.gene_pair, "TRBV/None");
        let v = s.v_anchor.as_ref().unwrap();
        assert_eq!((v.start, v.end), (0, 4));
        assert_eq!(v.method, "read_match");
        assert_eq!(v.region, VdjRegion::V);
        assert_eq!(s.chain, Some(VdjChain::TRB));
        let json = serde_json::to_string(&s).unwrap();
        let back: CandidateSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
