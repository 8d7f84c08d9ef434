// Copyright (c) 2024 10x Genomics, Inc. All rights reserved.

// Amino acid level similarity between a germline anchor template and a window of a
// candidate sequence.
//
// score = per_aa * aa_len - constant - (self(template) - pair(template, candidate))
//
// where self and pair are BLOSUM62 sums.  A perfect match scores per_aa * aa_len - constant,
// and each substitution costs its matrix distance from the template residue.

use crate::error::{JunctionError, Result};
use crate::heuristics::Heuristics;
use crate::read::is_resolved;
use amino::aa_seq;
use bio::scores::blosum62;

/// Sum of BLOSUM62 scores of two equal-length amino acid sequences.
pub fn blosum_pair_score(a: &[u8], b: &[u8]) -> i32 {
    a.iter().zip(b.iter()).map(|(x, y)| blosum62(*x, *y)).sum()
}

/// How far the candidate falls short of the template's own BLOSUM62 score.
pub fn blosum_distance(template_aa: &[u8], candidate_aa: &[u8]) -> i32 {
    blosum_pair_score(template_aa, template_aa) - blosum_pair_score(template_aa, candidate_aa)
}

#[derive(Clone, Copy, Debug)]
pub struct AnchorSimilarityScorer {
    per_aa: i32,
    constant: i32,
}

impl AnchorSimilarityScorer {
    pub fn new(heur: &Heuristics) -> AnchorSimilarityScorer {
        AnchorSimilarityScorer {
            per_aa: heur.blosum_per_aa,
            constant: heur.blosum_constant,
        }
    }

    /// The score of a perfect match of the given amino acid length.
    pub fn max_score(&self, aa_len: usize) -> i32 {
        self.per_aa * aa_len as i32 - self.constant
    }

    // Score a candidate window against a template of the same length.  An unresolved base on
    // one side takes the other side's base, so ambiguity is never penalized; unresolved on
    // both sides at once is an error in the caller.

    pub fn score(&self, template: &[u8], candidate: &[u8]) -> Result<i32> {
        if template.len() != candidate.len() {
            return Err(JunctionError::AnchorLengthMismatch {
                template: template.len(),
                candidate: candidate.len(),
            });
        }
        if template.len() % 3 != 0 {
            return Err(JunctionError::AnchorNotCodonAligned {
                len: template.len(),
            });
        }
        let mut t = template.to_vec();
        let mut c = candidate.to_vec();
        for i in 0..t.len() {
            match (is_resolved(t[i]), is_resolved(c[i])) {
                (true, true) => {}
                (false, true) => t[i] = c[i],
                (true, false) => c[i] = t[i],
                (false, false) => return Err(JunctionError::AmbiguousAnchorBase { pos: i }),
            }
        }
        let (taa, caa) = (aa_seq(&t, 0), aa_seq(&c, 0));
        Ok(self.max_score(taa.len()) - blosum_distance(&taa, &caa))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer() -> AnchorSimilarityScorer {
        AnchorSimilarityScorer::new(&Heuristics::default())
    }

    #[test]
    fn test_self_score_is_max() {
        let s = scorer();
        let templates: [&[u8]; 3] = [b"TGTGCCAGC", b"TTTGGGCCAGGG", b"TGGGGCCAAGGAACC"];
        for t in templates {
            assert_eq!(s.score(t, t).unwrap(), s.max_score(t.len() / 3));
        }
        assert_eq!(s.max_score(10), 24);
    }

    #[test]
    fn test_substitution_costs_matrix_distance() {
        let s = scorer();
        // CAS -> CAC: distance blosum(S,S) - blosum(S,C) = 4 - (-1)
        let score = s.score(b"TGTGCCAGC", b"TGTGCCTGC").unwrap();
        assert_eq!(score, s.max_score(3) - 5);
        // A synonymous change costs nothing.
        assert_eq!(s.score(b"TGTGCCAGC", b"TGCGCAAGT").unwrap(), s.max_score(3));
    }

    #[test]
    fn test_unresolved_base_takes_other_side() {
        let s = scorer();
        assert_eq!(s.score(b"TGTGCCAGC", b"TGTGCNAGC").unwrap(), s.max_score(3));
        assert_eq!(s.score(b"TNTGCCAGC", b"TGTGCCAGC").unwrap(), s.max_score(3));
    }

    #[test]
    fn test_caller_errors() {
        let s = scorer();
        assert!(matches!(
            s.score(b"TNTGCC", b"TNTGCC"),
            Err(JunctionError::AmbiguousAnchorBase { pos: 1 })
        ));
        assert!(matches!(
            s.score(b"TGTGCC", b"TGTGCCAGC"),
            Err(JunctionError::AnchorLengthMismatch { .. })
        ));
        assert!(matches!(
            s.score(b"TGTG", b"TGTG"),
            Err(JunctionError::AnchorNotCodonAligned { len: 4 })
        ));
    }

    #[test]
    fn test_distance_symmetry_of_identity() {
        assert_eq!(blosum_distance(b"CASS", b"CASS"), 0);
        assert!(blosum_distance(b"CASS", b"WASS") > 0);
    }
}
