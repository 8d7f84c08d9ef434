// Copyright (c) 2024 10x Genomics, Inc. All rights reserved.

// Tunable constants for layout construction, anchor search, joining and deduplication.  One
// Heuristics value is built by the caller and passed explicitly to every component.

use crate::error::{JunctionError, Result};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Heuristics {
    // Bases with quality at least this are high quality.
    pub min_base_quality: u8,
    // Weight of a low quality occurrence relative to a high quality one, in node support.
    pub low_quality_weight: f64,
    // Number of bases a read must follow an existing branch before it may fork from it.
    pub tree_min_overlap: usize,
    // A node seals once its top child's support exceeds this and is this many times the
    // runner-up's.
    pub seal_factor: f64,
    // Bound on reassignment rounds after the first pass.
    pub max_reassign_rounds: usize,
    // Each round, the seal factor's excess over one is multiplied by this.
    pub seal_relax: f64,

    // Length in bases of a read-matched anchor.
    pub anchor_len: usize,
    // Similarity score = blosum_per_aa * aa_len - blosum_constant - blosum distance.
    pub blosum_per_aa: i32,
    pub blosum_constant: i32,
    // Minimum length in amino acids of a trimmed anchor.
    pub min_partial_anchor_aa_len: usize,

    pub min_vj_overlap: usize,
    pub join_kmer_min_shared: usize,
    pub extend_with_mates: bool,
    pub max_mate_mismatches: usize,
    // Minimum number of bases on each side of an anchor boundary in a joined layout.
    pub min_anchor_flank: usize,
    // One-sided candidates extend at most this far past their anchor boundary.
    pub max_one_sided_len: usize,
    pub one_sided_allow_negative: bool,

    // Candidates differing at one position merge if neither allele has more reads than this.
    pub dedup_max_allele_support: u32,

    // Worker threads; zero means one per core.
    pub num_threads: usize,
}

impl Default for Heuristics {
    fn default() -> Self {
        Heuristics {
            min_base_quality: 25,
            low_quality_weight: 0.1,
            tree_min_overlap: 20,
            seal_factor: 2.0,
            max_reassign_rounds: 5,
            seal_relax: 0.5,
            anchor_len: 30,
            blosum_per_aa: 3,
            blosum_constant: 6,
            min_partial_anchor_aa_len: 8,
            min_vj_overlap: 15,
            join_kmer_min_shared: 1,
            extend_with_mates: true,
            max_mate_mismatches: 1,
            min_anchor_flank: 3,
            max_one_sided_len: 60,
            one_sided_allow_negative: true,
            dedup_max_allele_support: 1,
            num_threads: 0,
        }
    }
}

fn invalid(parameter: &str, reason: &str) -> JunctionError {
    JunctionError::InvalidParameter {
        parameter: parameter.to_string(),
        reason: reason.to_string(),
    }
}

impl Heuristics {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.low_quality_weight) {
            return Err(invalid("low_quality_weight", "must be between 0 and 1"));
        }
        if self.seal_factor <= 1.0 {
            return Err(invalid("seal_factor", "must be greater than 1"));
        }
        if !(0.0..=1.0).contains(&self.seal_relax) {
            return Err(invalid("seal_relax", "must be between 0 and 1"));
        }
        if self.tree_min_overlap == 0 {
            return Err(invalid("tree_min_overlap", "must be at least 1"));
        }
        if self.anchor_len == 0 {
            return Err(invalid("anchor_len", "must be at least 1"));
        }
        if self.min_partial_anchor_aa_len == 0 {
            return Err(invalid("min_partial_anchor_aa_len", "must be at least 1"));
        }
        if self.min_vj_overlap == 0 {
            return Err(invalid("min_vj_overlap", "must be at least 1"));
        }
        Ok(())
    }

    /// Seal factor in effect for a given reassignment round; round zero is the first pass.
    pub fn seal_factor_for_round(&self, round: usize) -> f64 {
        1.0 + (self.seal_factor - 1.0) * self.seal_relax.powi(round as i32)
    }

    pub fn is_high_quality(&self, qual: u8) -> bool {
        qual >= self.min_base_quality
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(Heuristics::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_seal_factor() {
        let heur = Heuristics {
            seal_factor: 1.0,
            ..Default::default()
        };
        let err = heur.validate().unwrap_err();
        assert!(err.to_string().contains("seal_factor"));
    }

    #[test]
    fn test_seal_factor_relaxes_toward_one() {
        let heur = Heuristics::default();
        assert_eq!(heur.seal_factor_for_round(0), 2.0);
        assert_eq!(heur.seal_factor_for_round(1), 1.5);
        assert!(heur.seal_factor_for_round(10) > 1.0);
        assert!(heur.seal_factor_for_round(10) < 1.01);
    }

    #[test]
    fn test_partial_json() {
        let heur: Heuristics = serde_json::from_str(r#"{"min_base_quality": 30}"#).unwrap();
        assert_eq!(heur.min_base_quality, 30);
        assert_eq!(heur.anchor_len, 30);
    }
}
