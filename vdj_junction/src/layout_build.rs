// Copyright (c) 2024 10x Genomics, Inc. All rights reserved.

// Build consensus layouts for every gene type, one tree per gene type, the trees running in
// parallel on a rayon pool.

use crate::error::{JunctionError, Result};
use crate::heuristics::Heuristics;
use crate::layout::ConsensusLayout;
use crate::layout_tree::ConsensusLayoutTree;
use crate::read::Read;
use log::info;
use rayon::prelude::*;
use std::collections::BTreeMap;
use vdj_types::VjGeneType;

pub type LayoutsByType = Vec<(VjGeneType, Vec<ConsensusLayout>)>;

/// Order reads for tree insertion: descending aligned position, then by identity.
pub fn sort_reads_for_tree(reads: &mut [Read]) {
    reads.sort_by(|a, b| {
        b.aligned_pos
            .cmp(&a.aligned_pos)
            .then_with(|| a.key.cmp(&b.key))
    });
}

pub fn make_pool(heur: &Heuristics) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(heur.num_threads)
        .build()
        .map_err(|e| JunctionError::ThreadPool(e.to_string()))
}

pub fn build_layouts_for_type(
    gene_type: VjGeneType,
    reads: &[Read],
    heur: &Heuristics,
) -> Result<Vec<ConsensusLayout>> {
    let mut sorted = reads.to_vec();
    sort_reads_for_tree(&mut sorted);
    let layouts = ConsensusLayoutTree::layouts_of(&sorted, heur)?;
    info!(
        "{}: {} reads in, {} layouts out",
        gene_type,
        reads.len(),
        layouts.len()
    );
    Ok(layouts)
}

// Results come back in gene type order.  A failure of any gene type fails the whole call.

pub fn build_layouts(
    reads_by_type: &BTreeMap<VjGeneType, Vec<Read>>,
    heur: &Heuristics,
    pool: &rayon::ThreadPool,
) -> Result<LayoutsByType> {
    let work: Vec<(&VjGeneType, &Vec<Read>)> = reads_by_type.iter().collect();
    pool.install(|| {
        work.par_iter()
            .map(|(gene_type, reads)| {
                Ok((**gene_type, build_layouts_for_type(**gene_type, reads, heur)?))
            })
            .collect::<Result<Vec<_>>>()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hq(name: &str, seq: &[u8], ap: i32) -> Read {
        Read::new(name, true, seq, &vec![40; seq.len()], ap).unwrap()
    }

    #[test]
    fn test_sort_order() {
        let mut reads = vec![hq("b", b"A", 1), hq("a", b"A", 1), hq("c", b"A", 4)];
        sort_reads_for_tree(&mut reads);
        let names: Vec<&str> = reads.iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_layouts_in_gene_type_order() {
        let heur = Heuristics {
            tree_min_overlap: 3,
            num_threads: 2,
            ..Default::default()
        };
        let mut reads_by_type = BTreeMap::new();
        // Out of order on input; sorting puts the upstream read first.
        reads_by_type.insert(
            VjGeneType::TRBJ,
            vec![hq("j2", b"GTACGTAA", 3), hq("j1", b"ACGTACGT", 5)],
        );
        reads_by_type.insert(VjGeneType::TRBV, vec![hq("v1", b"TTTTGGGG", 0)]);
        let pool = make_pool(&heur).unwrap();
        let out = build_layouts(&reads_by_type, &heur, &pool).unwrap();
        let types: Vec<VjGeneType> = out.iter().map(|x| x.0).collect();
        assert_eq!(types, vec![VjGeneType::TRBV, VjGeneType::TRBJ]);
        assert_eq!(out[1].1.len(), 1);
        assert_eq!(out[1].1[0].sequence(), b"ACGTACGTAA".to_vec());
    }
}
