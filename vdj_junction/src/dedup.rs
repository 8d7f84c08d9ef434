// Copyright (c) 2024 10x Genomics, Inc. All rights reserved.

// Collapse near-identical junction candidates.
//
// Candidates are partitioned by their (V type, J type) pair and each partition is processed on
// its own, the partitions in parallel.  Within a partition, candidates are taken in order of
// decreasing read count, and each is compared with those already kept, aligned on a shared V
// anchor, or failing that a shared J anchor.  Two candidates merge if their bases agree at
// every position where both have coverage, or if they disagree at exactly one position and
// neither allele there is backed by more than dedup_max_allele_support reads.  The kept
// candidate is favoured: its anchors survive, except that a read-matched anchor of the other
// replaces one that is not read-matched.  Passes repeat until nothing merges.

use crate::error::Result;
use crate::heuristics::Heuristics;
use crate::layout::ConsensusLayout;
use crate::read::base_index;
use crate::types::{Anchor, JunctionCandidate};
use log::info;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use vdj_types::VjGenePair;

// Index shift d mapping position y of b to position y + d of a, from a shared anchor.

fn alignment(a: &JunctionCandidate, b: &JunctionCandidate) -> Option<i32> {
    let shared = |x: &Option<Anchor>, y: &Option<Anchor>| match (x, y) {
        (Some(x), Some(y)) if x.gene_type() == y.gene_type() => {
            Some(x.boundary() as i32 - y.boundary() as i32)
        }
        _ => None,
    };
    shared(&a.v_anchor, &b.v_anchor).or_else(|| shared(&a.j_anchor, &b.j_anchor))
}

// Positions of a at which a and b (shifted by d) disagree, within both slices and where both
// have coverage.  None if there is no such common covered position at all.

fn differences(a: &JunctionCandidate, b: &JunctionCandidate, d: i32) -> Option<Vec<usize>> {
    let lo = (a.start as i32).max(b.start as i32 + d);
    let hi = (a.end as i32).min(b.end as i32 + d);
    let mut compared = 0;
    let mut diffs = Vec::new();
    for x in lo.max(0)..hi {
        let y = (x - d) as usize;
        let x = x as usize;
        if a.layout.coverage(x) == 0 || b.layout.coverage(y) == 0 {
            continue;
        }
        compared += 1;
        if a.layout.base_at(x) != b.layout.base_at(y) {
            diffs.push(x);
        }
    }
    if compared == 0 {
        None
    } else {
        Some(diffs)
    }
}

fn allele_support(layout: &ConsensusLayout, i: usize) -> u32 {
    match base_index(layout.base_at(i)) {
        Some(j) => layout.counts_at(i)[j],
        None => 0,
    }
}

// Merge b into a if they are near-identical.

pub fn try_merge(
    a: &JunctionCandidate,
    b: &JunctionCandidate,
    heur: &Heuristics,
) -> Option<JunctionCandidate> {
    let d = alignment(a, b)?;
    let diffs = differences(a, b, d)?;
    match diffs.len() {
        0 => {}
        1 => {
            let x = diffs[0];
            let y = (x as i32 - d) as usize;
            let max = heur.dedup_max_allele_support;
            if allele_support(&a.layout, x) > max || allele_support(&b.layout, y) > max {
                return None;
            }
        }
        _ => return None,
    }

    let shift = a.layout.aligned_pos() - b.layout.aligned_pos() - d;
    let layout = ConsensusLayout::merge(&a.layout, &b.layout, shift);
    // Merged index of a's index x is x + delta, of b's index y is y + d + delta.
    let delta = layout.aligned_pos() - a.layout.aligned_pos();
    let from_a = |x: &Option<Anchor>| x.as_ref().and_then(|x| x.shifted(delta));
    let from_b = |y: &Option<Anchor>| y.as_ref().and_then(|y| y.shifted(d + delta));
    let pick = |x: Option<Anchor>, y: Option<Anchor>| match (x, y) {
        (Some(x), Some(y)) if !x.is_read_match() && y.is_read_match() => Some(y),
        (Some(x), _) => Some(x),
        (None, y) => y,
    };
    let v_anchor = pick(from_a(&a.v_anchor), from_b(&b.v_anchor));
    let j_anchor = pick(from_a(&a.j_anchor), from_b(&b.j_anchor));
    let start = (a.start as i32).min(b.start as i32 + d) + delta;
    let end = (a.end as i32).max(b.end as i32 + d) + delta;
    Some(JunctionCandidate::new(
        Arc::new(layout),
        start.max(0) as usize,
        end.max(0) as usize,
        v_anchor,
        j_anchor,
    ))
}

fn by_read_count(cands: &mut [JunctionCandidate]) {
    cands.sort_by(|a, b| b.read_count().cmp(&a.read_count()));
}

pub fn dedup_partition(
    cands: Vec<JunctionCandidate>,
    heur: &Heuristics,
) -> Vec<JunctionCandidate> {
    let mut cur = cands;
    loop {
        by_read_count(&mut cur);
        let mut kept = Vec::<JunctionCandidate>::new();
        let mut merged_any = false;
        for c in cur {
            let mut absorbed = false;
            for k in kept.iter_mut() {
                if let Some(m) = try_merge(k, &c, heur) {
                    *k = m;
                    absorbed = true;
                    break;
                }
            }
            if absorbed {
                merged_any = true;
            } else {
                kept.push(c);
            }
        }
        cur = kept;
        if !merged_any {
            return cur;
        }
    }
}

// Deduplicate every partition, returning candidates in partition key order.

pub fn dedup_candidates(
    cands: Vec<JunctionCandidate>,
    heur: &Heuristics,
    pool: &rayon::ThreadPool,
) -> Result<Vec<JunctionCandidate>> {
    let before = cands.len();
    let mut parts = BTreeMap::<VjGenePair, Vec<JunctionCandidate>>::new();
    for c in cands {
        parts.entry(c.gene_pair()).or_default().push(c);
    }
    let parts: Vec<(VjGenePair, Vec<JunctionCandidate>)> = parts.into_iter().collect();
    let deduped: Vec<Vec<JunctionCandidate>> = pool.install(|| {
        parts
            .into_par_iter()
            .map(|(_, p)| dedup_partition(p, heur))
            .collect()
    });
    let out: Vec<JunctionCandidate> = deduped.into_iter().flatten().collect();
    info!("deduplication: {} candidates in, {} out", before, out.len());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout_build::make_pool;
    use crate::read::Read;
    use vdj_types::VjGeneType;

    fn candidate(reads: &[(&str, &[u8])], v_boundary: usize) -> JunctionCandidate {
        let heur = Heuristics::default();
        let reads: Vec<Read> = reads
            .iter()
            .map(|(name, seq)| {
                Read::new(name, true, seq, &vec![40; seq.len()], 0).unwrap()
            })
            .collect();
        let layout = Arc::new(ConsensusLayout::from_reads(&reads, &heur));
        let n = layout.len();
        JunctionCandidate::new(
            layout,
            0,
            n,
            Some(Anchor::ByReadMatch {
                boundary: v_boundary,
                len: 3,
                gene_type: VjGeneType::TRBV,
                read_count: reads.len(),
            }),
            None,
        )
    }

    #[test]
    fn test_single_difference_with_one_read_each_collapses() {
        let heur = Heuristics::default();
        let a = candidate(&[("a", b"ACGTACGTAC")], 3);
        let b = candidate(&[("b", b"ACGTTCGTAC")], 3);
        let out = dedup_partition(vec![a, b], &heur);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].read_count(), 2);
        assert_eq!(out[0].v_anchor.as_ref().unwrap().boundary(), 3);
    }

    #[test]
    fn test_two_differences_do_not_collapse() {
        let heur = Heuristics::default();
        let a = candidate(&[("a", b"ACGTACGTAC")], 3);
        let b = candidate(&[("b", b"ACGTTCGTTC")], 3);
        let out = dedup_partition(vec![a, b], &heur);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_well_supported_allele_is_kept_apart() {
        let heur = Heuristics::default();
        let a = candidate(&[("a1", b"ACGTACGTAC"), ("a2", b"ACGTACGTAC")], 3);
        let b = candidate(&[("b", b"ACGTTCGTAC")], 3);
        let out = dedup_partition(vec![b, a], &heur);
        assert_eq!(out.len(), 2);
        // Larger candidate first.
        assert_eq!(out[0].read_count(), 2);
    }

    #[test]
    fn test_identical_where_covered_merges_with_offset() {
        let heur = Heuristics::default();
        let a = candidate(&[("a", b"TTACGTACGT")], 5);
        // Same sequence seen two bases later, extended on the right.
        let b = candidate(&[("b", b"ACGTACGTGG")], 3);
        let m = try_merge(&a, &b, &heur).unwrap();
        assert_eq!(m.layout.sequence(), b"TTACGTACGTGG".to_vec());
        assert_eq!((m.start, m.end), (0, 12));
        assert_eq!(m.v_anchor.as_ref().unwrap().boundary(), 5);
    }

    fn searched_v_anchor(boundary: usize) -> Anchor {
        Anchor::ByBlosum {
            boundary,
            len: 3,
            gene_type: VjGeneType::TRBV,
            template: b"ACG".to_vec(),
            similarity_score: 3,
            genes: Vec::new(),
        }
    }

    #[test]
    fn test_read_matched_anchor_replaces_searched_one() {
        let heur = Heuristics::default();
        let mut a = candidate(&[("a1", b"ACGTACGTAC"), ("a2", b"ACGTACGTAC")], 3);
        a.v_anchor = Some(searched_v_anchor(3));
        let b = candidate(&[("b", b"ACGTACGTAC")], 3);
        let out = dedup_partition(vec![b, a], &heur);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].read_count(), 3);
        let v = out[0].v_anchor.as_ref().unwrap();
        assert!(v.is_read_match());
        assert_eq!(v.boundary(), 3);
    }

    #[test]
    fn test_favoured_read_matched_anchor_is_kept() {
        let heur = Heuristics::default();
        let a = candidate(&[("a1", b"ACGTACGTAC"), ("a2", b"ACGTACGTAC")], 3);
        let mut b = candidate(&[("b", b"ACGTACGTAC")], 3);
        b.v_anchor = Some(searched_v_anchor(3));
        let out = dedup_partition(vec![b, a], &heur);
        assert_eq!(out.len(), 1);
        match out[0].v_anchor.as_ref().unwrap() {
            Anchor::ByReadMatch { read_count, .. } => assert_eq!(*read_count, 2),
            other => panic!("expected a read-matched anchor, got {:?}", other),
        }
    }

    #[test]
    fn test_favoured_searched_anchor_is_kept_over_searched_one() {
        let heur = Heuristics::default();
        let mut a = candidate(&[("a1", b"ACGTACGTAC"), ("a2", b"ACGTACGTAC")], 3);
        a.v_anchor = Some(searched_v_anchor(3));
        let mut b = candidate(&[("b", b"ACGTACGTAC")], 3);
        b.v_anchor = Some(Anchor::ByBlosum {
            boundary: 3,
            len: 3,
            gene_type: VjGeneType::TRBV,
            template: b"ACG".to_vec(),
            similarity_score: 9,
            genes: Vec::new(),
        });
        let m = try_merge(&a, &b, &heur).unwrap();
        match m.v_anchor.as_ref().unwrap() {
            Anchor::ByBlosum {
                similarity_score, ..
            } => assert_eq!(*similarity_score, 3),
            other => panic!("expected a searched anchor, got {:?}", other),
        }
    }

    #[test]
    fn test_partitions_run_separately() {
        let heur = Heuristics {
            num_threads: 2,
            ..Default::default()
        };
        let pool = make_pool(&heur).unwrap();
        let a = candidate(&[("a", b"ACGTACGTAC")], 3);
        let b = candidate(&[("b", b"ACGTACGTAC")], 3);
        let mut c = candidate(&[("c", b"ACGTACGTAC")], 3);
        c.v_anchor = Some(Anchor::ByReadMatch {
            boundary: 3,
            len: 3,
            gene_type: VjGeneType::TRAV,
            read_count: 1,
        });
        let out = dedup_candidates(vec![a, b, c], &heur, &pool).unwrap();
        assert_eq!(out.len(), 2);
        // TRAV sorts before TRBV.
        assert_eq!(out[0].gene_pair().v, Some(VjGeneType::TRAV));
        assert_eq!(out[1].read_count(), 2);
    }
}
