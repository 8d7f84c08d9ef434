// Copyright (c) 2024 10x Genomics, Inc. All rights reserved.

// Turn layouts into junction candidates.
//
// Joining runs in two passes over the compatible (V type, J type) pairs.  First each V layout
// tries the J layouts sharing read names with it, most shared names first.  Then the layouts
// still unjoined are paired by shared 12-mers of high quality consensus outside the anchors,
// and the pairs are tried greedily, most shared kmers first.  A trial is an ungapped overlap
// merge: J index 0 is placed on V index o, and
// every position where both layouts have a high quality call must agree.  The merged layout
// may then pick up mates of its reads.  Anchors are placed in the merged frame and the join is
// rejected if a boundary is too close to an edge.  Joined layouts are used up.
//
// Layouts left over are completed on their own: the opposite anchor is searched for within
// a bounded distance of the known one, and failing that a capped one-sided candidate is made.
//
// Frame convention: in a V layout the aligned position is the index of the last base of the
// V anchor, in a J layout the index of the first base of the J anchor.

use crate::anchor::{AnchorSearcher, SimilarityMode};
use crate::error::Result;
use crate::heuristics::Heuristics;
use crate::layout::ConsensusLayout;
use crate::layout_build::LayoutsByType;
use crate::read::{is_resolved, MateReads, Read, ReadKey};
use crate::refx::VjGeneStore;
use crate::types::{anchors_ordered, Anchor, JunctionCandidate};
use debruijn::dna_string::DnaString;
use debruijn::kmer::Kmer12;
use debruijn::Vmer;
use itertools::Itertools;
use log::{debug, info};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use vdj_types::{VjAnchorSide, VjGeneType};
use vector_utils::{lower_bound1_3, unique_sort, upper_bound1_3};

const K: usize = 12;

// ▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓
// ANCHORS FROM READS
// ▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓

/// Index of the frame point of a layout, if it lies on the layout.
pub fn frame_point(layout: &ConsensusLayout) -> Option<usize> {
    let p = layout.aligned_pos();
    if p >= 0 && (p as usize) < layout.len() {
        Some(p as usize)
    } else {
        None
    }
}

// The anchor a layout's reads were aligned on, if some read covers the frame point.  The
// boundary is moved by index_shift, to place it in a frame the layout was merged into.

pub fn read_match_anchor(
    gene_type: VjGeneType,
    layout: &ConsensusLayout,
    index_shift: i32,
    heur: &Heuristics,
) -> Option<Anchor> {
    let p = frame_point(layout)?;
    let read_count = layout
        .reads()
        .iter()
        .filter(|r| r.aligned_pos >= 0 && (r.aligned_pos as usize) < r.len())
        .count();
    if read_count == 0 {
        return None;
    }
    let boundary = match gene_type.side() {
        VjAnchorSide::V => p + 1,
        VjAnchorSide::J => p,
    };
    Anchor::ByReadMatch {
        boundary,
        len: heur.anchor_len,
        gene_type,
        read_count,
    }
    .shifted(index_shift)
}

// ▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓
// OVERLAP MERGE
// ▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓

// Find the offset o placing J index 0 on V index o.  Every position where both sides have a
// high quality call must agree, and at least min_overlap positions must be such agreeing
// calls.  Most agreeing calls wins, then the smallest offset.

pub fn best_overlap(v: &ConsensusLayout, j: &ConsensusLayout, min_overlap: usize) -> Option<usize> {
    let (vh, jh) = (v.high_quality_sequence(), j.high_quality_sequence());
    if vh.len() < min_overlap || jh.len() < min_overlap {
        return None;
    }
    let mut best: Option<(usize, usize)> = None;
    for o in 0..=vh.len() - min_overlap {
        let ov = (vh.len() - o).min(jh.len());
        let mut matches = 0;
        let mut ok = true;
        for k in 0..ov {
            let (a, b) = (vh[o + k], jh[k]);
            if !is_resolved(a) || !is_resolved(b) {
                continue;
            }
            if a != b {
                ok = false;
                break;
            }
            matches += 1;
        }
        if ok && matches >= min_overlap && best.map_or(true, |b| matches > b.1) {
            best = Some((o, matches));
        }
    }
    best.map(|b| b.0)
}

// Place a read on a layout without gaps: the start index (possibly negative) with the fewest
// high quality mismatches, provided it overlaps enough and mismatches little enough.

fn place_read(read: &Read, hq: &[u8], heur: &Heuristics) -> Option<i32> {
    let (n, m) = (hq.len() as i32, read.len() as i32);
    let min_overlap = heur.min_vj_overlap as i32;
    let mut best: Option<(usize, i32)> = None;
    for p in (min_overlap - m)..=(n - min_overlap) {
        let lo = p.max(0);
        let hi = (p + m).min(n);
        if hi - lo < min_overlap {
            continue;
        }
        let mut mismatches = 0;
        for x in lo..hi {
            let i = (x - p) as usize;
            let (a, b) = (hq[x as usize], read.seq[i]);
            if heur.is_high_quality(read.qual[i]) && is_resolved(a) && is_resolved(b) && a != b {
                mismatches += 1;
                if mismatches > heur.max_mate_mismatches {
                    break;
                }
            }
        }
        if mismatches <= heur.max_mate_mismatches && best.map_or(true, |b| mismatches < b.0) {
            best = Some((mismatches, p));
        }
    }
    best.map(|b| b.1)
}

// ▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓
// JOIN CANDIDATE RANKING
// ▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓

// Read name to the J layouts holding a read of that name.

struct SharedReadIndex {
    by_name: HashMap<Arc<str>, Vec<usize>>,
}

impl SharedReadIndex {
    fn new(layouts: &[ConsensusLayout]) -> SharedReadIndex {
        let mut by_name = HashMap::<Arc<str>, Vec<usize>>::new();
        for (j, l) in layouts.iter().enumerate() {
            for r in l.reads() {
                let v = by_name.entry(r.key.name.clone()).or_default();
                if v.last() != Some(&j) {
                    v.push(j);
                }
            }
        }
        SharedReadIndex { by_name }
    }

    // J layouts sharing names with a layout, most shared names first, then by index.

    fn ranked(&self, layout: &ConsensusLayout) -> Vec<usize> {
        let names: HashSet<&Arc<str>> = layout.reads().iter().map(|r| &r.key.name).collect();
        let mut counts = HashMap::<usize, usize>::new();
        for name in names {
            if let Some(js) = self.by_name.get(name) {
                for &j in js {
                    *counts.entry(j).or_default() += 1;
                }
            }
        }
        rank_counts(counts)
    }
}

fn rank_counts(counts: HashMap<usize, usize>) -> Vec<usize> {
    counts
        .into_iter()
        .sorted_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)))
        .map(|x| x.0)
        .collect()
}

// Stretches of resolved high quality consensus long enough for a kmer, with the layout's own
// anchor masked out.  Each is (start, bases).

fn kmer_runs(
    gene_type: VjGeneType,
    layout: &ConsensusLayout,
    heur: &Heuristics,
) -> Vec<(usize, Vec<u8>)> {
    let mut hq = layout.high_quality_sequence();
    if let Some(a) = read_match_anchor(gene_type, layout, 0, heur) {
        for i in a.range(hq.len()) {
            hq[i] = b'N';
        }
    }
    let mut runs = Vec::new();
    let mut i = 0;
    while i < hq.len() {
        if !is_resolved(hq[i]) {
            i += 1;
            continue;
        }
        let mut j = i + 1;
        while j < hq.len() && is_resolved(hq[j]) {
            j += 1;
        }
        if j - i >= K {
            runs.push((i, hq[i..j].to_vec()));
        }
        i = j;
    }
    runs
}

// Sorted (kmer, layout, position) table over the J layouts not yet used, in the manner of
// kmer_lookup::make_kmer_lookup_single.

struct KmerIndex {
    kmers: Vec<(Kmer12, i32, i32)>,
}

impl KmerIndex {
    fn new(
        gene_type: VjGeneType,
        layouts: &[ConsensusLayout],
        used: &[bool],
        heur: &Heuristics,
    ) -> KmerIndex {
        let mut kmers = Vec::<(Kmer12, i32, i32)>::new();
        for (j, l) in layouts.iter().enumerate() {
            if used[j] {
                continue;
            }
            for (start, run) in kmer_runs(gene_type, l, heur) {
                let b = DnaString::from_acgt_bytes(&run);
                for p in 0..=b.len() - K {
                    let x: Kmer12 = b.get_kmer(p);
                    kmers.push((x, j as i32, (start + p) as i32));
                }
            }
        }
        kmers.sort();
        KmerIndex { kmers }
    }

    // For each indexed layout, the number of distinct kmers it shares with a layout.

    fn shared_counts(
        &self,
        gene_type: VjGeneType,
        layout: &ConsensusLayout,
        heur: &Heuristics,
    ) -> HashMap<usize, usize> {
        let mut hits = Vec::<Kmer12>::new();
        for (_, run) in kmer_runs(gene_type, layout, heur) {
            let b = DnaString::from_acgt_bytes(&run);
            for p in 0..=b.len() - K {
                hits.push(b.get_kmer(p));
            }
        }
        unique_sort(&mut hits);
        let mut counts = HashMap::<usize, usize>::new();
        for x in hits.iter() {
            let low = lower_bound1_3(&self.kmers, x) as usize;
            let high = upper_bound1_3(&self.kmers, x) as usize;
            let mut js: Vec<usize> = self.kmers[low..high].iter().map(|k| k.1 as usize).collect();
            unique_sort(&mut js);
            for j in js {
                *counts.entry(j).or_default() += 1;
            }
        }
        counts
    }
}

// ▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓
// JUNCTION BUILDER
// ▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓

pub struct JunctionBuilder<'a, S: VjGeneStore + ?Sized> {
    heur: &'a Heuristics,
    mates: &'a MateReads,
    searcher: AnchorSearcher<'a, S>,
}

impl<'a, S: VjGeneStore + ?Sized> JunctionBuilder<'a, S> {
    pub fn new(store: &'a S, mates: &'a MateReads, heur: &'a Heuristics) -> Self {
        JunctionBuilder {
            heur,
            mates,
            searcher: AnchorSearcher::new(store, heur),
        }
    }

    pub fn build(&self, layouts: &LayoutsByType) -> Result<Vec<JunctionCandidate>> {
        let type_index: HashMap<VjGeneType, usize> = layouts
            .iter()
            .enumerate()
            .map(|(i, x)| (x.0, i))
            .collect();
        let pairs: Vec<(VjGeneType, usize, VjGeneType, usize)> = VjGeneType::vj_pairs()
            .into_iter()
            .filter_map(|(vt, jt)| match (type_index.get(&vt), type_index.get(&jt)) {
                (Some(&vi), Some(&ji)) => Some((vt, vi, jt, ji)),
                _ => None,
            })
            .collect();
        let mut used: Vec<Vec<bool>> = layouts.iter().map(|x| vec![false; x.1.len()]).collect();
        let mut cands = Vec::<JunctionCandidate>::new();

        // Joins by shared read names.
        for &(vt, vi, jt, ji) in pairs.iter() {
            let (vls, jls) = (&layouts[vi].1, &layouts[ji].1);
            if vls.is_empty() || jls.is_empty() {
                continue;
            }
            let shared = SharedReadIndex::new(jls);
            for v in 0..vls.len() {
                if used[vi][v] {
                    continue;
                }
                for j in shared.ranked(&vls[v]) {
                    if used[ji][j] {
                        continue;
                    }
                    if let Some(c) = self.try_join(vt, &vls[v], jt, &jls[j])? {
                        debug!("joined {} layout {} with {} layout {} by reads", vt, v, jt, j);
                        used[vi][v] = true;
                        used[ji][j] = true;
                        cands.push(c);
                        break;
                    }
                }
            }
        }
        let by_reads = cands.len();

        // Joins by shared kmers among what is left, best supported pairs first.
        let min_shared = self.heur.join_kmer_min_shared.max(1);
        for &(vt, vi, jt, ji) in pairs.iter() {
            let (vls, jls) = (&layouts[vi].1, &layouts[ji].1);
            if used[vi].iter().all(|&u| u) || used[ji].iter().all(|&u| u) {
                continue;
            }
            let kmers = KmerIndex::new(jt, jls, &used[ji], self.heur);
            let mut trials = Vec::<(usize, usize, usize)>::new();
            for v in 0..vls.len() {
                if used[vi][v] {
                    continue;
                }
                for (j, n) in kmers.shared_counts(vt, &vls[v], self.heur) {
                    if n >= min_shared {
                        trials.push((n, v, j));
                    }
                }
            }
            trials.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));
            for (_, v, j) in trials {
                if used[vi][v] || used[ji][j] {
                    continue;
                }
                if let Some(c) = self.try_join(vt, &vls[v], jt, &jls[j])? {
                    debug!("joined {} layout {} with {} layout {} by kmers", vt, v, jt, j);
                    used[vi][v] = true;
                    used[ji][j] = true;
                    cands.push(c);
                }
            }
        }
        let joined = cands.len();

        for (ti, (t, ls)) in layouts.iter().enumerate() {
            for (k, l) in ls.iter().enumerate() {
                if used[ti][k] {
                    continue;
                }
                if let Some(c) = self.complete_one_sided(*t, l)? {
                    cands.push(c);
                }
            }
        }
        info!(
            "{} candidates joined by reads, {} by kmers, {} completed from one side",
            by_reads,
            joined - by_reads,
            cands.len() - joined
        );
        Ok(cands)
    }

    // Join a V layout and a J layout, if they overlap and the anchors land well.

    pub fn try_join(
        &self,
        vt: VjGeneType,
        v: &ConsensusLayout,
        jt: VjGeneType,
        j: &ConsensusLayout,
    ) -> Result<Option<JunctionCandidate>> {
        let o = match best_overlap(v, j, self.heur.min_vj_overlap) {
            Some(o) => o,
            None => return Ok(None),
        };
        let mut merged =
            ConsensusLayout::merge(v, j, v.aligned_pos() - j.aligned_pos() - o as i32);
        if self.heur.extend_with_mates {
            let added = self.extend_with_mates(&mut merged);
            if added > 0 {
                debug!("mate extension added {} reads", added);
            }
        }
        // Merged index of V index x is x + delta.
        let delta = merged.aligned_pos() - v.aligned_pos();
        let seq = merged.sequence();
        let n = seq.len();

        let mut j_anchor = read_match_anchor(jt, j, o as i32 + delta, self.heur);
        let mut v_anchor = read_match_anchor(vt, v, delta, self.heur);
        if j_anchor.is_none() {
            let start = v_anchor.as_ref().map_or(0, |a| a.boundary());
            j_anchor = self
                .searcher
                .search(&seq, &[jt], SimilarityMode::DisallowNegative, start as i32, n as i32)?
                .map(|m| Anchor::from_match(&m, 0))
                .transpose()?;
        }
        if v_anchor.is_none() {
            let stop = j_anchor.as_ref().map_or(n, |a| a.boundary());
            v_anchor = self
                .searcher
                .search(&seq, &[vt], SimilarityMode::DisallowNegative, 0, stop as i32)?
                .map(|m| Anchor::from_match(&m, 0))
                .transpose()?;
        }
        if let (Some(v), Some(j)) = (&v_anchor, &j_anchor) {
            if !anchors_ordered(v, j) {
                v_anchor = None;
            }
        }
        if v_anchor.is_none() && j_anchor.is_none() {
            return Ok(None);
        }
        let flank = self.heur.min_anchor_flank;
        for a in v_anchor.iter().chain(j_anchor.iter()) {
            let b = a.boundary();
            if b < flank || n < b + flank {
                return Ok(None);
            }
        }
        let layout = Arc::new(merged);
        let start = v_anchor.as_ref().map_or(0, |a| a.range(n).start);
        let end = j_anchor.as_ref().map_or(n, |a| a.range(n).end);
        Ok(Some(JunctionCandidate::new(layout, start, end, v_anchor, j_anchor)))
    }

    // Add mates of member reads that place on the layout.  Returns the number added.

    fn extend_with_mates(&self, layout: &mut ConsensusLayout) -> usize {
        let mut seen = HashSet::<ReadKey>::new();
        let mut mates = Vec::<Read>::new();
        for r in layout.reads() {
            if let Some(ms) = self.mates.get(&r.key.name) {
                for m in ms {
                    if !layout.contains(&m.key) && seen.insert(m.key.clone()) {
                        mates.push(m.clone());
                    }
                }
            }
        }
        let hq = layout.high_quality_sequence();
        let ap = layout.aligned_pos();
        let mut added = 0;
        for m in mates {
            if let Some(p) = place_read(&m, &hq, self.heur) {
                if layout.add_read(&m.with_aligned_pos(ap - p)) {
                    added += 1;
                }
            }
        }
        added
    }

    // A layout nobody joined with: find the other anchor near its own, else cap it.

    pub fn complete_one_sided(
        &self,
        t: VjGeneType,
        layout: &ConsensusLayout,
    ) -> Result<Option<JunctionCandidate>> {
        let seq = layout.sequence();
        let n = seq.len();
        let own = match read_match_anchor(t, layout, 0, self.heur) {
            Some(a) => a,
            None => match self
                .searcher
                .search_all(&seq, &[t], SimilarityMode::DisallowNegative)?
            {
                Some(m) => Anchor::from_match(&m, 0)?,
                None => {
                    debug!("{} layout with {} reads has no anchor", t, layout.read_count());
                    return Ok(None);
                }
            },
        };
        let mode = if self.heur.one_sided_allow_negative {
            SimilarityMode::AllowNegative
        } else {
            SimilarityMode::DisallowNegative
        };
        let b = own.boundary();
        let reach = self.heur.max_one_sided_len;
        let layout = Arc::new(layout.clone());
        let c = match t.side() {
            VjAnchorSide::V => {
                let cap = n.min(b + reach);
                let start = own.range(n).start;
                let found = self
                    .searcher
                    .search(&seq, t.pairs_with(), mode, b as i32, cap as i32)?;
                match found {
                    Some(m) => {
                        let j = Anchor::from_match(&m, 0)?;
                        let end = j.range(n).end;
                        JunctionCandidate::new(layout, start, end, Some(own), Some(j))
                    }
                    None => JunctionCandidate::new(layout, start, cap, Some(own), None),
                }
            }
            VjAnchorSide::J => {
                let cap = b.saturating_sub(reach);
                let end = own.range(n).end;
                let found = self
                    .searcher
                    .search(&seq, t.pairs_with(), mode, cap as i32, b as i32)?;
                match found {
                    Some(m) => {
                        let v = Anchor::from_match(&m, 0)?;
                        let start = v.range(n).start;
                        JunctionCandidate::new(layout, start, end, Some(v), Some(own))
                    }
                    None => JunctionCandidate::new(layout, cap, end, None, Some(own)),
                }
            }
        };
        Ok(Some(c))
    }
}
