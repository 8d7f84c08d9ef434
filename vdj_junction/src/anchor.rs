// Copyright (c) 2024 10x Genomics, Inc. All rights reserved.

// Find the best placed germline anchor of given gene types inside a sequence, by BLOSUM
// similarity.
//
// For each template anchor of each gene type we slide across the requested offsets.  For a V
// template the offset is the last base of the implied anchor, for a J template the first base.
// A window that runs off the sequence is trimmed from that end, in whole codons, except that
// the end carrying the conserved residue (the 3' end of V, the 5' end of J) is never trimmed;
// such windows are rejected instead, as are windows trimmed below the minimum amino acid
// length.

use crate::blosum::AnchorSimilarityScorer;
use crate::error::{JunctionError, Result};
use crate::heuristics::Heuristics;
use crate::refx::{gene_type_of, GeneRecord, VjGeneStore};
use vdj_types::{VjAnchorSide, VjGeneType};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimilarityMode {
    // Return the best window whatever its score.
    AllowNegative,
    // Only windows scoring at least zero qualify.
    DisallowNegative,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AnchorMatch {
    pub anchor_start: usize, // matched window on the searched sequence, [start, end)
    pub anchor_end: usize,
    pub template_anchor: Vec<u8>, // untrimmed germline anchor
    pub template_genes: Vec<GeneRecord>,
    pub similarity_score: i32,
}

impl AnchorMatch {
    pub fn gene_type(&self) -> Result<VjGeneType> {
        gene_type_of(&self.template_genes)
    }

    /// For V, one past the last anchor base; for J, the first anchor base.
    pub fn anchor_boundary(&self) -> Result<usize> {
        Ok(match self.gene_type()?.side() {
            VjAnchorSide::V => self.anchor_end,
            VjAnchorSide::J => self.anchor_start,
        })
    }

    pub fn len(&self) -> usize {
        self.anchor_end - self.anchor_start
    }

    pub fn is_empty(&self) -> bool {
        self.anchor_end == self.anchor_start
    }

    pub fn is_trimmed(&self) -> bool {
        self.len() < self.template_anchor.len()
    }
}

fn round_up_to_codon(n: i32) -> i32 {
    (n + 2) / 3 * 3
}

// Place a template of length tlen at an offset and trim it to the sequence.  Returns the
// template range and the sequence start of the kept part.

fn place_window(
    side: VjAnchorSide,
    tlen: i32,
    offset: i32,
    seq_len: i32,
    min_len: i32,
) -> Option<(usize, usize, usize)> {
    let (wstart, wend) = match side {
        VjAnchorSide::V => (offset - tlen + 1, offset + 1),
        VjAnchorSide::J => (offset, offset + tlen),
    };
    let overrun_left = (-wstart).max(0);
    let overrun_right = (wend - seq_len).max(0);
    match side {
        VjAnchorSide::V if overrun_right > 0 => return None,
        VjAnchorSide::J if overrun_left > 0 => return None,
        _ => {}
    }
    let (ltrim, rtrim) = (round_up_to_codon(overrun_left), round_up_to_codon(overrun_right));
    let kept = tlen - ltrim - rtrim;
    if kept < min_len || kept <= 0 {
        return None;
    }
    Some((
        ltrim as usize,
        (tlen - rtrim) as usize,
        (wstart + ltrim) as usize,
    ))
}

pub struct AnchorSearcher<'a, S: VjGeneStore + ?Sized> {
    store: &'a S,
    scorer: AnchorSimilarityScorer,
    min_aa_len: usize,
}

impl<'a, S: VjGeneStore + ?Sized> AnchorSearcher<'a, S> {
    pub fn new(store: &'a S, heur: &Heuristics) -> AnchorSearcher<'a, S> {
        AnchorSearcher {
            store,
            scorer: AnchorSimilarityScorer::new(heur),
            min_aa_len: heur.min_partial_anchor_aa_len,
        }
    }

    // Search offsets [start, end) of seq.  Ties keep the first found, scanning gene types in
    // the order given, templates in store order and offsets left to right.

    pub fn search(
        &self,
        seq: &[u8],
        gene_types: &[VjGeneType],
        mode: SimilarityMode,
        start: i32,
        end: i32,
    ) -> Result<Option<AnchorMatch>> {
        let min_len = 3 * self.min_aa_len as i32;
        let mut best: Option<(i32, VjGeneType, &[u8], usize, usize)> = None;
        for &gene_type in gene_types {
            let side = gene_type.side();
            for template in self.store.anchor_templates(gene_type) {
                let tlen = template.len() as i32;
                for offset in start..end {
                    let (tstart, tstop, sstart) =
                        match place_window(side, tlen, offset, seq.len() as i32, min_len) {
                            Some(w) => w,
                            None => continue,
                        };
                    let sstop = sstart + (tstop - tstart);
                    let score = self
                        .scorer
                        .score(&template[tstart..tstop], &seq[sstart..sstop])?;
                    if mode == SimilarityMode::DisallowNegative && score < 0 {
                        continue;
                    }
                    if best.as_ref().map_or(true, |b| score > b.0) {
                        best = Some((score, gene_type, template.as_slice(), sstart, sstop));
                    }
                }
            }
        }
        let (score, gene_type, template, sstart, sstop) = match best {
            Some(b) => b,
            None => return Ok(None),
        };
        let genes = self.store.genes_for_anchor(gene_type, template);
        let found = gene_type_of(genes)?;
        if found != gene_type {
            return Err(JunctionError::InconsistentGeneTypes {
                first: gene_type.to_string(),
                second: found.to_string(),
            });
        }
        Ok(Some(AnchorMatch {
            anchor_start: sstart,
            anchor_end: sstop,
            template_anchor: template.to_vec(),
            template_genes: genes.to_vec(),
            similarity_score: score,
        }))
    }

    /// Search every offset of the sequence.
    pub fn search_all(
        &self,
        seq: &[u8],
        gene_types: &[VjGeneType],
        mode: SimilarityMode,
    ) -> Result<Option<AnchorMatch>> {
        self.search(seq, gene_types, mode, 0, seq.len() as i32)
    }
}
