// Copyright (c) 2024 10x Genomics, Inc. All rights reserved.

//! Reconstruction of VDJ junction sequences from reads that have been provisionally placed on
//! V or J gene segments.
//!
//! Reads of each gene type are assembled into consensus layouts by an error correcting
//! branching tree.  V side and J side layouts are then joined into junction candidates, or
//! completed on their own by germline anchor search, and near-identical candidates are
//! collapsed.

pub mod anchor;
pub mod blosum;
pub mod dedup;
pub mod error;
pub mod heuristics;
pub mod join;
pub mod layout;
pub mod layout_build;
pub mod layout_tree;
pub mod read;
pub mod refx;
pub mod types;

use crate::dedup::dedup_candidates;
use crate::error::Result;
use crate::heuristics::Heuristics;
use crate::join::JunctionBuilder;
use crate::layout_build::{build_layouts, make_pool};
use crate::read::{MateReads, Read};
use crate::refx::VjGeneStore;
use crate::types::JunctionCandidate;
use log::info;
use std::collections::BTreeMap;
use vdj_types::VjGeneType;

// Run everything: layouts per gene type, joining, then deduplication.

pub fn build_junction_candidates<S: VjGeneStore + ?Sized>(
    reads_by_type: &BTreeMap<VjGeneType, Vec<Read>>,
    mates: &MateReads,
    store: &S,
    heur: &Heuristics,
) -> Result<Vec<JunctionCandidate>> {
    heur.validate()?;
    let pool = make_pool(heur)?;
    let nreads: usize = reads_by_type.values().map(|r| r.len()).sum();
    info!(
        "building junctions from {} reads of {} gene types",
        nreads,
        reads_by_type.len()
    );
    let layouts = build_layouts(reads_by_type, heur, &pool)?;
    let cands = JunctionBuilder::new(store, mates, heur).build(&layouts)?;
    dedup_candidates(cands, heur, &pool)
}
