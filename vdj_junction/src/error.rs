// Copyright (c) 2024 10x Genomics, Inc. All rights reserved.

//! Error types for junction reconstruction.
//!
//! Every variant here signals a logic or input error upstream of the failing call; ordinary
//! absences (no anchor, no overlap) are reported through `Option` instead.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, JunctionError>;

#[derive(Error, Debug)]
pub enum JunctionError {
    /// Both windows handed to the anchor scorer are unresolved at the same position.
    #[error("template and candidate are both unresolved at anchor position {pos}")]
    AmbiguousAnchorBase { pos: usize },

    #[error("anchor length mismatch: template has {template} bases, candidate has {candidate}")]
    AnchorLengthMismatch { template: usize, candidate: usize },

    #[error("anchor window of {len} bases is not a whole number of codons")]
    AnchorNotCodonAligned { len: usize },

    /// A group of anchor matches was asked for its gene type but holds no genes.
    #[error("match group has no gene records")]
    EmptyMatchList,

    #[error("match group mixes gene types {first} and {second}")]
    InconsistentGeneTypes { first: String, second: String },

    #[error("read {name} has {bases} bases but {quals} quality scores")]
    ReadLengthMismatch {
        name: String,
        bases: usize,
        quals: usize,
    },

    #[error("layout tree is inconsistent: {0}")]
    TreeInconsistency(String),

    #[error("invalid parameter '{parameter}': {reason}")]
    InvalidParameter { parameter: String, reason: String },

    #[error("invalid gene data at line {line}: {reason}")]
    InvalidGeneData { line: usize, reason: String },

    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),
}
