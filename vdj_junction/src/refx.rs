// Copyright (c) 2018 10X Genomics, Inc. All rights reserved.

// This file contains the gene reference data used for anchor search.
//
// For each gene type we keep the distinct germline anchor sequences, and for each anchor the
// gene records carrying it.  The data are read-only once built and are shared across worker
// threads.

use crate::error::{JunctionError, Result};
use crate::read::is_resolved;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use vdj_types::VjGeneType;
use vector_utils::unique_sort;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneRecord {
    pub id: String,
    pub name: String, // e.g. TRBV20-1
    pub allele: String,
    pub gene_type: VjGeneType,
    pub anchor: Vec<u8>, // germline anchor bases, a whole number of codons
    pub seq: Vec<u8>,    // full germline sequence
}

/// Read access to germline anchors.  Implementations must be safe to share between threads.
pub trait VjGeneStore: Sync {
    /// Distinct anchor sequences of a gene type, in a fixed order.
    fn anchor_templates(&self, gene_type: VjGeneType) -> &[Vec<u8>];

    /// Genes of a gene type whose anchor is exactly `anchor`.
    fn genes_for_anchor(&self, gene_type: VjGeneType, anchor: &[u8]) -> &[GeneRecord];
}

// The gene type shared by a group of genes.  An empty or mixed group means the caller built
// the group wrongly.

pub fn gene_type_of(genes: &[GeneRecord]) -> Result<VjGeneType> {
    let first = genes.first().ok_or(JunctionError::EmptyMatchList)?;
    for g in genes.iter().skip(1) {
        if g.gene_type != first.gene_type {
            return Err(JunctionError::InconsistentGeneTypes {
                first: first.gene_type.to_string(),
                second: g.gene_type.to_string(),
            });
        }
    }
    Ok(first.gene_type)
}

// RefData: the packaging of reference anchors appropriate for junction building.

#[derive(Default)]
pub struct RefData {
    pub genes: Vec<GeneRecord>,
    templates: HashMap<VjGeneType, Vec<Vec<u8>>>,
    by_anchor: HashMap<VjGeneType, HashMap<Vec<u8>, Vec<GeneRecord>>>,
}

impl RefData {
    pub fn new() -> RefData {
        RefData::default()
    }

    pub fn from_genes(genes: Vec<GeneRecord>) -> Result<RefData> {
        let mut refdata = RefData::new();
        for (i, g) in genes.iter().enumerate() {
            validate_gene(g, i + 1)?;
            refdata
                .templates
                .entry(g.gene_type)
                .or_default()
                .push(g.anchor.clone());
            refdata
                .by_anchor
                .entry(g.gene_type)
                .or_default()
                .entry(g.anchor.clone())
                .or_default()
                .push(g.clone());
        }
        for t in refdata.templates.values_mut() {
            unique_sort(t);
        }
        for groups in refdata.by_anchor.values() {
            for group in groups.values() {
                gene_type_of(group)?;
            }
        }
        refdata.genes = genes;
        Ok(refdata)
    }

    // Parse tab-separated text with columns
    // id  gene  allele  type  anchor  sequence
    // Blank lines, lines starting with # and a header line starting with "id" are skipped.

    pub fn from_tsv_contents(contents: &str) -> Result<RefData> {
        let mut genes = Vec::<GeneRecord>::new();
        for (i, line) in contents.lines().enumerate() {
            let line = line.trim_end();
            if line.is_empty() || line.starts_with('#') || (i == 0 && line.starts_with("id\t")) {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() != 6 {
                return Err(JunctionError::InvalidGeneData {
                    line: i + 1,
                    reason: format!("expected 6 fields, found {}", fields.len()),
                });
            }
            let gene_type = fields[3]
                .parse::<VjGeneType>()
                .map_err(|_| JunctionError::InvalidGeneData {
                    line: i + 1,
                    reason: format!("unknown gene type {}", fields[3]),
                })?;
            genes.push(GeneRecord {
                id: fields[0].to_string(),
                name: fields[1].to_string(),
                allele: fields[2].to_string(),
                gene_type,
                anchor: fields[4].as_bytes().to_ascii_uppercase(),
                seq: fields[5].as_bytes().to_ascii_uppercase(),
            });
        }
        RefData::from_genes(genes)
    }

    pub fn gene_types(&self) -> Vec<VjGeneType> {
        let mut types: Vec<VjGeneType> = self.templates.keys().cloned().collect();
        types.sort();
        types
    }
}

fn validate_gene(g: &GeneRecord, line: usize) -> Result<()> {
    let bad = |reason: String| JunctionError::InvalidGeneData { line, reason };
    if g.anchor.is_empty() || g.anchor.len() % 3 != 0 {
        return Err(bad(format!(
            "anchor of {} has length {}, not a whole number of codons",
            g.name,
            g.anchor.len()
        )));
    }
    if !g.anchor.iter().all(|b| is_resolved(*b)) {
        return Err(bad(format!("anchor of {} has unresolved bases", g.name)));
    }
    if !g.name.starts_with(&g.gene_type.to_string()) {
        return Err(bad(format!(
            "gene {} does not belong to type {}",
            g.name, g.gene_type
        )));
    }
    Ok(())
}

impl VjGeneStore for RefData {
    fn anchor_templates(&self, gene_type: VjGeneType) -> &[Vec<u8>] {
        self.templates
            .get(&gene_type)
            .map(|t| t.as_slice())
            .unwrap_or(&[])
    }

    fn genes_for_anchor(&self, gene_type: VjGeneType, anchor: &[u8]) -> &[GeneRecord] {
        self.by_anchor
            .get(&gene_type)
            .and_then(|m| m.get(anchor))
            .map(|g| g.as_slice())
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TSV: &str = "id\tgene\tallele\ttype\tanchor\tsequence\n\
        1\tTRBV20-1\t01\tTRBV\tTGTGCCAGC\tAAATGTGCCAGC\n\
        2\tTRBV20-2\t01\tTRBV\tTGTGCCAGC\tCCCTGTGCCAGC\n\
        # a comment\n\
        3\tTRBJ2-7\t01\tTRBJ\ttttgggcca\tTTTGGGCCAGGG\n";

    #[test]
    fn test_parse_and_group() {
        let refdata = RefData::from_tsv_contents(TSV).unwrap();
        assert_eq!(refdata.genes.len(), 3);
        assert_eq!(refdata.anchor_templates(VjGeneType::TRBV).len(), 1);
        let genes = refdata.genes_for_anchor(VjGeneType::TRBV, b"TGTGCCAGC");
        assert_eq!(genes.len(), 2);
        assert_eq!(gene_type_of(genes).unwrap(), VjGeneType::TRBV);
        assert_eq!(
            refdata.anchor_templates(VjGeneType::TRBJ),
            &[b"TTTGGGCCA".to_vec()][..]
        );
        assert!(refdata.anchor_templates(VjGeneType::IGHV).is_empty());
        assert!(refdata.genes_for_anchor(VjGeneType::TRBJ, b"AAA").is_empty());
        assert_eq!(
            refdata.gene_types(),
            vec![VjGeneType::TRBV, VjGeneType::TRBJ]
        );
    }

    #[test]
    fn test_rejects_bad_rows() {
        let short = "1\tTRBV20-1\t01\tTRBV\tTGTGCCAG\tAAA\n";
        assert!(matches!(
            RefData::from_tsv_contents(short),
            Err(JunctionError::InvalidGeneData { line: 1, .. })
        ));
        let wrong_type = "1\tTRBV20-1\t01\tTRAV\tTGTGCCAGC\tAAA\n";
        assert!(RefData::from_tsv_contents(wrong_type).is_err());
        let fields = "1\tTRBV20-1\t01\tTRBV\n";
        assert!(RefData::from_tsv_contents(fields).is_err());
    }

    #[test]
    fn test_gene_type_of_errors() {
        assert!(matches!(gene_type_of(&[]), Err(JunctionError::EmptyMatchList)));
        let mut a = GeneRecord {
            id: "1".to_string(),
            name: "TRAV1".to_string(),
            allele: "01".to_string(),
            gene_type: VjGeneType::TRAV,
            anchor: b"TGT".to_vec(),
            seq: b"TGT".to_vec(),
        };
        let b = a.clone();
        a.gene_type = VjGeneType::TRDV;
        assert!(matches!(
            gene_type_of(&[a, b]),
            Err(JunctionError::InconsistentGeneTypes { .. })
        ));
    }
}
