// Copyright (c) 2021 10x Genomics, Inc. All rights reserved.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use strum_macros::{Display, EnumIter, EnumString};

/// All the possible heavy and light chains
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    EnumIter,
    Hash,
)]
pub enum VdjChain {
    IGH,
    IGK,
    IGL,
    TRA,
    TRB,
    TRD,
    TRG,
}

/// Different segments or regions in a full-length receptor transcript
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    EnumIter,
    Hash,
)]
pub enum VdjRegion {
    #[strum(to_string = "5'UTR")]
    #[serde(rename = "5'UTR")]
    UTR, // 5′ untranslated region (5′ UTR)
    #[strum(to_string = "L-REGION+V-REGION")]
    #[serde(rename = "L-REGION+V-REGION")]
    V, // Variable region
    #[strum(to_string = "D-REGION")]
    #[serde(rename = "D-REGION")]
    D, // Diversity region
    #[strum(to_string = "J-REGION")]
    #[serde(rename = "J-REGION")]
    J, // Joining region
    #[strum(to_string = "C-REGION")]
    #[serde(rename = "C-REGION")]
    C, // Constant region
}

/// Which end of the junction an anchor sits on.  A V anchor lies to the left of the junction
/// and ends in the conserved cysteine; a J anchor lies to the right and starts with the
/// conserved tryptophan or phenylalanine.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Hash)]
pub enum VjAnchorSide {
    V,
    J,
}

/// Gene segment types that carry a junction anchor.  IGKINTR (the kappa intron RSS) and
/// IGKDEL (the kappa deleting element) behave as V and J sides of the kappa deleting
/// rearrangement.
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    EnumIter,
    Hash,
)]
pub enum VjGeneType {
    IGHV,
    IGHJ,
    IGKV,
    IGKJ,
    IGLV,
    IGLJ,
    TRAV,
    TRAJ,
    TRBV,
    TRBJ,
    TRDV,
    TRDJ,
    TRGV,
    TRGJ,
    IGKINTR,
    IGKDEL,
}

impl VjGeneType {
    pub fn side(self) -> VjAnchorSide {
        use VjGeneType::*;
        match self {
            IGHV | IGKV | IGLV | TRAV | TRBV | TRDV | TRGV | IGKINTR => VjAnchorSide::V,
            IGHJ | IGKJ | IGLJ | TRAJ | TRBJ | TRDJ | TRGJ | IGKDEL => VjAnchorSide::J,
        }
    }

    pub fn chain(self) -> VdjChain {
        use VjGeneType::*;
        match self {
            IGHV | IGHJ => VdjChain::IGH,
            IGKV | IGKJ | IGKINTR | IGKDEL => VdjChain::IGK,
            IGLV | IGLJ => VdjChain::IGL,
            TRAV | TRAJ => VdjChain::TRA,
            TRBV | TRBJ => VdjChain::TRB,
            TRDV | TRDJ => VdjChain::TRD,
            TRGV | TRGJ => VdjChain::TRG,
        }
    }

    pub fn region(self) -> VdjRegion {
        match self.side() {
            VjAnchorSide::V => VdjRegion::V,
            VjAnchorSide::J => VdjRegion::J,
        }
    }

    // Gene types on the opposite side that can recombine with this one.  TRA and TRD share a
    // locus, so their V and J segments pair across chains, and kappa V/intron segments pair
    // with both kappa J and the deleting element.

    pub fn pairs_with(self) -> &'static [VjGeneType] {
        use VjGeneType::*;
        match self {
            IGHV => &[IGHJ],
            IGHJ => &[IGHV],
            IGKV => &[IGKJ, IGKDEL],
            IGKINTR => &[IGKDEL],
            IGKJ => &[IGKV],
            IGKDEL => &[IGKV, IGKINTR],
            IGLV => &[IGLJ],
            IGLJ => &[IGLV],
            TRAV => &[TRAJ, TRDJ],
            TRDV => &[TRDJ, TRAJ],
            TRAJ => &[TRAV, TRDV],
            TRDJ => &[TRDV, TRAV],
            TRBV => &[TRBJ],
            TRBJ => &[TRBV],
            TRGV => &[TRGJ],
            TRGJ => &[TRGV],
        }
    }

    /// All compatible (V type, J type) pairs, in a fixed order.
    pub fn vj_pairs() -> Vec<(VjGeneType, VjGeneType)> {
        use strum::IntoEnumIterator;
        let mut pairs = Vec::new();
        for v in VjGeneType::iter().filter(|t| t.side() == VjAnchorSide::V) {
            for j in v.pairs_with() {
                pairs.push((v, *j));
            }
        }
        pairs
    }
}

/// The pair of gene types a junction candidate is attributed to.  Either side may be unknown
/// for a one-sided candidate.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Hash)]
pub struct VjGenePair {
    pub v: Option<VjGeneType>,
    pub j: Option<VjGeneType>,
}

impl fmt::Display for VjGenePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = |t: Option<VjGeneType>| t.map_or_else(|| "None".to_string(), |t| t.to_string());
        write!(f, "{}/{}", name(self.v), name(self.j))
    }
}

impl FromStr for VjGenePair {
    type Err = strum::ParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |x: &str| -> Result<Option<VjGeneType>, strum::ParseError> {
            if x == "None" {
                Ok(None)
            } else {
                Ok(Some(x.parse()?))
            }
        };
        let (v, j) = s.split_once('/').ok_or(strum::ParseError::VariantNotFound)?;
        Ok(VjGenePair {
            v: parse(v)?,
            j: parse(j)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn vdj_region_from_str() {
        assert_eq!(VdjRegion::from_str("5'UTR"), Ok(VdjRegion::UTR));
        assert_eq!(VdjRegion::from_str("L-REGION+V-REGION"), Ok(VdjRegion::V));
        assert_eq!(VdjRegion::from_str("J-REGION"), Ok(VdjRegion::J));
        assert_eq!(
            serde_json::to_string(&VdjRegion::V).unwrap(),
            "\"L-REGION+V-REGION\""
        );
    }

    #[test]
    fn test_gene_type_sides_and_chains() {
        for t in VjGeneType::iter() {
            // Every partner sits on the other side and lists us back.
            for p in t.pairs_with() {
                assert_ne!(p.side(), t.side());
                assert!(p.pairs_with().contains(&t), "{} <-> {}", t, p);
            }
            assert_eq!(t.to_string().parse::<VjGeneType>().unwrap(), t);
        }
        assert_eq!(VjGeneType::TRDV.chain(), VdjChain::TRD);
        assert_eq!(VjGeneType::IGKDEL.side(), VjAnchorSide::J);
        assert_eq!(VjGeneType::IGKINTR.region(), VdjRegion::V);
    }

    #[test]
    fn test_vj_pairs() {
        let pairs = VjGeneType::vj_pairs();
        assert!(pairs.contains(&(VjGeneType::TRAV, VjGeneType::TRDJ)));
        assert!(pairs.contains(&(VjGeneType::IGKINTR, VjGeneType::IGKDEL)));
        assert!(!pairs.contains(&(VjGeneType::IGHV, VjGeneType::IGKJ)));
        for (v, j) in pairs {
            assert_eq!(v.side(), VjAnchorSide::V);
            assert_eq!(j.side(), VjAnchorSide::J);
        }
    }

    #[test]
    fn test_gene_pair_display() {
        let pair = VjGenePair {
            v: Some(VjGeneType::TRBV),
            j: None,
        };
        assert_eq!(pair.to_string(), "TRBV/None");
        assert_eq!("TRBV/None".parse::<VjGenePair>().unwrap(), pair);
        assert!("TRBV".parse::<VjGenePair>().is_err());
    }
}
