// Copyright (c) 2019 10x Genomics, Inc. All rights reserved.

// Translation of DNA to amino acids.  Codons containing anything other than A, C, G or T
// translate to X.

pub fn codon_to_aa(codon: &[u8]) -> u8 {
    assert!(codon.len() == 3);
    match codon {
        b"GGT" | b"GGC" | b"GGA" | b"GGG" => b'G',
        b"TGG" => b'W',
        b"TGT" | b"TGC" => b'C',
        b"TTT" | b"TTC" => b'F',
        b"TTA" | b"TTG" | b"CTT" | b"CTC" | b"CTA" | b"CTG" => b'L',
        b"ATT" | b"ATC" | b"ATA" => b'I',
        b"GTT" | b"GTC" | b"GTA" | b"GTG" => b'V',
        b"TCT" | b"TCC" | b"TCA" | b"TCG" | b"AGT" | b"AGC" => b'S',
        b"CCT" | b"CCC" | b"CCA" | b"CCG" => b'P',
        b"ACT" | b"ACC" | b"ACA" | b"ACG" => b'T',
        b"GCT" | b"GCC" | b"GCA" | b"GCG" => b'A',
        b"TAT" | b"TAC" => b'Y',
        b"CAT" | b"CAC" => b'H',
        b"CAA" | b"CAG" => b'Q',
        b"AAT" | b"AAC" => b'N',
        b"AAA" | b"AAG" => b'K',
        b"GAT" | b"GAC" => b'D',
        b"GAA" | b"GAG" => b'E',
        b"CGT" | b"CGC" | b"CGA" | b"CGG" | b"AGA" | b"AGG" => b'R',
        b"ATG" => b'M',
        b"TAG" | b"TAA" | b"TGA" => b'*',
        _ => b'X',
    }
}

// Convert a given DNA sequence to amino acids, starting at a given position.  Trailing bases
// that do not fill a codon are ignored.

pub fn aa_seq(x: &[u8], start: usize) -> Vec<u8> {
    let mut a = Vec::<u8>::with_capacity(x.len().saturating_sub(start) / 3);
    if x.len() >= start + 3 {
        for j in (start..x.len() - 3 + 1).step_by(3) {
            a.push(codon_to_aa(&x[j..j + 3]));
        }
    }
    a
}

// Test for a stop codon at a given position.

pub fn have_stop(b: &[u8], j: usize) -> bool {
    j + 3 <= b.len() && codon_to_aa(&b[j..j + 3]) == b'*'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translation() {
        assert_eq!(aa_seq(b"TGTGCCAGC", 0), b"CAS".to_vec());
        assert_eq!(aa_seq(b"ATGTGTGCC", 1), b"CV".to_vec());
        assert_eq!(aa_seq(b"TGTGC", 0), b"C".to_vec());
        assert!(aa_seq(b"TG", 0).is_empty());
        assert!(aa_seq(b"TGTGC", 4).is_empty());
    }

    #[test]
    fn test_unresolved_codon() {
        assert_eq!(codon_to_aa(b"TNT"), b'X');
        assert_eq!(aa_seq(b"TGGNNN", 0), b"WX".to_vec());
    }

    #[test]
    fn test_have_stop() {
        assert!(have_stop(b"ATAGC", 1));
        assert!(!have_stop(b"ATAGC", 0));
        assert!(!have_stop(b"ATA", 1));
    }
}
