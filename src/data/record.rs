//! # Variant Records
//!
//! Parsed view of one VCF data line. Only the columns the validator needs are
//! kept; the raw line travels separately so it can be echoed byte-for-byte to
//! stage inputs and annotated output.

use std::fmt;

use crate::error::{JudgeError, Result};

/// Diploid genotype as an order-normalized allele index pair.
///
/// Missing alleles (`.`) are normalized to the reference allele (0) and the
/// pair is sorted so `first <= second`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Genotype {
    pub first: u32,
    pub second: u32,
}

impl Genotype {
    pub fn new(a: u32, b: u32) -> Self {
        if a <= b {
            Self { first: a, second: b }
        } else {
            Self { first: b, second: a }
        }
    }

    pub fn hom_ref() -> Self {
        Self::new(0, 0)
    }

    /// Two distinct non-reference alleles (`1/2`), excluded from match accounting
    pub fn is_multiallelic(self) -> bool {
        self.first == 1 && self.second == 2
    }

    /// Parse the GT sub-field of a sample column (e.g. `0/1:35:20`).
    ///
    /// Both `/` and `|` separate alleles; a single allele is treated as
    /// haploid and duplicated.
    pub fn parse_sample(sample: &str) -> Result<Self> {
        let gt = sample.split(':').next().unwrap_or("");
        if gt.is_empty() {
            return Ok(Self::hom_ref());
        }

        let mut alleles = gt.split(['/', '|']).map(parse_allele_index);
        let first = alleles
            .next()
            .ok_or_else(|| JudgeError::vcf(format!("empty genotype '{}'", gt)))??;
        let second = match alleles.next() {
            Some(a) => a?,
            None => first,
        };
        if alleles.next().is_some() {
            return Err(JudgeError::vcf(format!(
                "genotype '{}' is not diploid",
                gt
            )));
        }
        Ok(Self::new(first, second))
    }
}

impl fmt::Display for Genotype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.first, self.second)
    }
}

fn parse_allele_index(s: &str) -> Result<u32> {
    // "." (missing) counts as reference
    let digits: String = s.chars().map(|c| if c == '.' { '0' } else { c }).collect();
    digits
        .parse::<u32>()
        .map_err(|_| JudgeError::vcf(format!("invalid allele index '{}'", s)))
}

/// One variant site from a VCF stream
#[derive(Clone, Debug, PartialEq)]
pub struct VariantRecord {
    pub contig: String,
    /// 1-based position
    pub position: u64,
    pub ref_allele: String,
    pub alt_allele: String,
    pub genotype: Genotype,
    /// QUAL column as written
    pub quality: String,
}

impl VariantRecord {
    /// Parse a tab/space separated VCF data line.
    ///
    /// The genotype comes from the last column. Lines with no sample column
    /// carry a reference genotype.
    pub fn parse(line: &str, line_no: usize) -> Result<Self> {
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.len() < 6 {
            return Err(JudgeError::parse(
                line_no,
                format!("expected at least 6 columns, found {}", cols.len()),
            ));
        }

        let position = cols[1].parse::<u64>().map_err(|_| {
            JudgeError::parse(line_no, format!("invalid position '{}'", cols[1]))
        })?;

        let genotype = if cols.len() >= 10 {
            Genotype::parse_sample(cols[cols.len() - 1])
                .map_err(|e| JudgeError::parse(line_no, e.to_string()))?
        } else {
            Genotype::hom_ref()
        };

        Ok(Self {
            contig: cols[0].to_string(),
            position,
            ref_allele: cols[3].to_string(),
            alt_allele: cols[4].to_string(),
            genotype,
            quality: cols[5].to_string(),
        })
    }

    /// ALT allele plus normalized genotype, as printed in the report
    pub fn genotype_field(&self) -> GenotypeField {
        GenotypeField {
            alt: self.alt_allele.clone(),
            genotype: self.genotype,
        }
    }
}

/// `ALT<TAB>a/b` pair shown for each side of a verdict
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenotypeField {
    pub alt: String,
    pub genotype: Genotype,
}

impl fmt::Display for GenotypeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}", self.alt, self.genotype)
    }
}
