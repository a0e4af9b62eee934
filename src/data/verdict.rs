//! # Validation Verdicts
//!
//! Classifier outcome per position and its report-line encoding:
//! ```text
//! M <qual> <contig> <pos> <ref> <orig_alt> <orig_gt> <model_alt> <model_gt>
//! X <qual> <contig> <pos> <ref> <orig_alt> <orig_gt> <model_alt> <model_gt>
//! S 0      <contig> <pos> <ref> <orig_alt> <orig_gt>
//! B 0      <contig> <pos> <ref> <orig_alt> <orig_gt>
//! ```

use std::fmt;

use crate::data::record::GenotypeField;
use crate::error::{JudgeError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VerdictKind {
    /// Original and model ALT plus genotype agree
    Match,
    /// Original and model ALT or genotype differ
    Mismatch,
    /// Original call with no model counterpart
    Spurious,
    /// Original `1/2` call, excluded from match accounting
    Multiallelic,
}

impl VerdictKind {
    pub fn code(self) -> char {
        match self {
            VerdictKind::Match => 'M',
            VerdictKind::Mismatch => 'X',
            VerdictKind::Spurious => 'S',
            VerdictKind::Multiallelic => 'B',
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "M" => Some(VerdictKind::Match),
            "X" => Some(VerdictKind::Mismatch),
            "S" => Some(VerdictKind::Spurious),
            "B" => Some(VerdictKind::Multiallelic),
            _ => None,
        }
    }

    /// Whether the annotated VCF should flag this position
    pub fn is_rejected(self) -> bool {
        matches!(self, VerdictKind::Mismatch | VerdictKind::Spurious)
    }
}

/// One classified position
#[derive(Clone, Debug, PartialEq)]
pub struct Verdict {
    pub kind: VerdictKind,
    pub contig: String,
    pub position: u64,
    pub ref_allele: String,
    pub original: GenotypeField,
    /// Present for Match/Mismatch
    pub model: Option<GenotypeField>,
    /// Model QUAL column, verbatim, for Match/Mismatch
    pub quality: Option<String>,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let qual = match self.kind {
            VerdictKind::Match | VerdictKind::Mismatch => self.quality.as_deref().unwrap_or("."),
            VerdictKind::Spurious | VerdictKind::Multiallelic => "0",
        };
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}",
            self.kind.code(),
            qual,
            self.contig,
            self.position,
            self.ref_allele,
            self.original
        )?;
        if let Some(model) = &self.model {
            write!(f, "\t{}", model)?;
        }
        Ok(())
    }
}

/// Minimal view of a report line: enough to annotate a VCF later
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportEntry {
    pub kind: VerdictKind,
    pub contig: String,
    pub position: u64,
}

impl ReportEntry {
    pub fn parse(line: &str, line_no: usize) -> Result<Self> {
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.len() < 4 {
            return Err(JudgeError::parse(line_no, "truncated report line"));
        }
        let kind = VerdictKind::from_code(cols[0]).ok_or_else(|| {
            JudgeError::parse(line_no, format!("unknown verdict code '{}'", cols[0]))
        })?;
        let position = cols[3].parse::<u64>().map_err(|_| {
            JudgeError::parse(line_no, format!("invalid position '{}'", cols[3]))
        })?;
        Ok(Self {
            kind,
            contig: cols[2].to_string(),
            position,
        })
    }
}

/// Verdict counts for the end-of-run summary
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VerdictTally {
    pub matched: usize,
    pub mismatched: usize,
    pub spurious: usize,
    pub multiallelic: usize,
}

impl VerdictTally {
    pub fn add(&mut self, kind: VerdictKind) {
        match kind {
            VerdictKind::Match => self.matched += 1,
            VerdictKind::Mismatch => self.mismatched += 1,
            VerdictKind::Spurious => self.spurious += 1,
            VerdictKind::Multiallelic => self.multiallelic += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.matched + self.mismatched + self.spurious + self.multiallelic
    }
}
