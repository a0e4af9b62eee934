//! # Validation Report
//!
//! Flat, tab-separated report: one verdict per line (see
//! [`crate::data::verdict`] for the line formats).

use std::io::{BufRead, Write};
use std::path::Path;

use crate::data::verdict::{ReportEntry, Verdict};
use crate::error::Result;
use crate::io::vcf::{create_text, open_text, VerdictMap};

pub struct ReportWriter {
    writer: Box<dyn Write + Send>,
    written: usize,
}

impl ReportWriter {
    pub fn create(path: &Path) -> Result<Self> {
        Ok(Self {
            writer: create_text(path)?,
            written: 0,
        })
    }

    pub fn write(&mut self, verdict: &Verdict) -> Result<()> {
        writeln!(self.writer, "{}", verdict)?;
        self.written += 1;
        Ok(())
    }

    pub fn finish(mut self) -> Result<usize> {
        self.writer.flush()?;
        Ok(self.written)
    }
}

/// Load a report back into a `(contig, position)` lookup
pub fn read_report(path: &Path) -> Result<VerdictMap> {
    let reader = open_text(path)?;
    let mut verdicts = VerdictMap::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry = ReportEntry::parse(&line, idx + 1)?;
        verdicts.insert((entry.contig, entry.position), entry.kind);
    }
    Ok(verdicts)
}
