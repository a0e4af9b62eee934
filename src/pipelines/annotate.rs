//! # Annotation Pipeline
//!
//! Standalone `annotate`: loads a report from an earlier `validate` run and
//! rewrites the FILTER column of the input VCF from it.

use tracing::info_span;

use crate::config::AnnotateConfig;
use crate::error::Result;
use crate::io::report::read_report;
use crate::io::vcf::write_annotated;

pub struct AnnotatePipeline {
    config: AnnotateConfig,
}

impl AnnotatePipeline {
    pub fn new(config: AnnotateConfig) -> Self {
        Self { config }
    }

    /// Returns the number of rejected records
    pub fn run(&self) -> Result<usize> {
        let _span = info_span!("annotate").entered();
        eprintln!("Loading report {:?}...", self.config.report);
        let verdicts = read_report(&self.config.report)?;
        eprintln!("  {} verdicts", verdicts.len());

        let rejected = write_annotated(&self.config.vcf, &verdicts, &self.config.out)?;
        eprintln!(
            "Wrote annotated VCF to {:?} ({} rejected)",
            self.config.out, rejected
        );
        Ok(rejected)
    }
}
