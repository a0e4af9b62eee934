//! # Validation Pipeline
//!
//! Orchestrates a full `validate` run:
//! 1. Partition the input VCF into contig groups
//! 2. Run the stage pipeline once per accepted contig, sequentially
//! 3. Merge-diff each contig's originals against its model calls
//! 4. Write the report, then the optional model-call and annotated VCFs
//!
//! Nothing is written until every contig has run, so a failed run never
//! leaves a report behind that looks complete.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, info_span};

use crate::config::Config;
use crate::data::record::VariantRecord;
use crate::data::verdict::{Verdict, VerdictTally};
use crate::error::Result;
use crate::io::report::ReportWriter;
use crate::io::vcf::{create_text, write_annotated, write_lines, VcfLineReader, VerdictMap};
use crate::model::classify::classify_contig;
use crate::pipelines::partition::{drive_contigs, partition, ContigGroup, ContigOutput};
use crate::pipelines::stages::{StageCommands, StagePipeline};
use crate::utils::telemetry::{Stage, TelemetryBlackboard};

/// What a finished run produced
#[derive(Clone, Debug, Default)]
pub struct ValidationSummary {
    pub contigs_run: usize,
    pub contigs_skipped: usize,
    pub records: usize,
    pub model_calls: usize,
    pub tally: VerdictTally,
    /// Records rejected in the annotated VCF, when one was written
    pub rejected: Option<usize>,
}

pub struct ValidationPipeline {
    config: Config,
    telemetry: Option<Arc<TelemetryBlackboard>>,
}

impl ValidationPipeline {
    pub fn new(config: Config, telemetry: Option<Arc<TelemetryBlackboard>>) -> Self {
        Self { config, telemetry }
    }

    fn set_stage(&self, stage: Stage) {
        if let Some(t) = &self.telemetry {
            t.set_stage(stage);
        }
    }

    pub fn run(&mut self) -> Result<ValidationSummary> {
        let _span = info_span!("validate", vcf = ?self.config.vcf).entered();
        let commands = StageCommands::from_config(&self.config)?;

        self.set_stage(Stage::Partitioning);
        eprintln!("Reading {:?}...", self.config.vcf);
        let mut reader = VcfLineReader::open(&self.config.vcf)?;
        let parts = partition(&mut reader)?;

        let accepted = parts
            .groups
            .iter()
            .filter(|g| self.config.accepts_contig(&g.contig))
            .count();
        eprintln!(
            "  {} records on {} contigs ({} selected)",
            parts.n_records(),
            parts.groups.len(),
            accepted
        );
        if let Some(t) = &self.telemetry {
            t.set_total_contigs(accepted as u64);
        }

        self.set_stage(Stage::RunningStages);
        let mut stages = StagePipeline::new(Duration::from_millis(self.config.poll_ms));
        if let Some(t) = &self.telemetry {
            stages = stages.with_telemetry(t.clone());
        }
        let telemetry = self.telemetry.clone();
        let outputs = drive_contigs(
            &parts,
            |contig| self.config.accepts_contig(contig),
            |group| {
                let lines = stages.run(&commands.for_contig(&group.contig), group.lines.clone())?;
                if let Some(t) = &telemetry {
                    t.contig_done();
                }
                Ok(lines)
            },
        )?;

        self.set_stage(Stage::Classifying);
        let mut tally = VerdictTally::default();
        let mut verdicts = Vec::with_capacity(parts.n_records());
        for output in &outputs {
            let group = &parts.groups[output.group];
            tally_into(&mut tally, classify_output(group, output, &mut verdicts)?);
        }
        if let Some(t) = &self.telemetry {
            t.add_verdicts(verdicts.len() as u64);
        }

        self.set_stage(Stage::WritingOutput);
        let mut report = ReportWriter::create(&self.config.report)?;
        for verdict in &verdicts {
            report.write(verdict)?;
        }
        let written = report.finish()?;
        eprintln!("Wrote {} verdicts to {:?}", written, self.config.report);

        let model_calls: usize = outputs.iter().map(|o| o.lines.len()).sum();
        if let Some(path) = &self.config.calls_vcf {
            let calls: Vec<String> = outputs.iter().flat_map(|o| o.lines.iter().cloned()).collect();
            let mut writer = create_text(path)?;
            write_lines(&mut writer, &parts.headers, &calls)?;
            eprintln!("Wrote {} model calls to {:?}", calls.len(), path);
        }

        let rejected = match &self.config.annotated_vcf {
            Some(path) => {
                let map: VerdictMap = verdicts
                    .iter()
                    .map(|v| ((v.contig.clone(), v.position), v.kind))
                    .collect();
                let n = write_annotated(&self.config.vcf, &map, path)?;
                eprintln!("Wrote annotated VCF to {:?} ({} rejected)", path, n);
                Some(n)
            }
            None => None,
        };

        let summary = ValidationSummary {
            contigs_run: outputs.len(),
            contigs_skipped: parts.groups.len() - outputs.len(),
            records: parts.n_records(),
            model_calls,
            tally,
            rejected,
        };
        print_summary(&summary);
        Ok(summary)
    }
}

/// Classify one contig's run, appending verdicts in position order
fn classify_output(
    group: &ContigGroup,
    output: &ContigOutput,
    verdicts: &mut Vec<Verdict>,
) -> Result<VerdictTally> {
    let _span = info_span!("classify", contig = %group.contig).entered();
    let originals = group
        .lines
        .iter()
        .zip(&group.line_nos)
        .map(|(line, &line_no)| VariantRecord::parse(line, line_no))
        .collect::<Result<Vec<_>>>()?;
    let model = output
        .lines
        .iter()
        .enumerate()
        .map(|(i, line)| VariantRecord::parse(line, i + 1))
        .collect::<Result<Vec<_>>>()?;

    let tally = classify_contig(&group.contig, originals, model, |verdict| {
        verdicts.push(verdict);
        Ok(())
    })?;
    info!(
        matched = tally.matched,
        mismatched = tally.mismatched,
        spurious = tally.spurious,
        multiallelic = tally.multiallelic,
        "contig classified"
    );
    Ok(tally)
}

fn tally_into(total: &mut VerdictTally, part: VerdictTally) {
    total.matched += part.matched;
    total.mismatched += part.mismatched;
    total.spurious += part.spurious;
    total.multiallelic += part.multiallelic;
}

fn print_summary(summary: &ValidationSummary) {
    let t = &summary.tally;
    eprintln!(
        "Contigs: {} validated, {} skipped; {} records, {} model calls",
        summary.contigs_run, summary.contigs_skipped, summary.records, summary.model_calls
    );
    eprintln!(
        "Verdicts: {} total (M={} X={} S={} B={})",
        t.total(),
        t.matched,
        t.mismatched,
        t.spurious,
        t.multiallelic
    );
}
