//! # Decode Pipeline
//!
//! Runs the inference scheduler over a tensor stream whose model outputs
//! were computed elsewhere, writing one call line per site. With
//! `--tensors -` it reads stdin, so it can sit at the end of a stage chain.

use std::io::{self, BufRead, BufReader, BufWriter, Write};

use tracing::info_span;

use crate::config::DecodeConfig;
use crate::error::Result;
use crate::io::prediction::PredictionReader;
use crate::io::tensor::TensorReader;
use crate::io::vcf::{create_text, open_text};
use crate::model::scheduler::{InferenceScheduler, LineSink, SchedulerStats};

pub struct DecodePipeline {
    config: DecodeConfig,
}

impl DecodePipeline {
    pub fn new(config: DecodeConfig) -> Self {
        Self { config }
    }

    pub fn run(&self) -> Result<SchedulerStats> {
        let _span = info_span!("decode").entered();

        let tensors: Box<dyn BufRead + Send> = if self.config.reads_stdin() {
            Box::new(BufReader::new(io::stdin()))
        } else {
            open_text(&self.config.tensors)?
        };
        let mut source = TensorReader::with_batch_size(tensors, self.config.batch_size);
        let predictor = PredictionReader::new(open_text(&self.config.predictions)?);

        let writer: Box<dyn Write + Send> = match &self.config.out {
            Some(path) => create_text(path)?,
            None => Box::new(BufWriter::new(io::stdout())),
        };
        let mut sink = LineSink::new(writer);

        let stats = InferenceScheduler::new(&predictor).run(&mut source, &mut sink)?;
        sink.into_inner().flush()?;
        eprintln!(
            "Decoded {} sites in {} batches ({} overlapped)",
            stats.sites, stats.batches, stats.overlapped
        );
        Ok(stats)
    }
}
