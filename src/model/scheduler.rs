//! # Inference Scheduler
//!
//! Double-buffered prediction: while the calls of batch `n` are decoded and
//! emitted on a scoped worker thread, the caller's thread runs the model on
//! batch `n+1` and fetches batch `n+2`. The two batch slots are plain owned
//! values handed over by move at the end of each round, so the worker and
//! the predictor never share mutable state.
//!
//! ```text
//! fetch(0) predict(0) fetch(1)
//! [emit(0) || predict(1) fetch(2)]
//! [emit(1) || predict(2) fetch(3)]
//! ...
//! emit(last)                     <- terminal batch, no prefetch
//! ```
//!
//! At most one predict and one decode/emit are in flight at any time.

use std::io::Write;
use std::thread;

use tracing::{debug, info_span};

use crate::data::tensor::{SiteOutput, TensorBatch};
use crate::error::{JudgeError, Result};
use crate::model::decoder::{decode_batch, VariantCall};

/// Upstream producer of tensor batches
pub trait BatchSource {
    /// Next batch, or `None` once the source is exhausted
    fn next_batch(&mut self) -> Result<Option<TensorBatch>>;
}

/// The model: one output per input site
pub trait Predictor {
    fn predict(&self, batch: &TensorBatch) -> Result<Vec<SiteOutput>>;
}

/// Downstream consumer of decoded calls
pub trait CallSink: Send {
    fn emit(&mut self, calls: &[VariantCall]) -> Result<()>;
}

/// Writes one VCF data line per call
pub struct LineSink<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> LineSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> CallSink for LineSink<W> {
    fn emit(&mut self, calls: &[VariantCall]) -> Result<()> {
        for call in calls {
            writeln!(self.writer, "{}", call)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

impl CallSink for Vec<VariantCall> {
    fn emit(&mut self, calls: &[VariantCall]) -> Result<()> {
        self.extend_from_slice(calls);
        Ok(())
    }
}

/// Counters from one scheduler run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub batches: usize,
    pub sites: usize,
    /// Batches whose emit overlapped the next prediction
    pub overlapped: usize,
}

pub struct InferenceScheduler<'a, P: Predictor> {
    predictor: &'a P,
}

impl<'a, P: Predictor> InferenceScheduler<'a, P> {
    pub fn new(predictor: &'a P) -> Self {
        Self { predictor }
    }

    fn predict_checked(&self, batch: &TensorBatch) -> Result<Vec<SiteOutput>> {
        let outputs = self.predictor.predict(batch)?;
        if outputs.len() != batch.len() {
            return Err(JudgeError::consistency(format!(
                "model returned {} predictions for {} sites",
                outputs.len(),
                batch.len()
            )));
        }
        Ok(outputs)
    }

    /// Drive the source to exhaustion, emitting decoded calls in batch order
    pub fn run<B, S>(&self, source: &mut B, sink: &mut S) -> Result<SchedulerStats>
    where
        B: BatchSource,
        S: CallSink,
    {
        let _span = info_span!("inference_scheduler").entered();
        let mut stats = SchedulerStats::default();

        let Some(mut current) = source.next_batch()? else {
            return Ok(stats);
        };
        let mut outputs = self.predict_checked(&current)?;
        let mut next = source.next_batch()?;

        loop {
            let Some(upcoming) = next.take() else {
                emit_decoded(&current, &outputs, sink)?;
                stats.batches += 1;
                stats.sites += current.len();
                break;
            };

            let (emitted, predicted, fetched) = thread::scope(|scope| {
                let emitter = scope.spawn(|| emit_decoded(&current, &outputs, &mut *sink));
                let predicted = self.predict_checked(&upcoming);
                let fetched = if predicted.is_ok() {
                    source.next_batch()
                } else {
                    Ok(None)
                };
                let emitted = emitter
                    .join()
                    .unwrap_or_else(|_| Err(JudgeError::consistency("decode/emit worker panicked")));
                (emitted, predicted, fetched)
            });

            emitted?;
            stats.batches += 1;
            stats.sites += current.len();
            stats.overlapped += 1;
            debug!(batch = stats.batches, "batch emitted");

            outputs = predicted?;
            next = fetched?;
            current = upcoming;
        }

        Ok(stats)
    }
}

fn emit_decoded<S: CallSink>(
    batch: &TensorBatch,
    outputs: &[SiteOutput],
    sink: &mut S,
) -> Result<()> {
    let calls = decode_batch(batch, outputs)?;
    sink.emit(&calls)
}
