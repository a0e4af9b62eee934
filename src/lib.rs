//! # Varjudge Library
//!
//! Validates candidate variant calls against an independent neural inference
//! pass and writes a categorized validation report.
//!
//! ## Modules
//! - `config`: CLI argument parsing and validation
//! - `data`: Variant records, tensor batches, verdicts
//! - `error`: Error types and result aliases
//! - `io`: VCF text I/O, report lines, tensor text reader
//! - `model`: Tensor decoder, inference scheduler, merge-diff classifier
//! - `pipelines`: Stage chain, contig partitioner, run orchestration
//! - `utils`: Progress telemetry

pub mod config;
pub mod data;
pub mod error;
pub mod io;
pub mod model;
pub mod pipelines;
pub mod utils;

// Re-export commonly used types
pub use config::{AnnotateConfig, Cli, Command, Config, DecodeConfig};
pub use data::{Genotype, VariantRecord, Verdict, VerdictKind, VerdictTally};
pub use error::{JudgeError, Result};
pub use model::{classify_contig, decode_batch, InferenceScheduler, VariantCall};
pub use pipelines::{AnnotatePipeline, DecodePipeline, StagePipeline, ValidationPipeline};
