//! # Pipeline Module
//!
//! High-level orchestration of validation and annotation runs.
//! Coordinates contig partitioning, external stage chains, classification
//! and output writing. `decode` drives the inference scheduler directly.

pub mod annotate;
pub mod decode;
pub mod partition;
pub mod stages;
pub mod validation;

pub use annotate::AnnotatePipeline;
pub use decode::DecodePipeline;
pub use stages::{StageChain, StagePipeline, StageSpec};
pub use validation::{ValidationPipeline, ValidationSummary};
