//! # I/O Module
//!
//! Line-oriented readers and writers: VCF text, validation reports, tensor
//! records and precomputed model outputs.

pub mod prediction;
pub mod report;
pub mod tensor;
pub mod vcf;
