//! # Data Module
//!
//! In-memory representations shared by every stage of the validator:
//! parsed VCF records, tensor batches and model outputs, and verdicts.

pub mod record;
pub mod tensor;
pub mod verdict;

// Re-export commonly used types
pub use record::{Genotype, GenotypeField, VariantRecord};
pub use tensor::{FeatureMatrix, SiteOutput, SiteTag, TensorBatch, TensorSite};
pub use verdict::{ReportEntry, Verdict, VerdictKind, VerdictTally};
