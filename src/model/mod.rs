//! # Model Module
//!
//! The algorithmic core: decoding model outputs into calls, scheduling
//! inference with overlapped decode, and classifying original calls
//! against model calls.

pub mod classify;
pub mod decoder;
pub mod scheduler;

pub use classify::classify_contig;
pub use decoder::{decode_batch, decode_site, VariantCall};
pub use scheduler::{BatchSource, CallSink, InferenceScheduler, LineSink, Predictor};
