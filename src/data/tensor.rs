//! # Tensor Batches
//!
//! Feature tensors consumed by the inference stage and the per-site output
//! distributions the model produces for them.
//!
//! ## Feature layout
//! Each site carries a `WINDOW x N_BASES x N_CHANNELS` count matrix, stored
//! position-major:
//! ```text
//! index = (position * N_BASES + base) * N_CHANNELS + channel
//! ```
//! The anchor sits at `position == FLANK`.

use std::fmt;

use crate::error::{JudgeError, Result};

/// Reference bases on each side of the anchor
pub const FLANK: usize = 16;

/// Positions covered by one feature matrix
pub const WINDOW: usize = 2 * FLANK + 1;

pub const N_BASES: usize = 4;
pub const N_CHANNELS: usize = 4;

/// Values per site in a serialized tensor
pub const FEATURES_PER_SITE: usize = WINDOW * N_BASES * N_CHANNELS;

/// Sites per inference invocation
pub const PREDICT_BATCH_SIZE: usize = 2000;

pub const BASES: [char; N_BASES] = ['A', 'C', 'G', 'T'];

/// Read-evidence channel of the feature matrix
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum Channel {
    Reference = 0,
    Insertion = 1,
    Deletion = 2,
    Substitution = 3,
}

/// Genomic tag of one tensor: contig, anchor position and the reference
/// sequence spanning the whole window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SiteTag {
    pub contig: String,
    pub position: u64,
    pub ref_seq: String,
}

impl SiteTag {
    /// Reference base at an offset into the window
    pub fn ref_base(&self, offset: usize) -> char {
        self.ref_seq
            .as_bytes()
            .get(offset)
            .map(|&b| b as char)
            .unwrap_or('N')
    }

    /// Reference span `[start, end)` clamped to the window
    pub fn ref_span(&self, start: usize, end: usize) -> &str {
        let end = end.min(self.ref_seq.len());
        let start = start.min(end);
        &self.ref_seq[start..end]
    }
}

impl fmt::Display for SiteTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.contig, self.position, self.ref_seq)
    }
}

/// Per-site read-evidence counts
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureMatrix {
    values: Vec<f32>,
}

impl FeatureMatrix {
    pub fn new(values: Vec<f32>) -> Result<Self> {
        if values.len() != FEATURES_PER_SITE {
            return Err(JudgeError::consistency(format!(
                "feature matrix has {} values, expected {}",
                values.len(),
                FEATURES_PER_SITE
            )));
        }
        Ok(Self { values })
    }

    pub fn zeros() -> Self {
        Self {
            values: vec![0.0; FEATURES_PER_SITE],
        }
    }

    #[inline]
    fn index(position: usize, base: usize, channel: Channel) -> usize {
        (position * N_BASES + base) * N_CHANNELS + channel as usize
    }

    #[inline]
    pub fn get(&self, position: usize, base: usize, channel: Channel) -> f32 {
        self.values[Self::index(position, base, channel)]
    }

    pub fn set(&mut self, position: usize, base: usize, channel: Channel, value: f32) {
        self.values[Self::index(position, base, channel)] = value;
    }

    /// Sum over bases of one channel at a window position
    pub fn channel_sum(&self, position: usize, channel: Channel) -> f32 {
        (0..N_BASES).map(|b| self.get(position, b, channel)).sum()
    }

    /// Base with the most evidence in one channel (first index wins ties)
    pub fn top_base(&self, position: usize, channel: Channel) -> char {
        let mut best = 0;
        for b in 1..N_BASES {
            if self.get(position, b, channel) > self.get(position, best, channel) {
                best = b;
            }
        }
        BASES[best]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }
}

/// One tensor: where it is and what the reads say
#[derive(Clone, Debug, PartialEq)]
pub struct TensorSite {
    pub tag: SiteTag,
    pub features: FeatureMatrix,
}

/// A chunk of sites submitted to one inference invocation
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TensorBatch {
    pub sites: Vec<TensorSite>,
}

impl TensorBatch {
    pub fn new(sites: Vec<TensorSite>) -> Self {
        Self { sites }
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

/// Model output for one site: four probability distributions.
///
/// ```text
/// base        A   C   G   T
/// zygosity    HET HOM
/// var_type    REF SNP INS DEL
/// length      0   1   2   3   4   4+
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct SiteOutput {
    pub base: [f32; 4],
    pub zygosity: [f32; 2],
    pub var_type: [f32; 4],
    pub length: [f32; 6],
}

/// Largest length bucket ("4+")
pub const MAX_LENGTH_BUCKET: usize = 5;
