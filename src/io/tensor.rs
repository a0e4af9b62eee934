//! # Tensor Text Reader
//!
//! Reads the tensor builder's text output and groups it into fixed-size
//! batches for the inference scheduler. One site per line:
//! ```text
//! <contig> <pos> <refseq> <v0> <v1> ... <v527>
//! ```
//! `refseq` spans the whole window; the values are the feature matrix in
//! position-major order (see [`crate::data::tensor`]).

use std::io::BufRead;

use crate::data::tensor::{
    FeatureMatrix, SiteTag, TensorBatch, TensorSite, FEATURES_PER_SITE, PREDICT_BATCH_SIZE,
};
use crate::error::{JudgeError, Result};
use crate::model::scheduler::BatchSource;

pub struct TensorReader<R: BufRead> {
    reader: R,
    batch_size: usize,
    line_no: usize,
    buf: String,
}

impl<R: BufRead> TensorReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_batch_size(reader, PREDICT_BATCH_SIZE)
    }

    pub fn with_batch_size(reader: R, batch_size: usize) -> Self {
        Self {
            reader,
            batch_size: batch_size.max(1),
            line_no: 0,
            buf: String::new(),
        }
    }

    fn parse_site(&self, line: &str) -> Result<TensorSite> {
        let mut fields = line.split_whitespace();
        let mut next = |what: &str| {
            fields
                .next()
                .ok_or_else(|| JudgeError::parse(self.line_no, format!("missing {}", what)))
        };
        let contig = next("contig")?.to_string();
        let pos_str = next("position")?;
        let position = pos_str.parse::<u64>().map_err(|_| {
            JudgeError::parse(self.line_no, format!("invalid position '{}'", pos_str))
        })?;
        let ref_seq = next("reference sequence")?.to_string();
        if let Some(bad) = ref_seq.chars().find(|c| !matches!(c, 'A' | 'C' | 'G' | 'T' | 'N')) {
            return Err(JudgeError::parse(
                self.line_no,
                format!("invalid reference base '{}' in '{}'", bad, ref_seq),
            ));
        }

        let values = fields
            .map(|v| {
                v.parse::<f32>().map_err(|_| {
                    JudgeError::parse(self.line_no, format!("invalid feature value '{}'", v))
                })
            })
            .collect::<Result<Vec<f32>>>()?;
        if values.len() != FEATURES_PER_SITE {
            return Err(JudgeError::parse(
                self.line_no,
                format!(
                    "expected {} feature values, found {}",
                    FEATURES_PER_SITE,
                    values.len()
                ),
            ));
        }

        Ok(TensorSite {
            tag: SiteTag {
                contig,
                position,
                ref_seq,
            },
            features: FeatureMatrix::new(values)?,
        })
    }
}

impl<R: BufRead> BatchSource for TensorReader<R> {
    fn next_batch(&mut self) -> Result<Option<TensorBatch>> {
        let mut sites = Vec::with_capacity(self.batch_size);
        while sites.len() < self.batch_size {
            self.buf.clear();
            if self.reader.read_line(&mut self.buf)? == 0 {
                break;
            }
            self.line_no += 1;
            let line = self.buf.trim();
            if line.is_empty() {
                continue;
            }
            let site = self.parse_site(line)?;
            sites.push(site);
        }
        if sites.is_empty() {
            Ok(None)
        } else {
            Ok(Some(TensorBatch::new(sites)))
        }
    }
}
