//! # Precomputed Predictions
//!
//! A [`Predictor`] backed by a text file of model outputs, one site per line
//! and in the same order as the tensor stream:
//! ```text
//! <contig> <pos> <b0..b3> <z0 z1> <t0..t3> <l0..l5>
//! ```
//! Each line is checked against the tensor site it is paired with.

use std::io::BufRead;
use std::sync::Mutex;

use crate::data::tensor::{SiteOutput, TensorBatch};
use crate::error::{JudgeError, Result};
use crate::model::scheduler::Predictor;

/// Probabilities per line: base, zygosity, type and length heads
pub const OUTPUT_WIDTH: usize = 4 + 2 + 4 + 6;

struct Cursor<R> {
    reader: R,
    line_no: usize,
    buf: String,
}

pub struct PredictionReader<R: BufRead + Send> {
    inner: Mutex<Cursor<R>>,
}

impl<R: BufRead + Send> PredictionReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: Mutex::new(Cursor {
                reader,
                line_no: 0,
                buf: String::new(),
            }),
        }
    }
}

fn parse_output(line: &str, line_no: usize) -> Result<(String, u64, SiteOutput)> {
    let mut fields = line.split_whitespace();
    let contig = fields
        .next()
        .ok_or_else(|| JudgeError::parse(line_no, "missing contig"))?
        .to_string();
    let pos_str = fields
        .next()
        .ok_or_else(|| JudgeError::parse(line_no, "missing position"))?;
    let position = pos_str
        .parse::<u64>()
        .map_err(|_| JudgeError::parse(line_no, format!("invalid position '{}'", pos_str)))?;
    let p = fields
        .map(|v| {
            v.parse::<f32>()
                .map_err(|_| JudgeError::parse(line_no, format!("invalid probability '{}'", v)))
        })
        .collect::<Result<Vec<f32>>>()?;
    if p.len() != OUTPUT_WIDTH {
        return Err(JudgeError::parse(
            line_no,
            format!("expected {} probabilities, found {}", OUTPUT_WIDTH, p.len()),
        ));
    }

    let output = SiteOutput {
        base: [p[0], p[1], p[2], p[3]],
        zygosity: [p[4], p[5]],
        var_type: [p[6], p[7], p[8], p[9]],
        length: [p[10], p[11], p[12], p[13], p[14], p[15]],
    };
    Ok((contig, position, output))
}

impl<R: BufRead + Send> Predictor for PredictionReader<R> {
    fn predict(&self, batch: &TensorBatch) -> Result<Vec<SiteOutput>> {
        let mut cursor = self
            .inner
            .lock()
            .map_err(|_| JudgeError::consistency("prediction reader poisoned"))?;
        let Cursor {
            reader,
            line_no,
            buf,
        } = &mut *cursor;

        let mut outputs = Vec::with_capacity(batch.len());
        for site in &batch.sites {
            loop {
                buf.clear();
                if reader.read_line(buf)? == 0 {
                    return Err(JudgeError::consistency(format!(
                        "predictions ended before site {}:{}",
                        site.tag.contig, site.tag.position
                    )));
                }
                *line_no += 1;
                if !buf.trim().is_empty() {
                    break;
                }
            }
            let (contig, position, output) = parse_output(buf.trim(), *line_no)?;
            if contig != site.tag.contig || position != site.tag.position {
                return Err(JudgeError::consistency(format!(
                    "prediction for {}:{} paired with site {}:{}",
                    contig, position, site.tag.contig, site.tag.position
                )));
            }
            outputs.push(output);
        }
        Ok(outputs)
    }
}
