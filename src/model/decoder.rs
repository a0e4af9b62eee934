//! # Tensor Decoder
//!
//! Turns one batch of model output distributions into VCF-ready variant
//! calls. Pure: the same batch and outputs always decode to the same calls,
//! and sites are independent of each other (decoded in parallel with rayon).
//!
//! ## Genotype quality
//! ```text
//! GQ = trunc(-4.343 * ln((p2_type * p2_zyg * p2_len + eps) /
//!                        (p1_type * p1_zyg * p1_len + eps)))
//! ```
//! where `p1`/`p2` are the largest and second-largest probabilities of each
//! distribution. No upper clamp.
//!
//! ## Indel length inference
//! For the "4+" length bucket the allele is extended one window position at a
//! time past the anchor while indel evidence stays at or above
//! `MIN_INDEL_AF` of the reference evidence. The first four positions are
//! always taken. Reaching `FLANK` positions yields a symbolic allele.

use std::fmt;

use rayon::prelude::*;

use crate::data::record::Genotype;
use crate::data::tensor::{
    Channel, SiteOutput, TensorBatch, TensorSite, BASES, FLANK, MAX_LENGTH_BUCKET,
};
use crate::error::{JudgeError, Result};

/// Minimum indel/reference evidence ratio to keep extending an indel
pub const MIN_INDEL_AF: f32 = 0.125;

/// Guards the quality ratio against zero probabilities
const QUAL_EPSILON: f64 = 1e-300;

/// Positions always taken when extending a "4+" indel
const GUARANTEED_EXTENSION: usize = MAX_LENGTH_BUCKET - 1;

/// Variant type head of the model
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VariantType {
    Ref,
    Snp,
    Insertion,
    Deletion,
}

impl VariantType {
    fn from_index(idx: usize) -> Self {
        match idx {
            0 => VariantType::Ref,
            1 => VariantType::Snp,
            2 => VariantType::Insertion,
            _ => VariantType::Deletion,
        }
    }
}

/// One decoded call, ready for serialization as a VCF data line
#[derive(Clone, Debug, PartialEq)]
pub struct VariantCall {
    pub contig: String,
    /// 1-based position
    pub position: u64,
    pub ref_allele: String,
    pub alt_allele: String,
    pub quality: i64,
    pub info: Vec<String>,
    pub genotype: Genotype,
    pub depth: u64,
    pub var_type: VariantType,
}

impl fmt::Display for VariantCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let info = if self.info.is_empty() {
            ".".to_string()
        } else {
            self.info.join(";")
        };
        write!(
            f,
            "{}\t{}\t.\t{}\t{}\t{}\t.\t{}\tGT:GQ:DP\t{}:{}:{}",
            self.contig,
            self.position,
            self.ref_allele,
            self.alt_allele,
            self.quality,
            info,
            self.genotype,
            self.quality,
            self.depth
        )
    }
}

/// Index of the largest value (first wins ties) plus the two largest values
fn top_two(probs: &[f32]) -> (usize, f64, f64) {
    let mut order: Vec<usize> = (0..probs.len()).collect();
    order.sort_by(|&a, &b| probs[b].total_cmp(&probs[a]));
    let p1 = probs[order[0]] as f64;
    let p2 = order.get(1).map(|&i| probs[i] as f64).unwrap_or(0.0);
    (order[0], p1, p2)
}

/// Genotype quality from the type, zygosity and length heads
pub fn genotype_quality(output: &SiteOutput) -> i64 {
    let (_, t1, t2) = top_two(&output.var_type);
    let (_, z1, z2) = top_two(&output.zygosity);
    let (_, l1, l2) = top_two(&output.length);
    let ratio = (t2 * z2 * l2 + QUAL_EPSILON) / (t1 * z1 * l1 + QUAL_EPSILON);
    (-4.343 * ratio.ln()) as i64
}

/// Extend an indel through the window while `channel` evidence holds up.
///
/// Returns the number of positions taken and, for insertions, the inserted
/// bases.
fn extend_indel(site: &TensorSite, channel: Channel) -> (usize, String) {
    let m = &site.features;
    let mut length = 0;
    let mut bases = String::new();
    for k in (FLANK + 1)..=(2 * FLANK) {
        let guaranteed = k <= FLANK + GUARANTEED_EXTENSION;
        let evidence = m.channel_sum(k, channel);
        let reference = m.channel_sum(k, Channel::Reference);
        if guaranteed || evidence >= MIN_INDEL_AF * reference {
            length += 1;
            bases.push(m.top_base(k, channel));
        } else {
            break;
        }
    }
    (length, bases)
}

/// Decode a single site
pub fn decode_site(site: &TensorSite, output: &SiteOutput) -> VariantCall {
    let (type_idx, _, _) = top_two(&output.var_type);
    let (zyg_idx, _, _) = top_two(&output.zygosity);
    let (mut length_bucket, _, _) = top_two(&output.length);
    let var_type = VariantType::from_index(type_idx);
    let quality = genotype_quality(output);

    let tag = &site.tag;
    let m = &site.features;
    let anchor = tag.ref_base(FLANK);
    let mut info = Vec::new();
    let mut inferred = 0usize;

    let (ref_allele, alt_allele, depth) = match var_type {
        VariantType::Ref | VariantType::Snp => {
            let depth = m.channel_sum(FLANK, Channel::Reference)
                + m.channel_sum(FLANK, Channel::Substitution);
            let alt = if var_type == VariantType::Snp {
                let mut order: Vec<usize> = (0..BASES.len()).collect();
                order.sort_by(|&a, &b| output.base[b].total_cmp(&output.base[a]));
                let best = BASES[order[0]];
                if best != anchor {
                    best
                } else {
                    BASES[order[1]]
                }
            } else {
                anchor
            };
            (anchor.to_string(), alt.to_string(), depth)
        }
        VariantType::Insertion => {
            if length_bucket == 0 {
                length_bucket = 1;
            }
            let depth = m.channel_sum(FLANK + 1, Channel::Reference)
                + m.channel_sum(FLANK + 1, Channel::Insertion);
            let inserted = if length_bucket != MAX_LENGTH_BUCKET {
                ((FLANK + 1)..=(FLANK + length_bucket))
                    .map(|k| m.top_base(k, Channel::Insertion))
                    .collect::<String>()
            } else {
                let (length, bases) = extend_indel(site, Channel::Insertion);
                inferred = length;
                bases
            };
            let alt = if inferred >= FLANK {
                info.push("SVTYPE=INS".to_string());
                "<INS>".to_string()
            } else {
                format!("{}{}", anchor, inserted)
            };
            (anchor.to_string(), alt, depth)
        }
        VariantType::Deletion => {
            if length_bucket == 0 {
                length_bucket = 1;
            }
            let depth = m.channel_sum(FLANK + 1, Channel::Reference)
                + m.channel_sum(FLANK + 1, Channel::Deletion);
            if length_bucket == MAX_LENGTH_BUCKET {
                inferred = extend_indel(site, Channel::Deletion).0;
            }
            if inferred >= FLANK {
                info.push("SVTYPE=DEL".to_string());
                (anchor.to_string(), "<DEL>".to_string(), depth)
            } else {
                let span = if length_bucket != MAX_LENGTH_BUCKET {
                    length_bucket
                } else {
                    inferred
                };
                let deleted = tag.ref_span(FLANK, FLANK + span + 1).to_string();
                (deleted, anchor.to_string(), depth)
            }
        }
    };

    if inferred > 0 && inferred < FLANK {
        info.push(format!("LENGUESS={}", inferred));
    }

    let genotype = match (var_type, zyg_idx) {
        (VariantType::Ref, _) => Genotype::new(0, 0),
        (_, 0) => Genotype::new(0, 1),
        _ => Genotype::new(1, 1),
    };

    VariantCall {
        contig: tag.contig.clone(),
        position: tag.position,
        ref_allele,
        alt_allele,
        quality,
        info,
        genotype,
        depth: depth.max(0.0) as u64,
        var_type,
    }
}

/// Decode every site of a batch, in order.
///
/// The number of outputs must equal the number of sites; anything else is
/// an internal consistency fault.
pub fn decode_batch(batch: &TensorBatch, outputs: &[SiteOutput]) -> Result<Vec<VariantCall>> {
    if batch.len() != outputs.len() {
        return Err(JudgeError::consistency(format!(
            "inconsistent shape between input tensor and output predictions {}/{}",
            batch.len(),
            outputs.len()
        )));
    }
    Ok(batch
        .sites
        .par_iter()
        .zip(outputs.par_iter())
        .map(|(site, output)| decode_site(site, output))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::tensor::{FeatureMatrix, SiteTag, WINDOW};

    fn ref_seq() -> String {
        // anchor (index 16) is 'A'
        "CCCCCCCCCCCCCCCCAGTCAGTCAGTCAGTCA".to_string()
    }

    fn site(features: FeatureMatrix) -> TensorSite {
        let seq = ref_seq();
        assert_eq!(seq.len(), WINDOW);
        TensorSite {
            tag: SiteTag {
                contig: "chr1".into(),
                position: 1000,
                ref_seq: seq,
            },
            features,
        }
    }

    fn output(var_type: usize, zyg: usize, length: usize) -> SiteOutput {
        let mut out = SiteOutput {
            base: [0.1, 0.1, 0.7, 0.1],
            zygosity: [0.2, 0.2],
            var_type: [0.05; 4],
            length: [0.02; 6],
        };
        out.zygosity[zyg] = 0.8;
        out.var_type[var_type] = 0.85;
        out.length[length] = 0.9;
        out
    }

    #[test]
    fn test_ref_call() {
        let mut m = FeatureMatrix::zeros();
        m.set(FLANK, 0, Channel::Reference, 20.0);
        m.set(FLANK, 2, Channel::Substitution, 3.0);
        let call = decode_site(&site(m), &output(0, 1, 0));
        assert_eq!(call.var_type, VariantType::Ref);
        assert_eq!(call.ref_allele, "A");
        assert_eq!(call.alt_allele, call.ref_allele);
        assert_eq!(call.genotype.to_string(), "0/0");
        assert_eq!(call.depth, 23);
        assert!(call.info.is_empty());
    }

    #[test]
    fn test_snp_uses_second_base_when_top_is_reference() {
        let mut out = output(1, 0, 0);
        out.base = [0.6, 0.1, 0.25, 0.05];
        let call = decode_site(&site(FeatureMatrix::zeros()), &out);
        assert_eq!(call.alt_allele, "G");
        assert_eq!(call.genotype.to_string(), "0/1");

        let hom = decode_site(&site(FeatureMatrix::zeros()), &output(1, 1, 0));
        assert_eq!(hom.alt_allele, "G");
        assert_eq!(hom.genotype.to_string(), "1/1");
    }

    #[test]
    fn test_short_insertion_reads_bases_from_features() {
        let mut m = FeatureMatrix::zeros();
        m.set(FLANK + 1, 3, Channel::Insertion, 5.0);
        m.set(FLANK + 2, 1, Channel::Insertion, 5.0);
        m.set(FLANK + 1, 0, Channel::Reference, 10.0);
        let call = decode_site(&site(m), &output(2, 0, 2));
        assert_eq!(call.ref_allele, "A");
        assert_eq!(call.alt_allele, "ATC");
        assert_eq!(call.depth, 15);
        assert!(call.info.is_empty());
    }

    #[test]
    fn test_zero_length_bucket_is_length_one() {
        let call = decode_site(&site(FeatureMatrix::zeros()), &output(2, 0, 0));
        assert_eq!(call.alt_allele.len(), 2);
        let del = decode_site(&site(FeatureMatrix::zeros()), &output(3, 0, 0));
        assert_eq!(del.ref_allele, "AG");
        assert_eq!(del.alt_allele, "A");
    }

    #[test]
    fn test_long_insertion_stops_when_evidence_drops() {
        let mut m = FeatureMatrix::zeros();
        // strong insertion evidence for 6 positions, then reference only
        for k in (FLANK + 1)..=(FLANK + 6) {
            m.set(k, 1, Channel::Insertion, 4.0);
            m.set(k, 0, Channel::Reference, 10.0);
        }
        for k in (FLANK + 7)..=(2 * FLANK) {
            m.set(k, 0, Channel::Reference, 10.0);
        }
        let call = decode_site(&site(m), &output(2, 1, MAX_LENGTH_BUCKET));
        assert_eq!(call.alt_allele, "ACCCCCC");
        assert_eq!(call.info, vec!["LENGUESS=6".to_string()]);
    }

    #[test]
    fn test_guaranteed_positions_taken_without_evidence() {
        let call = decode_site(&site(FeatureMatrix::zeros()), &output(3, 0, MAX_LENGTH_BUCKET));
        // zero evidence still satisfies 0 >= 0.125 * 0, so it extends to the window
        assert_eq!(call.alt_allele, "<DEL>");

        let mut m = FeatureMatrix::zeros();
        for k in (FLANK + 1)..=(2 * FLANK) {
            m.set(k, 0, Channel::Reference, 10.0);
        }
        let call = decode_site(&site(m), &output(3, 0, MAX_LENGTH_BUCKET));
        assert_eq!(call.ref_allele, "AGTCA");
        assert_eq!(call.alt_allele, "A");
        assert_eq!(call.info, vec!["LENGUESS=4".to_string()]);
    }

    #[test]
    fn test_window_length_indels_are_symbolic() {
        let mut m = FeatureMatrix::zeros();
        for k in (FLANK + 1)..=(2 * FLANK) {
            m.set(k, 0, Channel::Reference, 8.0);
            m.set(k, 2, Channel::Insertion, 1.0);
            m.set(k, 2, Channel::Deletion, 1.0);
        }
        let ins = decode_site(&site(m.clone()), &output(2, 0, MAX_LENGTH_BUCKET));
        assert_eq!(ins.alt_allele, "<INS>");
        assert_eq!(ins.info, vec!["SVTYPE=INS".to_string()]);

        let del = decode_site(&site(m), &output(3, 1, MAX_LENGTH_BUCKET));
        assert_eq!(del.ref_allele, "A");
        assert_eq!(del.alt_allele, "<DEL>");
        assert_eq!(del.info, vec!["SVTYPE=DEL".to_string()]);
        assert_eq!(del.genotype.to_string(), "1/1");
    }

    #[test]
    fn test_quality_formula() {
        let out = output(1, 0, 0);
        let expected = (-4.343
            * (((0.05f32 as f64) * (0.2f32 as f64) * (0.02f32 as f64) + 1e-300)
                / ((0.85f32 as f64) * (0.8f32 as f64) * (0.9f32 as f64) + 1e-300))
                .ln()) as i64;
        assert_eq!(genotype_quality(&out), expected);
        assert!(expected > 0);
    }

    #[test]
    fn test_quality_is_not_clamped() {
        let out = SiteOutput {
            base: [1.0, 0.0, 0.0, 0.0],
            zygosity: [1.0, 0.0],
            var_type: [1.0, 0.0, 0.0, 0.0],
            length: [1.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        };
        assert!(genotype_quality(&out) > 999);
    }

    #[test]
    fn test_call_line_format() {
        let call = decode_site(&site(FeatureMatrix::zeros()), &output(1, 1, 0));
        let line = call.to_string();
        let cols: Vec<&str> = line.split('\t').collect();
        assert_eq!(cols.len(), 10);
        assert_eq!(cols[0], "chr1");
        assert_eq!(cols[1], "1000");
        assert_eq!(cols[7], ".");
        assert_eq!(cols[8], "GT:GQ:DP");
        assert_eq!(cols[9], format!("1/1:{}:0", call.quality));
    }

    #[test]
    fn test_decode_batch_checks_counts() {
        let batch = TensorBatch::new(vec![site(FeatureMatrix::zeros())]);
        let err = decode_batch(&batch, &[]).unwrap_err();
        assert!(matches!(err, JudgeError::Consistency { .. }));
        assert_eq!(decode_batch(&batch, &[output(0, 0, 0)]).unwrap().len(), 1);
    }

    fn random_batch(n: usize, seed: u64) -> (TensorBatch, Vec<SiteOutput>) {
        use rand::{Rng, SeedableRng};
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let mut sites = Vec::with_capacity(n);
        let mut outputs = Vec::with_capacity(n);
        for _ in 0..n {
            let mut m = FeatureMatrix::zeros();
            for pos in 0..WINDOW {
                for base in 0..4 {
                    for ch in [
                        Channel::Reference,
                        Channel::Insertion,
                        Channel::Deletion,
                        Channel::Substitution,
                    ] {
                        m.set(pos, base, ch, rng.gen_range(0.0..30.0));
                    }
                }
            }
            sites.push(site(m));
            let mut out = output(rng.gen_range(0..4), rng.gen_range(0..2), rng.gen_range(0..6));
            for p in out.base.iter_mut() {
                *p = rng.gen_range(0.0..1.0);
            }
            outputs.push(out);
        }
        (TensorBatch::new(sites), outputs)
    }

    #[test]
    fn test_decoding_is_deterministic() {
        let (batch, outputs) = random_batch(200, 7);
        let first = decode_batch(&batch, &outputs).unwrap();
        let second = decode_batch(&batch, &outputs).unwrap();
        assert_eq!(first, second);
        for (call, site) in first.iter().zip(&batch.sites) {
            assert_eq!(call.position, site.tag.position);
        }
    }

    #[test]
    fn test_random_ref_calls_keep_reference_allele() {
        let (batch, outputs) = random_batch(200, 11);
        let calls = decode_batch(&batch, &outputs).unwrap();
        for call in calls.iter().filter(|c| c.var_type == VariantType::Ref) {
            assert_eq!(call.alt_allele, call.ref_allele);
            assert_eq!(call.genotype, Genotype::new(0, 0));
        }
        for call in calls
            .iter()
            .filter(|c| c.alt_allele == "<INS>" || c.alt_allele == "<DEL>")
        {
            assert!(call.info.iter().any(|t| t.starts_with("SVTYPE=")));
        }
    }
}
