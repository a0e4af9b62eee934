//! # Contig Partitioner
//!
//! Splits a sorted VCF stream into runs of consecutive records on the same
//! contig, then drives one pipeline run per accepted contig, strictly in file
//! order. Header lines are kept aside for echo-back and never enter a group.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, info_span};

use crate::error::{JudgeError, Result};
use crate::io::vcf::{contig_of, VcfLine, VcfLineReader};

/// Consecutive records of one contig, in file order
#[derive(Clone, Debug)]
pub struct ContigGroup {
    pub contig: String,
    pub lines: Arc<[String]>,
    /// Source line number of each entry in `lines`
    pub line_nos: Vec<usize>,
}

impl ContigGroup {
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Headers plus contig groups of a whole VCF
#[derive(Clone, Debug, Default)]
pub struct PartitionedVcf {
    pub headers: Vec<String>,
    pub groups: Vec<ContigGroup>,
}

impl PartitionedVcf {
    pub fn n_records(&self) -> usize {
        self.groups.iter().map(ContigGroup::len).sum()
    }
}

/// Output of one accepted contig's pipeline run
#[derive(Clone, Debug)]
pub struct ContigOutput {
    /// Index into [`PartitionedVcf::groups`]
    pub group: usize,
    pub lines: Vec<String>,
}

type OpenGroup = (String, Vec<String>, Vec<usize>);

fn close(group: Option<OpenGroup>, out: &mut PartitionedVcf) {
    if let Some((contig, lines, line_nos)) = group {
        out.groups.push(ContigGroup {
            contig,
            lines: lines.into(),
            line_nos,
        });
    }
}

/// Read and group a whole VCF.
///
/// A contig whose records are split by another contig is rejected: each
/// contig must map to exactly one pipeline run.
pub fn partition(reader: &mut VcfLineReader) -> Result<PartitionedVcf> {
    let _span = info_span!("partition").entered();
    let mut out = PartitionedVcf::default();
    let mut seen: HashSet<String> = HashSet::new();
    let mut current: Option<OpenGroup> = None;

    while let Some(line) = reader.next_line()? {
        match line {
            VcfLine::Header(h) => out.headers.push(h),
            VcfLine::Record { line, line_no } => {
                let contig = contig_of(&line);
                let same = current.as_ref().is_some_and(|(c, _, _)| c == contig);
                if !same {
                    if !seen.insert(contig.to_string()) {
                        return Err(JudgeError::vcf(format!(
                            "records of contig {} are not contiguous (line {})",
                            contig, line_no
                        )));
                    }
                    close(current.take(), &mut out);
                    current = Some((contig.to_string(), Vec::new(), Vec::new()));
                }
                if let Some((_, lines, line_nos)) = current.as_mut() {
                    lines.push(line);
                    line_nos.push(line_no);
                }
            }
        }
    }
    close(current.take(), &mut out);

    info!(
        contigs = out.groups.len(),
        records = out.n_records(),
        headers = out.headers.len(),
        "partitioned input"
    );
    Ok(out)
}

/// Run `run_contig` once per accepted, non-empty group, sequentially.
///
/// Skipped contigs produce no output. The first failing run aborts.
pub fn drive_contigs<A, F>(
    partitioned: &PartitionedVcf,
    accept: A,
    mut run_contig: F,
) -> Result<Vec<ContigOutput>>
where
    A: Fn(&str) -> bool,
    F: FnMut(&ContigGroup) -> Result<Vec<String>>,
{
    let mut outputs = Vec::new();
    for (idx, group) in partitioned.groups.iter().enumerate() {
        if group.is_empty() {
            continue;
        }
        if !accept(&group.contig) {
            info!(contig = %group.contig, records = group.len(), "contig skipped");
            continue;
        }
        eprintln!("Working on contig: {}", group.contig);
        let _span = info_span!("contig", contig = %group.contig).entered();
        let lines = run_contig(group)?;
        info!(records = group.len(), calls = lines.len(), "contig done");
        outputs.push(ContigOutput { group: idx, lines });
    }
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader(text: &str) -> VcfLineReader {
        VcfLineReader::new(Box::new(Cursor::new(text.as_bytes().to_vec())))
    }

    const VCF: &str = "##fileformat=VCFv4.2\n\
                       #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n\
                       chr1\t10\t.\tA\tT\t.\t.\t.\n\
                       chr1\t20\t.\tA\tT\t.\t.\t.\n\
                       chrUn_gl1\t5\t.\tA\tT\t.\t.\t.\n\
                       chr2\t7\t.\tA\tT\t.\t.\t.\n";

    #[test]
    fn test_partition_groups_consecutive_records() {
        let parts = partition(&mut reader(VCF)).unwrap();
        assert_eq!(parts.headers.len(), 2);
        let contigs: Vec<&str> = parts.groups.iter().map(|g| g.contig.as_str()).collect();
        assert_eq!(contigs, vec!["chr1", "chrUn_gl1", "chr2"]);
        assert_eq!(parts.groups[0].len(), 2);
        assert_eq!(parts.groups[0].line_nos, vec![3, 4]);
        assert_eq!(parts.n_records(), 4);
    }

    #[test]
    fn test_partition_rejects_split_contig() {
        let text = "chr1\t1\t.\tA\tT\t.\t.\t.\nchr2\t1\t.\tA\tT\t.\t.\t.\nchr1\t2\t.\tA\tT\t.\t.\t.\n";
        let err = partition(&mut reader(text)).unwrap_err();
        assert!(err.to_string().contains("not contiguous"));
    }

    #[test]
    fn test_drive_skips_rejected_contigs_in_order() {
        let parts = partition(&mut reader(VCF)).unwrap();
        let mut visited = Vec::new();
        let outputs = drive_contigs(
            &parts,
            |c| !c.starts_with("chrUn"),
            |g| {
                visited.push(g.contig.clone());
                Ok(g.lines.iter().map(|l| format!("out {}", l)).collect())
            },
        )
        .unwrap();
        assert_eq!(visited, vec!["chr1", "chr2"]);
        assert_eq!(outputs.iter().map(|o| o.group).collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(outputs[0].lines.len(), 2);
    }

    #[test]
    fn test_drive_aborts_on_first_failure() {
        let parts = partition(&mut reader(VCF)).unwrap();
        let mut runs = 0;
        let err = drive_contigs(
            &parts,
            |_| true,
            |_| {
                runs += 1;
                Err(JudgeError::StageFailed {
                    stage: "tensor builder".into(),
                    status: "exit status: 2".into(),
                })
            },
        )
        .unwrap_err();
        assert_eq!(runs, 1);
        assert_eq!(err.stage_name(), Some("tensor builder"));
    }
}
