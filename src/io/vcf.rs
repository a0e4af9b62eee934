//! # VCF Text I/O
//!
//! Line-level VCF reading and writing. Header semantics are not interpreted:
//! header lines are collected verbatim and echoed to outputs.
//!
//! Inputs ending in `.gz`/`.bgz` are decompressed with a multi-member gzip
//! decoder (plain gzip and BGZF both work). Outputs ending in `.gz`/`.bgz` are
//! BGZF-compressed.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use noodles::bgzf;
use tracing::info_span;

use crate::data::verdict::VerdictKind;
use crate::error::{JudgeError, Result};

/// FILTER id written for rejected records
pub const FILTER_ID: &str = "VARJUDGE";

/// Header line declaring [`FILTER_ID`]
pub const FILTER_HEADER: &str = "##FILTER=<ID=VARJUDGE,Description=\"Rejected by neural validation\">";

fn is_gzipped(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "gz" || e == "bgz")
        .unwrap_or(false)
}

/// Open a (possibly compressed) text file for line reading
pub fn open_text(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => JudgeError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => JudgeError::Io(e),
    })?;

    let reader: Box<dyn BufRead + Send> = if is_gzipped(path) {
        Box::new(BufReader::new(MultiGzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };
    Ok(reader)
}

/// Create a (possibly BGZF-compressed) text file for writing
pub fn create_text(path: &Path) -> Result<Box<dyn Write + Send>> {
    let file = File::create(path)?;

    let writer: Box<dyn Write + Send> = if is_gzipped(path) {
        Box::new(BufWriter::new(bgzf::Writer::new(file)))
    } else {
        Box::new(BufWriter::new(file))
    };
    Ok(writer)
}

/// One line of a VCF stream, newline stripped
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VcfLine {
    Header(String),
    Record { line: String, line_no: usize },
}

/// Line reader that tells header lines from records
pub struct VcfLineReader {
    reader: Box<dyn BufRead + Send>,
    line_no: usize,
    buf: String,
}

impl VcfLineReader {
    pub fn open(path: &Path) -> Result<Self> {
        info_span!("vcf_open", path = ?path)
            .in_scope(|| -> Result<Self> { Ok(Self::new(open_text(path)?)) })
    }

    pub fn new(reader: Box<dyn BufRead + Send>) -> Self {
        Self {
            reader,
            line_no: 0,
            buf: String::new(),
        }
    }

    /// Next non-empty line, or `None` at end of input
    pub fn next_line(&mut self) -> Result<Option<VcfLine>> {
        loop {
            self.buf.clear();
            if self.reader.read_line(&mut self.buf)? == 0 {
                return Ok(None);
            }
            self.line_no += 1;
            let line = self.buf.trim_end_matches(['\n', '\r']);
            if line.trim().is_empty() {
                continue;
            }
            if line.starts_with('#') {
                return Ok(Some(VcfLine::Header(line.to_string())));
            }
            return Ok(Some(VcfLine::Record {
                line: line.to_string(),
                line_no: self.line_no,
            }));
        }
    }
}

/// Contig column of a data line
pub fn contig_of(line: &str) -> &str {
    line.split_whitespace().next().unwrap_or("")
}

/// Write header lines followed by data lines
pub fn write_lines<W: Write + ?Sized>(
    writer: &mut W,
    headers: &[String],
    records: &[String],
) -> Result<()> {
    for line in headers.iter().chain(records.iter()) {
        writer.write_all(line.trim_end_matches(['\n', '\r']).as_bytes())?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Verdict lookup keyed by `(contig, position)`
pub type VerdictMap = HashMap<(String, u64), VerdictKind>;

/// Copy `input` to `output`, rewriting FILTER from the verdicts.
///
/// A FILTER definition is inserted just before the `#CHROM` line. Records
/// whose verdict rejects them get [`FILTER_ID`], all others get `PASS`.
pub fn write_annotated(input: &Path, verdicts: &VerdictMap, output: &Path) -> Result<usize> {
    let _span = info_span!("vcf_annotate", input = ?input, output = ?output).entered();
    let mut reader = VcfLineReader::open(input)?;
    let mut writer = create_text(output)?;
    let mut rejected = 0;

    while let Some(line) = reader.next_line()? {
        match line {
            VcfLine::Header(h) => {
                if h.starts_with("#CHROM") {
                    writeln!(writer, "{}", FILTER_HEADER)?;
                }
                writeln!(writer, "{}", h)?;
            }
            VcfLine::Record { line, line_no } => {
                let mut cols: Vec<&str> = line.split('\t').collect();
                if cols.len() < 8 {
                    return Err(JudgeError::parse(
                        line_no,
                        format!("expected at least 8 columns, found {}", cols.len()),
                    ));
                }
                let position = cols[1].parse::<u64>().map_err(|_| {
                    JudgeError::parse(line_no, format!("invalid position '{}'", cols[1]))
                })?;
                let reject = verdicts
                    .get(&(cols[0].to_string(), position))
                    .is_some_and(|k| k.is_rejected());
                if reject {
                    rejected += 1;
                }
                cols[6] = if reject { FILTER_ID } else { "PASS" };
                writeln!(writer, "{}", cols.join("\t"))?;
            }
        }
    }
    writer.flush()?;
    Ok(rejected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader(text: &str) -> VcfLineReader {
        VcfLineReader::new(Box::new(Cursor::new(text.as_bytes().to_vec())))
    }

    #[test]
    fn test_line_reader_splits_headers_and_records() {
        let mut r = reader("##fileformat=VCFv4.2\n#CHROM\tPOS\n\nchr1\t5\r\n");
        assert_eq!(
            r.next_line().unwrap(),
            Some(VcfLine::Header("##fileformat=VCFv4.2".into()))
        );
        assert_eq!(r.next_line().unwrap(), Some(VcfLine::Header("#CHROM\tPOS".into())));
        assert_eq!(
            r.next_line().unwrap(),
            Some(VcfLine::Record {
                line: "chr1\t5".into(),
                line_no: 4
            })
        );
        assert_eq!(r.next_line().unwrap(), None);
    }

    #[test]
    fn test_contig_of() {
        assert_eq!(contig_of("chrX\t10\t."), "chrX");
        assert_eq!(contig_of(""), "");
    }

    #[test]
    fn test_missing_input_is_file_not_found() {
        let err = match open_text(Path::new("/nonexistent/in.vcf")) {
            Err(e) => e,
            Ok(_) => panic!("expected error"),
        };
        assert!(matches!(err, JudgeError::FileNotFound { .. }));
    }

    #[test]
    fn test_write_annotated() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.vcf");
        let output = dir.path().join("out.vcf");
        std::fs::write(
            &input,
            "##fileformat=VCFv4.2\n#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n\
             chr1\t10\t.\tA\tT\t.\tLowQual\t.\n\
             chr1\t20\t.\tA\tT\t.\t.\t.\n\
             chr1\t30\t.\tA\tT\t.\t.\t.\n\
             chrUn\t5\t.\tA\tT\t.\t.\t.\n",
        )
        .unwrap();
        let mut verdicts = VerdictMap::new();
        verdicts.insert(("chr1".into(), 10), VerdictKind::Match);
        verdicts.insert(("chr1".into(), 20), VerdictKind::Mismatch);
        verdicts.insert(("chr1".into(), 30), VerdictKind::Spurious);

        let rejected = write_annotated(&input, &verdicts, &output).unwrap();
        assert_eq!(rejected, 2);

        let text = std::fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[1], FILTER_HEADER);
        assert!(lines[2].starts_with("#CHROM"));
        let filters: Vec<&str> = lines[3..]
            .iter()
            .map(|l| l.split('\t').nth(6).unwrap())
            .collect();
        assert_eq!(filters, vec!["PASS", FILTER_ID, FILTER_ID, "PASS"]);
    }

    #[test]
    fn test_gzip_roundtrip_through_bgzf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calls.vcf.gz");
        {
            let mut w = create_text(&path).unwrap();
            write_lines(&mut w, &["#CHROM".to_string()], &["chr1\t1".to_string()]).unwrap();
        }
        let mut r = VcfLineReader::open(&path).unwrap();
        assert_eq!(r.next_line().unwrap(), Some(VcfLine::Header("#CHROM".into())));
        assert!(matches!(r.next_line().unwrap(), Some(VcfLine::Record { .. })));
        assert_eq!(r.next_line().unwrap(), None);
    }
}
