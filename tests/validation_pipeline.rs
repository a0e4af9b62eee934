//! End-to-end runs of the `validate` and `annotate` flows with small shell
//! scripts standing in for the three external stages.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::Parser;
use tempfile::TempDir;

use varjudge::config::{Cli, Command, Config};
use varjudge::io::vcf::FILTER_ID;
use varjudge::pipelines::stages::TENSOR_STAGE;
use varjudge::{AnnotatePipeline, JudgeError, ValidationPipeline};

const INPUT_VCF: &str = "##fileformat=VCFv4.2\n\
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tSAMPLE\n\
chr1\t100\t.\tA\tT\t50\tPASS\t.\tGT\t0/1\n\
chr1\t150\t.\tC\tG\t50\tPASS\t.\tGT\t0/0\n\
chr1\t200\t.\tG\tA,C\t50\tPASS\t.\tGT\t1/2\n\
chrUn_gl000220\t5\t.\tA\tT\t50\tPASS\t.\tGT\t0/1\n\
chr2\t10\t.\tT\tC\t50\tPASS\t.\tGT\t1|0\n";

/// Model stage: a het call for every site except position 200
const CALL_SCRIPT: &str = "#!/bin/sh\n\
awk -v OFS='\\t' '$2 != 200 { print $1, $2, \".\", $4, $5, \"33\", \".\", \".\", \"GT:GQ:DP\", \"0/1:33:20\" }'\n";

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new(truth: &str, tensor: &str, call: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("in.vcf"), INPUT_VCF).unwrap();
        fs::write(dir.path().join("sample.bam"), "").unwrap();
        fs::write(dir.path().join("ref.fa"), "").unwrap();
        fs::write(dir.path().join("model.meta"), "").unwrap();
        let fixture = Self { dir };
        fixture.script("truth.sh", truth);
        fixture.script("tensor.sh", tensor);
        fixture.script("call.sh", call);
        fixture
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn script(&self, name: &str, body: &str) {
        let path = self.path(name);
        fs::write(&path, body).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn config(&self, extra: &[&str]) -> Config {
        let p = |name: &str| self.path(name).to_str().unwrap().to_string();
        let mut args: Vec<String> = vec!["varjudge".into(), "validate".into()];
        for (flag, value) in [
            ("--vcf", p("in.vcf")),
            ("--bam", p("sample.bam")),
            ("--reference", p("ref.fa")),
            ("--checkpoint", p("model")),
            ("--report", p("report.txt")),
            ("--truth-bin", p("truth.sh")),
            ("--tensor-bin", p("tensor.sh")),
            ("--call-bin", p("call.sh")),
            ("--samtools", "sh".to_string()),
            ("--poll-ms", "50".to_string()),
        ] {
            args.push(flag.to_string());
            args.push(value);
        }
        args.extend(extra.iter().map(|s| s.to_string()));

        match Cli::try_parse_from(args).unwrap().command {
            Command::Validate(config) => {
                config.validate().unwrap();
                config
            }
            _ => unreachable!(),
        }
    }
}

fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

fn filters(path: &Path) -> Vec<(String, String)> {
    read_lines(path)
        .iter()
        .filter(|l| !l.starts_with('#'))
        .map(|l| {
            let cols: Vec<&str> = l.split('\t').collect();
            (format!("{}:{}", cols[0], cols[1]), cols[6].to_string())
        })
        .collect()
}

#[test]
fn test_validate_writes_report_and_outputs() {
    let fx = Fixture::new("#!/bin/sh\nexec cat\n", "#!/bin/sh\nexec cat\n", CALL_SCRIPT);
    let calls = fx.path("calls.vcf");
    let annotated = fx.path("judged.vcf");
    let config = fx.config(&[
        "--calls-vcf",
        calls.to_str().unwrap(),
        "--annotated-vcf",
        annotated.to_str().unwrap(),
    ]);

    let summary = ValidationPipeline::new(config, None).run().unwrap();
    assert_eq!(summary.contigs_run, 2);
    assert_eq!(summary.contigs_skipped, 1);
    assert_eq!(summary.model_calls, 3);
    assert_eq!(summary.tally.matched, 2);
    assert_eq!(summary.tally.mismatched, 1);
    assert_eq!(summary.tally.multiallelic, 1);
    assert_eq!(summary.rejected, Some(1));

    assert_eq!(
        read_lines(&fx.path("report.txt")),
        vec![
            "M\t33\tchr1\t100\tA\tT\t0/1\tT\t0/1",
            "X\t33\tchr1\t150\tC\tG\t0/0\tG\t0/1",
            "B\t0\tchr1\t200\tG\tA,C\t1/2",
            "M\t33\tchr2\t10\tT\tC\t0/1\tC\t0/1",
        ]
    );

    let call_lines = read_lines(&calls);
    assert_eq!(call_lines.len(), 2 + 3);
    assert!(call_lines[0].starts_with("##fileformat"));
    assert!(call_lines[2].starts_with("chr1\t100\t"));

    assert_eq!(
        filters(&annotated),
        vec![
            ("chr1:100".to_string(), "PASS".to_string()),
            ("chr1:150".to_string(), FILTER_ID.to_string()),
            ("chr1:200".to_string(), "PASS".to_string()),
            ("chrUn_gl000220:5".to_string(), "PASS".to_string()),
            ("chr2:10".to_string(), "PASS".to_string()),
        ]
    );
}

#[test]
fn test_all_contigs_includes_noncanonical() {
    let fx = Fixture::new("#!/bin/sh\nexec cat\n", "#!/bin/sh\nexec cat\n", CALL_SCRIPT);
    let config = fx.config(&["--all-contigs"]);
    let summary = ValidationPipeline::new(config, None).run().unwrap();
    assert_eq!(summary.contigs_run, 3);
    assert_eq!(summary.contigs_skipped, 0);
    assert_eq!(summary.tally.total(), 5);
}

#[test]
fn test_stage_arguments_reach_the_scripts() {
    // truth stage fails unless it was given --ctgName
    let truth = "#!/bin/sh\n[ \"$1\" = \"--ctgName\" ] || exit 3\nexec cat\n";
    let fx = Fixture::new(truth, "#!/bin/sh\nexec cat\n", CALL_SCRIPT);
    let summary = ValidationPipeline::new(fx.config(&[]), None).run().unwrap();
    assert_eq!(summary.contigs_run, 2);
}

#[test]
fn test_failing_tensor_stage_aborts_run() {
    let fx = Fixture::new(
        "#!/bin/sh\nexec sleep 30\n",
        "#!/bin/sh\nexit 2\n",
        "#!/bin/sh\nexec sleep 30\n",
    );
    let config = fx.config(&["--annotated-vcf", fx.path("judged.vcf").to_str().unwrap()]);

    let start = Instant::now();
    let err = ValidationPipeline::new(config, None).run().unwrap_err();
    assert!(start.elapsed() < Duration::from_secs(20));
    assert!(matches!(err, JudgeError::StageFailed { .. }));
    assert_eq!(err.stage_name(), Some(TENSOR_STAGE));
    assert!(!fx.path("report.txt").exists());
    assert!(!fx.path("judged.vcf").exists());
}

#[test]
fn test_missing_stage_executable_rejected_before_run() {
    let fx = Fixture::new("#!/bin/sh\nexec cat\n", "#!/bin/sh\nexec cat\n", CALL_SCRIPT);
    fs::remove_file(fx.path("call.sh")).unwrap();
    let args = vec![
        "varjudge".to_string(),
        "validate".to_string(),
        "--vcf".to_string(),
        fx.path("in.vcf").to_str().unwrap().to_string(),
        "--bam".to_string(),
        fx.path("sample.bam").to_str().unwrap().to_string(),
        "--reference".to_string(),
        fx.path("ref.fa").to_str().unwrap().to_string(),
        "--checkpoint".to_string(),
        fx.path("model").to_str().unwrap().to_string(),
        "--report".to_string(),
        fx.path("report.txt").to_str().unwrap().to_string(),
        "--truth-bin".to_string(),
        fx.path("truth.sh").to_str().unwrap().to_string(),
        "--tensor-bin".to_string(),
        fx.path("tensor.sh").to_str().unwrap().to_string(),
        "--call-bin".to_string(),
        fx.path("call.sh").to_str().unwrap().to_string(),
        "--samtools".to_string(),
        "sh".to_string(),
    ];
    let Command::Validate(config) = Cli::try_parse_from(args).unwrap().command else {
        panic!("expected validate");
    };
    let err = config.validate().unwrap_err();
    assert!(matches!(err, JudgeError::ExecutableNotFound { .. }));
}

#[test]
fn test_annotate_rereads_report() {
    let fx = Fixture::new("#!/bin/sh\nexec cat\n", "#!/bin/sh\nexec cat\n", CALL_SCRIPT);
    ValidationPipeline::new(fx.config(&[]), None).run().unwrap();

    let out = fx.path("judged.vcf.gz");
    let vcf = fx.path("in.vcf");
    let report = fx.path("report.txt");
    let args = [
        "varjudge",
        "annotate",
        "--vcf",
        vcf.to_str().unwrap(),
        "--report",
        report.to_str().unwrap(),
        "--out",
        out.to_str().unwrap(),
    ];
    let Command::Annotate(config) = Cli::try_parse_from(args).unwrap().command else {
        panic!("expected annotate");
    };
    config.validate().unwrap();
    let rejected = AnnotatePipeline::new(config).run().unwrap();
    assert_eq!(rejected, 1);
    assert!(fs::metadata(&out).unwrap().len() > 0);
}
