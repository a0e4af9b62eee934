//! # Configuration Logic
//!
//! CLI argument parsing and validation using `clap` derive.
//!
//! ## Subcommands
//! - `validate`: run the three-stage pipeline per contig, classify, report.
//! - `annotate`: rewrite FILTER of a VCF from an existing report.
//! - `decode`: run the inference scheduler over tensors and precomputed
//!   model outputs.
//!
//! ## Example CLI
//! ```bash
//! varjudge validate --vcf calls.vcf.gz --bam sample.bam --reference ref.fa \
//!     --checkpoint model/ckpt --report report.txt \
//!     --truth-bin get_truth --tensor-bin create_tensor --call-bin call_var
//! ```
//!
//! All validation happens before any stage is spawned.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};

use crate::error::{JudgeError, Result};
use crate::pipelines::stages::{CALL_STAGE, TENSOR_STAGE, TRUTH_STAGE};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "varjudge",
    version,
    about = "Validate candidate variant calls against an independent neural inference pass"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Validate a VCF and write the verdict report
    Validate(Config),
    /// Annotate a VCF from a previously written report
    Annotate(AnnotateConfig),
    /// Decode tensors plus precomputed model outputs into call lines
    Decode(DecodeConfig),
}

/// Settings for a validation run
#[derive(Args, Debug, Clone)]
pub struct Config {
    /// Sites to validate, sorted VCF (plain or gzip)
    #[arg(long)]
    pub vcf: PathBuf,

    /// Alignment input
    #[arg(long)]
    pub bam: PathBuf,

    /// Reference FASTA
    #[arg(long)]
    pub reference: PathBuf,

    /// Model checkpoint (the path itself or its `.meta` sidecar must exist)
    #[arg(long)]
    pub checkpoint: PathBuf,

    /// Output validation report
    #[arg(long)]
    pub report: PathBuf,

    /// Write the model calls, with the input headers, to this VCF
    #[arg(long)]
    pub calls_vcf: Option<PathBuf>,

    /// Write the input VCF with FILTER set from the verdicts
    #[arg(long)]
    pub annotated_vcf: Option<PathBuf>,

    /// Work on all contigs instead of only chr{1..22,X,Y} and {1..22,X,Y}
    #[arg(long, default_value_t = false)]
    pub all_contigs: bool,

    /// Sample name shown in model calls
    #[arg(long, default_value = "SAMPLE")]
    pub sample_name: String,

    /// Number of threads (default: all cores)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Cap depth per position
    #[arg(long, default_value_t = 8000)]
    pub depth_cap: u32,

    /// Path to samtools
    #[arg(long, default_value = "samtools")]
    pub samtools: PathBuf,

    /// Truth-site generator executable
    #[arg(long)]
    pub truth_bin: PathBuf,

    /// Tensor builder executable
    #[arg(long)]
    pub tensor_bin: PathBuf,

    /// Inference/validator executable
    #[arg(long)]
    pub call_bin: PathBuf,

    /// Interpreter used to run the truth and tensor stages (e.g. pypy)
    #[arg(long)]
    pub launcher: Option<PathBuf>,

    /// Stage liveness check interval in milliseconds
    #[arg(long, default_value_t = 2000)]
    pub poll_ms: u64,

    /// Emit tracing spans to stderr
    #[arg(long, default_value_t = false)]
    pub profile: bool,

    /// Progress heartbeat interval in seconds (0 disables)
    #[arg(long, default_value_t = 0)]
    pub heartbeat_secs: u64,
}

/// Settings for standalone annotation
#[derive(Args, Debug, Clone)]
pub struct AnnotateConfig {
    /// Unannotated VCF input
    #[arg(long)]
    pub vcf: PathBuf,

    /// Report written by `validate`
    #[arg(long)]
    pub report: PathBuf,

    /// Annotated VCF output
    #[arg(long)]
    pub out: PathBuf,
}

/// Settings for decoding precomputed predictions
#[derive(Args, Debug, Clone)]
pub struct DecodeConfig {
    /// Tensor records (`-` for stdin)
    #[arg(long)]
    pub tensors: PathBuf,

    /// Model outputs, one line per tensor record
    #[arg(long)]
    pub predictions: PathBuf,

    /// Output call lines (default: stdout)
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Sites per prediction batch
    #[arg(long, default_value_t = crate::data::tensor::PREDICT_BATCH_SIZE)]
    pub batch_size: usize,
}

const CANONICAL_CONTIGS: [&str; 24] = [
    "1", "2", "3", "4", "5", "6", "7", "8", "9", "10", "11", "12", "13", "14", "15", "16", "17",
    "18", "19", "20", "21", "22", "X", "Y",
];

/// `1..22, X, Y`, with or without the `chr` prefix
pub fn is_canonical_contig(name: &str) -> bool {
    let bare = name.strip_prefix("chr").unwrap_or(name);
    CANONICAL_CONTIGS.contains(&bare)
}

fn require_file(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(JudgeError::FileNotFound {
            path: path.to_path_buf(),
        })
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Resolve a program the way a shell would: explicit paths are checked
/// directly, bare names are searched on `PATH`.
pub fn resolve_program(program: &Path) -> Option<PathBuf> {
    if program.components().count() > 1 || program.is_absolute() {
        return is_executable(program).then(|| program.to_path_buf());
    }
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

impl Cli {
    /// Parse from the process arguments and validate the chosen subcommand
    pub fn parse_and_validate() -> Result<Command> {
        let cli = Cli::parse();
        match &cli.command {
            Command::Validate(config) => config.validate()?,
            Command::Annotate(config) => config.validate()?,
            Command::Decode(config) => config.validate()?,
        }
        Ok(cli.command)
    }
}

impl Config {
    /// Check inputs and executables before any work starts
    pub fn validate(&self) -> Result<()> {
        require_file(&self.vcf)?;
        require_file(&self.bam)?;
        require_file(&self.reference)?;

        let meta = PathBuf::from(format!("{}.meta", self.checkpoint.display()));
        if !self.checkpoint.exists() && !meta.is_file() {
            return Err(JudgeError::FileNotFound { path: meta });
        }

        if self.threads == Some(0) {
            return Err(JudgeError::config("--threads must be at least 1"));
        }
        if self.depth_cap == 0 {
            return Err(JudgeError::config("--depth-cap must be at least 1"));
        }
        if self.poll_ms == 0 {
            return Err(JudgeError::config("--poll-ms must be at least 1"));
        }
        if self.sample_name.trim().is_empty() {
            return Err(JudgeError::config("--sample-name must not be empty"));
        }

        self.resolve_stage_programs()?;
        self.resolve_samtools()?;
        Ok(())
    }

    /// Resolved `[truth, tensor, call]` programs.
    ///
    /// With a launcher the two preparation stages only need to be readable
    /// files; the launcher itself must be executable.
    pub fn resolve_stage_programs(&self) -> Result<[PathBuf; 3]> {
        let prep = |label: &str, bin: &Path| -> Result<PathBuf> {
            if self.launcher.is_some() {
                if bin.is_file() {
                    Ok(bin.to_path_buf())
                } else {
                    Err(JudgeError::ExecutableNotFound {
                        stage: label.to_string(),
                        program: bin.to_path_buf(),
                    })
                }
            } else {
                resolve_program(bin).ok_or_else(|| JudgeError::ExecutableNotFound {
                    stage: label.to_string(),
                    program: bin.to_path_buf(),
                })
            }
        };

        if let Some(launcher) = &self.launcher {
            if resolve_program(launcher).is_none() {
                return Err(JudgeError::ExecutableNotFound {
                    stage: "launcher".to_string(),
                    program: launcher.clone(),
                });
            }
        }

        let truth = prep(TRUTH_STAGE, &self.truth_bin)?;
        let tensor = prep(TENSOR_STAGE, &self.tensor_bin)?;
        let call = resolve_program(&self.call_bin).ok_or_else(|| JudgeError::ExecutableNotFound {
            stage: CALL_STAGE.to_string(),
            program: self.call_bin.clone(),
        })?;
        Ok([truth, tensor, call])
    }

    pub fn resolve_samtools(&self) -> Result<PathBuf> {
        resolve_program(&self.samtools).ok_or_else(|| JudgeError::ExecutableNotFound {
            stage: "samtools".to_string(),
            program: self.samtools.clone(),
        })
    }

    /// Worker threads: requested count capped at the core count
    pub fn nthreads(&self) -> usize {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        self.threads.map(|t| t.min(cores)).unwrap_or(cores).max(1)
    }

    /// Whether the pipeline should run on this contig
    pub fn accepts_contig(&self, contig: &str) -> bool {
        self.all_contigs || is_canonical_contig(contig)
    }
}

impl AnnotateConfig {
    pub fn validate(&self) -> Result<()> {
        require_file(&self.vcf)?;
        require_file(&self.report)?;
        Ok(())
    }
}

impl DecodeConfig {
    pub fn reads_stdin(&self) -> bool {
        self.tensors.as_os_str() == "-"
    }

    pub fn validate(&self) -> Result<()> {
        if !self.reads_stdin() {
            require_file(&self.tensors)?;
        }
        require_file(&self.predictions)?;
        if self.batch_size == 0 {
            return Err(JudgeError::config("--batch-size must be at least 1"));
        }
        Ok(())
    }
}
