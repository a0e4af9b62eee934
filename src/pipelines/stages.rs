//! # Stage Pipeline
//!
//! Runs a chain of external processes for one contig, stdout of stage `k`
//! wired to stdin of stage `k+1`:
//!
//! ```text
//! feeder ──▶ [truth-site generator] ──▶ [tensor builder] ──▶ [inference/validator] ──▶ collector
//! ```
//!
//! Lifecycle per run: `Init → Spawned → Running → {Succeeded, Failed} → Reaped`.
//!
//! - The feeder thread writes the contig's records into the first stage and
//!   closes its stdin. The collector thread reads every line the last stage
//!   writes, in order.
//! - The calling thread supervises: every poll interval it queries each stage
//!   without blocking. The first stage found with a non-zero (or signal) exit
//!   fails the run and every sibling is killed.
//! - [`StageChain`] kills and reaps whatever is still running when it is
//!   dropped, so handles are released on every exit path.
//!
//! Stage diagnostics (stderr) are inherited from the parent unmodified.

use std::ffi::OsString;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, info_span, warn};

use crate::config::Config;
use crate::error::{JudgeError, Result};
use crate::utils::telemetry::TelemetryBlackboard;

pub const TRUTH_STAGE: &str = "truth-site generator";
pub const TENSOR_STAGE: &str = "tensor builder";
pub const CALL_STAGE: &str = "inference/validator";

/// Re-arm interval used once both streams are closed and only exit statuses
/// are outstanding
const SETTLE_INTERVAL: Duration = Duration::from_millis(20);

/// One external executable and its arguments
#[derive(Clone, Debug)]
pub struct StageSpec {
    pub name: String,
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl StageSpec {
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    fn command(&self, stdin: Stdio) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        cmd
    }
}

/// Builds the three stage command lines for a contig from the run settings
#[derive(Clone, Debug)]
pub struct StageCommands {
    truth: PathBuf,
    tensor: PathBuf,
    call: PathBuf,
    launcher: Option<PathBuf>,
    bam: PathBuf,
    reference: PathBuf,
    samtools: PathBuf,
    depth_cap: u32,
    checkpoint: PathBuf,
    sample_name: String,
    threads: usize,
}

impl StageCommands {
    /// Resolve every executable up front; nothing is spawned on failure
    pub fn from_config(config: &Config) -> Result<Self> {
        let [truth, tensor, call] = config.resolve_stage_programs()?;
        let samtools = config.resolve_samtools()?;
        Ok(Self {
            truth,
            tensor,
            call,
            launcher: config.launcher.clone(),
            bam: config.bam.clone(),
            reference: config.reference.clone(),
            samtools,
            depth_cap: config.depth_cap,
            checkpoint: config.checkpoint.clone(),
            sample_name: config.sample_name.clone(),
            threads: config.nthreads(),
        })
    }

    fn prep_stage(&self, name: &str, program: &Path) -> StageSpec {
        match &self.launcher {
            Some(launcher) => StageSpec::new(name, launcher).arg(program),
            None => StageSpec::new(name, program),
        }
    }

    /// `[truth, tensor, call]` for one contig
    pub fn for_contig(&self, contig: &str) -> Vec<StageSpec> {
        let truth = self
            .prep_stage(TRUTH_STAGE, &self.truth)
            .arg("--ctgName")
            .arg(contig);
        let tensor = self
            .prep_stage(TENSOR_STAGE, &self.tensor)
            .arg("--bam_fn")
            .arg(&self.bam)
            .arg("--ref_fn")
            .arg(&self.reference)
            .arg("--ctgName")
            .arg(contig)
            .arg("--samtools")
            .arg(&self.samtools)
            .arg("--dcov")
            .arg(self.depth_cap.to_string());
        let call = StageSpec::new(CALL_STAGE, &self.call)
            .arg("--chkpnt_fn")
            .arg(&self.checkpoint)
            .arg("--sampleName")
            .arg(&self.sample_name)
            .arg("--threads")
            .arg(self.threads.to_string());
        vec![truth, tensor, call]
    }
}

/// Exit state of one stage
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StageStatus {
    Pending,
    Success,
    Failure(String),
}

/// A running stage process
pub struct StageHandle {
    name: String,
    child: Child,
    status: StageStatus,
}

impl StageHandle {
    /// Non-blocking status query
    fn poll(&mut self) -> Result<&StageStatus> {
        if self.status == StageStatus::Pending {
            if let Some(exit) = self.child.try_wait()? {
                self.status = if exit.success() {
                    StageStatus::Success
                } else {
                    StageStatus::Failure(exit.to_string())
                };
                debug!(stage = %self.name, status = ?self.status, "stage exited");
            }
        }
        Ok(&self.status)
    }

    fn terminate(&mut self) {
        if self.status != StageStatus::Pending {
            return;
        }
        if let Err(e) = self.child.kill() {
            debug!(stage = %self.name, error = %e, "kill failed");
        }
        match self.child.wait() {
            Ok(exit) if exit.success() => self.status = StageStatus::Success,
            Ok(exit) => self.status = StageStatus::Failure(exit.to_string()),
            Err(e) => self.status = StageStatus::Failure(e.to_string()),
        }
    }
}

/// Owned chain of stage processes. Dropping it kills and reaps every stage
/// still running.
pub struct StageChain {
    stages: Vec<StageHandle>,
}

impl StageChain {
    /// Spawn the chain. Returns the first stage's stdin and the last stage's
    /// stdout.
    pub fn spawn(specs: &[StageSpec]) -> Result<(Self, ChildStdin, ChildStdout)> {
        if specs.is_empty() {
            return Err(JudgeError::config("stage pipeline needs at least one stage"));
        }
        let mut chain = StageChain {
            stages: Vec::with_capacity(specs.len()),
        };
        let mut first_stdin = None;
        let mut upstream: Option<ChildStdout> = None;

        for spec in specs {
            let stdin = match upstream.take() {
                Some(out) => Stdio::from(out),
                None => Stdio::piped(),
            };
            let mut child = spec
                .command(stdin)
                .spawn()
                .map_err(|source| JudgeError::StageSpawn {
                    stage: spec.name.clone(),
                    source,
                })?;
            info!(stage = %spec.name, pid = child.id(), "stage spawned");

            if first_stdin.is_none() {
                first_stdin = child.stdin.take();
            }
            upstream = child.stdout.take();
            chain.stages.push(StageHandle {
                name: spec.name.clone(),
                child,
                status: StageStatus::Pending,
            });
        }

        match (first_stdin, upstream) {
            (Some(stdin), Some(stdout)) => Ok((chain, stdin, stdout)),
            _ => Err(JudgeError::consistency("stage pipes were not created")),
        }
    }

    /// Poll every stage in chain order. Returns the first failure found.
    fn check(&mut self) -> Result<Option<(String, String)>> {
        for stage in &mut self.stages {
            if let StageStatus::Failure(status) = stage.poll()?.clone() {
                return Ok(Some((stage.name.clone(), status)));
            }
        }
        Ok(None)
    }

    fn all_succeeded(&self) -> bool {
        self.stages.iter().all(|s| s.status == StageStatus::Success)
    }

    fn terminate_all(&mut self) {
        for stage in &mut self.stages {
            stage.terminate();
        }
    }
}

impl Drop for StageChain {
    fn drop(&mut self) {
        self.terminate_all();
    }
}

enum TaskEvent {
    Fed(std::io::Result<u64>),
    Collected(std::io::Result<Vec<String>>),
}

/// Supervised execution of a stage chain
pub struct StagePipeline {
    poll_interval: Duration,
    telemetry: Option<Arc<TelemetryBlackboard>>,
}

impl StagePipeline {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            telemetry: None,
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<TelemetryBlackboard>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Feed `input` through the chain and collect the last stage's lines.
    ///
    /// Blocks until every stage has exited and both streams are closed, or
    /// until a stage fails.
    pub fn run(&self, specs: &[StageSpec], input: Arc<[String]>) -> Result<Vec<String>> {
        let _span = info_span!("stage_pipeline", stages = specs.len()).entered();
        let (mut chain, stdin, stdout) = StageChain::spawn(specs)?;
        let (tx, rx) = mpsc::channel();

        let feeder_tx = tx.clone();
        let feeder_telemetry = self.telemetry.clone();
        thread::Builder::new()
            .name("feeder".to_string())
            .spawn(move || {
                let res = feed(stdin, &input, feeder_telemetry.as_deref());
                let _ = feeder_tx.send(TaskEvent::Fed(res));
            })?;

        let collector_telemetry = self.telemetry.clone();
        thread::Builder::new()
            .name("collector".to_string())
            .spawn(move || {
                let res = collect(stdout, collector_telemetry.as_deref());
                let _ = tx.send(TaskEvent::Collected(res));
            })?;

        let mut fed: Option<std::io::Result<u64>> = None;
        let mut collected: Option<std::io::Result<Vec<String>>> = None;

        loop {
            let wait = if fed.is_some() && collected.is_some() {
                SETTLE_INTERVAL.min(self.poll_interval)
            } else {
                self.poll_interval
            };
            match rx.recv_timeout(wait) {
                Ok(TaskEvent::Fed(res)) => fed = Some(res),
                Ok(TaskEvent::Collected(res)) => collected = Some(res),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    if fed.is_none() || collected.is_none() {
                        chain.terminate_all();
                        return Err(JudgeError::consistency(
                            "feeder or collector thread exited without reporting",
                        ));
                    }
                    thread::sleep(wait);
                }
            }

            if let Some((stage, status)) = chain.check()? {
                warn!(stage = %stage, status = %status, "stage failed, terminating siblings");
                chain.terminate_all();
                return Err(JudgeError::StageFailed { stage, status });
            }

            if chain.all_succeeded() && fed.is_some() && collected.is_some() {
                break;
            }
        }

        match fed {
            Some(Ok(n)) => debug!(records = n, "feeder finished"),
            Some(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                warn!("first stage closed its input before all records were fed")
            }
            Some(Err(e)) => return Err(e.into()),
            None => {}
        }
        match collected {
            Some(res) => Ok(res?),
            None => Err(JudgeError::consistency("collector did not report")),
        }
    }
}

fn feed(
    stdin: ChildStdin,
    input: &[String],
    telemetry: Option<&TelemetryBlackboard>,
) -> std::io::Result<u64> {
    let mut writer = BufWriter::new(stdin);
    let mut n = 0u64;
    for line in input {
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        n += 1;
    }
    writer.flush()?;
    if let Some(t) = telemetry {
        t.add_records_fed(n);
    }
    // dropping the writer closes the first stage's stdin
    Ok(n)
}

fn collect(
    stdout: ChildStdout,
    telemetry: Option<&TelemetryBlackboard>,
) -> std::io::Result<Vec<String>> {
    let mut lines = Vec::new();
    for line in BufReader::new(stdout).lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        lines.push(line);
        if let Some(t) = telemetry {
            t.add_calls_collected(1);
        }
    }
    Ok(lines)
}
