//! # Varjudge: Neural Validation of Variant Calls
//!
//! ## Usage
//! ```bash
//! # Validate canonical contigs and annotate the input
//! varjudge validate --vcf calls.vcf.gz --bam sample.bam --reference ref.fa \
//!     --checkpoint model/ckpt --report report.txt --annotated-vcf judged.vcf.gz \
//!     --truth-bin get_truth --tensor-bin create_tensor --call-bin call_var
//!
//! # Re-annotate from an existing report
//! varjudge annotate --vcf calls.vcf.gz --report report.txt --out judged.vcf.gz
//!
//! # Decode tensors with model outputs computed elsewhere
//! varjudge decode --tensors - --predictions outputs.txt > calls.txt
//! ```

use std::time::Instant;

use varjudge::config::{Cli, Command};
use varjudge::pipelines::{AnnotatePipeline, DecodePipeline, ValidationPipeline};
use varjudge::utils::telemetry::{HeartbeatConfig, HeartbeatHandle, Stage, TelemetryBlackboard};
use varjudge::Result;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Initialize tracing subscriber for hierarchical profiling output
fn init_profiling() {
    use tracing_subscriber::fmt::format::FmtSpan;
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_span_events(FmtSpan::CLOSE)
                .with_target(false)
                .with_timer(fmt::time::uptime()),
        )
        .init();
}

fn run() -> Result<()> {
    let start = Instant::now();

    match Cli::parse_and_validate()? {
        Command::Validate(config) => {
            if config.profile {
                init_profiling();
                eprintln!("=== Profiling enabled ===\n");
            }

            let n_threads = config.nthreads();
            rayon::ThreadPoolBuilder::new()
                .num_threads(n_threads)
                .build_global()
                .ok();

            eprintln!("Varjudge v{}", env!("CARGO_PKG_VERSION"));
            eprintln!("Threads: {}", n_threads);
            eprintln!(
                "Contigs: {}",
                if config.all_contigs { "all" } else { "canonical" }
            );

            let telemetry = TelemetryBlackboard::new();
            let heartbeat = if config.heartbeat_secs > 0 {
                Some(HeartbeatHandle::spawn(
                    telemetry.clone(),
                    HeartbeatConfig {
                        interval_secs: config.heartbeat_secs,
                        ..HeartbeatConfig::default()
                    },
                )?)
            } else {
                None
            };

            let mut pipeline = ValidationPipeline::new(config, Some(telemetry.clone()));
            let result = pipeline.run();

            telemetry.set_stage(Stage::Complete);
            if let Some(hb) = heartbeat {
                hb.shutdown();
            }
            result?;
        }
        Command::Annotate(config) => {
            AnnotatePipeline::new(config).run()?;
        }
        Command::Decode(config) => {
            DecodePipeline::new(config).run()?;
        }
    }

    eprintln!("\nCompleted in {:.2}s", start.elapsed().as_secs_f64());
    Ok(())
}
