//! V2XView Simulator CLI
//!
//! Runs the perception → fusion → V2X pipeline over synthetic traffic or a
//! recorded trace and writes the broadcasts to disk.

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use v2x_core::{FusionConfig, FusionEngine};
use v2x_env::GroundTruthStepper;
use v2x_sim::{
    GreedyIouTracker, MessageExporter, OracleConfig, PipelineRunner, RunnerConfig,
    SyntheticDetector, TraceReplay, TrafficOracle,
};

/// V2XView pipeline simulator
#[derive(Parser, Debug)]
#[command(name = "v2x-sim")]
#[command(about = "Fuse tracked detections with traffic ground truth and emit V2X messages", long_about = None)]
struct Args {
    /// Fusion configuration (JSON); defaults apply to missing fields
    #[arg(short, long)]
    config: Option<String>,

    /// Replay a recorded telemetry trace (JSON) instead of synthetic traffic
    #[arg(short, long)]
    trace: Option<String>,

    /// Seed for synthetic traffic and detection noise
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Synthetic traffic duration in seconds
    #[arg(short, long, default_value = "30")]
    duration: f64,

    /// Number of synthetic vehicles
    #[arg(long, default_value = "12")]
    vehicles: usize,

    /// Ego vehicle simulation id (empty for anonymous broadcasts)
    #[arg(short, long, default_value = "veh_0")]
    ego: String,

    /// Output directory for messages and summary
    #[arg(short, long, default_value = "v2x_output")]
    output: String,

    /// Stop after this many steps
    #[arg(long)]
    max_steps: Option<u64>,

    /// Pace steps to wall-clock time
    #[arg(long)]
    real_time: bool,

    /// Detection center noise standard deviation in pixels (0 = exact)
    #[arg(long, default_value = "0")]
    noise: f64,

    /// Only list vehicles within V2X range of the ego as nearby
    #[arg(long)]
    filter_range: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for scripting
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging (stderr, so --json keeps stdout clean)
    let level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")?;

    info!("V2XView Simulator v{}", env!("CARGO_PKG_VERSION"));
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let mut fusion = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {path}"))?;
            FusionConfig::from_json(&json).with_context(|| format!("Invalid config {path}"))?
        }
        None => FusionConfig::default(),
    };

    let stepper: Box<dyn GroundTruthStepper> = match &args.trace {
        Some(path) => {
            info!("Replaying trace {}", path);
            Box::new(TraceReplay::from_path(path).context("Failed to load trace")?)
        }
        None => {
            info!(
                "Synthetic traffic: {} vehicles, {}s, seed={}",
                args.vehicles, args.duration, args.seed
            );
            Box::new(TrafficOracle::new(OracleConfig {
                seed: args.seed,
                num_vehicles: args.vehicles,
                duration_s: args.duration,
                step_length: fusion.step_length,
                ..Default::default()
            }))
        }
    };
    // Timestamps follow the ground-truth clock
    fusion.step_length = stepper.step_length();

    let engine = FusionEngine::new(fusion.clone()).context("Failed to build fusion engine")?;
    let detector = SyntheticDetector::new(&fusion)
        .and_then(|d| d.with_noise(args.noise, args.seed))
        .context("Failed to build detector")?;

    let runner_config = RunnerConfig {
        ego_vehicle: Some(args.ego.clone()).filter(|id| !id.is_empty()),
        max_steps: args.max_steps,
        real_time: args.real_time,
        filter_by_range: args.filter_range,
    };

    let mut runner = PipelineRunner::new(
        engine,
        stepper,
        Box::new(detector),
        Box::new(GreedyIouTracker::with_defaults()),
        runner_config,
    )
    .context("Failed to build pipeline")?;
    let mut exporter = MessageExporter::new(&args.output);

    let report = runner.run(&mut exporter).await.context("Pipeline failed")?;
    let summary = exporter
        .write(report.steps, report.stats)
        .with_context(|| format!("Failed to write output to {}", args.output))?;

    if args.json {
        let out = serde_json::json!({
            "report": report,
            "summary": summary,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        info!(
            "✅ {} steps, {} broadcasts{}",
            report.steps,
            report.broadcasts,
            if report.interrupted { " (interrupted)" } else { "" }
        );
        info!(
            "   {} unique vehicles, {:.1} vehicles/message, match rate {:.0}%",
            summary.messages.total_unique_vehicles,
            summary.messages.avg_vehicles_per_message,
            report.stats.match_rate() * 100.0
        );
        info!("   Output written to {}", exporter.output_dir().display());
    }

    Ok(())
}
