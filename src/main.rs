use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{error, info};
use std::fs::File;
use std::path::PathBuf;

use framesync::config::AnalysisConfig;
use framesync::ingest::{self, ShardSource};
use framesync::pipeline::SensorPipeline;
use framesync::report::SensorSummary;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding the per-sensor JSON shard files.
    #[arg(short, long)]
    path: PathBuf,

    /// Sensor name prefixes to analyze.
    #[arg(long, value_delimiter = ',', default_value = "0,1")]
    sensors: Vec<String>,

    /// Nominal frame rate (frames/second).
    #[arg(long, default_value_t = 14.4)]
    rate: f64,

    /// Radio clock tick rate (ticks/second).
    #[arg(long, default_value_t = 1200.0)]
    radio_freq: f64,

    /// Decimation stride for coarse period estimation.
    #[arg(long, default_value_t = 10)]
    stride: usize,

    /// Cap on monotonicity-repair passes.
    #[arg(long, default_value_t = 100)]
    max_repair_iterations: usize,

    /// Write each sensor's merged record sequence next to the shards.
    #[arg(long, default_value_t = false)]
    write_merged: bool,

    /// Write all sensor summaries to this JSON file.
    #[arg(long)]
    summary_out: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::builder()
        .format_timestamp(None)
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse();

    let mut config = AnalysisConfig::default();
    config.decimation = args.stride;
    config.max_repair_iterations = args.max_repair_iterations;

    let mut summaries: Vec<SensorSummary> = Vec::new();
    let mut failures = 0usize;

    for sensor in &args.sensors {
        info!("Analyzing sensor {} ...", sensor);

        let source = ShardSource::new(&args.path, sensor.as_str());
        let pipeline = SensorPipeline::new(
            source,
            sensor.as_str(),
            args.rate,
            args.radio_freq,
            config.clone(),
        );

        let run = match pipeline.run() {
            Ok(run) => run,
            Err(e) => {
                error!("sensor {}: {:#}", sensor, e);
                failures += 1;
                continue;
            }
        };

        if args.write_merged {
            let merged_path = args.path.join(format!("{}_merged.json", sensor));
            ingest::write_merged(&merged_path, &run.records)?;
            info!("Wrote {}", merged_path.display());
        }

        summaries.push(run.summary);
    }

    if let Some(out) = &args.summary_out {
        let file = File::create(out)
            .with_context(|| format!("creating summary file {}", out.display()))?;
        serde_json::to_writer_pretty(file, &summaries)
            .with_context(|| format!("writing summary file {}", out.display()))?;
        info!("Wrote {}", out.display());
    }

    if failures > 0 {
        bail!("{} of {} sensors failed", failures, args.sensors.len());
    }
    Ok(())
}
