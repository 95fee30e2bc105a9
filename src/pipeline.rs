//! Per-sensor orchestration: ingestion, grid recovery, clock alignment.
//!
//! A pipeline owns one sensor's record source and runs the full post-hoc
//! chain: load records, resynchronize the device-clock column onto its frame
//! grid, fit the device→host and host→radio clock maps, and express the
//! corrected frame times in every clock domain.

use anyhow::{bail, Context, Result};

use crate::align::ClockFit;
use crate::config::AnalysisConfig;
use crate::ingest::SampleRecord;
use crate::report::{self, SensorSummary};
use crate::resync::{analyze_timestamps, FrameTimeline};
use crate::traits::SampleSource;

/// Everything one sensor run produces.
#[derive(Debug)]
pub struct SensorRun {
    pub summary: SensorSummary,
    pub timeline: FrameTimeline,
    /// The merged records the run was computed from.
    pub records: Vec<SampleRecord>,
    /// Relative device time → host clock (seconds).
    pub host_fit: ClockFit,
    /// Host clock → radio clock (seconds).
    pub radio_fit: ClockFit,
    /// Corrected frame times mapped to the host clock.
    pub host_times: Vec<f64>,
    /// Corrected frame times mapped to the radio clock.
    pub radio_times: Vec<f64>,
}

pub struct SensorPipeline<S: SampleSource> {
    source: S,
    name: String,
    nominal_rate: f64,
    radio_tick_hz: f64,
    config: AnalysisConfig,
}

impl<S: SampleSource> SensorPipeline<S> {
    pub fn new(
        source: S,
        name: impl Into<String>,
        nominal_rate: f64,
        radio_tick_hz: f64,
        config: AnalysisConfig,
    ) -> Self {
        SensorPipeline {
            source,
            name: name.into(),
            nominal_rate,
            radio_tick_hz,
            config,
        }
    }

    pub fn run(&self) -> Result<SensorRun> {
        if !(self.radio_tick_hz.is_finite() && self.radio_tick_hz > 0.0) {
            bail!("radio tick rate must be positive, got {}", self.radio_tick_hz);
        }

        let records = self
            .source
            .load()
            .with_context(|| format!("loading records for sensor {}", self.name))?;

        let device: Vec<f64> = records.iter().map(|r| r.gstreamer_timestamp).collect();
        let host: Vec<f64> = records.iter().map(|r| r.python_timestamp).collect();
        let radio: Vec<f64> = records
            .iter()
            .map(|r| r.global_timestamp / self.radio_tick_hz)
            .collect();

        let timeline = analyze_timestamps(&device, self.nominal_rate, &self.config)
            .with_context(|| format!("analyzing sensor {}", self.name))?;

        // The clock fits share the timeline's relative device-time domain, so
        // the corrected frame times can be pushed straight through them.
        let rel_device: Vec<f64> = device.iter().map(|t| t - timeline.origin).collect();
        let host_fit = ClockFit::fit(&rel_device, &host)
            .with_context(|| format!("fitting device->host clock for sensor {}", self.name))?;
        let radio_fit = ClockFit::fit(&host, &radio)
            .with_context(|| format!("fitting host->radio clock for sensor {}", self.name))?;

        let host_times = host_fit.apply_all(&timeline.times);
        let radio_times = radio_fit.apply_all(&host_times);

        let summary = report::summarize(&self.name, self.nominal_rate, &timeline);
        report::log_summary(&summary);

        Ok(SensorRun {
            summary,
            timeline,
            records,
            host_fit,
            radio_fit,
            host_times,
            radio_times,
        })
    }
}
