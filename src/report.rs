//! Per-sensor analysis summaries and logged diagnostics.
//!
//! The summary is the machine-readable counterpart of the diagnostics the
//! analysis logs: grid estimate in milliseconds, frame-id span, and the gap
//! list with lost-frame counts. It round-trips through JSON so downstream
//! tooling can consume a run without re-analyzing.

use log::info;
use serde::{Deserialize, Serialize};

use crate::resync::FrameTimeline;

/// One gap in a sensor's frame-id sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapEntry {
    /// Index of the sample preceding the gap.
    pub position: usize,
    /// First missing frame id.
    pub first_missing_id: i64,
    /// Number of frames lost.
    pub lost: u64,
}

/// Serializable record of one sensor's resynchronization run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorSummary {
    pub sensor: String,
    pub samples: usize,
    pub nominal_rate: f64,
    /// Estimated frame period (seconds).
    pub period: f64,
    /// Estimated phase offset (seconds).
    pub offset: f64,
    pub first_id: i64,
    pub last_id: i64,
    pub gaps: Vec<GapEntry>,
    pub total_lost: u64,
}

/// A lost frame with its interpolated display timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LostFrame {
    pub id: i64,
    /// Linearly interpolated timestamp (same relative clock as the analyzed
    /// series).
    pub time: f64,
}

/// Condense a timeline into its summary record.
pub fn summarize(sensor: &str, nominal_rate: f64, timeline: &FrameTimeline) -> SensorSummary {
    let gaps = timeline
        .gaps
        .iter()
        .map(|g| GapEntry {
            position: g.position,
            first_missing_id: timeline.ids[g.position] + 1,
            lost: g.lost,
        })
        .collect();

    SensorSummary {
        sensor: sensor.to_string(),
        samples: timeline.ids.len(),
        nominal_rate,
        period: timeline.period,
        offset: timeline.offset,
        first_id: *timeline.ids.first().unwrap_or(&0),
        last_id: *timeline.ids.last().unwrap_or(&0),
        gaps,
        total_lost: timeline.total_lost(),
    }
}

/// Log the diagnostics a run produces: grid estimate in milliseconds and the
/// gap list.
pub fn log_summary(summary: &SensorSummary) {
    info!(
        "{}: {} samples, period {:.3} ms, offset {:.3} ms",
        summary.sensor,
        summary.samples,
        summary.period * 1e3,
        summary.offset * 1e3
    );
    info!(
        "{}: frames {}..={}, {} gaps, {} lost",
        summary.sensor, summary.first_id, summary.last_id, summary.gaps.len(), summary.total_lost
    );
    for gap in &summary.gaps {
        info!(
            "{}: gap after sample {}: {} frame(s) lost starting at id {}",
            summary.sensor, gap.position, gap.lost, gap.first_missing_id
        );
    }
}

/// Interpolated timestamps for every lost frame.
///
/// `ts` is the same series given to `analyze_timestamps`. Missing frames
/// between two observed samples are spread evenly between the bounding raw
/// timestamps, symmetric about the gap midpoint.
pub fn lost_frame_times(timeline: &FrameTimeline, ts: &[f64]) -> Vec<LostFrame> {
    let mut lost = Vec::new();
    for gap in &timeline.gaps {
        let (i0, i1) = (gap.position, gap.position + 1);
        let (id0, id1) = (timeline.ids[i0], timeline.ids[i1]);
        let t0 = ts[i0] - timeline.origin;
        let t1 = ts[i1] - timeline.origin;
        let span = (id1 - id0) as f64;
        for id in (id0 + 1)..id1 {
            let frac = (id - id0) as f64 / span;
            lost.push(LostFrame {
                id,
                time: t0 + (t1 - t0) * frac,
            });
        }
    }
    lost
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::resync::analyze_timestamps;

    fn cfg1() -> AnalysisConfig {
        AnalysisConfig {
            decimation: 1,
            ..AnalysisConfig::default()
        }
    }

    #[test]
    fn test_summarize_gap_positions() {
        let ts = [0.0, 0.1, 0.3, 0.4];
        let timeline = analyze_timestamps(&ts, 10.0, &cfg1()).unwrap();
        let summary = summarize("cam0", 10.0, &timeline);

        assert_eq!(summary.samples, 4);
        assert_eq!(summary.first_id, 0);
        assert_eq!(summary.last_id, 4);
        assert_eq!(summary.total_lost, 1);
        assert_eq!(
            summary.gaps,
            vec![GapEntry {
                position: 1,
                first_missing_id: 2,
                lost: 1
            }]
        );
    }

    #[test]
    fn test_summary_serde_roundtrip() {
        let ts = [0.0, 0.1, 0.3, 0.4];
        let timeline = analyze_timestamps(&ts, 10.0, &cfg1()).unwrap();
        let summary = summarize("cam0", 10.0, &timeline);

        let json = serde_json::to_string(&summary).expect("serialize failed");
        let restored: SensorSummary = serde_json::from_str(&json).expect("deserialize failed");

        assert_eq!(restored.sensor, "cam0");
        assert_eq!(restored.gaps, summary.gaps);
        assert_eq!(restored.total_lost, 1);
        assert!((restored.period - summary.period).abs() < f64::EPSILON);
    }

    #[test]
    fn test_lost_frame_times_single_gap() {
        let ts = [0.0, 0.1, 0.3, 0.4];
        let timeline = analyze_timestamps(&ts, 10.0, &cfg1()).unwrap();
        let lost = lost_frame_times(&timeline, &ts);

        assert_eq!(lost.len(), 1);
        assert_eq!(lost[0].id, 2);
        // Midway between the bounding raw timestamps.
        assert!((lost[0].time - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_lost_frame_times_even_spread() {
        // Three consecutive frames missing: interpolated times sit at the
        // quarter points of the bounding interval.
        let mut ts: Vec<f64> = (0..40).map(|i| i as f64 * 0.1).collect();
        ts.drain(10..13);
        let timeline = analyze_timestamps(
            &ts,
            10.0,
            &AnalysisConfig {
                decimation: 5,
                ..AnalysisConfig::default()
            },
        )
        .unwrap();

        let lost = lost_frame_times(&timeline, &ts);
        assert_eq!(lost.len(), 3);
        let times: Vec<f64> = lost.iter().map(|l| l.time).collect();
        for (time, expected) in times.iter().zip([1.0, 1.1, 1.2]) {
            assert!((time - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn test_no_gaps_no_lost_frames() {
        let ts = [0.0, 0.1, 0.2, 0.3, 0.4];
        let timeline = analyze_timestamps(&ts, 10.0, &cfg1()).unwrap();
        assert!(lost_frame_times(&timeline, &ts).is_empty());
    }
}
