use serde::{Deserialize, Serialize};

/// Tuning knobs for the timestamp resynchronization core.
///
/// The defaults match the values the algorithm was calibrated with on
/// multi-camera lab recordings; lower `decimation` first when a sensor
/// produces too few samples for the default stride.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Decimation stride for coarse period estimation. Larger strides divide
    /// out more high-frequency jitter but require proportionally more samples.
    pub decimation: usize,
    /// Relative acceptance band around the nominal decimated period.
    /// Intervals outside the band (gaps, duplicate-compressed runs) are
    /// excluded from the period average.
    pub tolerance_band: f64,
    /// Hard cap on monotonicity-repair passes.
    pub max_repair_iterations: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            decimation: 10,            // 10x stride makes period error separable from jitter
            tolerance_band: 0.05,      // ±5% of the nominal decimated period
            max_repair_iterations: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let cfg = AnalysisConfig::default();
        assert_eq!(cfg.decimation, 10);
        assert!((cfg.tolerance_band - 0.05).abs() < f64::EPSILON);
        assert_eq!(cfg.max_repair_iterations, 100);
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let mut cfg = AnalysisConfig::default();
        cfg.decimation = 5;
        cfg.tolerance_band = 0.02;

        let json = serde_json::to_string(&cfg).expect("serialize failed");
        let restored: AnalysisConfig = serde_json::from_str(&json).expect("deserialize failed");

        assert_eq!(restored.decimation, 5);
        assert!((restored.tolerance_band - 0.02).abs() < f64::EPSILON);
        assert_eq!(restored.max_repair_iterations, 100);
    }
}
