//! Per-run reporting: stage timings, variants used, and degradation.
//!
//! The pipeline crate is sans-IO and does no logging of its own;
//! instead every run accumulates a [`RunReport`] that callers (the
//! task queue, the CLI) can log or display. A completed run with
//! skipped stages is still a success -- the report is where that
//! degradation is visible.
//!
//! Durations are serialized as fractional seconds (`f64`) since
//! `std::time::Duration` does not implement serde traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::stage::StageKind;

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// What happened to one stage during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageDisposition {
    /// The stage ran and its output replaced the working buffer.
    Applied {
        /// Human-readable variant label when the stage has fallback
        /// implementations (e.g. "luminance denoise"); `None` for
        /// single-implementation stages.
        variant: Option<String>,
    },
    /// The stage failed recoverably; the pre-stage buffer was kept.
    Skipped {
        /// The stage error, rendered to text.
        reason: String,
    },
}

/// Timing and outcome for one executed (or skipped) stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    /// Which stage.
    pub stage: StageKind,
    /// Wall-clock duration of the stage attempt.
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Applied or skipped.
    pub disposition: StageDisposition,
}

/// Accumulated record of one restoration run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    /// One record per enabled stage, in execution order.
    pub stages: Vec<StageRecord>,
    /// The caller asked for super-resolution, which no filter chain
    /// provides; flagged rather than silently dropped.
    pub super_resolution_unavailable: bool,
    /// The output was uniformly downscaled to the maximum dimension
    /// before encoding.
    pub downscaled: bool,
    /// Total wall-clock duration from decode through encode.
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
}

impl RunReport {
    /// Stages that failed recoverably and were skipped.
    #[must_use]
    pub fn skipped_stages(&self) -> Vec<StageKind> {
        self.stages
            .iter()
            .filter(|r| matches!(r.disposition, StageDisposition::Skipped { .. }))
            .map(|r| r.stage)
            .collect()
    }

    pub(crate) fn record(
        &mut self,
        stage: StageKind,
        duration: Duration,
        disposition: StageDisposition,
    ) {
        self.stages.push(StageRecord {
            stage,
            duration,
            disposition,
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn skipped_stages_filters_applied_records() {
        let mut report = RunReport::default();
        report.record(
            StageKind::Denoise,
            Duration::from_millis(12),
            StageDisposition::Applied {
                variant: Some("luminance denoise".to_string()),
            },
        );
        report.record(
            StageKind::ScratchRepair,
            Duration::from_millis(3),
            StageDisposition::Skipped {
                reason: "filter primitive failed".to_string(),
            },
        );

        assert_eq!(report.skipped_stages(), vec![StageKind::ScratchRepair]);
    }

    #[test]
    fn report_serde_round_trip() {
        let mut report = RunReport::default();
        report.super_resolution_unavailable = true;
        report.total_duration = Duration::from_millis(1500);
        report.record(
            StageKind::Sharpen,
            Duration::from_micros(800),
            StageDisposition::Applied { variant: None },
        );

        let json = serde_json::to_string(&report).unwrap();
        let back: RunReport = serde_json::from_str(&json).unwrap();
        assert!(back.super_resolution_unavailable);
        assert_eq!(back.stages.len(), 1);
        assert_eq!(back.total_duration, Duration::from_millis(1500));
    }

    #[test]
    fn negative_duration_seconds_fail_to_deserialize() {
        let result: Result<RunReport, _> = serde_json::from_str(
            r#"{"stages":[],"super_resolution_unavailable":false,"downscaled":false,"total_duration":-1.0}"#,
        );
        assert!(result.is_err());
    }
}
