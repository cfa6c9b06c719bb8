// src/report.rs - Reporting boundary and session aggregate
use crate::compare::Score;
use serde::Serialize;

/// Receives per-frame scores and calibration outcomes.
pub trait ScoreSink {
    fn report_score(&mut self, timestamp: f64, score: &Score);

    fn report_calibration(&mut self, passed: bool);

    /// Called once when a running session faults on the camera.
    fn report_fault(&mut self, message: &str);
}

/// Logs everything through `tracing`.
#[derive(Debug, Default)]
pub struct TracingSink;

impl ScoreSink for TracingSink {
    fn report_score(&mut self, timestamp: f64, score: &Score) {
        match score {
            Score::Value(s) => tracing::info!(
                timestamp,
                error = s.error,
                matched = s.matched,
                unmatched = s.unmatched,
                "frame scored"
            ),
            Score::NoData => tracing::info!(timestamp, "no data"),
        }
    }

    fn report_calibration(&mut self, passed: bool) {
        if passed {
            tracing::info!("calibration passed");
        } else {
            tracing::warn!("calibration failed");
        }
    }

    fn report_fault(&mut self, message: &str) {
        tracing::error!(%message, "session faulted");
    }
}

/// Keeps everything in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub scores: Vec<(f64, Score)>,
    pub calibrations: Vec<bool>,
    pub faults: Vec<String>,
}

impl ScoreSink for CollectingSink {
    fn report_score(&mut self, timestamp: f64, score: &Score) {
        self.scores.push((timestamp, *score));
    }

    fn report_calibration(&mut self, passed: bool) {
        self.calibrations.push(passed);
    }

    fn report_fault(&mut self, message: &str) {
        self.faults.push(message.to_string());
    }
}

/// Running aggregate over a session's frames.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionSummary {
    pub reference: String,
    pub state: String,
    pub frames: usize,
    pub scored_frames: usize,
    pub no_data_frames: usize,
    /// Mean error over scored frames; absent when nothing was scored.
    pub mean_error: Option<f64>,
    pub best_error: Option<f64>,
    pub worst_error: Option<f64>,
    pub fault: Option<String>,
    #[serde(skip)]
    error_sum: f64,
}

impl SessionSummary {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            ..Self::default()
        }
    }

    pub fn record(&mut self, score: &Score) {
        self.frames += 1;
        match score.error() {
            Some(error) => {
                self.scored_frames += 1;
                self.error_sum += error;
                self.mean_error = Some(self.error_sum / self.scored_frames as f64);
                self.best_error = Some(self.best_error.map_or(error, |b| b.min(error)));
                self.worst_error = Some(self.worst_error.map_or(error, |w| w.max(error)));
            }
            None => self.no_data_frames += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::FrameScore;

    fn value(error: f64) -> Score {
        Score::Value(FrameScore {
            error,
            matched: 10,
            unmatched: 0,
        })
    }

    #[test]
    fn test_summary_aggregates_scored_frames_only() {
        let mut summary = SessionSummary::new("ref");
        summary.record(&value(0.2));
        summary.record(&Score::NoData);
        summary.record(&value(0.4));
        summary.record(&value(0.0));

        assert_eq!(summary.frames, 4);
        assert_eq!(summary.scored_frames, 3);
        assert_eq!(summary.no_data_frames, 1);
        assert!((summary.mean_error.unwrap() - 0.2).abs() < 1e-12);
        assert_eq!(summary.best_error, Some(0.0));
        assert_eq!(summary.worst_error, Some(0.4));
    }

    #[test]
    fn test_summary_without_scores_has_no_mean() {
        let mut summary = SessionSummary::new("ref");
        summary.record(&Score::NoData);
        assert_eq!(summary.mean_error, None);
        assert_eq!(summary.best_error, None);

        let json = serde_json::to_value(&summary).unwrap();
        assert!(json["mean_error"].is_null());
        assert!(json.get("error_sum").is_none());
    }

    #[test]
    fn test_collecting_sink_keeps_order() {
        let mut sink = CollectingSink::default();
        sink.report_score(0.1, &value(1.0));
        sink.report_score(0.2, &Score::NoData);
        sink.report_calibration(true);
        assert_eq!(sink.scores.len(), 2);
        assert!(sink.scores[1].1.is_no_data());
        assert_eq!(sink.calibrations, vec![true]);
    }
}
