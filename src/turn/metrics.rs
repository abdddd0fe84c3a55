//! Running averages of per-turn stage latencies.

use serde::Serialize;
use std::time::Duration;

/// Time spent in each stage of one turn. Stages that did not run are zero.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StageTimes {
    pub stt: Duration,
    pub agent: Duration,
    pub tts: Duration,
    pub total: Duration,
}

/// Snapshot of the accumulated metrics. Times are in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TurnMetricsState {
    pub total_turns: u64,
    pub avg_stt_time: f64,
    pub avg_agent_time: f64,
    pub avg_tts_time: f64,
    pub avg_total_time: f64,
    pub errors: u64,
}

/// Accumulator owned by the engine.
///
/// `record` takes `&mut self`; turns are sequential so no locking is needed.
#[derive(Debug, Default)]
pub struct TurnMetrics {
    state: TurnMetricsState,
}

impl TurnMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one finished turn into the averages.
    pub fn record(&mut self, times: &StageTimes) {
        let n = self.state.total_turns as f64;
        let update = |avg: f64, sample: Duration| (avg * n + sample.as_secs_f64()) / (n + 1.0);

        self.state.avg_stt_time = update(self.state.avg_stt_time, times.stt);
        self.state.avg_agent_time = update(self.state.avg_agent_time, times.agent);
        self.state.avg_tts_time = update(self.state.avg_tts_time, times.tts);
        self.state.avg_total_time = update(self.state.avg_total_time, times.total);
        self.state.total_turns += 1;
    }

    pub fn record_error(&mut self) {
        self.state.errors += 1;
    }

    pub fn snapshot(&self) -> TurnMetricsState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    #[test]
    fn starts_empty() {
        assert_eq!(TurnMetrics::new().snapshot(), TurnMetricsState::default());
    }

    #[test]
    fn averages_are_the_mean_of_samples() {
        let mut metrics = TurnMetrics::new();
        let totals = [1.0, 2.5, 0.5, 4.0];
        for &t in &totals {
            metrics.record(&StageTimes {
                agent: secs(t / 2.0),
                total: secs(t),
                ..StageTimes::default()
            });
        }

        let snapshot = metrics.snapshot();
        let mean = totals.iter().sum::<f64>() / totals.len() as f64;
        assert_eq!(snapshot.total_turns, 4);
        assert!((snapshot.avg_total_time - mean).abs() < 1e-9);
        assert!((snapshot.avg_agent_time - mean / 2.0).abs() < 1e-9);
        assert_eq!(snapshot.avg_stt_time, 0.0);
        assert_eq!(snapshot.avg_tts_time, 0.0);
    }

    #[test]
    fn errors_do_not_touch_turn_count() {
        let mut metrics = TurnMetrics::new();
        metrics.record_error();
        metrics.record_error();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.errors, 2);
        assert_eq!(snapshot.total_turns, 0);
    }

    #[test]
    fn snapshot_serializes() {
        let mut metrics = TurnMetrics::new();
        metrics.record(&StageTimes {
            total: secs(1.5),
            ..StageTimes::default()
        });
        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["total_turns"], 1);
        assert_eq!(json["avg_total_time"], 1.5);
    }
}
