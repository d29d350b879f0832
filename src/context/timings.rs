use std::time::{Duration, Instant};

use indexmap::IndexMap;

/// Named phase durations recorded while the pipeline runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timings {
    phases: IndexMap<String, Duration>,
}

impl Timings {
    pub fn record(&mut self, phase: &str, elapsed: Duration) {
        tracing::debug!(phase, elapsed_ms = elapsed.as_secs_f64() * 1000.0, "phase finished");
        *self.phases.entry(phase.to_string()).or_default() += elapsed;
    }

    /// Record the elapsed time since `started` under `phase`.
    pub fn record_since(&mut self, phase: &str, started: Instant) {
        self.record(phase, started.elapsed());
    }

    pub fn get(&self, phase: &str) -> Option<Duration> {
        self.phases.get(phase).copied()
    }

    /// Phase durations in milliseconds, in recording order.
    pub fn to_millis(&self) -> IndexMap<String, f64> {
        self.phases.iter().map(|(name, d)| (name.clone(), d.as_secs_f64() * 1000.0)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_phases_accumulate() {
        let mut timings = Timings::default();
        timings.record("resolve", Duration::from_millis(3));
        timings.record("resolve", Duration::from_millis(2));
        assert_eq!(timings.get("resolve"), Some(Duration::from_millis(5)));
        assert_eq!(timings.to_millis().len(), 1);
    }
}
