//! Session driver: ramps the subscriber population and reports per-level
//! averages.

use std::sync::Arc;
use std::time::Duration;

use serde::{Serialize, Serializer};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::HarnessConfig;
use crate::error::Result;
use crate::payload::RequestSet;
use crate::round::RoundCoordinator;
use crate::worker;

/// One output row: a population size and its mean round latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LevelReport {
    /// Subscriber population this level ran with.
    pub clients: usize,
    /// Rounds averaged into the figure.
    pub rounds: usize,
    /// Mean round latency across the level's rounds.
    #[serde(rename = "average_ms", serialize_with = "duration_as_ms")]
    pub average: Duration,
}

impl LevelReport {
    /// The average rendered in milliseconds.
    #[must_use]
    pub fn average_ms(&self) -> f64 {
        self.average.as_secs_f64() * 1_000.0
    }
}

fn duration_as_ms<S: Serializer>(value: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_secs_f64() * 1_000.0)
}

/// Drives a whole benchmark session.
///
/// Owns the session: the population schedule, repeats per level, and the
/// spawning of every worker. The publisher is spawned once up front; each
/// level spawns only the subscribers it adds, staggered to avoid a
/// connection storm against the endpoint, and waits for each readiness
/// signal before any round runs, so the active population always equals
/// the level under test.
pub struct RampController {
    config: HarnessConfig,
}

impl RampController {
    /// Create a controller for `config`.
    #[must_use]
    pub fn new(config: HarnessConfig) -> Self {
        Self { config }
    }

    /// Run the session to completion.
    ///
    /// `emit` is called once per population level as soon as its aggregate is
    /// known, so results stream out while later levels still run. The full
    /// set of reports is also returned.
    ///
    /// Workers are not shut down gracefully when the schedule is exhausted;
    /// the session ends and the process exits with it.
    ///
    /// # Errors
    ///
    /// Returns the first configuration, worker or coordination error. A
    /// worker fault aborts the whole session: a broken worker invalidates
    /// the measurement in progress and there is no partial-result salvage.
    pub async fn run(self, mut emit: impl FnMut(&LevelReport)) -> Result<Vec<LevelReport>> {
        self.config.validate()?;
        let requests = Arc::new(RequestSet::from_endpoint(&self.config.endpoint));

        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (stamp_tx, stamp_rx) = mpsc::channel(1);
        let (ready_tx, ready_rx) = mpsc::channel(1);
        let (completion_tx, completion_rx) = mpsc::channel(1);
        let (fault_tx, fault_rx) = mpsc::unbounded_channel();

        worker::spawn_publisher(
            &self.config,
            Arc::clone(&requests),
            trigger_rx,
            stamp_tx,
            fault_tx.clone(),
        );

        let mut coordinator = RoundCoordinator::new(
            trigger_tx,
            stamp_rx,
            ready_rx,
            completion_rx,
            fault_rx,
            self.config.mode,
            self.config.pacing,
            self.config.deadline,
        );

        let mut reports = Vec::new();
        let mut active = 0usize;

        for level in self.config.schedule.levels() {
            while active < level {
                active += 1;
                tokio::time::sleep(self.config.stagger).await;
                worker::spawn_subscriber(
                    active,
                    &self.config,
                    Arc::clone(&requests),
                    ready_tx.clone(),
                    completion_tx.clone(),
                    fault_tx.clone(),
                );
                coordinator.await_ready().await?;
                debug!(active, "subscriber ready");
            }

            info!(
                clients = level,
                repeats = self.config.repeats,
                mode = %self.config.mode,
                "running level"
            );
            let mut total = Duration::ZERO;
            for _ in 0..self.config.repeats {
                total += coordinator.run_round(level).await?;
            }

            let report = LevelReport {
                clients: level,
                rounds: self.config.repeats,
                average: total / self.config.repeats as u32,
            };
            emit(&report);
            reports.push(report);
        }

        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_report_average_ms() {
        let report = LevelReport {
            clients: 4,
            rounds: 10,
            average: Duration::from_micros(1_500),
        };
        assert!((report.average_ms() - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_level_report_json_shape() {
        let report = LevelReport {
            clients: 4,
            rounds: 10,
            average: Duration::from_millis(2),
        };
        let json = serde_json::to_string(&report).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["clients"], 4);
        assert_eq!(value["rounds"], 10);
        assert_eq!(value["average_ms"], 2.0);
    }
}
