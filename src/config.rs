//! Harness configuration.
//!
//! Everything that varies between endpoint versions and test setups (token
//! field order, payload schema, ramp strategy, aggregation mode, ack count,
//! pacing) lives here as one parameterized configuration.

use std::time::Duration;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::payload::WireSchema;
use crate::token::{FieldOrder, compute_token};

/// How a round's completion times collapse into one number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AggregationMode {
    /// Keep only the slowest (last) completion of the round: tail latency.
    Tail,
    /// Average every completion's elapsed time: mean fan-out latency.
    #[default]
    Average,
}

impl std::fmt::Display for AggregationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AggregationMode::Tail => write!(f, "tail"),
            AggregationMode::Average => write!(f, "average"),
        }
    }
}

/// Schedule of subscriber population sizes to test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampStrategy {
    /// A single population level.
    Fixed {
        /// Number of subscribers.
        clients: usize,
    },
    /// Grow in `step` increments. One-at-a-time ramping is `step: 1`.
    Linear {
        /// Largest population to test.
        max: usize,
        /// Increment between levels.
        step: usize,
    },
}

impl RampStrategy {
    /// Population sizes tested, in order.
    ///
    /// The sequence is strictly increasing and always ends exactly at the
    /// configured maximum; when the step does not divide the maximum, a
    /// final partial step is appended so the maximum is still tested.
    #[must_use]
    pub fn levels(&self) -> Vec<usize> {
        match *self {
            RampStrategy::Fixed { clients } => vec![clients],
            RampStrategy::Linear { max, step } => {
                if step == 0 || max == 0 {
                    return Vec::new();
                }
                let mut levels: Vec<usize> = (step..=max).step_by(step).collect();
                if levels.last() != Some(&max) {
                    levels.push(max);
                }
                levels
            }
        }
    }

    /// Largest population the schedule reaches.
    #[must_use]
    pub fn max_clients(&self) -> usize {
        match *self {
            RampStrategy::Fixed { clients } => clients,
            RampStrategy::Linear { max, .. } => max,
        }
    }
}

/// Everything needed to talk to one endpoint.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Endpoint address, `host:port`.
    pub address: String,
    /// Request path for the transport upgrade.
    pub path: String,
    /// Origin header value.
    pub origin: String,
    /// Project identifier.
    pub project: String,
    /// Shared secret the token is derived from.
    pub secret: String,
    /// User identifier.
    pub user: String,
    /// Namespace to subscribe and publish in.
    pub namespace: String,
    /// Channel to subscribe and publish to.
    pub channel: String,
    /// Order of subject fields in the token digest.
    pub token_order: FieldOrder,
    /// Token timestamp; included in the digest and connect request when set.
    pub token_timestamp: Option<String>,
    /// Wire field names for the endpoint version in use.
    pub schema: WireSchema,
    /// Body of every published message.
    pub payload: Value,
}

impl EndpointConfig {
    /// Create a config for `address` with the classic defaults.
    #[must_use]
    pub fn new(
        address: impl Into<String>,
        project: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            path: "/".into(),
            origin: "http://localhost/".into(),
            project: project.into(),
            secret: secret.into(),
            user: "bench".into(),
            namespace: "test".into(),
            channel: "test".into(),
            token_order: FieldOrder::default(),
            token_timestamp: None,
            schema: WireSchema::default(),
            payload: serde_json::json!({ "input": "fan-out latency probe" }),
        }
    }

    /// Derive the authentication token for this endpoint.
    #[must_use]
    pub fn auth_token(&self) -> String {
        compute_token(
            &self.secret,
            &self.project,
            &self.user,
            self.token_timestamp.as_deref(),
            self.token_order,
        )
    }
}

/// Full harness configuration for one session.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Endpoint parameters.
    pub endpoint: EndpointConfig,
    /// Population schedule.
    pub schedule: RampStrategy,
    /// Rounds per population level.
    pub repeats: usize,
    /// Aggregation mode within a round.
    pub mode: AggregationMode,
    /// Settle delay before every round, so rounds never overlap.
    pub pacing: Duration,
    /// Delay between subscriber spawns during ramp-up.
    pub stagger: Duration,
    /// Wait between failed dial attempts.
    pub retry_backoff: Duration,
    /// Deadline on every coordinator wait; `None` blocks forever.
    pub deadline: Option<Duration>,
    /// Acknowledgement frames the publisher drains after each publish.
    pub publish_acks: usize,
}

impl HarnessConfig {
    /// Create a configuration with the classic defaults for `endpoint`.
    #[must_use]
    pub fn new(endpoint: EndpointConfig) -> Self {
        Self {
            endpoint,
            schedule: RampStrategy::Fixed { clients: 1 },
            repeats: 100,
            mode: AggregationMode::default(),
            pacing: Duration::from_millis(100),
            stagger: Duration::from_millis(100),
            retry_backoff: Duration::from_secs(1),
            deadline: Some(Duration::from_secs(30)),
            publish_acks: 2,
        }
    }

    /// Set the population schedule.
    #[must_use]
    pub fn with_schedule(mut self, schedule: RampStrategy) -> Self {
        self.schedule = schedule;
        self
    }

    /// Set rounds per level.
    #[must_use]
    pub fn with_repeats(mut self, repeats: usize) -> Self {
        self.repeats = repeats;
        self
    }

    /// Set the aggregation mode.
    #[must_use]
    pub fn with_mode(mut self, mode: AggregationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the per-wait deadline; `None` restores unbounded blocking.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Validate the configuration before any connection is made.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when the schedule is empty, a level
    /// is zero, the step is zero, or repeats is zero.
    pub fn validate(&self) -> Result<()> {
        if self.repeats == 0 {
            return Err(Error::InvalidConfig("repeats must be at least 1".into()));
        }
        match self.schedule {
            RampStrategy::Fixed { clients } if clients == 0 => {
                return Err(Error::InvalidConfig("client count must be at least 1".into()));
            }
            RampStrategy::Linear { max, step } => {
                if step == 0 {
                    return Err(Error::InvalidConfig("ramp step must be at least 1".into()));
                }
                if max == 0 {
                    return Err(Error::InvalidConfig("ramp maximum must be at least 1".into()));
                }
            }
            RampStrategy::Fixed { .. } => {}
        }
        if self.endpoint.address.is_empty() {
            return Err(Error::InvalidConfig("endpoint address is empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn config(schedule: RampStrategy) -> HarnessConfig {
        HarnessConfig::new(EndpointConfig::new("127.0.0.1:9000", "proj", "secret"))
            .with_schedule(schedule)
    }

    #[test]
    fn test_fixed_schedule_single_level() {
        assert_eq!(RampStrategy::Fixed { clients: 7 }.levels(), vec![7]);
    }

    #[test]
    fn test_linear_schedule_even_steps() {
        let levels = RampStrategy::Linear { max: 6, step: 2 }.levels();
        assert_eq!(levels, vec![2, 4, 6]);
    }

    #[test]
    fn test_linear_schedule_one_at_a_time() {
        let levels = RampStrategy::Linear { max: 4, step: 1 }.levels();
        assert_eq!(levels, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_linear_schedule_partial_last_step() {
        let levels = RampStrategy::Linear { max: 7, step: 3 }.levels();
        assert_eq!(levels, vec![3, 6, 7]);
    }

    #[test]
    fn test_linear_schedule_step_larger_than_max() {
        let levels = RampStrategy::Linear { max: 3, step: 10 }.levels();
        assert_eq!(levels, vec![3]);
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(config(RampStrategy::Fixed { clients: 3 }).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_clients() {
        let err = config(RampStrategy::Fixed { clients: 0 }).validate().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_validate_rejects_zero_step() {
        let err = config(RampStrategy::Linear { max: 5, step: 0 }).validate().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_validate_rejects_zero_repeats() {
        let err = config(RampStrategy::Fixed { clients: 1 })
            .with_repeats(0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_auth_token_uses_configured_fields() {
        let mut endpoint = EndpointConfig::new("127.0.0.1:9000", "proj", "secret");
        let plain = endpoint.auth_token();
        endpoint.token_timestamp = Some("1700000000".into());
        assert_ne!(endpoint.auth_token(), plain);
    }

    #[test]
    fn test_default_mode_is_average() {
        assert_eq!(AggregationMode::default(), AggregationMode::Average);
    }

    proptest! {
        // The ramp is strictly increasing and always terminates at max.
        #[test]
        fn prop_linear_levels_monotonic(max in 1usize..200, step in 1usize..50) {
            let levels = RampStrategy::Linear { max, step }.levels();
            prop_assert!(!levels.is_empty());
            prop_assert_eq!(*levels.last().unwrap(), max);
            for pair in levels.windows(2) {
                prop_assert!(pair[0] < pair[1]);
            }
        }
    }
}
