//! # fanbench - Fan-out Latency Benchmark Harness
//!
//! `fanbench` measures publish-to-receipt latency against a publish/subscribe
//! messaging endpoint reached over a persistent, message-framed connection.
//!
//! ## How a session runs
//!
//! - One publisher connection and a ramping population of subscriber
//!   connections, one tokio task per connection.
//! - Each measurement round: trigger the publisher, take the wire-send
//!   timestamp, collect exactly one completion signal per active subscriber,
//!   aggregate (tail or average), repeat.
//! - One output row per population level: `<clients> <average latency>`.
//!
//! All coordination runs over channels consumed by a single coordinator
//! loop; there is no shared mutable state and no locking. Everything that
//! varies between endpoint versions and test setups (token field order,
//! payload field names, ramp strategy, aggregation mode, ack counts) is
//! configuration rather than code.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fanbench::{EndpointConfig, HarnessConfig, RampController, RampStrategy};
//!
//! let endpoint = EndpointConfig::new("127.0.0.1:9000", "project", "secret");
//! let config = HarnessConfig::new(endpoint)
//!     .with_schedule(RampStrategy::Linear { max: 10, step: 2 })
//!     .with_repeats(50);
//! let reports = RampController::new(config)
//!     .run(|row| println!("{} {:.3}", row.clients, row.average_ms()))
//!     .await?;
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod payload;
pub mod ramp;
pub mod round;
pub mod token;
pub mod worker;
pub mod ws;

pub use config::{AggregationMode, EndpointConfig, HarnessConfig, RampStrategy};
pub use connection::{Connection, Role, WorkerState};
pub use error::{Error, Result};
pub use payload::{RequestSet, WireSchema};
pub use ramp::{LevelReport, RampController};
pub use round::{RoundAccumulator, RoundCoordinator};
pub use token::{FieldOrder, compute_token};
pub use worker::WorkerFault;

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn test_public_types_are_send() {
        assert_send::<Error>();
        assert_send::<HarnessConfig>();
        assert_send::<EndpointConfig>();
        assert_send::<RampStrategy>();
        assert_send::<AggregationMode>();
        assert_send::<WireSchema>();
        assert_send::<RequestSet>();
        assert_send::<Role>();
        assert_send::<WorkerState>();
        assert_send::<WorkerFault>();
        assert_send::<LevelReport>();
    }

    #[test]
    fn test_public_types_are_sync() {
        assert_sync::<Error>();
        assert_sync::<HarnessConfig>();
        assert_sync::<RequestSet>();
        assert_sync::<Role>();
        assert_sync::<WorkerState>();
        assert_sync::<LevelReport>();
    }
}
