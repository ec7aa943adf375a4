//! Test harness: an in-process publish/subscribe endpoint speaking the wire
//! contract the benchmark drives.

mod hub;

pub use hub::{HubOptions, MockHub};
