//! Worker connections to the messaging endpoint.

mod conn;
mod role;
mod state;

pub use conn::Connection;
pub use role::Role;
pub use state::WorkerState;
