pub mod cleanup;
pub mod tracing;

pub use tracing::{tracing_subscribe, tracing_subscribe_default};
