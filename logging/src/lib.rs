pub mod tee_client;
pub mod tee_middleware;

pub use tee_client::new_client;
