pub mod application;
pub mod discovery;
pub mod domain;
pub mod driver;
pub mod error;
pub mod grpc;
pub mod guardrails;
pub mod handlers;
pub mod reasoning;
pub mod session;
pub mod webserver;
