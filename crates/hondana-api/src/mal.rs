pub mod auth;
pub mod client;
pub mod error;
pub mod types;

pub use client::{MalClient, METADATA};
pub use error::MalError;
