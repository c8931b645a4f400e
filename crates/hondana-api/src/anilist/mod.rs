pub mod client;
pub mod error;
pub mod types;

pub use client::{AniListClient, METADATA};
pub use error::AniListError;
