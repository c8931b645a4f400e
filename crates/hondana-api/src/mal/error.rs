use thiserror::Error;

use crate::transport::TransportError;

/// Errors from the MyAnimeList API client.
#[derive(Debug, Error)]
pub enum MalError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("provider error: {0}")]
    Provider(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("not authenticated")]
    Unauthenticated,

    #[error("could not resolve the authenticated user")]
    UnknownUser,
}
