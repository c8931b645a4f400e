use thiserror::Error;

use crate::transport::TransportError;

/// Errors from the AniList GraphQL client.
#[derive(Debug, Error)]
pub enum AniListError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("GraphQL error: {0}")]
    GraphQl(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("not authenticated")]
    Unauthenticated,

    #[error("could not resolve the authenticated user")]
    UnknownUser,
}
