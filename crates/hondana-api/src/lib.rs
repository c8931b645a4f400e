//! Reading-progress tracker clients.
//!
//! Every service implements [`traits::Tracker`]; [`registry`] picks one by
//! identifier.

pub mod anilist;
pub mod mal;
pub mod mangaupdates;
pub mod registry;
pub mod traits;
pub mod transport;

pub use registry::{AnyTracker, TrackerCredentials, TrackerError, TrackerKind};
pub use traits::{
    AuthFlow, AuthRequest, TrackEntry, TrackScoreFormat, TrackStatus, Tracker, TrackerMetadata,
    TrackerSeries,
};
