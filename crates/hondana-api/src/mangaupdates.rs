//! MangaUpdates placeholder.
//!
//! Registered so the tracker list is complete, but it has no API
//! integration: it cannot log in and every operation returns the empty
//! sentinel.

use crate::traits::{
    AuthFlow, AuthRequest, TrackEntry, Tracker, TrackerMetadata, TrackerSeries,
};

pub static METADATA: TrackerMetadata = TrackerMetadata {
    id: "MangaUpdates",
    display_name: "MangaUpdates",
    homepage_url: "https://www.mangaupdates.com",
    supports_custom_lists: true,
};

#[derive(Debug, Default)]
pub struct MangaUpdatesClient {
    access_token: String,
}

impl MangaUpdatesClient {
    pub fn new(access_token: String) -> Self {
        Self { access_token }
    }
}

fn unsupported(operation: &str) {
    tracing::debug!(tracker = METADATA.id, operation, "not supported");
}

impl Tracker for MangaUpdatesClient {
    fn metadata(&self) -> &'static TrackerMetadata {
        &METADATA
    }

    fn access_token(&self) -> &str {
        &self.access_token
    }

    fn set_access_token(&mut self, token: String) {
        self.access_token = token;
    }

    fn auth_url(&mut self) -> AuthRequest {
        AuthRequest {
            url: METADATA.homepage_url.to_string(),
            flow: AuthFlow::Unsupported,
        }
    }

    async fn get_token(&mut self, _code: &str) -> Option<String> {
        unsupported("get_token");
        None
    }

    async fn get_username(&mut self) -> Option<String> {
        unsupported("get_username");
        None
    }

    async fn search(&self, _query: &str) -> Vec<TrackerSeries> {
        unsupported("search");
        Vec::new()
    }

    async fn get_library_entry(&mut self, _series_id: &str) -> Option<TrackEntry> {
        unsupported("get_library_entry");
        None
    }

    async fn add_library_entry(&mut self, _entry: &TrackEntry) -> Option<TrackEntry> {
        unsupported("add_library_entry");
        None
    }

    async fn update_library_entry(&mut self, _entry: &TrackEntry) -> Option<TrackEntry> {
        unsupported("update_library_entry");
        None
    }
}
