//! Tracker selection by identifier.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::anilist::{self, AniListClient, AniListError};
use crate::mal::{self, MalClient, MalError};
use crate::mangaupdates::{self, MangaUpdatesClient};
use crate::traits::{AuthRequest, TrackEntry, Tracker, TrackerMetadata, TrackerSeries};
use crate::transport::{HttpTransport, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackerKind {
    AniList,
    MyAnimeList,
    MangaUpdates,
}

impl TrackerKind {
    pub const ALL: &[TrackerKind] = &[Self::AniList, Self::MyAnimeList, Self::MangaUpdates];

    pub fn metadata(self) -> &'static TrackerMetadata {
        match self {
            Self::AniList => &anilist::METADATA,
            Self::MyAnimeList => &mal::METADATA,
            Self::MangaUpdates => &mangaupdates::METADATA,
        }
    }

    /// Stable identifier shown to users, e.g. `"MyAnimeList"`.
    pub fn id(self) -> &'static str {
        self.metadata().id
    }

    /// Short lowercase key used for config sections and storage keys.
    pub fn key(self) -> &'static str {
        match self {
            Self::AniList => "anilist",
            Self::MyAnimeList => "mal",
            Self::MangaUpdates => "mangaupdates",
        }
    }

    /// Resolve either the id or the short key, ignoring case.
    pub fn from_id(s: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.id().eq_ignore_ascii_case(s) || k.key().eq_ignore_ascii_case(s))
    }
}

impl FromStr for TrackerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_id(s).ok_or_else(|| format!("unknown tracker: {s}"))
    }
}

impl std::fmt::Display for TrackerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.metadata().display_name)
    }
}

/// Application credentials needed to build the adapters.
#[derive(Debug, Clone, Default)]
pub struct TrackerCredentials {
    pub anilist_client_id: String,
    pub mal_client_id: String,
    pub mal_redirect_uri: Option<String>,
}

/// Failure of a fallible operation on an [`AnyTracker`].
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error(transparent)]
    AniList(#[from] AniListError),

    #[error(transparent)]
    Mal(#[from] MalError),

    #[error("{0} has no API integration")]
    Unsupported(&'static str),
}

/// Any registered tracker, dispatched by kind.
pub enum AnyTracker<T: Transport = HttpTransport> {
    AniList(AniListClient<T>),
    MyAnimeList(MalClient<T>),
    MangaUpdates(MangaUpdatesClient),
}

impl<T: Transport> AnyTracker<T> {
    pub fn new(
        kind: TrackerKind,
        credentials: &TrackerCredentials,
        access_token: String,
        transport: T,
    ) -> Self {
        match kind {
            TrackerKind::AniList => Self::AniList(AniListClient::with_transport(
                credentials.anilist_client_id.clone(),
                access_token,
                transport,
            )),
            TrackerKind::MyAnimeList => Self::MyAnimeList(MalClient::with_transport(
                credentials.mal_client_id.clone(),
                credentials.mal_redirect_uri.clone(),
                access_token,
                transport,
            )),
            TrackerKind::MangaUpdates => Self::MangaUpdates(MangaUpdatesClient::new(access_token)),
        }
    }

    pub fn kind(&self) -> TrackerKind {
        match self {
            Self::AniList(_) => TrackerKind::AniList,
            Self::MyAnimeList(_) => TrackerKind::MyAnimeList,
            Self::MangaUpdates(_) => TrackerKind::MangaUpdates,
        }
    }

    /// Like [`Tracker::get_library_entry`], but tells "no entry" (`Ok(None)`)
    /// apart from a failed lookup.
    pub async fn fetch_entry(
        &mut self,
        series_id: &str,
    ) -> Result<Option<TrackEntry>, TrackerError> {
        match self {
            Self::AniList(c) => Ok(c.fetch_entry(series_id).await?),
            Self::MyAnimeList(c) => Ok(c.fetch_entry(series_id).await?),
            Self::MangaUpdates(_) => Err(TrackerError::Unsupported(mangaupdates::METADATA.id)),
        }
    }
}

impl<T: Transport> Tracker for AnyTracker<T> {
    fn metadata(&self) -> &'static TrackerMetadata {
        self.kind().metadata()
    }

    fn access_token(&self) -> &str {
        match self {
            Self::AniList(c) => c.access_token(),
            Self::MyAnimeList(c) => c.access_token(),
            Self::MangaUpdates(c) => c.access_token(),
        }
    }

    fn set_access_token(&mut self, token: String) {
        match self {
            Self::AniList(c) => c.set_access_token(token),
            Self::MyAnimeList(c) => c.set_access_token(token),
            Self::MangaUpdates(c) => c.set_access_token(token),
        }
    }

    fn auth_url(&mut self) -> AuthRequest {
        match self {
            Self::AniList(c) => c.auth_url(),
            Self::MyAnimeList(c) => c.auth_url(),
            Self::MangaUpdates(c) => c.auth_url(),
        }
    }

    async fn get_token(&mut self, code: &str) -> Option<String> {
        match self {
            Self::AniList(c) => c.get_token(code).await,
            Self::MyAnimeList(c) => c.get_token(code).await,
            Self::MangaUpdates(c) => c.get_token(code).await,
        }
    }

    async fn get_username(&mut self) -> Option<String> {
        match self {
            Self::AniList(c) => c.get_username().await,
            Self::MyAnimeList(c) => c.get_username().await,
            Self::MangaUpdates(c) => c.get_username().await,
        }
    }

    async fn search(&self, query: &str) -> Vec<TrackerSeries> {
        match self {
            Self::AniList(c) => c.search(query).await,
            Self::MyAnimeList(c) => c.search(query).await,
            Self::MangaUpdates(c) => c.search(query).await,
        }
    }

    async fn get_library_entry(&mut self, series_id: &str) -> Option<TrackEntry> {
        match self {
            Self::AniList(c) => c.get_library_entry(series_id).await,
            Self::MyAnimeList(c) => c.get_library_entry(series_id).await,
            Self::MangaUpdates(c) => c.get_library_entry(series_id).await,
        }
    }

    async fn add_library_entry(&mut self, entry: &TrackEntry) -> Option<TrackEntry> {
        match self {
            Self::AniList(c) => c.add_library_entry(entry).await,
            Self::MyAnimeList(c) => c.add_library_entry(entry).await,
            Self::MangaUpdates(c) => c.add_library_entry(entry).await,
        }
    }

    async fn update_library_entry(&mut self, entry: &TrackEntry) -> Option<TrackEntry> {
        match self {
            Self::AniList(c) => c.update_library_entry(entry).await,
            Self::MyAnimeList(c) => c.update_library_entry(entry).await,
            Self::MangaUpdates(c) => c.update_library_entry(entry).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::AuthFlow;
    use crate::transport::mock::MockTransport;

    #[test]
    fn test_kind_lookup() {
        for kind in TrackerKind::ALL {
            assert_eq!(TrackerKind::from_id(kind.id()), Some(*kind));
            assert_eq!(TrackerKind::from_id(kind.key()), Some(*kind));
        }
        assert_eq!(TrackerKind::from_id("ANILIST"), Some(TrackerKind::AniList));
        assert_eq!("mal".parse::<TrackerKind>(), Ok(TrackerKind::MyAnimeList));
        assert!("kitsu".parse::<TrackerKind>().is_err());
    }

    #[test]
    fn test_only_mangaupdates_has_custom_lists() {
        let with_lists: Vec<_> = TrackerKind::ALL
            .iter()
            .filter(|k| k.metadata().supports_custom_lists)
            .collect();
        assert_eq!(with_lists, vec![&TrackerKind::MangaUpdates]);
    }

    #[test]
    fn test_any_tracker_dispatch() {
        let credentials = TrackerCredentials {
            anilist_client_id: "5631".into(),
            mal_client_id: "client".into(),
            mal_redirect_uri: None,
        };
        let mut mal = AnyTracker::new(
            TrackerKind::MyAnimeList,
            &credentials,
            String::new(),
            MockTransport::new(),
        );
        assert_eq!(mal.kind(), TrackerKind::MyAnimeList);
        assert_eq!(mal.metadata().id, "MyAnimeList");
        assert_eq!(mal.auth_url().flow, AuthFlow::AuthorizationCode);

        let mut anilist = AnyTracker::new(
            TrackerKind::AniList,
            &credentials,
            "tok".into(),
            MockTransport::new(),
        );
        assert_eq!(anilist.access_token(), "tok");
        assert_eq!(anilist.auth_url().flow, AuthFlow::Implicit);
    }

    #[tokio::test]
    async fn test_fetch_entry_separates_failure_from_absence() {
        let credentials = TrackerCredentials::default();
        let mock = MockTransport::new();
        mock.push(200, serde_json::json!({ "id": 9, "name": "shiori" }));
        mock.push(503, serde_json::json!({ "error": "unavailable" }));
        mock.push(200, serde_json::json!({ "id": 2, "title": "Yotsuba&!" }));

        let mut mal = AnyTracker::new(TrackerKind::MyAnimeList, &credentials, "tok".into(), mock);
        assert!(matches!(
            mal.fetch_entry("2").await,
            Err(TrackerError::Mal(MalError::Api { status: 503, .. }))
        ));
        assert!(matches!(mal.fetch_entry("2").await, Ok(None)));

        let mut stub = AnyTracker::new(
            TrackerKind::MangaUpdates,
            &credentials,
            "tok".into(),
            MockTransport::new(),
        );
        assert!(matches!(
            stub.fetch_entry("1").await,
            Err(TrackerError::Unsupported("MangaUpdates"))
        ));
    }

    #[tokio::test]
    async fn test_every_tracker_search_empty_when_logged_out() {
        let credentials = TrackerCredentials::default();
        for kind in TrackerKind::ALL {
            let tracker = AnyTracker::new(*kind, &credentials, String::new(), MockTransport::new());
            assert!(tracker.search("yotsuba").await.is_empty());
            assert!(tracker.search("").await.is_empty());
        }
    }
}
