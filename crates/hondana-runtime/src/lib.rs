use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use hondana_api::transport::{HttpTransport, Transport};
use hondana_api::{
    AnyTracker, AuthRequest, TrackEntry, TrackStatus, Tracker, TrackerCredentials, TrackerKind,
    TrackerMetadata, TrackerSeries,
};
use hondana_core::config::AppConfig;
use hondana_core::storage::{KeyValueStore, SqliteStore};

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("config error: {0}")]
    Config(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("auth error: {0}")]
    Auth(String),
    #[error("sync error: {0}")]
    Sync(String),
    #[error("IO error: {0}")]
    Io(String),
}

/// A tracker as presented to the UI layer.
#[derive(Debug, Clone, Serialize)]
pub struct TrackerStatusDto {
    pub kind: TrackerKind,
    pub metadata: &'static TrackerMetadata,
    pub authenticated: bool,
    pub username: Option<String>,
}

/// Result of pushing reading progress to one tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SyncOutcome {
    Updated { progress: u32 },
    /// The tracker already had this chapter or a later one.
    AlreadyCurrent { progress: u32 },
    NotLoggedIn,
    Failed,
}

fn token_key(kind: TrackerKind) -> String {
    format!("tracker.{}.token", kind.key())
}

fn username_key(kind: TrackerKind) -> String {
    format!("tracker.{}.username", kind.key())
}

fn link_prefix(local_series_id: &str) -> String {
    format!("series.{local_series_id}.tracker.")
}

/// Owns one adapter per tracker plus the store their sessions persist to.
///
/// Each adapter sits behind its own lock, so identity resolution and PKCE
/// state for a tracker are only touched by one operation at a time.
pub struct Runtime<T: Transport + Clone = HttpTransport> {
    store: Arc<dyn KeyValueStore>,
    trackers: HashMap<TrackerKind, Arc<Mutex<AnyTracker<T>>>>,
}

impl Runtime<HttpTransport> {
    /// Open the on-disk store and build trackers from `config`.
    pub fn open(config: &AppConfig) -> Result<Self, RuntimeError> {
        let db_path =
            AppConfig::ensure_db_path().map_err(|e| RuntimeError::Config(e.to_string()))?;
        let store =
            SqliteStore::open(&db_path).map_err(|e| RuntimeError::Storage(e.to_string()))?;

        let transport = match config.http.timeout() {
            Some(timeout) => HttpTransport::with_timeout(timeout)
                .map_err(|e| RuntimeError::Config(e.to_string()))?,
            None => HttpTransport::new(),
        };

        Self::with_parts(config, Arc::new(store), transport)
    }
}

impl<T: Transport + Clone> Runtime<T> {
    pub fn with_parts(
        config: &AppConfig,
        store: Arc<dyn KeyValueStore>,
        transport: T,
    ) -> Result<Self, RuntimeError> {
        let credentials = credentials(config);
        let mut trackers = HashMap::new();

        for kind in TrackerKind::ALL {
            let token = store
                .get(&token_key(*kind))
                .map_err(|e| RuntimeError::Storage(e.to_string()))?
                .unwrap_or_default();
            if !token.is_empty() {
                tracing::debug!(tracker = kind.id(), "restored access token");
            }
            let tracker = AnyTracker::new(*kind, &credentials, token, transport.clone());
            trackers.insert(*kind, Arc::new(Mutex::new(tracker)));
        }

        Ok(Self { store, trackers })
    }

    fn tracker(&self, kind: TrackerKind) -> Arc<Mutex<AnyTracker<T>>> {
        // Every kind is inserted in `with_parts`.
        Arc::clone(&self.trackers[&kind])
    }

    pub async fn trackers(&self) -> Result<Vec<TrackerStatusDto>, RuntimeError> {
        let mut out = Vec::with_capacity(TrackerKind::ALL.len());
        for kind in TrackerKind::ALL {
            let authenticated = !self.tracker(*kind).lock().await.access_token().is_empty();
            let username = self
                .store
                .get(&username_key(*kind))
                .map_err(|e| RuntimeError::Storage(e.to_string()))?;
            out.push(TrackerStatusDto {
                kind: *kind,
                metadata: kind.metadata(),
                authenticated,
                username,
            });
        }
        Ok(out)
    }

    /// Start a login. For authorization-code trackers the returned URL is
    /// only valid until the next `begin_login` for the same tracker.
    pub async fn begin_login(&self, kind: TrackerKind) -> AuthRequest {
        self.tracker(kind).lock().await.auth_url()
    }

    /// Finish a login with the code (or token) the provider redirected
    /// with. Persists the token and returns the resolved username.
    pub async fn complete_login(
        &self,
        kind: TrackerKind,
        code: &str,
    ) -> Result<Option<String>, RuntimeError> {
        let tracker = self.tracker(kind);
        let mut tracker = tracker.lock().await;

        let token = tracker
            .get_token(code)
            .await
            .ok_or_else(|| RuntimeError::Auth(format!("{kind} did not issue a token")))?;
        self.store
            .set(&token_key(kind), &token)
            .map_err(|e| RuntimeError::Storage(e.to_string()))?;

        let username = tracker.get_username().await;
        match &username {
            Some(name) => {
                tracing::info!(tracker = kind.id(), username = %name, "logged in");
                self.store
                    .set(&username_key(kind), name)
                    .map_err(|e| RuntimeError::Storage(e.to_string()))?;
            }
            None => tracing::warn!(tracker = kind.id(), "logged in but username lookup failed"),
        }
        Ok(username)
    }

    pub async fn logout(&self, kind: TrackerKind) -> Result<(), RuntimeError> {
        self.tracker(kind).lock().await.set_access_token(String::new());
        for key in [token_key(kind), username_key(kind)] {
            self.store
                .remove(&key)
                .map_err(|e| RuntimeError::Storage(e.to_string()))?;
        }
        tracing::info!(tracker = kind.id(), "logged out");
        Ok(())
    }

    pub async fn search(&self, kind: TrackerKind, query: &str) -> Vec<TrackerSeries> {
        self.tracker(kind).lock().await.search(query).await
    }

    pub async fn library_entry(&self, kind: TrackerKind, series_id: &str) -> Option<TrackEntry> {
        self.tracker(kind)
            .lock()
            .await
            .get_library_entry(series_id)
            .await
    }

    pub async fn update_entry(&self, kind: TrackerKind, entry: &TrackEntry) -> Option<TrackEntry> {
        self.tracker(kind)
            .lock()
            .await
            .update_library_entry(entry)
            .await
    }

    /// Remember that local series `local_series_id` is `remote_id` on `kind`.
    pub fn link_series(
        &self,
        local_series_id: &str,
        kind: TrackerKind,
        remote_id: &str,
    ) -> Result<(), RuntimeError> {
        let key = format!("{}{}", link_prefix(local_series_id), kind.key());
        self.store
            .set(&key, remote_id)
            .map_err(|e| RuntimeError::Storage(e.to_string()))
    }

    pub fn unlink_series(&self, local_series_id: &str, kind: TrackerKind) -> Result<(), RuntimeError> {
        let key = format!("{}{}", link_prefix(local_series_id), kind.key());
        self.store
            .remove(&key)
            .map_err(|e| RuntimeError::Storage(e.to_string()))
    }

    /// Tracker ids linked to a local series.
    pub fn linked_series(
        &self,
        local_series_id: &str,
    ) -> Result<Vec<(TrackerKind, String)>, RuntimeError> {
        let prefix = link_prefix(local_series_id);
        let rows = self
            .store
            .scan_prefix(&prefix)
            .map_err(|e| RuntimeError::Storage(e.to_string()))?;

        Ok(rows
            .into_iter()
            .filter_map(|(key, remote_id)| {
                let kind = TrackerKind::from_id(key.strip_prefix(&prefix)?)?;
                Some((kind, remote_id))
            })
            .collect())
    }

    /// Push "read up to `chapter`" to every tracker linked to the series.
    ///
    /// Progress only moves forward. A new or planned entry is moved to
    /// Reading.
    pub async fn send_progress(
        &self,
        local_series_id: &str,
        chapter: u32,
    ) -> Result<Vec<(TrackerKind, SyncOutcome)>, RuntimeError> {
        let mut outcomes = Vec::new();
        for (kind, remote_id) in self.linked_series(local_series_id)? {
            let outcome = self.push_progress(kind, &remote_id, chapter).await;
            tracing::debug!(
                tracker = kind.id(),
                series_id = %remote_id,
                chapter,
                ?outcome,
                "progress sync"
            );
            outcomes.push((kind, outcome));
        }
        Ok(outcomes)
    }

    async fn push_progress(&self, kind: TrackerKind, remote_id: &str, chapter: u32) -> SyncOutcome {
        let tracker = self.tracker(kind);
        let mut tracker = tracker.lock().await;
        if tracker.access_token().is_empty() {
            return SyncOutcome::NotLoggedIn;
        }

        // A failed lookup must not be read as "no entry", or a completed
        // entry would be reset to Reading.
        let existing = match tracker.fetch_entry(remote_id).await {
            Ok(existing) => existing,
            Err(e) => {
                tracing::warn!(
                    tracker = kind.id(),
                    series_id = remote_id,
                    error = %e,
                    "could not read library entry, skipping progress sync"
                );
                return SyncOutcome::Failed;
            }
        };
        if let Some(progress) = existing.as_ref().and_then(|e| e.progress) {
            if progress >= chapter {
                return SyncOutcome::AlreadyCurrent { progress };
            }
        }

        let status = match existing.as_ref().and_then(|e| e.status) {
            None | Some(TrackStatus::Planning) => Some(TrackStatus::Reading),
            Some(_) => None,
        };
        let update = TrackEntry {
            progress: Some(chapter),
            status,
            ..TrackEntry::for_series(remote_id)
        };

        match tracker.update_library_entry(&update).await {
            Some(saved) => SyncOutcome::Updated {
                progress: saved.progress.unwrap_or(chapter),
            },
            None => SyncOutcome::Failed,
        }
    }
}

fn credentials(config: &AppConfig) -> TrackerCredentials {
    TrackerCredentials {
        anilist_client_id: config.trackers.anilist.client_id.clone(),
        mal_client_id: config.trackers.mal.client_id.clone(),
        mal_redirect_uri: config
            .trackers
            .mal
            .redirect_uri
            .clone()
            .filter(|uri| !uri.is_empty()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use hondana_api::transport::mock::{form_pairs, json_body, MockTransport};
    use hondana_api::AuthFlow;
    use hondana_core::storage::MemoryStore;

    use super::*;

    fn runtime(store: Arc<MemoryStore>, mock: &MockTransport) -> Runtime<MockTransport> {
        Runtime::with_parts(&AppConfig::default(), store, mock.clone()).unwrap()
    }

    fn anilist_entry(progress: u32, status: &str) -> serde_json::Value {
        json!({
            "id": 777,
            "status": status,
            "progress": progress,
            "score": 7.0,
            "media": { "id": 456, "title": { "romaji": "Yotsuba to!" } }
        })
    }

    fn viewer() -> serde_json::Value {
        json!({
            "data": {
                "Viewer": {
                    "id": 123,
                    "name": "shiori",
                    "mediaListOptions": { "scoreFormat": "POINT_10" }
                }
            }
        })
    }

    #[tokio::test]
    async fn test_restores_tokens_from_store() {
        let store = Arc::new(MemoryStore::new());
        store.set("tracker.anilist.token", "tok").unwrap();
        store.set("tracker.anilist.username", "shiori").unwrap();

        let rt = runtime(store, &MockTransport::new());
        let trackers = rt.trackers().await.unwrap();
        assert_eq!(trackers.len(), 3);

        let anilist = trackers
            .iter()
            .find(|t| t.kind == TrackerKind::AniList)
            .unwrap();
        assert!(anilist.authenticated);
        assert_eq!(anilist.username.as_deref(), Some("shiori"));

        let mal = trackers
            .iter()
            .find(|t| t.kind == TrackerKind::MyAnimeList)
            .unwrap();
        assert!(!mal.authenticated);
    }

    #[tokio::test]
    async fn test_mal_login_persists_token_and_username() {
        let store = Arc::new(MemoryStore::new());
        let mock = MockTransport::new();
        mock.push(200, json!({ "access_token": "mal-token" }));
        mock.push(200, json!({ "id": 9, "name": "shiori" }));

        let rt = runtime(store.clone(), &mock);
        let req = rt.begin_login(TrackerKind::MyAnimeList).await;
        assert_eq!(req.flow, AuthFlow::AuthorizationCode);
        assert!(req.url.contains("redirect_uri=hondana%3A%2F%2Fauth%2Fmal"));

        let username = rt
            .complete_login(TrackerKind::MyAnimeList, "code")
            .await
            .unwrap();
        assert_eq!(username.as_deref(), Some("shiori"));
        assert_eq!(
            store.get("tracker.mal.token").unwrap().as_deref(),
            Some("mal-token")
        );
        assert_eq!(
            store.get("tracker.mal.username").unwrap().as_deref(),
            Some("shiori")
        );

        let requests = mock.requests();
        assert!(form_pairs(&requests[0]).contains(&("code".into(), "code".into())));
        assert!(requests[1]
            .headers
            .contains(&("Authorization".into(), "Bearer mal-token".into())));
    }

    #[tokio::test]
    async fn test_mal_login_without_begin_fails() {
        let store = Arc::new(MemoryStore::new());
        let mock = MockTransport::new();
        let rt = runtime(store.clone(), &mock);

        let result = rt.complete_login(TrackerKind::MyAnimeList, "code").await;
        assert!(matches!(result, Err(RuntimeError::Auth(_))));
        assert_eq!(store.get("tracker.mal.token").unwrap(), None);
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn test_logout_clears_session() {
        let store = Arc::new(MemoryStore::new());
        store.set("tracker.anilist.token", "tok").unwrap();
        store.set("tracker.anilist.username", "shiori").unwrap();
        let mock = MockTransport::new();
        let rt = runtime(store.clone(), &mock);

        rt.logout(TrackerKind::AniList).await.unwrap();
        assert_eq!(store.get("tracker.anilist.token").unwrap(), None);
        assert!(rt.search(TrackerKind::AniList, "yotsuba").await.is_empty());
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn test_links() {
        let rt = runtime(Arc::new(MemoryStore::new()), &MockTransport::new());
        rt.link_series("local-1", TrackerKind::AniList, "456").unwrap();
        rt.link_series("local-1", TrackerKind::MyAnimeList, "2").unwrap();
        rt.link_series("local-10", TrackerKind::AniList, "999").unwrap();

        let links = rt.linked_series("local-1").unwrap();
        assert_eq!(
            links,
            vec![
                (TrackerKind::AniList, "456".to_string()),
                (TrackerKind::MyAnimeList, "2".to_string()),
            ]
        );

        rt.unlink_series("local-1", TrackerKind::MyAnimeList).unwrap();
        assert_eq!(rt.linked_series("local-1").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_send_progress_skips_when_entry_lookup_fails() {
        let store = Arc::new(MemoryStore::new());
        store.set("tracker.mal.token", "tok").unwrap();
        let mock = MockTransport::new();
        let rt = runtime(store, &mock);
        rt.link_series("local-1", TrackerKind::MyAnimeList, "2").unwrap();

        mock.push(200, json!({ "id": 9, "name": "shiori" }));
        mock.push(503, json!({ "error": "unavailable" }));
        mock.push(200, json!({ "status": "reading", "num_chapters_read": 8 }));

        let outcomes = rt.send_progress("local-1", 8).await.unwrap();
        assert_eq!(outcomes, vec![(TrackerKind::MyAnimeList, SyncOutcome::Failed)]);

        // No PUT went out.
        let requests = mock.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|r| form_pairs(r).is_empty()));
    }

    #[tokio::test]
    async fn test_send_progress_creates_missing_mal_entry() {
        let store = Arc::new(MemoryStore::new());
        store.set("tracker.mal.token", "tok").unwrap();
        let mock = MockTransport::new();
        let rt = runtime(store, &mock);
        rt.link_series("local-1", TrackerKind::MyAnimeList, "2").unwrap();

        mock.push(200, json!({ "id": 9, "name": "shiori" }));
        mock.push(200, json!({ "id": 2, "title": "Yotsuba&!" }));
        mock.push(200, json!({ "status": "reading", "num_chapters_read": 3 }));

        let outcomes = rt.send_progress("local-1", 3).await.unwrap();
        assert_eq!(
            outcomes,
            vec![(TrackerKind::MyAnimeList, SyncOutcome::Updated { progress: 3 })]
        );
        let form = form_pairs(&mock.requests()[2]);
        assert!(form.contains(&("status".into(), "reading".into())));
        assert!(form.contains(&("num_chapters_read".into(), "3".into())));
    }

    #[tokio::test]
    async fn test_send_progress_only_advances() {
        let store = Arc::new(MemoryStore::new());
        store.set("tracker.anilist.token", "tok").unwrap();
        let mock = MockTransport::new();
        let rt = runtime(store, &mock);
        rt.link_series("local-1", TrackerKind::AniList, "456").unwrap();
        rt.link_series("local-1", TrackerKind::MyAnimeList, "2").unwrap();

        // Behind: remote is already at chapter 10.
        mock.push(200, viewer());
        mock.push(200, json!({ "data": { "MediaList": anilist_entry(10, "CURRENT") } }));
        let outcomes = rt.send_progress("local-1", 8).await.unwrap();
        assert_eq!(
            outcomes,
            vec![
                (TrackerKind::AniList, SyncOutcome::AlreadyCurrent { progress: 10 }),
                (TrackerKind::MyAnimeList, SyncOutcome::NotLoggedIn),
            ]
        );
        assert_eq!(mock.requests().len(), 2);

        // Ahead: fetch, fetch again for the merge, save.
        mock.push(200, json!({ "data": { "MediaList": anilist_entry(10, "PLANNING") } }));
        mock.push(200, json!({ "data": { "MediaList": anilist_entry(10, "PLANNING") } }));
        mock.push(
            200,
            json!({ "data": { "SaveMediaListEntry": anilist_entry(11, "CURRENT") } }),
        );
        let outcomes = rt.send_progress("local-1", 11).await.unwrap();
        assert_eq!(outcomes[0], (TrackerKind::AniList, SyncOutcome::Updated { progress: 11 }));

        let requests = mock.requests();
        assert_eq!(requests.len(), 5);
        let vars = &json_body(&requests[4])["variables"];
        assert_eq!(vars["progress"], 11);
        assert_eq!(vars["status"], "CURRENT");
    }
}
