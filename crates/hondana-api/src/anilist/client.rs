use serde::de::DeserializeOwned;

use super::error::AniListError;
use super::types::{
    map_anilist_score_format, map_status_to_anilist, GraphQLResponse, MediaListResponse,
    PageResponse, SaveMediaListResponse, Viewer, ViewerResponse,
};
use crate::traits::{
    AuthFlow, AuthRequest, TrackEntry, TrackScoreFormat, TrackStatus, Tracker, TrackerMetadata,
    TrackerSeries,
};
use crate::transport::{HttpRequest, HttpTransport, Method, Transport};

const API_URL: &str = "https://graphql.anilist.co/";
const AUTH_URL: &str = "https://anilist.co/api/v2/oauth/authorize";

pub static METADATA: TrackerMetadata = TrackerMetadata {
    id: "AniList",
    display_name: "AniList",
    homepage_url: "https://anilist.co",
    supports_custom_lists: false,
};

const VIEWER_QUERY: &str = r#"
query {
    Viewer {
        id
        name
        mediaListOptions { scoreFormat }
    }
}
"#;

const SEARCH_QUERY: &str = r#"
query ($search: String) {
    Page(page: 1, perPage: 10) {
        media(search: $search, type: MANGA) {
            id
            title { romaji english }
            description
            coverImage { large }
        }
    }
}
"#;

const MEDIA_LIST_QUERY: &str = r#"
query ($userId: Int, $mediaId: Int) {
    MediaList(userId: $userId, mediaId: $mediaId) {
        id
        status
        progress
        score
        media {
            id
            title { romaji english }
            description
            coverImage { large }
        }
    }
}
"#;

const ADD_LIBRARY_ENTRY_MUTATION: &str = r#"
mutation ($mediaId: Int, $status: MediaListStatus, $score: Float, $progress: Int) {
    SaveMediaListEntry(mediaId: $mediaId, status: $status, score: $score, progress: $progress) {
        id
        status
        progress
        score
        media {
            id
            title { romaji english }
            description
            coverImage { large }
        }
    }
}
"#;

const UPDATE_LIBRARY_ENTRY_MUTATION: &str = r#"
mutation ($mediaId: Int, $status: MediaListStatus, $score: Float, $progress: Int) {
    SaveMediaListEntry(mediaId: $mediaId, status: $status, score: $score, progress: $progress) {
        id
        status
        progress
        score
        media {
            id
            title { romaji english }
            description
            coverImage { large }
        }
    }
}
"#;

/// AniList GraphQL tracker.
///
/// Login uses the implicit grant: the redirect carries the access token, so
/// [`Tracker::get_token`] just adopts the value it is handed.
pub struct AniListClient<T: Transport = HttpTransport> {
    client_id: String,
    access_token: String,
    user_id: Option<u64>,
    score_format: Option<TrackScoreFormat>,
    transport: T,
}

impl AniListClient<HttpTransport> {
    pub fn new(client_id: String, access_token: String) -> Self {
        Self::with_transport(client_id, access_token, HttpTransport::new())
    }
}

impl<T: Transport> AniListClient<T> {
    pub fn with_transport(client_id: String, access_token: String, transport: T) -> Self {
        Self {
            client_id,
            access_token,
            user_id: None,
            score_format: None,
            transport,
        }
    }

    /// Score format of the authenticated user, once resolved.
    pub fn score_format(&self) -> Option<TrackScoreFormat> {
        self.score_format
    }

    async fn graphql_request<R: DeserializeOwned>(
        &self,
        operation: &str,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<R, AniListError> {
        if self.access_token.is_empty() {
            return Err(AniListError::Unauthenticated);
        }
        tracing::debug!(operation, "AniList GraphQL request");

        let request = HttpRequest::new(Method::Post, API_URL)
            .bearer(&self.access_token)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .json(serde_json::json!({
                "query": query,
                "variables": variables,
            }));
        let resp = self.transport.send(request).await?;

        // AniList reports most failures as a GraphQL `errors` array, with or
        // without a matching HTTP status.
        let envelope: Option<GraphQLResponse> = serde_json::from_str(&resp.body).ok();
        if let Some(errors) = envelope.as_ref().and_then(|e| e.errors.as_ref()) {
            if !errors.is_empty() {
                let message = errors
                    .iter()
                    .map(|e| e.message.as_str())
                    .collect::<Vec<_>>()
                    .join("; ");
                if errors.iter().any(|e| e.status == Some(404)) || resp.status == 404 {
                    return Err(AniListError::Api {
                        status: 404,
                        message,
                    });
                }
                return Err(AniListError::GraphQl(message));
            }
        }

        if !resp.is_success() {
            tracing::warn!(operation, status = resp.status, "AniList API error");
            return Err(AniListError::Api {
                status: resp.status,
                message: resp.body,
            });
        }

        tracing::debug!(operation, status = resp.status, "AniList response received");
        let data = envelope
            .and_then(|e| e.data)
            .ok_or_else(|| AniListError::Parse("response has no data".into()))?;
        serde_json::from_value(data).map_err(|e| AniListError::Parse(e.to_string()))
    }

    async fn fetch_viewer(&self) -> Result<Viewer, AniListError> {
        let resp: ViewerResponse = self
            .graphql_request("Viewer", VIEWER_QUERY, serde_json::json!({}))
            .await?;
        Ok(resp.viewer)
    }

    /// The cached user id, resolving it through the viewer query on first use.
    async fn ensure_user(&mut self) -> Result<u64, AniListError> {
        if let Some(id) = self.user_id {
            return Ok(id);
        }
        self.get_username().await;
        self.user_id.ok_or(AniListError::UnknownUser)
    }

    /// Fetch the user's entry for a series. A missing entry is `Ok(None)`;
    /// any failure, including an unresolved user, is an `Err`.
    pub async fn fetch_entry(
        &mut self,
        series_id: &str,
    ) -> Result<Option<TrackEntry>, AniListError> {
        if self.access_token.is_empty() {
            return Err(AniListError::Unauthenticated);
        }
        let user_id = self.ensure_user().await?;
        let media_id = parse_media_id(series_id)?;

        let result: Result<MediaListResponse, _> = self
            .graphql_request(
                "MediaList",
                MEDIA_LIST_QUERY,
                serde_json::json!({ "userId": user_id, "mediaId": media_id }),
            )
            .await;

        match result {
            Ok(resp) => Ok(resp
                .media_list
                .map(|e| e.into_track_entry(self.score_format))),
            Err(AniListError::Api { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn save_entry(
        &self,
        operation: &str,
        mutation: &str,
        variables: serde_json::Value,
    ) -> Result<TrackEntry, AniListError> {
        let resp: SaveMediaListResponse = self
            .graphql_request(operation, mutation, variables)
            .await?;
        resp.saved
            .map(|e| e.into_track_entry(self.score_format))
            .ok_or_else(|| AniListError::Parse("SaveMediaListEntry returned nothing".into()))
    }

    async fn create_entry(&mut self, entry: &TrackEntry) -> Result<TrackEntry, AniListError> {
        self.ensure_user().await?;
        let media_id = parse_media_id(&entry.series_id)?;
        let status = entry.status.unwrap_or(TrackStatus::Planning);

        let mut vars = serde_json::json!({
            "mediaId": media_id,
            "status": map_status_to_anilist(status),
        });
        if let Some(score) = entry.score {
            vars["score"] = serde_json::json!(score);
        }
        if let Some(progress) = entry.progress {
            vars["progress"] = serde_json::json!(progress);
        }

        self.save_entry("AddLibraryEntry", ADD_LIBRARY_ENTRY_MUTATION, vars)
            .await
    }

    async fn update_entry(&mut self, entry: &TrackEntry) -> Result<TrackEntry, AniListError> {
        let remote = match self.fetch_entry(&entry.series_id).await? {
            Some(remote) => remote,
            None => {
                tracing::debug!(
                    tracker = METADATA.id,
                    series_id = %entry.series_id,
                    "no library entry yet, creating one before updating"
                );
                self.create_entry(entry).await?;
                self.fetch_entry(&entry.series_id).await?.ok_or_else(|| {
                    AniListError::Parse("library entry missing after creation".into())
                })?
            }
        };

        let merged = entry.clone().merged_over(&remote);
        let media_id = parse_media_id(&merged.series_id)?;

        // AniList ignores null variables, so only send what is known.
        let mut vars = serde_json::json!({ "mediaId": media_id });
        if let Some(status) = merged.status {
            vars["status"] = serde_json::json!(map_status_to_anilist(status));
        }
        if let Some(score) = merged.score {
            vars["score"] = serde_json::json!(score);
        }
        if let Some(progress) = merged.progress {
            vars["progress"] = serde_json::json!(progress);
        }

        self.save_entry("UpdateLibraryEntry", UPDATE_LIBRARY_ENTRY_MUTATION, vars)
            .await
    }
}

fn parse_media_id(series_id: &str) -> Result<u64, AniListError> {
    series_id
        .parse()
        .map_err(|_| AniListError::Parse(format!("invalid AniList media id {series_id:?}")))
}

impl<T: Transport> Tracker for AniListClient<T> {
    fn metadata(&self) -> &'static TrackerMetadata {
        &METADATA
    }

    fn access_token(&self) -> &str {
        &self.access_token
    }

    fn set_access_token(&mut self, token: String) {
        self.access_token = token;
        self.user_id = None;
        self.score_format = None;
    }

    fn auth_url(&mut self) -> AuthRequest {
        AuthRequest {
            url: format!(
                "{AUTH_URL}?client_id={}&response_type=token",
                self.client_id
            ),
            flow: AuthFlow::Implicit,
        }
    }

    async fn get_token(&mut self, code: &str) -> Option<String> {
        // Implicit grant: the redirect already carried the token.
        if code.is_empty() {
            return None;
        }
        self.set_access_token(code.to_string());
        Some(code.to_string())
    }

    async fn get_username(&mut self) -> Option<String> {
        if self.access_token.is_empty() {
            return None;
        }
        match self.fetch_viewer().await {
            Ok(viewer) => {
                self.user_id = Some(viewer.id);
                self.score_format = viewer
                    .media_list_options
                    .and_then(|o| o.score_format)
                    .and_then(|f| map_anilist_score_format(&f));
                tracing::debug!(tracker = METADATA.id, user_id = viewer.id, "resolved viewer");
                Some(viewer.name)
            }
            Err(e) => {
                tracing::warn!(tracker = METADATA.id, error = %e, "failed to resolve AniList viewer");
                None
            }
        }
    }

    async fn search(&self, query: &str) -> Vec<TrackerSeries> {
        if self.access_token.is_empty() || query.trim().is_empty() {
            return Vec::new();
        }
        let result: Result<PageResponse, _> = self
            .graphql_request(
                "Search",
                SEARCH_QUERY,
                serde_json::json!({ "search": query }),
            )
            .await;

        match result {
            Ok(resp) => resp
                .page
                .media
                .into_iter()
                .map(|m| m.into_tracker_series())
                .collect(),
            Err(e) => {
                tracing::warn!(tracker = METADATA.id, query, error = %e, "AniList search failed");
                Vec::new()
            }
        }
    }

    async fn get_library_entry(&mut self, series_id: &str) -> Option<TrackEntry> {
        if self.access_token.is_empty() {
            return None;
        }
        self.fetch_entry(series_id).await.unwrap_or_else(|e| {
            tracing::warn!(
                tracker = METADATA.id,
                series_id,
                error = %e,
                "failed to get library entry"
            );
            None
        })
    }

    async fn add_library_entry(&mut self, entry: &TrackEntry) -> Option<TrackEntry> {
        if self.access_token.is_empty() {
            return None;
        }
        self.create_entry(entry)
            .await
            .map_err(|e| {
                tracing::warn!(
                    tracker = METADATA.id,
                    series_id = %entry.series_id,
                    error = %e,
                    "failed to add library entry"
                )
            })
            .ok()
    }

    async fn update_library_entry(&mut self, entry: &TrackEntry) -> Option<TrackEntry> {
        if self.access_token.is_empty() {
            return None;
        }
        self.update_entry(entry)
            .await
            .map_err(|e| {
                tracing::warn!(
                    tracker = METADATA.id,
                    series_id = %entry.series_id,
                    error = %e,
                    "failed to update library entry"
                )
            })
            .ok()
    }
}
