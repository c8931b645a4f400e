use serde::de::DeserializeOwned;
use url::form_urlencoded;

use super::auth::{self, PkcePair, TokenResponse};
use super::error::MalError;
use super::types::{map_status_to_mal, MalListStatus, MalMangaNode, MalSearchResponse, MalUser};
use crate::traits::{
    AuthFlow, AuthRequest, TrackEntry, TrackStatus, Tracker, TrackerMetadata, TrackerSeries,
};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, Method, Transport};

const BASE_URL: &str = "https://api.myanimelist.net/v2";

const SEARCH_FIELDS: &str = "id,title,synopsis,main_picture";
const ENTRY_FIELDS: &str = "id,title,synopsis,main_picture,my_list_status";

pub static METADATA: TrackerMetadata = TrackerMetadata {
    id: "MyAnimeList",
    display_name: "MyAnimeList",
    homepage_url: "https://myanimelist.net",
    supports_custom_lists: false,
};

/// MyAnimeList API v2 tracker.
///
/// Login is authorization code + PKCE: [`Tracker::auth_url`] must be called
/// on the same instance right before [`Tracker::get_token`], which consumes
/// the verifier it stored.
pub struct MalClient<T: Transport = HttpTransport> {
    client_id: String,
    redirect_uri: Option<String>,
    access_token: String,
    user_id: Option<u64>,
    pkce: Option<PkcePair>,
    transport: T,
}

impl MalClient<HttpTransport> {
    pub fn new(client_id: String, redirect_uri: Option<String>, access_token: String) -> Self {
        Self::with_transport(client_id, redirect_uri, access_token, HttpTransport::new())
    }
}

impl<T: Transport> MalClient<T> {
    pub fn with_transport(
        client_id: String,
        redirect_uri: Option<String>,
        access_token: String,
        transport: T,
    ) -> Self {
        Self {
            client_id,
            redirect_uri,
            access_token,
            user_id: None,
            pkce: None,
            transport,
        }
    }

    /// Check the HTTP response for errors and decode the body.
    ///
    /// MAL occasionally answers 2xx with an `error` field; that counts as a
    /// failure too.
    fn decode<R: DeserializeOwned>(resp: HttpResponse) -> Result<R, MalError> {
        if !resp.is_success() {
            tracing::warn!(status = resp.status, "MAL API error");
            return Err(MalError::Api {
                status: resp.status,
                message: resp.body,
            });
        }
        let value: serde_json::Value =
            serde_json::from_str(&resp.body).map_err(|e| MalError::Parse(e.to_string()))?;
        if let Some(error) = value.get("error").and_then(|e| e.as_str()) {
            let message = value
                .get("message")
                .and_then(|m| m.as_str())
                .filter(|m| !m.is_empty())
                .map(|m| format!("{error}: {m}"))
                .unwrap_or_else(|| error.to_string());
            return Err(MalError::Provider(message));
        }
        serde_json::from_value(value).map_err(|e| MalError::Parse(e.to_string()))
    }

    async fn get_json<R: DeserializeOwned>(&self, url: String) -> Result<R, MalError> {
        let request = HttpRequest::new(Method::Get, url).bearer(&self.access_token);
        let resp = self.transport.send(request).await?;
        Self::decode(resp)
    }

    async fn exchange_code(&self, code: &str, pkce: &PkcePair) -> Result<TokenResponse, MalError> {
        let request = auth::token_request(&self.client_id, code, pkce, self.redirect_uri.as_deref());
        let resp = self.transport.send(request).await?;
        Self::decode(resp)
    }

    async fn fetch_user(&self) -> Result<MalUser, MalError> {
        self.get_json(format!("{BASE_URL}/users/@me")).await
    }

    async fn ensure_user(&mut self) -> Result<u64, MalError> {
        if let Some(id) = self.user_id {
            return Ok(id);
        }
        self.get_username().await;
        self.user_id.ok_or(MalError::UnknownUser)
    }

    async fn search_raw(&self, query: &str) -> Result<Vec<TrackerSeries>, MalError> {
        let params = form_urlencoded::Serializer::new(String::new())
            .append_pair("q", query)
            .append_pair("limit", "10")
            .append_pair("fields", SEARCH_FIELDS)
            .finish();
        let resp: MalSearchResponse = self.get_json(format!("{BASE_URL}/manga?{params}")).await?;
        Ok(resp
            .data
            .into_iter()
            .map(|n| n.node.into_tracker_series())
            .collect())
    }

    /// Fetch the user's entry for a series. A series that is on no list is
    /// `Ok(None)`; any failure, including an unresolved user, is an `Err`.
    pub async fn fetch_entry(&mut self, series_id: &str) -> Result<Option<TrackEntry>, MalError> {
        if self.access_token.is_empty() {
            return Err(MalError::Unauthenticated);
        }
        self.ensure_user().await?;
        let manga_id = parse_manga_id(series_id)?;
        let node: MalMangaNode = self
            .get_json(format!("{BASE_URL}/manga/{manga_id}?fields={ENTRY_FIELDS}"))
            .await?;
        Ok(node.into_track_entry())
    }

    /// `PUT my_list_status` with only the fields the caller set; MAL keeps
    /// its stored values for everything omitted.
    async fn put_list_status(&self, entry: &TrackEntry) -> Result<TrackEntry, MalError> {
        let manga_id = parse_manga_id(&entry.series_id)?;

        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(status) = entry.status {
            params.push(("status", map_status_to_mal(status).to_string()));
        }
        if let Some(score) = entry.score {
            // MAL uses integer scores 0-10; 0 clears the score.
            params.push(("score", (score.round().max(0.0) as u32).min(10).to_string()));
        }
        if let Some(progress) = entry.progress {
            params.push(("num_chapters_read", progress.to_string()));
        }

        let request = HttpRequest::new(
            Method::Put,
            format!("{BASE_URL}/manga/{manga_id}/my_list_status"),
        )
        .bearer(&self.access_token)
        .form(params);
        let resp = self.transport.send(request).await?;
        let status: MalListStatus = Self::decode(resp)?;
        Ok(status.apply_to(entry.clone()))
    }
}

fn parse_manga_id(series_id: &str) -> Result<u64, MalError> {
    series_id
        .parse()
        .map_err(|_| MalError::Parse(format!("invalid MAL manga id {series_id:?}")))
}

impl<T: Transport> Tracker for MalClient<T> {
    fn metadata(&self) -> &'static TrackerMetadata {
        &METADATA
    }

    fn access_token(&self) -> &str {
        &self.access_token
    }

    fn set_access_token(&mut self, token: String) {
        self.access_token = token;
        self.user_id = None;
    }

    fn auth_url(&mut self) -> AuthRequest {
        let pkce = PkcePair::plain();
        let url = auth::authorize_url(&self.client_id, &pkce, self.redirect_uri.as_deref());
        // A previous, unexchanged pair is stale from here on.
        self.pkce = Some(pkce);
        AuthRequest {
            url,
            flow: AuthFlow::AuthorizationCode,
        }
    }

    async fn get_token(&mut self, code: &str) -> Option<String> {
        let Some(pkce) = self.pkce.take() else {
            tracing::warn!(
                tracker = METADATA.id,
                "no PKCE verifier stored; auth_url must be called before get_token"
            );
            return None;
        };

        match self.exchange_code(code, &pkce).await {
            Ok(token) => {
                tracing::info!(tracker = METADATA.id, "MAL authorization complete");
                self.set_access_token(token.access_token.clone());
                Some(token.access_token)
            }
            Err(e) => {
                tracing::warn!(tracker = METADATA.id, error = %e, "MAL token exchange failed");
                None
            }
        }
    }

    async fn get_username(&mut self) -> Option<String> {
        if self.access_token.is_empty() {
            return None;
        }
        match self.fetch_user().await {
            Ok(user) => {
                self.user_id = Some(user.id);
                tracing::debug!(tracker = METADATA.id, user_id = user.id, "resolved MAL user");
                Some(user.name)
            }
            Err(e) => {
                tracing::warn!(tracker = METADATA.id, error = %e, "failed to resolve MAL user");
                None
            }
        }
    }

    async fn search(&self, query: &str) -> Vec<TrackerSeries> {
        if self.access_token.is_empty() || query.trim().is_empty() {
            return Vec::new();
        }
        self.search_raw(query).await.unwrap_or_else(|e| {
            tracing::warn!(tracker = METADATA.id, query, error = %e, "MAL search failed");
            Vec::new()
        })
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
        // MAL's PUT my_list_status is an upsert, so adding is updating with
        // the status defaulted.
        let entry = TrackEntry {
            status: entry.status.or(Some(TrackStatus::Planning)),
            ..entry.clone()
        };
        self.update_library_entry(&entry).await
    }

    async fn update_library_entry(&mut self, entry: &TrackEntry) -> Option<TrackEntry> {
        if self.access_token.is_empty() {
            return None;
        }
        self.put_list_status(entry)
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
