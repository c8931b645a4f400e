//! The tracker client contract and the canonical vocabulary shared by every
//! adapter.
//!
//! Provider-shaped payloads never cross this boundary: each adapter converts
//! its responses into the types below before returning them.

use std::future::Future;

use serde::{Deserialize, Serialize};

/// Static description of a tracker, shown by the UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackerMetadata {
    pub id: &'static str,
    pub display_name: &'static str,
    pub homepage_url: &'static str,
    pub supports_custom_lists: bool,
}

/// Reading status in the provider-independent vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackStatus {
    Reading,
    Planning,
    Completed,
    Dropped,
    Paused,
}

impl TrackStatus {
    pub const ALL: &[TrackStatus] = &[
        Self::Reading,
        Self::Planning,
        Self::Completed,
        Self::Dropped,
        Self::Paused,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reading => "Reading",
            Self::Planning => "Planning",
            Self::Completed => "Completed",
            Self::Dropped => "Dropped",
            Self::Paused => "Paused",
        }
    }
}

impl std::fmt::Display for TrackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a provider interprets the numeric score of a library entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackScoreFormat {
    #[serde(rename = "POINT_10")]
    Point10,
    #[serde(rename = "POINT_100")]
    Point100,
    #[serde(rename = "POINT_10_DECIMAL")]
    Point10Decimal,
    #[serde(rename = "POINT_5")]
    Point5,
    #[serde(rename = "POINT_3")]
    Point3,
}

impl TrackScoreFormat {
    /// Highest score representable in this format.
    pub fn max_score(&self) -> f64 {
        match self {
            Self::Point10 | Self::Point10Decimal => 10.0,
            Self::Point100 => 100.0,
            Self::Point5 => 5.0,
            Self::Point3 => 3.0,
        }
    }
}

/// A search hit, discarded once the user picks a match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerSeries {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub cover_url: Option<String>,
}

/// A user's tracking record for one series on one provider.
///
/// `status`, `score` and `progress` set to `None` mean "keep whatever the
/// provider already has" when the entry is sent back for an update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackEntry {
    /// Provider-assigned library entry id; absent until the first sync.
    pub id: Option<String>,
    pub series_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub cover_url: Option<String>,
    pub status: Option<TrackStatus>,
    pub score: Option<f64>,
    pub score_format: Option<TrackScoreFormat>,
    pub progress: Option<u32>,
}

impl TrackEntry {
    /// An entry carrying only the series id, used to push partial updates.
    pub fn for_series(series_id: impl Into<String>) -> Self {
        Self {
            series_id: series_id.into(),
            ..Default::default()
        }
    }

    /// Fill every field the caller left unset from `remote`.
    pub fn merged_over(mut self, remote: &TrackEntry) -> Self {
        self.id = self.id.or_else(|| remote.id.clone());
        self.title = self.title.or_else(|| remote.title.clone());
        self.description = self.description.or_else(|| remote.description.clone());
        self.cover_url = self.cover_url.or_else(|| remote.cover_url.clone());
        self.status = self.status.or(remote.status);
        self.score = self.score.or(remote.score);
        self.score_format = self.score_format.or(remote.score_format);
        self.progress = self.progress.or(remote.progress);
        self
    }
}

/// Which kind of OAuth flow the authorization URL starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFlow {
    /// The provider redirects with the access token itself;
    /// [`Tracker::get_token`] only adopts what it is given.
    Implicit,
    /// The provider redirects with a one-time code that must be exchanged
    /// through [`Tracker::get_token`] on the same adapter instance.
    AuthorizationCode,
    /// The tracker has no browser login.
    Unsupported,
}

/// Where to send the user to log in, and what to do afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    pub url: String,
    pub flow: AuthFlow,
}

/// A reading-progress tracking service.
///
/// Every operation resolves to a sentinel (`None` or an empty `Vec`) on
/// failure. Failures are logged by the adapter, never returned.
///
/// Operations that resolve session state take `&mut self`, so identity and
/// PKCE state can only be written by one call at a time.
pub trait Tracker: Send + Sync {
    fn metadata(&self) -> &'static TrackerMetadata;

    /// Current access token; empty when logged out.
    fn access_token(&self) -> &str;

    /// Adopt a token (for example one restored from storage). Cached user
    /// identity is dropped so it is resolved again for the new token.
    fn set_access_token(&mut self, token: String);

    /// Build the provider's authorization URL. Authorization-code adapters
    /// generate fresh PKCE state here, replacing any unconsumed state.
    fn auth_url(&mut self) -> AuthRequest;

    /// Turn the value returned by the provider's redirect into an access
    /// token, and adopt it.
    fn get_token(&mut self, code: &str) -> impl Future<Output = Option<String>> + Send;

    /// Resolve the authenticated user's display name, caching the
    /// provider user id and score format.
    fn get_username(&mut self) -> impl Future<Output = Option<String>> + Send;

    fn search(&self, query: &str) -> impl Future<Output = Vec<TrackerSeries>> + Send;

    fn get_library_entry(
        &mut self,
        series_id: &str,
    ) -> impl Future<Output = Option<TrackEntry>> + Send;

    /// Create the remote entry from the fields the caller set. Status
    /// defaults to Planning.
    fn add_library_entry(
        &mut self,
        entry: &TrackEntry,
    ) -> impl Future<Output = Option<TrackEntry>> + Send;

    fn update_library_entry(
        &mut self,
        entry: &TrackEntry,
    ) -> impl Future<Output = Option<TrackEntry>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_caller_fields() {
        let remote = TrackEntry {
            id: Some("9".into()),
            series_id: "456".into(),
            title: Some("Yotsuba&!".into()),
            status: Some(TrackStatus::Paused),
            score: Some(8.0),
            score_format: Some(TrackScoreFormat::Point10),
            progress: Some(12),
            ..Default::default()
        };
        let local = TrackEntry {
            progress: Some(13),
            ..TrackEntry::for_series("456")
        };

        let merged = local.merged_over(&remote);
        assert_eq!(merged.progress, Some(13));
        assert_eq!(merged.status, Some(TrackStatus::Paused));
        assert_eq!(merged.score, Some(8.0));
        assert_eq!(merged.id.as_deref(), Some("9"));
    }

    #[test]
    fn test_score_format_serde_names() {
        let f: TrackScoreFormat = serde_json::from_str("\"POINT_10_DECIMAL\"").unwrap();
        assert_eq!(f, TrackScoreFormat::Point10Decimal);
        assert_eq!(TrackScoreFormat::Point100.max_score(), 100.0);
    }
}
