use serde::Deserialize;

use crate::traits::{TrackEntry, TrackScoreFormat, TrackStatus, TrackerSeries};

// ── GraphQL response wrappers ────────────────────────────────────

/// Raw GraphQL envelope. `data` is decoded separately once `errors` has
/// been checked, since failed queries often carry a partial or null `data`.
#[derive(Debug, Deserialize)]
pub struct GraphQLResponse {
    pub data: Option<serde_json::Value>,
    pub errors: Option<Vec<GraphQLError>>,
}

#[derive(Debug, Deserialize)]
pub struct GraphQLError {
    pub message: String,
    pub status: Option<u16>,
}

// ── Viewer query ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ViewerResponse {
    #[serde(rename = "Viewer")]
    pub viewer: Viewer,
}

#[derive(Debug, Deserialize)]
pub struct Viewer {
    pub id: u64,
    pub name: String,
    #[serde(rename = "mediaListOptions")]
    pub media_list_options: Option<MediaListOptions>,
}

#[derive(Debug, Deserialize)]
pub struct MediaListOptions {
    #[serde(rename = "scoreFormat")]
    pub score_format: Option<String>,
}

// ── Search ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PageResponse {
    #[serde(rename = "Page")]
    pub page: PageData,
}

#[derive(Debug, Deserialize)]
pub struct PageData {
    pub media: Vec<AniListMedia>,
}

#[derive(Debug, Deserialize)]
pub struct AniListMedia {
    pub id: u64,
    pub title: Option<AniListTitle>,
    pub description: Option<String>,
    #[serde(rename = "coverImage")]
    pub cover_image: Option<CoverImage>,
}

#[derive(Debug, Deserialize)]
pub struct AniListTitle {
    pub romaji: Option<String>,
    pub english: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CoverImage {
    pub large: Option<String>,
}

// ── Library entries ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct MediaListResponse {
    #[serde(rename = "MediaList")]
    pub media_list: Option<AniListMediaList>,
}

#[derive(Debug, Deserialize)]
pub struct SaveMediaListResponse {
    #[serde(rename = "SaveMediaListEntry")]
    pub saved: Option<AniListMediaList>,
}

#[derive(Debug, Deserialize)]
pub struct AniListMediaList {
    pub id: u64,
    pub status: Option<String>,
    pub progress: Option<u32>,
    pub score: Option<f64>,
    pub media: AniListMedia,
}

// ── Status / score format mapping ────────────────────────────────

/// Provider status → canonical status. `CURRENT` comes first so the reverse
/// lookup of `Reading` yields it rather than `REPEATING`.
const STATUS_MAP: &[(&str, TrackStatus)] = &[
    ("CURRENT", TrackStatus::Reading),
    ("PLANNING", TrackStatus::Planning),
    ("COMPLETED", TrackStatus::Completed),
    ("DROPPED", TrackStatus::Dropped),
    ("PAUSED", TrackStatus::Paused),
    ("REPEATING", TrackStatus::Reading),
];

const SCORE_FORMAT_MAP: &[(&str, TrackScoreFormat)] = &[
    ("POINT_10", TrackScoreFormat::Point10),
    ("POINT_100", TrackScoreFormat::Point100),
    ("POINT_10_DECIMAL", TrackScoreFormat::Point10Decimal),
    ("POINT_5", TrackScoreFormat::Point5),
    ("POINT_3", TrackScoreFormat::Point3),
];

/// Map an AniList `MediaListStatus`. Unknown values fall back to `Reading`.
pub fn map_anilist_status(s: &str) -> TrackStatus {
    STATUS_MAP
        .iter()
        .find(|(native, _)| *native == s)
        .map(|(_, status)| *status)
        .unwrap_or_else(|| {
            tracing::warn!(status = s, "unknown AniList status, treating as Reading");
            TrackStatus::Reading
        })
}

pub fn map_status_to_anilist(status: TrackStatus) -> &'static str {
    STATUS_MAP
        .iter()
        .find(|(_, canonical)| *canonical == status)
        .map(|(native, _)| *native)
        .unwrap_or("CURRENT")
}

pub fn map_anilist_score_format(s: &str) -> Option<TrackScoreFormat> {
    SCORE_FORMAT_MAP
        .iter()
        .find(|(native, _)| *native == s)
        .map(|(_, format)| *format)
}

// ── Conversions ──────────────────────────────────────────────────

impl AniListMedia {
    fn romaji_title(&self) -> Option<String> {
        self.title
            .as_ref()
            .and_then(|t| t.romaji.clone().or_else(|| t.english.clone()))
    }

    pub fn into_tracker_series(self) -> TrackerSeries {
        TrackerSeries {
            id: self.id.to_string(),
            title: self.romaji_title().unwrap_or_default(),
            description: self.description,
            cover_url: self.cover_image.and_then(|c| c.large),
        }
    }
}

impl AniListMediaList {
    pub fn into_track_entry(self, score_format: Option<TrackScoreFormat>) -> TrackEntry {
        TrackEntry {
            id: Some(self.id.to_string()),
            series_id: self.media.id.to_string(),
            title: self.media.romaji_title(),
            description: self.media.description,
            cover_url: self.media.cover_image.and_then(|c| c.large),
            status: Some(
                self.status
                    .as_deref()
                    .map(map_anilist_status)
                    .unwrap_or(TrackStatus::Reading),
            ),
            score: self.score,
            score_format,
            progress: self.progress,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_viewer() {
        let json = r#"{
            "Viewer": {
                "id": 123,
                "name": "shiori",
                "mediaListOptions": { "scoreFormat": "POINT_10" }
            }
        }"#;
        let resp: ViewerResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.viewer.id, 123);
        let format = resp
            .viewer
            .media_list_options
            .and_then(|o| o.score_format)
            .and_then(|f| map_anilist_score_format(&f));
        assert_eq!(format, Some(TrackScoreFormat::Point10));
    }

    #[test]
    fn test_deserialize_media_list() {
        let json = r#"{
            "MediaList": {
                "id": 99,
                "status": "REPEATING",
                "progress": 41,
                "score": 8.5,
                "media": {
                    "id": 30013,
                    "title": { "romaji": "One Piece", "english": "One Piece" },
                    "description": "Gol D. Roger...",
                    "coverImage": { "large": "https://s4.anilist.co/file/anilistcdn/media/manga/cover/large/30013.jpg" }
                }
            }
        }"#;
        let resp: MediaListResponse = serde_json::from_str(json).unwrap();
        let entry = resp
            .media_list
            .unwrap()
            .into_track_entry(Some(TrackScoreFormat::Point10Decimal));
        assert_eq!(entry.id.as_deref(), Some("99"));
        assert_eq!(entry.series_id, "30013");
        assert_eq!(entry.title.as_deref(), Some("One Piece"));
        assert_eq!(entry.status, Some(TrackStatus::Reading));
        assert_eq!(entry.progress, Some(41));
        assert_eq!(entry.score_format, Some(TrackScoreFormat::Point10Decimal));
    }

    #[test]
    fn test_deserialize_minimal_media() {
        let json = r#"{ "id": 1, "title": { "romaji": "Test" } }"#;
        let media: AniListMedia = serde_json::from_str(json).unwrap();
        let series = media.into_tracker_series();
        assert_eq!(series.id, "1");
        assert_eq!(series.title, "Test");
        assert!(series.cover_url.is_none());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(map_anilist_status("CURRENT"), TrackStatus::Reading);
        assert_eq!(map_anilist_status("PLANNING"), TrackStatus::Planning);
        assert_eq!(map_anilist_status("COMPLETED"), TrackStatus::Completed);
        assert_eq!(map_anilist_status("DROPPED"), TrackStatus::Dropped);
        assert_eq!(map_anilist_status("PAUSED"), TrackStatus::Paused);
        assert_eq!(map_anilist_status("REPEATING"), TrackStatus::Reading);
        assert_eq!(map_anilist_status("SOMETHING_NEW"), TrackStatus::Reading);
    }

    #[test]
    fn test_rereading_collapses_to_current() {
        let canonical = map_anilist_status("REPEATING");
        let native = map_status_to_anilist(canonical);
        assert_eq!(native, "CURRENT");
        assert_eq!(map_anilist_status(native), canonical);
    }

    #[test]
    fn test_reverse_map_round_trips_every_status() {
        for (native, _) in STATUS_MAP {
            let canonical = map_anilist_status(native);
            let reencoded = map_status_to_anilist(canonical);
            assert_eq!(map_anilist_status(reencoded), canonical);
        }
        for status in TrackStatus::ALL {
            assert_eq!(map_anilist_status(map_status_to_anilist(*status)), *status);
        }
    }
}
