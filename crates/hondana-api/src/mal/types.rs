use serde::Deserialize;

use crate::traits::{TrackEntry, TrackScoreFormat, TrackStatus, TrackerSeries};

// ── User ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct MalUser {
    pub id: u64,
    pub name: String,
}

// ── Search / manga detail responses ─────────────────────────────

#[derive(Debug, Deserialize)]
pub struct MalSearchResponse {
    pub data: Vec<MalSearchNode>,
}

#[derive(Debug, Deserialize)]
pub struct MalSearchNode {
    pub node: MalMangaNode,
}

#[derive(Debug, Deserialize)]
pub struct MalMangaNode {
    pub id: u64,
    pub title: String,
    pub synopsis: Option<String>,
    pub main_picture: Option<MalPicture>,
    pub my_list_status: Option<MalListStatus>,
}

#[derive(Debug, Deserialize)]
pub struct MalPicture {
    pub medium: Option<String>,
    pub large: Option<String>,
}

// ── List status ─────────────────────────────────────────────────

/// `my_list_status` object, also the body of a `PUT my_list_status` reply.
#[derive(Debug, Deserialize)]
pub struct MalListStatus {
    pub status: Option<String>,
    pub score: Option<u32>,
    pub num_chapters_read: Option<u32>,
}

// ── Status mapping ──────────────────────────────────────────────

const STATUS_MAP: &[(&str, TrackStatus)] = &[
    ("reading", TrackStatus::Reading),
    ("plan_to_read", TrackStatus::Planning),
    ("completed", TrackStatus::Completed),
    ("dropped", TrackStatus::Dropped),
    ("on_hold", TrackStatus::Paused),
];

/// Map a MAL manga list status. Unknown values fall back to `Reading`.
pub fn map_mal_status(s: &str) -> TrackStatus {
    STATUS_MAP
        .iter()
        .find(|(native, _)| *native == s)
        .map(|(_, status)| *status)
        .unwrap_or_else(|| {
            tracing::warn!(status = s, "unknown MAL status, treating as Reading");
            TrackStatus::Reading
        })
}

pub fn map_status_to_mal(status: TrackStatus) -> &'static str {
    STATUS_MAP
        .iter()
        .find(|(_, canonical)| *canonical == status)
        .map(|(native, _)| *native)
        .unwrap_or("reading")
}

// ── Conversions ─────────────────────────────────────────────────

impl MalPicture {
    fn best(self) -> Option<String> {
        self.large.or(self.medium)
    }
}

impl MalMangaNode {
    pub fn into_tracker_series(self) -> TrackerSeries {
        TrackerSeries {
            id: self.id.to_string(),
            title: self.title,
            description: self.synopsis,
            cover_url: self.main_picture.and_then(MalPicture::best),
        }
    }

    /// The user's entry for this manga, or `None` if it is on no list.
    pub fn into_track_entry(self) -> Option<TrackEntry> {
        let list_status = self.my_list_status?;
        let entry = TrackEntry {
            id: None,
            series_id: self.id.to_string(),
            title: Some(self.title),
            description: self.synopsis,
            cover_url: self.main_picture.and_then(MalPicture::best),
            ..Default::default()
        };
        Some(list_status.apply_to(entry))
    }
}

impl MalListStatus {
    /// Overwrite status, score and progress of `entry` with what MAL stored.
    pub fn apply_to(self, entry: TrackEntry) -> TrackEntry {
        TrackEntry {
            status: self.status.as_deref().map(map_mal_status).or(entry.status),
            score: self.score.map(f64::from).or(entry.score),
            score_format: Some(TrackScoreFormat::Point10),
            progress: self.num_chapters_read.or(entry.progress),
            ..entry
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_search_response() {
        let json = r#"{
            "data": [
                {
                    "node": {
                        "id": 104,
                        "title": "Yotsuba to!",
                        "synopsis": "Yotsuba is a strange little girl...",
                        "main_picture": {
                            "medium": "https://cdn.myanimelist.net/images/manga/5/259524.jpg",
                            "large": "https://cdn.myanimelist.net/images/manga/5/259524l.jpg"
                        }
                    }
                }
            ],
            "paging": {}
        }"#;

        let resp: MalSearchResponse = serde_json::from_str(json).unwrap();
        let series = resp
            .data
            .into_iter()
            .next()
            .unwrap()
            .node
            .into_tracker_series();
        assert_eq!(series.id, "104");
        assert_eq!(series.title, "Yotsuba to!");
        assert_eq!(
            series.cover_url.as_deref(),
            Some("https://cdn.myanimelist.net/images/manga/5/259524l.jpg")
        );
    }

    #[test]
    fn test_entry_from_node() {
        let json = r#"{
            "id": 2,
            "title": "Berserk",
            "my_list_status": {
                "status": "on_hold",
                "score": 9,
                "num_chapters_read": 364,
                "updated_at": "2024-01-15T10:00:00+00:00"
            }
        }"#;
        let node: MalMangaNode = serde_json::from_str(json).unwrap();
        let entry = node.into_track_entry().unwrap();
        assert_eq!(entry.series_id, "2");
        assert_eq!(entry.status, Some(TrackStatus::Paused));
        assert_eq!(entry.score, Some(9.0));
        assert_eq!(entry.progress, Some(364));
        assert_eq!(entry.score_format, Some(TrackScoreFormat::Point10));
    }

    #[test]
    fn test_node_without_list_status() {
        let json = r#"{ "id": 2, "title": "Berserk" }"#;
        let node: MalMangaNode = serde_json::from_str(json).unwrap();
        assert!(node.into_track_entry().is_none());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(map_mal_status("reading"), TrackStatus::Reading);
        assert_eq!(map_mal_status("plan_to_read"), TrackStatus::Planning);
        assert_eq!(map_mal_status("completed"), TrackStatus::Completed);
        assert_eq!(map_mal_status("dropped"), TrackStatus::Dropped);
        assert_eq!(map_mal_status("on_hold"), TrackStatus::Paused);
        assert_eq!(map_mal_status("rereading"), TrackStatus::Reading);
    }

    #[test]
    fn test_reverse_map_round_trips_every_status() {
        for status in TrackStatus::ALL {
            let native = map_status_to_mal(*status);
            assert_eq!(map_mal_status(native), *status);
        }
    }
}
