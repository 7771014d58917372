//! Wire shapes for the Spotify Web API endpoints we consume (partial —
//! only the fields the sorter reads).

use serde::{Deserialize, Serialize};

/// One page of any paged endpoint.
#[derive(Debug, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    pub next: Option<String>,
}

/// `GET /me`
#[derive(Debug, Clone, Deserialize)]
pub struct CurrentUser {
    pub id: String,
    pub display_name: Option<String>,
}

/// Entry of `GET /me/playlists`.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistSummary {
    pub id: String,
    pub name: String,
}

/// Entry of `GET /playlists/{id}/tracks`. `track` is null for removed or
/// unavailable items.
#[derive(Debug, Deserialize)]
pub struct PlaylistItem {
    pub track: Option<TrackObject>,
}

#[derive(Debug, Deserialize)]
pub struct TrackObject {
    pub id: Option<String>,
    pub uri: Option<String>,
    #[serde(default)]
    pub is_local: bool,
}

/// `GET /audio-features?ids=...`. Unknown ids come back as `null` entries.
#[derive(Debug, Deserialize)]
pub struct AudioFeaturesResponse {
    #[serde(default)]
    pub audio_features: Option<Vec<Option<AudioFeaturesObject>>>,
}

#[derive(Debug, Deserialize)]
pub struct AudioFeaturesObject {
    pub id: Option<String>,
    pub energy: Option<f64>,
    pub valence: Option<f64>,
}

/// Body of `POST /users/{id}/playlists`.
#[derive(Debug, Serialize)]
pub struct NewPlaylist<'a> {
    pub name: &'a str,
    pub public: bool,
    pub description: &'a str,
}

/// Response of playlist creation (partial).
#[derive(Debug, Deserialize)]
pub struct CreatedPlaylist {
    pub id: String,
}
