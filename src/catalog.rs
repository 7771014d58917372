use std::collections::HashMap;

use crate::api::models::{AudioFeaturesResponse, CurrentUser, PlaylistItem, PlaylistSummary};
use crate::api::paging::Pages;
use crate::api::{HttpBackend, Result, Transport};
use crate::models::{AudioFeatures, Track};

/// Maximum ids per `/audio-features` request.
pub const FEATURES_BATCH: usize = 100;

/// Page size for the current user's playlist list.
const PLAYLISTS_PAGE: usize = 50;

/// Page size for playlist items.
const TRACKS_PAGE: usize = 100;

/// Read-only view of the user's library: playlists, their tracks, and
/// per-track audio features.
pub struct Catalog<'a, B> {
    transport: &'a Transport<B>,
    base: String,
}

impl<'a, B: HttpBackend> Catalog<'a, B> {
    pub fn new(transport: &'a Transport<B>, base: &str) -> Self {
        Self {
            transport,
            base: base.trim_end_matches('/').to_string(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// `GET /me`.
    pub fn current_user(&self) -> Result<CurrentUser> {
        self.transport
            .get(&format!("{}/me", self.base))?
            .ensure_success("Current user lookup")?
            .json("current user")
    }

    /// Id of the first playlist whose name matches exactly (case-sensitive).
    ///
    /// Walks the whole playlist list when there is no match; nothing is cached
    /// between calls.
    pub fn find_playlist_by_name(&self, name: &str) -> Result<Option<String>> {
        let url = format!("{}/me/playlists?limit={PLAYLISTS_PAGE}", self.base);
        for page in Pages::<_, PlaylistSummary>::new(self.transport, url) {
            if let Some(found) = page?.into_iter().find(|p| p.name == name) {
                log::debug!("Playlist \"{name}\" is {}", found.id);
                return Ok(Some(found.id));
            }
        }
        log::debug!("No playlist named \"{name}\"");
        Ok(None)
    }

    /// All resolvable tracks of a playlist, in playlist order.
    ///
    /// Unavailable items and local files are skipped.
    pub fn get_tracks(&self, playlist_id: &str) -> Result<Vec<Track>> {
        let url = format!(
            "{}/playlists/{playlist_id}/tracks?limit={TRACKS_PAGE}&fields=items(track(id,uri,is_local)),next",
            self.base
        );
        let mut tracks = Vec::new();
        let mut skipped = 0usize;

        for page in Pages::<_, PlaylistItem>::new(self.transport, url) {
            for item in page? {
                match item.track {
                    Some(t) if !t.is_local => match (t.id, t.uri) {
                        (Some(id), Some(uri)) => tracks.push(Track { id, uri }),
                        _ => skipped += 1,
                    },
                    _ => skipped += 1,
                }
            }
        }

        if skipped > 0 {
            log::info!("Skipped {skipped} local or unavailable items in {playlist_id}");
        }
        Ok(tracks)
    }

    /// Audio features for `ids`, fetched in batches of [`FEATURES_BATCH`].
    ///
    /// Ids the service has no features for are absent from the map.
    pub fn get_features(&self, ids: &[String]) -> Result<HashMap<String, AudioFeatures>> {
        let mut features = HashMap::with_capacity(ids.len());

        for batch in ids.chunks(FEATURES_BATCH) {
            let url = format!("{}/audio-features?ids={}", self.base, batch.join(","));
            let response: AudioFeaturesResponse = self
                .transport
                .get(&url)?
                .ensure_success("Audio features")?
                .json("audio features")?;

            for f in response.audio_features.into_iter().flatten().flatten() {
                if let Some(id) = f.id.filter(|id| !id.is_empty()) {
                    features.insert(
                        id,
                        AudioFeatures {
                            energy: f.energy.unwrap_or(0.0),
                            valence: f.valence.unwrap_or(0.0),
                        },
                    );
                }
            }
        }

        log::debug!("Audio features for {}/{} tracks", features.len(), ids.len());
        Ok(features)
    }
}
