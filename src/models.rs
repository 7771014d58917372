/// A playable track read from the master playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub id: String,
    pub uri: String,
}

impl Track {
    pub fn new(id: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            uri: uri.into(),
        }
    }
}

/// The two audio features the sorter classifies on, both nominally in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioFeatures {
    pub energy: f64,
    pub valence: f64,
}

impl AudioFeatures {
    pub fn new(energy: f64, valence: f64) -> Self {
        Self { energy, valence }
    }
}

/// A destination playlist. `id` is `None` until it exists on the service
/// (in dry-run mode a missing playlist is never created).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistRef {
    pub name: String,
    pub id: Option<String>,
}
