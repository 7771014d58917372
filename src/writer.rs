use serde_json::json;
use thiserror::Error;

use crate::api::models::{CreatedPlaylist, NewPlaylist};
use crate::api::{ApiError, HttpBackend, Method, Transport};
use crate::catalog::Catalog;

/// Maximum URIs per replace/append request.
pub const WRITE_BATCH: usize = 100;

/// Description stamped on playlists the sorter creates.
pub const DEFAULT_DESCRIPTION: &str = "Auto-managed (Replace)";

#[derive(Error, Debug)]
pub enum WriteError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("Refusing to write to the master playlist ({0})")]
    MasterWrite(String),
}

pub type Result<T> = std::result::Result<T, WriteError>;

/// The master playlist, which must never be written to.
#[derive(Debug, Clone)]
pub struct Protected {
    pub name: String,
    pub id: Option<String>,
}

/// Outcome of resolving a destination by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Existing(String),
    Created(String),
    /// Dry run and the playlist does not exist yet.
    WouldCreate,
}

impl Resolved {
    pub fn id(&self) -> Option<&str> {
        match self {
            Resolved::Existing(id) | Resolved::Created(id) => Some(id.as_str()),
            Resolved::WouldCreate => None,
        }
    }
}

/// Result of one full replace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplaceOutcome {
    pub tracks: usize,
    /// Requests issued: one PUT plus one POST per extra batch (0 in dry run).
    pub write_calls: usize,
}

/// Number of requests a live replace of `n` URIs takes.
pub fn write_calls_for(n: usize) -> usize {
    1 + n.saturating_sub(WRITE_BATCH).div_ceil(WRITE_BATCH)
}

/// Creates destination playlists and overwrites their contents.
pub struct PlaylistWriter<'a, B> {
    transport: &'a Transport<B>,
    catalog: &'a Catalog<'a, B>,
    user_id: String,
    description: String,
    dry_run: bool,
    protected: Protected,
}

impl<'a, B: HttpBackend> PlaylistWriter<'a, B> {
    pub fn new(
        transport: &'a Transport<B>,
        catalog: &'a Catalog<'a, B>,
        user_id: &str,
        protected: Protected,
    ) -> Self {
        Self {
            transport,
            catalog,
            user_id: user_id.to_string(),
            description: DEFAULT_DESCRIPTION.to_string(),
            dry_run: false,
            protected,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn guard_name(&self, name: &str) -> Result<()> {
        if name == self.protected.name {
            return Err(WriteError::MasterWrite(name.to_string()));
        }
        Ok(())
    }

    fn guard_id(&self, playlist_id: &str) -> Result<()> {
        if self.protected.id.as_deref() == Some(playlist_id) {
            return Err(WriteError::MasterWrite(playlist_id.to_string()));
        }
        Ok(())
    }

    /// Look up a destination by name, creating it (private) when missing.
    ///
    /// In dry-run mode nothing is created and `WouldCreate` is returned.
    pub fn find_or_create(&self, name: &str) -> Result<Resolved> {
        self.guard_name(name)?;

        if let Some(id) = self.catalog.find_playlist_by_name(name)? {
            self.guard_id(&id)?;
            return Ok(Resolved::Existing(id));
        }

        if self.dry_run {
            log::info!("[dry-run] Would create playlist \"{name}\"");
            return Ok(Resolved::WouldCreate);
        }

        let url = format!(
            "{}/users/{}/playlists",
            self.catalog.base(),
            encode_path_segment(&self.user_id)
        );
        let body = serde_json::to_value(NewPlaylist {
            name,
            public: false,
            description: &self.description,
        })
        .map_err(|source| ApiError::Decode {
            context: "new playlist body".to_string(),
            source,
        })?;

        let created: CreatedPlaylist = self
            .transport
            .request(Method::Post, &url, Some(&body))?
            .ensure_success(&format!("Creating playlist \"{name}\""))?
            .json("created playlist")?;
        log::info!("Created playlist \"{name}\" ({})", created.id);
        Ok(Resolved::Created(created.id))
    }

    /// Overwrite a playlist's contents with `uris`, keeping their order.
    ///
    /// One PUT replaces everything with the first batch (an empty list clears
    /// the playlist); the rest is appended batch by batch. Any failed write
    /// aborts immediately and leaves the playlist partially written; running
    /// the same replace again converges.
    pub fn replace(&self, playlist_id: &str, uris: &[String]) -> Result<ReplaceOutcome> {
        self.guard_id(playlist_id)?;

        if self.dry_run {
            log::info!(
                "[dry-run] Would replace {playlist_id} with {} tracks",
                uris.len()
            );
            return Ok(ReplaceOutcome {
                tracks: uris.len(),
                write_calls: 0,
            });
        }

        let url = format!("{}/playlists/{playlist_id}/tracks", self.catalog.base());
        let (first, rest) = uris.split_at(uris.len().min(WRITE_BATCH));

        self.transport
            .request(Method::Put, &url, Some(&json!({ "uris": first })))?
            .ensure_success(&format!("Replacing tracks of {playlist_id}"))?;
        let mut write_calls = 1;

        for chunk in rest.chunks(WRITE_BATCH) {
            self.transport
                .request(Method::Post, &url, Some(&json!({ "uris": chunk })))?
                .ensure_success(&format!("Appending tracks to {playlist_id}"))?;
            write_calls += 1;
        }

        log::info!(
            "Replaced {playlist_id} with {} tracks ({write_calls} requests)",
            uris.len()
        );
        Ok(ReplaceOutcome {
            tracks: uris.len(),
            write_calls,
        })
    }
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
fn encode_path_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for b in segment.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}
