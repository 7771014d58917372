use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::api::{ApiError, HttpBackend, Transport};
use crate::catalog::Catalog;
use crate::classify::{Buckets, RuleTable, classify};
use crate::models::PlaylistRef;
use crate::schedule::Schedule;
use crate::writer::{PlaylistWriter, Protected, Resolved, WriteError};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Write(#[from] WriteError),
    #[error("Master playlist \"{0}\" not found")]
    MasterNotFound(String),
    #[error("Master playlist \"{0}\" is also listed as a destination")]
    MasterIsDestination(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;

/// Everything one run needs, passed in explicitly.
#[derive(Debug)]
pub struct SyncConfig {
    pub api_base: String,
    pub user_id: String,
    pub master_name: String,
    pub dry_run: bool,
    pub rules: RuleTable,
    pub schedule: Schedule,
    pub description: String,
}

/// Where a run is (or where it stopped).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotScheduled,
    Fetching,
    Classifying,
    Writing,
    Done,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunState::NotScheduled => "not scheduled",
            RunState::Fetching => "fetching",
            RunState::Classifying => "classifying",
            RunState::Writing => "writing",
            RunState::Done => "done",
            RunState::Failed => "failed",
        })
    }
}

/// Master contents classified into buckets, before any write.
#[derive(Debug)]
pub struct Plan {
    pub master_id: String,
    pub master_tracks: usize,
    pub buckets: Buckets,
}

/// What happened to one destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationReport {
    pub playlist: PlaylistRef,
    pub created: bool,
    pub tracks: usize,
    pub write_calls: usize,
}

#[derive(Debug)]
pub struct RunReport {
    pub state: RunState,
    pub dry_run: bool,
    pub plan: Option<Plan>,
    pub destinations: Vec<DestinationReport>,
}

/// Runs the master → destinations sort against one account.
pub struct Syncer<B> {
    transport: Transport<B>,
    config: SyncConfig,
}

impl<B: HttpBackend> Syncer<B> {
    /// Check the configuration and bind it to a transport.
    pub fn new(transport: Transport<B>, config: SyncConfig) -> Result<Self> {
        if config.user_id.trim().is_empty() {
            return Err(ApiError::MissingCredential("SPOTIFY_USER_ID").into());
        }
        if config.rules.contains(&config.master_name) {
            return Err(SyncError::MasterIsDestination(config.master_name.clone()));
        }
        Ok(Self { transport, config })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn transport(&self) -> &Transport<B> {
        &self.transport
    }

    /// One scheduled run. Not being due is a successful no-op; `force`
    /// skips the schedule check.
    pub fn run(&self, now: DateTime<Utc>, force: bool) -> Result<RunReport> {
        let mut state = RunState::NotScheduled;
        let result = self.execute(now, force, &mut state);
        if let Err(e) = &result {
            log::error!("Run failed while {state}: {e}");
            advance(&mut state, RunState::Failed);
        }
        result
    }

    /// Read and classify the master without writing anything.
    pub fn plan(&self) -> Result<Plan> {
        let mut state = RunState::NotScheduled;
        let catalog = Catalog::new(&self.transport, &self.config.api_base);
        self.prepare(&catalog, &mut state)
    }

    fn execute(&self, now: DateTime<Utc>, force: bool, state: &mut RunState) -> Result<RunReport> {
        if !force && !self.config.schedule.is_due(now) {
            log::info!("Not {} yet, nothing to do", self.config.schedule);
            return Ok(RunReport {
                state: RunState::NotScheduled,
                dry_run: self.config.dry_run,
                plan: None,
                destinations: Vec::new(),
            });
        }
        if self.config.dry_run {
            log::info!("Dry run: playlists will not be created or modified");
        }

        let catalog = Catalog::new(&self.transport, &self.config.api_base);
        let plan = self.prepare(&catalog, state)?;

        advance(state, RunState::Writing);
        let writer = PlaylistWriter::new(
            &self.transport,
            &catalog,
            &self.config.user_id,
            Protected {
                name: self.config.master_name.clone(),
                id: Some(plan.master_id.clone()),
            },
        )
        .dry_run(self.config.dry_run)
        .description(&self.config.description);

        let mut destinations = Vec::with_capacity(plan.buckets.len());
        for (name, uris) in plan.buckets.iter() {
            let resolved = writer.find_or_create(name)?;
            let report = match resolved.id() {
                Some(id) => {
                    let outcome = writer.replace(id, uris)?;
                    DestinationReport {
                        playlist: PlaylistRef {
                            name: name.to_string(),
                            id: Some(id.to_string()),
                        },
                        created: matches!(resolved, Resolved::Created(_)),
                        tracks: outcome.tracks,
                        write_calls: outcome.write_calls,
                    }
                }
                None => {
                    log::info!("[dry-run] Would fill \"{name}\" with {} tracks", uris.len());
                    DestinationReport {
                        playlist: PlaylistRef {
                            name: name.to_string(),
                            id: None,
                        },
                        created: false,
                        tracks: uris.len(),
                        write_calls: 0,
                    }
                }
            };
            destinations.push(report);
        }

        advance(state, RunState::Done);
        Ok(RunReport {
            state: RunState::Done,
            dry_run: self.config.dry_run,
            plan: Some(plan),
            destinations,
        })
    }

    fn prepare(&self, catalog: &Catalog<'_, B>, state: &mut RunState) -> Result<Plan> {
        advance(state, RunState::Fetching);

        let me = catalog.current_user()?;
        if me.id != self.config.user_id {
            log::warn!(
                "Token belongs to \"{}\" but SPOTIFY_USER_ID is \"{}\"; creating as the latter",
                me.id,
                self.config.user_id
            );
        }

        let master = &self.config.master_name;
        let master_id = catalog
            .find_playlist_by_name(master)?
            .ok_or_else(|| SyncError::MasterNotFound(master.clone()))?;
        let tracks = catalog.get_tracks(&master_id)?;
        log::info!("Master \"{master}\" ({master_id}) has {} tracks", tracks.len());

        let ids: Vec<String> = tracks.iter().map(|t| t.id.clone()).collect();
        let features = catalog.get_features(&ids)?;

        advance(state, RunState::Classifying);
        let buckets = classify(&tracks, &features, &self.config.rules);
        if buckets.missing_features > 0 {
            log::warn!("{} tracks have no audio features, skipped", buckets.missing_features);
        }
        if buckets.unmatched > 0 {
            log::info!("{} tracks matched no rule", buckets.unmatched);
        }
        for (name, uris) in buckets.iter() {
            log::debug!("  {name}: {} tracks", uris.len());
        }

        Ok(Plan {
            master_id,
            master_tracks: tracks.len(),
            buckets,
        })
    }
}

fn advance(state: &mut RunState, next: RunState) {
    log::debug!("Run state: {state} -> {next}");
    *state = next;
}
