use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use moodsort::api::{Transport, UreqBackend};
use moodsort::catalog::Catalog;
use moodsort::classify::RuleTable;
use moodsort::config::{AppConfig, is_truthy};
use moodsort::sync::{Plan, RunReport, RunState, Syncer};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "moodsort",
    version,
    about = "Sort a master Spotify playlist into mood playlists by energy and valence"
)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, env = "MOODSORT_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Spotify access token
    #[arg(long, env = "SPOTIFY_ACCESS_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,

    /// Spotify user id that owns created playlists
    #[arg(long, env = "SPOTIFY_USER_ID", global = true)]
    user_id: Option<String>,

    /// Name of the read-only source playlist
    #[arg(long, env = "MASTER_PLAYLIST_NAME", default_value = "MASTER", global = true)]
    master: String,

    /// Log intended writes instead of performing them (1/true/yes)
    #[arg(
        long,
        env = "DRY_RUN",
        default_value = "true",
        value_parser = parse_flag,
        action = clap::ArgAction::Set,
        global = true
    )]
    dry_run: bool,

    /// Verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sort the master into the destination playlists (default; meant for cron)
    Run {
        /// Run even if it is not the scheduled time
        #[arg(long)]
        force: bool,
    },

    /// Show how the master would be sorted, without touching any playlist
    Plan,

    /// Print the rule table in priority order
    Rules,

    /// Check which account the token belongs to
    Whoami,
}

fn parse_flag(value: &str) -> std::result::Result<bool, String> {
    Ok(is_truthy(value))
}

fn main() -> Result<()> {
    let mut cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let config = AppConfig::load(cli.config.as_deref()).context("Failed to load config")?;

    match cli.command.take().unwrap_or(Commands::Run { force: false }) {
        Commands::Run { force } => {
            let syncer = build_syncer(&cli, &config)?;
            let report = syncer
                .run(chrono::Utc::now(), force)
                .context("Sort run failed")?;
            print_run_report(&report);
        }

        Commands::Plan => {
            let syncer = build_syncer(&cli, &config)?;
            let plan = syncer.plan().context("Planning failed")?;
            println!(
                "Master \"{}\": {} tracks",
                syncer.config().master_name,
                plan.master_tracks
            );
            println!();
            print_plan(&plan);
        }

        Commands::Rules => {
            let rules = config.rule_table().context("Invalid rule table")?;
            print_rules(&rules);
            if rules.contains(&cli.master) {
                println!();
                println!(
                    "WARNING: \"{}\" is the master playlist; runs will refuse this table",
                    cli.master
                );
            }
        }

        Commands::Whoami => {
            let syncer = build_syncer(&cli, &config)?;
            let catalog = Catalog::new(syncer.transport(), &syncer.config().api_base);
            let me = catalog.current_user().context("Current user lookup failed")?;
            match me.display_name {
                Some(name) => println!("{} ({})", me.id, name),
                None => println!("{}", me.id),
            }
        }
    }

    Ok(())
}

/// Wire config, credentials and the HTTP backend into a syncer.
fn build_syncer(cli: &Cli, config: &AppConfig) -> Result<Syncer<UreqBackend>> {
    let token = cli.token.as_deref().unwrap_or_default();
    let transport = Transport::new(UreqBackend::new(config.timeout()), token)
        .context("Set SPOTIFY_ACCESS_TOKEN")?
        .with_policy(config.retry.clone());

    let sync_config = config
        .sync_config(
            cli.user_id.as_deref().unwrap_or_default(),
            &cli.master,
            cli.dry_run,
        )
        .context("Invalid configuration")?;
    log::debug!(
        "Master \"{}\", {} destinations, schedule {}",
        sync_config.master_name,
        sync_config.rules.len(),
        sync_config.schedule
    );

    Syncer::new(transport, sync_config).context("Invalid configuration")
}

fn print_rules(rules: &RuleTable) {
    println!("{:<3} {:<30} {}", "#", "Playlist", "Condition");
    println!("{}", "-".repeat(70));
    for (i, rule) in rules.rules().iter().enumerate() {
        println!("{:<3} {:<30} {}", i + 1, rule.destination(), rule.description());
    }
    println!();
    println!("First matching rule wins; tracks matching none are left out.");
}

fn print_plan(plan: &Plan) {
    println!("{:<30} {:>6}", "Playlist", "Tracks");
    println!("{}", "-".repeat(37));
    for (name, uris) in plan.buckets.iter() {
        println!("{:<30} {:>6}", name, uris.len());
    }
    println!();
    println!(
        "Unmatched: {}  No features: {}",
        plan.buckets.unmatched, plan.buckets.missing_features
    );
}

fn print_run_report(report: &RunReport) {
    if report.state == RunState::NotScheduled {
        println!("Not scheduled now, exiting.");
        return;
    }

    if report.dry_run {
        println!("DRY RUN — no playlists were created or modified");
        println!();
    }

    println!("{:<30} {:>6} {:>8}  {}", "Playlist", "Tracks", "Requests", "Id");
    println!("{}", "-".repeat(70));
    for d in &report.destinations {
        let id = match (&d.playlist.id, d.created) {
            (Some(id), true) => format!("{id} (new)"),
            (Some(id), false) => id.clone(),
            (None, _) => "(would create)".to_string(),
        };
        println!(
            "{:<30} {:>6} {:>8}  {}",
            d.playlist.name, d.tracks, d.write_calls, id
        );
    }

    if let Some(plan) = &report.plan {
        println!();
        println!(
            "Master: {} tracks, {} sorted, {} unmatched, {} without features",
            plan.master_tracks,
            plan.buckets.assigned(),
            plan.buckets.unmatched,
            plan.buckets.missing_features
        );
    }
    if report.dry_run {
        println!("(dry run — set DRY_RUN=false to apply)");
    }
    println!("Done.");
}
