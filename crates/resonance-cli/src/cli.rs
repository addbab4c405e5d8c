// SPDX-License-Identifier: GPL-3.0-or-later

//! CLI surface: subcommands `scan, resolve, plan, apply, daemon, prompt,
//! unjail` per SPEC §6. Global flags mirror the spec's flag names exactly
//! (`--state-db`, `--cache-db`, `--config`, `--tag-writer-backend`).

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use resonance_config::AppConfig;
use resonance_domain::{DirectoryRecord, DirectoryState, ProviderRelease};
use resonance_identifier::ProviderClient;
use resonance_scanner::{DirectoryBatch, LibraryScanner};
use resonance_state::{DirectoryStateStore, StatePins};

use crate::error::CliError;
use crate::pipeline;
use crate::providers::build_provider_client;

#[derive(Parser)]
#[command(name = "resonance", author, version, about = "Content-addressed music library organizer", long_about = None)]
pub struct Cli {
    /// Path to the state database (sqlite).
    #[arg(long, global = true)]
    pub state_db: Option<PathBuf>,

    /// Path to a separate provider cache database (sqlite). Accepted for
    /// interface parity with `--state-db`; the pinned-release cache (SPEC
    /// §6: "secondary tables may exist for cache but must not influence
    /// identity or state") lives alongside the state records instead of in
    /// a second database, so this flag is not yet wired to anything.
    #[arg(long, global = true)]
    pub cache_db: Option<PathBuf>,

    /// Path to a TOML config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Tag writer backend override (`meta-json` or `mutagen`); takes
    /// precedence over `RESONANCE_TAG_WRITER_BACKEND` and the config file.
    #[arg(long, global = true)]
    pub tag_writer_backend: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan library roots and list the directories found, one per content-addressed id.
    Scan {
        #[arg(required = true)]
        roots: Vec<PathBuf>,
    },
    /// Scan and resolve each directory against providers and the state store.
    Resolve {
        #[arg(required = true)]
        roots: Vec<PathBuf>,
    },
    /// Compute (but do not apply) a destination layout and tag patch for resolved directories.
    Plan {
        #[arg(required = true)]
        roots: Vec<PathBuf>,
        #[arg(long)]
        library_root: PathBuf,
    },
    /// Apply a previously-computed plan: move files and write tags.
    Apply {
        #[arg(required = true)]
        roots: Vec<PathBuf>,
        #[arg(long)]
        library_root: PathBuf,
        #[arg(long)]
        dry_run: bool,
    },
    /// Run scan, resolve, plan, and apply in one sorted-order pass.
    Daemon {
        #[arg(required = true)]
        roots: Vec<PathBuf>,
        #[arg(long)]
        library_root: PathBuf,
        #[arg(long)]
        dry_run: bool,
    },
    /// Manually resolve a directory queued for user review.
    Prompt {
        dir_id: String,
        #[arg(long)]
        provider: String,
        #[arg(long)]
        release_id: String,
        #[arg(long, default_value_t = 1.0)]
        confidence: f64,
    },
    /// Release a jailed directory back to NEW so it is reconsidered.
    Unjail { dir_id: String },
}

pub async fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = resonance_config::load(cli.config.as_deref())?;
    if config.providers.acoustid_api_key.is_none() {
        config.providers.acoustid_api_key = std::env::var("ACOUSTID_API_KEY").ok();
    }
    if let Some(state_db) = &cli.state_db {
        config.state_db_path = state_db.clone();
    }
    if let Some(cache_db) = &cli.cache_db {
        config.cache_db_path = cache_db.clone();
    }
    config.tag_writer_backend = resonance_config::resolve_tag_writer_backend(
        cli.tag_writer_backend.as_deref(),
        std::env::var("RESONANCE_TAG_WRITER_BACKEND").ok().as_deref(),
        &config.tag_writer_backend,
    )?;

    let db_url = format!("sqlite://{}?mode=rwc", config.state_db_path.display());
    let store = DirectoryStateStore::connect(&db_url).await?;

    match cli.command {
        Commands::Scan { roots } => cmd_scan(&roots),
        Commands::Resolve { roots } => cmd_resolve(&roots, &store, &config),
        Commands::Plan { roots, library_root } => cmd_plan(&roots, &library_root, &store),
        Commands::Apply { roots, library_root, dry_run } => cmd_apply(&roots, &library_root, dry_run, &store, &config),
        Commands::Daemon { roots, library_root, dry_run } => cmd_daemon(&roots, &library_root, dry_run, &store, &config),
        Commands::Prompt {
            dir_id,
            provider,
            release_id,
            confidence,
        } => {
            let provider_client = build_provider_client(&config);
            cmd_prompt(&dir_id, &provider, &release_id, confidence, &store, &provider_client)
        }
        Commands::Unjail { dir_id } => cmd_unjail(&dir_id, &store),
    }
}

fn scan_sorted(roots: &[PathBuf]) -> Result<Vec<DirectoryBatch>, CliError> {
    let scanner = LibraryScanner::new(roots.to_vec());
    let mut batches = scanner.iter_directories()?;
    batches.sort_by(|a, b| (a.dir_id.as_str(), &a.directory).cmp(&(b.dir_id.as_str(), &b.directory)));
    Ok(batches)
}

fn cmd_scan(roots: &[PathBuf]) -> Result<(), CliError> {
    let batches = scan_sorted(roots)?;
    for batch in &batches {
        println!("{}\t{}", batch.dir_id, batch.directory.display());
    }
    info!(target: "cli", count = batches.len(), "scan complete");
    Ok(())
}

fn cmd_resolve(roots: &[PathBuf], store: &DirectoryStateStore, config: &AppConfig) -> Result<(), CliError> {
    let batches = scan_sorted(roots)?;
    let provider_client = build_provider_client(config);
    for batch in &batches {
        let outcome = pipeline::resolve_batch(batch, store, &provider_client)?;
        pipeline::log_outcome(&outcome);
        if outcome.needs_prompt {
            println!("{}\t{}\tneeds-prompt", batch.dir_id, batch.directory.display());
        } else {
            println!("{}\t{}\t{}", batch.dir_id, batch.directory.display(), outcome.state);
        }
    }
    Ok(())
}

fn record_for(store: &DirectoryStateStore, dir_id: &str) -> Result<Option<DirectoryRecord>, CliError> {
    Ok(store.get(dir_id)?)
}

fn cmd_plan(roots: &[PathBuf], library_root: &Path, store: &DirectoryStateStore) -> Result<(), CliError> {
    let batches = scan_sorted(roots)?;
    for batch in &batches {
        let Some(record) = record_for(store, &batch.dir_id)? else {
            pipeline::warn_skip(&batch.dir_id, "no state record; run resolve first");
            continue;
        };
        match pipeline::plan_batch(batch, &record, library_root, store) {
            Ok((plan, _tag_patch)) => {
                pipeline::mark_planned(store, &batch.dir_id)?;
                println!("{}\t{}", batch.dir_id, plan.destination_root.display());
            }
            Err(pipeline::PlanningError::NotResolved) => {
                pipeline::warn_skip(&batch.dir_id, "directory is not resolved");
            }
            Err(pipeline::PlanningError::NoPinnedRelease) => {
                pipeline::warn_skip(&batch.dir_id, "no cached release for this pin; re-resolve or re-prompt");
            }
            Err(pipeline::PlanningError::Planner(err)) => return Err(err.into()),
            Err(pipeline::PlanningError::Store(err)) => return Err(err.into()),
        }
    }
    Ok(())
}

fn cmd_apply(roots: &[PathBuf], library_root: &Path, dry_run: bool, store: &DirectoryStateStore, config: &AppConfig) -> Result<(), CliError> {
    let batches = scan_sorted(roots)?;
    let allowed_roots = vec![library_root.to_path_buf()];
    for batch in &batches {
        let Some(record) = record_for(store, &batch.dir_id)? else {
            pipeline::warn_skip(&batch.dir_id, "no state record; run resolve first");
            continue;
        };
        if record.state != DirectoryState::Planned && !record.state.is_resolved() {
            pipeline::warn_skip(&batch.dir_id, "directory is neither resolved nor planned");
            continue;
        }
        let (plan, tag_patch) = match pipeline::plan_batch(batch, &record, library_root, store) {
            Ok(pair) => pair,
            Err(pipeline::PlanningError::NotResolved) => {
                pipeline::warn_skip(&batch.dir_id, "directory is not resolved");
                continue;
            }
            Err(pipeline::PlanningError::NoPinnedRelease) => {
                pipeline::warn_skip(&batch.dir_id, "no cached release for this pin; re-resolve or re-prompt");
                continue;
            }
            Err(pipeline::PlanningError::Planner(err)) => return Err(err.into()),
            Err(pipeline::PlanningError::Store(err)) => return Err(err.into()),
        };
        let report = pipeline::apply_plan(&plan, &tag_patch, store, &allowed_roots, dry_run, &config.tag_writer_backend)?;
        println!("{}\tapplied={}\tdry_run={}", batch.dir_id, report.files.len(), report.dry_run);
    }
    Ok(())
}

fn cmd_daemon(roots: &[PathBuf], library_root: &Path, dry_run: bool, store: &DirectoryStateStore, config: &AppConfig) -> Result<(), CliError> {
    let batches = scan_sorted(roots)?;
    let provider_client = build_provider_client(config);
    let allowed_roots = vec![library_root.to_path_buf()];

    for batch in &batches {
        let outcome = match pipeline::resolve_batch(batch, store, &provider_client) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(target: "cli::daemon", dir_id = %batch.dir_id, %err, "resolve failed, skipping directory");
                continue;
            }
        };
        pipeline::log_outcome(&outcome);
        if outcome.needs_prompt || outcome.state == DirectoryState::Jailed {
            continue;
        }

        let Some(record) = record_for(store, &batch.dir_id)? else { continue };
        let (plan, tag_patch) = match pipeline::plan_batch(batch, &record, library_root, store) {
            Ok(pair) => pair,
            Err(pipeline::PlanningError::NotResolved) | Err(pipeline::PlanningError::NoPinnedRelease) => {
                pipeline::warn_skip(&batch.dir_id, "not ready to plan");
                continue;
            }
            Err(pipeline::PlanningError::Planner(err)) => {
                warn!(target: "cli::daemon", dir_id = %batch.dir_id, %err, "planning failed, skipping directory");
                continue;
            }
            Err(pipeline::PlanningError::Store(err)) => {
                warn!(target: "cli::daemon", dir_id = %batch.dir_id, %err, "state store read failed, skipping directory");
                continue;
            }
        };
        pipeline::mark_planned(store, &batch.dir_id)?;

        match pipeline::apply_plan(&plan, &tag_patch, store, &allowed_roots, dry_run, &config.tag_writer_backend) {
            Ok(report) => println!("{}\tapplied={}\tdry_run={}", batch.dir_id, report.files.len(), report.dry_run),
            Err(err) => warn!(target: "cli::daemon", dir_id = %batch.dir_id, %err, "apply failed, directory remains PLANNED"),
        }
    }
    Ok(())
}

/// Manually resolve a directory queued for review. This is the one place a
/// provider is searched for a directory that is not already resolved — the
/// chosen release is cached here, once, so the following plan/apply never
/// has to search again.
fn cmd_prompt(
    dir_id: &str,
    provider: &str,
    release_id: &str,
    confidence: f64,
    store: &DirectoryStateStore,
    provider_client: &dyn ProviderClient,
) -> Result<(), CliError> {
    if let Some(record) = record_for(store, dir_id)? {
        match locate_chosen_release(&record, provider, release_id, provider_client) {
            Some(release) => store.cache_release(dir_id, &release)?,
            None => pipeline::warn_skip(dir_id, "could not locate the chosen release via provider search; plan will fail until re-prompted"),
        }
    }

    let record = store.set_state(
        dir_id,
        DirectoryState::ResolvedUser,
        StatePins::Set {
            provider: provider.to_string(),
            release_id: release_id.to_string(),
            confidence,
            scoring_version: None,
        },
    )?;
    println!("{}\t{}", record.dir_id, record.state);
    Ok(())
}

/// Re-scan a directory at its last known path and search for the release the
/// user picked, so its full payload can be cached alongside the pin.
fn locate_chosen_release(record: &DirectoryRecord, provider: &str, release_id: &str, provider_client: &dyn ProviderClient) -> Option<ProviderRelease> {
    let scanner = LibraryScanner::new(vec![PathBuf::from(&record.last_seen_path)]);
    let batch = scanner.iter_directories().ok()?.into_iter().find(|b| b.dir_id == record.dir_id)?;
    let (source_files, _tags_per_file, artist_hint, album_hint) = pipeline::source_files_for(&batch);
    provider_client
        .search_by_metadata(artist_hint.as_deref(), album_hint.as_deref(), source_files.len())
        .into_iter()
        .find(|r| r.provider == provider && r.release_id == release_id)
}

fn cmd_unjail(dir_id: &str, store: &DirectoryStateStore) -> Result<(), CliError> {
    let record = store.set_state(dir_id, DirectoryState::New, StatePins::Clear)?;
    println!("{}\t{}", record.dir_id, record.state);
    Ok(())
}
