// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `lw run`: execute one session over the given job URLs.
//!
//! Uses the dry-run executor and a fixed-score matcher; the point is to
//! exercise policies, pacing, budgets, and the digest without touching
//! any real site.

use crate::dry_run::{DryRunExecutor, FixedScoreMatcher};
use crate::exit_error::{ExitError, EXIT_CANCELLED};
use clap::Args;
use lw_adapters::DesktopNotifyAdapter;
use lw_core::{SessionConfig, SessionLimits, SystemClock};
use lw_engine::{Engine, EngineConfig};
use lw_policy::{EffortPolicy, StealthPolicy};
use lw_storage::InMemoryRepository;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Args)]
pub struct RunArgs {
    /// Job posting URLs
    #[arg(required_unless_present = "urls_file")]
    pub urls: Vec<String>,
    /// File with one job URL per line
    #[arg(long)]
    pub urls_file: Option<PathBuf>,
    /// User identity recorded on the session
    #[arg(long, default_value = "local")]
    pub user: String,
    #[arg(long, default_value_t = 25)]
    pub max_items: u32,
    #[arg(long, default_value_t = 3600)]
    pub max_duration_secs: u64,
    #[arg(long, default_value_t = 3)]
    pub max_concurrency: u32,
    #[arg(long, default_value_t = 5.0)]
    pub budget: f64,
    /// Session-local timezone as a UTC offset in minutes
    #[arg(long, default_value_t = 0)]
    pub tz_offset_minutes: i32,
    /// Effort policy file (TOML)
    #[arg(long)]
    pub effort_policy: Option<PathBuf>,
    /// Stealth/domain policy file (TOML)
    #[arg(long)]
    pub stealth_policy: Option<PathBuf>,
    /// Simulated per-item browser time, in seconds
    #[arg(long, default_value_t = 2)]
    pub item_delay_secs: u64,
    /// Fixed match score the dry-run matcher assigns to every URL
    #[arg(long, default_value_t = 0.8)]
    pub match_score: f64,
}

pub fn run(args: RunArgs) -> Result<(), ExitError> {
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|err| ExitError::internal(format!("tokio runtime: {err}")))?;
    runtime.block_on(run_session(args))
}

async fn run_session(args: RunArgs) -> Result<(), ExitError> {
    let mut urls = args.urls.clone();
    if let Some(path) = &args.urls_file {
        let raw = std::fs::read_to_string(path)
            .map_err(|err| ExitError::config(format!("cannot read {}: {err}", path.display())))?;
        urls.extend(raw.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string));
    }
    if urls.is_empty() {
        return Err(ExitError::config("no job URLs given"));
    }

    let effort_policy = match &args.effort_policy {
        Some(path) => EffortPolicy::load(path)?,
        None => EffortPolicy::default(),
    };
    let stealth = match &args.stealth_policy {
        Some(path) => StealthPolicy::load(path)?,
        None => StealthPolicy::default(),
    };

    let repo = InMemoryRepository::new();
    let engine = Engine::new(
        DryRunExecutor { item_delay: Duration::from_secs(args.item_delay_secs) },
        FixedScoreMatcher { score: args.match_score },
        DesktopNotifyAdapter::new(),
        SystemClock,
        Arc::new(repo.clone()),
        effort_policy,
        stealth,
        EngineConfig { pool_size: args.max_concurrency.max(1) as usize, ..Default::default() },
    );

    let config = SessionConfig::new(args.user.clone())
        .limits(SessionLimits {
            max_items: args.max_items,
            max_duration: Duration::from_secs(args.max_duration_secs),
            max_concurrency: args.max_concurrency,
            budget_cost: args.budget,
            max_item_duration: Duration::from_secs(600),
        })
        .timezone_offset_minutes(args.tz_offset_minutes);

    let session = engine.create_session(&config).await?;
    let ids = engine.enqueue_items(session, &urls).await?;
    println!("session {session}: {} items queued", ids.len());
    engine.start(session).await?;

    let row = tokio::select! {
        row = engine.wait(session) => row?,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("cancelling session {session}");
            engine.cancel(session).await?;
            engine.wait(session).await?;
            print_digest(&repo, session).await;
            return Err(ExitError::new(EXIT_CANCELLED, "cancelled"));
        }
    };

    println!(
        "session {session} {}: attempted {}, submitted {}, failed {}, skipped {}",
        row.status,
        row.counters.attempted,
        row.counters.succeeded,
        row.counters.failed,
        row.counters.skipped
    );
    print_digest(&repo, session).await;
    engine.shutdown();
    Ok(())
}

async fn print_digest(repo: &InMemoryRepository, session: lw_core::SessionId) {
    use lw_storage::Repository as _;
    match repo.get_digest(session).await {
        Ok(Some(digest)) => match serde_json::to_string_pretty(&digest) {
            Ok(json) => println!("{json}"),
            Err(err) => tracing::warn!(error = %err, "digest serialization failed"),
        },
        Ok(None) => {}
        Err(err) => tracing::warn!(error = %err, "digest read failed"),
    }
}
