// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `lw check`: validate policy and profile config files.

use crate::exit_error::ExitError;
use clap::Args;
use lw_policy::{EffortPolicy, ProfileTruth, StealthPolicy};
use std::path::PathBuf;

#[derive(Args)]
pub struct CheckArgs {
    /// Effort policy file (TOML)
    #[arg(long)]
    pub effort_policy: Option<PathBuf>,
    /// Stealth/domain policy file (TOML)
    #[arg(long)]
    pub stealth_policy: Option<PathBuf>,
    /// Profile truth file (TOML)
    #[arg(long)]
    pub profile: Option<PathBuf>,
}

pub fn run(args: CheckArgs) -> Result<(), ExitError> {
    if args.effort_policy.is_none() && args.stealth_policy.is_none() && args.profile.is_none() {
        return Err(ExitError::config("nothing to check; pass at least one file"));
    }

    if let Some(path) = &args.effort_policy {
        let policy = EffortPolicy::load(path)?;
        let dead = policy.rules.iter().filter(|rule| rule.expr.is_none()).count();
        println!(
            "effort policy ok: {} rules ({} with unparseable predicates), skip_threshold {}",
            policy.rules.len(),
            dead,
            policy.skip_threshold
        );
    }
    if let Some(path) = &args.stealth_policy {
        let stealth = StealthPolicy::load(path)?;
        println!("stealth policy ok: {} domain entries", stealth.domains.len());
    }
    if let Some(path) = &args.profile {
        let truth = ProfileTruth::load(path)?;
        println!(
            "profile truth ok: {} true skills, {} false skills",
            truth.skills_true.len(),
            truth.skills_false.len()
        );
    }
    Ok(())
}
