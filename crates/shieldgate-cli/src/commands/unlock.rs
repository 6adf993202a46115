use chrono::Utc;
use clap::Subcommand;
use serde::Serialize;
use shieldgate_core::triggers::interactive;
use shieldgate_core::RestrictionTarget;

use super::{print_events, print_json, CliResult, Host};

#[derive(Subcommand)]
pub enum UnlockAction {
    /// How long the next attention task must run
    Required {
        #[arg(long)]
        target: RestrictionTarget,
    },
    /// Report a finished attention task
    Complete {
        #[arg(long)]
        target: RestrictionTarget,
        #[arg(long)]
        seconds: u64,
    },
    /// Access left on an active exemption
    Remaining {
        #[arg(long)]
        target: RestrictionTarget,
    },
}

#[derive(Serialize)]
struct Remaining {
    target: RestrictionTarget,
    exempt: bool,
    remaining_secs: i64,
}

pub fn run(action: UnlockAction) -> CliResult {
    let host = Host::load()?;
    let now = Utc::now();
    match action {
        UnlockAction::Required { target } => {
            let requirement = host.controller()?.requirement(&target, now)?;
            print_json(&requirement)?;
        }
        UnlockAction::Complete { target, seconds } => {
            let mut controller = host.controller()?;
            let events = interactive::report_completed(&mut controller, &target, seconds, now)?;
            print_events(&events)?;
        }
        UnlockAction::Remaining { target } => {
            let remaining = host.controller()?.exemption_remaining(&target, now)?;
            print_json(&Remaining {
                target,
                exempt: remaining.is_some(),
                remaining_secs: remaining.map(|d| d.num_seconds()).unwrap_or(0),
            })?;
        }
    }
    Ok(())
}
