use chrono::{DateTime, Duration, Utc};
use clap::Subcommand;
use shieldgate_core::RestrictionTarget;

use super::{print_events, print_json, CliResult, Host};

#[derive(Subcommand)]
pub enum SessionsAction {
    /// Unlock sessions granted in the last N hours
    List {
        #[arg(long)]
        target: Option<RestrictionTarget>,
        #[arg(long, default_value_t = 24)]
        hours: i64,
    },
    /// Sessions still granting access
    Active,
    /// Delete history older than the escalation window plus margin
    Prune,
    /// Per-day unlock counts and attention time
    Usage {
        #[arg(long, default_value_t = 7)]
        days: i64,
    },
}

pub fn run(action: SessionsAction) -> CliResult {
    let host = Host::load()?;
    let now = Utc::now();
    match action {
        SessionsAction::List { target, hours } => {
            let sessions = host.sessions()?;
            let since = looking_back(now, Duration::try_hours(hours), "--hours")?;
            let list = match target {
                Some(target) => sessions.recent_sessions(&target, since)?,
                None => sessions.sessions_since(since)?,
            };
            print_json(&list)?;
        }
        SessionsAction::Active => {
            print_json(&host.sessions()?.active_sessions(now)?)?;
        }
        SessionsAction::Prune => {
            let margin = host.config.sessions.prune_margin();
            let event = host.controller()?.prune_history(margin, now)?;
            print_events(&[event])?;
        }
        SessionsAction::Usage { days } => {
            let since = looking_back(now, Duration::try_days(days), "--days")?;
            let usage = host.sessions()?.daily_usage(since)?;
            print_json(&usage)?;
        }
    }
    Ok(())
}

/// `now - span`, or an error naming `flag` when it does not fit the calendar.
fn looking_back(
    now: DateTime<Utc>,
    span: Option<Duration>,
    flag: &str,
) -> Result<DateTime<Utc>, String> {
    span.and_then(|span| now.checked_sub_signed(span))
        .ok_or_else(|| format!("{flag} is out of range"))
}
