use chrono::Utc;

use super::{print_events, CliResult, Host};

pub fn run() -> CliResult {
    let host = Host::load()?;
    let events = host.controller()?.force_relock_all(Utc::now())?;
    print_events(&events)
}
