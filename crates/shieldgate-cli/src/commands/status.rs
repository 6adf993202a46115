use chrono::Utc;

use super::{print_json, CliResult, Host};

pub fn run() -> CliResult {
    let host = Host::load()?;
    let snapshot = host.controller()?.snapshot(Utc::now())?;
    print_json(&snapshot)
}
