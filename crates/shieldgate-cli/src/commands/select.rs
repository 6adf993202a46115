use chrono::Utc;
use clap::Subcommand;
use shieldgate_core::{RestrictionSelection, RestrictionTarget, TargetKind};

use super::{print_events, print_json, CliResult, Host};

#[derive(Subcommand)]
pub enum SelectAction {
    /// Show the stored selection
    Show,
    /// Replace the selection (targets are base64 tokens)
    Set {
        #[arg(long = "app")]
        apps: Vec<RestrictionTarget>,
        #[arg(long = "app-category")]
        app_categories: Vec<RestrictionTarget>,
        #[arg(long = "domain")]
        domains: Vec<RestrictionTarget>,
        #[arg(long = "domain-category")]
        domain_categories: Vec<RestrictionTarget>,
    },
    /// Remove every target
    Clear,
}

pub fn run(action: SelectAction) -> CliResult {
    let host = Host::load()?;
    match action {
        SelectAction::Show => {
            let selection = host.shared()?.load_selection()?;
            print_json(&selection)?;
        }
        SelectAction::Set {
            apps,
            app_categories,
            domains,
            domain_categories,
        } => {
            let mut selection = RestrictionSelection::new();
            for (kind, targets) in [
                (TargetKind::App, apps),
                (TargetKind::AppCategory, app_categories),
                (TargetKind::Domain, domains),
                (TargetKind::DomainCategory, domain_categories),
            ] {
                for target in targets {
                    selection.insert(kind, target);
                }
            }
            let events = host.controller()?.on_selection_changed(&selection, Utc::now())?;
            print_events(&events)?;
        }
        SelectAction::Clear => {
            let events = host
                .controller()?
                .on_selection_changed(&RestrictionSelection::new(), Utc::now())?;
            print_events(&events)?;
        }
    }
    Ok(())
}
