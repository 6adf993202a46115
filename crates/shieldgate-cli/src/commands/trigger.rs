use chrono::Utc;
use clap::Subcommand;
use shieldgate_core::triggers::{button, interactive, threshold};
use shieldgate_core::{IntervalTrigger, RestrictionTarget};

use super::{print_events, print_json, CliResult, Host, PrintLauncher};

#[derive(Subcommand)]
pub enum TriggerAction {
    /// Register the daily interval in schedule.json
    Install,
    /// Daily interval started
    IntervalStart,
    /// Daily interval ended
    IntervalEnd,
    /// A usage-threshold watch fired
    Threshold {
        #[arg(long)]
        target: Option<RestrictionTarget>,
    },
    /// The overlay's unlock button was pressed
    Button {
        #[arg(long)]
        target: RestrictionTarget,
        /// Label shown on the shield
        #[arg(long, default_value = "")]
        hint: String,
    },
    /// The interactive context came to the foreground
    Interactive,
}

pub fn run(action: TriggerAction) -> CliResult {
    let host = Host::load()?;
    let now = Utc::now();
    match action {
        TriggerAction::Install => {
            let trigger = IntervalTrigger::from_config(&host.config)?;
            trigger.install(&mut host.schedule_file()?)?;
            print_json(trigger.interval())?;
        }
        TriggerAction::IntervalStart => {
            let trigger = IntervalTrigger::from_config(&host.config)?;
            let event = trigger.on_start(&mut host.controller()?, now)?;
            print_events(&[event])?;
        }
        TriggerAction::IntervalEnd => {
            let trigger = IntervalTrigger::from_config(&host.config)?;
            let events = trigger.on_end(&mut host.controller()?, now)?;
            print_events(&events)?;
        }
        TriggerAction::Threshold { target } => {
            let event = threshold::on_reached(&mut host.controller()?, target.as_ref(), now)?;
            print_events(&[event])?;
        }
        TriggerAction::Button { target, hint } => {
            let event = button::on_press(&host.shared()?, &mut PrintLauncher, &target, &hint, now)?;
            print_events(&[event])?;
        }
        TriggerAction::Interactive => match interactive::on_foreground(&host.controller()?, now)? {
            Some(event) => print_events(&[event])?,
            None => print_events(&[])?,
        },
    }
    Ok(())
}
