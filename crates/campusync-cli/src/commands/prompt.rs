use campusync_core::{Config, InstallPrompt};
use clap::Subcommand;

use super::{open_store, CliResult};

#[derive(Subcommand)]
pub enum PromptAction {
    /// Record that the install prompt was dismissed now
    Dismiss,
    /// Show whether the install prompt would be offered
    Status,
    /// Forget the last dismissal
    Reset,
}

pub fn run(action: PromptAction) -> CliResult {
    let config = Config::load_or_default();
    let prompt = InstallPrompt::new(open_store()?, &config);

    match action {
        PromptAction::Dismiss => {
            let at = prompt.dismiss()?;
            println!(
                "dismissed at {}, hidden for {} day(s)",
                at.to_rfc3339(),
                config.install_prompt.cooldown_days
            );
        }
        PromptAction::Status => {
            match prompt.last_dismissed() {
                Some(at) => println!("Last dismissed: {}", at.to_rfc3339()),
                None => println!("Last dismissed: never"),
            }
            println!("Show prompt:    {}", if prompt.should_show() { "yes" } else { "no" });
        }
        PromptAction::Reset => {
            prompt.reset()?;
            println!("install prompt record cleared");
        }
    }
    Ok(())
}
