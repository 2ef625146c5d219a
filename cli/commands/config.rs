use crate::Session;
use crate::cli_args::ConfigAction;
use crate::output::{print_json, print_success, write_to_stdout};
use anyhow::{Context, Result};
use colored::*;

pub fn handle_config_command(
    action: ConfigAction,
    session: &mut Session,
    quiet: bool,
) -> Result<()> {
    match action {
        ConfigAction::Show => print_json(&session.config)?,
        ConfigAction::Path => match session.config_path() {
            Some(path) => write_to_stdout(&path.display().to_string())?,
            None => {
                if !quiet {
                    println!("{}", "Stored configuration disabled (--no-config).".yellow());
                }
            }
        },
        ConfigAction::Set { key, value } => {
            let store = session.store_mut()?;
            store
                .set_value(&key, &value)
                .with_context(|| format!("Failed to set '{}'", key))?;
            let updated = store.config().clone();
            session.config = updated;
            print_success(&format!("{} = {}", key.cyan(), value), quiet);
        }
        ConfigAction::Reset => {
            let store = session.store_mut()?;
            store.reset().context("Failed to reset configuration")?;
            let updated = store.config().clone();
            session.config = updated;
            print_success("Configuration reset to defaults", quiet);
        }
    }
    Ok(())
}
