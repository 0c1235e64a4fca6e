//! Discord slash commands over the entity caches.

use crate::state::AppState;
use std::fmt::Write;

pub mod autocomplete;
pub mod commands;
pub mod utils;

pub type Error = anyhow::Error;

/// Shared with every command invocation.
pub struct Data {
    pub app_state: AppState,
}
pub type Context<'a> = poise::Context<'a, Data, Error>;

pub fn get_commands() -> Vec<poise::Command<Data, Error>> {
    vec![
        commands::item(),
        commands::recipe(),
        commands::mob(),
        commands::commodity(),
        commands::vehicle(),
        commands::server(),
        commands::status(),
        commands::purge(),
    ]
}

/// Canonical text form of the command tree, compared against the stored copy
/// to decide whether Discord needs a re-registration.
///
/// Covers names, descriptions, and each parameter's name, description, and
/// whether it is required. Order-independent.
pub fn commands_fingerprint(commands: &[poise::Command<Data, Error>]) -> String {
    let mut parts: Vec<String> = commands
        .iter()
        .map(|cmd| {
            let mut line = format!("{}:{}(", cmd.name, cmd.description.as_deref().unwrap_or_default());
            for (i, param) in cmd.parameters.iter().enumerate() {
                if i > 0 {
                    line.push(',');
                }
                let _ = write!(
                    line,
                    "{}:{}:{}",
                    param.name,
                    param.description.as_deref().unwrap_or_default(),
                    param.required
                );
            }
            line.push(')');
            line
        })
        .collect();
    parts.sort_unstable();
    parts.join(";")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_and_covers_every_command() {
        let a = commands_fingerprint(&get_commands());
        let b = commands_fingerprint(&get_commands());
        assert_eq!(a, b);
        for name in ["item", "recipe", "mob", "commodity", "vehicle", "server", "status", "purge"] {
            assert!(a.contains(&format!("{name}:")), "{name} missing from {a}");
        }
    }
}
