//! Top-level action menu

use super::auth_method::choose_auth_methods;
use super::role::choose_role_option;
use super::secret::choose_secret_option;
use crate::config::ProvisionConfig;
use crate::error::Result;
use crate::prompts::Prompter;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    CreateSecrets,
    CreateAuthMethods,
    CreateAccessRoles,
}

impl MenuAction {
    pub const ALL: [Self; 3] = [
        Self::CreateSecrets,
        Self::CreateAuthMethods,
        Self::CreateAccessRoles,
    ];
}

impl fmt::Display for MenuAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::CreateSecrets => "Create Secret(s)",
            Self::CreateAuthMethods => "Create Auth Method(s)",
            Self::CreateAccessRoles => "Create Access Role(s)",
        })
    }
}

/// Ask which actions to run, without repeats, in the order chosen.
pub fn choose_actions(prompter: &mut Prompter) -> Result<Vec<MenuAction>> {
    let selected = prompter.choose_many(
        &MenuAction::ALL,
        "Select the numbers of what you would like to do:",
    )?;
    let mut actions = Vec::with_capacity(selected.len());
    for action in selected {
        if !actions.contains(action) {
            actions.push(*action);
        }
    }
    Ok(actions)
}

/// Run each chosen action as a standalone workflow.
pub async fn run_menu(config: &ProvisionConfig, prompter: &mut Prompter) -> Result<Vec<MenuAction>> {
    let actions = choose_actions(prompter)?;
    if actions.is_empty() {
        crate::warn!("Nothing selected");
    }

    for action in &actions {
        tracing::debug!(%action, "menu action");
        match action {
            MenuAction::CreateSecrets => {
                choose_secret_option(config, prompter).await?;
            }
            MenuAction::CreateAuthMethods => {
                choose_auth_methods(config, prompter, None).await?;
            }
            MenuAction::CreateAccessRoles => {
                choose_role_option(config, prompter, None, None).await?;
            }
        }
    }
    Ok(actions)
}
