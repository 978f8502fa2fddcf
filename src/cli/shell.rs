use std::sync::Arc;

use dialoguer::{theme::ColorfulTheme, Select};
use tracing::info;

use crate::backend::{Backend, JsonBackend};
use crate::config::{Config, ConfigManager};
use crate::errors::{MarketError, Result};
use crate::flows::{FlowSpec, ListingFlow, ProfileFlow, SignupFlow};
use crate::wizard::{Wizard, WizardError};

use super::io::{confirm_action, prompt_secret, prompt_text, TerminalInteraction};
use super::output;
use super::runner::{run_wizard, CliOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MenuEntry {
    SignUp,
    SignIn,
    Profile,
    PostItem,
    SignOut,
    Quit,
}

impl MenuEntry {
    const ALL: [MenuEntry; 6] = [
        MenuEntry::SignUp,
        MenuEntry::SignIn,
        MenuEntry::Profile,
        MenuEntry::PostItem,
        MenuEntry::SignOut,
        MenuEntry::Quit,
    ];

    fn label(&self) -> &'static str {
        match self {
            MenuEntry::SignUp => "Create an account",
            MenuEntry::SignIn => "Sign in",
            MenuEntry::Profile => "Set up your profile",
            MenuEntry::PostItem => "Post an item",
            MenuEntry::SignOut => "Sign out",
            MenuEntry::Quit => "Quit",
        }
    }
}

/// Interactive entry point used by the `campus_market_cli` binary.
pub async fn run_cli() -> Result<()> {
    let manager = ConfigManager::new()?;
    let config = manager.load()?;
    config.validate()?;
    let root = manager.backend_root(&config);
    info!(root = %root.display(), "opening local backend");
    let backend = Backend::from_shared(Arc::new(JsonBackend::new(root)?));
    run_menu(&config, &backend).await
}

async fn run_menu(config: &Config, backend: &Backend) -> Result<()> {
    let theme = ColorfulTheme::default();
    let labels: Vec<&str> = MenuEntry::ALL.iter().map(MenuEntry::label).collect();
    loop {
        if let Some(user) = backend.auth.current_user().await? {
            output::info(format!("Signed in as {}", user.email));
        }
        let Some(index) = Select::with_theme(&theme)
            .with_prompt("Campus Market")
            .items(&labels)
            .default(0)
            .interact_opt()?
        else {
            return Ok(());
        };
        match MenuEntry::ALL[index] {
            MenuEntry::SignUp => run_flow(SignupFlow::new(), backend).await?,
            MenuEntry::SignIn => sign_in(&theme, backend).await?,
            MenuEntry::Profile => run_flow(ProfileFlow::new(config), backend).await?,
            MenuEntry::PostItem => run_flow(ListingFlow::new(config), backend).await?,
            MenuEntry::SignOut => {
                if confirm_action(&theme, "Sign out?", true)? {
                    backend.auth.sign_out().await?;
                    output::success("Signed out");
                }
            }
            MenuEntry::Quit => return Ok(()),
        }
    }
}

async fn sign_in(theme: &ColorfulTheme, backend: &Backend) -> Result<()> {
    let email = prompt_text(theme, "Email")?;
    let password = prompt_secret(theme, "Password")?;
    match backend.auth.sign_in(email.trim(), &password).await {
        Ok(user) => output::success(format!("Welcome back, {}", user.email)),
        Err(err) => output::error(err),
    }
    Ok(())
}

async fn run_flow<F: FlowSpec>(flow: F, backend: &Backend) -> Result<()> {
    let mut wizard = match Wizard::start(flow, backend.clone()).await {
        Ok(wizard) => wizard,
        Err(err @ WizardError::AuthRequired) => {
            output::warning(&err);
            if let Some(route) = err.redirect() {
                output::info(format!("Next: {}", route));
            }
            return Ok(());
        }
        Err(err) => return Err(MarketError::from(err)),
    };
    let mut interaction = TerminalInteraction::new();
    match run_wizard(&mut wizard, &mut interaction).await? {
        CliOutcome::Completed(route) => {
            output::success("All set");
            output::info(format!("Next: {}", route));
        }
        CliOutcome::Cancelled => output::warning("Cancelled; nothing was saved"),
    }
    wizard.close();
    Ok(())
}
