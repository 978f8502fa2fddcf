pub mod io;
pub mod output;
pub mod runner;
mod shell;

pub use runner::{
    run_wizard, CliOutcome, PromptContext, PromptResponse, StepAction, StepContext,
    WizardInteraction,
};
pub use shell::run_cli;
