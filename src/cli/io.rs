use std::path::PathBuf;

use dialoguer::{theme::ColorfulTheme, Confirm, Input, Password, Select};

use crate::errors::MarketError;
use crate::forms::{FieldDescriptor, FieldKind};

use super::output::{self, MessageKind};
use super::runner::{PromptContext, PromptResponse, StepAction, StepContext, WizardInteraction};

const BACK_TOKEN: &str = ":back";
const CANCEL_TOKEN: &str = ":cancel";

/// Prompt the user for confirmation with a yes/no question.
pub fn confirm_action(
    theme: &ColorfulTheme,
    prompt: &str,
    default: bool,
) -> Result<bool, MarketError> {
    Confirm::with_theme(theme)
        .with_prompt(prompt)
        .default(default)
        .interact()
        .map_err(MarketError::from)
}

/// Prompt the user for free-form text input.
pub fn prompt_text(theme: &ColorfulTheme, prompt: &str) -> Result<String, MarketError> {
    Input::<String>::with_theme(theme)
        .with_prompt(prompt)
        .interact_text()
        .map_err(MarketError::from)
}

pub fn prompt_secret(theme: &ColorfulTheme, prompt: &str) -> Result<String, MarketError> {
    Password::with_theme(theme)
        .with_prompt(prompt)
        .interact()
        .map_err(MarketError::from)
}

/// Prompt label, starred when the field must be filled in.
fn field_label(field: &FieldDescriptor) -> String {
    if field.is_required() {
        format!("{} *", field.label)
    } else {
        field.label.to_string()
    }
}

/// Terminal front end backed by dialoguer prompts.
pub struct TerminalInteraction {
    theme: ColorfulTheme,
}

impl TerminalInteraction {
    pub fn new() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }

    fn prompt_choice(&self, context: &PromptContext<'_>, options: &[&str]) -> PromptResponse {
        let current = context
            .current
            .as_deref()
            .and_then(|value| options.iter().position(|option| *option == value))
            .unwrap_or(0);
        match Select::with_theme(&self.theme)
            .with_prompt(field_label(context.field))
            .items(options)
            .default(current)
            .interact_opt()
        {
            Ok(Some(index)) => PromptResponse::Value(options[index].to_string()),
            Ok(None) => PromptResponse::Back,
            Err(_) => PromptResponse::Cancel,
        }
    }

    fn prompt_flag(&self, context: &PromptContext<'_>) -> PromptResponse {
        let current = context.current.as_deref() == Some("yes");
        match Confirm::with_theme(&self.theme)
            .with_prompt(field_label(context.field))
            .default(current)
            .interact_opt()
        {
            Ok(Some(flag)) => PromptResponse::Value(flag.to_string()),
            Ok(None) => PromptResponse::Back,
            Err(_) => PromptResponse::Cancel,
        }
    }

    fn prompt_free_text(&self, context: &PromptContext<'_>) -> PromptResponse {
        let mut input = Input::<String>::with_theme(&self.theme)
            .with_prompt(field_label(context.field))
            .allow_empty(true);
        if let Some(current) = context.current.as_ref().filter(|value| !value.is_empty()) {
            input = input.default(current.clone());
        }
        match input.interact_text() {
            Ok(text) if text.trim() == BACK_TOKEN => PromptResponse::Back,
            Ok(text) if text.trim() == CANCEL_TOKEN => PromptResponse::Cancel,
            Ok(text) => PromptResponse::Value(text),
            Err(_) => PromptResponse::Cancel,
        }
    }

    fn prompt_paths(&self) -> Option<Vec<PathBuf>> {
        let raw = prompt_text(&self.theme, "Image paths (comma separated)").ok()?;
        let paths: Vec<PathBuf> = raw
            .split(',')
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .map(PathBuf::from)
            .collect();
        if paths.is_empty() {
            None
        } else {
            Some(paths)
        }
    }
}

impl Default for TerminalInteraction {
    fn default() -> Self {
        Self::new()
    }
}

impl WizardInteraction for TerminalInteraction {
    fn prompt_field(&mut self, context: &PromptContext<'_>) -> PromptResponse {
        if let Some(error) = context.error {
            output::error(error);
        }
        if let Some(help) = context.field.help {
            output::info(help);
        }
        match &context.field.kind {
            FieldKind::Choice(options) => self.prompt_choice(context, options),
            FieldKind::Flag => self.prompt_flag(context),
            FieldKind::Secret => match prompt_secret(&self.theme, &field_label(context.field)) {
                Ok(secret) => PromptResponse::Value(secret),
                Err(_) => PromptResponse::Cancel,
            },
            FieldKind::Text | FieldKind::LongText | FieldKind::Number => {
                self.prompt_free_text(context)
            }
        }
    }

    fn choose_action(&mut self, context: &StepContext<'_>) -> StepAction {
        output::section(format!(
            "Step {} of {}: {}",
            context.index + 1,
            context.count,
            context.title
        ));
        if context.accepts_images {
            output::info(format!(
                "{} of {} image(s) staged",
                context.staged.len(),
                context.max_images
            ));
            for (slot, asset) in context.staged.iter().enumerate() {
                output::info(format!("  {}. {} ({})", slot + 1, asset.name, asset.preview));
            }
        }

        loop {
            let mut actions = vec![(
                if context.is_last { "Submit" } else { "Next" },
                StepAction::Next,
            )];
            if context.index > 0 {
                actions.push(("Back", StepAction::Back));
            }
            if context.accepts_images {
                actions.push(("Add images", StepAction::AddImages(Vec::new())));
                if !context.staged.is_empty() {
                    actions.push(("Remove an image", StepAction::RemoveImage(0)));
                }
            }
            actions.push(("Cancel", StepAction::Cancel));
            let labels: Vec<&str> = actions.iter().map(|(label, _)| *label).collect();

            let picked = match Select::with_theme(&self.theme)
                .with_prompt("What next?")
                .items(&labels)
                .default(0)
                .interact_opt()
            {
                Ok(Some(index)) => actions.swap_remove(index).1,
                Ok(None) | Err(_) => return StepAction::Cancel,
            };
            match picked {
                StepAction::AddImages(_) => match self.prompt_paths() {
                    Some(paths) => return StepAction::AddImages(paths),
                    None => output::warning("No image paths entered"),
                },
                StepAction::RemoveImage(_) => {
                    match Input::<usize>::with_theme(&self.theme)
                        .with_prompt("Image number to remove")
                        .interact_text()
                    {
                        Ok(number) if number > 0 => return StepAction::RemoveImage(number - 1),
                        _ => output::warning("Enter the number shown next to the image"),
                    }
                }
                other => return other,
            }
        }
    }

    fn notify(&mut self, kind: MessageKind, message: &str) {
        output::print(kind, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forms::Rule;

    #[test]
    fn required_fields_are_starred() {
        let name = FieldDescriptor::new("itemName", "Item name", FieldKind::Text)
            .rule(Rule::Required, "Item name is required");
        let price = FieldDescriptor::new("price", "Price", FieldKind::Number)
            .rule(Rule::RequiredUnless("isFree"), "Price is required unless free");
        let notes = FieldDescriptor::new("conditionNotes", "Condition notes", FieldKind::Text);

        assert_eq!(field_label(&name), "Item name *");
        assert_eq!(field_label(&price), "Price *");
        assert_eq!(field_label(&notes), "Condition notes");
    }
}
