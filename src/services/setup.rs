use crate::core::state::{
    AGE_GROUPS, LAST_STEP, MIN_DURATION, PLATFORMS, STEP_AUDIENCE, STEP_DETAILS, STEP_PLATFORM,
    STEP_WELCOME,
};
use crate::services::wizard::WizardController;
use anyhow::{anyhow, Result};
use inquire::validator::{StringValidator, Validation};
use inquire::{Confirm, CustomType, MultiSelect, Select, Text};

/// Walks the user through the form steps until the instructions step is reached.
///
/// Returns `false` when the user chose not to start.
pub fn run_form(wizard: &WizardController) -> Result<bool> {
    loop {
        let step = wizard.snapshot().wizard.current_step;
        match step {
            STEP_WELCOME => {
                println!("Create a script for your next video, then turn it into a voice-over.");
                if !Confirm::new("Get started?").with_default(true).prompt()? {
                    return Ok(false);
                }
            }
            STEP_PLATFORM => prompt_platform(wizard)?,
            STEP_DETAILS => prompt_details(wizard)?,
            STEP_AUDIENCE => prompt_audience(wizard)?,
            LAST_STEP => {
                prompt_instructions(wizard)?;
                return Ok(true);
            }
            other => return Err(anyhow!("Unknown wizard step {}", other)),
        }

        if let Err(e) = wizard.advance() {
            // Stay on the step and ask again.
            println!("{}", e.user_message());
        }
    }
}

fn prompt_platform(wizard: &WizardController) -> Result<()> {
    let labels: Vec<&str> = PLATFORMS.iter().map(|(_, label)| *label).collect();
    let label = Select::new("Which platform is this video for?", labels).prompt()?;
    let key = PLATFORMS
        .iter()
        .find(|(_, l)| *l == label)
        .map(|(key, _)| *key)
        .unwrap_or(label);
    wizard.set_platform(key)?;
    Ok(())
}

fn prompt_details(wizard: &WizardController) -> Result<()> {
    let snap = wizard.snapshot().wizard;

    let title = Text::new("Video title:")
        .with_initial_value(&snap.title)
        .with_validator(NotBlank("Please enter a title."))
        .prompt()?;
    wizard.set_title(title.trim())?;

    let defaults: Vec<usize> = snap
        .available_tags
        .iter()
        .enumerate()
        .filter(|(_, tag)| snap.selected_tags.contains(tag))
        .map(|(i, _)| i)
        .collect();
    let chosen = MultiSelect::new("Tags (optional):", snap.available_tags.clone())
        .with_default(&defaults)
        .prompt()?;
    for tag in &snap.available_tags {
        if chosen.contains(tag) != snap.selected_tags.contains(tag) {
            wizard.toggle_tag(tag)?;
        }
    }

    let custom = Text::new("Custom tags, comma separated (optional):").prompt()?;
    for tag in custom.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        wizard.add_custom_tag(tag)?;
    }
    Ok(())
}

fn prompt_audience(wizard: &WizardController) -> Result<()> {
    let age_group = Select::new("Target audience:", AGE_GROUPS.to_vec()).prompt()?;
    wizard.set_age_group(age_group)?;

    let max = wizard.config().max_duration.max(MIN_DURATION);
    let current = wizard.snapshot().wizard.duration;
    let minutes = CustomType::<u8>::new("Video length in minutes:")
        .with_default(current)
        .with_help_message(&format!("{} to {}", MIN_DURATION, max))
        .with_error_message("Please enter a whole number of minutes.")
        .prompt()?;
    let stored = wizard.set_duration(minutes)?;
    if stored != minutes {
        println!("Using {} minutes.", stored);
    }
    Ok(())
}

fn prompt_instructions(wizard: &WizardController) -> Result<()> {
    let current = wizard.snapshot().wizard.custom_prompt;
    let prompt = Text::new("Anything else the script should cover? (optional)")
        .with_initial_value(&current)
        .prompt()?;
    wizard.set_custom_prompt(&prompt)?;
    Ok(())
}

/// Multi-line editing without an external editor: one line at a time, `.` on its own ends input.
pub fn prompt_multiline(message: &str, current: &str) -> Result<String> {
    println!("{}", message);
    println!("Current text:\n{}\n", current);
    println!("Enter the new text. A single '.' on a line finishes, an empty first line keeps the current text.");

    let mut lines: Vec<String> = Vec::new();
    loop {
        let line = Text::new(">").prompt()?;
        if line == "." {
            break;
        }
        if lines.is_empty() && line.is_empty() {
            return Ok(current.to_string());
        }
        lines.push(line);
    }
    Ok(lines.join("\n"))
}

#[derive(Clone)]
struct NotBlank(&'static str);

impl StringValidator for NotBlank {
    fn validate(&self, input: &str) -> Result<Validation, inquire::CustomUserError> {
        if input.trim().is_empty() {
            Ok(Validation::Invalid(self.0.into()))
        } else {
            Ok(Validation::Valid)
        }
    }
}
