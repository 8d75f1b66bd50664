use anyhow::{Context, Result};
use inquire::{Confirm, InquireError, Select};
use log::{debug, warn};
use std::fmt;
use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;
use voiceover_wizard::core::config::Config;
use voiceover_wizard::core::io::NativeStorage;
use voiceover_wizard::core::resource::ResourceRegistry;
use voiceover_wizard::core::state::{VoiceOverPhase, WizardSnapshot};
use voiceover_wizard::services::api::HttpScriptApi;
use voiceover_wizard::services::observer::{LogObserver, ProgressObserver, WizardObserver};
use voiceover_wizard::services::playback::{playback_channel, PlaybackElement, PlaybackEvents};
use voiceover_wizard::services::setup;
use voiceover_wizard::services::wizard::WizardController;

const LOAD_WAIT: Duration = Duration::from_secs(10);
const LOAD_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Generate,
    ViewScript,
    EditScript,
    ExportScript,
    CreateVoiceOver,
    EditVoiceOverText,
    GenerateAudio,
    PlayPause,
    ExportAudio,
    BackToTextOptions,
    BackToScript,
    Retry,
    CreateNew,
    Quit,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Action::Generate => "Generate script",
            Action::ViewScript => "View script",
            Action::EditScript => "Edit script",
            Action::ExportScript => "Download script (.md)",
            Action::CreateVoiceOver => "Create AI voice-over",
            Action::EditVoiceOverText => "Edit voice-over text",
            Action::GenerateAudio => "Generate audio",
            Action::PlayPause => "Play / Pause",
            Action::ExportAudio => "Download audio",
            Action::BackToTextOptions => "Back to text options",
            Action::BackToScript => "Back to script",
            Action::Retry => "Try preparing text again",
            Action::CreateNew => "Create new script",
            Action::Quit => "Quit",
        };
        f.write_str(label)
    }
}

fn actions_for(snap: &WizardSnapshot) -> Vec<Action> {
    let mut actions = if !snap.wizard.show_result {
        vec![Action::Generate]
    } else {
        match snap.voice_phase() {
            VoiceOverPhase::Idle => vec![
                Action::ViewScript,
                Action::EditScript,
                Action::ExportScript,
                Action::CreateVoiceOver,
            ],
            VoiceOverPhase::TextReady => vec![
                Action::EditVoiceOverText,
                Action::GenerateAudio,
                Action::BackToScript,
            ],
            VoiceOverPhase::PlaybackReady => vec![
                Action::PlayPause,
                Action::ExportAudio,
                Action::BackToTextOptions,
            ],
            VoiceOverPhase::SynthesizingAudio => vec![Action::BackToTextOptions],
            VoiceOverPhase::Failed => vec![Action::Retry, Action::BackToScript],
            VoiceOverPhase::PreparingText => Vec::new(),
        }
    };
    actions.push(Action::CreateNew);
    actions.push(Action::Quit);
    actions
}

fn create_player(events: PlaybackEvents) -> Arc<dyn PlaybackElement> {
    #[cfg(feature = "rodio")]
    {
        Arc::new(voiceover_wizard::services::playback::RodioPlayback::new(events))
    }
    #[cfg(not(feature = "rodio"))]
    {
        println!("Built without audio output; use \"Download audio\" to listen to voice-overs.");
        Arc::new(voiceover_wizard::services::playback::HeadlessPlayback::new(events))
    }
}

/// Progress bars only make sense on a terminal; otherwise everything goes to the log.
fn create_observer() -> Arc<dyn WizardObserver> {
    if std::io::stdout().is_terminal() {
        Arc::new(ProgressObserver::new())
    } else {
        Arc::new(LogObserver)
    }
}

fn print_script(snap: &WizardSnapshot) {
    println!(
        "\n{} ({}, {} min)\n\n{}\n",
        snap.wizard.title.trim(),
        snap.wizard.platform_label(),
        snap.wizard.duration,
        snap.wizard.generated_script
    );
}

/// The player reports readiness asynchronously.
async fn wait_for_load(wizard: &WizardController) {
    let mut waited = Duration::ZERO;
    while wizard.snapshot().voice_phase() == VoiceOverPhase::SynthesizingAudio && waited < LOAD_WAIT {
        tokio::time::sleep(LOAD_POLL).await;
        waited += LOAD_POLL;
    }
    if wizard.snapshot().voice_phase() == VoiceOverPhase::SynthesizingAudio {
        warn!("The player has not reported the audio as loaded yet");
    }
}

/// Runs one menu action. Returns `false` to quit.
async fn run_action(wizard: &WizardController, storage: &NativeStorage, action: Action) -> Result<bool> {
    debug!("Menu action: {:?}", action);
    match action {
        Action::Generate => {
            // Failures are reported through the observer; the user can trigger it again.
            let _ = wizard.simulate_and_generate().await;
            let snap = wizard.snapshot();
            if snap.wizard.show_result {
                print_script(&snap);
            }
        }
        Action::ViewScript => print_script(&wizard.snapshot()),
        Action::EditScript => {
            let current = wizard.snapshot().wizard.generated_script;
            let edited = setup::prompt_multiline("Edit the script.", &current)?;
            wizard.set_generated_script(&edited)?;
        }
        Action::ExportScript => {
            let path = wizard.export_script(storage).await?;
            println!("Saved {}", storage.root().join(path).display());
        }
        Action::CreateVoiceOver | Action::Retry => {
            let result = if action == Action::Retry {
                wizard.retry_voice_over().await
            } else {
                wizard.prepare_speakable_text().await
            };
            result?;
            if let Some(voice) = wizard.snapshot().voice_over {
                println!("\nText for voice-over:\n{}\n", voice.speakable_text);
            }
        }
        Action::EditVoiceOverText => {
            let current = wizard
                .snapshot()
                .voice_over
                .map(|v| v.speakable_text)
                .unwrap_or_default();
            let edited = setup::prompt_multiline("Edit the voice-over text.", &current)?;
            wizard.set_speakable_text(&edited)?;
        }
        Action::GenerateAudio => {
            let text = wizard
                .snapshot()
                .voice_over
                .map(|v| v.speakable_text)
                .unwrap_or_default();
            match wizard.synthesize_audio(&text).await {
                Ok(_) => wait_for_load(wizard).await,
                Err(e) if e.is_validation() => println!("{}", e.user_message()),
                // Already surfaced by the observer.
                Err(_) => {}
            }
        }
        Action::PlayPause => {
            // A refused play() is surfaced by the observer and moves to the failed state.
            let _ = wizard.toggle_playback().await;
        }
        Action::ExportAudio => {
            let path = wizard.export_audio(storage).await?;
            println!("Saved {}", storage.root().join(path).display());
        }
        Action::BackToTextOptions => wizard.back_to_text_options()?,
        Action::BackToScript => wizard.back_to_script()?,
        Action::CreateNew => {
            let confirmed = Confirm::new("Discard this script and start over?")
                .with_default(false)
                .prompt()?;
            if confirmed {
                wizard.reset_wizard();
                if !setup::run_form(wizard)? {
                    return Ok(false);
                }
            }
        }
        Action::Quit => return Ok(false),
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    // 1. Load or Create Config
    let config = Config::load_or_default().context("Failed to load config.yml")?;
    config.ensure_directories()?;

    // 2. Backend client, storage and player
    let api = Arc::new(HttpScriptApi::new(&config.api)?);
    let storage = NativeStorage::new(&config.output_folder);
    let (events, event_rx) = playback_channel();
    let player = create_player(events);

    // 3. Controller
    let wizard = WizardController::new(
        config.wizard.clone(),
        api,
        player,
        ResourceRegistry::new(),
        create_observer(),
    );
    let pump = wizard.spawn_event_pump(event_rx);

    // 4. Form, then the result menu
    if setup::run_form(&wizard)? {
        loop {
            let snap = wizard.snapshot();
            let action = Select::new("What next?", actions_for(&snap)).prompt()?;
            match run_action(&wizard, &storage, action).await {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    if let Some(InquireError::OperationInterrupted) = e.downcast_ref::<InquireError>() {
                        break;
                    }
                    eprintln!("Error: {:#}", e);
                    wizard.dismiss_error();
                }
            }
        }
    }

    wizard.teardown();
    // The pump ends once the player, and with it the event sender, is gone.
    drop(wizard);
    let _ = pump.await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use voiceover_wizard::core::config::WizardConfig;
    use voiceover_wizard::core::state::{VoiceOverSnapshot, WizardState};

    fn snapshot(show_result: bool, phase: Option<VoiceOverPhase>) -> WizardSnapshot {
        let mut wizard = WizardState::new(&WizardConfig::default());
        wizard.show_result = show_result;
        WizardSnapshot {
            session: 1,
            wizard,
            voice_over: phase.map(|phase| VoiceOverSnapshot {
                phase,
                speakable_text: String::new(),
                audio: None,
                is_playing: false,
            }),
            last_error: None,
        }
    }

    #[test]
    fn test_menu_follows_phase() {
        assert_eq!(
            actions_for(&snapshot(false, None)),
            vec![Action::Generate, Action::CreateNew, Action::Quit]
        );
        assert!(actions_for(&snapshot(true, None)).contains(&Action::CreateVoiceOver));
        assert!(actions_for(&snapshot(true, Some(VoiceOverPhase::PlaybackReady)))
            .contains(&Action::PlayPause));
        let failed = actions_for(&snapshot(true, Some(VoiceOverPhase::Failed)));
        assert!(failed.contains(&Action::Retry));
        assert!(!failed.contains(&Action::PlayPause));
    }
}
