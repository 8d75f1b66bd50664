use crate::core::config::WizardConfig;
use crate::core::error::{WizardError, WizardResult};
use crate::core::io::{file_stem_for, unused_path, Storage};
use crate::core::resource::ResourceRegistry;
use crate::core::state::{
    VoiceOverPhase, VoiceOverSnapshot, VoiceOverState, WizardSnapshot, WizardState, LAST_STEP,
    MIN_DURATION, STEP_AUDIENCE, STEP_DETAILS, STEP_PLATFORM,
};
use crate::services::api::{GenerateScriptRequest, ScriptApi};
use crate::services::observer::WizardObserver;
use crate::services::playback::{PlaybackElement, PlaybackEvent};
use crate::utils::audio::{canonical_media_type, extension_for, is_audio_content_type};
use anyhow::Context;
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio::time::sleep;

const EMPTY_SCRIPT_NOTICE: &str =
    "No script text available. Please generate a script before preparing a voice-over.";

/// What happened to the result of an asynchronous operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// The wizard was reset or the step was left while the request was in flight.
    Discarded,
}

/// Identifies one network-bound operation within one wizard session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ticket {
    session: u64,
    request: u64,
}

struct Session {
    id: u64,
    request_seq: u64,
    wizard: WizardState,
    voice: Option<VoiceOverState>,
    last_error: Option<String>,
}

impl Session {
    fn new(id: u64, config: &WizardConfig) -> Self {
        Self {
            id,
            request_seq: 0,
            wizard: WizardState::new(config),
            voice: None,
            last_error: None,
        }
    }

    /// Starts a new request, superseding any still in flight.
    fn issue_ticket(&mut self) -> Ticket {
        self.request_seq += 1;
        Ticket {
            session: self.id,
            request: self.request_seq,
        }
    }

    fn is_current(&self, ticket: Ticket) -> bool {
        self.id == ticket.session && self.request_seq == ticket.request
    }

    fn voice_phase(&self) -> VoiceOverPhase {
        self.voice
            .as_ref()
            .map(|v| v.phase)
            .unwrap_or(VoiceOverPhase::Idle)
    }
}

struct Inner {
    config: WizardConfig,
    api: Arc<dyn ScriptApi>,
    player: Arc<dyn PlaybackElement>,
    registry: ResourceRegistry,
    observer: Arc<dyn WizardObserver>,
    session: Mutex<Session>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.player.pause();
        self.player.unload();
    }
}

/// Drives the script-to-voice wizard. Cheap to clone; all clones share one session.
///
/// The session lock is only held for synchronous state changes, never across a
/// request, so a reset can land while a call is outstanding. Such late responses
/// are recognised by their ticket and dropped.
#[derive(Clone)]
pub struct WizardController {
    inner: Arc<Inner>,
}

fn transition(from: impl ToString, action: &'static str) -> WizardError {
    WizardError::InvalidTransition {
        from: from.to_string(),
        action,
    }
}

impl WizardController {
    pub fn new(
        config: WizardConfig,
        api: Arc<dyn ScriptApi>,
        player: Arc<dyn PlaybackElement>,
        registry: ResourceRegistry,
        observer: Arc<dyn WizardObserver>,
    ) -> Self {
        let session = Session::new(1, &config);
        Self {
            inner: Arc::new(Inner {
                config,
                api,
                player,
                registry,
                observer,
                session: Mutex::new(session),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.inner
            .session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    pub fn config(&self) -> &WizardConfig {
        &self.inner.config
    }

    pub fn snapshot(&self) -> WizardSnapshot {
        let s = self.lock();
        WizardSnapshot {
            session: s.id,
            wizard: s.wizard.clone(),
            voice_over: s.voice.as_ref().map(VoiceOverSnapshot::from),
            last_error: s.last_error.clone(),
        }
    }

    pub fn dismiss_error(&self) {
        self.lock().last_error = None;
    }

    // --- Form ---

    fn edit_form<T>(&self, edit: impl FnOnce(&mut WizardState) -> WizardResult<T>) -> WizardResult<T> {
        let mut s = self.lock();
        if s.wizard.show_result {
            return Err(transition("showing the generated script", "edit the form"));
        }
        if s.wizard.is_generating {
            return Err(transition("generating", "edit the form"));
        }
        edit(&mut s.wizard)
    }

    pub fn set_platform(&self, platform: &str) -> WizardResult<()> {
        self.edit_form(|w| {
            w.platform = platform.trim().to_string();
            Ok(())
        })
    }

    pub fn set_title(&self, title: &str) -> WizardResult<()> {
        self.edit_form(|w| {
            w.title = title.to_string();
            Ok(())
        })
    }

    /// Selects or deselects one of the available tags. Returns whether it is now selected.
    pub fn toggle_tag(&self, tag: &str) -> WizardResult<bool> {
        self.edit_form(|w| {
            if let Some(pos) = w.selected_tags.iter().position(|t| t == tag) {
                w.selected_tags.remove(pos);
                return Ok(false);
            }
            if !w.available_tags.iter().any(|t| t == tag) {
                return Err(WizardError::Validation(format!("Unknown tag: {}", tag)));
            }
            w.selected_tags.push(tag.to_string());
            Ok(true)
        })
    }

    /// Adds a user-defined tag to the available list and selects it.
    pub fn add_custom_tag(&self, tag: &str) -> WizardResult<()> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(WizardError::Validation("Tag cannot be empty.".to_string()));
        }
        self.edit_form(|w| {
            if !w.available_tags.iter().any(|t| t == tag) {
                w.available_tags.push(tag.to_string());
            }
            if !w.selected_tags.iter().any(|t| t == tag) {
                w.selected_tags.push(tag.to_string());
            }
            Ok(())
        })
    }

    pub fn set_age_group(&self, age_group: &str) -> WizardResult<()> {
        self.edit_form(|w| {
            w.age_group = age_group.to_string();
            Ok(())
        })
    }

    /// Clamps into the allowed range and returns the stored value.
    pub fn set_duration(&self, minutes: u8) -> WizardResult<u8> {
        let max = self.inner.config.max_duration.max(MIN_DURATION);
        self.edit_form(|w| {
            w.duration = minutes.clamp(MIN_DURATION, max);
            Ok(w.duration)
        })
    }

    pub fn set_custom_prompt(&self, prompt: &str) -> WizardResult<()> {
        self.edit_form(|w| {
            w.custom_prompt = prompt.to_string();
            Ok(())
        })
    }

    // --- Step sequencer ---

    pub fn can_advance(&self) -> bool {
        let s = self.lock();
        !s.wizard.show_result && s.wizard.current_step < LAST_STEP && s.wizard.step_is_valid()
    }

    /// Moves to the next step when the current one is complete. Returns the new step.
    pub fn advance(&self) -> WizardResult<u8> {
        let mut s = self.lock();
        let w = &mut s.wizard;
        if w.show_result {
            return Err(transition("showing the generated script", "advance"));
        }
        if w.current_step >= LAST_STEP {
            return Err(transition("on the last step", "advance"));
        }
        if !w.step_is_valid() {
            let reason = match w.current_step {
                STEP_PLATFORM => "Please select a platform.",
                STEP_DETAILS => "Please enter a title.",
                STEP_AUDIENCE => "Please select a target audience.",
                _ => "This step is not complete.",
            };
            return Err(WizardError::Validation(reason.to_string()));
        }
        w.current_step += 1;
        debug!("Advanced to step {}", w.current_step);
        Ok(w.current_step)
    }

    // --- Script generation ---

    /// Runs the cosmetic progress phases, then requests the script.
    ///
    /// Only valid on the last step. Failures leave the wizard on that step with
    /// nothing partially shown.
    pub async fn simulate_and_generate(&self) -> WizardResult<Outcome> {
        let total = self.inner.config.phase_total();
        let interval = self.inner.config.phase_interval();

        let (ticket, request) = {
            let mut s = self.lock();
            let w = &s.wizard;
            if w.show_result {
                return Err(transition("showing the generated script", "generate a script"));
            }
            if w.current_step != LAST_STEP {
                return Err(transition(
                    format!("on step {}", w.current_step),
                    "generate a script",
                ));
            }
            if w.is_generating {
                return Err(WizardError::Validation(
                    "A script is already being generated.".to_string(),
                ));
            }
            if w.platform.is_empty() || w.title.trim().is_empty() || w.age_group.is_empty() {
                return Err(WizardError::Validation(
                    "Platform, title and audience are required.".to_string(),
                ));
            }

            let request = GenerateScriptRequest {
                platform: w.platform.clone(),
                title: w.title.trim().to_string(),
                duration: w.duration,
                prompt: w.custom_prompt.trim().to_string(),
                age_group: w.age_group.clone(),
                tags: w.tags_csv(),
            };

            s.wizard.is_generating = true;
            s.wizard.generation_phase = 1;
            s.last_error = None;
            (s.issue_ticket(), request)
        };
        info!("Generating script for \"{}\" ({})", request.title, request.platform);
        self.inner.observer.generation_phase(1, total);

        for phase in 1..=total {
            if phase > 1 {
                let mut s = self.lock();
                if !s.is_current(ticket) {
                    return Ok(Outcome::Discarded);
                }
                s.wizard.generation_phase = phase;
                drop(s);
                self.inner.observer.generation_phase(phase, total);
            }
            sleep(interval).await;
        }

        if !self.lock().is_current(ticket) {
            debug!("Wizard reset during generation, not sending request");
            return Ok(Outcome::Discarded);
        }

        let result = self.inner.api.generate_script(&request).await;

        {
            let mut s = self.lock();
            if !s.is_current(ticket) {
                info!("Discarding script response from a superseded session");
                return Ok(Outcome::Discarded);
            }
            match result {
                Ok(script) => {
                    s.wizard.generated_script = script;
                    s.wizard.generation_phase = total + 1;
                }
                Err(e) => {
                    s.wizard.is_generating = false;
                    s.wizard.generation_phase = 0;
                    let message = e.user_message();
                    s.last_error = Some(message.clone());
                    drop(s);
                    warn!("Script generation failed: {}", e);
                    self.inner.observer.error(&message);
                    return Err(e);
                }
            }
        }
        self.inner.observer.generation_phase(total + 1, total);

        sleep(self.inner.config.reveal_delay()).await;

        let mut s = self.lock();
        if !s.is_current(ticket) {
            return Ok(Outcome::Discarded);
        }
        s.wizard.show_result = true;
        s.wizard.is_generating = false;
        s.wizard.generation_phase = 0;
        info!("Script ready ({} chars)", s.wizard.generated_script.len());
        Ok(Outcome::Applied)
    }

    /// Edit mode on the script display.
    pub fn set_generated_script(&self, script: &str) -> WizardResult<()> {
        let mut s = self.lock();
        if !s.wizard.show_result {
            return Err(transition("no script has been generated", "edit the script"));
        }
        s.wizard.generated_script = script.to_string();
        Ok(())
    }

    /// Writes the script as `<title>.md`, never overwriting an earlier export.
    /// Returns the relative path written.
    pub async fn export_script(&self, storage: &dyn Storage) -> anyhow::Result<String> {
        let (title, script) = {
            let s = self.lock();
            if !s.wizard.show_result {
                anyhow::bail!("No script has been generated yet");
            }
            (s.wizard.title.clone(), s.wizard.generated_script.clone())
        };
        let path = unused_path(storage, &file_stem_for(&title, "generated-script"), "md").await?;
        storage
            .write(&path, script.as_bytes())
            .await
            .with_context(|| format!("Failed to export script to {}", path))?;
        info!("Exported script to {}", path);
        Ok(path)
    }

    // --- Speakable text ---

    /// Asks the backend for a speech-friendly version of the script.
    ///
    /// Always ends in `TextReady`: failures are written into the speakable text so
    /// the user can correct it and go straight to synthesis.
    pub async fn prepare_speakable_text(&self) -> WizardResult<Outcome> {
        let (ticket, script) = {
            let mut s = self.lock();
            if !s.wizard.show_result {
                return Err(transition("no script has been generated", "prepare a voice-over"));
            }
            let phase = s.voice_phase();
            if !matches!(phase, VoiceOverPhase::Idle | VoiceOverPhase::Failed) {
                return Err(transition(phase, "prepare a voice-over"));
            }
            let script = s.wizard.generated_script.clone();
            let ticket = s.issue_ticket();

            let voice = s.voice.get_or_insert_with(VoiceOverState::new);
            voice.phase = VoiceOverPhase::PreparingText;
            voice.speakable_text.clear();
            voice.is_playing = false;

            if script.trim().is_empty() {
                voice.speakable_text = EMPTY_SCRIPT_NOTICE.to_string();
                voice.phase = VoiceOverPhase::TextReady;
                drop(s);
                self.inner.observer.voice_phase(VoiceOverPhase::PreparingText);
                self.inner.observer.voice_phase(VoiceOverPhase::TextReady);
                return Ok(Outcome::Applied);
            }
            (ticket, script)
        };
        self.inner.observer.voice_phase(VoiceOverPhase::PreparingText);

        let result = self.inner.api.prepare_speakable_text(&script).await;

        {
            let mut s = self.lock();
            if !s.is_current(ticket) {
                info!("Discarding speakable text from a superseded request");
                return Ok(Outcome::Discarded);
            }
            let Some(voice) = s.voice.as_mut() else {
                return Ok(Outcome::Discarded);
            };
            voice.speakable_text = match result {
                Ok(text) => text,
                Err(e) => {
                    warn!("Preparing speakable text failed: {}", e);
                    format!("Error preparing text for voice-over: {}", e.user_message())
                }
            };
            voice.phase = VoiceOverPhase::TextReady;
        }
        self.inner.observer.voice_phase(VoiceOverPhase::TextReady);
        Ok(Outcome::Applied)
    }

    pub fn set_speakable_text(&self, text: &str) -> WizardResult<()> {
        let mut s = self.lock();
        let phase = s.voice_phase();
        match s.voice.as_mut() {
            Some(voice) if phase == VoiceOverPhase::TextReady => {
                voice.speakable_text = text.to_string();
                Ok(())
            }
            _ => Err(transition(phase, "edit the voice-over text")),
        }
    }

    // --- Audio pipeline ---

    /// Releases the active clip and detaches it from the player in one step.
    fn release_audio(&self, voice: &mut VoiceOverState) {
        self.inner.player.unload();
        voice.audio = None;
        voice.is_playing = false;
    }

    /// Records a hard failure: `Failed` phase, no audio, user-visible alert.
    fn fail_voice_over(&self, mut s: MutexGuard<'_, Session>, error: WizardError) -> WizardError {
        if let Some(voice) = s.voice.as_mut() {
            self.release_audio(voice);
            voice.phase = VoiceOverPhase::Failed;
        }
        let message = error.user_message();
        s.last_error = Some(message.clone());
        drop(s);
        warn!("Voice-over failed: {}", error);
        self.inner.observer.voice_phase(VoiceOverPhase::Failed);
        self.inner.observer.error(&message);
        error
    }

    /// Requests audio for `text` (the possibly edited speakable text).
    ///
    /// Exactly one request per call, no retries. The previous clip is released before
    /// the request is sent. The phase becomes `PlaybackReady` only when the player
    /// reports the new clip as loaded.
    pub async fn synthesize_audio(&self, text: &str) -> WizardResult<Outcome> {
        if text.trim().is_empty() {
            return Err(WizardError::Validation(
                "Please enter some text to convert to speech.".to_string(),
            ));
        }

        let ticket = {
            let mut s = self.lock();
            let phase = s.voice_phase();
            if phase != VoiceOverPhase::TextReady {
                return Err(transition(phase, "generate audio"));
            }
            let ticket = s.issue_ticket();
            if let Some(voice) = s.voice.as_mut() {
                self.release_audio(voice);
                voice.speakable_text = text.to_string();
                voice.phase = VoiceOverPhase::SynthesizingAudio;
            }
            ticket
        };
        self.inner.observer.voice_phase(VoiceOverPhase::SynthesizingAudio);

        let result = self.inner.api.synthesize_speech(text).await;

        let mut s = self.lock();
        if !s.is_current(ticket) {
            info!("Discarding audio from a superseded request");
            return Ok(Outcome::Discarded);
        }

        let payload = match result {
            Ok(payload) => payload,
            Err(e) => return Err(self.fail_voice_over(s, e)),
        };
        if payload.bytes.is_empty() {
            let e = WizardError::MalformedResponse("The server returned an empty audio file.".to_string());
            return Err(self.fail_voice_over(s, e));
        }
        if !is_audio_content_type(payload.content_type.as_deref()) {
            let e = WizardError::MalformedResponse(format!(
                "Expected audio but received {}",
                payload.content_type.as_deref().unwrap_or("no content type")
            ));
            return Err(self.fail_voice_over(s, e));
        }

        let media_type = canonical_media_type(payload.content_type.as_deref(), &payload.bytes);
        match s.voice.as_mut() {
            // Nothing else assigns the slot, but never let two clips overlap.
            Some(voice) => drop(voice.audio.take()),
            None => return Ok(Outcome::Discarded),
        }
        let resource = self.inner.registry.register(payload.bytes, media_type);

        if let Err(e) = self.inner.player.load(&resource) {
            drop(resource);
            return Err(self.fail_voice_over(s, WizardError::Playback(e.to_string())));
        }
        info!("Loaded {} ({} bytes)", resource.locator(), resource.len());
        if let Some(voice) = s.voice.as_mut() {
            voice.audio = Some(resource);
        }
        Ok(Outcome::Applied)
    }

    /// Applies a notification from the playback element.
    pub fn handle_playback_event(&self, event: PlaybackEvent) {
        let mut s = self.lock();
        let Some(voice) = s.voice.as_mut() else {
            return;
        };
        debug!("Playback event {:?} in phase {}", event, voice.phase);
        // Events about a clip that has since been replaced or released are ignored.
        let is_current = |voice: &VoiceOverState, locator: &str| {
            voice.audio.as_ref().is_some_and(|a| a.locator() == locator)
        };

        match event {
            PlaybackEvent::Loaded(locator) => {
                if voice.phase == VoiceOverPhase::SynthesizingAudio && is_current(&*voice, &locator) {
                    voice.phase = VoiceOverPhase::PlaybackReady;
                    drop(s);
                    self.inner.observer.voice_phase(VoiceOverPhase::PlaybackReady);
                }
            }
            PlaybackEvent::Play => {
                if voice.audio.is_some() && !voice.is_playing {
                    voice.is_playing = true;
                    drop(s);
                    self.inner.observer.playing(true);
                }
            }
            PlaybackEvent::Pause | PlaybackEvent::Ended => {
                if voice.is_playing {
                    voice.is_playing = false;
                    drop(s);
                    self.inner.observer.playing(false);
                }
            }
            PlaybackEvent::Error { locator, message } => {
                let active = matches!(
                    voice.phase,
                    VoiceOverPhase::SynthesizingAudio | VoiceOverPhase::PlaybackReady
                );
                if active && is_current(&*voice, &locator) {
                    let _ = self.fail_voice_over(s, WizardError::Playback(message));
                }
            }
        }
    }

    /// Forwards player events to this controller until the channel or the controller goes away.
    pub fn spawn_event_pump(&self, mut events: UnboundedReceiver<PlaybackEvent>) -> JoinHandle<()> {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                WizardController { inner }.handle_playback_event(event);
            }
        })
    }

    // --- Playback transport ---

    /// Plays when paused or finished, pauses otherwise. `is_playing` only follows
    /// the player's events.
    pub async fn toggle_playback(&self) -> WizardResult<()> {
        let should_play = {
            let s = self.lock();
            let phase = s.voice_phase();
            if phase != VoiceOverPhase::PlaybackReady {
                return Err(transition(phase, "play audio"));
            }
            self.inner.player.is_paused() || self.inner.player.is_ended()
        };

        if !should_play {
            self.inner.player.pause();
            return Ok(());
        }

        match self.inner.player.play().await {
            Ok(()) => Ok(()),
            Err(e) => {
                let s = self.lock();
                let error = WizardError::Playback(e.to_string());
                if s.voice_phase() != VoiceOverPhase::PlaybackReady {
                    return Err(error);
                }
                Err(self.fail_voice_over(s, error))
            }
        }
    }

    /// Leaves the player view: stops playback and releases the clip.
    pub fn back_to_text_options(&self) -> WizardResult<()> {
        let mut s = self.lock();
        let phase = s.voice_phase();
        if !matches!(
            phase,
            VoiceOverPhase::PlaybackReady | VoiceOverPhase::SynthesizingAudio
        ) {
            return Err(transition(phase, "go back to the text options"));
        }
        // An outstanding synthesis request must not land after this.
        s.issue_ticket();
        if let Some(voice) = s.voice.as_mut() {
            self.inner.player.pause();
            self.release_audio(voice);
            voice.phase = VoiceOverPhase::TextReady;
        }
        drop(s);
        self.inner.observer.voice_phase(VoiceOverPhase::TextReady);
        Ok(())
    }

    pub fn back_to_script(&self) -> WizardResult<()> {
        let mut s = self.lock();
        let phase = s.voice_phase();
        if !matches!(phase, VoiceOverPhase::TextReady | VoiceOverPhase::Failed) {
            return Err(transition(phase, "go back to the script"));
        }
        if let Some(voice) = s.voice.as_mut() {
            self.release_audio(voice);
            voice.phase = VoiceOverPhase::Idle;
        }
        drop(s);
        self.inner.observer.voice_phase(VoiceOverPhase::Idle);
        Ok(())
    }

    /// "Try Preparing Text Again" from the failed state.
    pub async fn retry_voice_over(&self) -> WizardResult<Outcome> {
        let phase = self.lock().voice_phase();
        if phase != VoiceOverPhase::Failed {
            return Err(transition(phase, "retry the voice-over"));
        }
        self.prepare_speakable_text().await
    }

    /// Writes the current clip next to the script. Returns the relative path written.
    pub async fn export_audio(&self, storage: &dyn Storage) -> anyhow::Result<String> {
        let (stem, ext, bytes) = {
            let s = self.lock();
            let Some(audio) = s.voice.as_ref().and_then(|v| v.audio.as_ref()) else {
                anyhow::bail!("No audio has been generated yet");
            };
            (
                file_stem_for(&s.wizard.title, "voice-over"),
                extension_for(audio.media_type()),
                audio.bytes(),
            )
        };
        let path = unused_path(storage, &stem, ext).await?;
        storage
            .write(&path, &bytes)
            .await
            .with_context(|| format!("Failed to export audio to {}", path))?;
        info!("Exported audio to {}", path);
        Ok(path)
    }

    // --- Reset ---

    /// Back to an empty form on step 1. Releases audio before returning and makes
    /// every in-flight response stale. Safe to call repeatedly.
    pub fn reset_wizard(&self) {
        let mut s = self.lock();
        let next_id = s.id + 1;
        self.inner.player.pause();
        self.inner.player.unload();
        // Dropping the old session releases its audio resource here.
        *s = Session::new(next_id, &self.inner.config);
        drop(s);
        debug!("Wizard reset, session {}", next_id);
        self.inner.observer.voice_phase(VoiceOverPhase::Idle);
    }

    pub fn reset(&self) {
        self.reset_wizard();
    }

    /// Component teardown: stop the player and release everything now.
    pub fn teardown(&self) {
        let mut s = self.lock();
        self.inner.player.pause();
        self.inner.player.unload();
        s.voice = None;
        s.issue_ticket();
    }
}
