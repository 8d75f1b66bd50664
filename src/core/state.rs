use crate::core::config::WizardConfig;
use crate::core::resource::AudioResource;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const STEP_WELCOME: u8 = 1;
pub const STEP_PLATFORM: u8 = 2;
pub const STEP_DETAILS: u8 = 3;
pub const STEP_AUDIENCE: u8 = 4;
pub const STEP_INSTRUCTIONS: u8 = 5;
pub const LAST_STEP: u8 = STEP_INSTRUCTIONS;

pub const MIN_DURATION: u8 = 1;

/// (key, label)
pub const PLATFORMS: [(&str, &str); 6] = [
    ("youtube", "YouTube"),
    ("instagram", "Instagram"),
    ("tiktok", "TikTok"),
    ("twitter", "Twitter / X"),
    ("linkedin", "LinkedIn"),
    ("facebook", "Facebook"),
];

pub const AGE_GROUPS: [&str; 6] = [
    "All Ages",
    "Kids (8-12)",
    "Teens (13-17)",
    "Young Adults (18-24)",
    "Adults (25-45)",
    "Seniors (45+)",
];

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct WizardState {
    pub current_step: u8,
    pub platform: String,
    pub title: String,
    pub available_tags: Vec<String>,
    pub selected_tags: Vec<String>,
    pub age_group: String,
    /// Minutes.
    pub duration: u8,
    pub custom_prompt: String,
    pub is_generating: bool,
    pub generation_phase: u8,
    pub show_result: bool,
    pub generated_script: String,
}

impl WizardState {
    pub fn new(config: &WizardConfig) -> Self {
        Self {
            current_step: STEP_WELCOME,
            platform: String::new(),
            title: String::new(),
            available_tags: config.available_tags.clone(),
            selected_tags: Vec::new(),
            age_group: String::new(),
            duration: config
                .default_duration
                .clamp(MIN_DURATION, config.max_duration.max(MIN_DURATION)),
            custom_prompt: String::new(),
            is_generating: false,
            generation_phase: 0,
            show_result: false,
            generated_script: String::new(),
        }
    }

    /// Whether the form on the current step is complete enough to move on.
    pub fn step_is_valid(&self) -> bool {
        match self.current_step {
            STEP_WELCOME => true,
            STEP_PLATFORM => !self.platform.is_empty(),
            STEP_DETAILS => !self.title.trim().is_empty(),
            STEP_AUDIENCE => !self.age_group.is_empty(),
            STEP_INSTRUCTIONS => !self.is_generating,
            _ => false,
        }
    }

    /// Selected tags joined the way the generation endpoint expects them.
    pub fn tags_csv(&self) -> String {
        self.selected_tags.join(",")
    }

    pub fn platform_label(&self) -> &str {
        PLATFORMS
            .iter()
            .find(|(key, _)| *key == self.platform)
            .map(|(_, label)| *label)
            .unwrap_or(self.platform.as_str())
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum VoiceOverPhase {
    Idle,
    PreparingText,
    TextReady,
    SynthesizingAudio,
    PlaybackReady,
    Failed,
}

impl fmt::Display for VoiceOverPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VoiceOverPhase::Idle => "idle",
            VoiceOverPhase::PreparingText => "preparing text",
            VoiceOverPhase::TextReady => "text ready",
            VoiceOverPhase::SynthesizingAudio => "synthesizing audio",
            VoiceOverPhase::PlaybackReady => "playback ready",
            VoiceOverPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Voice-over sub-state. Created the first time a voice-over is requested.
#[derive(Debug)]
pub struct VoiceOverState {
    pub phase: VoiceOverPhase,
    pub speakable_text: String,
    /// The only live audio resource. Replacing or clearing it releases the old one.
    pub audio: Option<AudioResource>,
    pub is_playing: bool,
}

impl VoiceOverState {
    pub fn new() -> Self {
        Self {
            phase: VoiceOverPhase::Idle,
            speakable_text: String::new(),
            audio: None,
            is_playing: false,
        }
    }
}

impl Default for VoiceOverState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct AudioInfo {
    pub locator: String,
    pub media_type: String,
    pub size: usize,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct VoiceOverSnapshot {
    pub phase: VoiceOverPhase,
    pub speakable_text: String,
    pub audio: Option<AudioInfo>,
    pub is_playing: bool,
}

impl From<&VoiceOverState> for VoiceOverSnapshot {
    fn from(state: &VoiceOverState) -> Self {
        Self {
            phase: state.phase,
            speakable_text: state.speakable_text.clone(),
            audio: state.audio.as_ref().map(|a| AudioInfo {
                locator: a.locator().to_string(),
                media_type: a.media_type().to_string(),
                size: a.len(),
            }),
            is_playing: state.is_playing,
        }
    }
}

/// Read-only copy of everything a front end renders.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct WizardSnapshot {
    pub session: u64,
    pub wizard: WizardState,
    pub voice_over: Option<VoiceOverSnapshot>,
    pub last_error: Option<String>,
}

impl WizardSnapshot {
    pub fn voice_phase(&self) -> VoiceOverPhase {
        self.voice_over
            .as_ref()
            .map(|v| v.phase)
            .unwrap_or(VoiceOverPhase::Idle)
    }
}
