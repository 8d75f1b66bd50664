use crate::core::state::VoiceOverPhase;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info};
use std::sync::Mutex;

/// Labels for the cosmetic generation phases, in order.
pub const GENERATION_PHASE_LABELS: [&str; 3] =
    ["Analyzing Title...", "Writing Script...", "Finalizing..."];

/// Front-end hooks for things the user should see as they happen.
pub trait WizardObserver: Send + Sync {
    /// Cosmetic generation progress, `1..=total` then `total + 1` once the script arrived.
    fn generation_phase(&self, _phase: u8, _total: u8) {}

    fn voice_phase(&self, _phase: VoiceOverPhase) {}

    /// A blocking, user-visible failure.
    fn error(&self, _message: &str) {}

    fn playing(&self, _is_playing: bool) {}
}

/// Routes everything to the log.
pub struct LogObserver;

impl WizardObserver for LogObserver {
    fn generation_phase(&self, phase: u8, total: u8) {
        info!("Generation phase {}/{}", phase.min(total), total);
    }

    fn voice_phase(&self, phase: VoiceOverPhase) {
        info!("Voice-over: {}", phase);
    }

    fn error(&self, message: &str) {
        error!("{}", message);
    }
}

fn phase_label(phase: u8) -> &'static str {
    let index = usize::from(phase.saturating_sub(1)).min(GENERATION_PHASE_LABELS.len() - 1);
    GENERATION_PHASE_LABELS[index]
}

/// Terminal output: a progress bar for generation, plain lines for the rest.
#[derive(Default)]
pub struct ProgressObserver {
    bar: Mutex<Option<ProgressBar>>,
}

impl ProgressObserver {
    pub fn new() -> Self {
        Self::default()
    }

    fn take_bar(&self) -> Option<ProgressBar> {
        self.bar.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

impl WizardObserver for ProgressObserver {
    fn generation_phase(&self, phase: u8, total: u8) {
        if phase > total {
            if let Some(pb) = self.take_bar() {
                pb.set_position(u64::from(total));
                pb.finish_with_message("Script ready");
            }
            return;
        }

        let mut slot = self.bar.lock().unwrap_or_else(|e| e.into_inner());
        let pb = slot.get_or_insert_with(|| {
            let pb = ProgressBar::new(u64::from(total));
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            {
                pb.set_style(style.progress_chars("#>-"));
            }
            pb
        });
        pb.set_position(u64::from(phase.saturating_sub(1)));
        pb.set_message(phase_label(phase));
    }

    fn voice_phase(&self, phase: VoiceOverPhase) {
        match phase {
            VoiceOverPhase::PreparingText => println!("Preparing your script for voice-over..."),
            VoiceOverPhase::SynthesizingAudio => println!("Generating audio..."),
            VoiceOverPhase::PlaybackReady => println!("Your voice-over is ready."),
            _ => {}
        }
    }

    fn error(&self, message: &str) {
        if let Some(pb) = self.take_bar() {
            pb.abandon();
        }
        eprintln!("Error: {}", message);
    }

    fn playing(&self, is_playing: bool) {
        println!("{}", if is_playing { "Playing" } else { "Paused" });
    }
}
