use crate::core::resource::AudioResource;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::debug;
use std::sync::Mutex;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Notifications from the playback element, delivered asynchronously.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// The source with this locator is decoded and ready to play.
    Loaded(String),
    Play,
    Pause,
    Ended,
    /// The source with this locator could not be decoded or played.
    Error { locator: String, message: String },
}

pub type PlaybackEvents = UnboundedSender<PlaybackEvent>;

pub fn playback_channel() -> (PlaybackEvents, UnboundedReceiver<PlaybackEvent>) {
    unbounded_channel()
}

/// The single audio output owned by the voice-over pipeline.
///
/// State changes are reported through [`PlaybackEvent`]s rather than return values,
/// so callers must not assume `play()` succeeding means audio is playing.
#[async_trait]
pub trait PlaybackElement: Send + Sync {
    fn load(&self, resource: &AudioResource) -> Result<()>;
    fn unload(&self);
    async fn play(&self) -> Result<()>;
    fn pause(&self);
    fn is_paused(&self) -> bool;
    fn is_ended(&self) -> bool;
}

/// Accepts sources but has no audio output. Used when built without `rodio`.
pub struct HeadlessPlayback {
    source: Mutex<Option<String>>,
    events: PlaybackEvents,
}

impl HeadlessPlayback {
    pub fn new(events: PlaybackEvents) -> Self {
        Self {
            source: Mutex::new(None),
            events,
        }
    }

    pub fn source(&self) -> Option<String> {
        self.source.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl PlaybackElement for HeadlessPlayback {
    fn load(&self, resource: &AudioResource) -> Result<()> {
        *self.source.lock().unwrap_or_else(|e| e.into_inner()) =
            Some(resource.locator().to_string());
        let _ = self
            .events
            .send(PlaybackEvent::Loaded(resource.locator().to_string()));
        Ok(())
    }

    fn unload(&self) {
        if let Some(old) = self.source.lock().unwrap_or_else(|e| e.into_inner()).take() {
            debug!("Headless player dropped source {}", old);
        }
    }

    async fn play(&self) -> Result<()> {
        Err(anyhow!(
            "No audio output available. Rebuild with `--features rodio` or export the audio instead."
        ))
    }

    fn pause(&self) {}

    fn is_paused(&self) -> bool {
        true
    }

    fn is_ended(&self) -> bool {
        false
    }
}

#[cfg(feature = "rodio")]
pub use self::rodio_output::RodioPlayback;

#[cfg(feature = "rodio")]
mod rodio_output {
    use super::{PlaybackElement, PlaybackEvent, PlaybackEvents};
    use crate::core::resource::AudioResource;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use log::{error, warn};
    use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc::{self, RecvTimeoutError};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;
    use tokio::sync::oneshot;

    const POLL_INTERVAL: Duration = Duration::from_millis(100);

    enum Command {
        Load(String, Arc<[u8]>),
        Unload,
        Play(oneshot::Sender<Result<(), String>>),
        Pause,
        Shutdown,
    }

    #[derive(Default)]
    struct Status {
        paused: AtomicBool,
        ended: AtomicBool,
    }

    /// Speaker output through rodio. The stream lives on its own thread.
    pub struct RodioPlayback {
        commands: mpsc::Sender<Command>,
        status: Arc<Status>,
    }

    impl RodioPlayback {
        pub fn new(events: PlaybackEvents) -> Self {
            let (commands, rx) = mpsc::channel();
            let status = Arc::new(Status::default());
            status.paused.store(true, Ordering::SeqCst);

            let thread_status = status.clone();
            thread::spawn(move || run(rx, events, thread_status));

            Self { commands, status }
        }

        fn send(&self, command: Command) {
            if self.commands.send(command).is_err() {
                warn!("Audio thread is gone");
            }
        }
    }

    impl Drop for RodioPlayback {
        fn drop(&mut self) {
            let _ = self.commands.send(Command::Shutdown);
        }
    }

    #[async_trait]
    impl PlaybackElement for RodioPlayback {
        fn load(&self, resource: &AudioResource) -> Result<()> {
            self.send(Command::Load(resource.locator().to_string(), resource.bytes()));
            Ok(())
        }

        fn unload(&self) {
            self.send(Command::Unload);
        }

        async fn play(&self) -> Result<()> {
            let (tx, rx) = oneshot::channel();
            self.commands
                .send(Command::Play(tx))
                .map_err(|_| anyhow!("Audio thread is gone"))?;
            rx.await
                .map_err(|_| anyhow!("Audio thread stopped responding"))?
                .map_err(|e| anyhow!(e))
        }

        fn pause(&self) {
            self.send(Command::Pause);
        }

        fn is_paused(&self) -> bool {
            self.status.paused.load(Ordering::SeqCst)
        }

        fn is_ended(&self) -> bool {
            self.status.ended.load(Ordering::SeqCst)
        }
    }

    struct Output {
        _stream: OutputStream,
        sink: Sink,
    }

    fn decode(bytes: &Arc<[u8]>) -> Result<Decoder<Cursor<Arc<[u8]>>>, String> {
        Decoder::new(Cursor::new(bytes.clone())).map_err(|e| e.to_string())
    }

    fn run(rx: mpsc::Receiver<Command>, events: PlaybackEvents, status: Arc<Status>) {
        let output = match OutputStreamBuilder::open_default_stream() {
            Ok(stream) => {
                let sink = Sink::connect_new(stream.mixer());
                sink.pause();
                Ok(Output {
                    _stream: stream,
                    sink,
                })
            }
            Err(e) => {
                error!("Failed to open audio output: {}", e);
                Err(format!("Failed to open audio output: {}", e))
            }
        };

        let mut source: Option<Arc<[u8]>> = None;
        let mut playing = false;

        loop {
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(Command::Load(locator, bytes)) => {
                    playing = false;
                    status.paused.store(true, Ordering::SeqCst);
                    status.ended.store(false, Ordering::SeqCst);
                    let out = match &output {
                        Ok(out) => out,
                        Err(e) => {
                            let _ = events.send(PlaybackEvent::Error {
                                locator,
                                message: e.clone(),
                            });
                            continue;
                        }
                    };
                    out.sink.clear();
                    match decode(&bytes) {
                        Ok(decoder) => {
                            out.sink.append(decoder);
                            out.sink.pause();
                            source = Some(bytes);
                            let _ = events.send(PlaybackEvent::Loaded(locator));
                        }
                        Err(message) => {
                            source = None;
                            let _ = events.send(PlaybackEvent::Error { locator, message });
                        }
                    }
                }
                Ok(Command::Unload) => {
                    if let Ok(out) = &output {
                        out.sink.clear();
                    }
                    source = None;
                    playing = false;
                    status.paused.store(true, Ordering::SeqCst);
                    status.ended.store(false, Ordering::SeqCst);
                }
                Ok(Command::Play(reply)) => {
                    let result = match (&output, &source) {
                        (Err(e), _) => Err(e.clone()),
                        (_, None) => Err("No audio loaded".to_string()),
                        (Ok(out), Some(bytes)) => {
                            // Finished clips are re-queued from the start.
                            let queued = if out.sink.empty() {
                                decode(bytes).map(|d| out.sink.append(d))
                            } else {
                                Ok(())
                            };
                            queued.map(|_| out.sink.play())
                        }
                    };
                    if result.is_ok() {
                        playing = true;
                        status.paused.store(false, Ordering::SeqCst);
                        status.ended.store(false, Ordering::SeqCst);
                        let _ = events.send(PlaybackEvent::Play);
                    }
                    let _ = reply.send(result);
                }
                Ok(Command::Pause) => {
                    if playing {
                        if let Ok(out) = &output {
                            out.sink.pause();
                        }
                        playing = false;
                        status.paused.store(true, Ordering::SeqCst);
                        let _ = events.send(PlaybackEvent::Pause);
                    }
                }
                Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    if let Ok(out) = &output {
                        if playing && out.sink.empty() {
                            playing = false;
                            status.paused.store(true, Ordering::SeqCst);
                            status.ended.store(true, Ordering::SeqCst);
                            let _ = events.send(PlaybackEvent::Ended);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::resource::ResourceRegistry;

    #[tokio::test]
    async fn test_headless_reports_loaded_and_refuses_play() {
        let (tx, mut rx) = playback_channel();
        let player = HeadlessPlayback::new(tx);
        let registry = ResourceRegistry::new();
        let resource = registry.register(vec![1, 2, 3], "audio/mpeg");

        player.load(&resource).unwrap();
        assert_eq!(
            rx.recv().await,
            Some(PlaybackEvent::Loaded(resource.locator().to_string()))
        );
        assert_eq!(player.source().as_deref(), Some(resource.locator()));

        assert!(player.play().await.is_err());
        assert!(player.is_paused());

        player.unload();
        assert!(player.source().is_none());
    }
}
