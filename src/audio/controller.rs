use parking_lot::RwLock;
use serde::Serialize;
use serenity::model::id::GuildId;
use std::{
    sync::{Arc, Weak},
    time::Duration,
};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        equalizer::AudioSettings,
        queue::TrackQueue,
        session::{Session, SessionEvent},
        track::Track,
        transport::{CompletionHandle, StreamEnd, Transport},
    },
    config::EngineSettings,
    error::{EngineError, EngineResult, QueueError, StateError, TransportError},
    sources::SourceManager,
};

/// Estado de reproducción de un canal. Uno solo a la vez por sesión.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlaybackState {
    Idle,
    Loading,
    Playing,
    Paused,
    Stopping,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PlaybackState::Idle => "Idle",
            PlaybackState::Loading => "Loading",
            PlaybackState::Playing => "Playing",
            PlaybackState::Paused => "Paused",
            PlaybackState::Stopping => "Stopping",
        };
        f.write_str(name)
    }
}

/// Aviso recuperable: algo falló pero la reproducción siguió sola
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackNotice {
    TrackSkipped { title: String, reason: String },
}

/// Resultado de una transición que puede arrancar un track
#[derive(Debug, Clone, Default)]
pub struct PlayReport {
    pub now_playing: Option<Track>,
    pub notices: Vec<PlaybackNotice>,
}

/// Máquina de estados del stream de un canal.
///
/// Lives inside its [`Session`] and is only driven while the session lock is
/// held, so every transition here runs alone for its channel.
///
/// ```text
/// Idle -> Loading -> Playing <-> Paused
///   any -> Stopping -> Idle
/// ```
pub struct StreamController {
    channel: GuildId,
    state: Arc<RwLock<PlaybackState>>,
    /// Bumped on every start and every halt; completions from older
    /// generations are ignored.
    generation: u64,
    consecutive_failures: u32,
    audio: AudioSettings,
    transport: Arc<dyn Transport>,
    sources: Arc<SourceManager>,
    settings: Arc<EngineSettings>,
    events: broadcast::Sender<SessionEvent>,
    owner: Weak<Session>,
}

impl StreamController {
    pub(crate) fn new(
        channel: GuildId,
        state: Arc<RwLock<PlaybackState>>,
        transport: Arc<dyn Transport>,
        sources: Arc<SourceManager>,
        settings: Arc<EngineSettings>,
        events: broadcast::Sender<SessionEvent>,
        owner: Weak<Session>,
    ) -> Self {
        Self {
            channel,
            state,
            generation: 0,
            consecutive_failures: 0,
            audio: AudioSettings::new(settings.default_volume),
            transport,
            sources,
            settings,
            events,
            owner,
        }
    }

    pub fn state(&self) -> PlaybackState {
        *self.state.read()
    }

    pub fn audio(&self) -> AudioSettings {
        self.audio
    }

    fn set_state(&self, next: PlaybackState) {
        let previous = std::mem::replace(&mut *self.state.write(), next);
        if previous != next {
            debug!(channel = %self.channel, "🔄 {} -> {}", previous, next);
        }
    }

    fn invalid(&self, command: &'static str) -> EngineError {
        StateError::InvalidTransition {
            from: self.state(),
            command,
        }
        .into()
    }

    fn emit(&self, event: SessionEvent) {
        // Sin suscriptores no es un error
        let _ = self.events.send(event);
    }

    /// Arranca la cabeza de la cola. Solo desde `Idle`.
    pub async fn play(&mut self, queue: &mut TrackQueue) -> EngineResult<PlayReport> {
        if self.state() != PlaybackState::Idle {
            return Err(self.invalid("play"));
        }
        let next = queue.advance();
        self.start_from(next, queue, Vec::new(), Duration::ZERO).await
    }

    pub async fn pause(&mut self) -> EngineResult<()> {
        match self.state() {
            PlaybackState::Paused => Ok(()),
            PlaybackState::Playing => {
                if let Err(e) = self.transport.suspend(self.channel).await {
                    warn!(channel = %self.channel, "⚠️ El transporte no pudo pausar: {}", e);
                }
                self.set_state(PlaybackState::Paused);
                info!(channel = %self.channel, "⏸️ Reproducción pausada");
                Ok(())
            }
            _ => Err(self.invalid("pause")),
        }
    }

    pub async fn resume(&mut self) -> EngineResult<()> {
        match self.state() {
            PlaybackState::Playing => Ok(()),
            PlaybackState::Paused => {
                if let Err(e) = self.transport.resume(self.channel).await {
                    warn!(channel = %self.channel, "⚠️ El transporte no pudo reanudar: {}", e);
                }
                self.set_state(PlaybackState::Playing);
                info!(channel = %self.channel, "▶️ Reproducción reanudada");
                Ok(())
            }
            _ => Err(self.invalid("resume")),
        }
    }

    /// Corta el stream actual y avanza la cola como si hubiera terminado.
    pub async fn skip(&mut self, queue: &mut TrackQueue) -> EngineResult<PlayReport> {
        match self.state() {
            PlaybackState::Playing | PlaybackState::Paused => {}
            _ => return Err(self.invalid("skip")),
        }
        info!(channel = %self.channel, "⏭️ Saltando track");
        self.halt_stream().await;
        let next = queue.advance();
        self.start_from(next, queue, Vec::new(), Duration::ZERO).await
    }

    /// Reinicia el track actual desde `offset`. Si estaba en pausa, sigue en pausa.
    ///
    /// A restart that fails counts like any other failed start: the track is
    /// dropped and the queue moves on.
    pub async fn seek(&mut self, offset: Duration, queue: &mut TrackQueue) -> EngineResult<PlayReport> {
        let was_paused = match self.state() {
            PlaybackState::Playing => false,
            PlaybackState::Paused => true,
            _ => return Err(self.invalid("seek")),
        };
        let Some(track) = queue.peek_current().cloned() else {
            return Err(self.invalid("seek"));
        };
        if let Some(length) = track.duration() {
            if offset >= length {
                return Err(QueueError::SeekOutOfRange {
                    position: offset.as_secs(),
                    length: length.as_secs(),
                }
                .into());
            }
        }

        info!(channel = %self.channel, "⏩ Saltando a {} en {}", humantime::format_duration(offset), track.title());
        self.halt_stream().await;
        let report = self.start_from(Some(track.clone()), queue, Vec::new(), offset).await?;

        let same_track = report.now_playing.as_ref().map(|t| t.id()) == Some(track.id());
        if was_paused && same_track {
            self.pause().await?;
        }
        Ok(report)
    }

    /// Siempre funciona y es idempotente.
    pub async fn stop(&mut self, queue: &mut TrackQueue) {
        self.set_state(PlaybackState::Stopping);
        self.halt_stream().await;
        queue.reset();
        self.consecutive_failures = 0;
        self.set_state(PlaybackState::Idle);
        info!(channel = %self.channel, "⏹️ Reproducción detenida");
    }

    pub async fn set_audio(&mut self, audio: AudioSettings) {
        self.audio = audio;
        if matches!(self.state(), PlaybackState::Playing | PlaybackState::Paused) {
            if let Err(e) = self.transport.apply_settings(self.channel, &self.audio).await {
                warn!(channel = %self.channel, "⚠️ No se pudieron aplicar los ajustes: {}", e);
            }
        }
    }

    /// Fin de stream reportado por el transporte.
    ///
    /// Returns `None` when the notice is stale (an older generation, or the
    /// controller is no longer streaming).
    pub async fn on_stream_end(
        &mut self,
        generation: u64,
        end: StreamEnd,
        queue: &mut TrackQueue,
    ) -> Option<EngineResult<PlayReport>> {
        let streaming = matches!(self.state(), PlaybackState::Playing | PlaybackState::Paused);
        if generation != self.generation || !streaming {
            debug!(channel = %self.channel, "Fin de stream ignorado (gen {} vs {})", generation, self.generation);
            return None;
        }
        self.generation += 1;

        let (next, notices) = match end {
            StreamEnd::Finished => {
                debug!(channel = %self.channel, "🎵 Track terminado, avanzando");
                (queue.advance(), Vec::new())
            }
            StreamEnd::Dropped(reason) => {
                let reason = TransportError::StreamDropped(reason).to_string();
                let title = queue.peek_current().map(|t| t.title().to_string()).unwrap_or_default();
                if let Err(e) = self.record_failure(&title, &reason, queue) {
                    return Some(Err(e));
                }
                let notice = PlaybackNotice::TrackSkipped { title, reason };
                (queue.discard_current(), vec![notice])
            }
        };

        Some(self.start_from(next, queue, notices, Duration::ZERO).await)
    }

    async fn start_from(
        &mut self,
        mut next: Option<Track>,
        queue: &mut TrackQueue,
        mut notices: Vec<PlaybackNotice>,
        mut offset: Duration,
    ) -> EngineResult<PlayReport> {
        loop {
            let Some(track) = next else {
                self.set_state(PlaybackState::Idle);
                info!(channel = %self.channel, "📭 Cola terminada");
                self.emit(SessionEvent::QueueFinished { channel: self.channel });
                return Ok(PlayReport { now_playing: None, notices });
            };

            self.set_state(PlaybackState::Loading);
            self.generation += 1;

            // Solo el primer intento arranca desde `offset`
            match self.load(&track, std::mem::take(&mut offset)).await {
                Ok(()) => {
                    self.consecutive_failures = 0;
                    self.set_state(PlaybackState::Playing);
                    if let Err(e) = self.transport.apply_settings(self.channel, &self.audio).await {
                        warn!(channel = %self.channel, "⚠️ No se pudieron aplicar los ajustes: {}", e);
                    }
                    info!(channel = %self.channel, "🎵 Reproduciendo: {}", track.title());
                    self.emit(SessionEvent::NowPlaying {
                        channel: self.channel,
                        track: track.clone(),
                    });
                    return Ok(PlayReport {
                        now_playing: Some(track),
                        notices,
                    });
                }
                Err(e) => {
                    let reason = e.to_string();
                    self.halt_stream().await;
                    self.record_failure(track.title(), &reason, queue)?;
                    notices.push(PlaybackNotice::TrackSkipped {
                        title: track.title().to_string(),
                        reason,
                    });
                    next = queue.discard_current();
                }
            }
        }
    }

    /// Cuenta un fallo; al llegar al límite abandona y deja la sesión en `Idle`.
    fn record_failure(&mut self, title: &str, reason: &str, queue: &mut TrackQueue) -> EngineResult<()> {
        self.consecutive_failures += 1;
        warn!(
            channel = %self.channel,
            "❌ Fallo en track (racha {}): {} - {}",
            self.consecutive_failures, title, reason
        );
        self.emit(SessionEvent::TrackFailed {
            channel: self.channel,
            title: title.to_string(),
            reason: reason.to_string(),
        });

        if self.consecutive_failures < self.settings.max_consecutive_failures {
            return Ok(());
        }

        let failures = self.consecutive_failures;
        error!(
            channel = %self.channel,
            "🚨 {} fallos consecutivos, abandonando la reproducción", failures
        );
        queue.reset();
        self.consecutive_failures = 0;
        self.set_state(PlaybackState::Idle);
        self.emit(SessionEvent::Abandoned {
            channel: self.channel,
            failures,
        });
        Err(EngineError::PlaybackAbandoned {
            failures,
            last: reason.to_string(),
        })
    }

    /// Prepara el locator y arranca el transporte, todo dentro de `load_timeout`.
    async fn load(&self, track: &Track, offset: Duration) -> EngineResult<()> {
        let completion = CompletionHandle::new(self.owner.clone(), self.generation);
        let attempt = async {
            let locator = self.sources.prepare(track).await?;
            debug!(channel = %self.channel, "🔗 Stream: {}", locator);
            self.transport
                .start(self.channel, &locator, offset, completion)
                .await?;
            Ok::<(), EngineError>(())
        };

        match tokio::time::timeout(self.settings.load_timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::StartFailed(format!(
                "sin respuesta tras {}",
                humantime::format_duration(self.settings.load_timeout)
            ))
            .into()),
        }
    }

    async fn halt_stream(&mut self) {
        if let Err(e) = self.transport.stop(self.channel).await {
            warn!(channel = %self.channel, "⚠️ El transporte no pudo detener el stream: {}", e);
        }
        self.generation += 1;
    }
}
