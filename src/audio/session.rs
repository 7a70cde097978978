//! Per-channel playback session.
//!
//! A session owns the queue and the stream controller of one channel behind a
//! single fair async mutex. Every command, stream-end notice and reclamation
//! attempt goes through that lock, so transitions for a channel never overlap
//! while different channels never wait on each other.

use parking_lot::RwLock;
use serenity::model::id::GuildId;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tokio::sync::{broadcast, Mutex, MutexGuard};
use tracing::{debug, error, info};

use crate::{
    audio::{
        controller::{PlayReport, PlaybackNotice, PlaybackState, StreamController},
        equalizer::{AudioSettings, EqualizerPreset},
        queue::{QueueInfo, RepeatMode, TrackQueue},
        track::Track,
        transport::{StreamEnd, Transport},
    },
    config::EngineSettings,
    error::{EngineResult, QueueError, StateError},
    sources::SourceManager,
};

/// Por qué se cerró una sesión
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Stopped,
    IdleTimeout,
    Shutdown,
}

/// Eventos que el motor publica para la capa de Discord
#[derive(Debug, Clone)]
pub enum SessionEvent {
    NowPlaying { channel: GuildId, track: Track },
    TrackFailed { channel: GuildId, title: String, reason: String },
    Abandoned { channel: GuildId, failures: u32 },
    QueueFinished { channel: GuildId },
    Closed { channel: GuildId, reason: CloseReason },
}

/// Lo que recibe quien envió un comando
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub state: PlaybackState,
    pub now_playing: Option<Track>,
    /// Posición en la cola (base 1) cuando el comando encoló algo
    pub position: Option<usize>,
    pub notices: Vec<PlaybackNotice>,
}

impl CommandOutcome {
    /// Canal sin nada sonando
    pub fn idle() -> Self {
        Self {
            state: PlaybackState::Idle,
            now_playing: None,
            position: None,
            notices: Vec::new(),
        }
    }

    fn from_report(state: PlaybackState, report: PlayReport, position: Option<usize>) -> Self {
        Self {
            state,
            now_playing: report.now_playing,
            position,
            notices: report.notices,
        }
    }
}

struct SessionState {
    queue: TrackQueue,
    controller: StreamController,
    last_activity: Instant,
}

impl SessionState {
    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    fn outcome(&self, position: Option<usize>) -> CommandOutcome {
        CommandOutcome {
            state: self.controller.state(),
            now_playing: self.queue.peek_current().cloned(),
            position,
            notices: Vec::new(),
        }
    }
}

pub struct Session {
    channel: GuildId,
    inner: Mutex<SessionState>,
    /// Copia del estado legible sin tomar el lock
    state: Arc<RwLock<PlaybackState>>,
    retired: AtomicBool,
    settings: Arc<EngineSettings>,
}

impl Session {
    pub(crate) fn new(
        channel: GuildId,
        transport: Arc<dyn Transport>,
        sources: Arc<SourceManager>,
        settings: Arc<EngineSettings>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| {
            let state = Arc::new(RwLock::new(PlaybackState::Idle));
            let controller = StreamController::new(
                channel,
                state.clone(),
                transport,
                sources,
                settings.clone(),
                events,
                me.clone(),
            );
            debug!(channel = %channel, "🆕 Sesión creada");
            Self {
                channel,
                inner: Mutex::new(SessionState {
                    queue: TrackQueue::new(),
                    controller,
                    last_activity: Instant::now(),
                }),
                state,
                retired: AtomicBool::new(false),
                settings,
            }
        })
    }

    pub fn channel(&self) -> GuildId {
        self.channel
    }

    /// Estado actual sin esperar a comandos en curso
    pub fn state(&self) -> PlaybackState {
        *self.state.read()
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Lock for user commands: bounded wait, and refused once the session retired.
    async fn lock(&self) -> Result<MutexGuard<'_, SessionState>, StateError> {
        let guard = tokio::time::timeout(self.settings.command_timeout, self.inner.lock())
            .await
            .map_err(|_| {
                debug!(channel = %self.channel, "⏳ Sesión ocupada");
                StateError::SessionBusy
            })?;
        if self.is_retired() {
            return Err(StateError::SessionClosed);
        }
        Ok(guard)
    }

    /// Encola un track; si la sesión estaba inactiva arranca la reproducción.
    pub async fn enqueue(&self, track: Track) -> EngineResult<CommandOutcome> {
        let mut guard = self.lock().await?;
        let SessionState { queue, controller, last_activity } = &mut *guard;
        *last_activity = Instant::now();

        let max = self.settings.max_queue_size;
        if queue.len() >= max {
            return Err(QueueError::Full { max }.into());
        }

        let position = queue.enqueue(track);
        if controller.state() == PlaybackState::Idle {
            let report = controller.play(queue).await?;
            return Ok(CommandOutcome::from_report(controller.state(), report, Some(position)));
        }

        Ok(guard.outcome(Some(position)))
    }

    pub async fn pause(&self) -> EngineResult<CommandOutcome> {
        let mut guard = self.lock().await?;
        guard.touch();
        guard.controller.pause().await?;
        Ok(guard.outcome(None))
    }

    pub async fn resume(&self) -> EngineResult<CommandOutcome> {
        let mut guard = self.lock().await?;
        guard.touch();
        guard.controller.resume().await?;
        Ok(guard.outcome(None))
    }

    pub async fn skip(&self) -> EngineResult<CommandOutcome> {
        let mut guard = self.lock().await?;
        let SessionState { queue, controller, last_activity } = &mut *guard;
        *last_activity = Instant::now();
        let report = controller.skip(queue).await?;
        Ok(CommandOutcome::from_report(controller.state(), report, None))
    }

    /// Reinicia el track actual desde `offset`
    pub async fn seek(&self, offset: Duration) -> EngineResult<CommandOutcome> {
        let mut guard = self.lock().await?;
        let SessionState { queue, controller, last_activity } = &mut *guard;
        *last_activity = Instant::now();
        let report = controller.seek(offset, queue).await?;
        Ok(CommandOutcome::from_report(controller.state(), report, None))
    }

    pub async fn stop(&self) -> EngineResult<CommandOutcome> {
        let mut guard = self.lock().await?;
        let SessionState { queue, controller, last_activity } = &mut *guard;
        *last_activity = Instant::now();
        controller.stop(queue).await;
        Ok(guard.outcome(None))
    }

    pub async fn snapshot(&self) -> EngineResult<QueueInfo> {
        let guard = self.lock().await?;
        let audio = guard.controller.audio();
        Ok(guard.queue.info(guard.controller.state(), audio.volume, audio.equalizer))
    }

    pub async fn now_playing(&self) -> EngineResult<(Track, PlaybackState)> {
        let guard = self.lock().await?;
        let track = guard.queue.peek_current().cloned().ok_or(QueueError::Empty)?;
        Ok((track, guard.controller.state()))
    }

    pub async fn set_repeat(&self, mode: RepeatMode) -> EngineResult<RepeatMode> {
        let mut guard = self.lock().await?;
        guard.touch();
        guard.queue.set_repeat(mode);
        Ok(mode)
    }

    pub async fn set_shuffle(&self, on: bool) -> EngineResult<bool> {
        let mut guard = self.lock().await?;
        guard.touch();
        guard.queue.set_shuffle(on);
        Ok(on)
    }

    pub async fn remove(&self, position: usize) -> EngineResult<Track> {
        let mut guard = self.lock().await?;
        guard.touch();
        Ok(guard.queue.remove_at(position)?)
    }

    pub async fn move_track(&self, from: usize, to: usize) -> EngineResult<()> {
        let mut guard = self.lock().await?;
        guard.touch();
        Ok(guard.queue.move_track(from, to)?)
    }

    pub async fn clear(&self) -> EngineResult<usize> {
        let mut guard = self.lock().await?;
        guard.touch();
        Ok(guard.queue.clear())
    }

    pub async fn set_volume(&self, volume: f32) -> EngineResult<AudioSettings> {
        let mut guard = self.lock().await?;
        guard.touch();
        let audio = AudioSettings {
            volume: volume.clamp(0.0, AudioSettings::MAX_VOLUME),
            ..guard.controller.audio()
        };
        guard.controller.set_audio(audio).await;
        info!(channel = %self.channel, "🔊 Volumen ajustado a {:.0}%", audio.volume * 100.0);
        Ok(audio)
    }

    pub async fn set_equalizer(&self, preset: EqualizerPreset) -> EngineResult<AudioSettings> {
        let mut guard = self.lock().await?;
        guard.touch();
        let audio = AudioSettings {
            equalizer: preset,
            ..guard.controller.audio()
        };
        guard.controller.set_audio(audio).await;
        info!(channel = %self.channel, "🎛️ Ecualizador: {}", preset.as_str());
        Ok(audio)
    }

    /// Fin de stream desde el transporte. Espera el lock sin límite: el aviso
    /// no se puede reintentar.
    pub(crate) async fn on_stream_end(&self, generation: u64, end: StreamEnd) {
        let mut guard = self.inner.lock().await;
        if self.is_retired() {
            debug!(channel = %self.channel, "Fin de stream para sesión retirada, ignorado");
            return;
        }
        let SessionState { queue, controller, last_activity } = &mut *guard;
        *last_activity = Instant::now();

        if let Some(Err(e)) = controller.on_stream_end(generation, end, queue).await {
            error!(channel = %self.channel, "❌ Error al avanzar la cola: {}", e);
        }
    }

    /// Retira la sesión si lleva `idle_timeout` sin actividad, en `Idle` y sin cola.
    ///
    /// Never waits: a session whose lock is held is in use and not reclaimable.
    pub(crate) fn try_retire(&self, now: Instant, idle_timeout: Duration) -> bool {
        if self.is_retired() {
            return true;
        }
        let Ok(guard) = self.inner.try_lock() else {
            return false;
        };
        let reclaimable = guard.controller.state() == PlaybackState::Idle
            && guard.queue.is_empty()
            && now.saturating_duration_since(guard.last_activity) >= idle_timeout;
        if reclaimable {
            self.retired.store(true, Ordering::Release);
        }
        reclaimable
    }

    /// Detiene todo y retira la sesión. Espera a que termine la transición en curso.
    pub(crate) async fn shutdown(&self) {
        let mut guard = self.inner.lock().await;
        if self.is_retired() {
            return;
        }
        let SessionState { queue, controller, .. } = &mut *guard;
        controller.stop(queue).await;
        self.retired.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::EngineError,
        testing::{self, FakeTransport, TransportCall},
    };
    use pretty_assertions::assert_eq;

    fn channel() -> GuildId {
        testing::channel()
    }

    #[tokio::test]
    async fn test_enqueue_on_idle_starts_playing() {
        let transport = FakeTransport::new();
        let session = testing::session(transport.clone());

        let first = session.enqueue(testing::track("a")).await.unwrap();
        assert_eq!(first.state, PlaybackState::Playing);
        assert_eq!(first.now_playing.map(|t| t.title().to_string()), Some("a".to_string()));

        let second = session.enqueue(testing::track("b")).await.unwrap();
        assert_eq!(second.state, PlaybackState::Playing);
        assert_eq!(second.position, Some(1));
        assert_eq!(transport.started(channel()), vec!["https://cdn.test/a.mp3"]);
    }

    #[tokio::test]
    async fn test_pause_and_resume_are_idempotent() {
        let transport = FakeTransport::new();
        let session = testing::session(transport.clone());
        session.enqueue(testing::track("a")).await.unwrap();

        assert_eq!(session.pause().await.unwrap().state, PlaybackState::Paused);
        assert_eq!(session.pause().await.unwrap().state, PlaybackState::Paused);
        assert_eq!(session.resume().await.unwrap().state, PlaybackState::Playing);
        assert_eq!(session.resume().await.unwrap().state, PlaybackState::Playing);

        let suspends = transport
            .calls(channel())
            .into_iter()
            .filter(|c| *c == TransportCall::Suspend)
            .count();
        assert_eq!(suspends, 1);
    }

    #[tokio::test]
    async fn test_resume_from_idle_is_rejected() {
        let session = testing::session(FakeTransport::new());

        let err = session.resume().await.unwrap_err();
        assert_eq!(
            err,
            EngineError::State(StateError::InvalidTransition {
                from: PlaybackState::Idle,
                command: "resume",
            })
        );
        assert_eq!(session.state(), PlaybackState::Idle);
    }

    #[tokio::test]
    async fn test_natural_end_advances_then_goes_idle() {
        let transport = FakeTransport::new();
        let session = testing::session(transport.clone());
        session.enqueue(testing::track("a")).await.unwrap();
        session.enqueue(testing::track("b")).await.unwrap();

        transport.finish(channel()).await;
        let (current, state) = session.now_playing().await.unwrap();
        assert_eq!(current.title(), "b");
        assert_eq!(state, PlaybackState::Playing);

        transport.finish(channel()).await;
        assert_eq!(session.state(), PlaybackState::Idle);
        assert_eq!(session.now_playing().await.unwrap_err(), EngineError::Queue(QueueError::Empty));
    }

    #[tokio::test]
    async fn test_failed_start_is_skipped_with_notice() {
        let transport = FakeTransport::new();
        transport.fail_on("bad");
        let session = testing::session(transport.clone());

        let outcome = session.enqueue(testing::track("bad")).await.unwrap();
        assert_eq!(outcome.state, PlaybackState::Idle);
        assert_eq!(outcome.notices.len(), 1);
        let PlaybackNotice::TrackSkipped { title, .. } = &outcome.notices[0];
        assert_eq!(title, "bad");

        let next = session.enqueue(testing::track("good")).await.unwrap();
        assert_eq!(next.state, PlaybackState::Playing);
    }

    #[tokio::test]
    async fn test_consecutive_failures_abandon_and_clear_queue() {
        let transport = FakeTransport::new();
        transport.fail_on("bad");
        let (session, mut events) = testing::session_with_events(transport.clone());

        session.enqueue(testing::track("a")).await.unwrap();
        for name in ["bad1", "bad2", "bad3", "never"] {
            session.enqueue(testing::track(name)).await.unwrap();
        }

        transport.finish(channel()).await;

        assert_eq!(session.state(), PlaybackState::Idle);
        let info = session.snapshot().await.unwrap();
        assert!(info.current.is_none());
        assert!(info.items.is_empty());
        assert!(!transport.started(channel()).iter().any(|l| l.contains("never")));

        let mut abandoned = false;
        while let Ok(event) = events.try_recv() {
            if let SessionEvent::Abandoned { failures, .. } = event {
                assert_eq!(failures, 3);
                abandoned = true;
            }
        }
        assert!(abandoned);
    }

    #[tokio::test]
    async fn test_abandon_is_reported_to_the_requester() {
        let transport = FakeTransport::new();
        transport.fail_on("bad");
        let session = testing::session(transport.clone());

        session.enqueue(testing::track("bad1")).await.unwrap();
        session.enqueue(testing::track("bad2")).await.unwrap();
        let err = session.enqueue(testing::track("bad3")).await.unwrap_err();

        assert!(matches!(err, EngineError::PlaybackAbandoned { failures: 3, .. }));
        assert_eq!(session.state(), PlaybackState::Idle);
    }

    #[tokio::test]
    async fn test_success_resets_failure_streak() {
        let transport = FakeTransport::new();
        transport.fail_on("bad");
        let session = testing::session(transport.clone());

        session.enqueue(testing::track("bad1")).await.unwrap();
        session.enqueue(testing::track("bad2")).await.unwrap();
        session.enqueue(testing::track("good")).await.unwrap();
        transport.finish(channel()).await;

        let outcome = session.enqueue(testing::track("bad3")).await.unwrap();
        assert_eq!(outcome.state, PlaybackState::Idle);
        assert_eq!(outcome.notices.len(), 1);
    }

    #[tokio::test]
    async fn test_load_timeout_counts_as_failure() {
        let transport = FakeTransport::new();
        transport.hang_on("stuck");
        let session = testing::session(transport.clone());

        let outcome = session.enqueue(testing::track("stuck")).await.unwrap();
        assert_eq!(outcome.state, PlaybackState::Idle);
        let PlaybackNotice::TrackSkipped { reason, .. } = &outcome.notices[0];
        assert!(reason.contains("sin respuesta"));
    }

    #[tokio::test]
    async fn test_dropped_stream_moves_on() {
        let transport = FakeTransport::new();
        let session = testing::session(transport.clone());
        session.enqueue(testing::track("a")).await.unwrap();
        session.enqueue(testing::track("b")).await.unwrap();
        session.set_repeat(RepeatMode::One).await.unwrap();

        transport.drop_stream(channel(), "conexión perdida").await;

        // Un track que se corta no se repite aunque esté activo el modo One
        let (current, _) = session.now_playing().await.unwrap();
        assert_eq!(current.title(), "b");
    }

    #[tokio::test]
    async fn test_stale_completion_is_ignored() {
        let transport = FakeTransport::new();
        let session = testing::session(transport.clone());
        session.enqueue(testing::track("a")).await.unwrap();
        session.enqueue(testing::track("b")).await.unwrap();
        session.enqueue(testing::track("c")).await.unwrap();

        let stale = transport.take_completion(channel()).unwrap();
        session.skip().await.unwrap();
        stale.deliver(StreamEnd::Finished).await;

        let (current, state) = session.now_playing().await.unwrap();
        assert_eq!(current.title(), "b");
        assert_eq!(state, PlaybackState::Playing);
    }

    #[tokio::test]
    async fn test_skip_honours_repeat_one() {
        let transport = FakeTransport::new();
        let session = testing::session(transport.clone());
        session.enqueue(testing::track("a")).await.unwrap();
        session.enqueue(testing::track("b")).await.unwrap();
        session.set_repeat(RepeatMode::One).await.unwrap();

        let outcome = session.skip().await.unwrap();
        assert_eq!(outcome.now_playing.map(|t| t.title().to_string()), Some("a".to_string()));
        assert_eq!(transport.started(channel()).len(), 2);
    }

    #[tokio::test]
    async fn test_skip_from_paused_advances() {
        let transport = FakeTransport::new();
        let session = testing::session(transport.clone());
        session.enqueue(testing::track("a")).await.unwrap();
        session.enqueue(testing::track("b")).await.unwrap();
        session.pause().await.unwrap();

        let outcome = session.skip().await.unwrap();
        assert_eq!(outcome.state, PlaybackState::Playing);
        assert_eq!(outcome.now_playing.map(|t| t.title().to_string()), Some("b".to_string()));
        assert_eq!(
            transport.started(channel()),
            vec!["https://cdn.test/a.mp3", "https://cdn.test/b.mp3"]
        );
    }

    #[tokio::test]
    async fn test_skip_from_paused_on_last_track_goes_idle() {
        let transport = FakeTransport::new();
        let session = testing::session(transport.clone());
        session.enqueue(testing::track("a")).await.unwrap();
        session.pause().await.unwrap();

        let outcome = session.skip().await.unwrap();
        assert_eq!(outcome.state, PlaybackState::Idle);
        assert!(outcome.now_playing.is_none());
        assert_eq!(transport.calls(channel()).last(), Some(&TransportCall::Stop));
        assert_eq!(session.now_playing().await.unwrap_err(), EngineError::Queue(QueueError::Empty));
    }

    #[tokio::test]
    async fn test_pause_before_skip_reaches_transport_in_order() {
        let transport = FakeTransport::new();
        let gate = transport.gate_on("slow");
        let session = testing::session(transport.clone());

        let loading = {
            let session = session.clone();
            tokio::spawn(async move { session.enqueue(testing::track("slow")).await })
        };
        while session.state() != PlaybackState::Loading {
            tokio::task::yield_now().await;
        }

        // Los tres comandos esperan el lock en el orden en que se emitieron
        let mut pending = Vec::new();
        for command in ["enqueue", "pause", "skip"] {
            let session = session.clone();
            pending.push(tokio::spawn(async move {
                match command {
                    "enqueue" => session.enqueue(testing::track("b")).await,
                    "pause" => session.pause().await,
                    _ => session.skip().await,
                }
            }));
            for _ in 0..5 {
                tokio::task::yield_now().await;
            }
        }
        gate.notify_one();

        loading.await.unwrap().unwrap();
        let states: Vec<PlaybackState> = futures::future::join_all(pending)
            .await
            .into_iter()
            .map(|result| result.unwrap().unwrap().state)
            .collect();
        assert_eq!(
            states,
            vec![PlaybackState::Playing, PlaybackState::Paused, PlaybackState::Playing]
        );

        let calls: Vec<TransportCall> = transport
            .calls(channel())
            .into_iter()
            .filter(|call| !matches!(call, TransportCall::Settings(_)))
            .collect();
        assert_eq!(
            calls,
            vec![
                TransportCall::Start("https://cdn.test/slow.mp3".to_string()),
                TransportCall::Suspend,
                TransportCall::Stop,
                TransportCall::Start("https://cdn.test/b.mp3".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_seek_restarts_current_track_from_offset() {
        let transport = FakeTransport::new();
        let session = testing::session(transport.clone());
        session.enqueue(testing::track("a")).await.unwrap();
        session.enqueue(testing::track("b")).await.unwrap();

        let outcome = session.seek(Duration::from_secs(30)).await.unwrap();
        assert_eq!(outcome.state, PlaybackState::Playing);
        assert_eq!(outcome.now_playing.map(|t| t.title().to_string()), Some("a".to_string()));

        let calls = transport.calls(channel());
        let restart = calls
            .iter()
            .position(|call| *call == TransportCall::Seek(Duration::from_secs(30)))
            .unwrap();
        assert_eq!(calls[restart - 1], TransportCall::Start("https://cdn.test/a.mp3".to_string()));
        assert_eq!(calls[restart - 2], TransportCall::Stop);

        // La cola no se movió
        let info = session.snapshot().await.unwrap();
        assert_eq!(info.total_items, 1);
    }

    #[tokio::test]
    async fn test_seek_while_paused_stays_paused() {
        let transport = FakeTransport::new();
        let session = testing::session(transport.clone());
        session.enqueue(testing::track("a")).await.unwrap();
        session.pause().await.unwrap();

        let outcome = session.seek(Duration::from_secs(5)).await.unwrap();
        assert_eq!(outcome.state, PlaybackState::Paused);
        assert_eq!(transport.calls(channel()).last(), Some(&TransportCall::Suspend));
    }

    #[tokio::test]
    async fn test_seek_past_the_end_is_rejected() {
        let transport = FakeTransport::new();
        let session = testing::session(transport.clone());
        let track = testing::track("a").with_duration(Duration::from_secs(60));
        session.enqueue(track).await.unwrap();

        let err = session.seek(Duration::from_secs(90)).await.unwrap_err();
        assert_eq!(
            err,
            EngineError::Queue(QueueError::SeekOutOfRange { position: 90, length: 60 })
        );
        assert_eq!(session.state(), PlaybackState::Playing);
        assert_eq!(transport.started(channel()).len(), 1);
    }

    #[tokio::test]
    async fn test_skip_when_idle_is_rejected() {
        let session = testing::session(FakeTransport::new());
        let err = session.skip().await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::State(StateError::InvalidTransition { command: "skip", .. })
        ));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_clears_queue() {
        let transport = FakeTransport::new();
        let session = testing::session(transport.clone());
        session.enqueue(testing::track("a")).await.unwrap();
        session.enqueue(testing::track("b")).await.unwrap();

        assert_eq!(session.stop().await.unwrap().state, PlaybackState::Idle);
        assert_eq!(session.stop().await.unwrap().state, PlaybackState::Idle);

        let info = session.snapshot().await.unwrap();
        assert!(info.current.is_none());
        assert_eq!(info.total_items, 0);
    }

    #[tokio::test]
    async fn test_commands_wait_for_loading_to_finish() {
        let transport = FakeTransport::new();
        let gate = transport.gate_on("slow");
        let session = testing::session(transport.clone());

        let loading = {
            let session = session.clone();
            tokio::spawn(async move { session.enqueue(testing::track("slow")).await })
        };
        while session.state() != PlaybackState::Loading {
            tokio::task::yield_now().await;
        }

        // Mientras carga, el comando espera y termina por tiempo
        let err = session.pause().await.unwrap_err();
        assert_eq!(err, EngineError::State(StateError::SessionBusy));

        gate.notify_one();
        let outcome = loading.await.unwrap().unwrap();
        assert_eq!(outcome.state, PlaybackState::Playing);
        assert_eq!(session.pause().await.unwrap().state, PlaybackState::Paused);
    }

    #[tokio::test]
    async fn test_queue_capacity_is_enforced() {
        let transport = FakeTransport::new();
        let mut settings = testing::settings();
        settings.max_queue_size = 2;
        let session = testing::session_with(transport, settings);

        session.enqueue(testing::track("a")).await.unwrap();
        session.enqueue(testing::track("b")).await.unwrap();
        session.enqueue(testing::track("c")).await.unwrap();
        let err = session.enqueue(testing::track("d")).await.unwrap_err();
        assert_eq!(err, EngineError::Queue(QueueError::Full { max: 2 }));
    }

    #[tokio::test]
    async fn test_volume_is_forwarded_while_playing() {
        let transport = FakeTransport::new();
        let session = testing::session(transport.clone());
        session.enqueue(testing::track("a")).await.unwrap();

        let audio = session.set_volume(1.5).await.unwrap();
        assert_eq!(audio.volume, 1.5);
        assert_eq!(transport.calls(channel()).last(), Some(&TransportCall::Settings(1.5)));
    }

    #[tokio::test]
    async fn test_retired_session_refuses_commands() {
        let session = testing::session(FakeTransport::new());
        let later = Instant::now() + Duration::from_secs(301);

        assert!(session.try_retire(later, Duration::from_secs(300)));
        assert_eq!(
            session.enqueue(testing::track("a")).await.unwrap_err(),
            EngineError::State(StateError::SessionClosed)
        );
    }

    #[tokio::test]
    async fn test_busy_session_is_not_retired() {
        let transport = FakeTransport::new();
        let session = testing::session(transport);
        session.enqueue(testing::track("a")).await.unwrap();
        let later = Instant::now() + Duration::from_secs(301);

        assert!(!session.try_retire(later, Duration::from_secs(300)));
        session.stop().await.unwrap();
        assert!(!session.try_retire(Instant::now(), Duration::from_secs(300)));
        assert!(session.try_retire(later + Duration::from_secs(1), Duration::from_secs(300)));
    }
}
