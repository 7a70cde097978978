//! Entry point for user commands.
//!
//! Resolves queries before touching any session, routes each command to the
//! session of its guild, and retries with backoff when the session is busy or
//! was reclaimed while the command was on its way.

use serenity::model::id::{GuildId, UserId};
use std::{future::Future, sync::Arc, time::Duration};
use tracing::{debug, info, warn};

use crate::{
    audio::{
        controller::PlaybackState,
        equalizer::{AudioSettings, EqualizerPreset},
        queue::{QueueInfo, RepeatMode},
        registry::SessionRegistry,
        session::{CloseReason, CommandOutcome, Session},
        track::Track,
    },
    error::{EngineError, EngineResult, QueueError, StateError},
    sources::SourceKind,
};

#[derive(Clone)]
pub struct CommandDispatcher {
    registry: Arc<SessionRegistry>,
}

impl CommandDispatcher {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Espera antes del reintento `attempt` (base 1): exponencial con jitter
    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.registry.settings().busy_backoff;
        let exp = base.saturating_mul(1u32 << (attempt - 1).min(6));
        let jitter_ms = (base.as_millis() as u64 / 2).max(1);
        exp + Duration::from_millis(fastrand::u64(0..=jitter_ms))
    }

    /// Ejecuta `op` contra la sesión del canal, creándola si hace falta
    async fn with_session<T, F, Fut>(&self, channel: GuildId, op: F) -> EngineResult<T>
    where
        F: Fn(Arc<Session>) -> Fut,
        Fut: Future<Output = EngineResult<T>>,
    {
        self.retrying(channel, || Ok(self.registry.get_or_create(channel)), op)
            .await
    }

    /// Como `with_session`, pero sin crear sesión: si no hay ninguna viva falla con `missing`
    async fn with_existing_session<T, M, F, Fut>(&self, channel: GuildId, missing: M, op: F) -> EngineResult<T>
    where
        M: Fn() -> EngineError,
        F: Fn(Arc<Session>) -> Fut,
        Fut: Future<Output = EngineResult<T>>,
    {
        self.retrying(channel, || self.registry.get(channel).ok_or_else(&missing), op)
            .await
    }

    /// Busca la sesión en cada intento y reintenta con backoff si está ocupada o cerrada
    async fn retrying<T, L, F, Fut>(&self, channel: GuildId, lookup: L, op: F) -> EngineResult<T>
    where
        L: Fn() -> EngineResult<Arc<Session>>,
        F: Fn(Arc<Session>) -> Fut,
        Fut: Future<Output = EngineResult<T>>,
    {
        let retries = self.registry.settings().busy_retries;
        let mut attempt = 0;

        loop {
            let session = lookup()?;
            match op(session).await {
                Err(e) if e.is_retryable() && attempt < retries => {
                    attempt += 1;
                    let delay = self.backoff(attempt);
                    debug!(
                        channel = %channel,
                        "🔄 Reintento {}/{} en {:?}: {}",
                        attempt, retries, delay, e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) if e.is_retryable() => {
                    warn!(channel = %channel, "⏳ Sin éxito tras {} reintentos: {}", retries, e);
                    return Err(e);
                }
                other => return other,
            }
        }
    }

    /// Resuelve la consulta y la encola. Un fallo al resolver no crea sesión.
    ///
    /// Returns the resolved track alongside the outcome so callers can tell
    /// whether it started right away or was queued behind something else.
    pub async fn play(
        &self,
        channel: GuildId,
        query: &str,
        source: Option<SourceKind>,
        requested_by: UserId,
    ) -> EngineResult<(Track, CommandOutcome)> {
        let track = self.registry.sources().resolve(query, source, requested_by).await?;
        let outcome = self.enqueue(channel, track.clone()).await?;
        Ok((track, outcome))
    }

    pub async fn enqueue(&self, channel: GuildId, track: Track) -> EngineResult<CommandOutcome> {
        self.with_session(channel, |session| {
            let track = track.clone();
            async move { session.enqueue(track).await }
        })
        .await
    }

    /// Controles de reproducción: sin sesión el canal está `Idle` y no se crea una
    async fn control<F, Fut>(&self, channel: GuildId, command: &'static str, op: F) -> EngineResult<CommandOutcome>
    where
        F: Fn(Arc<Session>) -> Fut,
        Fut: Future<Output = EngineResult<CommandOutcome>>,
    {
        let idle = || {
            EngineError::from(StateError::InvalidTransition {
                from: PlaybackState::Idle,
                command,
            })
        };
        self.with_existing_session(channel, idle, op).await
    }

    pub async fn pause(&self, channel: GuildId) -> EngineResult<CommandOutcome> {
        self.control(channel, "pause", |session| async move { session.pause().await })
            .await
    }

    pub async fn resume(&self, channel: GuildId) -> EngineResult<CommandOutcome> {
        self.control(channel, "resume", |session| async move { session.resume().await })
            .await
    }

    pub async fn skip(&self, channel: GuildId) -> EngineResult<CommandOutcome> {
        self.control(channel, "skip", |session| async move { session.skip().await })
            .await
    }

    pub async fn seek(&self, channel: GuildId, offset: Duration) -> EngineResult<CommandOutcome> {
        self.control(channel, "seek", |session| async move { session.seek(offset).await })
            .await
    }

    /// Detiene todo y cierra la sesión del canal.
    ///
    /// Stopping and retiring happen under one hold of the session lock, so a
    /// command queued behind the stop finds the session closed and is retried
    /// on a fresh one instead of being cut off afterwards.
    pub async fn stop(&self, channel: GuildId) -> EngineResult<CommandOutcome> {
        if self.registry.remove(channel, CloseReason::Stopped).await {
            info!(channel = %channel, "⏹️ Sesión detenida por comando");
        }
        Ok(CommandOutcome::idle())
    }

    /// Sin sesión devuelve una cola vacía, sin crearla
    pub async fn queue(&self, channel: GuildId) -> EngineResult<QueueInfo> {
        let result = self
            .with_existing_session(
                channel,
                || EngineError::from(QueueError::Empty),
                |session| async move { session.snapshot().await },
            )
            .await;
        match result {
            Err(EngineError::Queue(QueueError::Empty)) => {
                Ok(QueueInfo::empty(self.registry.settings().default_volume))
            }
            other => other,
        }
    }

    pub async fn now_playing(&self, channel: GuildId) -> EngineResult<(Track, PlaybackState)> {
        self.with_existing_session(
            channel,
            || EngineError::from(QueueError::Empty),
            |session| async move { session.now_playing().await },
        )
        .await
    }

    pub async fn set_repeat(&self, channel: GuildId, mode: RepeatMode) -> EngineResult<RepeatMode> {
        self.with_session(channel, |session| async move { session.set_repeat(mode).await })
            .await
    }

    pub async fn set_shuffle(&self, channel: GuildId, on: bool) -> EngineResult<bool> {
        self.with_session(channel, |session| async move { session.set_shuffle(on).await })
            .await
    }

    pub async fn remove(&self, channel: GuildId, position: usize) -> EngineResult<Track> {
        self.with_session(channel, |session| async move { session.remove(position).await })
            .await
    }

    pub async fn move_track(&self, channel: GuildId, from: usize, to: usize) -> EngineResult<()> {
        self.with_session(channel, |session| async move { session.move_track(from, to).await })
            .await
    }

    pub async fn clear(&self, channel: GuildId) -> EngineResult<usize> {
        self.with_session(channel, |session| async move { session.clear().await })
            .await
    }

    pub async fn set_volume(&self, channel: GuildId, volume: f32) -> EngineResult<AudioSettings> {
        self.with_session(channel, |session| async move { session.set_volume(volume).await })
            .await
    }

    pub async fn set_equalizer(&self, channel: GuildId, preset: EqualizerPreset) -> EngineResult<AudioSettings> {
        self.with_session(channel, |session| async move { session.set_equalizer(preset).await })
            .await
    }

    /// Estado sin bloquear
    pub fn state(&self, channel: GuildId) -> PlaybackState {
        self.registry.state(channel)
    }

    /// Cierra todas las sesiones; los comandos posteriores crean sesiones nuevas
    pub async fn shutdown(&self) {
        info!("🛑 Apagando el motor de sesiones");
        self.registry.stop_all().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::ResolveError,
        sources::MockTrackResolver,
        testing::{self, FakeTransport, TransportCall},
    };
    use pretty_assertions::assert_eq;
    use std::time::Instant;

    fn dispatcher(transport: Arc<FakeTransport>) -> CommandDispatcher {
        CommandDispatcher::new(Arc::new(testing::registry(transport)))
    }

    /// Deja correr a las tareas lanzadas hasta que se bloqueen
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    /// Lanza una carga lenta retenida por `gate` y espera a que tenga el lock
    async fn start_slow_load(dispatcher: &CommandDispatcher, channel: GuildId) {
        let dispatcher_clone = dispatcher.clone();
        tokio::spawn(async move { dispatcher_clone.enqueue(channel, testing::track("slow")).await });
        while dispatcher.state(channel) != PlaybackState::Loading {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_resolve_failure_creates_no_session() {
        let mut mock = MockTrackResolver::new();
        mock.expect_kind().return_const(SourceKind::YouTube);
        mock.expect_resolve()
            .returning(|q, _| Err(ResolveError::RateLimited(q.to_string())));
        let registry = Arc::new(testing::registry_with_resolver(FakeTransport::new(), Arc::new(mock)));
        let dispatcher = CommandDispatcher::new(registry.clone());

        let err = dispatcher
            .play(GuildId::new(1), "cualquier cosa", None, UserId::new(1))
            .await
            .unwrap_err();

        assert_eq!(err, EngineError::Resolve(ResolveError::RateLimited("cualquier cosa".to_string())));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_play_resolves_and_starts() {
        let transport = FakeTransport::new();
        let dispatcher = dispatcher(transport.clone());
        let channel = GuildId::new(1);

        let (track, outcome) = dispatcher
            .play(channel, "https://cdn.test/song.mp3", None, UserId::new(9))
            .await
            .unwrap();

        assert_eq!(track.title(), "song");
        assert_eq!(outcome.state, PlaybackState::Playing);
        assert_eq!(outcome.now_playing.unwrap().requested_by(), UserId::new(9));
        assert_eq!(transport.started(channel), vec!["https://cdn.test/song.mp3"]);
    }

    #[tokio::test]
    async fn test_busy_session_is_retried_until_free() {
        let transport = FakeTransport::new();
        let gate = transport.gate_on("slow");
        let dispatcher = dispatcher(transport);
        let channel = GuildId::new(1);

        let loading = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.enqueue(channel, testing::track("slow")).await })
        };
        while dispatcher.state(channel) != PlaybackState::Loading {
            tokio::task::yield_now().await;
        }
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(80)).await;
            gate.notify_one();
        });

        let outcome = dispatcher.pause(channel).await.unwrap();
        assert_eq!(outcome.state, PlaybackState::Paused);
        loading.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_busy_retries_are_bounded() {
        let transport = FakeTransport::new();
        let _gate = transport.gate_on("slow");
        let dispatcher = dispatcher(transport);
        let channel = GuildId::new(1);

        {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.enqueue(channel, testing::track("slow")).await });
        }
        while dispatcher.state(channel) != PlaybackState::Loading {
            tokio::task::yield_now().await;
        }

        let err = dispatcher.skip(channel).await.unwrap_err();
        assert_eq!(err, EngineError::State(StateError::SessionBusy));
    }

    #[tokio::test]
    async fn test_stop_closes_session() {
        let transport = FakeTransport::new();
        let dispatcher = dispatcher(transport);
        let channel = GuildId::new(4);
        dispatcher.enqueue(channel, testing::track("a")).await.unwrap();

        let outcome = dispatcher.stop(channel).await.unwrap();
        assert_eq!(outcome.state, PlaybackState::Idle);
        assert!(dispatcher.registry().get(channel).is_none());

        // Repetir stop sin sesión sigue siendo válido
        assert_eq!(dispatcher.stop(channel).await.unwrap().state, PlaybackState::Idle);
    }

    #[tokio::test]
    async fn test_play_queued_behind_stop_survives_it() {
        let transport = FakeTransport::new();
        let gate = transport.gate_on("slow");
        let dispatcher = dispatcher(transport.clone());
        let channel = GuildId::new(1);
        start_slow_load(&dispatcher, channel).await;

        let stop = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.stop(channel).await })
        };
        settle().await;
        let play = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.enqueue(channel, testing::track("b")).await })
        };
        settle().await;
        gate.notify_one();

        assert_eq!(stop.await.unwrap().unwrap().state, PlaybackState::Idle);
        let outcome = play.await.unwrap().unwrap();
        assert_eq!(outcome.state, PlaybackState::Playing);
        assert_eq!(outcome.now_playing.unwrap().title(), "b");

        // El stop se aplicó antes y el track posterior sigue sonando
        assert_eq!(dispatcher.registry().len(), 1);
        assert_eq!(dispatcher.state(channel), PlaybackState::Playing);
        assert_eq!(
            transport.started(channel),
            vec!["https://cdn.test/slow.mp3", "https://cdn.test/b.mp3"]
        );
        assert_ne!(transport.calls(channel).last(), Some(&TransportCall::Stop));
    }

    #[tokio::test]
    async fn test_control_queued_behind_stop_creates_no_session() {
        let transport = FakeTransport::new();
        let gate = transport.gate_on("slow");
        let dispatcher = dispatcher(transport);
        let channel = GuildId::new(2);
        start_slow_load(&dispatcher, channel).await;

        let stop = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.stop(channel).await })
        };
        settle().await;
        let pause = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.pause(channel).await })
        };
        settle().await;
        gate.notify_one();

        stop.await.unwrap().unwrap();
        let err = pause.await.unwrap().unwrap_err();
        assert_eq!(
            err,
            EngineError::State(StateError::InvalidTransition {
                from: PlaybackState::Idle,
                command: "pause",
            })
        );
        assert!(dispatcher.registry().is_empty());
    }

    #[tokio::test]
    async fn test_seek_without_session_is_rejected() {
        let dispatcher = dispatcher(FakeTransport::new());

        let err = dispatcher.seek(GuildId::new(8), Duration::from_secs(10)).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::State(StateError::InvalidTransition { command: "seek", .. })
        ));
        assert!(dispatcher.registry().is_empty());
    }

    #[tokio::test]
    async fn test_queries_without_session_do_not_create_one() {
        let dispatcher = dispatcher(FakeTransport::new());
        let channel = GuildId::new(5);

        let info = dispatcher.queue(channel).await.unwrap();
        assert_eq!(info.state, PlaybackState::Idle);
        assert_eq!(
            dispatcher.now_playing(channel).await.unwrap_err(),
            EngineError::Queue(QueueError::Empty)
        );
        assert!(dispatcher.registry().is_empty());
    }

    #[tokio::test]
    async fn test_controls_without_session_are_rejected_as_idle() {
        let dispatcher = dispatcher(FakeTransport::new());
        let channel = GuildId::new(7);

        let err = dispatcher.pause(channel).await.unwrap_err();
        assert_eq!(
            err,
            EngineError::State(StateError::InvalidTransition {
                from: PlaybackState::Idle,
                command: "pause",
            })
        );
        assert!(dispatcher.skip(channel).await.is_err());
        assert!(dispatcher.registry().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_closes_every_session() {
        let transport = FakeTransport::new();
        let dispatcher = dispatcher(transport.clone());
        for id in 1..=3 {
            dispatcher.enqueue(GuildId::new(id), testing::track("a")).await.unwrap();
        }

        dispatcher.shutdown().await;

        assert!(dispatcher.registry().is_empty());
        assert_eq!(dispatcher.state(GuildId::new(2)), PlaybackState::Idle);
    }

    #[tokio::test]
    async fn test_queue_edits_go_through_session() {
        let dispatcher = dispatcher(FakeTransport::new());
        let channel = GuildId::new(6);
        for name in ["a", "b", "c", "d"] {
            dispatcher.enqueue(channel, testing::track(name)).await.unwrap();
        }

        dispatcher.move_track(channel, 3, 1).await.unwrap();
        let removed = dispatcher.remove(channel, 2).await.unwrap();
        assert_eq!(removed.title(), "b");

        let info = dispatcher.queue(channel).await.unwrap();
        let titles: Vec<&str> = info.items.iter().map(|t| t.title()).collect();
        assert_eq!(titles, vec!["d", "c"]);

        assert_eq!(dispatcher.clear(channel).await.unwrap(), 2);
        assert_eq!(
            dispatcher.remove(channel, 1).await.unwrap_err(),
            EngineError::Queue(QueueError::OutOfRange { position: 1, len: 0 })
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_reclaim_racing_with_play_keeps_one_session() {
        for _ in 0..50 {
            let transport = FakeTransport::new();
            let registry = Arc::new(testing::registry(transport));
            let dispatcher = CommandDispatcher::new(registry.clone());
            let channel = GuildId::new(1);
            registry.get_or_create(channel);
            let far = Instant::now() + registry.settings().idle_timeout + Duration::from_secs(1);

            let play = {
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move { dispatcher.enqueue(channel, testing::track("a")).await })
            };
            let sweep = {
                let registry = registry.clone();
                tokio::spawn(async move { registry.sweep_at(far) })
            };

            let outcome = play.await.unwrap().unwrap();
            sweep.await.unwrap();

            assert_eq!(outcome.state, PlaybackState::Playing);
            assert_eq!(registry.len(), 1);
            let survivor = registry.get(channel).unwrap();
            assert_eq!(survivor.state(), PlaybackState::Playing);
        }
    }
}
