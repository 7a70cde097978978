use dashmap::{mapref::entry::Entry, DashMap};
use futures::future::join_all;
use serenity::model::id::GuildId;
use std::{sync::Arc, time::Instant};
use tokio::{sync::broadcast, task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    audio::{
        controller::PlaybackState,
        session::{CloseReason, Session, SessionEvent},
        transport::Transport,
    },
    config::EngineSettings,
    sources::SourceManager,
};

const EVENT_BUFFER: usize = 256;

/// Todas las sesiones activas, una por canal.
///
/// Sessions are created on first use and reclaimed after sitting idle with an
/// empty queue. A session is only removed from the map after it has been
/// marked retired under its own lock, so a command that raced with removal
/// fails with `SessionClosed` instead of mutating a detached session.
pub struct SessionRegistry {
    sessions: DashMap<GuildId, Arc<Session>>,
    transport: Arc<dyn Transport>,
    sources: Arc<SourceManager>,
    settings: Arc<EngineSettings>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionRegistry {
    pub fn new(transport: Arc<dyn Transport>, sources: Arc<SourceManager>, settings: EngineSettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            sessions: DashMap::new(),
            transport,
            sources,
            settings: Arc::new(settings),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn sources(&self) -> &Arc<SourceManager> {
        &self.sources
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Sesión viva del canal, creándola si hace falta
    pub fn get_or_create(&self, channel: GuildId) -> Arc<Session> {
        match self.sessions.entry(channel) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_retired() {
                    let fresh = self.new_session(channel);
                    entry.insert(fresh.clone());
                    fresh
                } else {
                    entry.get().clone()
                }
            }
            Entry::Vacant(entry) => entry.insert(self.new_session(channel)).clone(),
        }
    }

    fn new_session(&self, channel: GuildId) -> Arc<Session> {
        info!(channel = %channel, "🎧 Nueva sesión de reproducción");
        Session::new(
            channel,
            self.transport.clone(),
            self.sources.clone(),
            self.settings.clone(),
            self.events.clone(),
        )
    }

    pub fn get(&self, channel: GuildId) -> Option<Arc<Session>> {
        self.sessions
            .get(&channel)
            .map(|entry| entry.value().clone())
            .filter(|session| !session.is_retired())
    }

    /// Estado de un canal sin bloquear; `Idle` si no hay sesión
    pub fn state(&self, channel: GuildId) -> PlaybackState {
        self.get(channel).map(|s| s.state()).unwrap_or(PlaybackState::Idle)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn channels(&self) -> Vec<GuildId> {
        self.sessions.iter().map(|entry| *entry.key()).collect()
    }

    /// Detiene y elimina la sesión del canal. Devuelve `false` si no había.
    pub async fn remove(&self, channel: GuildId, reason: CloseReason) -> bool {
        let Some(session) = self.sessions.get(&channel).map(|entry| entry.value().clone()) else {
            return false;
        };

        session.shutdown().await;

        let removed = self
            .sessions
            .remove_if(&channel, |_, current| Arc::ptr_eq(current, &session))
            .is_some();
        if removed {
            info!(channel = %channel, "👋 Sesión cerrada ({:?})", reason);
            let _ = self.events.send(SessionEvent::Closed { channel, reason });
        }
        removed
    }

    /// Libera las sesiones inactivas a `now`. Devuelve los canales liberados.
    pub fn sweep_at(&self, now: Instant) -> Vec<GuildId> {
        let idle_timeout = self.settings.idle_timeout;
        let mut reclaimed = Vec::new();

        for channel in self.channels() {
            let removed = self
                .sessions
                .remove_if(&channel, |_, session| session.try_retire(now, idle_timeout))
                .is_some();
            if removed {
                debug!(channel = %channel, "🧹 Sesión inactiva liberada");
                let _ = self.events.send(SessionEvent::Closed {
                    channel,
                    reason: CloseReason::IdleTimeout,
                });
                reclaimed.push(channel);
            }
        }

        reclaimed
    }

    /// Tarea de mantenimiento que barre sesiones inactivas cada `sweep_interval`
    pub fn spawn_reaper(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(registry.settings.sweep_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("🛑 Limpieza de sesiones detenida");
                        break;
                    }
                    _ = interval.tick() => {
                        let reclaimed = registry.sweep_at(Instant::now());
                        if !reclaimed.is_empty() {
                            info!("🧹 {} sesiones inactivas liberadas ({} activas)", reclaimed.len(), registry.len());
                        }
                    }
                }
            }
        })
    }

    /// Cierra todas las sesiones (apagado del bot)
    pub async fn stop_all(&self) {
        let channels = self.channels();
        info!("⏹️ Cerrando {} sesiones", channels.len());
        join_all(
            channels
                .into_iter()
                .map(|channel| self.remove(channel, CloseReason::Shutdown)),
        )
        .await;
    }
}
