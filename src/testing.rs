//! Test doubles shared by the unit tests of the engine.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{GuildId, UserId};
use std::{
    collections::HashMap,
    sync::Arc,
    time::Duration,
};
use tokio::sync::{broadcast, Notify};

use crate::{
    audio::{
        equalizer::AudioSettings,
        registry::SessionRegistry,
        session::{Session, SessionEvent},
        track::{StreamLocator, Track},
        transport::{CompletionHandle, StreamEnd, Transport},
    },
    cache::ResolveCache,
    config::EngineSettings,
    error::TransportError,
    sources::{DirectUrlResolver, SourceKind, SourceManager, TrackResolver},
};

#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    Start(String),
    Seek(Duration),
    Suspend,
    Resume,
    Stop,
    Settings(f32),
}

/// Transporte en memoria que registra llamadas y deja controlar fallos
#[derive(Default)]
pub struct FakeTransport {
    calls: Mutex<Vec<(GuildId, TransportCall)>>,
    completions: Mutex<HashMap<GuildId, CompletionHandle>>,
    failing: Mutex<Vec<String>>,
    hanging: Mutex<Vec<String>>,
    gates: Mutex<Vec<(String, Arc<Notify>)>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Los locators que contengan `pattern` fallan al arrancar
    pub fn fail_on(&self, pattern: &str) {
        self.failing.lock().push(pattern.to_string());
    }

    /// Los locators que contengan `pattern` nunca terminan de arrancar
    pub fn hang_on(&self, pattern: &str) {
        self.hanging.lock().push(pattern.to_string());
    }

    /// Los locators que contengan `pattern` esperan al `Notify` devuelto
    pub fn gate_on(&self, pattern: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates.lock().push((pattern.to_string(), gate.clone()));
        gate
    }

    pub fn calls(&self, channel: GuildId) -> Vec<TransportCall> {
        self.calls
            .lock()
            .iter()
            .filter(|(ch, _)| *ch == channel)
            .map(|(_, call)| call.clone())
            .collect()
    }

    pub fn started(&self, channel: GuildId) -> Vec<String> {
        self.calls(channel)
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::Start(locator) => Some(locator),
                _ => None,
            })
            .collect()
    }

    pub fn take_completion(&self, channel: GuildId) -> Option<CompletionHandle> {
        self.completions.lock().remove(&channel)
    }

    /// Termina el stream actual del canal con normalidad
    pub async fn finish(&self, channel: GuildId) {
        if let Some(handle) = self.take_completion(channel) {
            handle.deliver(StreamEnd::Finished).await;
        }
    }

    pub async fn drop_stream(&self, channel: GuildId, reason: &str) {
        if let Some(handle) = self.take_completion(channel) {
            handle.deliver(StreamEnd::Dropped(reason.to_string())).await;
        }
    }

    fn record(&self, channel: GuildId, call: TransportCall) {
        self.calls.lock().push((channel, call));
    }

    fn matches(list: &Mutex<Vec<String>>, locator: &str) -> bool {
        list.lock().iter().any(|pattern| locator.contains(pattern.as_str()))
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn start(
        &self,
        channel: GuildId,
        locator: &StreamLocator,
        from_offset: Duration,
        completion: CompletionHandle,
    ) -> Result<(), TransportError> {
        let locator = locator.to_string();
        self.record(channel, TransportCall::Start(locator.clone()));
        if !from_offset.is_zero() {
            self.record(channel, TransportCall::Seek(from_offset));
        }

        let gate = self
            .gates
            .lock()
            .iter()
            .find(|(pattern, _)| locator.contains(pattern.as_str()))
            .map(|(_, gate)| gate.clone());
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if Self::matches(&self.hanging, &locator) {
            std::future::pending::<()>().await;
        }
        if Self::matches(&self.failing, &locator) {
            return Err(TransportError::StartFailed(format!("no se pudo abrir {}", locator)));
        }

        self.completions.lock().insert(channel, completion);
        Ok(())
    }

    async fn suspend(&self, channel: GuildId) -> Result<(), TransportError> {
        self.record(channel, TransportCall::Suspend);
        Ok(())
    }

    async fn resume(&self, channel: GuildId) -> Result<(), TransportError> {
        self.record(channel, TransportCall::Resume);
        Ok(())
    }

    async fn stop(&self, channel: GuildId) -> Result<(), TransportError> {
        self.record(channel, TransportCall::Stop);
        self.completions.lock().remove(&channel);
        Ok(())
    }

    async fn apply_settings(&self, channel: GuildId, settings: &AudioSettings) -> Result<(), TransportError> {
        self.record(channel, TransportCall::Settings(settings.volume));
        Ok(())
    }
}

pub fn channel() -> GuildId {
    GuildId::new(1)
}

/// Tiempos cortos para que los tests no esperen de más
pub fn settings() -> EngineSettings {
    EngineSettings {
        idle_timeout: Duration::from_secs(300),
        sweep_interval: Duration::from_secs(30),
        max_consecutive_failures: 3,
        load_timeout: Duration::from_secs(1),
        command_timeout: Duration::from_millis(50),
        resolve_timeout: Duration::from_secs(1),
        busy_retries: 3,
        busy_backoff: Duration::from_millis(10),
        max_queue_size: 100,
        default_volume: 0.5,
    }
}

/// Track directo cuyo locator es `https://cdn.test/{name}.mp3`
pub fn track(name: &str) -> Track {
    let url = format!("https://cdn.test/{}.mp3", name);
    Track::new(name, url.as_str(), SourceKind::DirectUrl, UserId::new(1)).with_stream_url(url.as_str())
}

pub fn sources() -> Arc<SourceManager> {
    Arc::new(
        SourceManager::new(ResolveCache::new(10, Duration::from_secs(60)), Duration::from_secs(1))
            .with_resolver(Arc::new(DirectUrlResolver::without_probe(reqwest::Client::new()))),
    )
}

pub fn session(transport: Arc<FakeTransport>) -> Arc<Session> {
    session_with(transport, settings())
}

pub fn session_with(transport: Arc<FakeTransport>, settings: EngineSettings) -> Arc<Session> {
    let (events, _) = broadcast::channel(64);
    Session::new(channel(), transport, sources(), Arc::new(settings), events)
}

pub fn session_with_events(transport: Arc<FakeTransport>) -> (Arc<Session>, broadcast::Receiver<SessionEvent>) {
    let (events, rx) = broadcast::channel(64);
    let session = Session::new(channel(), transport, sources(), Arc::new(settings()), events);
    (session, rx)
}

pub fn registry(transport: Arc<FakeTransport>) -> SessionRegistry {
    SessionRegistry::new(transport, sources(), settings())
}

pub fn registry_with_resolver(transport: Arc<FakeTransport>, resolver: Arc<dyn TrackResolver>) -> SessionRegistry {
    let sources = SourceManager::new(ResolveCache::new(10, Duration::from_secs(60)), Duration::from_secs(1))
        .with_resolver(resolver);
    SessionRegistry::new(transport, Arc::new(sources), settings())
}
