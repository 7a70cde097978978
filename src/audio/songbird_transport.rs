use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::model::id::GuildId;
use songbird::{
    input::{File, HttpRequest, Input},
    tracks::TrackHandle,
    Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{sync::Arc, time::Duration};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::{
    audio::{
        equalizer::AudioSettings,
        track::StreamLocator,
        transport::{CompletionHandle, StreamEnd, Transport},
    },
    error::TransportError,
};

/// Transporte real: reproduce en la llamada de voz que songbird tiene abierta
/// para el guild. Unirse y salir del canal es cosa de la capa de Discord.
pub struct SongbirdTransport {
    songbird: Arc<Songbird>,
    http: reqwest::Client,
    active: DashMap<GuildId, ActiveStream>,
}

struct ActiveStream {
    handle: TrackHandle,
    slot: Arc<StreamSlot>,
}

/// Lo que los eventos de songbird comparten con `start`
struct StreamSlot {
    ready: Mutex<Option<oneshot::Sender<Result<(), String>>>>,
    completion: Mutex<Option<CompletionHandle>>,
}

impl StreamSlot {
    fn signal_ready(&self, result: Result<(), String>) -> bool {
        match self.ready.lock().take() {
            Some(tx) => {
                let _ = tx.send(result);
                true
            }
            None => false,
        }
    }

    fn complete(&self, end: StreamEnd) {
        if let Some(completion) = self.completion.lock().take() {
            completion.notify(end);
        }
    }
}

impl SongbirdTransport {
    pub fn new(songbird: Arc<Songbird>, http: reqwest::Client) -> Self {
        Self {
            songbird,
            http,
            active: DashMap::new(),
        }
    }

    fn input_for(&self, locator: &StreamLocator) -> Input {
        match locator {
            StreamLocator::Http(url) => HttpRequest::new(self.http.clone(), url.clone()).into(),
            StreamLocator::File(path) => File::new(path.clone()).into(),
        }
    }

    /// Quita el stream activo sin avisar a nadie de su fin
    fn detach(&self, channel: GuildId) -> Option<TrackHandle> {
        self.active.remove(&channel).map(|(_, stream)| {
            stream.slot.completion.lock().take();
            stream.slot.ready.lock().take();
            stream.handle
        })
    }
}

#[async_trait]
impl Transport for SongbirdTransport {
    async fn start(
        &self,
        channel: GuildId,
        locator: &StreamLocator,
        from_offset: Duration,
        completion: CompletionHandle,
    ) -> Result<(), TransportError> {
        let call = self
            .songbird
            .get(channel)
            .ok_or_else(|| TransportError::StartFailed("el bot no está en un canal de voz".to_string()))?;

        if let Some(previous) = self.detach(channel) {
            let _ = previous.stop();
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        let slot = Arc::new(StreamSlot {
            ready: Mutex::new(Some(ready_tx)),
            completion: Mutex::new(Some(completion)),
        });

        let handle = {
            let mut call = call.lock().await;
            call.play_input(self.input_for(locator))
        };

        for kind in [TrackEvent::Playable, TrackEvent::End, TrackEvent::Error] {
            handle
                .add_event(
                    Event::Track(kind),
                    StreamEventHandler {
                        kind,
                        slot: slot.clone(),
                    },
                )
                .map_err(|e| TransportError::StartFailed(format!("Error al agregar event handler: {}", e)))?;
        }

        if !from_offset.is_zero() {
            let _ = handle.seek(from_offset);
        }

        self.active.insert(
            channel,
            ActiveStream {
                handle,
                slot,
            },
        );

        match ready_rx.await {
            Ok(Ok(())) => {
                debug!(channel = %channel, "🔊 Stream listo: {}", locator);
                Ok(())
            }
            Ok(Err(reason)) => {
                self.detach(channel);
                Err(TransportError::StartFailed(reason))
            }
            Err(_) => Err(TransportError::StartFailed("stream descartado antes de arrancar".to_string())),
        }
    }

    async fn suspend(&self, channel: GuildId) -> Result<(), TransportError> {
        if let Some(stream) = self.active.get(&channel) {
            stream
                .handle
                .pause()
                .map_err(|e| TransportError::StreamDropped(e.to_string()))?;
        }
        Ok(())
    }

    async fn resume(&self, channel: GuildId) -> Result<(), TransportError> {
        if let Some(stream) = self.active.get(&channel) {
            stream
                .handle
                .play()
                .map_err(|e| TransportError::StreamDropped(e.to_string()))?;
        }
        Ok(())
    }

    async fn stop(&self, channel: GuildId) -> Result<(), TransportError> {
        if let Some(handle) = self.detach(channel) {
            // El track puede haber terminado ya por su cuenta
            if let Err(e) = handle.stop() {
                debug!(channel = %channel, "Stop sobre track ya terminado: {}", e);
            }
        }
        Ok(())
    }

    async fn apply_settings(&self, channel: GuildId, settings: &AudioSettings) -> Result<(), TransportError> {
        if let Some(stream) = self.active.get(&channel) {
            stream
                .handle
                .set_volume(settings.volume)
                .map_err(|e| TransportError::StreamDropped(e.to_string()))?;
            debug!(
                channel = %channel,
                "🎛️ Volumen {:.2}, ecualizador {}",
                settings.volume,
                settings.equalizer.as_str()
            );
        }
        Ok(())
    }
}

struct StreamEventHandler {
    kind: TrackEvent,
    slot: Arc<StreamSlot>,
}

#[async_trait]
impl VoiceEventHandler for StreamEventHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        match self.kind {
            TrackEvent::Playable => {
                self.slot.signal_ready(Ok(()));
            }
            TrackEvent::End => {
                // Un End antes de estar listo también es un arranque fallido
                if !self.slot.signal_ready(Err("el stream terminó sin sonar".to_string())) {
                    self.slot.complete(StreamEnd::Finished);
                }
            }
            TrackEvent::Error => {
                let reason = match ctx {
                    EventContext::Track(tracks) => tracks
                        .first()
                        .map(|(state, _)| format!("{:?}", state.playing))
                        .unwrap_or_else(|| "error desconocido".to_string()),
                    _ => "error desconocido".to_string(),
                };
                warn!("❌ Error en el stream de audio: {}", reason);
                if !self.slot.signal_ready(Err(reason.clone())) {
                    self.slot.complete(StreamEnd::Dropped(reason));
                }
            }
            _ => {}
        }
        None
    }
}
