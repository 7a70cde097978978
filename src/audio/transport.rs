//! Contract between the session engine and whatever actually streams audio
//! into a voice channel.
//!
//! The engine never assumes more than one active stream per channel: a new
//! `start` for a channel replaces whatever the transport had there.

use async_trait::async_trait;
use serenity::model::id::GuildId;
use std::{sync::Weak, time::Duration};
use tracing::debug;

use crate::{
    audio::{equalizer::AudioSettings, session::Session, track::StreamLocator},
    error::TransportError,
};

/// Cómo terminó un stream que arrancó bien
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    Finished,
    Dropped(String),
}

/// Aviso de fin de stream, entregado como mucho una vez.
///
/// Delivery consumes the handle, so a transport cannot report the same stream
/// twice. The generation lets the session ignore streams it already replaced.
#[derive(Debug)]
pub struct CompletionHandle {
    session: Weak<Session>,
    generation: u64,
}

impl CompletionHandle {
    pub(crate) fn new(session: Weak<Session>, generation: u64) -> Self {
        Self { session, generation }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Entrega el aviso en una tarea aparte (para handlers que no pueden esperar)
    pub fn notify(self, end: StreamEnd) {
        tokio::spawn(self.deliver(end));
    }

    pub async fn deliver(self, end: StreamEnd) {
        match self.session.upgrade() {
            Some(session) => session.on_stream_end(self.generation, end).await,
            None => debug!("Aviso de fin para una sesión ya descartada (gen {})", self.generation),
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Arranca el stream y devuelve cuando ya está sonando (o falló)
    async fn start(
        &self,
        channel: GuildId,
        locator: &StreamLocator,
        from_offset: Duration,
        completion: CompletionHandle,
    ) -> Result<(), TransportError>;

    async fn suspend(&self, channel: GuildId) -> Result<(), TransportError>;

    async fn resume(&self, channel: GuildId) -> Result<(), TransportError>;

    async fn stop(&self, channel: GuildId) -> Result<(), TransportError>;

    async fn apply_settings(&self, _channel: GuildId, _settings: &AudioSettings) -> Result<(), TransportError> {
        Ok(())
    }
}
