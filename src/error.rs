//! # Error Types
//!
//! Typed errors for the session engine. Every command against a session ends in
//! one of three ways: success with the new state, success carrying recoverable
//! notices (tracks that were skipped automatically), or one of the errors below.
//!
//! - [`ResolveError`]: the track source could not produce a playable track
//! - [`TransportError`]: the voice transport could not start or keep a stream
//! - [`StateError`]: the command is not legal right now for this session
//! - [`QueueError`]: the queue operation referenced something that doesn't exist
//!
//! [`EngineError`] wraps them all for the dispatcher boundary.

use thiserror::Error;

use crate::audio::controller::PlaybackState;

/// Fallos al resolver una búsqueda o URL a un track reproducible
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("No se encontraron resultados para: {0}")]
    NotFound(String),

    #[error("Fuente no disponible: {0}")]
    SourceUnavailable(String),

    #[error("Límite de peticiones alcanzado en la fuente: {0}")]
    RateLimited(String),
}

/// Fallos del transporte de audio
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("No se pudo iniciar el stream: {0}")]
    StartFailed(String),

    #[error("El stream se cortó: {0}")]
    StreamDropped(String),
}

/// Operaciones ilegales para el estado actual de la sesión
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("No se puede {command} en estado {from}")]
    InvalidTransition {
        from: PlaybackState,
        command: &'static str,
    },

    #[error("La sesión está ocupada, intenta de nuevo")]
    SessionBusy,

    /// The session was reclaimed or removed while the command waited for it.
    #[error("La sesión fue cerrada")]
    SessionClosed,
}

/// Errores de operaciones sobre la cola
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Posición {position} fuera de rango (la cola tiene {len} canciones)")]
    OutOfRange { position: usize, len: usize },

    #[error("La cola está vacía")]
    Empty,

    #[error("La cola está llena (máximo {max} canciones)")]
    Full { max: usize },

    #[error("No se puede saltar al segundo {position}: el track dura {length} segundos")]
    SeekOutOfRange { position: u64, length: u64 },
}

/// Error unificado que ve el dispatcher
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("Reproducción abandonada tras {failures} fallos consecutivos: {last}")]
    PlaybackAbandoned { failures: u32, last: String },
}

impl EngineError {
    /// Busy and closed sessions are worth another attempt; everything else is final.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::State(StateError::SessionBusy) | EngineError::State(StateError::SessionClosed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_retryable()
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_is_retryable() {
        assert!(EngineError::from(StateError::SessionBusy).is_retryable());
        assert!(EngineError::from(StateError::SessionClosed).is_retryable());
        assert!(EngineError::from(QueueError::Empty).is_terminal());
        assert!(EngineError::from(ResolveError::NotFound("x".into())).is_terminal());
    }

    #[test]
    fn test_invalid_transition_message_names_state() {
        let err = StateError::InvalidTransition {
            from: PlaybackState::Idle,
            command: "resume",
        };
        assert_eq!(err.to_string(), "No se puede resume en estado Idle");
    }
}
