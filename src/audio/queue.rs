use rand::{seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};
use std::{collections::VecDeque, time::Duration};
use tracing::{debug, info};

use crate::{
    audio::{controller::PlaybackState, equalizer::EqualizerPreset, track::Track},
    error::QueueError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RepeatMode {
    #[default]
    Off,
    One,
    All,
}

impl std::str::FromStr for RepeatMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "off" | "none" => Ok(RepeatMode::Off),
            "one" | "track" => Ok(RepeatMode::One),
            "all" | "queue" => Ok(RepeatMode::All),
            other => Err(format!("Modo de repetición desconocido: {}", other)),
        }
    }
}

/// Cola de un canal: a lo sumo un track actual y los pendientes en orden.
///
/// Only the owning session mutates it, always under the session lock, so the
/// queue itself carries no synchronization.
#[derive(Debug, Default)]
pub struct TrackQueue {
    current: Option<Track>,
    pending: VecDeque<Track>,
    repeat: RepeatMode,
    shuffle: bool,
}

impl TrackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agrega al final de los pendientes y devuelve la posición (1 = siguiente).
    pub fn enqueue(&mut self, track: Track) -> usize {
        info!("➕ Agregado a la cola: {}", track.title());
        self.pending.push_back(track);
        self.pending.len()
    }

    pub fn peek_current(&self) -> Option<&Track> {
        self.current.as_ref()
    }

    /// Avanza la cola al terminar un track.
    ///
    /// - `One`: the current track is returned again, unchanged.
    /// - `All`: the current track goes to the tail *before* the head is popped,
    ///   so the rotation never ends and keeps its relative order.
    /// - `Off`: the current track is discarded.
    pub fn advance(&mut self) -> Option<Track> {
        if let Some(current) = self.current.take() {
            match self.repeat {
                RepeatMode::One => {
                    info!("🔂 Repitiendo track: {}", current.title());
                    self.current = Some(current.clone());
                    return Some(current);
                }
                RepeatMode::All => {
                    debug!("🔁 Track al final por repetición de cola: {}", current.title());
                    self.pending.push_back(current);
                }
                RepeatMode::Off => {}
            }
        }

        self.pop_next()
    }

    /// Descarta el actual sin importar el modo de repetición (track fallido).
    pub fn discard_current(&mut self) -> Option<Track> {
        if let Some(failed) = self.current.take() {
            debug!("🗑️ Descartado track fallido: {}", failed.title());
        }
        self.pop_next()
    }

    fn pop_next(&mut self) -> Option<Track> {
        self.current = self.pending.pop_front();
        match &self.current {
            Some(next) => info!("➡️ Siguiente en cola: {}", next.title()),
            None => info!("📭 Cola vacía, no hay siguiente track"),
        }
        self.current.clone()
    }

    pub fn set_shuffle(&mut self, on: bool) {
        self.set_shuffle_with(on, &mut rand::thread_rng());
    }

    /// Al activarse mezcla solo los pendientes; el actual nunca se mueve.
    pub fn set_shuffle_with<R: Rng + ?Sized>(&mut self, on: bool, rng: &mut R) {
        self.shuffle = on;
        if on {
            self.pending.make_contiguous().shuffle(rng);
            info!("🔀 Modo aleatorio activado ({} pendientes mezclados)", self.pending.len());
        } else {
            info!("➡️ Modo aleatorio desactivado");
        }
    }

    pub fn set_repeat(&mut self, mode: RepeatMode) {
        self.repeat = mode;
        match mode {
            RepeatMode::Off => info!("➡️ Repetición desactivada"),
            RepeatMode::One => info!("🔂 Repetir canción activado"),
            RepeatMode::All => info!("🔁 Repetir cola activado"),
        }
    }

    pub fn repeat(&self) -> RepeatMode {
        self.repeat
    }

    pub fn is_shuffle(&self) -> bool {
        self.shuffle
    }

    /// Limpia los pendientes; el actual sigue hasta terminar o detenerse.
    pub fn clear(&mut self) -> usize {
        let cleared = self.pending.len();
        self.pending.clear();
        info!("🗑️ Cola limpiada: {} tracks removidos", cleared);
        cleared
    }

    /// Vacía todo, incluido el actual (stop / abandono).
    pub fn reset(&mut self) {
        self.current = None;
        self.pending.clear();
    }

    /// Elimina el pendiente en `position` (base 1). Nunca toca el actual.
    pub fn remove_at(&mut self, position: usize) -> Result<Track, QueueError> {
        let index = self.pending_index(position)?;
        let removed = self
            .pending
            .remove(index)
            .ok_or(QueueError::OutOfRange { position, len: self.pending.len() })?;
        debug!("❌ Track eliminado en posición {}", position);
        Ok(removed)
    }

    /// Mueve un pendiente de `from` a `to` (ambos base 1)
    pub fn move_track(&mut self, from: usize, to: usize) -> Result<(), QueueError> {
        let from_index = self.pending_index(from)?;
        let to_index = self.pending_index(to)?;

        if from_index != to_index {
            if let Some(track) = self.pending.remove(from_index) {
                self.pending.insert(to_index, track);
                debug!("📍 Track movido de posición {} a {}", from, to);
            }
        }

        Ok(())
    }

    fn pending_index(&self, position: usize) -> Result<usize, QueueError> {
        if position == 0 || position > self.pending.len() {
            return Err(QueueError::OutOfRange { position, len: self.pending.len() });
        }
        Ok(position - 1)
    }

    pub fn pending(&self) -> impl Iterator<Item = &Track> {
        self.pending.iter()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Sin actual y sin pendientes
    pub fn is_empty(&self) -> bool {
        self.current.is_none() && self.pending.is_empty()
    }

    fn total_duration(&self) -> Duration {
        self.current
            .iter()
            .chain(self.pending.iter())
            .filter_map(Track::duration)
            .sum()
    }

    pub fn info(&self, state: PlaybackState, volume: f32, equalizer: EqualizerPreset) -> QueueInfo {
        QueueInfo {
            state,
            current: self.current.clone(),
            items: self.pending.iter().cloned().collect(),
            total_items: self.pending.len(),
            repeat: self.repeat,
            shuffle: self.shuffle,
            total_duration: self.total_duration(),
            volume,
            equalizer,
        }
    }
}

/// Copia de solo lectura de la cola para mostrar al usuario
#[derive(Debug, Clone, Serialize)]
pub struct QueueInfo {
    pub state: PlaybackState,
    pub current: Option<Track>,
    pub items: Vec<Track>,
    pub total_items: usize,
    pub repeat: RepeatMode,
    pub shuffle: bool,
    pub total_duration: Duration,
    pub volume: f32,
    pub equalizer: EqualizerPreset,
}

impl QueueInfo {
    pub fn empty(volume: f32) -> Self {
        Self {
            state: PlaybackState::Idle,
            current: None,
            items: Vec::new(),
            total_items: 0,
            repeat: RepeatMode::Off,
            shuffle: false,
            total_duration: Duration::ZERO,
            volume,
            equalizer: EqualizerPreset::Flat,
        }
    }

    /// Obtiene una página específica de la cola
    pub fn get_page(&self, page: usize, items_per_page: usize) -> QueuePage {
        let items_per_page = items_per_page.max(1);
        let safe_page = page.max(1);
        let start = (safe_page - 1) * items_per_page;
        let end = (start + items_per_page).min(self.items.len());
        let total_pages = if self.total_items == 0 {
            1
        } else {
            self.total_items.div_ceil(items_per_page)
        };

        QueuePage {
            items: if start < self.items.len() {
                self.items[start..end].to_vec()
            } else {
                Vec::new()
            },
            first_position: start + 1,
            current_page: safe_page,
            total_pages,
            total_items: self.total_items,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueuePage {
    pub items: Vec<Track>,
    pub first_position: usize,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_items: usize,
}
