//! # Cache Module
//!
//! Resolve cache for Open Music.
//!
//! Resolving a query means spawning yt-dlp or probing a remote URL, which takes
//! seconds. Results are cached per `(source, query)` so repeated requests for
//! the same song are served immediately.
//!
//! ## Configuration
//!
//! ```env
//! CACHE_SIZE=100              # Maximum number of resolved tracks kept
//! CACHE_TTL=3600              # Time-to-live in seconds (1 hour)
//! ```

pub mod lru_cache;

use lru_cache::LRUCache;
use tracing::info;

use crate::audio::track::Track;

/// Tracks resueltos, por clave `fuente:consulta`
pub type ResolveCache = LRUCache<String, Track>;

impl ResolveCache {
    /// Limpieza periódica de entradas vencidas
    pub fn cleanup_old_entries(&self) -> usize {
        let removed = self.cleanup_expired();
        if removed > 0 {
            info!("🧹 Cache cleanup: removed {} expired entries", removed);
        }
        removed
    }
}
