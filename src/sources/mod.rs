pub mod direct_url;
pub mod ytdlp;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serenity::model::id::UserId;
use std::{
    collections::HashMap,
    sync::{Arc, LazyLock},
    time::Duration,
};
use tracing::{debug, info, warn};

use crate::{
    audio::track::{StreamLocator, Track},
    cache::ResolveCache,
    config::Config,
    error::ResolveError,
};

pub use direct_url::DirectUrlResolver;
pub use ytdlp::YtDlpResolver;

static YOUTUBE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(https?://)?((www|m|music)\.)?(youtube\.com|youtu\.be)/").expect("regex válida")
});
static SOUNDCLOUD_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(https?://)?((www|m)\.)?soundcloud\.com/").expect("regex válida"));
static AUDIO_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(mp3|wav|ogg|opus|flac|m4a|aac|webm)$").expect("regex válida"));

/// Tipos de fuentes de música
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    YouTube,
    SoundCloud,
    DirectUrl,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::YouTube => "youtube",
            SourceKind::SoundCloud => "soundcloud",
            SourceKind::DirectUrl => "direct",
        }
    }

    /// Adivina la fuente de una consulta: URL conocida, URL/archivo directo o búsqueda en YouTube
    pub fn detect(query: &str) -> Self {
        let query = query.trim();
        if YOUTUBE_URL.is_match(query) {
            SourceKind::YouTube
        } else if SOUNDCLOUD_URL.is_match(query) {
            SourceKind::SoundCloud
        } else if query.starts_with("http://") || query.starts_with("https://") || AUDIO_FILE.is_match(query) {
            SourceKind::DirectUrl
        } else {
            SourceKind::YouTube
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "youtube" | "yt" => Ok(SourceKind::YouTube),
            "soundcloud" | "sc" => Ok(SourceKind::SoundCloud),
            "direct" | "url" => Ok(SourceKind::DirectUrl),
            other => Err(format!("Fuente desconocida: {}", other)),
        }
    }
}

/// Trait común para todas las fuentes de música
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackResolver: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Convierte una búsqueda o URL en un track con metadatos
    async fn resolve(&self, query: &str, requested_by: UserId) -> Result<Track, ResolveError>;

    /// Locator reproducible justo antes de arrancar el stream
    async fn prepare(&self, track: &Track) -> Result<StreamLocator, ResolveError> {
        track
            .stream_url()
            .map(|url| StreamLocator::Http(url.to_string()))
            .ok_or_else(|| ResolveError::NotFound(track.title().to_string()))
    }
}

/// Manager para todas las fuentes de música
pub struct SourceManager {
    resolvers: HashMap<SourceKind, Arc<dyn TrackResolver>>,
    cache: ResolveCache,
    resolve_timeout: Duration,
}

impl SourceManager {
    pub fn new(cache: ResolveCache, resolve_timeout: Duration) -> Self {
        Self {
            resolvers: HashMap::new(),
            cache,
            resolve_timeout,
        }
    }

    /// YouTube y SoundCloud vía yt-dlp, más URLs directas
    pub fn from_config(config: &Config, http: reqwest::Client) -> Self {
        let cache = ResolveCache::new(config.cache_size, config.cache_ttl);
        Self::new(cache, config.engine.resolve_timeout)
            .with_resolver(Arc::new(YtDlpResolver::youtube(&config.ytdlp_path, config.ytdlp_cookies.clone())))
            .with_resolver(Arc::new(YtDlpResolver::soundcloud(&config.ytdlp_path, config.ytdlp_cookies.clone())))
            .with_resolver(Arc::new(DirectUrlResolver::new(http)))
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn TrackResolver>) -> Self {
        let kind = resolver.kind();
        if self.resolvers.insert(kind, resolver).is_some() {
            warn!("⚠️ Resolver de {} reemplazado", kind);
        }
        self
    }

    pub fn cache(&self) -> &ResolveCache {
        &self.cache
    }

    fn resolver(&self, kind: SourceKind) -> Result<&Arc<dyn TrackResolver>, ResolveError> {
        self.resolvers
            .get(&kind)
            .ok_or_else(|| ResolveError::SourceUnavailable(format!("{} no está configurada", kind)))
    }

    /// Resuelve una consulta. `source` fuerza la fuente; si no, se detecta.
    pub async fn resolve(
        &self,
        query: &str,
        source: Option<SourceKind>,
        requested_by: UserId,
    ) -> Result<Track, ResolveError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ResolveError::NotFound("consulta vacía".to_string()));
        }

        let kind = source.unwrap_or_else(|| SourceKind::detect(query));
        let key = format!("{}:{}", kind, query.to_lowercase());

        if let Some(cached) = self.cache.get(&key) {
            debug!("📦 Cache hit: {}", key);
            return Ok(cached.requeued_for(requested_by));
        }

        let resolver = self.resolver(kind)?;
        info!("🔍 Resolviendo en {}: {}", kind, query);

        let track = tokio::time::timeout(self.resolve_timeout, resolver.resolve(query, requested_by))
            .await
            .map_err(|_| {
                ResolveError::SourceUnavailable(format!(
                    "{} no respondió en {}",
                    kind,
                    humantime::format_duration(self.resolve_timeout)
                ))
            })??;

        self.cache.insert(key, track.clone());
        Ok(track)
    }

    pub async fn prepare(&self, track: &Track) -> Result<StreamLocator, ResolveError> {
        self.resolver(track.source())?.prepare(track).await
    }
}
