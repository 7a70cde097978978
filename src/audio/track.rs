use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serenity::model::id::UserId;
use std::{path::PathBuf, time::Duration};
use uuid::Uuid;

use crate::sources::SourceKind;

/// A resolved, playable track. Immutable once built: the `with_*` builders are
/// used by resolvers while constructing it, everything else only reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    id: Uuid,
    title: String,
    artist: Option<String>,
    duration: Option<Duration>,
    thumbnail: Option<String>,
    url: String,
    stream_url: Option<String>,
    source: SourceKind,
    requested_by: UserId,
    added_at: DateTime<Utc>,
}

impl Track {
    pub fn new(title: impl Into<String>, url: impl Into<String>, source: SourceKind, requested_by: UserId) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            artist: None,
            duration: None,
            thumbnail: None,
            url: url.into(),
            stream_url: None,
            source,
            requested_by,
            added_at: Utc::now(),
        }
    }

    // Getters
    pub fn id(&self) -> Uuid {
        self.id
    }
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn artist(&self) -> Option<&str> {
        self.artist.as_deref()
    }
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }
    pub fn thumbnail(&self) -> Option<&str> {
        self.thumbnail.as_deref()
    }
    pub fn url(&self) -> &str {
        &self.url
    }
    pub fn stream_url(&self) -> Option<&str> {
        self.stream_url.as_deref()
    }
    pub fn source(&self) -> SourceKind {
        self.source
    }
    pub fn requested_by(&self) -> UserId {
        self.requested_by
    }
    pub fn added_at(&self) -> DateTime<Utc> {
        self.added_at
    }

    // Builders
    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        self.thumbnail = Some(thumbnail.into());
        self
    }

    pub fn with_stream_url(mut self, stream_url: impl Into<String>) -> Self {
        self.stream_url = Some(stream_url.into());
        self
    }

    /// Copia para otro solicitante (usado al servir desde caché).
    ///
    /// Gets a new id but keeps `added_at`, which resolvers use to tell whether
    /// the cached stream URL is still fresh.
    pub fn requeued_for(&self, requested_by: UserId) -> Self {
        Self {
            id: Uuid::new_v4(),
            requested_by,
            ..self.clone()
        }
    }
}

/// Lo que el transporte necesita para arrancar un stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamLocator {
    Http(String),
    File(PathBuf),
}

impl std::fmt::Display for StreamLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamLocator::Http(url) => write!(f, "{}", url),
            StreamLocator::File(path) => write!(f, "{}", path.display()),
        }
    }
}
