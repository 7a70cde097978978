use async_trait::async_trait;
use reqwest::StatusCode;
use serenity::model::id::UserId;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;

use super::{SourceKind, TrackResolver};
use crate::{
    audio::track::{StreamLocator, Track},
    error::ResolveError,
};

/// Cliente de URL directa: streams HTTP(S) y archivos locales
pub struct DirectUrlResolver {
    client: reqwest::Client,
    probe: bool,
}

impl DirectUrlResolver {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client, probe: true }
    }

    /// Sin verificar la URL con HEAD (radios que no lo soportan, tests)
    pub fn without_probe(client: reqwest::Client) -> Self {
        Self { client, probe: false }
    }

    async fn probe(&self, url: &Url) -> Result<(), ResolveError> {
        let response = self.client.head(url.as_str()).send().await.map_err(|e| {
            debug!("HEAD falló para {}: {}", url, e);
            ResolveError::SourceUnavailable(format!("{}: {}", host_of(url), e))
        })?;

        match response.status() {
            status if status.is_success() || status.is_redirection() => Ok(()),
            // Muchos servidores no implementan HEAD; se intentará al reproducir
            StatusCode::METHOD_NOT_ALLOWED => Ok(()),
            StatusCode::NOT_FOUND | StatusCode::GONE => Err(ResolveError::NotFound(url.to_string())),
            StatusCode::TOO_MANY_REQUESTS => Err(ResolveError::RateLimited(host_of(url))),
            status => Err(ResolveError::SourceUnavailable(format!("{} respondió {}", host_of(url), status))),
        }
    }
}

fn host_of(url: &Url) -> String {
    url.host_str().unwrap_or("desconocido").to_string()
}

/// Último segmento de la ruta, decodificado y sin extensión
fn title_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let decoded = urlencoding::decode(segment)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| segment.to_string());
            strip_extension(&decoded)
        })
        .unwrap_or_else(|| host_of(url))
}

fn strip_extension(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string())
}

fn http_url(query: &str) -> Option<Url> {
    Url::parse(query)
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https"))
}

#[async_trait]
impl TrackResolver for DirectUrlResolver {
    fn kind(&self) -> SourceKind {
        SourceKind::DirectUrl
    }

    async fn resolve(&self, query: &str, requested_by: UserId) -> Result<Track, ResolveError> {
        if let Some(url) = http_url(query) {
            if self.probe {
                self.probe(&url).await?;
            }
            let title = title_from_url(&url);
            info!("🔗 URL directa: {}", title);
            return Ok(Track::new(title, url.as_str(), SourceKind::DirectUrl, requested_by)
                .with_stream_url(url.as_str()));
        }

        let path = PathBuf::from(query);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {
                let title = path
                    .file_name()
                    .map(|name| strip_extension(&name.to_string_lossy()))
                    .unwrap_or_else(|| query.to_string());
                info!("📁 Archivo local: {}", title);
                Ok(Track::new(title, query, SourceKind::DirectUrl, requested_by))
            }
            _ => Err(ResolveError::NotFound(query.to_string())),
        }
    }

    async fn prepare(&self, track: &Track) -> Result<StreamLocator, ResolveError> {
        if let Some(stream_url) = track.stream_url() {
            return Ok(StreamLocator::Http(stream_url.to_string()));
        }
        match http_url(track.url()) {
            Some(url) => Ok(StreamLocator::Http(url.to_string())),
            None => Ok(StreamLocator::File(PathBuf::from(track.url()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_title_from_url() {
        let url = Url::parse("https://cdn.example.com/music/Mi%20Canci%C3%B3n.mp3?token=1").unwrap();
        assert_eq!(title_from_url(&url), "Mi Canción");

        let bare = Url::parse("https://radio.example.com/").unwrap();
        assert_eq!(title_from_url(&bare), "radio.example.com");
    }

    #[tokio::test]
    async fn test_resolve_without_probe() {
        let resolver = DirectUrlResolver::without_probe(reqwest::Client::new());
        let track = resolver
            .resolve("https://cdn.example.com/a/song.ogg", UserId::new(3))
            .await
            .unwrap();

        assert_eq!(track.title(), "song");
        assert_eq!(track.source(), SourceKind::DirectUrl);
        assert_eq!(
            resolver.prepare(&track).await.unwrap(),
            StreamLocator::Http("https://cdn.example.com/a/song.ogg".to_string())
        );
    }

    #[tokio::test]
    async fn test_missing_local_file_is_not_found() {
        let resolver = DirectUrlResolver::without_probe(reqwest::Client::new());
        let err = resolver
            .resolve("/definitely/not/here.mp3", UserId::new(1))
            .await
            .unwrap_err();
        assert_eq!(err, ResolveError::NotFound("/definitely/not/here.mp3".to_string()));
    }
}
