use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serenity::model::id::UserId;
use std::{process::Stdio, time::Duration};
use tracing::{debug, info, warn};

use super::{SourceKind, TrackResolver};
use crate::{
    audio::track::{StreamLocator, Track},
    error::ResolveError,
};

/// Las URLs de stream de YouTube caducan; pasado esto se vuelven a extraer
const STREAM_URL_MAX_AGE: Duration = Duration::from_secs(30 * 60);

/// Resolver para YouTube y SoundCloud usando yt-dlp
pub struct YtDlpResolver {
    kind: SourceKind,
    binary: String,
    cookies: Option<String>,
    search_prefix: &'static str,
}

/// Subconjunto del JSON de `yt-dlp --dump-single-json`
#[derive(Debug, Deserialize)]
struct VideoInfo {
    title: Option<String>,
    uploader: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    webpage_url: Option<String>,
    url: Option<String>,
    #[serde(default)]
    entries: Option<Vec<VideoInfo>>,
}

impl YtDlpResolver {
    pub fn youtube(binary: &str, cookies: Option<String>) -> Self {
        Self {
            kind: SourceKind::YouTube,
            binary: binary.to_string(),
            cookies,
            search_prefix: "ytsearch1:",
        }
    }

    pub fn soundcloud(binary: &str, cookies: Option<String>) -> Self {
        Self {
            kind: SourceKind::SoundCloud,
            binary: binary.to_string(),
            cookies,
            search_prefix: "scsearch1:",
        }
    }

    fn target(&self, query: &str) -> String {
        if query.starts_with("http://") || query.starts_with("https://") {
            query.to_string()
        } else {
            format!("{}{}", self.search_prefix, query)
        }
    }

    async fn run(&self, args: &[&str]) -> Result<Vec<u8>, ResolveError> {
        let mut cmd = tokio::process::Command::new(&self.binary);
        cmd.args(["--no-playlist", "--no-warnings", "--socket-timeout", "15"]);
        if let Some(cookies) = &self.cookies {
            cmd.args(["--cookies", cookies]);
        }
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = cmd.output().await.map_err(|e| {
            warn!("❌ No se pudo ejecutar {}: {}", self.binary, e);
            ResolveError::SourceUnavailable(format!("yt-dlp no disponible: {}", e))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("yt-dlp stderr: {}", stderr.trim());
            return Err(classify_failure(&stderr));
        }

        Ok(output.stdout)
    }
}

/// Traduce el stderr de yt-dlp a un error tipado
fn classify_failure(stderr: &str) -> ResolveError {
    let lower = stderr.to_lowercase();
    let summary = stderr
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("yt-dlp falló")
        .trim()
        .to_string();

    if lower.contains("429") || lower.contains("too many requests") {
        ResolveError::RateLimited(summary)
    } else if lower.contains("not available")
        || lower.contains("video unavailable")
        || lower.contains("no video results")
        || lower.contains("404")
        || lower.contains("does not exist")
    {
        ResolveError::NotFound(summary)
    } else {
        ResolveError::SourceUnavailable(summary)
    }
}

fn parse_info(
    json: &[u8],
    kind: SourceKind,
    target: &str,
    requested_by: UserId,
) -> Result<Track, ResolveError> {
    let info: VideoInfo = serde_json::from_slice(json)
        .map_err(|e| ResolveError::SourceUnavailable(format!("respuesta de yt-dlp inválida: {}", e)))?;

    // Las búsquedas devuelven una "playlist" con los resultados
    let info = match info.entries {
        Some(entries) => entries
            .into_iter()
            .next()
            .ok_or_else(|| ResolveError::NotFound(target.to_string()))?,
        None => info,
    };

    let title = info.title.unwrap_or_else(|| "Unknown".to_string());
    let url = info.webpage_url.unwrap_or_else(|| target.to_string());
    let mut track = Track::new(title, url, kind, requested_by);

    if let Some(uploader) = info.uploader {
        track = track.with_artist(uploader);
    }
    if let Some(duration) = info.duration.filter(|d| d.is_finite() && *d > 0.0) {
        track = track.with_duration(Duration::from_secs_f64(duration));
    }
    if let Some(thumbnail) = info.thumbnail {
        track = track.with_thumbnail(thumbnail);
    }
    if let Some(stream_url) = info.url {
        track = track.with_stream_url(stream_url);
    }

    Ok(track)
}

#[async_trait]
impl TrackResolver for YtDlpResolver {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn resolve(&self, query: &str, requested_by: UserId) -> Result<Track, ResolveError> {
        let target = self.target(query);
        let stdout = self
            .run(&["--dump-single-json", "-f", "bestaudio/best", &target])
            .await?;
        let track = parse_info(&stdout, self.kind, &target, requested_by)?;
        info!("✅ Encontrado en {}: {}", self.kind, track.title());
        Ok(track)
    }

    async fn prepare(&self, track: &Track) -> Result<StreamLocator, ResolveError> {
        let fresh = (Utc::now() - track.added_at())
            .to_std()
            .map(|age| age < STREAM_URL_MAX_AGE)
            .unwrap_or(false);
        if let (true, Some(url)) = (fresh, track.stream_url()) {
            return Ok(StreamLocator::Http(url.to_string()));
        }

        debug!("🔗 Extrayendo URL de stream para: {}", track.title());
        let stdout = self.run(&["-g", "-f", "bestaudio/best", track.url()]).await?;
        String::from_utf8_lossy(&stdout)
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(|url| StreamLocator::Http(url.to_string()))
            .ok_or_else(|| ResolveError::NotFound(track.title().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_search_result() {
        let json = br#"{
            "_type": "playlist",
            "entries": [{
                "title": "Lofi Song",
                "uploader": "Chill Channel",
                "duration": 185.0,
                "thumbnail": "https://i.ytimg.com/vi/abc/hq.jpg",
                "webpage_url": "https://www.youtube.com/watch?v=abc",
                "url": "https://rr1.googlevideo.com/abc"
            }]
        }"#;

        let track = parse_info(json, SourceKind::YouTube, "ytsearch1:lofi", UserId::new(5)).unwrap();
        assert_eq!(track.title(), "Lofi Song");
        assert_eq!(track.artist(), Some("Chill Channel"));
        assert_eq!(track.duration(), Some(Duration::from_secs(185)));
        assert_eq!(track.url(), "https://www.youtube.com/watch?v=abc");
        assert_eq!(track.stream_url(), Some("https://rr1.googlevideo.com/abc"));
        assert_eq!(track.requested_by(), UserId::new(5));
    }

    #[test]
    fn test_empty_search_is_not_found() {
        let json = br#"{"_type": "playlist", "entries": []}"#;
        let err = parse_info(json, SourceKind::SoundCloud, "scsearch1:zzz", UserId::new(1)).unwrap_err();
        assert_eq!(err, ResolveError::NotFound("scsearch1:zzz".to_string()));
    }

    #[test]
    fn test_classify_failures() {
        assert!(matches!(
            classify_failure("ERROR: HTTP Error 429: Too Many Requests"),
            ResolveError::RateLimited(_)
        ));
        assert!(matches!(
            classify_failure("ERROR: [youtube] abc: Video unavailable"),
            ResolveError::NotFound(_)
        ));
        assert!(matches!(
            classify_failure("ERROR: unable to download webpage"),
            ResolveError::SourceUnavailable(_)
        ));
    }

    #[test]
    fn test_search_prefix() {
        let resolver = YtDlpResolver::soundcloud("yt-dlp", None);
        assert_eq!(resolver.target("some song"), "scsearch1:some song");
        assert_eq!(resolver.target("https://soundcloud.com/a/b"), "https://soundcloud.com/a/b");
    }
}
