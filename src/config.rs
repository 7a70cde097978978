use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{str::FromStr, time::Duration};

/// Límites y tiempos del motor de sesiones
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineSettings {
    /// Tiempo sin actividad tras el cual una sesión vacía se libera
    pub idle_timeout: Duration,
    pub sweep_interval: Duration,
    /// Fallos seguidos antes de abandonar la reproducción
    pub max_consecutive_failures: u32,
    /// Límite para preparar y arrancar un stream
    pub load_timeout: Duration,
    /// Espera máxima de un comando por el lock de su sesión
    pub command_timeout: Duration,
    pub resolve_timeout: Duration,
    pub busy_retries: u32,
    pub busy_backoff: Duration,
    pub max_queue_size: usize,
    pub default_volume: f32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(30),
            max_consecutive_failures: 3,
            load_timeout: Duration::from_secs(15),
            command_timeout: Duration::from_secs(5),
            resolve_timeout: Duration::from_secs(20),
            busy_retries: 3,
            busy_backoff: Duration::from_millis(100),
            max_queue_size: 1000,
            default_volume: 0.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Fuentes
    pub ytdlp_path: String,
    pub ytdlp_cookies: Option<String>,

    // Cache de resoluciones
    pub cache_size: usize,
    pub cache_ttl: Duration,

    // Motor
    pub engine: EngineSettings,

    // Features
    pub enable_equalizer: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Construye la configuración desde cualquier fuente clave/valor
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let engine_defaults = defaults.engine.clone();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Self {
            // Discord
            discord_token: get("DISCORD_TOKEN").context("DISCORD_TOKEN es obligatorio")?,
            application_id: get("APPLICATION_ID")
                .context("APPLICATION_ID es obligatorio")?
                .parse()
                .context("APPLICATION_ID inválido")?,
            guild_id: get("GUILD_ID").and_then(|s| s.parse().ok()),

            // Fuentes
            ytdlp_path: get("YTDLP_PATH").unwrap_or(defaults.ytdlp_path),
            ytdlp_cookies: get("YTDLP_COOKIES"),

            // Cache
            cache_size: parse_or(get("CACHE_SIZE"), "CACHE_SIZE", defaults.cache_size)?,
            cache_ttl: duration_or(get("CACHE_TTL"), "CACHE_TTL", defaults.cache_ttl)?,

            engine: EngineSettings {
                idle_timeout: duration_or(get("IDLE_TIMEOUT"), "IDLE_TIMEOUT", engine_defaults.idle_timeout)?,
                sweep_interval: duration_or(get("SWEEP_INTERVAL"), "SWEEP_INTERVAL", engine_defaults.sweep_interval)?,
                max_consecutive_failures: parse_or(
                    get("MAX_CONSECUTIVE_FAILURES"),
                    "MAX_CONSECUTIVE_FAILURES",
                    engine_defaults.max_consecutive_failures,
                )?,
                load_timeout: duration_or(get("LOAD_TIMEOUT"), "LOAD_TIMEOUT", engine_defaults.load_timeout)?,
                command_timeout: duration_or(get("COMMAND_TIMEOUT"), "COMMAND_TIMEOUT", engine_defaults.command_timeout)?,
                resolve_timeout: duration_or(get("RESOLVE_TIMEOUT"), "RESOLVE_TIMEOUT", engine_defaults.resolve_timeout)?,
                busy_retries: parse_or(get("BUSY_RETRIES"), "BUSY_RETRIES", engine_defaults.busy_retries)?,
                busy_backoff: duration_or(get("BUSY_BACKOFF"), "BUSY_BACKOFF", engine_defaults.busy_backoff)?,
                max_queue_size: parse_or(get("MAX_QUEUE_SIZE"), "MAX_QUEUE_SIZE", engine_defaults.max_queue_size)?,
                default_volume: parse_or(get("DEFAULT_VOLUME"), "DEFAULT_VOLUME", engine_defaults.default_volume)?,
            },

            // Features
            enable_equalizer: parse_or(get("ENABLE_EQUALIZER"), "ENABLE_EQUALIZER", defaults.enable_equalizer)?,
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// - Volume must be between 0.0 and 2.0
    /// - Limits and cache size must be greater than zero
    /// - The command timeout must be shorter than the idle timeout
    pub fn validate(&self) -> Result<()> {
        let engine = &self.engine;

        if !(0.0..=2.0).contains(&engine.default_volume) {
            anyhow::bail!("Default volume must be between 0.0 and 2.0, got: {}", engine.default_volume);
        }

        if self.cache_size == 0 {
            anyhow::bail!("Cache size must be greater than 0");
        }

        if engine.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if engine.max_consecutive_failures == 0 {
            anyhow::bail!("Max consecutive failures must be greater than 0");
        }

        for (name, value) in [
            ("IDLE_TIMEOUT", engine.idle_timeout),
            ("SWEEP_INTERVAL", engine.sweep_interval),
            ("LOAD_TIMEOUT", engine.load_timeout),
            ("COMMAND_TIMEOUT", engine.command_timeout),
            ("RESOLVE_TIMEOUT", engine.resolve_timeout),
        ] {
            if value.is_zero() {
                anyhow::bail!("{} must be greater than 0", name);
            }
        }

        if engine.command_timeout >= engine.idle_timeout {
            anyhow::bail!(
                "COMMAND_TIMEOUT ({}) must be shorter than IDLE_TIMEOUT ({})",
                humantime::format_duration(engine.command_timeout),
                humantime::format_duration(engine.idle_timeout)
            );
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the token.
    pub fn summary(&self) -> String {
        let engine = &self.engine;
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Sessions: idle {}, sweep {}, {} queue max, {}% vol\n  \
            Playback: load {}, {} failures max\n  \
            Commands: timeout {}, {} retries\n  \
            Cache: {} entries, ttl {}\n  \
            Features: EQ={}",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            humantime::format_duration(engine.idle_timeout),
            humantime::format_duration(engine.sweep_interval),
            engine.max_queue_size,
            (engine.default_volume * 100.0) as u32,
            humantime::format_duration(engine.load_timeout),
            engine.max_consecutive_failures,
            humantime::format_duration(engine.command_timeout),
            engine.busy_retries,
            self.cache_size,
            humantime::format_duration(self.cache_ttl),
            self.enable_equalizer
        )
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(raw) => raw.trim().parse().with_context(|| format!("{} inválido: {}", key, raw)),
        None => Ok(default),
    }
}

/// Acepta segundos ("300") o formato humano ("5m", "1h 30m")
fn duration_or(value: Option<String>, key: &str, default: Duration) -> Result<Duration> {
    let Some(raw) = value else {
        return Ok(default);
    };
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(raw).with_context(|| format!("{} inválido: {}", key, raw))
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            ytdlp_path: "yt-dlp".to_string(),
            ytdlp_cookies: None,

            cache_size: 100,
            cache_ttl: Duration::from_secs(3600),

            engine: EngineSettings::default(),

            enable_equalizer: true,
        }
    }
}
