//! # Bot Module
//!
//! Discord front end for the session engine.
//!
//! This module contains the serenity side of the bot:
//! - Command registration and handling
//! - Voice connection management
//! - Event handling (ready, interactions, voice state updates)
//! - Background tasks (session reaper, engine event listener, cache cleanup)
//!
//! ## Architecture
//!
//! [`OpenMusicBot`] implements Serenity's [`EventHandler`] trait. Every command
//! goes through the [`CommandDispatcher`], which owns nothing Discord specific;
//! this module only joins and leaves voice channels and renders the results.
//!
//! When the engine closes a session (stop, idle reclamation, shutdown) the
//! listener started in `ready` leaves the voice channel of that guild.

use anyhow::Result;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Interaction, Ready, UserId, VoiceState},
    async_trait,
};
use songbird::Songbird;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod handlers;

use crate::{
    audio::{registry::SessionRegistry, SessionEvent},
    config::Config,
    dispatcher::CommandDispatcher,
};

/// Discord event handler for Open Music Bot.
///
/// ## Fields
///
/// - `config`: Bot configuration (tokens, limits, features)
/// - `dispatcher`: Routes commands to the per-guild sessions
/// - `songbird`: Voice connection manager, shared with the audio transport
/// - `shutdown`: Cancels the background tasks started in `ready`
pub struct OpenMusicBot {
    /// Bot configuration loaded from environment variables
    config: Arc<Config>,
    dispatcher: CommandDispatcher,
    songbird: Arc<Songbird>,
    shutdown: CancellationToken,
    /// `ready` se dispara en cada reconexión; las tareas se lanzan una vez
    tasks_started: AtomicBool,
}

impl OpenMusicBot {
    /// Creates a new instance of the Open Music Bot.
    ///
    /// The same `songbird` manager must be registered with the serenity client
    /// and handed to the audio transport behind `dispatcher`.
    pub fn new(
        config: Arc<Config>,
        dispatcher: CommandDispatcher,
        songbird: Arc<Songbird>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            dispatcher,
            songbird,
            shutdown,
            tasks_started: AtomicBool::new(false),
        }
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    /// Registers slash commands with Discord.
    ///
    /// Commands go to a single guild when `guild_id` is configured (instant
    /// updates, useful for development) and globally otherwise.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        let bot_id = ctx.cache.current_user().id;
        info!("🤖 Bot ID: {}", bot_id);
        info!("🔧 Application ID: {}", self.config.application_id);

        let enable_equalizer = self.config.enable_equalizer;

        // Registrar comandos globales o por guild según configuración
        match self.config.guild_id {
            Some(guild_id) => {
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);
                let guild_id = GuildId::new(guild_id);

                // Verificar que el bot esté en la guild
                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id, enable_equalizer)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos de guild: {:?}", e);
                        anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                    })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx, enable_equalizer)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos globales: {:?}", e);
                        anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                    })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }

    /// Connects the bot to a voice channel.
    ///
    /// # Required Permissions
    ///
    /// - `Connect` - To join the voice channel
    /// - `Speak` - To play audio in the channel
    pub async fn join_voice_channel(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<()> {
        match self.songbird.join(guild_id, channel_id).await {
            Ok(_) => {
                info!("🔊 Conectado al canal de voz en guild {}", guild_id);
                Ok(())
            }
            Err(e) => {
                error!("Error al conectar al canal de voz: {:?}", e);
                Err(anyhow::anyhow!("Error al conectar al canal de voz"))
            }
        }
    }

    /// Disconnects the bot from the voice channel of a guild, if any.
    pub async fn leave_voice_channel(&self, guild_id: GuildId) -> Result<()> {
        leave_voice(&self.songbird, guild_id).await
    }

    pub fn is_connected(&self, guild_id: GuildId) -> bool {
        self.songbird.get(guild_id).is_some()
    }

    fn start_background_tasks(&self) {
        if self.tasks_started.swap(true, Ordering::SeqCst) {
            debug!("Tareas de fondo ya iniciadas");
            return;
        }

        let registry = self.dispatcher.registry().clone();

        registry.spawn_reaper(self.shutdown.clone());

        tokio::spawn(session_event_listener(
            registry.clone(),
            self.songbird.clone(),
            self.shutdown.clone(),
        ));

        tokio::spawn(maintenance_tasks(registry, self.shutdown.clone()));
    }
}

#[async_trait]
impl EventHandler for OpenMusicBot {
    /// Called when the bot is ready and connected to Discord.
    ///
    /// Registers the slash commands and starts the background tasks.
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }

        self.start_background_tasks();
    }

    /// Handles incoming Discord interactions.
    ///
    /// Errors are logged but don't crash the bot.
    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// Handles voice state updates for users and the bot.
    ///
    /// # Behaviors
    ///
    /// - **Bot disconnected**: stops the session of the guild
    /// - **Bot alone**: stops the session and leaves the channel
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };
        let current_user_id = ctx.cache.current_user().id;

        // Detectar si el bot fue desconectado
        if new.user_id == current_user_id {
            if old.is_some() && new.channel_id.is_none() {
                info!("🔌 Bot desconectado en guild {}", guild_id);

                if let Err(e) = self.dispatcher.stop(guild_id).await {
                    error!("Error al detener reproducción: {:?}", e);
                }
            }
            return;
        }

        // Auto-desconectar si el bot está solo en el canal
        let Some(bot_channel) = self
            .songbird
            .get(guild_id)
            .and_then(|call| {
                let channel = call.try_lock().ok()?.current_channel();
                channel
            })
        else {
            return;
        };

        let listeners = count_listeners(&ctx, guild_id, ChannelId::new(bot_channel.0.get()), current_user_id);
        if listeners == Some(0) {
            info!("🚪 Bot solo en el canal de voz de guild {}, deteniendo", guild_id);

            if let Err(e) = self.dispatcher.stop(guild_id).await {
                error!("Error al detener reproducción: {:?}", e);
            }
            if let Err(e) = self.leave_voice_channel(guild_id).await {
                warn!("Error al salir del canal de voz: {:?}", e);
            }
        }
    }
}

/// Usuarios (sin contar al bot) en el canal de voz; `None` si la guild no está en caché
fn count_listeners(ctx: &Context, guild_id: GuildId, channel_id: ChannelId, bot_id: UserId) -> Option<usize> {
    let guild = ctx.cache.guild(guild_id)?;

    Some(
        guild
            .voice_states
            .values()
            .filter(|state| state.channel_id == Some(channel_id) && state.user_id != bot_id)
            .count(),
    )
}

async fn leave_voice(songbird: &Songbird, guild_id: GuildId) -> Result<()> {
    if songbird.get(guild_id).is_none() {
        return Ok(());
    }

    songbird.remove(guild_id).await?;

    info!("👋 Desconectado del canal de voz en guild {}", guild_id);
    Ok(())
}

/// Reacts to engine events: leaves voice when a session closes and logs the rest.
async fn session_event_listener(registry: Arc<SessionRegistry>, songbird: Arc<Songbird>, shutdown: CancellationToken) {
    let mut events = registry.subscribe();

    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.recv() => event,
        };

        match event {
            Ok(SessionEvent::Closed { channel, reason }) => {
                debug!("🔚 Sesión cerrada en {}: {:?}", channel, reason);
                if let Err(e) = leave_voice(&songbird, channel).await {
                    warn!("Error al salir del canal de voz en {}: {:?}", channel, e);
                }
            }
            Ok(SessionEvent::NowPlaying { channel, track }) => {
                info!("🎵 [{}] Reproduciendo: {}", channel, track.title());
            }
            Ok(SessionEvent::TrackFailed { channel, title, reason }) => {
                warn!("⚠️ [{}] Falló {}: {}", channel, title, reason);
            }
            Ok(SessionEvent::Abandoned { channel, failures }) => {
                error!("🛑 [{}] Reproducción abandonada tras {} fallos", channel, failures);
            }
            Ok(SessionEvent::QueueFinished { channel }) => {
                debug!("📭 [{}] Cola terminada", channel);
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("Listener de eventos atrasado, {} eventos perdidos", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }

    debug!("Listener de eventos detenido");
}

/// Runs periodic maintenance tasks in the background.
///
/// Runs every hour until shutdown. Currently only purges expired entries
/// from the resolve cache and logs its hit rate.
async fn maintenance_tasks(registry: Arc<SessionRegistry>, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(3600)); // Cada hora

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {}
        }

        let cache = registry.sources().cache();
        let removed = cache.cleanup_old_entries();
        let metrics = cache.metrics();

        info!(
            "🧹 Mantenimiento: {} entradas expiradas, {} sesiones activas, hit rate {:.1}%",
            removed,
            registry.len(),
            metrics.hit_rate() * 100.0
        );
    }
}
