use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse,
    },
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::time::Duration;
use tracing::{info, warn};

use crate::{
    audio::{equalizer::EqualizerPreset, queue::RepeatMode},
    bot::OpenMusicBot,
    error::EngineError,
    sources::SourceKind,
    ui::embeds,
};

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &OpenMusicBot,
) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        respond(
            ctx,
            &command,
            embeds::create_error_embed("Fuera de servidor", "Los comandos de música solo funcionan en servidores"),
            true,
        )
        .await?;
        return Ok(());
    };

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, bot, guild_id).await?,
        "pause" => {
            let result = bot.dispatcher().pause(guild_id).await;
            reply_outcome(ctx, &command, "⏸️ Reproducción pausada", result).await?
        }
        "resume" => {
            let result = bot.dispatcher().resume(guild_id).await;
            reply_outcome(ctx, &command, "▶️ Reproducción reanudada", result).await?
        }
        "skip" => {
            let result = bot.dispatcher().skip(guild_id).await;
            reply_outcome(ctx, &command, "⏭️ Canción saltada", result).await?
        }
        "seek" => {
            let seconds = int_option(&command, "position").unwrap_or(0).max(0) as u64;
            let result = bot.dispatcher().seek(guild_id, Duration::from_secs(seconds)).await;
            reply_outcome(ctx, &command, "⏩ Posición cambiada", result).await?
        }
        "stop" | "leave" => handle_stop(ctx, &command, bot, guild_id).await?,
        "queue" => handle_queue(ctx, &command, bot, guild_id).await?,
        "nowplaying" => handle_nowplaying(ctx, &command, bot, guild_id).await?,
        "shuffle" => handle_shuffle(ctx, &command, bot, guild_id).await?,
        "loop" => handle_loop(ctx, &command, bot, guild_id).await?,
        "remove" => handle_remove(ctx, &command, bot, guild_id).await?,
        "move" => handle_move(ctx, &command, bot, guild_id).await?,
        "clear" => handle_clear(ctx, &command, bot, guild_id).await?,
        "volume" => handle_volume(ctx, &command, bot, guild_id).await?,
        "equalizer" => handle_equalizer(ctx, &command, bot, guild_id).await?,
        _ => {
            command
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .content("❌ Comando no reconocido")
                            .ephemeral(true),
                    ),
                )
                .await?;
        }
    }

    Ok(())
}

// Handlers específicos para cada comando

async fn handle_play(ctx: &Context, command: &CommandInteraction, bot: &OpenMusicBot, guild_id: GuildId) -> Result<()> {
    let query = string_option(command, "query")
        .ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?
        .to_string();
    let source = string_option(command, "source").and_then(|s| s.parse::<SourceKind>().ok());

    // Defer la respuesta ya que puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    // Verificar que el usuario esté en un canal de voz
    let Some(voice_channel_id) = get_user_voice_channel(ctx, guild_id, command.user.id) else {
        let embed = embeds::create_error_embed("Sin canal de voz", "Debes estar en un canal de voz");
        command
            .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
            .await?;
        return Ok(());
    };

    // Conectar al canal de voz si no está conectado
    if !bot.is_connected(guild_id) {
        if let Err(e) = bot.join_voice_channel(guild_id, voice_channel_id).await {
            warn!("🔇 No se pudo entrar al canal de voz en {}: {:?}", guild_id, e);
            let embed = embeds::create_error_embed("Sin conexión de voz", "No pude conectarme a tu canal de voz");
            command
                .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
                .await?;
            return Ok(());
        }
    }

    let embed = match bot.dispatcher().play(guild_id, &query, source, command.user.id).await {
        Ok((track, outcome)) => embeds::create_play_embed(&track, &outcome),
        Err(e) => embeds::create_engine_error_embed(&e),
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

async fn handle_stop(ctx: &Context, command: &CommandInteraction, bot: &OpenMusicBot, guild_id: GuildId) -> Result<()> {
    let result = bot.dispatcher().stop(guild_id).await;

    if let Err(e) = bot.leave_voice_channel(guild_id).await {
        warn!("Error al salir del canal de voz: {:?}", e);
    }

    match result {
        Ok(_) => {
            respond(
                ctx,
                command,
                embeds::create_success_embed("Detenido", "⏹️ Reproducción detenida y cola limpiada"),
                false,
            )
            .await
        }
        Err(e) => respond_error(ctx, command, &e).await,
    }
}

async fn handle_queue(ctx: &Context, command: &CommandInteraction, bot: &OpenMusicBot, guild_id: GuildId) -> Result<()> {
    let page = int_option(command, "page").unwrap_or(1).max(1) as usize;

    match bot.dispatcher().queue(guild_id).await {
        Ok(info) => respond(ctx, command, embeds::create_queue_embed(&info, page), false).await,
        Err(e) => respond_error(ctx, command, &e).await,
    }
}

async fn handle_nowplaying(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    match bot.dispatcher().now_playing(guild_id).await {
        Ok((track, state)) => respond(ctx, command, embeds::create_now_playing_embed(&track, state), false).await,
        Err(e) => respond_error(ctx, command, &e).await,
    }
}

async fn handle_shuffle(ctx: &Context, command: &CommandInteraction, bot: &OpenMusicBot, guild_id: GuildId) -> Result<()> {
    let enabled = bool_option(command, "enabled").unwrap_or(true);

    match bot.dispatcher().set_shuffle(guild_id, enabled).await {
        Ok(true) => respond_text(ctx, command, "🔀 Modo aleatorio activado").await,
        Ok(false) => respond_text(ctx, command, "➡️ Modo aleatorio desactivado").await,
        Err(e) => respond_error(ctx, command, &e).await,
    }
}

async fn handle_loop(ctx: &Context, command: &CommandInteraction, bot: &OpenMusicBot, guild_id: GuildId) -> Result<()> {
    let mode = string_option(command, "mode")
        .and_then(|m| m.parse::<RepeatMode>().ok())
        .unwrap_or_default();

    match bot.dispatcher().set_repeat(guild_id, mode).await {
        Ok(RepeatMode::Off) => respond_text(ctx, command, "➡️ Repetición desactivada").await,
        Ok(RepeatMode::One) => respond_text(ctx, command, "🔂 Repitiendo la canción actual").await,
        Ok(RepeatMode::All) => respond_text(ctx, command, "🔁 Repitiendo toda la cola").await,
        Err(e) => respond_error(ctx, command, &e).await,
    }
}

async fn handle_remove(ctx: &Context, command: &CommandInteraction, bot: &OpenMusicBot, guild_id: GuildId) -> Result<()> {
    let position = int_option(command, "position").unwrap_or(0).max(0) as usize;

    match bot.dispatcher().remove(guild_id, position).await {
        Ok(track) => respond_text(ctx, command, &format!("🗑️ Quitada de la cola: **{}**", track.title())).await,
        Err(e) => respond_error(ctx, command, &e).await,
    }
}

async fn handle_move(ctx: &Context, command: &CommandInteraction, bot: &OpenMusicBot, guild_id: GuildId) -> Result<()> {
    let from = int_option(command, "from").unwrap_or(0).max(0) as usize;
    let to = int_option(command, "to").unwrap_or(0).max(0) as usize;

    match bot.dispatcher().move_track(guild_id, from, to).await {
        Ok(()) => respond_text(ctx, command, &format!("↕️ Canción movida de #{} a #{}", from, to)).await,
        Err(e) => respond_error(ctx, command, &e).await,
    }
}

async fn handle_clear(ctx: &Context, command: &CommandInteraction, bot: &OpenMusicBot, guild_id: GuildId) -> Result<()> {
    match bot.dispatcher().clear(guild_id).await {
        Ok(removed) => respond_text(ctx, command, &format!("🧹 {} canciones quitadas de la cola", removed)).await,
        Err(e) => respond_error(ctx, command, &e).await,
    }
}

async fn handle_volume(ctx: &Context, command: &CommandInteraction, bot: &OpenMusicBot, guild_id: GuildId) -> Result<()> {
    let result = match int_option(command, "level") {
        Some(level) => bot.dispatcher().set_volume(guild_id, level as f32 / 100.0).await,
        None => bot.dispatcher().queue(guild_id).await.map(|info| {
            let mut settings = crate::audio::equalizer::AudioSettings::new(info.volume);
            settings.equalizer = info.equalizer;
            settings
        }),
    };

    match result {
        Ok(settings) => respond(ctx, command, embeds::create_volume_embed(&settings), false).await,
        Err(e) => respond_error(ctx, command, &e).await,
    }
}

async fn handle_equalizer(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let preset = match string_option(command, "preset").map(str::parse::<EqualizerPreset>) {
        Some(Ok(preset)) => preset,
        Some(Err(message)) => {
            return respond(ctx, command, embeds::create_error_embed("Ecualizador", &message), true).await;
        }
        None => EqualizerPreset::Flat,
    };

    match bot.dispatcher().set_equalizer(guild_id, preset).await {
        Ok(settings) => respond_text(ctx, command, &format!("🎛️ Ecualizador: **{}**", settings.equalizer.as_str())).await,
        Err(e) => respond_error(ctx, command, &e).await,
    }
}

// Funciones auxiliares

async fn reply_outcome(
    ctx: &Context,
    command: &CommandInteraction,
    action: &str,
    result: Result<crate::audio::CommandOutcome, EngineError>,
) -> Result<()> {
    match result {
        Ok(outcome) => respond(ctx, command, embeds::create_outcome_embed(action, &outcome), false).await,
        Err(e) => respond_error(ctx, command, &e).await,
    }
}

async fn respond(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed, ephemeral: bool) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;

    Ok(())
}

async fn respond_text(ctx: &Context, command: &CommandInteraction, content: &str) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().content(content)),
        )
        .await?;

    Ok(())
}

/// Los errores de uso se muestran solo a quien ejecutó el comando
async fn respond_error(ctx: &Context, command: &CommandInteraction, err: &EngineError) -> Result<()> {
    respond(ctx, command, embeds::create_engine_error_embed(err), err.is_terminal()).await
}

fn string_option<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

fn int_option(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
}

fn bool_option(command: &CommandInteraction, name: &str) -> Option<bool> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_bool())
}

/// El guard de la caché no puede cruzar un `.await`
fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;

    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}
