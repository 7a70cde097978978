use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

/// Todos los comandos slash; el ecualizador solo si está habilitado
pub fn all_commands(enable_equalizer: bool) -> Vec<CreateCommand> {
    let mut commands = vec![
        play_command(),
        pause_command(),
        resume_command(),
        skip_command(),
        seek_command(),
        stop_command(),
        queue_command(),
        nowplaying_command(),
        shuffle_command(),
        loop_command(),
        remove_command(),
        move_command(),
        clear_command(),
        volume_command(),
        leave_command(),
    ];

    if enable_equalizer {
        commands.push(equalizer_command());
    }

    commands
}

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context, enable_equalizer: bool) -> Result<()> {
    for command in all_commands(enable_equalizer) {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId, enable_equalizer: bool) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands(enable_equalizer)).await?;

    Ok(())
}

// Comandos de reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Reproduce una canción o la agrega a la cola")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "URL o término de búsqueda",
            )
            .required(true),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "source", "Fuente de búsqueda")
                .add_string_choice("YouTube", "youtube")
                .add_string_choice("SoundCloud", "soundcloud")
                .add_string_choice("URL directa", "direct"),
        )
}

// Comandos de control

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pausa la reproducción actual")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Reanuda la reproducción pausada")
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Salta a la siguiente canción")
}

fn seek_command() -> CreateCommand {
    CreateCommand::new("seek")
        .description("Salta a un punto de la canción actual")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "position", "Segundo desde el inicio")
                .min_int_value(0)
                .required(true),
        )
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Detiene la reproducción, limpia la cola y sale del canal")
}

// Comandos de cola

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue")
        .description("Muestra la cola de reproducción")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "page", "Número de página")
                .min_int_value(1),
        )
}

fn nowplaying_command() -> CreateCommand {
    CreateCommand::new("nowplaying").description("Muestra información de la canción actual")
}

fn shuffle_command() -> CreateCommand {
    CreateCommand::new("shuffle")
        .description("Activa/desactiva el modo aleatorio")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Boolean, "enabled", "Activar o desactivar")
                .required(true),
        )
}

fn loop_command() -> CreateCommand {
    CreateCommand::new("loop")
        .description("Configura el modo de repetición")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "mode", "Modo de repetición")
                .add_string_choice("Desactivar", "off")
                .add_string_choice("Canción", "one")
                .add_string_choice("Cola", "all")
                .required(true),
        )
}

fn remove_command() -> CreateCommand {
    CreateCommand::new("remove")
        .description("Quita una canción pendiente de la cola")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "position", "Posición en la cola")
                .min_int_value(1)
                .required(true),
        )
}

fn move_command() -> CreateCommand {
    CreateCommand::new("move")
        .description("Mueve una canción pendiente a otra posición")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "from", "Posición actual")
                .min_int_value(1)
                .required(true),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "to", "Nueva posición")
                .min_int_value(1)
                .required(true),
        )
}

fn clear_command() -> CreateCommand {
    CreateCommand::new("clear").description("Limpia las canciones pendientes (la actual sigue sonando)")
}

// Comandos de audio

fn volume_command() -> CreateCommand {
    CreateCommand::new("volume")
        .description("Ajusta el volumen de reproducción")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Integer,
                "level",
                "Nivel de volumen (0-200)",
            )
            .min_int_value(0)
            .max_int_value(200),
        )
}

fn equalizer_command() -> CreateCommand {
    CreateCommand::new("equalizer")
        .description("Configura el ecualizador")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "preset", "Preset de ecualizador")
                .add_string_choice("Plano", "flat")
                .add_string_choice("Bass", "bass")
                .add_string_choice("Pop", "pop")
                .add_string_choice("Rock", "rock")
                .add_string_choice("Jazz", "jazz")
                .add_string_choice("Classical", "classical")
                .add_string_choice("Electronic", "electronic")
                .add_string_choice("Vocal", "vocal")
                .required(true),
        )
}

// Comandos de conexión

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave").description("Desconecta el bot del canal de voz")
}
