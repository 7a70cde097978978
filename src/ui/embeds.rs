use serenity::{
    all::{Colour, Timestamp},
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::{
    audio::{
        equalizer::AudioSettings,
        queue::{QueueInfo, RepeatMode},
        CommandOutcome, PlaybackNotice, PlaybackState, Track,
    },
    error::EngineError,
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Open Music Bot";

const ITEMS_PER_PAGE: usize = 10;

fn artist_suffix(track: &Track) -> String {
    track.artist().map(|artist| format!(" - {}", artist)).unwrap_or_default()
}

fn track_fields(mut embed: CreateEmbed, track: &Track) -> CreateEmbed {
    embed = embed.field("🎤 Artista", track.artist().unwrap_or("Desconocido"), true);

    embed = match track.duration() {
        Some(duration) => embed.field("⏱️ Duración", format_duration(duration), true),
        None => embed.field("⏱️ Duración", "🔴 En vivo", true),
    };

    embed = embed
        .field("👤 Solicitado por", format!("<@{}>", track.requested_by()), true)
        .field("🔗 Fuente", track.source().to_string(), true);

    if let Some(thumbnail) = track.thumbnail() {
        embed = embed.thumbnail(thumbnail);
    }

    embed.url(track.url())
}

/// Avisos de canciones saltadas automáticamente
fn notices_field(embed: CreateEmbed, notices: &[PlaybackNotice]) -> CreateEmbed {
    if notices.is_empty() {
        return embed;
    }

    let text = notices
        .iter()
        .map(|notice| match notice {
            PlaybackNotice::TrackSkipped { title, reason } => format!("⏭️ **{}**: {}", title, reason),
        })
        .collect::<Vec<_>>()
        .join("\n");

    embed.field("⚠️ Saltadas", truncate(&text, 1024), false)
}

/// Crea un embed para mostrar la canción actual
pub fn create_now_playing_embed(track: &Track, state: PlaybackState) -> CreateEmbed {
    let title = match state {
        PlaybackState::Paused => "⏸️ En Pausa",
        _ => "🎵 Reproduciendo Ahora",
    };

    let embed = CreateEmbed::default()
        .title(title)
        .description(format!("**{}**", track.title()))
        .color(colors::SUCCESS_GREEN);

    track_fields(embed, track)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Respuesta a `/play`: lo que suena ahora o la posición en la cola
pub fn create_play_embed(requested: &Track, outcome: &CommandOutcome) -> CreateEmbed {
    let started_now = outcome
        .now_playing
        .as_ref()
        .map(|current| current.id() == requested.id())
        .unwrap_or(false);

    let mut embed = if started_now {
        CreateEmbed::default()
            .title("🎵 Reproduciendo Ahora")
            .description(format!("**{}**", requested.title()))
            .color(colors::SUCCESS_GREEN)
    } else {
        let mut description = format!("**{}** se ha agregado a la cola de reproducción", requested.title());
        if let Some(position) = outcome.position {
            description.push_str(&format!("\n📍 Posición **#{}**", position));
        }
        CreateEmbed::default()
            .title("✅ Canción Agregada")
            .description(description)
            .color(colors::MUSIC_PURPLE)
    };

    embed = track_fields(embed, requested);
    embed = notices_field(embed, &outcome.notices);

    if let (false, Some(current)) = (started_now, &outcome.now_playing) {
        embed = embed.field("▶️ Sonando", format!("{}{}", current.title(), artist_suffix(current)), false);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new("🎵 Se reproducirá automáticamente cuando le toque"))
}

/// Resultado de pause/resume/skip/stop
pub fn create_outcome_embed(action: &str, outcome: &CommandOutcome) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title(action)
        .color(colors::INFO_BLUE)
        .field("🎛️ Estado", state_label(outcome.state), true);

    if let Some(current) = &outcome.now_playing {
        embed = embed.description(format!("▶️ **{}**{}", current.title(), artist_suffix(current)));
    } else if outcome.state == PlaybackState::Idle {
        embed = embed.description("😴 No queda nada en la cola");
    }

    notices_field(embed, &outcome.notices)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar la cola de reproducción
pub fn create_queue_embed(queue_info: &QueueInfo, page: usize) -> CreateEmbed {
    let queue_page = queue_info.get_page(page, ITEMS_PER_PAGE);

    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if queue_info.current.is_none() && queue_info.total_items == 0 {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    // Canción actual
    if let Some(current) = &queue_info.current {
        let status = match queue_info.repeat {
            RepeatMode::One => "🔂",
            RepeatMode::All => "🔁",
            RepeatMode::Off => "▶️",
        };

        embed = embed.field(
            format!("{} {}", status, state_label(queue_info.state)),
            format!("**{}**{}", current.title(), artist_suffix(current)),
            false,
        );
    }

    // Próximas canciones
    if !queue_page.items.is_empty() {
        let description = queue_page
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let duration = item
                    .duration()
                    .map(|dur| format!(" `[{}]`", format_duration(dur)))
                    .unwrap_or_default();
                format!(
                    "**{}**. {}{}{}",
                    queue_page.first_position + i,
                    item.title(),
                    artist_suffix(item),
                    duration
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        embed = embed.field("Próximas canciones", truncate(&description, 1024), false);
    }

    // Información adicional
    let mut info = format!("**Pendientes:** {} canciones", queue_info.total_items);

    if queue_info.total_duration > Duration::ZERO {
        info.push_str(&format!(" • **Duración:** {}", format_duration(queue_info.total_duration)));
    }

    if queue_info.shuffle {
        info.push_str(" • 🔀 **Aleatorio**");
    }

    info.push_str(&format!(
        " • 🔊 {}% • 🎛️ {}",
        (queue_info.volume * 100.0).round() as u32,
        queue_info.equalizer.as_str()
    ));

    embed = embed.field("Información", info, false);

    // Paginación
    if queue_page.total_pages > 1 {
        embed = embed.footer(CreateEmbedFooter::new(format!(
            "Página {} de {} • Open Music Bot",
            queue_page.current_page, queue_page.total_pages
        )));
    } else {
        embed = embed.footer(CreateEmbedFooter::new(STANDARD_FOOTER));
    }

    embed.timestamp(Timestamp::now())
}

/// Convierte un error del motor en algo que el usuario entienda
pub fn create_engine_error_embed(err: &EngineError) -> CreateEmbed {
    let (title, color) = match err {
        EngineError::Resolve(_) => ("No se pudo cargar", colors::ERROR_RED),
        EngineError::Transport(_) => ("Error de audio", colors::ERROR_RED),
        EngineError::PlaybackAbandoned { .. } => ("Reproducción detenida", colors::ERROR_RED),
        EngineError::State(_) => ("No disponible ahora", colors::WARNING_ORANGE),
        EngineError::Queue(_) => ("Cola", colors::WARNING_ORANGE),
    };

    create_error_embed(title, &err.to_string()).color(color)
}

pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new("Open Music Bot"))
}

pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new("Open Music Bot"))
}

/// Crea un embed de volumen con indicador visual
pub fn create_volume_embed(settings: &AudioSettings) -> CreateEmbed {
    let volume_percent = (settings.volume * 100.0).round() as u32;

    let status_emoji = match volume_percent {
        0 => "🔈",
        1..=50 => "🔉",
        _ => "🔊",
    };

    let color: Colour = if volume_percent > 100 {
        colors::WARNING_ORANGE
    } else {
        colors::INFO_BLUE
    };

    CreateEmbed::default()
        .title(format!("{} Control de Volumen", status_emoji))
        .description(format!("**Volumen actual: {}%**", volume_percent))
        .field("📊 Nivel", create_volume_bar(settings.volume), false)
        .field("🎛️ Ecualizador", settings.equalizer.as_str(), true)
        .color(color)
        .footer(CreateEmbedFooter::new("💡 Usa /volume <nivel> para ajustar"))
        .timestamp(Timestamp::now())
}

/// Crea una barra visual de volumen (200% llena la barra)
fn create_volume_bar(volume: f32) -> String {
    let segments = 20;
    let filled = ((volume / AudioSettings::MAX_VOLUME) * segments as f32).round() as usize;
    let filled = filled.min(segments);

    let bar = "█".repeat(filled) + &"▒".repeat(segments - filled);
    format!("`[{}]`", bar)
}

fn state_label(state: PlaybackState) -> &'static str {
    match state {
        PlaybackState::Idle => "Inactivo",
        PlaybackState::Loading => "Cargando",
        PlaybackState::Playing => "Reproduciendo",
        PlaybackState::Paused => "En pausa",
        PlaybackState::Stopping => "Deteniendo",
    }
}

/// Discord limita los campos a 1024 caracteres
fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

/// Formatea una duración en formato legible
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
