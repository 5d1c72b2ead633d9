use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::audio::{
    effects::BassBoost,
    queue::{LoopMode, SessionState, Snapshot, Track},
    session::{DisconnectReason, EnqueueOutcome},
};
use crate::error::ResolveError;
use crate::sources::SearchResult;

/// Canciones por página en `/queue`
pub const ITEMS_PER_PAGE: usize = 10;

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
const STANDARD_FOOTER: &str = "🎵 Nanali Music";

fn track_fields(mut embed: CreateEmbed, track: &Track) -> CreateEmbed {
    let artist = track.uploader.as_deref().unwrap_or("Desconocido");
    embed = embed.field("🎤 Artista", artist, true);

    embed = match track.duration {
        Some(duration) => embed.field("⏱️ Duración", format_duration(duration), true),
        None => embed.field("⏱️ Duración", "🔴 En vivo", true),
    };

    embed = embed.field("👤 Solicitado por", format!("<@{}>", track.requested_by), true);

    if let Some(thumbnail) = &track.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }
    if let Some(url) = &track.webpage_url {
        embed = embed.url(url);
    }
    embed
}

/// Crea un embed para mostrar la canción actual
pub fn create_now_playing_embed(track: &Track) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", track.title))
        .color(colors::SUCCESS_GREEN);

    track_fields(embed, track)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// `/nowplaying`: la canción actual más los ajustes de la sesión.
pub fn create_player_status_embed(track: &Track, snapshot: &Snapshot) -> CreateEmbed {
    let status = match snapshot.state {
        SessionState::Starting => "⏳ Iniciando",
        _ => "▶️ Reproduciendo",
    };

    create_now_playing_embed(track)
        .field("📊 Estado", status, true)
        .field("🔁 Repetición", loop_mode_label(snapshot.loop_mode), true)
        .field("🔊 Volumen", format!("{}%", snapshot.volume), true)
        .field(
            "🎛️ Efecto",
            BassBoost::from_level(snapshot.effect_level)
                .map(|boost| boost.label())
                .unwrap_or("Audio normal"),
            true,
        )
        .field("📜 En cola", snapshot.pending.len().to_string(), true)
}

/// Crea un embed para mostrar que se agregó una canción
pub fn create_track_added_embed(outcome: &EnqueueOutcome) -> CreateEmbed {
    let track = &outcome.track;
    let footer = if outcome.playing_now {
        "▶️ Empieza a sonar ahora".to_string()
    } else {
        format!("📍 Posición {} en la cola", outcome.position)
    };

    let embed = CreateEmbed::default()
        .title("✅ Canción Agregada")
        .description(format!("**{}**", track.title))
        .color(colors::SUCCESS_GREEN);

    track_fields(embed, track)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(footer))
}

/// Crea un embed con la página pedida de la cola
pub fn create_queue_embed(snapshot: &Snapshot, page: usize) -> CreateEmbed {
    let queue_page = snapshot.page(page, ITEMS_PER_PAGE);

    let mut embed = CreateEmbed::default()
        .title("📜 Cola de Reproducción")
        .color(colors::MUSIC_PURPLE);

    match &snapshot.current {
        Some(track) => {
            embed = embed.field(
                "🎵 Reproduciendo ahora",
                format!(
                    "**{}**{}",
                    track.title,
                    track
                        .duration
                        .map(|d| format!(" `[{}]`", format_duration(d)))
                        .unwrap_or_default()
                ),
                false,
            );
        }
        None => {
            embed = embed.field("🎵 Reproduciendo ahora", "Nada", false);
        }
    }

    // Próximas canciones
    if queue_page.items.is_empty() {
        embed = embed.description("La cola está vacía. Usa `/play` para agregar música.");
    } else {
        let mut description = String::new();
        for (i, item) in queue_page.items.iter().enumerate() {
            let duration = item
                .duration
                .map(|d| format!(" `[{}]`", format_duration(d)))
                .unwrap_or_default();

            description.push_str(&format!(
                "**{}**. {}{}{}\n",
                queue_page.first_position + i,
                item.title,
                item.uploader
                    .as_ref()
                    .map(|artist| format!(" - {}", artist))
                    .unwrap_or_default(),
                duration
            ));
        }
        embed = embed.field("Próximas canciones", description, false);
    }

    let mut info = format!("**Total:** {} canciones", queue_page.total_items);
    let total = snapshot.total_duration();
    if total > Duration::ZERO {
        info.push_str(&format!(" • **Duración:** {}", format_duration(total)));
    }
    if snapshot.loop_mode != LoopMode::Off {
        info.push_str(&format!(" • {}", loop_mode_label(snapshot.loop_mode)));
    }
    embed = embed.field("Información", info, false);

    // Paginación
    if queue_page.total_pages > 1 {
        embed = embed.footer(CreateEmbedFooter::new(format!(
            "Página {} de {} • Nanali Music",
            queue_page.current_page, queue_page.total_pages
        )));
    } else {
        embed = embed.footer(CreateEmbedFooter::new(STANDARD_FOOTER));
    }

    embed.timestamp(Timestamp::now())
}

/// Crea un embed de volumen con indicador visual
pub fn create_volume_embed(volume: u16, max_volume: u16, live: bool) -> CreateEmbed {
    let status_emoji = match volume {
        0 => "🔇",
        v if v <= 50 => "🔉",
        _ => "🔊",
    };

    let mut embed = CreateEmbed::default()
        .title(format!("{} Control de Volumen", status_emoji))
        .description(format!("**Volumen: {}%**", volume))
        .field("📊 Nivel", create_volume_bar(volume, max_volume), false)
        .color(if volume > 100 {
            colors::WARNING_ORANGE
        } else {
            colors::INFO_BLUE
        });

    if !live {
        embed = embed.field("ℹ️", "Se aplicará a la próxima canción", false);
    }

    embed
        .footer(CreateEmbedFooter::new("💡 Usa /volume <nivel> para ajustar"))
        .timestamp(Timestamp::now())
}

/// Crea un embed con el nivel de bass boost
pub fn create_bassboost_embed(boost: BassBoost, levels: u8) -> CreateEmbed {
    let ladder = BassBoost::LADDER
        .iter()
        .take(usize::from(levels))
        .enumerate()
        .map(|(level, step)| {
            let marker = if *step == boost { "▶" } else { "•" };
            format!("{} `{}` {}", marker, level, step.label())
        })
        .collect::<Vec<_>>()
        .join("\n");

    CreateEmbed::default()
        .title("🎛️ Bass Boost")
        .description(format!("**{}**", boost.label()))
        .field("Niveles", ladder, false)
        .color(colors::MUSIC_PURPLE)
        .footer(CreateEmbedFooter::new(
            "💡 El efecto se aplica desde la próxima canción",
        ))
        .timestamp(Timestamp::now())
}

/// Una canción no pudo volver a resolverse y se saltó
pub fn create_track_failed_embed(locator: &str, reason: &ResolveError) -> CreateEmbed {
    create_error_embed(
        "Canción saltada",
        &format!("No se pudo reproducir `{}`: {}", locator, reason),
    )
}

/// El stream falló al iniciar o a mitad de la canción
pub fn create_playback_error_embed(track: &Track, error: &str) -> CreateEmbed {
    create_error_embed(
        "Error de reproducción",
        &format!("**{}** falló: {}\nPasando a la siguiente canción.", track.title, error),
    )
}

pub fn create_queue_exhausted_embed() -> CreateEmbed {
    CreateEmbed::default()
        .title("📭 Cola terminada")
        .description("No hay más canciones. Usa `/play` para seguir escuchando.")
        .color(colors::NEUTRAL_GRAY)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn create_disconnected_embed(reason: DisconnectReason) -> CreateEmbed {
    let description = match reason {
        DisconnectReason::Requested => "Me desconecté del canal de voz. ¡Hasta luego!",
        DisconnectReason::Idle => "Me desconecté por inactividad.",
        DisconnectReason::VoiceLost => "Me sacaron del canal de voz; la cola se descartó.",
        DisconnectReason::Shutdown => "El bot se está apagando.",
    };

    CreateEmbed::default()
        .title("👋 Desconectado")
        .description(description)
        .color(colors::NEUTRAL_GRAY)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de ayuda general
pub fn create_help_embed() -> CreateEmbed {
    CreateEmbed::default()
        .title("🎵 Nanali Music - Guía")
        .color(colors::INFO_BLUE)
        .description("Bot de música para canales de voz")
        .field(
            "🎵 Reproducción",
            "• `/play <canción>` - Reproduce o agrega a la cola\n\
            • `/search <búsqueda>` - Elige entre 5 resultados\n\
            • `/skip` - Salta la canción actual\n\
            • `/stop` - Detiene y limpia la cola\n\
            • `/nowplaying` - Muestra la canción actual",
            false,
        )
        .field(
            "📜 Cola",
            "• `/queue [página]` - Muestra la cola\n\
            • `/remove <posición>` - Quita una canción\n\
            • `/shuffle` - Mezcla la cola\n\
            • `/clear` - Vacía la cola\n\
            • `/loop <modo>` - off, song o queue",
            false,
        )
        .field(
            "🎛️ Audio",
            "• `/volume [nivel]` - Ajusta o muestra el volumen\n\
            • `/bassboost [nivel]` - Ajusta o muestra el bass boost",
            false,
        )
        .field(
            "🔊 Conexión",
            "• `/join` - Conecta al canal de voz\n\
            • `/leave` - Desconecta del canal",
            false,
        )
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

/// Resultados de `/search`, numerados como las opciones del menú.
pub fn create_search_results_embed(query: &str, results: &[SearchResult]) -> CreateEmbed {
    let listing: String = results
        .iter()
        .enumerate()
        .map(|(i, result)| {
            let duration = result
                .duration
                .map(format_duration)
                .unwrap_or_else(|| "En vivo".to_string());
            let uploader = result
                .uploader
                .as_deref()
                .map(|uploader| format!(" - {}", uploader))
                .unwrap_or_default();
            format!("**{}**. {}{} `[{}]`\n", i + 1, result.title, uploader, duration)
        })
        .collect();

    CreateEmbed::default()
        .title("🔍 Resultados de Búsqueda")
        .description(format!(
            "Búsqueda: **{}**\nSelecciona una canción del menú inferior:",
            query
        ))
        .color(colors::INFO_BLUE)
        .field("Canciones Encontradas", listing, false)
        .footer(CreateEmbedFooter::new("⏳ Tienes 30 segundos para elegir"))
}

pub fn create_no_results_embed(query: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title("❌ Sin Resultados")
        .description(format!(
            "No se encontraron canciones para: **{}**\n\nIntenta con:\n• Términos más específicos\n• Nombre del artista",
            query
        ))
        .color(colors::WARNING_ORANGE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn create_search_expired_embed(query: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title("⏰ Tiempo agotado")
        .description(format!("No se eligió ninguna canción para: **{}**", query))
        .color(colors::NEUTRAL_GRAY)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de error
pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de éxito
pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de información
pub fn create_info_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("ℹ️ {}", title))
        .description(description)
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn loop_mode_label(mode: LoopMode) -> &'static str {
    match mode {
        LoopMode::Off => "➡️ Sin repetición",
        LoopMode::Track => "🔂 Repetir canción",
        LoopMode::Queue => "🔁 Repetir cola",
    }
}

/// Crea una barra visual de volumen
pub fn create_volume_bar(volume: u16, max_volume: u16) -> String {
    let segments = 20usize;
    let filled = if max_volume == 0 {
        0
    } else {
        (usize::from(volume.min(max_volume)) * segments) / usize::from(max_volume)
    };
    let empty = segments - filled;

    let bar = "█".repeat(filled) + &"▒".repeat(empty);
    format!("`[{}]`", bar)
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

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn durations_render_like_a_player() {
        assert_eq!(format_duration(Duration::from_secs(0)), "0:00");
        assert_eq!(format_duration(Duration::from_secs(213)), "3:33");
        assert_eq!(format_duration(Duration::from_secs(3600 + 62)), "1:01:02");
    }

    #[test]
    fn volume_bar_scales_to_the_maximum() {
        assert_eq!(create_volume_bar(0, 150), format!("`[{}]`", "▒".repeat(20)));
        assert_eq!(create_volume_bar(150, 150), format!("`[{}]`", "█".repeat(20)));
        assert_eq!(
            create_volume_bar(75, 150),
            format!("`[{}{}]`", "█".repeat(10), "▒".repeat(10))
        );
        // Valores fuera de rango no desbordan la barra
        assert_eq!(create_volume_bar(500, 150), format!("`[{}]`", "█".repeat(20)));
    }

    #[test]
    fn loop_labels_are_distinct() {
        let labels = [LoopMode::Off, LoopMode::Track, LoopMode::Queue].map(loop_mode_label);
        assert!(labels[0] != labels[1] && labels[1] != labels[2] && labels[0] != labels[2]);
    }
}
