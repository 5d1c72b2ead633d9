use anyhow::Result;
use serenity::{
    builder::{
        CreateActionRow, CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        CreateSelectMenu, CreateSelectMenuKind, CreateSelectMenuOption, EditInteractionResponse,
    },
    model::{
        application::{CommandInteraction, ComponentInteractionDataKind},
        id::GuildId,
    },
    prelude::Context,
};
use std::time::Duration;
use tracing::{info, warn};

use super::{handlers, NanaliBot};
use crate::{error::ResolveError, sources::SearchResult, ui::embeds};

/// Resultados ofrecidos por `/search`
const SEARCH_RESULTS: usize = 5;

/// Tiempo para elegir antes de retirar el menú
const SELECTION_TIMEOUT: Duration = Duration::from_secs(30);

// Límite de Discord para etiquetas y descripciones de opciones
const LABEL_LIMIT: usize = 100;

/// Maneja el comando /search: lista candidatos y encola el elegido.
pub async fn handle_search(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &NanaliBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(query) = handlers::string_option(command, "query").map(str::to_owned) else {
        return handlers::reply(ctx, command, "❌ Indica qué buscar", true).await;
    };

    if let Err(e) = handlers::get_user_voice_channel(ctx, guild_id, command.user.id) {
        return handlers::reply(ctx, command, &format!("❌ {}", e), true).await;
    }

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    info!("🔍 Búsqueda iniciada por {}: {}", command.user.name, query);

    let results = match bot.resolution.search(&query, SEARCH_RESULTS).await {
        Ok(results) => results,
        Err(ResolveError::NotFound) => {
            command
                .edit_response(
                    &ctx.http,
                    EditInteractionResponse::new().embed(embeds::create_no_results_embed(&query)),
                )
                .await?;
            return Ok(());
        }
        Err(e) => {
            warn!("⚠️ /search falló en guild {}: {}", guild_id, e);
            let embed = embeds::create_error_embed("Error en la búsqueda", &e.to_string());
            command
                .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
                .await?;
            return Ok(());
        }
    };

    let message = command
        .edit_response(
            &ctx.http,
            EditInteractionResponse::new()
                .embed(embeds::create_search_results_embed(&query, &results))
                .components(vec![CreateActionRow::SelectMenu(
                    create_track_selection_menu(&results),
                )]),
        )
        .await?;

    let Some(selection) = message
        .await_component_interaction(&ctx.shard)
        .author_id(command.user.id)
        .timeout(SELECTION_TIMEOUT)
        .await
    else {
        info!("⏰ Nadie eligió resultado para: {}", query);
        command
            .edit_response(
                &ctx.http,
                EditInteractionResponse::new()
                    .embed(embeds::create_search_expired_embed(&query))
                    .components(vec![]),
            )
            .await?;
        return Ok(());
    };

    selection
        .create_response(&ctx.http, CreateInteractionResponse::Acknowledge)
        .await?;

    let choice = match &selection.data.kind {
        ComponentInteractionDataKind::StringSelect { values } => values
            .first()
            .and_then(|value| option_index(value))
            .and_then(|i| results.get(i)),
        _ => None,
    };

    let embed = match choice {
        Some(choice) => {
            info!("✅ Canción seleccionada por {}: {}", command.user.name, choice.title);
            enqueue_choice(ctx, command, bot, guild_id, choice).await
        }
        None => {
            warn!("⚠️ Selección inválida en /search: {:?}", selection.data.kind);
            embeds::create_error_embed("Selección inválida", "Vuelve a buscar la canción")
        }
    };

    command
        .edit_response(
            &ctx.http,
            EditInteractionResponse::new().embed(embed).components(vec![]),
        )
        .await?;

    Ok(())
}

/// El usuario pudo cambiar de canal mientras elegía.
async fn enqueue_choice(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &NanaliBot,
    guild_id: GuildId,
    choice: &SearchResult,
) -> CreateEmbed {
    let voice_channel = match handlers::get_user_voice_channel(ctx, guild_id, command.user.id) {
        Ok(channel_id) => channel_id,
        Err(e) => return embeds::create_error_embed("No se pudo reproducir", &e.to_string()),
    };

    match handlers::play_in(bot, guild_id, voice_channel, command, &choice.url).await {
        Ok(outcome) => embeds::create_track_added_embed(&outcome),
        Err(e) => {
            warn!("⚠️ /search no pudo encolar en guild {}: {}", guild_id, e);
            embeds::create_error_embed("No se pudo reproducir", &e.to_string())
        }
    }
}

/// Crea menú de selección para los resultados
fn create_track_selection_menu(results: &[SearchResult]) -> CreateSelectMenu {
    let options = results
        .iter()
        .enumerate()
        .map(|(i, result)| {
            let uploader = result.uploader.as_deref().unwrap_or("Desconocido");
            CreateSelectMenuOption::new(option_label(result), format!("track_{}", i))
                .description(truncate(&format!("YouTube • {}", uploader)))
        })
        .collect();

    CreateSelectMenu::new("track_selection", CreateSelectMenuKind::String { options })
        .placeholder("Selecciona una canción para reproducir...")
        .min_values(1)
        .max_values(1)
}

fn option_label(result: &SearchResult) -> String {
    let duration = result
        .duration
        .map(|d| format!(" [{}]", embeds::format_duration(d)))
        .unwrap_or_default();
    truncate(&format!("{}{}", result.title, duration))
}

fn truncate(text: &str) -> String {
    if text.chars().count() > LABEL_LIMIT {
        let kept: String = text.chars().take(LABEL_LIMIT - 3).collect();
        format!("{}...", kept)
    } else {
        text.to_string()
    }
}

fn option_index(value: &str) -> Option<usize> {
    value.strip_prefix("track_")?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn result(title: &str) -> SearchResult {
        SearchResult {
            title: title.to_string(),
            url: "https://www.youtube.com/watch?v=abc".to_string(),
            duration: Some(Duration::from_secs(215)),
            uploader: Some("Chan".to_string()),
        }
    }

    #[test]
    fn labels_show_duration() {
        assert_eq!(option_label(&result("Song A")), "Song A [3:35]");
    }

    #[test]
    fn long_labels_are_cut_on_char_boundaries() {
        let label = option_label(&result(&"ñ".repeat(150)));
        assert_eq!(label.chars().count(), LABEL_LIMIT);
        assert!(label.ends_with("ñ..."));
    }

    #[test]
    fn option_values_map_back_to_results() {
        assert_eq!(option_index("track_0"), Some(0));
        assert_eq!(option_index("track_4"), Some(4));
        assert_eq!(option_index("track_x"), None);
        assert_eq!(option_index("4"), None);
    }
}
