use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::{str::FromStr, sync::Arc};
use tracing::{info, warn};

use crate::{
    audio::{
        effects::BassBoost,
        queue::LoopMode,
        session::{
            ClearOutcome, ConnectOutcome, DisconnectReason, EnqueueOutcome, Session,
            ShuffleOutcome, SkipOutcome, StopOutcome, TerminateOutcome,
        },
    },
    bot::{search, NanaliBot},
    error::CommandError,
    ui::embeds,
};

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &NanaliBot,
) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        return reply(ctx, &command, "❌ Este comando sólo funciona en un servidor", true).await;
    };

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, bot, guild_id).await?,
        "search" => search::handle_search(ctx, &command, bot, guild_id).await?,
        "skip" => handle_skip(ctx, &command, bot, guild_id).await?,
        "stop" => handle_stop(ctx, &command, bot, guild_id).await?,
        "queue" => handle_queue(ctx, &command, bot, guild_id).await?,
        "nowplaying" => handle_nowplaying(ctx, &command, bot, guild_id).await?,
        "shuffle" => handle_shuffle(ctx, &command, bot, guild_id).await?,
        "remove" => handle_remove(ctx, &command, bot, guild_id).await?,
        "clear" => handle_clear(ctx, &command, bot, guild_id).await?,
        "loop" => handle_loop(ctx, &command, bot, guild_id).await?,
        "volume" => handle_volume(ctx, &command, bot, guild_id).await?,
        "bassboost" => handle_bassboost(ctx, &command, bot, guild_id).await?,
        "join" => handle_join(ctx, &command, bot, guild_id).await?,
        "leave" => handle_leave(ctx, &command, bot, guild_id).await?,
        "help" => reply_embed(ctx, &command, embeds::create_help_embed()).await?,
        _ => reply(ctx, &command, "❌ Comando no reconocido", true).await?,
    }

    Ok(())
}

/// Maneja el comando /play
async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &NanaliBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(query) = string_option(command, "query").map(str::to_owned) else {
        return reply(ctx, command, "❌ Indica una canción o URL", true).await;
    };

    let voice_channel = match get_user_voice_channel(ctx, guild_id, command.user.id) {
        Ok(channel_id) => channel_id,
        Err(e) => return reply(ctx, command, &format!("❌ {}", e), true).await,
    };

    // yt-dlp puede tardar varios segundos
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let embed = match play_in(bot, guild_id, voice_channel, command, &query).await {
        Ok(outcome) => embeds::create_track_added_embed(&outcome),
        Err(e) => {
            warn!("⚠️ /play falló en guild {}: {}", guild_id, e);
            embeds::create_error_embed("No se pudo reproducir", &e.to_string())
        }
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

/// Conecta y encola. Si la sesión terminó justo antes de conectar (barrido de
/// inactividad), se reintenta una vez con una sesión nueva.
pub(super) async fn play_in(
    bot: &NanaliBot,
    guild_id: GuildId,
    voice_channel: ChannelId,
    command: &CommandInteraction,
    query: &str,
) -> Result<EnqueueOutcome, CommandError> {
    let mut session = bot.sessions.session(guild_id);
    session.set_text_channel(command.channel_id);

    if let Err(CommandError::Terminated) = session.connect(voice_channel).await {
        session = bot.sessions.session(guild_id);
        session.set_text_channel(command.channel_id);
        session.connect(voice_channel).await?;
    }

    session.enqueue(query, command.user.id).await
}

/// Maneja el comando /skip
async fn handle_skip(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &NanaliBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(session) = existing_session(bot, guild_id, command) else {
        return reply(ctx, command, "❌ No hay nada reproduciéndose", true).await;
    };

    let content = match session.skip().await {
        Ok(SkipOutcome::Skipped(track)) => format!("⏭️ Saltada: **{}**", track.title),
        Ok(SkipOutcome::NothingPlaying) => "❌ No hay nada reproduciéndose".to_string(),
        Err(e) => return reply_error(ctx, command, &e).await,
    };
    reply(ctx, command, &content, false).await
}

/// Maneja el comando /stop
async fn handle_stop(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &NanaliBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(session) = existing_session(bot, guild_id, command) else {
        return reply(ctx, command, "❌ No hay nada reproduciéndose", true).await;
    };

    let content = match session.stop() {
        Ok(StopOutcome::Stopped { cleared: 0 }) => "⏹️ Reproducción detenida".to_string(),
        Ok(StopOutcome::Stopped { cleared }) => format!(
            "⏹️ Reproducción detenida y {} canciones quitadas de la cola",
            cleared
        ),
        Ok(StopOutcome::NothingPlaying) => "❌ No hay nada reproduciéndose".to_string(),
        Err(e) => return reply_error(ctx, command, &e).await,
    };
    reply(ctx, command, &content, false).await
}

/// Maneja el comando /queue
async fn handle_queue(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &NanaliBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(session) = existing_session(bot, guild_id, command) else {
        return reply(ctx, command, "📭 La cola está vacía", true).await;
    };

    let page = integer_option(command, "page")
        .and_then(|page| usize::try_from(page).ok())
        .unwrap_or(1);
    let snapshot = session.snapshot();

    reply_embed(ctx, command, embeds::create_queue_embed(&snapshot, page)).await
}

/// Maneja el comando /nowplaying
async fn handle_nowplaying(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &NanaliBot,
    guild_id: GuildId,
) -> Result<()> {
    let snapshot = existing_session(bot, guild_id, command).map(|session| session.snapshot());

    match snapshot {
        Some(snapshot) => match &snapshot.current {
            Some(track) => {
                let embed = embeds::create_player_status_embed(track, &snapshot);
                reply_embed(ctx, command, embed).await
            }
            None => reply(ctx, command, "❌ No hay nada reproduciéndose", true).await,
        },
        None => reply(ctx, command, "❌ No hay nada reproduciéndose", true).await,
    }
}

async fn handle_shuffle(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &NanaliBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(session) = existing_session(bot, guild_id, command) else {
        return reply(ctx, command, "📭 La cola está vacía", true).await;
    };

    let content = match session.shuffle() {
        Ok(ShuffleOutcome::Shuffled(count)) => format!("🔀 Cola mezclada ({} canciones)", count),
        Ok(ShuffleOutcome::QueueTooShort) => {
            "❌ Se necesitan al menos 2 canciones en cola para mezclar".to_string()
        }
        Err(e) => return reply_error(ctx, command, &e).await,
    };
    reply(ctx, command, &content, false).await
}

async fn handle_remove(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &NanaliBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(session) = existing_session(bot, guild_id, command) else {
        return reply(ctx, command, "📭 La cola está vacía", true).await;
    };

    // Negativos cuentan como posición 0: fuera de rango
    let position = integer_option(command, "position")
        .and_then(|position| usize::try_from(position).ok())
        .unwrap_or(0);

    match session.remove(position) {
        Ok(track) => {
            let content = format!("🗑️ Quitada de la posición {}: **{}**", position, track.title);
            reply(ctx, command, &content, false).await
        }
        Err(e) => reply_error(ctx, command, &e).await,
    }
}

async fn handle_clear(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &NanaliBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(session) = existing_session(bot, guild_id, command) else {
        return reply(ctx, command, "📭 La cola ya está vacía", true).await;
    };

    let content = match session.clear() {
        Ok(ClearOutcome::Cleared(count)) => format!("🧹 {} canciones quitadas de la cola", count),
        Ok(ClearOutcome::QueueEmpty) => "📭 La cola ya está vacía".to_string(),
        Err(e) => return reply_error(ctx, command, &e).await,
    };
    reply(ctx, command, &content, false).await
}

async fn handle_loop(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &NanaliBot,
    guild_id: GuildId,
) -> Result<()> {
    let raw = string_option(command, "mode").unwrap_or_default();
    let mode = match LoopMode::from_str(raw) {
        Ok(mode) => mode,
        Err(e) => return reply_error(ctx, command, &e).await,
    };

    let session = live_session(bot, guild_id, command);
    match session.set_loop(mode) {
        Ok(mode) => {
            let content = format!("Repetición: {}", embeds::loop_mode_label(mode));
            reply(ctx, command, &content, false).await
        }
        Err(e) => reply_error(ctx, command, &e).await,
    }
}

/// Maneja el comando /volume
async fn handle_volume(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &NanaliBot,
    guild_id: GuildId,
) -> Result<()> {
    let max_volume = bot.config.max_volume;
    let session = live_session(bot, guild_id, command);

    let embed = match integer_option(command, "level") {
        None => {
            let snapshot = session.snapshot();
            embeds::create_volume_embed(snapshot.volume, max_volume, snapshot.current.is_some())
        }
        Some(level) => match session.set_volume(level) {
            Ok(applied) => embeds::create_volume_embed(applied.volume, max_volume, applied.live),
            Err(e) => return reply_error(ctx, command, &e).await,
        },
    };
    reply_embed(ctx, command, embed).await
}

async fn handle_bassboost(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &NanaliBot,
    guild_id: GuildId,
) -> Result<()> {
    let levels = bot.config.effect_levels;
    let session = live_session(bot, guild_id, command);

    let boost = match integer_option(command, "level") {
        None => BassBoost::from_level(session.snapshot().effect_level).unwrap_or(BassBoost::Off),
        Some(level) => match session.set_effect(level) {
            Ok(boost) => boost,
            Err(e) => return reply_error(ctx, command, &e).await,
        },
    };
    reply_embed(ctx, command, embeds::create_bassboost_embed(boost, levels)).await
}

/// Maneja el comando /join
async fn handle_join(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &NanaliBot,
    guild_id: GuildId,
) -> Result<()> {
    let channel_id = match get_user_voice_channel(ctx, guild_id, command.user.id) {
        Ok(channel_id) => channel_id,
        Err(e) => return reply(ctx, command, &format!("❌ {}", e), true).await,
    };

    let session = live_session(bot, guild_id, command);
    let content = match session.connect(channel_id).await {
        Ok(ConnectOutcome::Connected) => format!("🔊 Conectado a <#{}>", channel_id),
        Ok(ConnectOutcome::Moved) => format!("🔀 Movido a <#{}>", channel_id),
        Ok(ConnectOutcome::AlreadyConnected) => format!("ℹ️ Ya estoy en <#{}>", channel_id),
        Err(e) => return reply_error(ctx, command, &e).await,
    };
    reply(ctx, command, &content, false).await
}

/// Maneja el comando /leave
async fn handle_leave(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &NanaliBot,
    guild_id: GuildId,
) -> Result<()> {
    match bot
        .sessions
        .terminate(guild_id, DisconnectReason::Requested)
        .await
    {
        Some(TerminateOutcome::Terminated) => {
            reply(ctx, command, "👋 Desconectado del canal de voz", false).await
        }
        Some(TerminateOutcome::AlreadyTerminated) | None => {
            reply(ctx, command, "❌ No estoy en un canal de voz", true).await
        }
    }
}

/// Sesión existente; no crea una nueva para comandos de sólo lectura.
fn existing_session(
    bot: &NanaliBot,
    guild_id: GuildId,
    command: &CommandInteraction,
) -> Option<Arc<Session>> {
    let session = bot.sessions.get(guild_id)?;
    session.set_text_channel(command.channel_id);
    Some(session)
}

fn live_session(bot: &NanaliBot, guild_id: GuildId, command: &CommandInteraction) -> Arc<Session> {
    let session = bot.sessions.session(guild_id);
    session.set_text_channel(command.channel_id);
    session
}

pub(super) fn string_option<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|option| option.name == name)
        .and_then(|option| option.value.as_str())
}

fn integer_option(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|option| option.name == name)
        .and_then(|option| option.value.as_i64())
}

/// Mensaje para un comando rechazado. Los argumentos inválidos se contestan
/// sólo al usuario que los escribió.
fn error_reply(error: &CommandError) -> (String, bool) {
    (format!("❌ {}", error), error.is_invalid_argument())
}

async fn reply_error(ctx: &Context, command: &CommandInteraction, error: &CommandError) -> Result<()> {
    let (content, ephemeral) = error_reply(error);
    reply(ctx, command, &content, ephemeral).await
}

pub(super) async fn reply(
    ctx: &Context,
    command: &CommandInteraction,
    content: &str,
    ephemeral: bool,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;
    Ok(())
}

async fn reply_embed(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().embed(embed)),
        )
        .await?;
    Ok(())
}

/// Obtiene el canal de voz del usuario
pub(super) fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Result<ChannelId> {
    let guild = guild_id
        .to_guild_cached(&ctx.cache)
        .ok_or_else(|| anyhow::anyhow!("Guild no encontrada en caché"))?;

    let channel_id = guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
        .ok_or_else(|| anyhow::anyhow!("Debes estar en un canal de voz"))?;

    Ok(channel_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn invalid_arguments_are_private_replies() {
        let (content, ephemeral) = error_reply(&CommandError::InvalidPosition { position: 0, len: 3 });
        assert!(ephemeral);
        assert_eq!(content, "❌ posición inválida: 0 (la cola tiene 3 canciones)");

        let (_, ephemeral) = error_reply(&CommandError::QueueFull { max: 100 });
        assert!(!ephemeral);
    }
}
