//! # Bot Module
//!
//! Discord front-end for Nanali Music.
//!
//! - Slash command registration ([`commands`]) and dispatch ([`handlers`])
//! - `/search` result picking through a select menu ([`search`])
//! - Voice state tracking: the session of a guild is terminated when the bot
//!   is disconnected from voice outside of `/leave`
//! - Delivery of session notifications to text channels ([`events`])
//!
//! ## Example
//!
//! ```rust,ignore
//! let sessions = Arc::new(SessionManager::new(deps));
//! let bot = NanaliBot::new(Arc::new(config), sessions.clone(), resolution);
//! let client = Client::builder(&token, intents).event_handler(bot).await?;
//! ```

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod events;
pub mod handlers;
pub mod search;

use crate::{
    audio::{
        effects::Limits,
        player::SessionManager,
        session::{DisconnectReason, TerminateOutcome},
    },
    config::Config,
    sources::ResolutionAdapter,
};

/// Main Discord event handler.
///
/// Holds no playback state of its own: everything per guild lives in the
/// [`SessionManager`].
pub struct NanaliBot {
    config: Arc<Config>,
    sessions: Arc<SessionManager>,
    resolution: ResolutionAdapter,
}

impl NanaliBot {
    pub fn new(
        config: Arc<Config>,
        sessions: Arc<SessionManager>,
        resolution: ResolutionAdapter,
    ) -> Self {
        Self {
            config,
            sessions,
            resolution,
        }
    }

    /// Registers slash commands, for a single guild when `GUILD_ID` is set
    /// (instant propagation) or globally otherwise.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        let limits = Limits::from_config(&self.config);

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id, &limits)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos de guild: {:?}", e);
                        anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica el permiso 'applications.commands'.")
                    })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx, &limits)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos globales: {:?}", e);
                        anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica el permiso 'applications.commands'.")
                    })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for NanaliBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// Detects the bot being kicked or disconnected from voice from Discord.
    ///
    /// After `/leave` or an idle disconnect the session is already gone, so
    /// the update is ignored.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }
        let Some(guild_id) = new.guild_id else {
            return;
        };

        if let Some(TerminateOutcome::Terminated) = self
            .sessions
            .terminate(guild_id, DisconnectReason::VoiceLost)
            .await
        {
            info!("🔌 Bot desconectado de voz en guild {}, sesión terminada", guild_id);
        }
    }
}
