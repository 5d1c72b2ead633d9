use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod error;
mod sources;
mod ui;

use crate::audio::{
    idle::IdleMonitor,
    player::SessionManager,
    session::{SessionConfig, SessionDeps},
    voice::SongbirdBackend,
};
use crate::bot::{events::Notifier, NanaliBot};
use crate::config::Config;
use crate::sources::{ResolutionAdapter, YtDlpResolver};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("nanali_music=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Nanali Music v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Arc::new(Config::load()?);
    info!("{}", config.summary());

    let resolver = Arc::new(YtDlpResolver::new(
        &config.ytdlp_path,
        config.max_concurrent_resolutions,
    )?);
    let songbird = Songbird::serenity();
    let backend = Arc::new(SongbirdBackend::new(
        songbird.clone(),
        reqwest::Client::new(),
        &config.ffmpeg_path,
    ));

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&resolver, &backend).await;
    }

    let resolution = ResolutionAdapter::new(resolver, config.resolution_timeout());
    let (events_tx, events_rx) = flume::unbounded();
    let deps = Arc::new(SessionDeps {
        resolver: resolution.clone(),
        player: backend.clone(),
        gateway: backend,
        events: events_tx,
        config: SessionConfig::from_config(&config),
    });
    let sessions = Arc::new(SessionManager::new(deps));

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let handler = NanaliBot::new(config.clone(), sessions.clone(), resolution);
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    let cancel = CancellationToken::new();
    let idle = IdleMonitor::new(sessions.clone(), config.idle_disconnect(), cancel.clone()).spawn();
    let notifier = Notifier::new(client.http.clone(), events_rx, cancel.clone()).spawn();

    // Manejar shutdown graceful
    {
        let sessions = sessions.clone();
        let shard_manager = client.shard_manager.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Error al registrar Ctrl+C: {:?}", e);
                return;
            }
            info!("⚠️ Señal de shutdown recibida, cerrando...");
            sessions.shutdown().await;
            cancel.cancel();
            shard_manager.shutdown_all().await;
        });
    }

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    cancel.cancel();
    let (idle, notifier) = tokio::join!(idle, notifier);
    if let Err(e) = idle.and(notifier) {
        error!("Error al cerrar tareas de fondo: {:?}", e);
    }

    info!("👋 Nanali Music detenido");
    Ok(())
}

async fn health_check(resolver: &YtDlpResolver, backend: &SongbirdBackend) -> Result<()> {
    let version = resolver.verify().await?;
    backend.verify_ffmpeg().await?;

    println!("OK (yt-dlp {})", version.trim());
    Ok(())
}
