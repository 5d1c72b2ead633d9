use async_trait::async_trait;
use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    error::JoinError,
    input::{ChildContainer, HttpRequest, Input},
    tracks::{PlayMode, Track, TrackHandle},
    Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{
    process::{Command, Stdio},
    sync::Arc,
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::backend::{
    Completion, PlayRequest, PlaybackHandle, PlaybackOutcome, StreamPlayer, VoiceGateway,
    VoiceHandle,
};
use crate::error::{PlaybackError, VoiceError};

type TrackMap = Arc<DashMap<GuildId, TrackHandle>>;

/// Reproductor y conexiones de voz sobre songbird.
///
/// Implements both [`StreamPlayer`] and [`VoiceGateway`]; the two share the
/// map of live track handles so a voice handle can tell whether its call is
/// still producing audio.
pub struct SongbirdBackend {
    manager: Arc<Songbird>,
    http: reqwest::Client,
    ffmpeg_path: String,
    tracks: TrackMap,
}

impl SongbirdBackend {
    pub fn new(manager: Arc<Songbird>, http: reqwest::Client, ffmpeg_path: impl Into<String>) -> Self {
        Self {
            manager,
            http,
            ffmpeg_path: ffmpeg_path.into(),
            tracks: Arc::new(DashMap::new()),
        }
    }

    /// Verifica que ffmpeg esté disponible para los filtros de audio
    pub async fn verify_ffmpeg(&self) -> anyhow::Result<()> {
        let output = async_process::Command::new(&self.ffmpeg_path)
            .arg("-version")
            .output()
            .await?;
        if !output.status.success() {
            anyhow::bail!("ffmpeg -version falló");
        }
        Ok(())
    }

    /// Sin efecto se reproduce la URL directamente; con bass boost se pasa
    /// por un proceso ffmpeg que aplica el filtro y entrega WAV por stdout.
    fn input_for(&self, request: &PlayRequest) -> Result<Input, PlaybackError> {
        let Some(filter) = request.settings.ffmpeg_filter() else {
            return Ok(HttpRequest::new(self.http.clone(), request.stream_url.clone()).into());
        };

        let child = Command::new(&self.ffmpeg_path)
            .args([
                "-reconnect",
                "1",
                "-reconnect_streamed",
                "1",
                "-reconnect_delay_max",
                "5",
                "-i",
                &request.stream_url,
                "-vn",
                "-af",
                &filter,
                "-c:a",
                "pcm_s16le",
                "-f",
                "wav",
                "-ar",
                "48000",
                "-ac",
                "2",
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| PlaybackError::Start(format!("no se pudo ejecutar ffmpeg: {}", e)))?;

        debug!("🎛️ ffmpeg con filtro {} para: {}", filter, request.title);
        Ok(ChildContainer::from(child).into())
    }
}

#[async_trait]
impl StreamPlayer for SongbirdBackend {
    async fn play(&self, request: PlayRequest) -> Result<Box<dyn PlaybackHandle>, PlaybackError> {
        let call = self
            .manager
            .get(request.guild_id)
            .ok_or(PlaybackError::NoVoiceConnection)?;

        let input = self.input_for(&request)?;
        let track = Track::from(input).volume(request.settings.gain());
        let handle = {
            let mut handler = call.lock().await;
            handler.play(track)
        };

        for event in [TrackEvent::End, TrackEvent::Error] {
            handle
                .add_event(
                    Event::Track(event),
                    CompletionNotifier {
                        completion: request.completion.clone(),
                        episode: request.episode,
                    },
                )
                .map_err(|e| {
                    PlaybackError::Start(format!("error al agregar event handler: {}", e))
                })?;
        }

        self.tracks.insert(request.guild_id, handle.clone());
        debug!(
            "▶️ Stream iniciado en guild {} (episodio {})",
            request.guild_id, request.episode
        );

        Ok(Box::new(SongbirdTrack {
            guild_id: request.guild_id,
            handle,
            tracks: self.tracks.clone(),
        }))
    }
}

#[async_trait]
impl VoiceGateway for SongbirdBackend {
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn VoiceHandle>, VoiceError> {
        let call = self
            .manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| VoiceError::Join(e.to_string()))?;

        {
            let mut handler = call.lock().await;
            if let Err(e) = handler.deafen(true).await {
                warn!("⚠️ No se pudo ensordecer al bot: {:?}", e);
            }
        }

        Ok(Arc::new(SongbirdVoice {
            guild_id,
            manager: self.manager.clone(),
            call,
            tracks: self.tracks.clone(),
        }))
    }
}

struct SongbirdVoice {
    guild_id: GuildId,
    manager: Arc<Songbird>,
    call: Arc<Mutex<songbird::Call>>,
    tracks: TrackMap,
}

#[async_trait]
impl VoiceHandle for SongbirdVoice {
    async fn channel(&self) -> Option<ChannelId> {
        let handler = self.call.lock().await;
        handler
            .current_channel()
            .map(|channel_id| ChannelId::from(channel_id.0))
    }

    async fn move_to(&self, channel_id: ChannelId) -> Result<(), VoiceError> {
        self.manager
            .join(self.guild_id, channel_id)
            .await
            .map(|_| ())
            .map_err(|e| VoiceError::Join(e.to_string()))
    }

    async fn disconnect(&self) -> Result<(), VoiceError> {
        self.tracks.remove(&self.guild_id);
        match self.manager.remove(self.guild_id).await {
            Ok(()) | Err(JoinError::NoCall) => {
                info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
                Ok(())
            }
            Err(e) => Err(VoiceError::Disconnect(e.to_string())),
        }
    }

    async fn is_active(&self) -> bool {
        let Some(handle) = self.tracks.get(&self.guild_id).map(|h| h.clone()) else {
            return false;
        };
        match handle.get_info().await {
            Ok(info) => matches!(info.playing, PlayMode::Play | PlayMode::Pause),
            Err(_) => false,
        }
    }
}

struct SongbirdTrack {
    guild_id: GuildId,
    handle: TrackHandle,
    tracks: TrackMap,
}

impl PlaybackHandle for SongbirdTrack {
    fn stop(&self) {
        if let Err(e) = self.handle.stop() {
            debug!("Track ya detenido: {:?}", e);
        }
    }

    fn set_volume(&self, gain: f32) -> bool {
        self.handle.set_volume(gain).is_ok()
    }
}

impl Drop for SongbirdTrack {
    fn drop(&mut self) {
        let uuid = self.handle.uuid();
        self.tracks
            .remove_if(&self.guild_id, |_, handle| handle.uuid() == uuid);
    }
}

/// Traduce los eventos de fin/error de songbird al callback de la sesión.
struct CompletionNotifier {
    completion: Arc<Completion>,
    episode: u64,
}

#[async_trait]
impl VoiceEventHandler for CompletionNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let outcome = match ctx {
            EventContext::Track(tracks) => match tracks.first() {
                Some((state, _)) => match &state.playing {
                    PlayMode::Errored(e) => PlaybackOutcome::Failed(format!("{:?}", e)),
                    _ => PlaybackOutcome::Finished,
                },
                None => PlaybackOutcome::Finished,
            },
            _ => PlaybackOutcome::Finished,
        };

        if let PlaybackOutcome::Failed(reason) = &outcome {
            error!("❌ Error en el track (episodio {}): {}", self.episode, reason);
        }
        if !self.completion.complete(outcome) {
            debug!("Fin del episodio {} ya reportado", self.episode);
        }

        Some(Event::Cancel)
    }
}
