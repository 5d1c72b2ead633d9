use serenity::{
    builder::{CreateEmbed, CreateMessage},
    http::Http,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    audio::session::{DisconnectReason, GuildEvent, SessionEvent},
    ui::embeds,
};

/// Publica las notificaciones de las sesiones en el canal de texto de cada guild.
pub struct Notifier {
    http: Arc<Http>,
    events: flume::Receiver<GuildEvent>,
    cancel: CancellationToken,
}

impl Notifier {
    pub fn new(
        http: Arc<Http>,
        events: flume::Receiver<GuildEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            http,
            events,
            cancel,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        loop {
            let event = tokio::select! {
                _ = self.cancel.cancelled() => break,
                event = self.events.recv_async() => match event {
                    Ok(event) => event,
                    Err(_) => break,
                },
            };
            self.publish(event).await;
        }

        // Los avisos de apagado se emiten justo antes de cancelar
        let pending: Vec<GuildEvent> = self.events.drain().collect();
        for event in pending {
            self.publish(event).await;
        }
        debug!("Notificador detenido");
    }

    async fn publish(&self, event: GuildEvent) {
        let Some(embed) = render(&event.event) else {
            return;
        };
        let Some(channel_id) = event.text_channel else {
            debug!("Guild {} sin canal de texto para notificar", event.guild_id);
            return;
        };

        if let Err(e) = channel_id
            .send_message(&self.http, CreateMessage::new().embed(embed))
            .await
        {
            error!(
                "Error al enviar notificación a guild {}: {:?}",
                event.guild_id, e
            );
        }
    }
}

/// Embed para un evento, o `None` si la respuesta al comando ya lo cubre.
fn render(event: &SessionEvent) -> Option<CreateEmbed> {
    match event {
        SessionEvent::TrackStarted { track } => {
            info!("▶️ Reproduciendo: {}", track.title);
            Some(embeds::create_now_playing_embed(track))
        }
        SessionEvent::TrackFailed { locator, reason } => {
            Some(embeds::create_track_failed_embed(locator, reason))
        }
        SessionEvent::PlaybackError { track, error } => {
            Some(embeds::create_playback_error_embed(track, error))
        }
        SessionEvent::QueueExhausted => Some(embeds::create_queue_exhausted_embed()),
        SessionEvent::Disconnected { reason } if *reason != DisconnectReason::Requested => {
            Some(embeds::create_disconnected_embed(*reason))
        }
        SessionEvent::TrackEnqueued { .. } | SessionEvent::Disconnected { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        queue::Track,
        testing::{resolved_with_duration, user},
    };
    use std::time::Duration;

    fn track() -> Track {
        Track::resolved(
            "Song A",
            resolved_with_duration("Song A", Duration::from_secs(180)),
            user(),
        )
    }

    #[test]
    fn command_replies_are_not_repeated() {
        assert!(render(&SessionEvent::TrackEnqueued {
            track: track(),
            position: 1
        })
        .is_none());
        assert!(render(&SessionEvent::Disconnected {
            reason: DisconnectReason::Requested
        })
        .is_none());
    }

    #[test]
    fn playback_events_are_published() {
        assert!(render(&SessionEvent::TrackStarted { track: track() }).is_some());
        assert!(render(&SessionEvent::QueueExhausted).is_some());
        assert!(render(&SessionEvent::Disconnected {
            reason: DisconnectReason::Idle
        })
        .is_some());
    }
}
