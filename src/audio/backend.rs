//! Seams between a [`Session`](super::session::Session) and the outside world.
//!
//! The session only talks to these traits. [`super::voice`] implements them on
//! top of songbird; tests plug in fakes.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{fmt, sync::Arc};

use super::effects::PlaybackSettings;
use crate::error::{PlaybackError, VoiceError};

/// Cómo terminó una reproducción.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// Fin natural o detenida explícitamente.
    Finished,
    /// El stream falló a mitad de la reproducción.
    Failed(String),
}

type Callback = Box<dyn FnOnce(PlaybackOutcome) + Send>;

/// Callback de fin de reproducción que se entrega a lo sumo una vez.
///
/// Players may report the end of a stream from several places (an "ended"
/// event, an "errored" event, an explicit stop); only the first report wins.
pub struct Completion {
    callback: Mutex<Option<Callback>>,
}

impl Completion {
    pub fn new(callback: impl FnOnce(PlaybackOutcome) + Send + 'static) -> Arc<Self> {
        Arc::new(Self {
            callback: Mutex::new(Some(Box::new(callback))),
        })
    }

    /// Returns `false` when the completion had already fired.
    pub fn complete(&self, outcome: PlaybackOutcome) -> bool {
        let callback = self.callback.lock().take();
        match callback {
            Some(callback) => {
                callback(outcome);
                true
            }
            None => false,
        }
    }

    pub fn is_done(&self) -> bool {
        self.callback.lock().is_none()
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("done", &self.is_done())
            .finish()
    }
}

/// Todo lo que el reproductor necesita para arrancar un stream.
#[derive(Debug, Clone)]
pub struct PlayRequest {
    pub guild_id: GuildId,
    pub episode: u64,
    pub stream_url: String,
    pub title: String,
    pub settings: PlaybackSettings,
    pub completion: Arc<Completion>,
}

/// Stream en curso. Soltar el handle no detiene el audio; `stop` sí.
pub trait PlaybackHandle: Send + Sync {
    /// Must lead to exactly one completion for the episode.
    fn stop(&self);

    /// Ajusta la ganancia en vivo; `false` si el stream ya no acepta cambios.
    fn set_volume(&self, gain: f32) -> bool;
}

#[async_trait]
pub trait StreamPlayer: Send + Sync {
    async fn play(&self, request: PlayRequest) -> Result<Box<dyn PlaybackHandle>, PlaybackError>;
}

/// Conexión viva a un canal de voz.
#[async_trait]
pub trait VoiceHandle: Send + Sync {
    async fn channel(&self) -> Option<ChannelId>;

    async fn move_to(&self, channel_id: ChannelId) -> Result<(), VoiceError>;

    async fn disconnect(&self) -> Result<(), VoiceError>;

    /// ¿Hay audio sonando o pausado en la llamada?
    async fn is_active(&self) -> bool;
}

#[async_trait]
pub trait VoiceGateway: Send + Sync {
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn VoiceHandle>, VoiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn completion_fires_once() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let completion = Completion::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(completion.complete(PlaybackOutcome::Finished));
        assert!(!completion.complete(PlaybackOutcome::Failed("late error".into())));
        assert!(completion.is_done());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
